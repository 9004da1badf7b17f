//! Scoped signal masking.
//!
//! The process-wide tables are taken both from client threads and from the
//! signal-delivery path. Delivery stays masked while such a lock is held so
//! a handler can never contend a lock its own thread already owns.

use std::mem;
use std::ptr;

pub(crate) struct MaskGuard(libc::sigset_t);

pub(crate) fn mask_all() -> MaskGuard {
    unsafe {
        let mut all: libc::sigset_t = mem::zeroed();
        libc::sigfillset(&mut all);
        let mut old: libc::sigset_t = mem::zeroed();
        libc::pthread_sigmask(libc::SIG_SETMASK, &all, &mut old);
        MaskGuard(old)
    }
}

impl Drop for MaskGuard {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_sigmask(libc::SIG_SETMASK, &self.0, ptr::null_mut());
        }
    }
}
