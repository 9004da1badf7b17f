//! Signal-driven delivery.
//!
//! The queued signal's payload is a registry key, never a pointer, so the
//! handler trusts nothing that crossed the delivery boundary.

use std::io;
use std::mem;
use std::ptr;

use super::{event, registry};

/// Previously installed action for the engine's signal, restored at
/// destroy.
pub(super) struct OldAction(libc::sigaction);

// The embedded handler and mask values only move across threads with the
// handle that owns them; nothing aliases them.
unsafe impl Send for OldAction {}

extern "C" fn handler(_signo: libc::c_int, info: *mut libc::siginfo_t, _ctx: *mut libc::c_void) {
    let key = unsafe { (*info).si_value().sival_ptr } as usize;
    if let Some(inner) = registry::lookup(key) {
        event::process(&inner);
    }
}

/// Install the engine's handler for `signo`, returning the replaced
/// action.
pub(super) fn install(signo: i32) -> io::Result<OldAction> {
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_flags = libc::SA_SIGINFO;
        action.sa_sigaction = handler as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);
        let mut old: libc::sigaction = mem::zeroed();
        if libc::sigaction(signo, &action, &mut old) < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(OldAction(old))
    }
}

pub(super) fn restore(signo: i32, old: &OldAction) -> io::Result<()> {
    if unsafe { libc::sigaction(signo, &old.0, ptr::null_mut()) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Scoped block of the engine's delivery signal.
///
/// Engine critical sections hold one of these so delivery can never land on
/// a thread that already owns the engine mutex.
pub(super) struct Blocked {
    old: libc::sigset_t,
}

impl Blocked {
    pub(super) fn new(signo: i32) -> Blocked {
        unsafe {
            let mut set: libc::sigset_t = mem::zeroed();
            libc::sigemptyset(&mut set);
            libc::sigaddset(&mut set, signo);
            let mut old: libc::sigset_t = mem::zeroed();
            libc::pthread_sigmask(libc::SIG_BLOCK, &set, &mut old);
            Blocked { old }
        }
    }
}

impl Drop for Blocked {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_sigmask(libc::SIG_SETMASK, &self.old, ptr::null_mut());
        }
    }
}
