//! The per-timer worker thread.
//!
//! One thread per timer sleeps on an interruptible wait until the armed
//! deadline, invokes the notification, and either re-arms from the interval
//! or parks until the next settime.

use std::mem;
use std::os::fd::{AsRawFd, RawFd};
use std::process;
use std::ptr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use crate::time::{clock_now, wall_now, TimeSpec};

use super::control::{Notify, TimerControl, WorkerFlags};

/// Block every signal on the calling thread. Library threads never take
/// delivery of client signals.
pub(super) fn mask_all_signals() {
    unsafe {
        let mut set: libc::sigset_t = mem::zeroed();
        libc::sigfillset(&mut set);
        libc::pthread_sigmask(libc::SIG_SETMASK, &set, ptr::null_mut());
    }
}

pub(super) fn run(ctl: Arc<TimerControl>) {
    mask_all_signals();

    let mut st = ctl.state.lock().unwrap();

    // Tell the creating thread the worker is up.
    st.flags.insert(WorkerFlags::INIT);
    ctl.consumer.notify_all();

    loop {
        while !st.flags.contains(WorkerFlags::ARMED) {
            if st.flags.contains(WorkerFlags::TERM) {
                return;
            }
            st = ctl.producer.wait(st).unwrap();
        }

        // Acknowledge the arm parameters; settime blocks until INIT clears.
        st.flags.remove(WorkerFlags::INIT);
        ctl.consumer.notify_all();

        let tsleep = if st.rem.is_spent() {
            st.rem = TimeSpec::ZERO;
            if st.absolute {
                let now = match clock_now(ctl.clock) {
                    Ok(now) => now,
                    Err(err) => {
                        log::error!("timer worker: clock read failed: {err}; aborting");
                        process::abort();
                    }
                };
                let mut left = st.arm.value;
                left.sub(&now);
                left
            } else {
                st.arm.value
            }
        } else {
            st.rem
        };

        // The wait runs unlocked so settime and gettime can take the
        // control mutex and interrupt it through the pipe.
        drop(st);

        let t_start = wall_now();
        let interrupted = wait_readable(ctl.pipe_rd.as_raw_fd(), tsleep);
        let t_stop = wall_now();

        st = ctl.state.lock().unwrap();

        if interrupted {
            // Compensate for the time already slept and drain the pipe.
            let mut elapsed = t_stop;
            elapsed.sub(&t_start);
            st.rem = tsleep;
            st.rem.sub(&elapsed);
            drain(ctl.pipe_rd.as_raw_fd());
        } else {
            st.rem = TimeSpec::ZERO;
        }

        if st.flags.contains(WorkerFlags::TERM) {
            return;
        }

        if st.flags.contains(WorkerFlags::INTR) {
            st.flags.remove(WorkerFlags::INTR);
            ctl.consumer.notify_all();
            continue;
        }

        if st.flags.contains(WorkerFlags::READ) {
            st.flags.remove(WorkerFlags::READ);
            ctl.consumer.notify_all();
            continue;
        }

        // Keep sleeping when the interrupted wait left time on the clock.
        if st.rem.sec > 0 || st.rem.nsec > 0 {
            continue;
        }

        log::trace!("timer worker: deadline reached, notifying");
        if ctl.notify_in_flight.load(Ordering::Acquire) > 0 {
            st.overruns += 1;
        }
        dispatch(&ctl);

        if st.arm.interval.is_zero() {
            st.flags.remove(WorkerFlags::ARMED);
            continue;
        }

        if st.absolute {
            let step = st.arm.interval;
            st.arm.value.add(&step);
        } else {
            st.arm.value = st.arm.interval;
        }
    }
}

/// Invoke the timer's notification with a copy of the descriptor.
fn dispatch(ctl: &Arc<TimerControl>) {
    match ctl.notify {
        Notify::None => {}
        Notify::Thread { function, value } => {
            ctl.notify_in_flight.fetch_add(1, Ordering::AcqRel);
            let inner = Arc::clone(ctl);
            let spawned = thread::Builder::new()
                .name("chime-notify".into())
                .spawn(move || {
                    mask_all_signals();
                    function(value);
                    inner.notify_in_flight.fetch_sub(1, Ordering::AcqRel);
                });
            match spawned {
                // Detached; the notification owns its own lifetime.
                Ok(handle) => drop(handle),
                Err(err) => {
                    log::error!("timer worker: failed to spawn notification thread: {err}");
                    ctl.notify_in_flight.fetch_sub(1, Ordering::AcqRel);
                }
            }
        }
        #[cfg(feature = "signal")]
        Notify::Signal { signo, value } => {
            let payload = libc::sigval {
                sival_ptr: value as *mut libc::c_void,
            };
            if unsafe { libc::sigqueue(libc::getpid(), signo, payload) } < 0 {
                log::error!(
                    "timer worker: sigqueue failed: {}",
                    std::io::Error::last_os_error()
                );
            }
        }
    }
}

/// Sleep until `timeout` elapses or the interrupt pipe becomes readable.
///
/// Returns true when the wait ended for any reason other than the timeout;
/// EINTR counts as an interrupt so the caller re-evaluates the remaining
/// time instead of firing early. A deadline already in the past degenerates
/// to a poll.
fn wait_readable(fd: RawFd, timeout: TimeSpec) -> bool {
    let mut tv = libc::timeval {
        tv_sec: timeout.sec.max(0) as libc::time_t,
        tv_usec: if timeout.sec < 0 {
            0
        } else {
            (timeout.nsec / 1_000) as libc::suseconds_t
        },
    };
    unsafe {
        let mut set: libc::fd_set = mem::zeroed();
        libc::FD_ZERO(&mut set);
        libc::FD_SET(fd, &mut set);
        libc::select(
            fd + 1,
            &mut set,
            ptr::null_mut(),
            ptr::null_mut(),
            &mut tv,
        ) != 0
    }
}

/// Empty the non-blocking read end after a wake.
fn drain(fd: RawFd) {
    let mut buf = [0u8; 16];
    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n <= 0 {
            break;
        }
    }
}
