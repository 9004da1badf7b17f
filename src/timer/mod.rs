//! A userland rendition of the POSIX per-process timer calls.
//!
//! Each timer owns a worker thread that sleeps on an interruptible wait (a
//! pipe plus `select`) until its deadline, then invokes the configured
//! notification. The interface mirrors `timer_create`/`timer_settime`/
//! `timer_gettime`/`timer_getoverrun`/`timer_delete`.
//!
//! # Architecture
//!
//! - control block: shared per-timer state (mutex, producer and consumer
//!   condvars, interrupt pipe).
//! - worker: the sleep/notify state machine, one thread per timer.
//! - slot table: process-wide registry. A [`TimerId`] is its slot index
//!   plus one, so zero is never a valid id, and a slot is reused only after
//!   delete has joined the previous worker.

mod control;
mod worker;

pub use control::{Notify, TimerSpec};

use std::io;
use std::num::NonZeroUsize;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::{Error, Result};
use crate::sigmask;
use crate::time::{ClockId, TimeSpec};

use control::{TimerControl, TimerState, WorkerFlags};

/// Stable timer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(NonZeroUsize);

struct TimerSlot {
    ctl: Arc<TimerControl>,
    worker: Option<JoinHandle<()>>,
}

/// Process-wide timer registry. The table lock is held across the arm and
/// read handshakes so a concurrent delete cannot reclaim a slot
/// mid-operation; delete claims the slot under the lock and joins the
/// worker with it released.
static TIMERS: Mutex<Vec<Option<TimerSlot>>> = Mutex::new(Vec::new());

fn slot_ctl(table: &[Option<TimerSlot>], id: TimerId) -> Result<&Arc<TimerControl>> {
    table
        .get(id.0.get() - 1)
        .and_then(Option::as_ref)
        .map(|slot| &slot.ctl)
        .ok_or(Error::InvalidArgument)
}

fn make_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0i32; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return Err(io::Error::last_os_error());
    }
    let pair = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    // The worker drains after every wake; the read end must never block.
    let flags = unsafe { libc::fcntl(fds[0], libc::F_GETFL) };
    if flags < 0 || unsafe { libc::fcntl(fds[0], libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(pair)
}

/// Wake the worker out of its wait with a one-byte write.
fn interrupt(ctl: &TimerControl) {
    let buf = [0u8; 1];
    let n = unsafe { libc::write(ctl.pipe_wr.as_raw_fd(), buf.as_ptr() as *const libc::c_void, 1) };
    if n != 1 {
        // A full pipe still wakes the worker; anything else would stall the
        // handshake, which the logs should show.
        log::warn!("timer interrupt write returned {n}");
    }
}

/// Create a timer bound to `clock` that announces expiration through
/// `notify`.
///
/// The worker thread is spawned here and parks until the first settime.
pub fn timer_create(clock: ClockId, notify: Notify) -> Result<TimerId> {
    let _mask = sigmask::mask_all();
    let mut table = TIMERS.lock().unwrap();

    let slot = match table.iter().position(Option::is_none) {
        Some(idx) => idx,
        None => {
            table.push(None);
            table.len() - 1
        }
    };

    let (pipe_rd, pipe_wr) = make_pipe().map_err(Error::Sys)?;

    let ctl = Arc::new(TimerControl {
        clock,
        notify,
        state: Mutex::new(TimerState {
            flags: WorkerFlags::empty(),
            absolute: false,
            arm: TimerSpec::DISARM,
            rem: TimeSpec::ZERO,
            overruns: 0,
        }),
        producer: Condvar::new(),
        consumer: Condvar::new(),
        pipe_rd,
        pipe_wr,
        notify_in_flight: AtomicU64::new(0),
    });

    let worker_ctl = Arc::clone(&ctl);
    let worker = thread::Builder::new()
        .name(format!("chime-timer-{}", slot + 1))
        .spawn(move || worker::run(worker_ctl))
        .map_err(Error::Sys)?;

    // Wait for the worker to come up before publishing the slot.
    {
        let mut st = ctl.state.lock().unwrap();
        while !st.flags.contains(WorkerFlags::INIT) {
            st = ctl.consumer.wait(st).unwrap();
        }
    }

    table[slot] = Some(TimerSlot {
        ctl,
        worker: Some(worker),
    });

    let id = TimerId(NonZeroUsize::new(slot + 1).expect("slot index overflow"));
    log::debug!("timer {:?}: created on clock {:?}", id, clock);
    Ok(id)
}

/// Arm or disarm a timer. A zero `value` disarms. With `absolute`, `value`
/// is a deadline on the timer's clock; otherwise it is relative to now.
/// `old`, when given, receives the previously armed value and interval.
///
/// The handshake guarantees the worker has observed the new parameters
/// before this returns.
pub fn timer_settime(
    id: TimerId,
    absolute: bool,
    new: &TimerSpec,
    old: Option<&mut TimerSpec>,
) -> Result<()> {
    let _mask = sigmask::mask_all();
    let table = TIMERS.lock().unwrap();
    let ctl = slot_ctl(&table, id)?;
    settime_locked(ctl, absolute, new, old)
}

fn settime_locked(
    ctl: &Arc<TimerControl>,
    absolute: bool,
    new: &TimerSpec,
    old: Option<&mut TimerSpec>,
) -> Result<()> {
    let mut st = ctl.state.lock().unwrap();

    if st.flags.contains(WorkerFlags::ARMED) {
        // Pull the worker out of its wait and hold it until it has
        // acknowledged; it must not fire on the stale deadline.
        st.flags.remove(WorkerFlags::ARMED);
        interrupt(ctl);
        st.flags.insert(WorkerFlags::INTR);
        while st.flags.contains(WorkerFlags::INTR) {
            st = ctl.consumer.wait(st).unwrap();
        }
        if let Some(old) = old {
            *old = st.arm;
        }
    } else if let Some(old) = old {
        *old = TimerSpec::DISARM;
    }

    if new.value.is_zero() {
        log::trace!("timer disarmed");
        return Ok(());
    }

    st.rem = TimeSpec::ZERO;
    st.absolute = absolute;
    st.arm = *new;
    st.overruns = 0;
    st.flags.insert(WorkerFlags::INIT | WorkerFlags::ARMED);
    ctl.producer.notify_all();
    while st.flags.contains(WorkerFlags::INIT) {
        st = ctl.consumer.wait(st).unwrap();
    }

    Ok(())
}

/// Interval and remaining time of an armed timer.
///
/// Fails with [`Error::InvalidArgument`] when the timer is not armed.
pub fn timer_gettime(id: TimerId) -> Result<TimerSpec> {
    let _mask = sigmask::mask_all();
    let table = TIMERS.lock().unwrap();
    let ctl = slot_ctl(&table, id)?;
    let mut st = ctl.state.lock().unwrap();

    if !st.flags.contains(WorkerFlags::ARMED) {
        return Err(Error::InvalidArgument);
    }

    st.flags.insert(WorkerFlags::READ);
    interrupt(ctl);
    while st.flags.contains(WorkerFlags::READ) {
        st = ctl.consumer.wait(st).unwrap();
    }

    Ok(TimerSpec {
        value: st.rem,
        interval: st.arm.interval,
    })
}

/// Expirations that fired while a previous notification was still running.
pub fn timer_getoverrun(id: TimerId) -> Result<u64> {
    let _mask = sigmask::mask_all();
    let table = TIMERS.lock().unwrap();
    let ctl = slot_ctl(&table, id)?;
    let st = ctl.state.lock().unwrap();
    Ok(st.overruns)
}

/// Disarm, stop and join the worker, release the pipe and the slot.
///
/// The slot leaves the table before the join, so only this call can still
/// reach the dying worker and other timers keep moving while it winds
/// down. The table itself is freed once no timer remains allocated.
pub fn timer_delete(id: TimerId) -> Result<()> {
    let _mask = sigmask::mask_all();

    let mut slot = {
        let mut table = TIMERS.lock().unwrap();

        {
            let ctl = slot_ctl(&table, id)?;
            settime_locked(ctl, false, &TimerSpec::DISARM, None)?;

            let mut st = ctl.state.lock().unwrap();
            st.flags.insert(WorkerFlags::TERM);
            interrupt(ctl);
            ctl.producer.notify_all();
        }

        let Some(slot) = table[id.0.get() - 1].take() else {
            return Err(Error::InvalidArgument);
        };
        slot
    };

    // Joined with the table lock released.
    if let Some(worker) = slot.worker.take() {
        if worker.join().is_err() {
            log::error!("timer {:?}: worker panicked", id);
        }
    }
    // Dropping the slot closes both pipe ends.
    drop(slot);

    let mut table = TIMERS.lock().unwrap();
    if table.iter().all(Option::is_none) {
        table.clear();
        table.shrink_to_fit();
    }

    log::debug!("timer {:?}: deleted", id);
    Ok(())
}
