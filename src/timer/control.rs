//! Timer control blocks.

use std::os::fd::OwnedFd;
use std::sync::atomic::AtomicU64;
use std::sync::{Condvar, Mutex};

use bitflags::bitflags;

use crate::time::{ClockId, TimeSpec};

bitflags! {
    /// Worker handshake bits, guarded by the control block mutex.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(super) struct WorkerFlags: u8 {
        /// New arm parameters are pending; the worker clears this once it
        /// has picked them up.
        const INIT = 0x01;
        /// The timer is counting down.
        const ARMED = 0x02;
        /// A client interrupted the wait and blocks until acknowledged.
        const INTR = 0x04;
        /// A client wants the remaining time refreshed.
        const READ = 0x08;
        /// The worker must exit; set by delete ahead of the join.
        const TERM = 0x10;
    }
}

/// Armed value and recurrence interval, the `itimerspec` analogue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerSpec {
    pub value: TimeSpec,
    pub interval: TimeSpec,
}

impl TimerSpec {
    /// A zero value; passing this to settime disarms the timer.
    pub const DISARM: TimerSpec = TimerSpec {
        value: TimeSpec::ZERO,
        interval: TimeSpec::ZERO,
    };

    pub fn one_shot(value: TimeSpec) -> TimerSpec {
        TimerSpec {
            value,
            interval: TimeSpec::ZERO,
        }
    }
}

/// How a timer announces expiration.
///
/// The descriptor is copied out of the control block before every delivery,
/// so a settime racing a notification already in flight cannot mutate what
/// the notification sees.
#[derive(Debug, Clone, Copy)]
pub enum Notify {
    /// Expire silently.
    None,
    /// Call `function(value)` on a freshly spawned detached thread.
    Thread { function: fn(usize), value: usize },
    /// Queue `signo` for the process with `value` as the payload.
    #[cfg(feature = "signal")]
    Signal { signo: i32, value: usize },
}

/// Mutable timer state, guarded by [`TimerControl::state`].
#[derive(Debug)]
pub(super) struct TimerState {
    pub flags: WorkerFlags,
    /// `arm.value` is a deadline on the timer's clock rather than relative
    /// to the arming instant.
    pub absolute: bool,
    pub arm: TimerSpec,
    /// Time left over from an interrupted wait; consumed before
    /// `arm.value`.
    pub rem: TimeSpec,
    /// Expirations that fired while a previous notification was still
    /// executing. Reset on rearm.
    pub overruns: u64,
}

pub(super) struct TimerControl {
    pub clock: ClockId,
    pub notify: Notify,
    pub state: Mutex<TimerState>,
    /// The worker waits here for arm parameters.
    pub producer: Condvar,
    /// Clients wait here for INIT/INTR/READ acknowledgements.
    pub consumer: Condvar,
    /// Interrupt pipe. The read end is non-blocking; the worker drains it
    /// on every wake.
    pub pipe_rd: OwnedFd,
    pub pipe_wr: OwnedFd,
    /// Notification threads still running, for overrun accounting.
    pub notify_in_flight: AtomicU64,
}
