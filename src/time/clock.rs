//! Clock domain reads.

use std::io;
use std::ptr;

use crate::time::TimeSpec;

/// Clock domains a timer may bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockId {
    /// Wall-clock time (`CLOCK_REALTIME`).
    Realtime,
    /// Monotonic time since an unspecified epoch (`CLOCK_MONOTONIC`).
    Monotonic,
    /// Per-process CPU time (`CLOCK_PROCESS_CPUTIME_ID`).
    #[cfg(feature = "cputime")]
    ProcessCpu,
    /// Per-thread CPU time (`CLOCK_THREAD_CPUTIME_ID`).
    #[cfg(feature = "cputime")]
    ThreadCpu,
}

impl ClockId {
    fn as_raw(self) -> libc::clockid_t {
        match self {
            ClockId::Realtime => libc::CLOCK_REALTIME,
            ClockId::Monotonic => libc::CLOCK_MONOTONIC,
            #[cfg(feature = "cputime")]
            ClockId::ProcessCpu => libc::CLOCK_PROCESS_CPUTIME_ID,
            #[cfg(feature = "cputime")]
            ClockId::ThreadCpu => libc::CLOCK_THREAD_CPUTIME_ID,
        }
    }
}

/// Read `clock` once.
pub fn clock_now(clock: ClockId) -> io::Result<TimeSpec> {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    if unsafe { libc::clock_gettime(clock.as_raw(), &mut ts) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(TimeSpec::from_raw(ts))
}

/// Current wall-clock instant.
///
/// Never fails: falls back from `clock_gettime` to `gettimeofday` to the
/// seconds-only `time`.
pub fn wall_now() -> TimeSpec {
    if let Ok(now) = clock_now(ClockId::Realtime) {
        return now;
    }
    let mut tv = libc::timeval {
        tv_sec: 0,
        tv_usec: 0,
    };
    if unsafe { libc::gettimeofday(&mut tv, ptr::null_mut()) } == 0 {
        return TimeSpec::new(tv.tv_sec as i64, tv.tv_usec as i64 * 1000);
    }
    TimeSpec::from_secs(unsafe { libc::time(ptr::null_mut()) } as i64)
}
