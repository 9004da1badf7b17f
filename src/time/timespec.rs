//! Nanosecond-resolution instants.

pub const NSEC_PER_SEC: i64 = 1_000_000_000;

/// An absolute instant or a duration, as whole seconds plus nanoseconds in
/// `[0, 1e9)`.
///
/// One representation serves both roles, exactly like the POSIX `timespec`
/// it mirrors. Ordering is total: seconds dominate, then nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeSpec {
    pub sec: i64,
    pub nsec: i64,
}

impl TimeSpec {
    pub const ZERO: TimeSpec = TimeSpec { sec: 0, nsec: 0 };

    pub fn new(sec: i64, nsec: i64) -> TimeSpec {
        TimeSpec { sec, nsec }
    }

    /// Whole-seconds constructor used by the timestamp arming interface.
    pub fn from_secs(sec: i64) -> TimeSpec {
        TimeSpec { sec, nsec: 0 }
    }

    /// A zero value disarms timers, makes an entry one-shot, or marks it
    /// never-expiring, depending on the field it sits in.
    pub fn is_zero(&self) -> bool {
        self.sec == 0 && self.nsec == 0
    }

    /// True when no time remains (zero, or negative after compensation).
    pub(crate) fn is_spent(&self) -> bool {
        self.sec < 0 || (self.sec == 0 && self.nsec <= 0)
    }

    /// In-place `self += other`, normalizing the nanosecond carry.
    pub fn add(&mut self, other: &TimeSpec) {
        let nsec = self.nsec + other.nsec;
        self.sec += other.sec + (nsec >= NSEC_PER_SEC) as i64;
        self.nsec = if nsec >= NSEC_PER_SEC {
            nsec - NSEC_PER_SEC
        } else {
            nsec
        };
    }

    /// In-place `self -= other`, normalizing with borrow. The seconds field
    /// may go negative; nanoseconds stay in `[0, 1e9)`.
    pub fn sub(&mut self, other: &TimeSpec) {
        let nsec = self.nsec - other.nsec;
        self.sec = self.sec - other.sec - (nsec < 0) as i64;
        self.nsec = if nsec < 0 { NSEC_PER_SEC + nsec } else { nsec };
    }

    pub(crate) fn from_raw(ts: libc::timespec) -> TimeSpec {
        TimeSpec {
            sec: ts.tv_sec as i64,
            nsec: ts.tv_nsec as i64,
        }
    }
}
