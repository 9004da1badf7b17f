//! Time facilities: instants, arithmetic, clock reads.

mod clock;
mod timespec;

#[cfg(test)]
mod timespec_tests;

pub use clock::{clock_now, wall_now, ClockId};
pub use timespec::{TimeSpec, NSEC_PER_SEC};
