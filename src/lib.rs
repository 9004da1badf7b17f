//! Userland timer-driven callback scheduling.
//!
//! `chime` registers routines against absolute wall-clock instants,
//! optionally recurring and optionally bounded by a hard expiration, and
//! dispatches them from a single underlying userland timer per scheduler.
//! Dispatch is delivered either on worker threads or through a realtime
//! signal handler.
//!
//! # Architecture
//!
//! - [`time`]: nanosecond-resolution instants, arithmetic, clock reads.
//! - [`timer`]: a userland rendition of the POSIX per-process timer calls,
//!   one interruptible worker thread per timer.
//! - [`sched`]: the scheduler engine and its event processor.
//!
//! # Example
//!
//! ```no_run
//! use chime::{wall_now, Scheduler};
//!
//! let sched = Scheduler::thread_init().unwrap();
//! let at = wall_now().sec + 2;
//! sched.arm_timestamp(at, 0, 0, || println!("rang")).unwrap();
//! std::thread::sleep(std::time::Duration::from_secs(3));
//! sched.destroy().unwrap();
//! ```

mod error;
mod sigmask;

pub mod sched;
pub mod time;
pub mod timer;

pub use error::{Error, Result};
pub use sched::{EntryId, Scheduler};
pub use time::{clock_now, wall_now, ClockId, TimeSpec};
pub use timer::{Notify, TimerId, TimerSpec};
