//! Scheduler registration entries.
//!
//! The store is a plain id-keyed map; the engine selects the next entry to
//! fire by linear scan. Iteration follows id order, which is insertion
//! order, so ties on the trigger resolve the same way on every run.

use std::collections::BTreeMap;
use std::num::NonZeroU64;
use std::sync::{Arc, Mutex};

use crate::time::TimeSpec;

/// Stable handle for a registration, unique for the lifetime of its
/// scheduler and never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub(super) NonZeroU64);

pub(super) type Store = BTreeMap<EntryId, Arc<Entry>>;

/// Mutable entry state.
///
/// Guarded by the entry's own mutex so the event processor can advance the
/// trigger and the lifecycle bits while the engine mutex is released around
/// the user routine. Lock order is engine first, then entry; neither is
/// held across the routine itself.
#[derive(Debug)]
pub(super) struct EntryState {
    /// Next absolute instant the routine must run. Non-decreasing across
    /// reschedules.
    pub trigger: TimeSpec,
    /// The hard expiration has been reached.
    pub expired: bool,
    /// The routine is executing right now.
    pub in_progress: bool,
    /// The entry's lifecycle is over; remove it on the next pass under the
    /// engine mutex.
    pub to_remove: bool,
}

pub(super) struct Entry {
    pub id: EntryId,
    /// Recurrence period; zero means one-shot.
    pub step: TimeSpec,
    /// Hard deadline; zero means never.
    pub expire: TimeSpec,
    pub routine: Box<dyn Fn() + Send + Sync + 'static>,
    pub state: Mutex<EntryState>,
}

impl Entry {
    pub(super) fn new<F>(id: EntryId, trigger: TimeSpec, step: TimeSpec, expire: TimeSpec, routine: F) -> Arc<Entry>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Arc::new(Entry {
            id,
            step,
            expire,
            routine: Box::new(routine),
            state: Mutex::new(EntryState {
                trigger,
                expired: false,
                in_progress: false,
                to_remove: false,
            }),
        })
    }
}
