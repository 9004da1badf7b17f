//! Event processing on timer expiration.

use std::process;
use std::sync::Arc;

use crate::time::wall_now;

use super::{update_armed_locked, SchedInner};

/// Runs on every timer fire, on a notification thread in thread mode or
/// inside the signal handler in signal mode.
///
/// The engine mutex is released across the user routine, so routines may
/// re-enter arm, disarm and search freely. While it is released, the
/// entry's `in_progress` bit keeps the selection pass away from it.
pub(super) fn process(inner: &Arc<SchedInner>) {
    let mut st = inner.state.lock().unwrap();

    if st.destroy {
        st.armed = None;
        inner.cond.notify_all();
        return;
    }

    let now = wall_now();

    let Some(armed_id) = st.armed.take() else {
        // The fire raced a disarm that already re-armed the timer.
        return;
    };
    let Some(entry) = st.entries.get(&armed_id).map(Arc::clone) else {
        // The armed entry vanished between the fire and this lookup; pick
        // the next candidate.
        if update_armed_locked(inner, &mut st).is_err() {
            st.fatal = true;
            log::error!("scheduler {}: re-arm failed after a vanished entry; aborting", inner.key);
            process::abort();
        }
        return;
    };

    entry.state.lock().unwrap().in_progress = true;
    drop(st);

    // No engine lock from here until the routine returns.
    let mut run = false;
    {
        let mut es = entry.state.lock().unwrap();
        if !entry.expire.is_zero() && now >= entry.expire {
            // Past the hard deadline: never dispatched, only removed. This
            // check comes before the trigger comparison on purpose.
            es.expired = true;
            es.to_remove = true;
            log::debug!("entry {:?}: expired, dispatch suppressed", entry.id);
        } else if now >= es.trigger {
            if !entry.step.is_zero() {
                // Catch up so the next trigger lands strictly in the
                // future even after a long stall.
                while now >= es.trigger {
                    es.trigger.add(&entry.step);
                }
                run = true;
            } else {
                es.to_remove = true;
                run = true;
            }
        }
        // A wake ahead of the trigger leaves the entry untouched; it is
        // simply re-armed below.
    }

    if run {
        log::trace!("entry {:?}: dispatching", entry.id);
        (entry.routine)();
    }

    let mut st = inner.state.lock().unwrap();
    {
        let mut es = entry.state.lock().unwrap();
        if es.to_remove {
            st.entries.remove(&armed_id);
        }
        es.in_progress = false;
    }

    if st.destroy {
        st.armed = None;
        inner.cond.notify_all();
        return;
    }

    if update_armed_locked(inner, &mut st).is_err() {
        st.fatal = true;
        log::error!("scheduler {}: failed to re-arm after dispatch; aborting", inner.key);
        process::abort();
    }
}
