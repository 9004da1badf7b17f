//! The scheduler engine.
//!
//! Registrations live in an id-keyed store; at most one of them is armed
//! against the underlying timer at any instant. Arming, disarming and the
//! selection of the next entry to fire all happen under one engine mutex
//! per scheduler; a condition variable lets teardown drain routines that
//! are still executing.
//!
//! # Architecture
//!
//! - entry store: the registrations, keyed by id.
//! - engine (this module): `arm`/`disarm`/`search`/`destroy` and
//!   `update_armed`, the earliest-trigger selection.
//! - `event`: runs each expiration, invokes the routine, re-arms.
//! - `registry`: process-local handle table for notification payloads.
//! - `sig`: signal-driven delivery.
//!
//! The underlying timer is always armed absolute with no interval;
//! recurrence is emulated by the event processor.

mod entry;
mod event;
mod registry;
#[cfg(feature = "signal")]
mod sig;

pub use entry::EntryId;

use std::num::NonZeroU64;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::error::{Error, Result};
use crate::time::{ClockId, TimeSpec};
use crate::timer::{self, Notify, TimerId, TimerSpec};

use entry::{Entry, Store};

/// Notification delivery mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// The timer's notification thread calls the event processor.
    Thread,
    /// A realtime signal handler calls the event processor.
    #[cfg(feature = "signal")]
    Signal(i32),
}

struct SchedState {
    entries: Store,
    /// The single entry the underlying timer is counting down to.
    armed: Option<EntryId>,
    destroy: bool,
    fatal: bool,
}

pub(crate) struct SchedInner {
    mode: Mode,
    /// Key in the process-local handle registry; rides in notification
    /// payloads instead of a raw pointer.
    key: usize,
    timer: TimerId,
    /// Ids are never reused for the lifetime of the handle.
    next_id: AtomicU64,
    state: Mutex<SchedState>,
    /// Signals routine completion to a draining destroy.
    cond: Condvar,
    #[cfg(feature = "signal")]
    old_action: Mutex<Option<sig::OldAction>>,
}

/// Thread-mode notification entry point: payload back to handle, then into
/// the event processor.
fn notify_entry(key: usize) {
    if let Some(inner) = registry::lookup(key) {
        event::process(&inner);
    }
}

fn init(mode: Mode) -> Result<Scheduler> {
    let key = registry::reserve();

    let notify = match mode {
        Mode::Thread => Notify::Thread {
            function: notify_entry,
            value: key,
        },
        #[cfg(feature = "signal")]
        Mode::Signal(signo) => Notify::Signal { signo, value: key },
    };

    let timer = match timer::timer_create(ClockId::Realtime, notify) {
        Ok(timer) => timer,
        Err(err) => {
            registry::retire(key);
            return Err(err);
        }
    };

    #[cfg(feature = "signal")]
    let old_action = match mode {
        Mode::Signal(signo) => match sig::install(signo) {
            Ok(old) => Some(old),
            Err(err) => {
                let _ = timer::timer_delete(timer);
                registry::retire(key);
                return Err(Error::Sys(err));
            }
        },
        Mode::Thread => None,
    };

    let inner = Arc::new(SchedInner {
        mode,
        key,
        timer,
        next_id: AtomicU64::new(1),
        state: Mutex::new(SchedState {
            entries: Store::new(),
            armed: None,
            destroy: false,
            fatal: false,
        }),
        cond: Condvar::new(),
        #[cfg(feature = "signal")]
        old_action: Mutex::new(old_action),
    });

    registry::publish(key, Arc::clone(&inner));

    log::debug!("scheduler {}: initialized ({:?})", key, mode);
    Ok(Scheduler { inner })
}

/// Pick the next entry to fire and drive the underlying timer to it.
///
/// Entries whose routine is executing are skipped; ties on the trigger go
/// to the oldest registration. An empty selection leaves the timer
/// disarmed.
fn update_armed_locked(inner: &SchedInner, st: &mut SchedState) -> Result<()> {
    if st.armed.take().is_some() {
        timer::timer_settime(inner.timer, true, &TimerSpec::DISARM, None)?;
    }

    let mut next: Option<(EntryId, TimeSpec)> = None;
    for (id, entry) in &st.entries {
        let es = entry.state.lock().unwrap();
        if es.in_progress {
            continue;
        }
        match next {
            Some((_, best)) if es.trigger >= best => {}
            _ => next = Some((*id, es.trigger)),
        }
    }

    let Some((id, trigger)) = next else {
        return Ok(());
    };

    timer::timer_settime(inner.timer, true, &TimerSpec::one_shot(trigger), None)?;
    st.armed = Some(id);
    Ok(())
}

/// A timer-driven callback scheduler.
///
/// Routines are registered against absolute wall-clock instants, optionally
/// recurring and optionally bounded by a hard expiration. Clones share one
/// underlying scheduler, so a routine that needs to re-enter the interface
/// can capture a clone. Teardown is explicit through
/// [`Scheduler::destroy`]; a handle that is never destroyed keeps its timer
/// and registry slot for the life of the process.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedInner>,
}

impl Scheduler {
    /// Scheduler whose dispatch runs on notification worker threads.
    pub fn thread_init() -> Result<Scheduler> {
        init(Mode::Thread)
    }

    /// Scheduler whose dispatch runs inside a realtime signal handler.
    ///
    /// The previously installed action for `signo` is restored at destroy.
    #[cfg(feature = "signal")]
    pub fn sig_init(signo: i32) -> Result<Scheduler> {
        init(Mode::Signal(signo))
    }

    #[cfg(not(feature = "signal"))]
    pub fn sig_init(_signo: i32) -> Result<Scheduler> {
        Err(Error::NotConfigured)
    }

    /// In signal mode, keep delivery off this thread while the engine
    /// mutex is held.
    #[cfg(feature = "signal")]
    fn guard_delivery(&self) -> Option<sig::Blocked> {
        match self.inner.mode {
            Mode::Signal(signo) => Some(sig::Blocked::new(signo)),
            Mode::Thread => None,
        }
    }

    #[cfg(not(feature = "signal"))]
    fn guard_delivery(&self) {}

    /// True once the scheduler has hit an unrecoverable inconsistency.
    pub fn fatal(&self) -> bool {
        let _guard = self.guard_delivery();
        self.inner.state.lock().unwrap().fatal
    }

    /// Register `routine` to run at the absolute wall-clock instant
    /// `trigger`, re-running every `step` (zero means one-shot) until
    /// `expire` (zero means never).
    ///
    /// Returns the registration's stable id. A routine may call back into
    /// the scheduler; no engine lock is held while it runs.
    pub fn arm_timespec<F>(
        &self,
        trigger: TimeSpec,
        step: TimeSpec,
        expire: TimeSpec,
        routine: F,
    ) -> Result<EntryId>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let _guard = self.guard_delivery();
        let inner = &self.inner;
        let mut st = inner.state.lock().unwrap();

        if st.fatal || st.destroy {
            return Err(Error::Cancelled);
        }

        let raw = inner.next_id.fetch_add(1, Ordering::Relaxed);
        let id = EntryId(NonZeroU64::new(raw).expect("id counter starts at one"));

        st.entries.insert(id, Entry::new(id, trigger, step, expire, routine));

        if update_armed_locked(inner, &mut st).is_err() {
            // Compensate and retry. A second failure means the timer state
            // is unknowable and no schedule can be trusted anymore.
            st.entries.remove(&id);
            if update_armed_locked(inner, &mut st).is_err() {
                st.fatal = true;
                log::error!(
                    "scheduler {}: timer unusable after compensating removal; aborting",
                    inner.key
                );
                process::abort();
            }
            return Err(Error::Cancelled);
        }

        log::trace!(
            "scheduler {}: armed {:?} at {}.{:09}",
            inner.key,
            id,
            trigger.sec,
            trigger.nsec
        );
        Ok(id)
    }

    /// Whole-seconds variant of [`Scheduler::arm_timespec`].
    pub fn arm_timestamp<F>(&self, trigger: i64, step: i64, expire: i64, routine: F) -> Result<EntryId>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.arm_timespec(
            TimeSpec::from_secs(trigger),
            TimeSpec::from_secs(step),
            TimeSpec::from_secs(expire),
            routine,
        )
    }

    /// Remove a registration.
    ///
    /// After this returns the routine will not run again, though an
    /// invocation already dispatched may still be completing.
    pub fn disarm(&self, id: EntryId) -> Result<()> {
        let _guard = self.guard_delivery();
        let inner = &self.inner;
        let mut st = inner.state.lock().unwrap();

        if st.fatal || st.destroy {
            return Err(Error::Cancelled);
        }

        if !st.entries.contains_key(&id) {
            return Err(Error::InvalidArgument);
        }

        if st.armed != Some(id) {
            st.entries.remove(&id);
            return Ok(());
        }

        // The armed entry must leave the underlying timer before it can
        // leave the store.
        timer::timer_settime(inner.timer, true, &TimerSpec::DISARM, None)?;
        st.armed = None;
        st.entries.remove(&id);
        update_armed_locked(inner, &mut st)
    }

    /// Current `(trigger, step, expire)` of a live registration.
    ///
    /// The trigger reflects reschedules of a recurring entry as they
    /// happen.
    pub fn search(&self, id: EntryId) -> Result<(TimeSpec, TimeSpec, TimeSpec)> {
        let _guard = self.guard_delivery();
        let inner = &self.inner;
        let st = inner.state.lock().unwrap();

        if st.fatal || st.destroy {
            return Err(Error::Cancelled);
        }

        match st.entries.get(&id) {
            Some(entry) => {
                let es = entry.state.lock().unwrap();
                if es.to_remove {
                    return Err(Error::NotFound);
                }
                Ok((es.trigger, entry.step, entry.expire))
            }
            None => Err(Error::NotFound),
        }
    }

    /// Tear the scheduler down.
    ///
    /// Stops the underlying timer, waits out routines that are still
    /// executing, and drops every registration. Teardown always progresses;
    /// the first error encountered is reported once it completes. Further
    /// operations on any clone return [`Error::Cancelled`]; a repeated
    /// destroy is a no-op.
    pub fn destroy(&self) -> Result<()> {
        let _guard = self.guard_delivery();
        let inner = &self.inner;
        let mut last_err: Option<Error> = None;

        #[cfg(feature = "signal")]
        if let Mode::Signal(signo) = inner.mode {
            if let Some(old) = inner.old_action.lock().unwrap().take() {
                if let Err(err) = sig::restore(signo, &old) {
                    log::warn!(
                        "scheduler {}: failed to restore signal action: {err}",
                        inner.key
                    );
                    last_err = Some(Error::Sys(err));
                }
            }
        }

        {
            let mut st = inner.state.lock().unwrap();
            if st.destroy {
                return Ok(());
            }

            // The timer dies and the flag goes up under one hold of the
            // engine mutex: a dispatch blocked on it sees the flag instead
            // of running its re-arm step against a deleted timer.
            if let Err(err) = timer::timer_delete(inner.timer) {
                log::warn!("scheduler {}: timer delete failed: {err}", inner.key);
                last_err.get_or_insert(err);
            }

            st.destroy = true;

            while st
                .entries
                .values()
                .any(|entry| entry.state.lock().unwrap().in_progress)
            {
                st = inner.cond.wait(st).unwrap();
            }
            st.entries.clear();
            st.armed = None;
        }

        registry::retire(inner.key);

        log::debug!("scheduler {}: destroyed", inner.key);
        match last_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
