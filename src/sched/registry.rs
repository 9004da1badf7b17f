//! Process-local scheduler handle registry.
//!
//! Notification payloads carry a small integer instead of a raw pointer;
//! the delivery path looks the handle back up here. Keys are slot + 1 so
//! zero is never a live key. The signal handler takes this table's lock,
//! hence the delivery mask around every access.

use std::sync::{Arc, Mutex};

use crate::sigmask;

use super::SchedInner;

enum HandleSlot {
    Free,
    /// Claimed during init, before the inner state exists.
    Reserved,
    Live(Arc<SchedInner>),
}

static HANDLES: Mutex<Vec<HandleSlot>> = Mutex::new(Vec::new());

/// Claim a key ahead of handle construction.
pub(super) fn reserve() -> usize {
    let _mask = sigmask::mask_all();
    let mut table = HANDLES.lock().unwrap();
    match table.iter().position(|slot| matches!(slot, HandleSlot::Free)) {
        Some(idx) => {
            table[idx] = HandleSlot::Reserved;
            idx + 1
        }
        None => {
            table.push(HandleSlot::Reserved);
            table.len()
        }
    }
}

/// Make a reserved key deliverable.
pub(super) fn publish(key: usize, inner: Arc<SchedInner>) {
    let _mask = sigmask::mask_all();
    let mut table = HANDLES.lock().unwrap();
    if let Some(slot) = key.checked_sub(1).and_then(|idx| table.get_mut(idx)) {
        *slot = HandleSlot::Live(inner);
    }
}

pub(super) fn lookup(key: usize) -> Option<Arc<SchedInner>> {
    let _mask = sigmask::mask_all();
    let table = HANDLES.lock().unwrap();
    match key.checked_sub(1).and_then(|idx| table.get(idx)) {
        Some(HandleSlot::Live(inner)) => Some(Arc::clone(inner)),
        _ => None,
    }
}

/// Drop a key. The table itself is freed once no handle remains.
pub(super) fn retire(key: usize) {
    let _mask = sigmask::mask_all();
    let mut table = HANDLES.lock().unwrap();
    if let Some(slot) = key.checked_sub(1).and_then(|idx| table.get_mut(idx)) {
        *slot = HandleSlot::Free;
    }
    if table.iter().all(|slot| matches!(slot, HandleSlot::Free)) {
        table.clear();
        table.shrink_to_fit();
    }
}
