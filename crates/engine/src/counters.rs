//! Process-wide progress counters.
//!
//! Drivers poll these to decide when the delayed backlog has drained.
//! They live for the whole process and are never reset mid-run.

use std::sync::atomic::{AtomicI64, Ordering};

static QUEUED: AtomicI64 = AtomicI64::new(0);
static TOTAL: AtomicI64 = AtomicI64::new(0);

/// Delayed messages currently waiting in some node's delayed heap.
///
/// Returns to zero exactly when every delayed delivery has happened.
pub fn queued_messages() -> i64 {
    QUEUED.load(Ordering::Acquire)
}

/// Delayed messages ever enqueued across the whole process.
pub fn all_messages() -> i64 {
    TOTAL.load(Ordering::Acquire)
}

pub(crate) fn delayed_enqueued() {
    QUEUED.fetch_add(1, Ordering::AcqRel);
    TOTAL.fetch_add(1, Ordering::AcqRel);
}

pub(crate) fn delayed_delivered() {
    QUEUED.fetch_sub(1, Ordering::AcqRel);
}
