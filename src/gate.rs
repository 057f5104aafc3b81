//! One-shot readiness latches between discovery jobs.
//!
//! A gate is owned by one job and flipped after that job's first successful
//! cycle. Other jobs list the gates they wait on; the scheduler checks them on
//! every tick. Reads are a single atomic load.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Monotonic "first run done" latch, shared by cloning.
#[derive(Clone)]
pub struct ReadinessGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    name: String,
    done: AtomicBool,
    done_at: OnceLock<DateTime<Utc>>,
}

impl ReadinessGate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(GateInner {
                name: name.into(),
                done: AtomicBool::new(false),
                done_at: OnceLock::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Flips the gate. Returns `true` only for the call that flipped it.
    pub fn mark_done(&self) -> bool {
        let flipped = self
            .inner
            .done
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if flipped {
            let _ = self.inner.done_at.set(Utc::now());
        }
        flipped
    }

    pub fn is_done(&self) -> bool {
        self.inner.done.load(Ordering::Acquire)
    }

    /// When the gate flipped, if it has.
    pub fn done_at(&self) -> Option<DateTime<Utc>> {
        self.inner.done_at.get().copied()
    }

    /// True when both handles refer to the same gate.
    pub fn same_gate(&self, other: &ReadinessGate) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ReadinessGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessGate")
            .field("name", &self.inner.name)
            .field("done", &self.is_done())
            .finish()
    }
}

/// True when every gate in `gates` is done (vacuously true for none).
pub fn all_done(gates: &[ReadinessGate]) -> bool {
    gates.iter().all(ReadinessGate::is_done)
}
