//! Shared nonce allocation for all workers signing with one identity.

use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug)]
struct AllocatorState {
    next: u64,
    issued: u64,
}

/// Hands out strictly increasing nonces to concurrent workers.
///
/// `allocate` and `reset` share one critical section, so no nonce is ever issued from a stale
/// base once a reset has been ordered before it, and no value is handed out twice between resets.
#[derive(Debug)]
pub struct NonceAllocator {
    state: Mutex<AllocatorState>,
}

impl NonceAllocator {
    pub fn new(base: u64) -> Self {
        Self { state: Mutex::new(AllocatorState { next: base, issued: 0 }) }
    }

    /// Returns the next nonce and advances the counter.
    pub fn allocate(&self) -> u64 {
        let mut state = self.state.lock();
        let nonce = state.next;
        state.next += 1;
        state.issued += 1;
        nonce
    }

    /// The nonce the next `allocate` call will return.
    pub fn current(&self) -> u64 {
        self.state.lock().next
    }

    /// Number of nonces issued since construction or the last reset.
    pub fn issued(&self) -> u64 {
        self.state.lock().issued
    }

    /// Rebases the counter, typically onto the endpoint's pending nonce after a conflict.
    pub fn reset(&self, base: u64) {
        let mut state = self.state.lock();
        debug!(old = state.next, new = base, issued = state.issued, "Resetting nonce allocator");
        state.next = base;
        state.issued = 0;
    }
}
