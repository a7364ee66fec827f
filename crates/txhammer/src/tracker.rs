use std::collections::HashMap;

use alloy::primitives::B256;
use serde::Serialize;
use tokio::time::Instant;

/// Send and confirmation timing of one accepted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionTiming {
    pub hash: B256,
    pub nonce: u64,
    #[serde(skip)]
    pub sent_at: Instant,
    #[serde(skip)]
    pub confirmed_at: Option<Instant>,
    /// Time from send to observed receipt. Absent for unconfirmed transactions.
    pub finalization_ms: Option<u64>,
    pub block_number: Option<u64>,
}

impl TransactionTiming {
    pub const fn pending(hash: B256, nonce: u64, sent_at: Instant) -> Self {
        Self { hash, nonce, sent_at, confirmed_at: None, finalization_ms: None, block_number: None }
    }

    pub const fn is_confirmed(&self) -> bool {
        self.finalization_ms.is_some()
    }
}

/// A worker's table of in-flight transactions.
///
/// Entries move exactly once: from pending to settled, either confirmed through
/// [`Self::confirm`] or as unconfirmed through [`Self::finalize_unconfirmed`].
#[derive(Debug, Default)]
pub struct ConfirmationTracker {
    pending: HashMap<B256, TransactionTiming>,
    settled: Vec<TransactionTiming>,
}

impl ConfirmationTracker {
    pub fn record_sent(&mut self, timing: TransactionTiming) {
        self.pending.insert(timing.hash, timing);
    }

    pub fn pending_hashes(&self) -> Vec<B256> {
        self.pending.keys().copied().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Marks `hash` confirmed in `block_number`. Returns the finalization time, or `None` if the
    /// hash is no longer pending.
    pub fn confirm(
        &mut self,
        hash: &B256,
        block_number: u64,
        confirmed_at: Instant,
    ) -> Option<u64> {
        let mut timing = self.pending.remove(hash)?;
        let finalization_ms =
            confirmed_at.saturating_duration_since(timing.sent_at).as_millis() as u64;
        timing.confirmed_at = Some(confirmed_at);
        timing.finalization_ms = Some(finalization_ms);
        timing.block_number = Some(block_number);
        self.settled.push(timing);
        Some(finalization_ms)
    }

    /// Settles everything still pending as unconfirmed. Returns how many entries were affected.
    pub fn finalize_unconfirmed(&mut self) -> usize {
        let count = self.pending.len();
        self.settled.extend(self.pending.drain().map(|(_, timing)| timing));
        count
    }

    /// Consumes the tracker, returning settled timings in settlement order followed by anything
    /// still pending.
    pub fn into_timings(mut self) -> Vec<TransactionTiming> {
        self.finalize_unconfirmed();
        self.settled
    }
}
