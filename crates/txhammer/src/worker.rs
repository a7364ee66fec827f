use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::{TxKind, WorkerTimings},
    dispatcher::{DispatchOutcome, Dispatcher},
    endpoint::{BlockSubscription, Endpoint},
    stats::WorkerResult,
    tracker::{ConfirmationTracker, TransactionTiming},
};

/// How often a draining worker re-checks its pending table
const DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct SendState {
    transaction_count: u64,
    errors: Vec<String>,
}

/// Sends transactions until a deadline, then waits for outstanding confirmations.
///
/// The send loop and the confirmation tracker run concurrently inside [`Worker::run`] and share
/// only this worker's pending table. The lock on that table is never held across an await.
pub struct Worker<E> {
    id: usize,
    dispatcher: Dispatcher<E>,
    kind: TxKind,
    deadline: Instant,
    timings: WorkerTimings,
    subscription: Option<BlockSubscription>,
}

impl<E: Endpoint> Worker<E> {
    /// Creates the worker and opens its block subscription.
    pub fn new(
        id: usize,
        dispatcher: Dispatcher<E>,
        kind: TxKind,
        deadline: Instant,
        timings: WorkerTimings,
    ) -> Self {
        let subscription = Some(dispatcher.endpoint().subscribe_blocks());
        Self { id, dispatcher, kind, deadline, timings, subscription }
    }

    pub const fn id(&self) -> usize {
        self.id
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.as_ref().is_some_and(BlockSubscription::is_active)
    }

    /// Runs the worker to completion and returns its result snapshot.
    pub async fn run(&mut self) -> WorkerResult {
        info!(
            worker = self.id,
            kind = %self.kind,
            address = %self.dispatcher.address(),
            "Worker started"
        );

        let mut subscription = self.subscription.take();
        let tracker = Mutex::new(ConfirmationTracker::default());
        let drained = CancellationToken::new();

        let sending = async {
            let state = self.send_loop(&tracker).await;
            self.drain(&tracker).await;
            drained.cancel();
            state
        };
        let confirming = self.track_confirmations(subscription.as_mut(), &tracker, &drained);
        let (state, ()) = tokio::join!(sending, confirming);

        self.subscription = subscription;

        let result = WorkerResult::new(
            self.id,
            state.transaction_count,
            state.errors,
            tracker.into_inner().into_timings(),
        );
        info!(
            worker = self.id,
            sent = result.transaction_count,
            errors = result.errors.len(),
            confirmed = result.confirmed(),
            "Worker finished"
        );
        result
    }

    async fn send_loop(&self, tracker: &Mutex<ConfirmationTracker>) -> SendState {
        let mut state = SendState::default();

        while Instant::now() < self.deadline {
            match self.dispatcher.send(self.kind).await {
                DispatchOutcome::Accepted { tx_hash, nonce, sent_at } => {
                    tracker.lock().record_sent(TransactionTiming::pending(tx_hash, nonce, sent_at));
                    state.transaction_count += 1;
                    debug!(
                        worker = self.id,
                        nonce,
                        tx_hash = %tx_hash,
                        elapsed_ms = sent_at.elapsed().as_millis() as u64,
                        "Transaction sent"
                    );
                    sleep(self.timings.send_interval).await;
                }
                DispatchOutcome::Rejected { reason, nonce, sequence_conflict } => {
                    state.errors.push(format!("tx failed - {reason}"));

                    if sequence_conflict {
                        warn!(
                            worker = self.id,
                            nonce,
                            reason = %reason,
                            "Nonce conflict, resynchronizing"
                        );
                        match self.dispatcher.resync_sequence().await {
                            // retry right away from the new base
                            Ok(_) => continue,
                            Err(e) => {
                                error!(worker = self.id, error = %e, "Nonce recovery failed");
                                state.errors.push(format!("nonce recovery failed - {e:#}"));
                            }
                        }
                    } else {
                        warn!(worker = self.id, nonce, reason = %reason, "Transaction failed");
                    }

                    sleep(self.timings.retry_delay).await;
                }
            }
        }

        state
    }

    /// Waits up to the drain window for pending transactions, then settles the rest as
    /// unconfirmed.
    async fn drain(&self, tracker: &Mutex<ConfirmationTracker>) {
        let started = Instant::now();

        loop {
            let pending = tracker.lock().pending_len();
            if pending == 0 {
                debug!(worker = self.id, "All transactions confirmed");
                return;
            }

            let waited = started.elapsed();
            if waited >= self.timings.drain_window {
                let unconfirmed = tracker.lock().finalize_unconfirmed();
                warn!(worker = self.id, unconfirmed, "Drain window elapsed, giving up on pending");
                return;
            }

            info!(worker = self.id, pending, "Waiting for confirmations...");
            sleep(DRAIN_POLL_INTERVAL.min(self.timings.drain_window - waited)).await;
        }
    }

    async fn track_confirmations(
        &self,
        subscription: Option<&mut BlockSubscription>,
        tracker: &Mutex<ConfirmationTracker>,
        drained: &CancellationToken,
    ) {
        let Some(subscription) = subscription else {
            warn!(worker = self.id, "No block subscription, confirmations will not be tracked");
            drained.cancelled().await;
            return;
        };

        loop {
            tokio::select! {
                biased;
                _ = drained.cancelled() => break,
                block = subscription.recv() => match block {
                    Some(number) => self.reconcile(number, tracker).await,
                    None => {
                        warn!(worker = self.id, "Block feed closed");
                        drained.cancelled().await;
                        break;
                    }
                }
            }
        }
    }

    /// Checks every pending transaction for a receipt after block `number`.
    async fn reconcile(&self, number: u64, tracker: &Mutex<ConfirmationTracker>) {
        let hashes = tracker.lock().pending_hashes();
        if hashes.is_empty() {
            return;
        }
        debug!(worker = self.id, block = number, pending = hashes.len(), "Checking receipts");

        for hash in hashes {
            match self.dispatcher.endpoint().receipt(hash).await {
                Ok(Some(block_number)) => {
                    let finalization = tracker.lock().confirm(&hash, block_number, Instant::now());
                    if let Some(finalization_ms) = finalization {
                        debug!(
                            worker = self.id,
                            tx_hash = %hash,
                            block = block_number,
                            finalization_ms,
                            "Transaction confirmed"
                        );
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(worker = self.id, tx_hash = %hash, error = %e, "Receipt lookup failed");
                }
            }
        }
    }

    /// Releases the block subscription. Safe to call more than once.
    pub fn cleanup(&mut self) {
        if let Some(subscription) = self.subscription.as_mut() {
            subscription.unsubscribe();
        }
    }
}
