use std::{sync::Arc, time::Duration};

use anyhow::{Context, anyhow};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::{
    config::RunConfig,
    dispatcher::Dispatcher,
    endpoint::Endpoint,
    error::RunError,
    nonce::NonceAllocator,
    stats::RunSummary,
    worker::Worker,
};

/// Validates the endpoint, starts the workers and aggregates their results.
pub struct Orchestrator<E> {
    endpoint: Arc<E>,
    config: RunConfig,
}

impl<E: Endpoint> Orchestrator<E> {
    pub fn new(endpoint: Arc<E>, config: RunConfig) -> Self {
        Self { endpoint, config }
    }

    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs the load test. Errors are only returned for failures before any worker starts;
    /// per-send failures end up in the summary.
    pub async fn run(&self) -> Result<RunSummary, RunError> {
        let RunConfig { kind, concurrency, duration, timings, .. } = self.config;
        let address = self.config.signer.address();
        deadline_after(Instant::now(), duration)?;

        let chain_id = self
            .endpoint
            .chain_id()
            .await
            .context("failed to fetch chain id")
            .map_err(RunError::Endpoint)?;
        let base = self.fetch_pending_nonce().await?;
        let allocator = Arc::new(NonceAllocator::new(base));

        info!(
            chain_id,
            address = %address,
            nonce = base,
            kind = %kind,
            workers = concurrency,
            duration = ?duration,
            "Starting load test"
        );

        if !self.dispatcher(&allocator, chain_id).supports_kind(kind).await {
            return Err(RunError::UnsupportedKind(kind));
        }

        // the account may have moved while we were validating
        allocator.reset(self.fetch_pending_nonce().await?);

        let started = Instant::now();
        let deadline = deadline_after(started, duration)?;

        let handles: Vec<_> = (1..=concurrency)
            .map(|id| {
                let dispatcher = self.dispatcher(&allocator, chain_id);
                let mut worker = Worker::new(id, dispatcher, kind, deadline, timings);
                tokio::spawn(async move {
                    let result = worker.run().await;
                    (worker, result)
                })
            })
            .collect();

        let mut workers = Vec::with_capacity(handles.len());
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok((worker, result)) => {
                    workers.push(worker);
                    results.push(result);
                }
                Err(e) => warn!(error = %e, "Worker task failed, excluding it from results"),
            }
        }

        let summary = RunSummary::aggregate(kind, results, duration, started.elapsed());

        for worker in &mut workers {
            worker.cleanup();
        }

        info!(
            sent = summary.total_sent,
            errors = summary.total_errors,
            confirmed = summary.confirmed,
            unconfirmed = summary.unconfirmed,
            next_nonce = allocator.current(),
            "Load test complete"
        );
        Ok(summary)
    }

    async fn fetch_pending_nonce(&self) -> Result<u64, RunError> {
        self.endpoint
            .pending_nonce(self.config.signer.address())
            .await
            .context("failed to fetch pending nonce")
            .map_err(RunError::Endpoint)
    }

    fn dispatcher(&self, allocator: &Arc<NonceAllocator>, chain_id: u64) -> Dispatcher<E> {
        Dispatcher::new(
            Arc::clone(&self.endpoint),
            self.config.signer.clone(),
            Arc::clone(allocator),
            self.config.recipient,
            chain_id,
        )
    }
}

/// `start + duration`, or an error when the run would end past what the clock can represent.
fn deadline_after(start: Instant, duration: Duration) -> Result<Instant, RunError> {
    start
        .checked_add(duration)
        .ok_or_else(|| RunError::InvalidConfig(anyhow!("duration {duration:?} is too large")))
}
