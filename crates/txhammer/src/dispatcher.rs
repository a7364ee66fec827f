use std::sync::Arc;

use alloy::{
    eips::eip2718::Encodable2718,
    network::{Ethereum, EthereumWallet, NetworkWallet},
    primitives::{Address, B256, Bytes},
    signers::local::PrivateKeySigner,
};
use anyhow::{Context, Result};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
    config::TxKind,
    endpoint::{Capability, Endpoint},
    nonce::NonceAllocator,
    request::{RequestTemplate, build_request},
};

/// Result of a single send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Accepted { tx_hash: B256, nonce: u64, sent_at: Instant },
    Rejected { reason: String, nonce: u64, sequence_conflict: bool },
}

/// Returns true when a rejection reason points at a stale or reused nonce.
pub fn is_sequence_conflict(reason: &str) -> bool {
    let reason = reason.to_lowercase();
    reason.contains("nonce") || reason.contains("replacement transaction underpriced")
}

/// Signs and submits transactions for one identity, drawing nonces from the shared allocator.
pub struct Dispatcher<E> {
    endpoint: Arc<E>,
    wallet: EthereumWallet,
    allocator: Arc<NonceAllocator>,
    template: RequestTemplate,
}

impl<E: Endpoint> Dispatcher<E> {
    pub fn new(
        endpoint: Arc<E>,
        signer: PrivateKeySigner,
        allocator: Arc<NonceAllocator>,
        recipient: Address,
        chain_id: u64,
    ) -> Self {
        let template = RequestTemplate { from: signer.address(), to: recipient, chain_id };
        Self { endpoint, wallet: EthereumWallet::from(signer), allocator, template }
    }

    pub const fn address(&self) -> Address {
        self.template.from
    }

    pub const fn endpoint(&self) -> &Arc<E> {
        &self.endpoint
    }

    /// Sends one transaction of `kind`. The allocated nonce is consumed whatever the outcome.
    pub async fn send(&self, kind: TxKind) -> DispatchOutcome {
        let nonce = self.allocator.allocate();
        let sent_at = Instant::now();

        match self.try_send(kind, nonce).await {
            Ok(tx_hash) => DispatchOutcome::Accepted { tx_hash, nonce, sent_at },
            Err(e) => {
                let reason = format!("{e:#}");
                let sequence_conflict = is_sequence_conflict(&reason);
                DispatchOutcome::Rejected { reason, nonce, sequence_conflict }
            }
        }
    }

    async fn try_send(&self, kind: TxKind, nonce: u64) -> Result<B256> {
        let fees = self.endpoint.fee_estimate().await.context("failed to fetch fee data")?;
        let request = build_request(kind, nonce, &fees, &self.template)?;

        let envelope =
            <EthereumWallet as NetworkWallet<Ethereum>>::sign_request(&self.wallet, request)
                .await
                .context("failed to sign transaction")?;
        let local_hash = *envelope.tx_hash();
        let raw = Bytes::from(envelope.encoded_2718());

        let tx_hash = self.endpoint.submit(raw).await?;
        if tx_hash != local_hash {
            debug!(local = %local_hash, remote = %tx_hash, "Endpoint reported a different tx hash");
        }
        Ok(tx_hash)
    }

    /// Checks that the endpoint can accept `kind` without consuming a nonce.
    pub async fn supports_kind(&self, kind: TxKind) -> bool {
        match kind {
            TxKind::Legacy | TxKind::PriorityFee => true,
            TxKind::DataBlob => {
                self.endpoint.supports_capability(Capability::BlobTransactions).await
            }
        }
    }

    /// Rebases the shared allocator on the endpoint's pending nonce.
    pub async fn resync_sequence(&self) -> Result<u64> {
        let pending = self
            .endpoint
            .pending_nonce(self.template.from)
            .await
            .context("failed to fetch pending nonce")?;
        let previous = self.allocator.current();
        self.allocator.reset(pending);
        info!(address = %self.template.from, previous, pending, "Nonce resynchronized");
        Ok(pending)
    }
}
