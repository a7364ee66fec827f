//! Boundary to the remote ledger node.
//!
//! Workers and the orchestrator only talk to the node through [`Endpoint`], which keeps the
//! dispatch logic independent of the transport. [`crate::AlloyEndpoint`] is the JSON-RPC
//! implementation used by the binary.

use alloy::primitives::{Address, B256, Bytes};
use anyhow::Result;
use async_trait::async_trait;
use tokio::{sync::mpsc, task::JoinHandle};

/// Fee-market snapshot used to price the next request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimate {
    pub gas_price: u128,
    pub max_fee_per_gas: u128,
    /// Absent on endpoints without an EIP-1559 fee market
    pub max_priority_fee_per_gas: Option<u128>,
}

/// Optional node features checked before a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Accepts EIP-4844 blob transactions
    BlobTransactions,
}

#[async_trait]
pub trait Endpoint: Send + Sync + 'static {
    async fn chain_id(&self) -> Result<u64>;

    /// Next nonce for `address`, counting transactions still in the mempool.
    async fn pending_nonce(&self, address: Address) -> Result<u64>;

    async fn fee_estimate(&self) -> Result<FeeEstimate>;

    /// Submits a signed, 2718-encoded transaction. The error message carries the node's
    /// rejection reason.
    async fn submit(&self, raw: Bytes) -> Result<B256>;

    /// Block number the transaction was included in, `None` while it is still pending.
    async fn receipt(&self, tx_hash: B256) -> Result<Option<u64>>;

    /// Any failure while probing counts as unsupported.
    async fn supports_capability(&self, capability: Capability) -> bool;

    /// Opens a new-block feed owned by the caller.
    fn subscribe_blocks(&self) -> BlockSubscription;
}

/// A per-owner stream of new block numbers.
///
/// Dropping the subscription, or calling [`BlockSubscription::unsubscribe`] any number of times,
/// stops the feed.
#[derive(Debug)]
pub struct BlockSubscription {
    rx: mpsc::Receiver<u64>,
    feeder: Option<JoinHandle<()>>,
}

impl BlockSubscription {
    /// Wraps a receiver fed by `feeder`; the task is aborted on unsubscribe.
    pub fn new(rx: mpsc::Receiver<u64>, feeder: Option<JoinHandle<()>>) -> Self {
        Self { rx, feeder }
    }

    /// Waits for the next block number. Returns `None` once the feed is closed.
    pub async fn recv(&mut self) -> Option<u64> {
        self.rx.recv().await
    }

    pub fn is_active(&self) -> bool {
        !self.rx.is_closed()
    }

    pub fn unsubscribe(&mut self) {
        self.rx.close();
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
    }
}

impl Drop for BlockSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
