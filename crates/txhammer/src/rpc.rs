use std::time::Duration;

use alloy::{
    primitives::{Address, B256, Bytes},
    providers::{Provider, RootProvider},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::{
    sync::mpsc,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, warn};
use url::Url;

use crate::endpoint::{BlockSubscription, Capability, Endpoint, FeeEstimate};

const BLOCK_CHANNEL_CAPACITY: usize = 64;

/// [`Endpoint`] backed by a JSON-RPC node over HTTP.
#[derive(Debug, Clone)]
pub struct AlloyEndpoint {
    provider: RootProvider,
    block_poll_interval: Duration,
}

impl AlloyEndpoint {
    pub fn new(rpc_url: &str, block_poll_interval: Duration) -> Result<Self> {
        let url: Url = rpc_url.parse().context("Invalid RPC URL")?;
        Ok(Self { provider: RootProvider::new_http(url), block_poll_interval })
    }
}

#[async_trait]
impl Endpoint for AlloyEndpoint {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64> {
        Ok(self.provider.get_transaction_count(address).pending().await?)
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate> {
        let gas_price = self.provider.get_gas_price().await.context("failed to fetch gas price")?;

        match self.provider.estimate_eip1559_fees().await {
            Ok(estimate) => Ok(FeeEstimate {
                gas_price,
                max_fee_per_gas: estimate.max_fee_per_gas,
                max_priority_fee_per_gas: Some(estimate.max_priority_fee_per_gas),
            }),
            Err(e) => {
                debug!(error = %e, "EIP-1559 fee estimation unavailable, using gas price");
                Ok(FeeEstimate {
                    gas_price,
                    max_fee_per_gas: gas_price,
                    max_priority_fee_per_gas: None,
                })
            }
        }
    }

    async fn submit(&self, raw: Bytes) -> Result<B256> {
        let pending = self.provider.send_raw_transaction(&raw).await?;
        Ok(*pending.tx_hash())
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<u64>> {
        let receipt = self.provider.get_transaction_receipt(tx_hash).await?;
        Ok(receipt.and_then(|r| r.block_number))
    }

    async fn supports_capability(&self, capability: Capability) -> bool {
        match capability {
            Capability::BlobTransactions => match self.provider.get_blob_base_fee().await {
                Ok(_) => true,
                Err(e) => {
                    debug!(error = %e, "eth_blobBaseFee failed, assuming no blob support");
                    false
                }
            },
        }
    }

    fn subscribe_blocks(&self) -> BlockSubscription {
        let (tx, rx) = mpsc::channel(BLOCK_CHANNEL_CAPACITY);
        let feeder = tokio::spawn(poll_blocks(self.provider.clone(), self.block_poll_interval, tx));
        BlockSubscription::new(rx, Some(feeder))
    }
}

/// Polls the head and emits every new height until the receiver goes away.
async fn poll_blocks(provider: RootProvider, poll_interval: Duration, tx: mpsc::Sender<u64>) {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<u64> = None;

    loop {
        tokio::select! {
            biased;
            _ = tx.closed() => break,
            _ = ticker.tick() => {}
        }

        match provider.get_block_number().await {
            Ok(number) if last.is_none_or(|last| number > last) => {
                let from = last.map_or(number, |last| last + 1);
                for height in from..=number {
                    if tx.send(height).await.is_err() {
                        return;
                    }
                }
                last = Some(number);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to fetch block number"),
        }
    }

    debug!(last_block = ?last, "Block poller stopped");
}
