//! In-process endpoint used by the unit tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};

use alloy::{
    consensus::{Transaction, TxEnvelope},
    eips::eip2718::Decodable2718,
    primitives::{Address, B256, Bytes},
    signers::local::PrivateKeySigner,
};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{sync::mpsc, time::Instant};

use crate::endpoint::{BlockSubscription, Capability, Endpoint, FeeEstimate};

/// First anvil dev key.
pub(crate) const TEST_KEY: &str =
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub(crate) fn test_signer() -> PrivateKeySigner {
    TEST_KEY.parse().unwrap()
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Submission {
    pub(crate) nonce: u64,
    pub(crate) at: Instant,
    pub(crate) accepted: bool,
}

/// Scriptable endpoint. Blocks are produced every two seconds from construction, and a submitted
/// transaction lands in the first block after its submission when confirmations are enabled.
#[derive(Debug)]
pub(crate) struct FakeEndpoint {
    pending_nonce: AtomicU64,
    blobs: bool,
    confirms: bool,
    block_time: Duration,
    genesis: Instant,
    fail_fees: AtomicBool,
    fail_pending_nonce: AtomicBool,
    rejections: Mutex<VecDeque<String>>,
    submissions: Mutex<Vec<Submission>>,
    included_after: Mutex<HashMap<B256, u64>>,
    fee_calls: AtomicUsize,
    nonce_calls: AtomicUsize,
    subscriptions: AtomicUsize,
}

impl FakeEndpoint {
    pub(crate) fn new(pending_nonce: u64) -> Self {
        Self {
            pending_nonce: AtomicU64::new(pending_nonce),
            blobs: true,
            confirms: true,
            block_time: Duration::from_secs(2),
            genesis: Instant::now(),
            fail_fees: AtomicBool::new(false),
            fail_pending_nonce: AtomicBool::new(false),
            rejections: Mutex::new(VecDeque::new()),
            submissions: Mutex::new(Vec::new()),
            included_after: Mutex::new(HashMap::new()),
            fee_calls: AtomicUsize::new(0),
            nonce_calls: AtomicUsize::new(0),
            subscriptions: AtomicUsize::new(0),
        }
    }

    pub(crate) fn without_blobs(mut self) -> Self {
        self.blobs = false;
        self
    }

    /// Transactions are accepted but never included.
    pub(crate) fn never_confirms(mut self) -> Self {
        self.confirms = false;
        self
    }

    /// Queues a rejection for the next submission.
    pub(crate) fn reject_next(&self, reason: &str) {
        self.rejections.lock().push_back(reason.to_string());
    }

    pub(crate) fn fail_fees(&self, fail: bool) {
        self.fail_fees.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_pending_nonce(&self, fail: bool) {
        self.fail_pending_nonce.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }

    /// Nonces of every submission attempt, accepted or not.
    pub(crate) fn submitted_nonces(&self) -> Vec<u64> {
        self.submissions.lock().iter().map(|s| s.nonce).collect()
    }

    pub(crate) fn fee_calls(&self) -> usize {
        self.fee_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn nonce_calls(&self) -> usize {
        self.nonce_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    fn head(&self) -> u64 {
        let elapsed = Instant::now().duration_since(self.genesis);
        (elapsed.as_millis() / self.block_time.as_millis().max(1)) as u64
    }
}

#[async_trait]
impl Endpoint for FakeEndpoint {
    async fn chain_id(&self) -> Result<u64> {
        Ok(31337)
    }

    async fn pending_nonce(&self, _address: Address) -> Result<u64> {
        self.nonce_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_pending_nonce.load(Ordering::SeqCst) {
            bail!("connection reset by peer");
        }
        Ok(self.pending_nonce.load(Ordering::SeqCst))
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate> {
        self.fee_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fees.load(Ordering::SeqCst) {
            bail!("fee oracle unavailable");
        }
        Ok(FeeEstimate {
            gas_price: 1_000_000_000,
            max_fee_per_gas: 2_000_000_000,
            max_priority_fee_per_gas: Some(1_000_000),
        })
    }

    async fn submit(&self, raw: Bytes) -> Result<B256> {
        let envelope =
            TxEnvelope::decode_2718(&mut raw.as_ref()).context("undecodable transaction")?;
        let nonce = envelope.nonce();
        let tx_hash = *envelope.tx_hash();

        let rejection = self.rejections.lock().pop_front();
        self.submissions.lock().push(Submission {
            nonce,
            at: Instant::now(),
            accepted: rejection.is_none(),
        });

        if let Some(reason) = rejection {
            return Err(anyhow!(reason));
        }
        self.included_after.lock().insert(tx_hash, self.head());
        Ok(tx_hash)
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<u64>> {
        if !self.confirms {
            return Ok(None);
        }
        let head = self.head();
        Ok(self.included_after.lock().get(&tx_hash).filter(|h| head > **h).map(|h| h + 1))
    }

    async fn supports_capability(&self, capability: Capability) -> bool {
        match capability {
            Capability::BlobTransactions => self.blobs,
        }
    }

    fn subscribe_blocks(&self) -> BlockSubscription {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(16);
        let block_time = self.block_time;
        let genesis = self.genesis;
        let feeder = tokio::spawn(async move {
            let mut number = 0;
            loop {
                number += 1;
                tokio::time::sleep_until(genesis + block_time * number as u32).await;
                if tx.send(number).await.is_err() {
                    break;
                }
            }
        });
        BlockSubscription::new(rx, Some(feeder))
    }
}
