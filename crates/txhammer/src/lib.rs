//! Concurrent transaction load generator.
//!
//! Workers share one account and draw nonces from a single [`NonceAllocator`]. Each worker sends
//! at a fixed interval until the deadline, recovers from nonce conflicts by resynchronizing with
//! the node, and measures how long every accepted transaction takes to land in a block.

mod cli;
mod config;
mod dispatcher;
mod endpoint;
mod error;
mod nonce;
mod orchestrator;
mod request;
mod rpc;
mod stats;
mod tracker;
mod worker;

#[cfg(test)]
mod test_utils;

pub use cli::{Args, run_load_test};
pub use config::{
    DEFAULT_BLOCK_POLL_INTERVAL, DEFAULT_CONCURRENCY, DEFAULT_DRAIN_WINDOW, DEFAULT_DURATION,
    DEFAULT_RETRY_DELAY, DEFAULT_SEND_INTERVAL, FileConfig, RunConfig, TxKind, WorkerTimings,
    parse_duration, parse_private_key,
};
pub use dispatcher::{DispatchOutcome, Dispatcher, is_sequence_conflict};
pub use endpoint::{BlockSubscription, Capability, Endpoint, FeeEstimate};
pub use error::RunError;
pub use nonce::NonceAllocator;
pub use orchestrator::Orchestrator;
pub use request::{
    BLOB_PAYLOAD, GAS_LIMIT_BLOB, GAS_LIMIT_TRANSFER, RequestTemplate, TRANSFER_VALUE,
    build_request,
};
pub use rpc::AlloyEndpoint;
pub use stats::{RunSummary, TimingStats, WorkerResult, print_final_report};
pub use tracker::{ConfirmationTracker, TransactionTiming};
pub use worker::Worker;
