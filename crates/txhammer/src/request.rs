use alloy::{
    consensus::{SidecarBuilder, SimpleCoder},
    network::{TransactionBuilder, TransactionBuilder4844},
    primitives::{Address, U256},
    rpc::types::TransactionRequest,
};
use anyhow::{Context, Result};

use crate::{config::TxKind, endpoint::FeeEstimate};

/// Gas limit for a plain value transfer
pub const GAS_LIMIT_TRANSFER: u64 = 21_000;
/// Gas limit for a transfer carrying a blob sidecar
pub const GAS_LIMIT_BLOB: u64 = 50_000;
/// Amount sent with every transaction, in wei
pub const TRANSFER_VALUE: u64 = 1;
/// Payload packed into the single blob of a `DataBlob` transaction
pub const BLOB_PAYLOAD: [u8; 3] = [1, 2, 3];

/// Fields shared by every request a dispatcher builds.
#[derive(Debug, Clone, Copy)]
pub struct RequestTemplate {
    pub from: Address,
    pub to: Address,
    pub chain_id: u64,
}

/// Builds an unsigned request of `kind` at `nonce`, priced from `fees`.
pub fn build_request(
    kind: TxKind,
    nonce: u64,
    fees: &FeeEstimate,
    template: &RequestTemplate,
) -> Result<TransactionRequest> {
    let base = TransactionRequest::default()
        .with_from(template.from)
        .with_to(template.to)
        .with_value(U256::from(TRANSFER_VALUE))
        .with_nonce(nonce)
        .with_chain_id(template.chain_id);

    let request = match kind {
        TxKind::Legacy => base.with_gas_limit(GAS_LIMIT_TRANSFER).with_gas_price(fees.gas_price),
        TxKind::PriorityFee => base
            .with_gas_limit(GAS_LIMIT_TRANSFER)
            .with_max_fee_per_gas(fees.max_fee_per_gas)
            .with_max_priority_fee_per_gas(fees.max_priority_fee_per_gas.unwrap_or_default()),
        TxKind::DataBlob => {
            let sidecar = SidecarBuilder::<SimpleCoder>::from_slice(&BLOB_PAYLOAD)
                .build()
                .context("failed to build blob sidecar")?;
            base.with_gas_limit(GAS_LIMIT_BLOB)
                .with_max_fee_per_gas(fees.max_fee_per_gas)
                .with_max_priority_fee_per_gas(fees.max_priority_fee_per_gas.unwrap_or_default())
                .with_max_fee_per_blob_gas(fees.max_fee_per_gas)
                .with_blob_sidecar(sidecar)
        }
    };

    Ok(request)
}
