use crate::error::{Error, Result};
use crate::model::{SignatureInfo, Transaction};
use std::future::Future;

pub mod solana;

pub use solana::SolanaRpcClient;

/// Public keys are 32 bytes.
const ADDRESS_LEN: usize = 32;

/// A receiver address has to be a base58 encoded 32 byte public key.
pub fn validate_address(address: &str) -> Result<()> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| Error::Parse(format!("address '{}' is not valid base58: {}", address, e)))?;

    if bytes.len() != ADDRESS_LEN {
        return Err(Error::Parse(format!(
            "address '{}' decodes to {} bytes, expected {}", address, bytes.len(), ADDRESS_LEN)));
    }

    Ok(())
}

/// Read-only view of the chain the payment watcher needs.
pub trait ChainClient: Send + Sync {
    /// Most recent signatures touching `address`, newest first.
    fn get_signatures_for_address(&self, address: &str, limit: usize)
        -> impl Future<Output = Result<Vec<SignatureInfo>>> + Send;

    /// `Ok(None)` when the node cannot locate the transaction.
    fn get_transaction(&self, signature: &str)
        -> impl Future<Output = Result<Option<Transaction>>> + Send;
}
