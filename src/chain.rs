use std::sync::Arc;

use alloy::primitives::B256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{account::AccountId, calls::SignedExtrinsic, config::ChainConfig, proxy::ProxyRecord};

pub type TxHash = B256;

pub const SYSTEM_PALLET: &str = "System";
pub const ACCOUNT_ITEM: &str = "Account";
pub const PROXIES_ITEM: &str = "Proxies";

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("session closed: {0}")]
    Closed(String),
    #[error("unknown storage item {pallet}.{item}")]
    UnknownStorage { pallet: String, item: String },
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("transaction dropped before inclusion")]
    Dropped,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub nonce: u64,
    pub free: u128,
    pub reserved: u128,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageValue {
    Account(AccountInfo),
    Proxies { records: Vec<ProxyRecord>, deposit: u128 },
}

/// A live RPC session to one network.
#[async_trait]
pub trait ChainSession: Send + Sync {
    /// Reads `pallet.item` keyed by an account.
    async fn query(&self, pallet: &str, item: &str, key: &AccountId) -> Result<StorageValue, ChainError>;

    /// Submits a signed extrinsic and resolves once it is included.
    async fn submit_and_watch(&self, extrinsic: SignedExtrinsic) -> Result<TxHash, ChainError>;

    async fn disconnect(&self);
}

/// Opens sessions for configured networks.
#[async_trait]
pub trait ChainConnector: Send + Sync {
    async fn connect(&self, chain: &ChainConfig) -> Result<Arc<dyn ChainSession>, ChainError>;
}

pub(crate) async fn account_info(
    session: &dyn ChainSession,
    who: &AccountId,
) -> Result<AccountInfo, ChainError> {
    match session.query(SYSTEM_PALLET, ACCOUNT_ITEM, who).await? {
        StorageValue::Account(info) => Ok(info),
        other => Err(ChainError::Transport(format!(
            "unexpected value for {SYSTEM_PALLET}.{ACCOUNT_ITEM}: {other:?}"
        ))),
    }
}
