//! Proxy delegation.
//!
//! The chain is the only source of truth for which proxies exist; nothing is
//! cached here. Grant and revoke are submitted as-is and any on-chain
//! rejection comes back as [`AgentError::Transaction`].

use serde::{Deserialize, Serialize};

use crate::{
    account::{AccountId, AgentIdentity},
    calls::{self, ProxyCall, RuntimeCall, TransactionOutcome},
    chain::{StorageValue, PROXIES_ITEM},
    error::{AgentError, Result},
    registry::ConnectionHandle,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProxyType {
    #[default]
    Any,
    NonTransfer,
    Governance,
    Staking,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub delegate: AccountId,
    pub proxy_type: ProxyType,
    pub delay: u32,
}

/// Input of [`ProxyManager::call_as_proxy`]. Both fields are required.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProxiedCall {
    #[serde(default)]
    pub on_behalf_of: Option<String>,
    #[serde(default)]
    pub call: Option<RuntimeCall>,
}

fn parse_address(field: &str, address: &str) -> Result<AccountId> {
    if address.trim().is_empty() {
        return Err(AgentError::InvalidParameter(format!("{field} is required")));
    }
    AccountId::from_ss58(address)
}

pub struct ProxyManager<'a> {
    identity: &'a AgentIdentity,
}

impl<'a> ProxyManager<'a> {
    pub fn new(identity: &'a AgentIdentity) -> Self {
        Self { identity }
    }

    /// Grants `delegate` an `Any` proxy over the identity's account.
    pub async fn create_proxy(
        &self,
        handle: &ConnectionHandle,
        delegate: &str,
    ) -> Result<TransactionOutcome> {
        let delegate = parse_address("delegate", delegate)?;
        let call = RuntimeCall::Proxy {
            pallet: handle.config().proxy_pallet.clone(),
            call: ProxyCall::AddProxy {
                delegate,
                proxy_type: ProxyType::Any,
                delay: 0,
            },
        };
        calls::submit(handle, self.identity.keypair(), call).await
    }

    pub async fn remove_proxy(
        &self,
        handle: &ConnectionHandle,
        delegate: &str,
    ) -> Result<TransactionOutcome> {
        let delegate = parse_address("delegate", delegate)?;
        let call = RuntimeCall::Proxy {
            pallet: handle.config().proxy_pallet.clone(),
            call: ProxyCall::RemoveProxy {
                delegate,
                proxy_type: ProxyType::Any,
                delay: 0,
            },
        };
        calls::submit(handle, self.identity.keypair(), call).await
    }

    /// Dispatches `request.call` as the account `request.on_behalf_of`, signed
    /// by the identity. The identity must be a proxy of that account.
    pub async fn call_as_proxy(
        &self,
        handle: &ConnectionHandle,
        request: ProxiedCall,
    ) -> Result<TransactionOutcome> {
        let real = parse_address("on_behalf_of", request.on_behalf_of.as_deref().unwrap_or_default())?;
        let call = request
            .call
            .ok_or_else(|| AgentError::InvalidParameter("call is required".into()))?;

        let wrapped = proxied(handle, real, call);
        calls::submit(handle, self.identity.keypair(), wrapped).await
    }

    /// The delegate key dispatches `call` on behalf of the identity's account.
    pub async fn call_as_delegate(
        &self,
        handle: &ConnectionHandle,
        call: RuntimeCall,
    ) -> Result<TransactionOutcome> {
        let delegate = self
            .identity
            .delegate()
            .ok_or(AgentError::MissingCredential("delegate key"))?;

        let wrapped = proxied(handle, self.identity.account(), call);
        calls::submit(handle, delegate, wrapped).await
    }

    /// Proxy records on-chain for `who`. No records is an empty list.
    pub async fn proxies(&self, handle: &ConnectionHandle, who: &AccountId) -> Result<Vec<ProxyRecord>> {
        let chain = handle.chain_name();
        let pallet = &handle.config().proxy_pallet;
        let value = handle
            .session()?
            .query(pallet, PROXIES_ITEM, who)
            .await
            .map_err(|e| AgentError::from_chain(chain, e))?;

        match value {
            StorageValue::Proxies { records, .. } => Ok(records),
            other => Err(AgentError::Connection {
                chain: chain.to_string(),
                reason: format!("unexpected value for {pallet}.{PROXIES_ITEM}: {other:?}"),
            }),
        }
    }
}

fn proxied(handle: &ConnectionHandle, real: AccountId, call: RuntimeCall) -> RuntimeCall {
    RuntimeCall::Proxy {
        pallet: handle.config().proxy_pallet.clone(),
        call: ProxyCall::Proxy {
            real,
            force_proxy_type: None,
            call: Box::new(call),
        },
    }
}
