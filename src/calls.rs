use std::fmt;

use alloy::primitives::{Bytes, B256};
use serde::{Deserialize, Serialize};

use crate::{
    account::{blake2_256, AccountId, Keypair},
    chain::{self, TxHash},
    error::{AgentError, Result},
    proxy::ProxyType,
    registry::ConnectionHandle,
};

pub const RELAY_XCM_PALLET: &str = "XcmPallet";
pub const PARA_XCM_PALLET: &str = "PolkadotXcm";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeCall {
    Balances(BalancesCall),
    Proxy { pallet: String, call: ProxyCall },
    Xcm(XcmCall),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalancesCall {
    TransferKeepAlive { dest: AccountId, value: u128 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyCall {
    AddProxy {
        delegate: AccountId,
        proxy_type: ProxyType,
        delay: u32,
    },
    RemoveProxy {
        delegate: AccountId,
        proxy_type: ProxyType,
        delay: u32,
    },
    Proxy {
        real: AccountId,
        force_proxy_type: Option<ProxyType>,
        call: Box<RuntimeCall>,
    },
}

/// Native asset teleports. Amounts are in the chain's smallest unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum XcmCall {
    /// Relay chain to one of its parachains.
    TeleportToPara {
        para_id: u32,
        beneficiary: AccountId,
        amount: u128,
    },
    /// Parachain back to its relay chain.
    TeleportToRelay { beneficiary: AccountId, amount: u128 },
}

impl XcmCall {
    pub fn pallet(&self) -> &'static str {
        match self {
            Self::TeleportToPara { .. } => RELAY_XCM_PALLET,
            Self::TeleportToRelay { .. } => PARA_XCM_PALLET,
        }
    }
}

impl RuntimeCall {
    /// `Pallet.call_name`, for logs.
    pub fn name(&self) -> String {
        match self {
            Self::Balances(BalancesCall::TransferKeepAlive { .. }) => {
                "Balances.transfer_keep_alive".to_string()
            }
            Self::Proxy { pallet, call } => {
                let name = match call {
                    ProxyCall::AddProxy { .. } => "add_proxy",
                    ProxyCall::RemoveProxy { .. } => "remove_proxy",
                    ProxyCall::Proxy { .. } => "proxy",
                };
                format!("{pallet}.{name}")
            }
            Self::Xcm(call) => format!("{}.limited_teleport_assets", call.pallet()),
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        serde_json::to_vec(self)
            .map(Into::into)
            .map_err(|e| AgentError::InvalidParameter(format!("cannot encode call: {e}")))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedExtrinsic {
    pub signer: AccountId,
    pub nonce: u64,
    pub call: RuntimeCall,
    pub signature: Bytes,
    hash: TxHash,
}

impl SignedExtrinsic {
    /// Signs blake2b-256 over `(call, nonce)`. The extrinsic hash covers the
    /// signed payload and the signature.
    pub fn sign(keypair: &Keypair, call: RuntimeCall, nonce: u64) -> Result<Self> {
        let mut payload = serde_json::to_vec(&(&call, nonce))
            .map_err(|e| AgentError::InvalidParameter(format!("cannot encode call: {e}")))?;
        let signature = keypair.sign_prehash(&B256::from(blake2_256(&payload)))?;
        payload.extend_from_slice(&signature);

        Ok(Self {
            signer: keypair.account(),
            nonce,
            call,
            signature,
            hash: B256::from(blake2_256(&payload)),
        })
    }

    pub fn hash(&self) -> TxHash {
        self.hash
    }
}

/// A transaction the chain has accepted and included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutcome {
    pub chain: String,
    pub hash: TxHash,
}

impl fmt::Display for TransactionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.hash, self.chain)
    }
}

/// Signs `call` with the next nonce of `keypair` and waits for inclusion.
pub async fn submit(
    handle: &ConnectionHandle,
    keypair: &Keypair,
    call: RuntimeCall,
) -> Result<TransactionOutcome> {
    let chain = handle.chain_name();
    let session = handle.session()?;
    let signer = keypair.account();

    let info = chain::account_info(session.as_ref(), &signer)
        .await
        .map_err(|e| AgentError::from_chain(chain, e))?;
    let call_name = call.name();
    let extrinsic = SignedExtrinsic::sign(keypair, call, info.nonce)?;
    tracing::info!(chain, call = %call_name, nonce = info.nonce, %signer, "submitting extrinsic");

    let hash = session
        .submit_and_watch(extrinsic)
        .await
        .map_err(|e| AgentError::from_chain(chain, e))?;
    tracing::info!(chain, call = %call_name, %hash, "extrinsic included");

    Ok(TransactionOutcome {
        chain: chain.to_string(),
        hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_names_follow_pallets() {
        let beneficiary = AccountId([1u8; 32]);
        let to_para = RuntimeCall::Xcm(XcmCall::TeleportToPara {
            para_id: 1000,
            beneficiary,
            amount: 1,
        });
        assert_eq!(to_para.name(), "XcmPallet.limited_teleport_assets");

        let to_relay = RuntimeCall::Xcm(XcmCall::TeleportToRelay {
            beneficiary,
            amount: 1,
        });
        assert_eq!(to_relay.name(), "PolkadotXcm.limited_teleport_assets");

        let add = RuntimeCall::Proxy {
            pallet: "Proxy".into(),
            call: ProxyCall::AddProxy {
                delegate: beneficiary,
                proxy_type: ProxyType::Any,
                delay: 0,
            },
        };
        assert_eq!(add.name(), "Proxy.add_proxy");
    }

    #[test]
    fn signatures_bind_the_nonce() {
        let keypair = Keypair::from_secret(&[3u8; 32]).unwrap();
        let call = RuntimeCall::Balances(BalancesCall::TransferKeepAlive {
            dest: AccountId([2u8; 32]),
            value: 10,
        });

        let first = SignedExtrinsic::sign(&keypair, call.clone(), 0).unwrap();
        let again = SignedExtrinsic::sign(&keypair, call.clone(), 0).unwrap();
        let next = SignedExtrinsic::sign(&keypair, call, 1).unwrap();

        assert_eq!(first.signer, keypair.account());
        assert_eq!(first.signature.len(), 65);
        assert_eq!(first.hash(), again.hash());
        assert_ne!(first.hash(), next.hash());

        let other = Keypair::from_secret(&[4u8; 32]).unwrap();
        let foreign = SignedExtrinsic::sign(&other, first.call.clone(), 0).unwrap();
        assert_ne!(first.hash(), foreign.hash());
    }

    #[test]
    fn calls_parse_from_json() {
        let dest = AccountId([4u8; 32]);
        let json = format!(
            r#"{{"Balances":{{"TransferKeepAlive":{{"dest":"{}","value":1000}}}}}}"#,
            dest.to_ss58(42)
        );
        let call: RuntimeCall = serde_json::from_str(&json).unwrap();
        assert_eq!(
            call,
            RuntimeCall::Balances(BalancesCall::TransferKeepAlive { dest, value: 1000 })
        );
    }
}
