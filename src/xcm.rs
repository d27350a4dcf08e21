//! Cross-chain teleports between a relay chain and its parachains.
//!
//! Planning is synchronous and touches no network: it resolves both chains,
//! decides the direction and builds the call. Only a valid plan is signed and
//! submitted on the source chain.

use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};

use crate::{
    account::{AccountId, Keypair},
    calls::{self, RuntimeCall, TransactionOutcome, XcmCall},
    config::{ChainConfig, ChainMap, ChainType},
    error::{AgentError, Result},
    registry::{ConnectionHandle, ConnectionRegistry},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    #[serde(alias = "sourceChain")]
    pub source_chain: String,
    #[serde(alias = "destinationChain")]
    pub destination_chain: String,
    /// Human-facing units, e.g. `1.5` WND.
    pub amount: Decimal,
    /// SS58 address credited on the destination chain.
    #[serde(alias = "address")]
    pub recipient: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    RelayToPara { para_id: u32 },
    ParaToRelay,
}

/// Decides the teleport direction. Only relay/parachain pairs are routable.
pub fn route(source: &ChainConfig, destination: &ChainConfig) -> Result<Direction> {
    let invalid = || AgentError::InvalidRoute {
        from: source.name.clone(),
        to: destination.name.clone(),
    };
    if source.name == destination.name {
        return Err(invalid());
    }
    match (source.chain_type, destination.chain_type) {
        (ChainType::RelayChain, ChainType::ParaChain) => {
            let para_id = destination.para_id.ok_or_else(invalid)?;
            Ok(Direction::RelayToPara { para_id })
        }
        (ChainType::ParaChain, ChainType::RelayChain) => Ok(Direction::ParaToRelay),
        _ => Err(invalid()),
    }
}

/// Converts `amount` to the chain's smallest unit. Digits beyond `decimals`
/// are truncated.
pub fn scale_amount(amount: Decimal, decimals: u32) -> Result<u128> {
    if amount <= Decimal::ZERO {
        return Err(AgentError::InvalidParameter(format!(
            "amount must be positive, got {amount}"
        )));
    }
    let overflow = || AgentError::InvalidParameter(format!("amount {amount} is too large"));

    let unit = 10u64
        .checked_pow(decimals)
        .map(Decimal::from)
        .ok_or_else(overflow)?;
    let scaled = amount
        .trunc_with_scale(decimals)
        .checked_mul(unit)
        .ok_or_else(overflow)?;
    let planck = scaled.trunc().to_u128().ok_or_else(overflow)?;
    if planck == 0 {
        return Err(AgentError::InvalidParameter(format!(
            "amount {amount} is below the smallest unit"
        )));
    }
    Ok(planck)
}

/// A validated transfer, ready to sign.
#[derive(Debug)]
pub struct TeleportPlan {
    pub handle: ConnectionHandle,
    pub direction: Direction,
    pub call: RuntimeCall,
}

pub struct XcmDispatcher<'a> {
    chains: &'a ChainMap,
}

impl<'a> XcmDispatcher<'a> {
    pub fn new(chains: &'a ChainMap) -> Self {
        Self { chains }
    }

    pub fn plan(&self, registry: &ConnectionRegistry, request: &TransferRequest) -> Result<TeleportPlan> {
        let source = self
            .chains
            .resolve(&request.source_chain)
            .ok_or_else(|| AgentError::UnknownChain(request.source_chain.clone()))?;
        let destination = self
            .chains
            .resolve(&request.destination_chain)
            .ok_or_else(|| AgentError::UnknownChain(request.destination_chain.clone()))?;

        let direction = route(source, destination)?;
        let beneficiary = AccountId::from_ss58(&request.recipient)?;
        let amount = scale_amount(request.amount, source.decimals)?;

        let call = match direction {
            Direction::RelayToPara { para_id } => XcmCall::TeleportToPara {
                para_id,
                beneficiary,
                amount,
            },
            Direction::ParaToRelay => XcmCall::TeleportToRelay { beneficiary, amount },
        };
        let handle = registry.get(&source.name)?;
        tracing::debug!(
            from = %source.name,
            to = %destination.name,
            ?direction,
            amount,
            "planned teleport"
        );

        Ok(TeleportPlan {
            handle,
            direction,
            call: RuntimeCall::Xcm(call),
        })
    }

    pub async fn execute(plan: TeleportPlan, keypair: &Keypair) -> Result<TransactionOutcome> {
        calls::submit(&plan.handle, keypair, plan.call).await
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn relay(name: &str) -> ChainConfig {
        ChainConfig::relay(name, "ws://relay")
    }

    fn para(name: &str, id: u32) -> ChainConfig {
        ChainConfig::para(name, "ws://para", id)
    }

    #[test]
    fn only_relay_para_pairs_route() {
        assert_eq!(
            route(&relay("relay"), &para("para", 1000)).unwrap(),
            Direction::RelayToPara { para_id: 1000 }
        );
        assert_eq!(route(&para("para", 1000), &relay("relay")).unwrap(), Direction::ParaToRelay);

        let invalid = [
            (relay("relay"), relay("relay2")),
            (para("para", 1000), para("para2", 2000)),
            (relay("relay"), relay("relay")),
            (para("para", 1000), para("para", 1000)),
        ];
        for (from, to) in invalid {
            assert!(
                matches!(route(&from, &to), Err(AgentError::InvalidRoute { .. })),
                "{} -> {} should not route",
                from.name,
                to.name
            );
        }
    }

    #[test]
    fn scaling_truncates_extra_digits() {
        let d = |s: &str| Decimal::from_str(s).unwrap();
        assert_eq!(scale_amount(d("1"), 12).unwrap(), 1_000_000_000_000);
        assert_eq!(scale_amount(d("0.5"), 12).unwrap(), 500_000_000_000);
        assert_eq!(scale_amount(d("1.0000000000019"), 12).unwrap(), 1_000_000_000_001);
        assert_eq!(scale_amount(d("2.5"), 10).unwrap(), 25_000_000_000);
        assert_eq!(
            scale_amount(d("1"), crate::config::MAX_DECIMALS).unwrap(),
            10_000_000_000_000_000_000
        );
    }

    #[test]
    fn scaling_rejects_bad_amounts() {
        let d = |s: &str| Decimal::from_str(s).unwrap();
        for amount in ["0", "-1", "0.0000000000001"] {
            assert!(matches!(
                scale_amount(d(amount), 12),
                Err(AgentError::InvalidParameter(_))
            ));
        }
        assert!(scale_amount(Decimal::MAX, 12).is_err());
    }

    #[test]
    fn request_accepts_camel_case_fields() {
        let request: TransferRequest = serde_json::from_str(
            r#"{"sourceChain":"relay","destinationChain":"para","amount":"1.5","address":"x"}"#,
        )
        .unwrap();
        assert_eq!(request.source_chain, "relay");
        assert_eq!(request.amount, Decimal::from_str("1.5").unwrap());
        assert_eq!(request.recipient, "x");
    }
}
