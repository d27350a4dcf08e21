//! Chat-facing tools over [`XChainAgent`].
//!
//! Each tool takes JSON parameters, calls one agent operation and renders the
//! result as text for a language model. Core errors are passed through
//! unchanged in [`ToolError::Agent`] so the front end can still tell
//! validation mistakes from transient failures.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    agent::XChainAgent,
    calls::RuntimeCall,
    error::AgentError,
    proxy::ProxiedCall,
    xcm::TransferRequest,
};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error(transparent)]
    Agent(#[from] AgentError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> String;

    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError>;
}

fn parse<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T, ToolError> {
    serde_json::from_value(params).map_err(|e| ToolError::InvalidParameters(e.to_string()))
}

/// The full tool set for one agent.
pub fn all(agent: Arc<XChainAgent>) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(CheckBalanceTool::new(agent.clone())),
        Box::new(CheckProxiesTool::new(agent.clone())),
        Box::new(XcmTransferTool::new(agent.clone())),
        Box::new(ProxyActionTool::new(agent)),
    ]
}

// ---------------------------------------------------------------------------
// check_balance
// ---------------------------------------------------------------------------

pub struct CheckBalanceTool {
    agent: Arc<XChainAgent>,
}

impl CheckBalanceTool {
    pub fn new(agent: Arc<XChainAgent>) -> Self {
        Self { agent }
    }
}

#[derive(Deserialize)]
struct ChainParams {
    #[serde(alias = "chainName")]
    chain: Option<String>,
}

#[async_trait]
impl Tool for CheckBalanceTool {
    fn name(&self) -> &str {
        "check_balance"
    }

    fn description(&self) -> String {
        "Check the balance of the agent's account on a specific chain".to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "chain": {
                    "type": "string",
                    "description": "The chain to check the balance on (e.g. 'westend', 'westend_asset_hub')"
                }
            },
            "required": ["chain"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let chain = parse::<ChainParams>(params)?
            .chain
            .ok_or_else(|| ToolError::InvalidParameters("missing 'chain'".into()))?;
        let balance = self.agent.check_balance(&chain).await?;
        Ok(ToolOutput::text(format!(
            "Balance on {chain}: {}",
            balance.round_dp(4)
        )))
    }
}

// ---------------------------------------------------------------------------
// check_proxies
// ---------------------------------------------------------------------------

pub struct CheckProxiesTool {
    agent: Arc<XChainAgent>,
}

impl CheckProxiesTool {
    pub fn new(agent: Arc<XChainAgent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Tool for CheckProxiesTool {
    fn name(&self) -> &str {
        "check_proxies"
    }

    fn description(&self) -> String {
        "Check proxy accounts of the agent on a specific chain. Defaults to the first configured chain."
            .to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "chainName": {
                    "type": "string",
                    "description": "The chain to inspect"
                }
            }
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let requested = parse::<ChainParams>(params)?.chain;
        let chain = match requested {
            Some(chain) => chain,
            None => self
                .agent
                .chains()
                .first()
                .map(|c| c.name.clone())
                .ok_or_else(|| ToolError::InvalidParameters("no chains configured".into()))?,
        };
        if self.agent.chains().resolve(&chain).is_none() {
            return Err(AgentError::UnknownChain(chain).into());
        }

        let proxies = self.agent.check_proxies(&chain).await?;
        if proxies.is_empty() {
            return Ok(ToolOutput::text(format!("No proxy found on {chain}")));
        }

        let prefix = self.agent.identity().ss58_prefix();
        let rendered: Vec<Value> = proxies
            .iter()
            .map(|p| {
                json!({
                    "delegate": p.delegate.to_ss58(prefix),
                    "proxyType": p.proxy_type,
                    "delay": p.delay,
                })
            })
            .collect();
        let body = serde_json::to_string_pretty(&rendered)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;
        Ok(ToolOutput::text(format!("Proxy info on {chain}: {body}")))
    }
}

// ---------------------------------------------------------------------------
// xcm_transfer
// ---------------------------------------------------------------------------

pub struct XcmTransferTool {
    agent: Arc<XChainAgent>,
}

impl XcmTransferTool {
    pub fn new(agent: Arc<XChainAgent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Tool for XcmTransferTool {
    fn name(&self) -> &str {
        "xcm_transfer"
    }

    fn description(&self) -> String {
        let chains: Vec<&str> = self.agent.chains().names().collect();
        format!(
            "Transfer tokens between a relay chain and its parachains using XCM teleports. \
             Available chains: {}",
            chains.join(", ")
        )
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sourceChain": { "type": "string" },
                "destinationChain": { "type": "string" },
                "amount": {
                    "type": "string",
                    "description": "Amount in whole tokens, e.g. '1.5'"
                },
                "recipient": {
                    "type": "string",
                    "description": "SS58 address to credit on the destination chain"
                }
            },
            "required": ["sourceChain", "destinationChain", "amount", "recipient"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let request: TransferRequest = parse(params)?;
        let outcome = self.agent.transfer(&request).await?;
        Ok(ToolOutput::text(format!(
            "XCM transfer initiated. Transaction hash: {}",
            outcome.hash
        )))
    }
}

// ---------------------------------------------------------------------------
// proxy_action
// ---------------------------------------------------------------------------

pub struct ProxyActionTool {
    agent: Arc<XChainAgent>,
}

impl ProxyActionTool {
    pub fn new(agent: Arc<XChainAgent>) -> Self {
        Self { agent }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProxyActionParams {
    action: String,
    #[serde(alias = "chainName")]
    chain: String,
    delegate: Option<String>,
    address: Option<String>,
    call: Option<RuntimeCall>,
}

#[async_trait]
impl Tool for ProxyActionTool {
    fn name(&self) -> &str {
        "proxy_action"
    }

    fn description(&self) -> String {
        "Manage proxy delegation: 'addProxy' or 'removeProxy' for a delegate, or \
         'callAsProxy' to dispatch a call on behalf of another account"
            .to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ["addProxy", "removeProxy", "callAsProxy"] },
                "chain": { "type": "string" },
                "delegate": { "type": "string", "description": "SS58 address of the delegate" },
                "address": { "type": "string", "description": "Account to act for (callAsProxy)" },
                "call": { "type": "object", "description": "Runtime call to dispatch (callAsProxy)" }
            },
            "required": ["action", "chain"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let params: ProxyActionParams = parse(params)?;
        let require_delegate = || {
            params.delegate.clone().ok_or_else(|| {
                ToolError::InvalidParameters(format!("delegate address is required for {}", params.action))
            })
        };

        let outcome = match params.action.as_str() {
            "addProxy" => self.agent.create_proxy(&params.chain, &require_delegate()?).await?,
            "removeProxy" => self.agent.remove_proxy(&params.chain, &require_delegate()?).await?,
            "callAsProxy" => {
                let request = ProxiedCall {
                    on_behalf_of: params.address.clone(),
                    call: params.call.clone(),
                };
                self.agent.call_as_proxy(&params.chain, request).await?
            }
            other => {
                return Err(ToolError::InvalidParameters(format!("invalid action {other:?}")));
            }
        };
        Ok(ToolOutput::text(format!(
            "{} submitted. Transaction hash: {}",
            params.action, outcome.hash
        )))
    }
}
