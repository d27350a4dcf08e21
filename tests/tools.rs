use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use xchain_agent::{
    devnet::Devnet,
    tools::{self, CheckBalanceTool, CheckProxiesTool, ProxyActionTool, Tool, ToolError, XcmTransferTool},
    AccountId, AgentConfig, AgentError, ChainConfig, XChainAgent,
};

const PRIMARY: &str = "0x0101010101010101010101010101010101010101010101010101010101010101";
const DELEGATE: &str = "0x0202020202020202020202020202020202020202020202020202020202020202";
const UNIT: u128 = 1_000_000_000_000;

fn chains() -> Vec<ChainConfig> {
    vec![
        ChainConfig::relay("westend", "ws://relay").with_aliases(["westend2"]),
        ChainConfig::para("westend_asset_hub", "ws://hub", 1000),
    ]
}

async fn agent() -> (Arc<XChainAgent>, Devnet) {
    let devnet = Devnet::new(&chains());
    let config = AgentConfig::new(chains())
        .with_credentials(Some(PRIMARY.into()), Some(DELEGATE.into()));
    let agent = XChainAgent::new(config, Arc::new(devnet.clone())).await.unwrap();
    devnet.endow("westend", &agent.identity().account(), 12_345_678 * UNIT / 10_000);
    (Arc::new(agent), devnet)
}

#[tokio::test]
async fn registry_exposes_four_tools() {
    let (agent, _) = agent().await;
    let names: Vec<String> = tools::all(agent).iter().map(|t| t.name().to_string()).collect();
    assert_eq!(
        names,
        ["check_balance", "check_proxies", "xcm_transfer", "proxy_action"]
    );
}

#[tokio::test]
async fn balance_is_rounded_to_four_places() {
    let (agent, _) = agent().await;
    let out = CheckBalanceTool::new(agent)
        .execute(json!({ "chain": "westend" }))
        .await
        .unwrap();
    assert_eq!(out.content, "Balance on westend: 1234.5678");
}

#[tokio::test]
async fn balance_requires_a_chain() {
    let (agent, _) = agent().await;
    let err = CheckBalanceTool::new(agent).execute(json!({})).await.unwrap_err();
    assert!(matches!(err, ToolError::InvalidParameters(_)));
}

#[tokio::test]
async fn proxies_default_to_the_first_chain() {
    let (agent, _) = agent().await;
    let out = CheckProxiesTool::new(agent).execute(json!({})).await.unwrap();
    assert_eq!(out.content, "No proxy found on westend");
}

#[tokio::test]
async fn proxies_reject_unknown_chains() {
    let (agent, _) = agent().await;
    let err = CheckProxiesTool::new(agent)
        .execute(json!({ "chainName": "kusama" }))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Agent(AgentError::UnknownChain(ref c)) if c == "kusama"));
}

#[tokio::test]
async fn proxy_action_adds_then_lists() {
    let (agent, _) = agent().await;
    let delegate = agent.delegate_address().unwrap().to_string();

    let out = ProxyActionTool::new(agent.clone())
        .execute(json!({ "action": "addProxy", "chain": "westend", "delegate": delegate }))
        .await
        .unwrap();
    assert!(out.content.starts_with("addProxy submitted. Transaction hash: 0x"));

    let out = CheckProxiesTool::new(agent)
        .execute(json!({ "chainName": "westend" }))
        .await
        .unwrap();
    assert!(out.content.starts_with("Proxy info on westend: "));
    assert!(out.content.contains(&delegate));
}

#[tokio::test]
async fn proxy_action_rejects_unknown_actions() {
    let (agent, devnet) = agent().await;
    let err = ProxyActionTool::new(agent)
        .execute(json!({ "action": "nukeProxy", "chain": "westend" }))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::InvalidParameters(_)));
    assert!(devnet.submitted("westend").is_empty());
}

#[tokio::test]
async fn proxy_action_needs_a_delegate_for_grants() {
    let (agent, _) = agent().await;
    let err = ProxyActionTool::new(agent)
        .execute(json!({ "action": "removeProxy", "chain": "westend" }))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::InvalidParameters(_)));
}

#[tokio::test]
async fn call_as_proxy_without_call_is_invalid() {
    let (agent, _) = agent().await;
    let err = ProxyActionTool::new(agent)
        .execute(json!({
            "action": "callAsProxy",
            "chain": "westend",
            "address": AccountId([3u8; 32]).to_ss58(42),
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Agent(AgentError::InvalidParameter(_))));
}

#[tokio::test]
async fn xcm_transfer_reports_the_hash() {
    let (agent, devnet) = agent().await;
    let recipient = AccountId([6u8; 32]);
    let out = XcmTransferTool::new(agent)
        .execute(json!({
            "sourceChain": "westend2",
            "destinationChain": "westend_asset_hub",
            "amount": "2",
            "recipient": recipient.to_ss58(42),
        }))
        .await
        .unwrap();

    let hash = devnet.submitted("westend")[0].hash();
    assert_eq!(out.content, format!("XCM transfer initiated. Transaction hash: {hash}"));
    assert_eq!(devnet.free_balance("westend_asset_hub", &recipient), 2 * UNIT);
}

#[tokio::test]
async fn xcm_transfer_between_relays_is_refused() {
    let (agent, _) = agent().await;
    let err = XcmTransferTool::new(agent)
        .execute(json!({
            "sourceChain": "westend",
            "destinationChain": "westend2",
            "amount": "1",
            "recipient": AccountId([6u8; 32]).to_ss58(42),
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Agent(AgentError::InvalidRoute { .. })));
}

#[tokio::test]
async fn xcm_transfer_lists_chains_in_its_description() {
    let (agent, _) = agent().await;
    let description = XcmTransferTool::new(agent).description();
    assert!(description.contains("westend"));
    assert!(description.contains("westend_asset_hub"));
}
