use std::sync::Arc;

use futures_util::future::join_all;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use tokio::sync::RwLock;

use crate::{
    account::{AccountId, AgentIdentity, Keypair},
    calls::{RuntimeCall, TransactionOutcome},
    chain::{self, ChainConnector},
    config::{AgentConfig, ChainMap},
    error::{AgentError, Result},
    proxy::{ProxiedCall, ProxyManager, ProxyRecord},
    registry::{BootstrapReport, ConnectionHandle, ConnectionRegistry},
    retry::with_retry,
    xcm::{TransferRequest, XcmDispatcher},
};

/// One identity connected to every configured chain.
pub struct XChainAgent {
    identity: AgentIdentity,
    chains: ChainMap,
    config: AgentConfig,
    registry: RwLock<ConnectionRegistry>,
}

impl XChainAgent {
    /// Derives the identity and opens a session to every configured chain.
    pub async fn new(config: AgentConfig, connector: Arc<dyn ChainConnector>) -> Result<Self> {
        let primary = config
            .credentials
            .primary
            .as_ref()
            .ok_or(AgentError::MissingCredential("primary private key"))?;
        let keypair = Keypair::from_hex(primary.expose_secret())?;
        let delegate = config
            .credentials
            .delegate
            .as_ref()
            .map(|secret| Keypair::from_hex(secret.expose_secret()))
            .transpose()?;
        let identity = AgentIdentity::from_keypairs(keypair, delegate, config.ss58_prefix);

        let chains = config.chain_map()?;
        if chains.is_empty() {
            return Err(AgentError::Config("no chains configured".into()));
        }

        let mut registry = ConnectionRegistry::new();
        let report = registry
            .bootstrap(
                &config.chains,
                connector.as_ref(),
                config.bootstrap.timeout(),
                config.bootstrap.policy,
            )
            .await?;
        log_report(&report);
        if report.opened.is_empty() {
            // an agent without sessions is a failed start
            return Err(report
                .failed
                .into_iter()
                .next()
                .map(|(_, err)| err)
                .unwrap_or_else(|| AgentError::Config("no chain could be opened".into())));
        }
        tracing::info!(address = %identity.address(), chains = report.opened.len(), "agent ready");

        Ok(Self {
            identity,
            chains,
            config,
            registry: RwLock::new(registry),
        })
    }

    /// [`XChainAgent::new`], retried as a whole with the configured policy.
    pub async fn launch(config: AgentConfig, connector: Arc<dyn ChainConnector>) -> Result<Self> {
        let policy = config.retry;
        with_retry(policy, || Self::new(config.clone(), connector.clone())).await
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn address(&self) -> &str {
        self.identity.address()
    }

    pub fn delegate_address(&self) -> Option<&str> {
        self.identity.delegate_address()
    }

    pub fn chains(&self) -> &ChainMap {
        &self.chains
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Looks up the session for a chain name or alias.
    pub async fn connection(&self, chain: &str) -> Result<ConnectionHandle> {
        let name = self.chains.resolve(chain).map_or(chain, |c| c.name.as_str());
        self.registry.read().await.get(name)
    }

    /// Free balance of the agent's account in whole units.
    pub async fn check_balance(&self, chain: &str) -> Result<Decimal> {
        let handle = self.connection(chain).await?;
        let info = chain::account_info(handle.session()?.as_ref(), &self.identity.account())
            .await
            .map_err(|e| AgentError::from_chain(handle.chain_name(), e))?;

        let free = i128::try_from(info.free)
            .map_err(|_| AgentError::InvalidParameter(format!("balance {} out of range", info.free)))?;
        Decimal::try_from_i128_with_scale(free, handle.config().decimals)
            .map_err(|e| AgentError::InvalidParameter(format!("balance {}: {e}", info.free)))
    }

    /// Balances on every connected chain, queried concurrently.
    pub async fn check_balances(&self) -> Vec<(String, Result<Decimal>)> {
        let names = self.registry.read().await.chain_names();
        let balances = join_all(names.iter().map(|name| self.check_balance(name))).await;
        names.into_iter().zip(balances).collect()
    }

    pub async fn check_proxies(&self, chain: &str) -> Result<Vec<ProxyRecord>> {
        let handle = self.connection(chain).await?;
        ProxyManager::new(&self.identity)
            .proxies(&handle, &self.identity.account())
            .await
    }

    pub async fn proxies_of(&self, chain: &str, who: &AccountId) -> Result<Vec<ProxyRecord>> {
        let handle = self.connection(chain).await?;
        ProxyManager::new(&self.identity).proxies(&handle, who).await
    }

    /// Teleports between a relay chain and one of its parachains. Transport
    /// and transaction failures are retried; validation failures are not.
    pub async fn transfer(&self, request: &TransferRequest) -> Result<TransactionOutcome> {
        with_retry(self.config.retry, || self.transfer_once(request)).await
    }

    async fn transfer_once(&self, request: &TransferRequest) -> Result<TransactionOutcome> {
        let plan = {
            let registry = self.registry.read().await;
            XcmDispatcher::new(&self.chains).plan(&registry, request)?
        };
        XcmDispatcher::execute(plan, self.identity.keypair()).await
    }

    pub async fn create_proxy(&self, chain: &str, delegate: &str) -> Result<TransactionOutcome> {
        let handle = self.connection(chain).await?;
        ProxyManager::new(&self.identity)
            .create_proxy(&handle, delegate)
            .await
    }

    pub async fn remove_proxy(&self, chain: &str, delegate: &str) -> Result<TransactionOutcome> {
        let handle = self.connection(chain).await?;
        ProxyManager::new(&self.identity)
            .remove_proxy(&handle, delegate)
            .await
    }

    pub async fn call_as_proxy(&self, chain: &str, request: ProxiedCall) -> Result<TransactionOutcome> {
        let handle = self.connection(chain).await?;
        ProxyManager::new(&self.identity)
            .call_as_proxy(&handle, request)
            .await
    }

    pub async fn call_as_delegate(&self, chain: &str, call: RuntimeCall) -> Result<TransactionOutcome> {
        let handle = self.connection(chain).await?;
        ProxyManager::new(&self.identity)
            .call_as_delegate(&handle, call)
            .await
    }

    /// Closes every session. In-flight operations must have finished.
    pub async fn disconnect_all(&self) {
        self.registry.write().await.close_all().await;
    }
}

fn log_report(report: &BootstrapReport) {
    for (chain, err) in &report.failed {
        tracing::warn!(%chain, error = %err, "continuing without chain");
    }
}
