//! Live network sessions, one per chain name.
//!
//! The registry is the only owner allowed to open or close sessions. It is
//! mutated through `&mut self`, so a caller sharing it across tasks must put
//! it behind a lock; [`crate::agent::XChainAgent`] uses an async `RwLock`,
//! which also means only one bootstrap runs at a time.
//!
//! Closing sessions while another task still has a request in flight on one
//! of them is not guarded against. Callers must drain in-flight operations
//! before calling [`ConnectionRegistry::close_all`].

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    chain::{ChainConnector, ChainSession},
    config::ChainConfig,
    error::{AgentError, Result},
    retry::with_timeout,
};

/// A shared reference to an open session.
#[derive(Clone)]
pub struct ConnectionHandle {
    config: Arc<ChainConfig>,
    session: Arc<dyn ChainSession>,
    closed: Arc<AtomicBool>,
}

impl ConnectionHandle {
    fn new(config: ChainConfig, session: Arc<dyn ChainSession>) -> Self {
        Self {
            config: Arc::new(config),
            session,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn chain_name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The underlying session, unless the handle has been closed.
    pub fn session(&self) -> Result<Arc<dyn ChainSession>> {
        if self.is_closed() {
            return Err(AgentError::Connection {
                chain: self.config.name.clone(),
                reason: "connection handle is closed".into(),
            });
        }
        Ok(self.session.clone())
    }

    /// Whether both handles refer to the same opened session.
    pub fn same_as(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.closed, &other.closed)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.session.disconnect().await;
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("chain", &self.config.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// What to do when one network of a bootstrap batch cannot be opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPolicy {
    /// Close everything the batch opened and fail.
    #[default]
    AbortOnFailure,
    /// Keep the networks that opened and report the rest.
    ContinueOnFailure,
}

#[derive(Debug, Default)]
pub struct BootstrapReport {
    pub opened: Vec<String>,
    pub failed: Vec<(String, AgentError)>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    handles: HashMap<String, ConnectionHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session for `config` and registers it under `config.name`.
    pub async fn open(
        &mut self,
        config: &ChainConfig,
        connector: &dyn ChainConnector,
    ) -> Result<ConnectionHandle> {
        self.open_within(config, connector, None).await
    }

    async fn open_within(
        &mut self,
        config: &ChainConfig,
        connector: &dyn ChainConnector,
        timeout: Option<Duration>,
    ) -> Result<ConnectionHandle> {
        if self.handles.contains_key(&config.name) {
            return Err(AgentError::DuplicateConnection {
                chain: config.name.clone(),
            });
        }

        let connect = async {
            connector
                .connect(config)
                .await
                .map_err(|e| AgentError::Connection {
                    chain: config.name.clone(),
                    reason: e.to_string(),
                })
        };
        let session = match timeout {
            Some(after) => with_timeout(after, &format!("connecting to {}", config.name), connect).await?,
            None => connect.await?,
        };

        let handle = ConnectionHandle::new(config.clone(), session);
        self.handles.insert(config.name.clone(), handle.clone());
        tracing::info!(chain = %config.name, url = %config.url, "connected");
        Ok(handle)
    }

    pub fn get(&self, chain: &str) -> Result<ConnectionHandle> {
        self.handles
            .get(chain)
            .cloned()
            .ok_or_else(|| AgentError::NotFound {
                chain: chain.to_string(),
            })
    }

    pub fn contains(&self, chain: &str) -> bool {
        self.handles.contains_key(chain)
    }

    pub fn chain_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handles.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Disconnects and forgets every session. Safe to call when empty.
    pub async fn close_all(&mut self) {
        for (chain, handle) in self.handles.drain() {
            handle.close().await;
            tracing::info!(%chain, "disconnected");
        }
    }

    /// Opens every chain in order, each raced against `timeout`.
    ///
    /// Under [`BootstrapPolicy::AbortOnFailure`] the first failure closes every
    /// handle this call opened and is returned; handles registered before the
    /// call are left alone.
    pub async fn bootstrap(
        &mut self,
        chains: &[ChainConfig],
        connector: &dyn ChainConnector,
        timeout: Duration,
        policy: BootstrapPolicy,
    ) -> Result<BootstrapReport> {
        let mut report = BootstrapReport::default();

        for config in chains {
            match self.open_within(config, connector, Some(timeout)).await {
                Ok(_) => report.opened.push(config.name.clone()),
                Err(err) => {
                    tracing::warn!(chain = %config.name, error = %err, "failed to open connection");
                    match policy {
                        BootstrapPolicy::AbortOnFailure => {
                            self.rollback(&report.opened).await;
                            return Err(err);
                        }
                        BootstrapPolicy::ContinueOnFailure => {
                            report.failed.push((config.name.clone(), err))
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    async fn rollback(&mut self, opened: &[String]) {
        for chain in opened {
            if let Some(handle) = self.handles.remove(chain) {
                handle.close().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devnet::Devnet;

    fn chains() -> Vec<ChainConfig> {
        vec![
            ChainConfig::relay("relay", "ws://relay"),
            ChainConfig::para("para", "ws://para", 1000),
            ChainConfig::para("para2", "ws://para2", 2000),
        ]
    }

    #[tokio::test]
    async fn open_then_get_returns_same_handle() {
        let chains = chains();
        let devnet = Devnet::new(&chains);
        let mut registry = ConnectionRegistry::new();

        let opened = registry.open(&chains[0], &devnet).await.unwrap();
        let found = registry.get("relay").unwrap();
        assert!(opened.same_as(&found));
        assert!(!opened.same_as(&registry.open(&chains[1], &devnet).await.unwrap()));
    }

    #[tokio::test]
    async fn duplicate_open_keeps_existing_handle() {
        let chains = chains();
        let devnet = Devnet::new(&chains);
        let mut registry = ConnectionRegistry::new();

        let first = registry.open(&chains[0], &devnet).await.unwrap();
        let err = registry.open(&chains[0], &devnet).await.unwrap_err();

        assert!(matches!(err, AgentError::DuplicateConnection { ref chain } if chain == "relay"));
        assert!(registry.get("relay").unwrap().same_as(&first));
        assert!(!first.is_closed());
        assert_eq!(devnet.connect_count("relay"), 1);
    }

    #[tokio::test]
    async fn failed_open_registers_nothing() {
        let chains = chains();
        let devnet = Devnet::new(&chains);
        devnet.set_unreachable("relay", true);
        let mut registry = ConnectionRegistry::new();

        let err = registry.open(&chains[0], &devnet).await.unwrap_err();
        assert!(matches!(err, AgentError::Connection { ref chain, .. } if chain == "relay"));
        assert!(matches!(registry.get("relay"), Err(AgentError::NotFound { .. })));
    }

    #[tokio::test]
    async fn abort_policy_rolls_back_the_batch() {
        let chains = chains();
        let devnet = Devnet::new(&chains);
        devnet.set_unreachable("para2", true);
        let mut registry = ConnectionRegistry::new();

        let err = registry
            .bootstrap(&chains, &devnet, Duration::from_secs(5), BootstrapPolicy::AbortOnFailure)
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Connection { ref chain, .. } if chain == "para2"));
        assert!(registry.is_empty());
        assert_eq!(devnet.open_sessions("relay"), 0);
        assert_eq!(devnet.open_sessions("para"), 0);
    }

    #[tokio::test]
    async fn continue_policy_keeps_healthy_chains() {
        let chains = chains();
        let devnet = Devnet::new(&chains);
        devnet.set_unreachable("para", true);
        let mut registry = ConnectionRegistry::new();

        let report = registry
            .bootstrap(&chains, &devnet, Duration::from_secs(5), BootstrapPolicy::ContinueOnFailure)
            .await
            .unwrap();

        assert_eq!(report.opened, vec!["relay", "para2"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "para");
        assert_eq!(registry.chain_names(), vec!["para2", "relay"]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_connections_time_out() {
        let chains = chains();
        let devnet = Devnet::new(&chains);
        devnet.set_connect_delay("para", Duration::from_secs(120));
        let mut registry = ConnectionRegistry::new();

        let err = registry
            .bootstrap(&chains, &devnet, Duration::from_secs(30), BootstrapPolicy::AbortOnFailure)
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Timeout { .. }));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn close_all_is_idempotent() {
        let chains = chains();
        let devnet = Devnet::new(&chains);
        let mut registry = ConnectionRegistry::new();
        registry
            .bootstrap(&chains, &devnet, Duration::from_secs(5), BootstrapPolicy::AbortOnFailure)
            .await
            .unwrap();
        let handle = registry.get("relay").unwrap();

        registry.close_all().await;
        assert!(registry.is_empty());
        registry.close_all().await;
        assert!(registry.is_empty());

        assert!(handle.is_closed());
        assert!(matches!(handle.session(), Err(AgentError::Connection { .. })));
        assert_eq!(devnet.open_sessions("relay"), 0);
    }
}
