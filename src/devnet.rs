//! In-process relay/parachain network.
//!
//! Implements [`ChainConnector`] and [`ChainSession`] over shared in-memory
//! state so the agent can run end to end without a node: balances, proxy
//! records and teleports between the configured chains all behave like the
//! real pallets at the level the agent observes. Failure injection hooks
//! (unreachable chains, slow connects, rejected submissions) drive the
//! retry and bootstrap paths.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    account::AccountId,
    calls::{BalancesCall, ProxyCall, RuntimeCall, SignedExtrinsic, XcmCall},
    chain::{
        AccountInfo, ChainConnector, ChainError, ChainSession, StorageValue, TxHash, ACCOUNT_ITEM,
        PROXIES_ITEM, SYSTEM_PALLET,
    },
    config::ChainConfig,
    proxy::ProxyRecord,
};

struct ChainState {
    config: ChainConfig,
    /// Index of the relay chain a parachain is attached to.
    parent: Option<usize>,
    accounts: HashMap<AccountId, AccountInfo>,
    proxies: HashMap<AccountId, Vec<ProxyRecord>>,
    submitted: Vec<SignedExtrinsic>,
    unreachable: bool,
    connect_delay: Duration,
    failing_submissions: u32,
    connects: usize,
    open_sessions: usize,
    requests: usize,
}

impl ChainState {
    fn new(config: ChainConfig) -> Self {
        Self {
            config,
            parent: None,
            accounts: HashMap::new(),
            proxies: HashMap::new(),
            submitted: Vec::new(),
            unreachable: false,
            connect_delay: Duration::ZERO,
            failing_submissions: 0,
            connects: 0,
            open_sessions: 0,
            requests: 0,
        }
    }

    fn debit(&mut self, who: &AccountId, amount: u128) -> Result<(), String> {
        let account = self.accounts.entry(*who).or_default();
        account.free = account
            .free
            .checked_sub(amount)
            .ok_or_else(|| "Balances.InsufficientBalance".to_string())?;
        Ok(())
    }

    fn credit(&mut self, who: &AccountId, amount: u128) {
        let account = self.accounts.entry(*who).or_default();
        account.free = account.free.saturating_add(amount);
    }
}

/// Chains in configuration order. A parachain is attached to the nearest
/// relay chain configured before it, or to the first relay chain if none is.
#[derive(Default)]
struct State {
    chains: Vec<ChainState>,
}

impl State {
    fn new(configs: &[ChainConfig]) -> Self {
        let mut chains: Vec<ChainState> = configs.iter().cloned().map(ChainState::new).collect();
        let relays: Vec<usize> = chains
            .iter()
            .enumerate()
            .filter(|(_, c)| c.config.is_relay())
            .map(|(i, _)| i)
            .collect();
        for (index, chain) in chains.iter_mut().enumerate() {
            if !chain.config.is_relay() {
                chain.parent = relays
                    .iter()
                    .rev()
                    .find(|&&relay| relay < index)
                    .or(relays.first())
                    .copied();
            }
        }
        Self { chains }
    }

    fn position(&self, name: &str) -> Result<usize, ChainError> {
        self.chains
            .iter()
            .position(|c| c.config.name == name)
            .ok_or_else(|| ChainError::Transport(format!("no devnet chain named {name}")))
    }

    fn chain(&mut self, name: &str) -> Result<&mut ChainState, ChainError> {
        let index = self.position(name)?;
        Ok(&mut self.chains[index])
    }

    fn dispatch(&mut self, source: usize, origin: AccountId, call: &RuntimeCall) -> Result<(), String> {
        match call {
            RuntimeCall::Balances(BalancesCall::TransferKeepAlive { dest, value }) => {
                let state = &mut self.chains[source];
                state.debit(&origin, *value)?;
                state.credit(dest, *value);
                Ok(())
            }
            RuntimeCall::Proxy { pallet, call } => {
                let state = &mut self.chains[source];
                if *pallet != state.config.proxy_pallet {
                    return Err(format!("pallet {pallet} does not exist"));
                }
                match call {
                    ProxyCall::AddProxy {
                        delegate,
                        proxy_type,
                        delay,
                    } => {
                        let record = ProxyRecord {
                            delegate: *delegate,
                            proxy_type: *proxy_type,
                            delay: *delay,
                        };
                        let records = state.proxies.entry(origin).or_default();
                        if records.contains(&record) {
                            return Err(format!("{pallet}.Duplicate"));
                        }
                        records.push(record);
                        Ok(())
                    }
                    ProxyCall::RemoveProxy {
                        delegate,
                        proxy_type,
                        delay,
                    } => {
                        let records = state.proxies.entry(origin).or_default();
                        let before = records.len();
                        records.retain(|r| {
                            !(r.delegate == *delegate && r.proxy_type == *proxy_type && r.delay == *delay)
                        });
                        if records.len() == before {
                            return Err(format!("{pallet}.NotFound"));
                        }
                        Ok(())
                    }
                    ProxyCall::Proxy { real, call, .. } => {
                        let allowed = state
                            .proxies
                            .get(real)
                            .is_some_and(|records| records.iter().any(|r| r.delegate == origin));
                        if !allowed {
                            return Err(format!("{pallet}.NotProxy"));
                        }
                        self.dispatch(source, *real, call)
                    }
                }
            }
            RuntimeCall::Xcm(xcm) => {
                let is_relay = self.chains[source].config.is_relay();
                let (beneficiary, amount, target) = match xcm {
                    XcmCall::TeleportToPara {
                        para_id,
                        beneficiary,
                        amount,
                    } => {
                        if !is_relay {
                            return Err(format!("pallet {} does not exist", xcm.pallet()));
                        }
                        let target = self.chains.iter().position(|c| {
                            c.parent == Some(source) && c.config.para_id == Some(*para_id)
                        });
                        (beneficiary, *amount, target)
                    }
                    XcmCall::TeleportToRelay { beneficiary, amount } => {
                        if is_relay {
                            return Err(format!("pallet {} does not exist", xcm.pallet()));
                        }
                        (beneficiary, *amount, self.chains[source].parent)
                    }
                };
                self.chains[source].debit(&origin, amount)?;

                // teleports to a chain the devnet does not run are burned
                if let Some(target) = target {
                    self.chains[target].credit(beneficiary, amount);
                }
                Ok(())
            }
        }
    }
}

/// A simulated set of networks. Clones share state.
#[derive(Clone, Default)]
pub struct Devnet {
    state: Arc<Mutex<State>>,
}

impl Devnet {
    pub fn new(chains: &[ChainConfig]) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::new(chains))),
        }
    }

    fn with_chain<T: Default>(&self, chain: &str, f: impl FnOnce(&mut ChainState) -> T) -> T {
        let mut state = self.state.lock();
        match state.chains.iter_mut().find(|c| c.config.name == chain) {
            Some(chain) => f(chain),
            None => {
                tracing::warn!(%chain, "devnet has no such chain");
                T::default()
            }
        }
    }

    pub fn endow(&self, chain: &str, who: &AccountId, amount: u128) {
        self.with_chain(chain, |c| c.credit(who, amount))
    }

    pub fn free_balance(&self, chain: &str, who: &AccountId) -> u128 {
        self.with_chain(chain, |c| c.accounts.get(who).map(|a| a.free).unwrap_or_default())
    }

    pub fn proxies(&self, chain: &str, who: &AccountId) -> Vec<ProxyRecord> {
        self.with_chain(chain, |c| c.proxies.get(who).cloned().unwrap_or_default())
    }

    pub fn submitted(&self, chain: &str) -> Vec<SignedExtrinsic> {
        self.with_chain(chain, |c| c.submitted.clone())
    }

    pub fn set_unreachable(&self, chain: &str, unreachable: bool) {
        self.with_chain(chain, |c| c.unreachable = unreachable)
    }

    pub fn set_connect_delay(&self, chain: &str, delay: Duration) {
        self.with_chain(chain, |c| c.connect_delay = delay)
    }

    /// Rejects the next `count` submissions on `chain`.
    pub fn fail_next_submissions(&self, chain: &str, count: u32) {
        self.with_chain(chain, |c| c.failing_submissions = count)
    }

    pub fn connect_count(&self, chain: &str) -> usize {
        self.with_chain(chain, |c| c.connects)
    }

    pub fn open_sessions(&self, chain: &str) -> usize {
        self.with_chain(chain, |c| c.open_sessions)
    }

    /// Queries and submissions served on `chain`.
    pub fn request_count(&self, chain: &str) -> usize {
        self.with_chain(chain, |c| c.requests)
    }
}

#[async_trait]
impl ChainConnector for Devnet {
    async fn connect(&self, chain: &ChainConfig) -> Result<Arc<dyn ChainSession>, ChainError> {
        let delay = {
            let mut state = self.state.lock();
            let target = state.chain(&chain.name)?;
            if target.unreachable {
                return Err(ChainError::Transport(format!("{} is unreachable", chain.url)));
            }
            target.connect_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        let target = state.chain(&chain.name)?;
        target.connects += 1;
        target.open_sessions += 1;

        Ok(Arc::new(DevnetSession {
            chain: chain.name.clone(),
            state: self.state.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct DevnetSession {
    chain: String,
    state: Arc<Mutex<State>>,
    closed: AtomicBool,
}

impl DevnetSession {
    fn ensure_open(&self) -> Result<(), ChainError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChainError::Closed(format!("session to {} was disconnected", self.chain)));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainSession for DevnetSession {
    async fn query(&self, pallet: &str, item: &str, key: &AccountId) -> Result<StorageValue, ChainError> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        let chain = state.chain(&self.chain)?;
        chain.requests += 1;

        if pallet == SYSTEM_PALLET && item == ACCOUNT_ITEM {
            return Ok(StorageValue::Account(
                chain.accounts.get(key).cloned().unwrap_or_default(),
            ));
        }
        if pallet == chain.config.proxy_pallet && item == PROXIES_ITEM {
            return Ok(StorageValue::Proxies {
                records: chain.proxies.get(key).cloned().unwrap_or_default(),
                deposit: 0,
            });
        }
        Err(ChainError::UnknownStorage {
            pallet: pallet.to_string(),
            item: item.to_string(),
        })
    }

    async fn submit_and_watch(&self, extrinsic: SignedExtrinsic) -> Result<TxHash, ChainError> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        let index = state.position(&self.chain)?;
        let chain = &mut state.chains[index];
        chain.requests += 1;

        if chain.failing_submissions > 0 {
            chain.failing_submissions -= 1;
            return Err(ChainError::Rejected("Priority is too low".into()));
        }
        if extrinsic.signature.len() != 65 {
            return Err(ChainError::Rejected("BadProof".into()));
        }
        let nonce = chain
            .accounts
            .get(&extrinsic.signer)
            .map(|a| a.nonce)
            .unwrap_or_default();
        if extrinsic.nonce != nonce {
            return Err(ChainError::Rejected(format!(
                "Stale nonce {}, expected {nonce}",
                extrinsic.nonce
            )));
        }

        state
            .dispatch(index, extrinsic.signer, &extrinsic.call)
            .map_err(ChainError::Rejected)?;

        let chain = &mut state.chains[index];
        chain.accounts.entry(extrinsic.signer).or_default().nonce += 1;
        let hash = extrinsic.hash();
        chain.submitted.push(extrinsic);
        Ok(hash)
    }

    async fn disconnect(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let mut state = self.state.lock();
            if let Some(chain) = state.chains.iter_mut().find(|c| c.config.name == self.chain) {
                chain.open_sessions = chain.open_sessions.saturating_sub(1);
            }
        }
    }
}
