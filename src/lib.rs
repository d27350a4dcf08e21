//! Multi-chain agent for a relay chain and its parachains.
//!
//! [`XChainAgent`] derives an account from a secret key, keeps one session
//! open per configured chain, manages proxy delegation and teleports the
//! native asset between the relay chain and its parachains. The RPC layer is
//! abstracted behind [`chain::ChainConnector`]; [`devnet::Devnet`] provides an
//! in-process implementation.

pub mod account;
pub mod agent;
pub mod calls;
pub mod chain;
pub mod config;
pub mod devnet;
pub mod error;
pub mod proxy;
pub mod registry;
pub mod retry;
pub mod tools;
pub mod xcm;

pub use account::{AccountId, AgentIdentity, Keypair};
pub use agent::XChainAgent;
pub use calls::{RuntimeCall, TransactionOutcome};
pub use config::{AgentConfig, ChainConfig, ChainMap, ChainType};
pub use error::{AgentError, Result};
pub use proxy::{ProxiedCall, ProxyRecord, ProxyType};
pub use registry::{BootstrapPolicy, ConnectionHandle, ConnectionRegistry};
pub use retry::{with_retry, with_timeout, RetryPolicy};
pub use xcm::TransferRequest;
