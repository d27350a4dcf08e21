//! Agent configuration.
//!
//! Network metadata and tuning live in a TOML file; credentials are never
//! read from it and must be attached by the caller with
//! [`AgentConfig::with_credentials`].

use std::{collections::HashSet, path::Path, time::Duration};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AgentError, Result},
    registry::BootstrapPolicy,
    retry::RetryPolicy,
};

/// Generic substrate address format, used by Westend.
pub const DEFAULT_SS58_PREFIX: u16 = 42;
pub const DEFAULT_DECIMALS: u32 = 12;
/// Largest token precision whose unit (`10^decimals`) fits in a `u64`.
pub const MAX_DECIMALS: u32 = 19;
pub const DEFAULT_PROXY_PALLET: &str = "Proxy";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainType {
    RelayChain,
    ParaChain,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub chain_type: ChainType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub para_id: Option<u32>,
    /// Alternative names the chain can be addressed by.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Pallet that provides proxy delegation on this network.
    #[serde(default = "default_proxy_pallet")]
    pub proxy_pallet: String,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

fn default_proxy_pallet() -> String {
    DEFAULT_PROXY_PALLET.to_string()
}

fn default_decimals() -> u32 {
    DEFAULT_DECIMALS
}

impl ChainConfig {
    pub fn relay(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            chain_type: ChainType::RelayChain,
            para_id: None,
            aliases: Vec::new(),
            proxy_pallet: default_proxy_pallet(),
            decimals: DEFAULT_DECIMALS,
        }
    }

    pub fn para(name: impl Into<String>, url: impl Into<String>, para_id: u32) -> Self {
        Self {
            chain_type: ChainType::ParaChain,
            para_id: Some(para_id),
            ..Self::relay(name, url)
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_relay(&self) -> bool {
        self.chain_type == ChainType::RelayChain
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AgentError::Config("chain name must not be empty".into()));
        }
        if self.url.trim().is_empty() {
            return Err(AgentError::Config(format!("chain {} has no url", self.name)));
        }
        if self.proxy_pallet.trim().is_empty() {
            return Err(AgentError::Config(format!("chain {} has no proxy pallet", self.name)));
        }
        if self.decimals > MAX_DECIMALS {
            return Err(AgentError::Config(format!(
                "chain {} declares {} decimals, at most {MAX_DECIMALS} are supported",
                self.name, self.decimals
            )));
        }
        match (self.chain_type, self.para_id) {
            (ChainType::ParaChain, None) => Err(AgentError::Config(format!(
                "parachain {} requires a para_id",
                self.name
            ))),
            (ChainType::RelayChain, Some(_)) => Err(AgentError::Config(format!(
                "relay chain {} must not declare a para_id",
                self.name
            ))),
            _ => Ok(()),
        }
    }
}

/// Ordered set of configured chains, addressable by name or alias.
#[derive(Clone, Debug, Default)]
pub struct ChainMap {
    chains: Vec<ChainConfig>,
}

impl ChainMap {
    pub fn new(chains: Vec<ChainConfig>) -> Result<Self> {
        let mut seen = HashSet::new();
        for chain in &chains {
            chain.validate()?;
            for key in std::iter::once(&chain.name).chain(&chain.aliases) {
                if !seen.insert(key.as_str()) {
                    return Err(AgentError::Config(format!("chain name {key:?} is used twice")));
                }
            }
        }
        Ok(Self { chains })
    }

    pub fn resolve(&self, name: &str) -> Option<&ChainConfig> {
        self.chains
            .iter()
            .find(|c| c.name == name || c.aliases.iter().any(|a| a == name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.chains.iter().map(|c| c.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainConfig> {
        self.chains.iter()
    }

    pub fn first(&self) -> Option<&ChainConfig> {
        self.chains.first()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Westend relay chain and its asset hub.
    pub fn westend() -> Self {
        Self {
            chains: vec![
                ChainConfig::relay("westend", "wss://westend-rpc.dwellir.com")
                    .with_aliases(["westend2"]),
                ChainConfig::para("westend_asset_hub", "wss://westmint-rpc-tn.dwellir.com", 1000)
                    .with_aliases(["westend2_asset_hub"]),
            ],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub timeout_secs: u64,
    pub policy: BootstrapPolicy,
}

impl BootstrapConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            policy: BootstrapPolicy::AbortOnFailure,
        }
    }
}

/// Secret keys, hex encoded. Never serialized.
#[derive(Clone, Debug, Default)]
pub struct Credentials {
    pub primary: Option<SecretString>,
    pub delegate: Option<SecretString>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    pub chains: Vec<ChainConfig>,
    #[serde(default = "default_ss58_prefix")]
    pub ss58_prefix: u16,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(skip)]
    pub credentials: Credentials,
}

fn default_ss58_prefix() -> u16 {
    DEFAULT_SS58_PREFIX
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            chains: ChainMap::westend().chains,
            ss58_prefix: DEFAULT_SS58_PREFIX,
            retry: RetryPolicy::default(),
            bootstrap: BootstrapConfig::default(),
            credentials: Credentials::default(),
        }
    }
}

impl AgentConfig {
    pub fn new(chains: Vec<ChainConfig>) -> Self {
        Self {
            chains,
            ..Default::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AgentError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> eyre::Result<Self> {
        use eyre::WrapErr;

        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&content).wrap_err_with(|| format!("parsing {}", path.display()))
    }

    /// Attaches credentials. Blank strings count as absent.
    pub fn with_credentials(mut self, primary: Option<String>, delegate: Option<String>) -> Self {
        let secret = |s: Option<String>| {
            s.filter(|s| !s.trim().is_empty())
                .map(SecretString::from)
        };
        self.credentials = Credentials {
            primary: secret(primary),
            delegate: secret(delegate),
        };
        self
    }

    pub fn chain_map(&self) -> Result<ChainMap> {
        ChainMap::new(self.chains.clone())
    }
}
