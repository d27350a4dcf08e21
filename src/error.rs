use std::time::Duration;

use thiserror::Error;

use crate::chain::ChainError;

pub type Result<T, E = AgentError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("connection to {chain} failed: {reason}")]
    Connection { chain: String, reason: String },

    #[error("a connection for {chain} is already open")]
    DuplicateConnection { chain: String },

    #[error("no connection found for chain: {chain}")]
    NotFound { chain: String },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("chain {0:?} is not configured")]
    UnknownChain(String),

    #[error("no teleport route from {from} to {to}")]
    InvalidRoute { from: String, to: String },

    #[error("transaction failed on {chain}: {reason}")]
    Transaction { chain: String, reason: String },

    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AgentError {
    /// Maps a session-level failure onto the agent taxonomy. Transport
    /// failures belong to the connection, everything else to the transaction.
    pub(crate) fn from_chain(chain: &str, err: ChainError) -> Self {
        match err {
            ChainError::Transport(reason) | ChainError::Closed(reason) => Self::Connection {
                chain: chain.to_string(),
                reason,
            },
            other => Self::Transaction {
                chain: chain.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Classifies errors for [`crate::retry::with_retry`].
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for AgentError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Transaction { .. } | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_not_retryable() {
        let errors = [
            AgentError::MissingCredential("primary key"),
            AgentError::DuplicateConnection { chain: "relay".into() },
            AgentError::NotFound { chain: "relay".into() },
            AgentError::InvalidParameter("amount".into()),
            AgentError::UnknownChain("nowhere".into()),
            AgentError::InvalidRoute {
                from: "relay".into(),
                to: "relay2".into(),
            },
        ];
        for err in errors {
            assert!(!err.is_retryable(), "{err} should not be retried");
        }
    }

    #[test]
    fn chain_errors_map_by_class() {
        let err = AgentError::from_chain("relay", ChainError::Transport("reset".into()));
        assert!(matches!(err, AgentError::Connection { ref chain, .. } if chain == "relay"));
        assert!(err.is_retryable());

        let err = AgentError::from_chain("para", ChainError::Rejected("Stale".into()));
        assert!(matches!(err, AgentError::Transaction { .. }));
        assert!(err.is_retryable());
    }
}
