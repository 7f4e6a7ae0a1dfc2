//! Error types for the client.

use crate::api_client::ApiClientError;
use crate::cache::QueryKey;
use crate::config::ConfigError;
use crate::gateway::GatewayError;
use campus_core::ValidationError;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ClientError {
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Cached value for {key:?} has the wrong shape")]
    UnexpectedValue { key: QueryKey },
    #[error("Query {key:?} was dropped before it completed")]
    Superseded { key: QueryKey },
}

impl ClientError {
    /// Alert text for a failed user action, falling back to `fallback` when
    /// the error carries nothing more useful.
    pub fn alert_text(&self, fallback: &str) -> String {
        match self {
            ClientError::NotAuthenticated => self.to_string(),
            ClientError::Validation(err) => err.user_message(),
            ClientError::Gateway(GatewayError::Rejected { message, .. }) if !message.is_empty() => {
                message.clone()
            }
            _ => fallback.to_string(),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Top-level error for the binary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiClientError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("Logging setup failed: {0}")]
    Telemetry(String),
}
