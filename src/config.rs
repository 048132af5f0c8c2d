//! Process configuration.
//!
//! All environment access happens here, once, at startup. Everything
//! downstream receives an explicit `Config` (or a piece of it) rather than
//! reading the environment ambiently.

use std::net::SocketAddr;

use thiserror::Error;

use crate::poll::PollConfig;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {var} has invalid value: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Everything the process needs, resolved once in `main`.
#[derive(Debug, Clone)]
pub struct Config {
    /// GraphQL endpoint of the signing service.
    pub api_url: String,
    /// Bearer token for the signing service.
    pub api_token: String,
    /// Shared secret for webhook signature verification. When absent,
    /// verification is skipped (development mode).
    pub webhook_secret: Option<Vec<u8>>,
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Default sandbox flag for newly created documents.
    pub sandbox_default: bool,
    pub poll: PollConfig,
}

impl Config {
    /// Reads configuration from the environment.
    ///
    /// Required: `SIGNTRACK_API_URL`, `SIGNTRACK_API_TOKEN`.
    /// Optional: `SIGNTRACK_WEBHOOK_SECRET`, `SIGNTRACK_BIND_ADDR`,
    /// `SIGNTRACK_SANDBOX`, plus the poll variables read by
    /// [`PollConfig::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url =
            std::env::var("SIGNTRACK_API_URL").map_err(|_| ConfigError::Missing("SIGNTRACK_API_URL"))?;
        let api_token = std::env::var("SIGNTRACK_API_TOKEN")
            .map_err(|_| ConfigError::Missing("SIGNTRACK_API_TOKEN"))?;

        let webhook_secret = std::env::var("SIGNTRACK_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.into_bytes());

        let bind_addr = std::env::var("SIGNTRACK_BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|err| ConfigError::Invalid {
                var: "SIGNTRACK_BIND_ADDR",
                reason: err.to_string(),
            })?;

        let sandbox_default = std::env::var("SIGNTRACK_SANDBOX")
            .map(|s| matches!(s.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Config {
            api_url,
            api_token,
            webhook_secret,
            bind_addr,
            sandbox_default,
            poll: PollConfig::from_env(),
        })
    }
}
