// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Configuration surface of the tollgate ext_authz sidecar.
//!
//! The configuration is loaded from a YAML file once at startup and validated
//! before any component is constructed. Everything downstream can assume a
//! well-formed configuration.

pub mod errors;
pub mod mode;
pub mod observability;

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

pub use errors::ConfigError;
pub use mode::Mode;
pub use observability::TracingConfig;

/// Fixed path suffix of a realm token endpoint. The authorization-server
/// base URL is recovered by stripping this suffix, so any configured
/// endpoint that does not end with it is rejected outright.
pub const REALM_TOKEN_SUFFIX: &str = "/protocol/openid-connect/token";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TollgateConfig {
    /// Address the ext_authz gRPC server listens on.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Authorization strategy for proxied requests.
    #[serde(default)]
    pub mode: Mode,

    /// Audience (OAuth scope) requested for the exchanged token. Required
    /// in access_token_exchanger mode, unused otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downstream_audience: Option<String>,

    /// Client id this sidecar presents to the authorization server. Also
    /// the audience expected in caller tokens when validating.
    pub client_audience: String,

    /// Realm token endpoint of the authorization server.
    pub token_endpoint: String,

    /// SPIFFE Workload API socket used to fetch client assertions.
    #[serde(default = "default_workload_socket")]
    pub workload_socket: String,

    /// Limit on concurrent streams per gRPC connection.
    #[serde(default = "default_max_concurrent_streams")]
    pub max_concurrent_streams: u32,

    /// Seconds granted to in-flight checks on shutdown before a forced stop.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    /// Client-side timeout in seconds for calls to the authorization server.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Tracing subscriber configuration.
    #[serde(default)]
    pub tracing: TracingConfig,
}

fn default_listen() -> String {
    "0.0.0.0:9021".to_string()
}

fn default_workload_socket() -> String {
    "unix:///run/spire/sockets/agent.sock".to_string()
}

fn default_max_concurrent_streams() -> u32 {
    10
}

fn default_drain_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl TollgateConfig {
    /// Load and validate a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: TollgateConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check all construction-time invariants. Run once at load; the rest
    /// of the system assumes a validated configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidListen {
                endpoint: self.listen.clone(),
                details: e.to_string(),
            })?;

        if self.client_audience.is_empty() {
            return Err(ConfigError::MissingField {
                field: "client_audience",
            });
        }

        if self.token_endpoint.is_empty() {
            return Err(ConfigError::MissingField {
                field: "token_endpoint",
            });
        }
        Url::parse(&self.token_endpoint).map_err(|e| ConfigError::InvalidTokenEndpointUrl {
            endpoint: self.token_endpoint.clone(),
            details: e.to_string(),
        })?;
        if !self
            .token_endpoint
            .to_lowercase()
            .ends_with(REALM_TOKEN_SUFFIX)
        {
            return Err(ConfigError::TokenEndpointSuffix {
                endpoint: self.token_endpoint.clone(),
            });
        }

        if self.mode == Mode::TokenExchanger
            && self
                .downstream_audience
                .as_deref()
                .is_none_or(|a| a.is_empty())
        {
            return Err(ConfigError::MissingField {
                field: "downstream_audience",
            });
        }

        Ok(())
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_EXCHANGER: &str = r#"
client_audience: frontend
downstream_audience: backend
token_endpoint: https://keycloak.example.com/realms/demo/protocol/openid-connect/token
"#;

    const MINIMAL_VALIDATOR: &str = r#"
mode: access_token_validator_with_decision
client_audience: backend
token_endpoint: https://keycloak.example.com/realms/demo/protocol/openid-connect/token
"#;

    #[test]
    fn test_exchanger_config_with_defaults() {
        let config = TollgateConfig::from_yaml(MINIMAL_EXCHANGER).unwrap();
        assert_eq!(config.mode, Mode::TokenExchanger);
        assert_eq!(config.listen, "0.0.0.0:9021");
        assert_eq!(config.workload_socket, "unix:///run/spire/sockets/agent.sock");
        assert_eq!(config.max_concurrent_streams, 10);
        assert_eq!(config.drain_timeout(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_validator_config_needs_no_downstream_audience() {
        let config = TollgateConfig::from_yaml(MINIMAL_VALIDATOR).unwrap();
        assert_eq!(config.mode, Mode::ValidatorWithDecision);
        assert!(config.downstream_audience.is_none());
    }

    #[test]
    fn test_exchanger_requires_downstream_audience() {
        let yaml = r#"
client_audience: frontend
token_endpoint: https://keycloak.example.com/realms/demo/protocol/openid-connect/token
"#;
        let err = TollgateConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField {
                field: "downstream_audience"
            }
        ));
    }

    #[test]
    fn test_client_audience_is_always_required() {
        let yaml = r#"
client_audience: ""
token_endpoint: https://keycloak.example.com/realms/demo/protocol/openid-connect/token
"#;
        let err = TollgateConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField {
                field: "client_audience"
            }
        ));
    }

    #[test]
    fn test_token_endpoint_suffix_is_enforced() {
        let yaml = r#"
client_audience: frontend
downstream_audience: backend
token_endpoint: https://keycloak.example.com/realms/demo/token
"#;
        let err = TollgateConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::TokenEndpointSuffix { .. }));
    }

    #[test]
    fn test_token_endpoint_must_be_a_url() {
        let yaml = r#"
client_audience: frontend
downstream_audience: backend
token_endpoint: not a url/protocol/openid-connect/token
"#;
        let err = TollgateConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTokenEndpointUrl { .. }));
    }

    #[test]
    fn test_listen_endpoint_is_validated() {
        let yaml = r#"
listen: not-an-address
client_audience: frontend
downstream_audience: backend
token_endpoint: https://keycloak.example.com/realms/demo/protocol/openid-connect/token
"#;
        let err = TollgateConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidListen { .. }));
    }

    #[test]
    fn test_unknown_mode_is_a_parse_error() {
        let yaml = r#"
mode: token_minter
client_audience: frontend
token_endpoint: https://keycloak.example.com/realms/demo/protocol/openid-connect/token
"#;
        assert!(matches!(
            TollgateConfig::from_yaml(yaml),
            Err(ConfigError::Parse(_))
        ));
    }
}
