// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error("invalid listen endpoint {endpoint}: {details}")]
    InvalidListen { endpoint: String, details: String },

    #[error("invalid token endpoint URL {endpoint}: {details}")]
    InvalidTokenEndpointUrl { endpoint: String, details: String },

    #[error(
        "unexpected token endpoint format {endpoint}: must end with {suffix}",
        suffix = crate::REALM_TOKEN_SUFFIX
    )]
    TokenEndpointSuffix { endpoint: String },

    #[error(
        "unknown mode {0:?}: must be one of: access_token_exchanger, access_token_validator_with_decision"
    )]
    UnknownMode(String),
}
