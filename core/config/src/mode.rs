// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Operating modes of the decision server.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Authorization strategy applied to every proxied request.
///
/// The mode is immutable after construction: it selects which branch of the
/// ext_authz check runs and whether an identity source is required at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Mode {
    /// RFC 8693 token exchange: trade the caller's access token for a
    /// downstream-scoped one and rewrite the authorization header.
    #[default]
    #[serde(rename = "access_token_exchanger")]
    TokenExchanger,

    /// Local audience check followed by a delegated UMA decision call.
    #[serde(rename = "access_token_validator_with_decision")]
    ValidatorWithDecision,
}

impl Mode {
    /// Only the token exchange flow authenticates itself with a workload
    /// identity credential.
    pub fn needs_identity_source(&self) -> bool {
        matches!(self, Mode::TokenExchanger)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::TokenExchanger => write!(f, "access_token_exchanger"),
            Mode::ValidatorWithDecision => write!(f, "access_token_validator_with_decision"),
        }
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "access_token_exchanger" => Ok(Mode::TokenExchanger),
            "access_token_validator_with_decision" => Ok(Mode::ValidatorWithDecision),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}
