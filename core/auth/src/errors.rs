// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    // Configuration / generic
    #[error("config error: {0}")]
    ConfigError(String),

    // Identity source lifecycle. Distinguished from every other failure:
    // the caller maps it to 503 + Retry-After instead of 403.
    #[error("identity-source-not-ready")]
    IdentitySourceNotReady,

    // SPIFFE / SPIRE integration
    #[error("failed to connect to SPIFFE Workload API: {details}")]
    SpiffeWorkloadConnect { details: String },
    #[error("failed to fetch JWT SVID: {details}")]
    SpiffeJwtSvidFetch { details: String },

    // Token endpoint contract
    #[error("unexpected token endpoint format: {0}")]
    InvalidTokenEndpoint(String),
    #[error("token-exchange response {status}: {body}")]
    TokenEndpointError { status: u16, body: String },
    #[error("empty access_token in token-exchange response")]
    EmptyAccessToken,

    // Decision delegation
    #[error("decision response {status}: {body}")]
    DecisionEndpointError { status: u16, body: String },

    // Claim peeking
    #[error("invalid jwt format")]
    MalformedJwt,
    #[error("decode payload failed: {0}")]
    Base64DecodeError(#[from] base64::DecodeError),

    // HTTP / networking
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    // Serialization
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
