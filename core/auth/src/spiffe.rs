// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

#![cfg(not(target_family = "windows"))]

//! SPIFFE Workload API integration.
//!
//! The sidecar authenticates itself to the authorization server with a
//! JWT-SVID fetched on demand from the local SPIRE agent. Connecting to the
//! Workload API is the readiness gate: a `SpiffeIdentitySource` only exists
//! once the agent has answered.

use async_trait::async_trait;
use spiffe::WorkloadApiClient;
use tracing::debug;

use crate::errors::AuthError;
use crate::traits::IdentitySource;

pub struct SpiffeIdentitySource {
    client: WorkloadApiClient,
}

impl SpiffeIdentitySource {
    /// Connect to the SPIFFE Workload API. With `None` the socket is taken
    /// from the `SPIFFE_ENDPOINT_SOCKET` environment variable.
    pub async fn connect(socket_path: Option<&str>) -> Result<Self, AuthError> {
        let client = match socket_path {
            Some(path) => WorkloadApiClient::new_from_path(path).await,
            None => WorkloadApiClient::default().await,
        }
        .map_err(|e| AuthError::SpiffeWorkloadConnect {
            details: e.to_string(),
        })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl IdentitySource for SpiffeIdentitySource {
    async fn fetch_assertion(&self, audience: &str) -> Result<String, AuthError> {
        let mut client = self.client.clone();
        let svid = client
            .fetch_jwt_svid(&[audience], None)
            .await
            .map_err(|e| AuthError::SpiffeJwtSvidFetch {
                details: e.to_string(),
            })?;

        debug!(spiffe_id = %svid.spiffe_id(), "fetched JWT SVID");
        Ok(svid.token().to_string())
    }
}
