// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Seam between the decision server and whatever supplies workload
//! identity credentials.

use async_trait::async_trait;

use crate::errors::AuthError;

/// Source of short-lived signed identity assertions.
///
/// Implementations are installed on the decision server once they become
/// ready; until then the server answers token-exchange requests with a
/// transient not-ready error.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    /// Fetch a signed assertion scoped to the given audience.
    async fn fetch_assertion(&self, audience: &str) -> Result<String, AuthError>;
}
