// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Delegated authorization decisions via the UMA "decision" response mode.
//!
//! The authorization server evaluates `<path>#<method>` permissions for the
//! calling user and answers with a plain boolean. The call authenticates as
//! the *caller* (their bearer token goes on the request), not as this
//! sidecar. Like token exchange, failed calls are never retried.

use std::time::Instant;

use reqwest::{Client, StatusCode, header::CONTENT_TYPE};
use serde::Deserialize;

use crate::errors::AuthError;
use crate::redact::Redactor;

pub const UMA_TICKET_GRANT: &str = "urn:ietf:params:oauth:grant-type:uma-ticket";
pub const DECISION_RESPONSE_MODE: &str = "decision";

#[derive(Debug, Clone)]
pub struct DecisionConfig {
    /// Realm token endpoint (UMA decisions go to the same endpoint as
    /// token grants).
    pub token_endpoint: String,
    /// Resource-server client id the permissions are defined under.
    pub client_audience: String,
}

#[derive(Debug, Deserialize)]
struct DecisionResponse {
    result: bool,
}

pub struct DecisionDelegate {
    config: DecisionConfig,
    client: Client,
    redactor: Redactor,
}

impl DecisionDelegate {
    pub fn new(config: DecisionConfig, client: Client, redactor: Redactor) -> Self {
        Self {
            config,
            client,
            redactor,
        }
    }

    /// Ask the authorization server whether `user_token` may perform
    /// `method` on `resource_path`. Returns the server's boolean verdict.
    pub async fn authorize(
        &self,
        user_token: &str,
        resource_path: &str,
        method: &str,
    ) -> Result<bool, AuthError> {
        let permission = format!("{resource_path}#{method}");
        let form = [
            ("grant_type", UMA_TICKET_GRANT),
            ("audience", self.config.client_audience.as_str()),
            ("response_mode", DECISION_RESPONSE_MODE),
            ("permission", permission.as_str()),
        ];

        self.redactor
            .log_request("uma-decision", "POST", &self.config.token_endpoint, &form);

        let start = Instant::now();
        let response = self
            .client
            .post(&self.config.token_endpoint)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .bearer_auth(user_token)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        self.redactor
            .log_response("uma-decision", status.as_u16(), &body, start.elapsed());

        if status != StatusCode::OK {
            return Err(AuthError::DecisionEndpointError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: DecisionResponse = serde_json::from_str(&body)?;
        Ok(parsed.result)
    }
}
