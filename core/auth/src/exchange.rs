// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! RFC 8693 token exchange against a realm token endpoint.
//!
//! The sidecar trades the caller's access token for a downstream-scoped one,
//! authenticating itself with a SPIFFE JWT-SVID client assertion instead of
//! a static client secret. Exchange results are never cached: every check
//! pays a fresh token endpoint call, and a failed exchange is surfaced
//! immediately rather than retried (the endpoint makes no idempotency
//! promise for `subject_token` reuse).

use std::time::Instant;

use reqwest::{Client, StatusCode, header::CONTENT_TYPE};
use serde::Deserialize;

use tollgate_config::REALM_TOKEN_SUFFIX;

use crate::errors::AuthError;
use crate::redact::Redactor;

pub const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
pub const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";
pub const JWT_SPIFFE_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-spiffe";

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Realm token endpoint; must end with the fixed realm token suffix.
    pub token_endpoint: String,
    /// Client id presented with the assertion.
    pub client_audience: String,
    /// Scope requested for the exchanged token.
    pub downstream_audience: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    access_token: String,
    #[allow(dead_code)]
    #[serde(default)]
    token_type: String,
    #[allow(dead_code)]
    #[serde(default)]
    expires_in: u64,
}

pub struct TokenExchanger {
    config: ExchangeConfig,
    realm_base: String,
    client: Client,
    redactor: Redactor,
}

impl TokenExchanger {
    /// Build the engine, rejecting any token endpoint that does not carry
    /// the fixed realm token suffix.
    pub fn new(config: ExchangeConfig, client: Client, redactor: Redactor) -> Result<Self, AuthError> {
        let realm_base = realm_base(&config.token_endpoint)?;
        Ok(Self {
            config,
            realm_base,
            client,
            redactor,
        })
    }

    /// Authorization-server base URL, used as the audience of the client
    /// assertion.
    pub fn realm_base(&self) -> &str {
        &self.realm_base
    }

    /// Exchange `subject_token` for a downstream access token, presenting
    /// `client_assertion` as this workload's credential.
    pub async fn exchange(
        &self,
        client_assertion: &str,
        subject_token: &str,
    ) -> Result<String, AuthError> {
        let form = [
            ("grant_type", TOKEN_EXCHANGE_GRANT),
            ("subject_token", subject_token),
            ("subject_token_type", ACCESS_TOKEN_TYPE),
            ("requested_token_type", ACCESS_TOKEN_TYPE),
            ("scope", self.config.downstream_audience.as_str()),
            ("client_id", self.config.client_audience.as_str()),
            ("client_assertion_type", JWT_SPIFFE_ASSERTION_TYPE),
            ("client_assertion", client_assertion),
        ];

        self.redactor
            .log_request("token-exchange", "POST", &self.config.token_endpoint, &form);

        let start = Instant::now();
        let response = self
            .client
            .post(&self.config.token_endpoint)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        self.redactor
            .log_response("token-exchange", status.as_u16(), &body, start.elapsed());

        if status != StatusCode::OK {
            return Err(AuthError::TokenEndpointError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ExchangeResponse = serde_json::from_str(&body)?;
        if parsed.access_token.is_empty() {
            return Err(AuthError::EmptyAccessToken);
        }
        Ok(parsed.access_token)
    }
}

/// Strip the fixed realm token suffix from a token endpoint, recovering the
/// authorization-server base URL. The suffix is a fixed contract, not
/// negotiated: endpoints that do not end with it are rejected.
pub fn realm_base(token_endpoint: &str) -> Result<String, AuthError> {
    if !token_endpoint.to_lowercase().ends_with(REALM_TOKEN_SUFFIX) {
        return Err(AuthError::InvalidTokenEndpoint(token_endpoint.to_string()));
    }
    Ok(token_endpoint[..token_endpoint.len() - REALM_TOKEN_SUFFIX.len()].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn exchanger(endpoint: &str) -> TokenExchanger {
        TokenExchanger::new(
            ExchangeConfig {
                token_endpoint: endpoint.to_string(),
                client_audience: "frontend".to_string(),
                downstream_audience: "backend".to_string(),
            },
            Client::new(),
            Redactor::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_realm_base_strips_suffix() {
        let base =
            realm_base("https://kc.example.com/realms/demo/protocol/openid-connect/token").unwrap();
        assert_eq!(base, "https://kc.example.com/realms/demo");
    }

    #[test]
    fn test_realm_base_is_case_insensitive() {
        let base =
            realm_base("https://kc.example.com/realms/demo/PROTOCOL/openid-connect/TOKEN").unwrap();
        assert_eq!(base, "https://kc.example.com/realms/demo");
    }

    #[test]
    fn test_realm_base_rejects_other_endpoints() {
        let err = realm_base("https://kc.example.com/realms/demo/token").unwrap_err();
        assert!(matches!(err, AuthError::InvalidTokenEndpoint(_)));
    }

    #[test]
    fn test_construction_rejects_bad_endpoint() {
        let result = TokenExchanger::new(
            ExchangeConfig {
                token_endpoint: "https://kc.example.com/oauth/token".to_string(),
                client_audience: "frontend".to_string(),
                downstream_audience: "backend".to_string(),
            },
            Client::new(),
            Redactor::default(),
        );
        assert!(matches!(result, Err(AuthError::InvalidTokenEndpoint(_))));
    }

    #[tokio::test]
    async fn test_exchange_sends_rfc8693_form() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/realms/demo/protocol/openid-connect/token"))
            .and(header(
                "content-type",
                "application/x-www-form-urlencoded",
            ))
            .and(body_string_contains("grant-type%3Atoken-exchange"))
            .and(body_string_contains("subject_token=user-token"))
            .and(body_string_contains(
                "subject_token_type=urn%3Aietf%3Aparams%3Aoauth%3Atoken-type%3Aaccess_token",
            ))
            .and(body_string_contains(
                "requested_token_type=urn%3Aietf%3Aparams%3Aoauth%3Atoken-type%3Aaccess_token",
            ))
            .and(body_string_contains("scope=backend"))
            .and(body_string_contains("client_id=frontend"))
            .and(body_string_contains("jwt-spiffe"))
            .and(body_string_contains("client_assertion=svid-jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "downstream-token",
                "token_type": "Bearer",
                "expires_in": 300
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let endpoint = format!(
            "{}/realms/demo/protocol/openid-connect/token",
            mock_server.uri()
        );
        let token = exchanger(&endpoint)
            .exchange("svid-jwt", "user-token")
            .await
            .unwrap();
        assert_eq!(token, "downstream-token");
    }

    #[tokio::test]
    async fn test_exchange_surfaces_status_and_body_on_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
            )
            .mount(&mock_server)
            .await;

        let endpoint = format!(
            "{}/realms/demo/protocol/openid-connect/token",
            mock_server.uri()
        );
        let err = exchanger(&endpoint)
            .exchange("svid-jwt", "user-token")
            .await
            .unwrap_err();
        match err {
            AuthError::TokenEndpointError { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exchange_rejects_empty_access_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "",
                "token_type": "Bearer",
                "expires_in": 300
            })))
            .mount(&mock_server)
            .await;

        let endpoint = format!(
            "{}/realms/demo/protocol/openid-connect/token",
            mock_server.uri()
        );
        let err = exchanger(&endpoint)
            .exchange("svid-jwt", "user-token")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmptyAccessToken));
    }

    #[tokio::test]
    async fn test_exchange_rejects_malformed_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let endpoint = format!(
            "{}/realms/demo/protocol/openid-connect/token",
            mock_server.uri()
        );
        let err = exchanger(&endpoint)
            .exchange("svid-jwt", "user-token")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::JsonError(_)));
    }
}
