// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! The ext_authz decision server.
//!
//! Implements the Envoy external authorization service. Each check request
//! is classified (bearer present or not) and dispatched to the strategy the
//! server was configured with: RFC 8693 token exchange, or a local audience
//! check followed by a delegated UMA decision. The server is stateless
//! across requests except for the late-bound identity source handle, which
//! is injected by the bootstrap task once the Workload API answers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use envoy_types::ext_authz::v3::pb::{Authorization, CheckRequest, CheckResponse};
use envoy_types::pb::envoy::config::core::v3::header_value_option::HeaderAppendAction;
use envoy_types::pb::envoy::config::core::v3::{HeaderValue, HeaderValueOption};
use envoy_types::pb::envoy::r#type::v3::{HttpStatus, StatusCode};
use envoy_types::pb::envoy::service::auth::v3::check_response::HttpResponse;
use envoy_types::pb::envoy::service::auth::v3::{DeniedHttpResponse, OkHttpResponse};
use envoy_types::pb::google::rpc;
use parking_lot::RwLock;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info, warn};

use tollgate_config::{Mode, TollgateConfig};

use crate::bearer;
use crate::claims;
use crate::decision::{DecisionConfig, DecisionDelegate};
use crate::errors::AuthError;
use crate::exchange::{self, ExchangeConfig, TokenExchanger};
use crate::redact::Redactor;
use crate::traits::IdentitySource;

/// Seconds advertised in the Retry-After header while the identity source
/// is still bootstrapping.
pub const RETRY_AFTER_SECS: u32 = 30;

const UNAUTHENTICATED_BODY: &str = "invalid or missing authorization header";

/// Engine configuration, assembled from the validated file configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub mode: Mode,
    pub client_audience: String,
    pub token_endpoint: String,
    pub downstream_audience: Option<String>,
    pub request_timeout: Duration,
}

impl ServerConfig {
    pub fn from_config(config: &TollgateConfig) -> Self {
        Self {
            mode: config.mode,
            client_audience: config.client_audience.clone(),
            token_endpoint: config.token_endpoint.clone(),
            downstream_audience: config.downstream_audience.clone(),
            request_timeout: config.request_timeout(),
        }
    }
}

struct Inner {
    mode: Mode,
    client_audience: String,
    exchanger: Option<TokenExchanger>,
    delegate: DecisionDelegate,
    // May be injected after the server starts accepting traffic: identity
    // bootstrap is asynchronous and slower than the socket bind. Readers
    // take the read lock per check; the writer replaces the handle once.
    identity: RwLock<Option<Arc<dyn IdentitySource>>>,
}

#[derive(Clone)]
pub struct DecisionServer {
    inner: Arc<Inner>,
}

impl DecisionServer {
    pub fn new(config: ServerConfig) -> Result<Self, AuthError> {
        // Enforce the endpoint suffix contract up front in both modes, so a
        // misconfigured endpoint never produces a malformed request later.
        exchange::realm_base(&config.token_endpoint)?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let redactor = Redactor::default();

        let exchanger = match config.mode {
            Mode::TokenExchanger => {
                let downstream_audience = config
                    .downstream_audience
                    .clone()
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| {
                        AuthError::ConfigError(
                            "downstream_audience is required in access_token_exchanger mode"
                                .to_string(),
                        )
                    })?;
                Some(TokenExchanger::new(
                    ExchangeConfig {
                        token_endpoint: config.token_endpoint.clone(),
                        client_audience: config.client_audience.clone(),
                        downstream_audience,
                    },
                    client.clone(),
                    redactor.clone(),
                )?)
            }
            Mode::ValidatorWithDecision => None,
        };

        let delegate = DecisionDelegate::new(
            DecisionConfig {
                token_endpoint: config.token_endpoint.clone(),
                client_audience: config.client_audience.clone(),
            },
            client,
            redactor,
        );

        info!(mode = %config.mode, "decision server initialized");
        Ok(Self {
            inner: Arc::new(Inner {
                mode: config.mode,
                client_audience: config.client_audience,
                exchanger,
                delegate,
                identity: RwLock::new(None),
            }),
        })
    }

    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    /// Whether the configured mode requires a workload identity credential.
    pub fn needs_identity_source(&self) -> bool {
        self.inner.mode.needs_identity_source()
    }

    pub fn identity_ready(&self) -> bool {
        self.inner.identity.read().is_some()
    }

    /// Install the identity source. Called once by the bootstrap task after
    /// the Workload API becomes reachable.
    pub fn set_identity_source(&self, source: Arc<dyn IdentitySource>) {
        *self.inner.identity.write() = Some(source);
        info!("identity source installed");
    }

    async fn exchange_token(&self, subject_token: &str) -> Result<String, AuthError> {
        let exchanger = self.inner.exchanger.as_ref().ok_or_else(|| {
            AuthError::ConfigError("token exchange engine not configured".to_string())
        })?;

        let source = self.inner.identity.read().clone();
        let source = source.ok_or(AuthError::IdentitySourceNotReady)?;

        let assertion = source.fetch_assertion(exchanger.realm_base()).await?;
        exchanger.exchange(&assertion, subject_token).await
    }

    async fn do_check(&self, request: &CheckRequest) -> CheckResponse {
        let http = request
            .attributes
            .as_ref()
            .and_then(|a| a.request.as_ref())
            .and_then(|r| r.http.as_ref());

        let (path, method, headers) = match http {
            Some(http) => (
                http.path.clone(),
                http.method.to_lowercase(),
                lowercase_headers(&http.headers),
            ),
            None => (String::new(), String::new(), HashMap::new()),
        };

        let token = headers
            .get("authorization")
            .and_then(|value| bearer::parse_bearer(value));
        let Some(token) = token else {
            return match bearer::resource_metadata_url(&headers) {
                Some(url) => {
                    warn!(resource_metadata = %url, "missing or malformed authorization header");
                    unauthorized_response(Some(&url), UNAUTHENTICATED_BODY)
                }
                None => {
                    // Without x-forwarded-proto and an authority/host header
                    // the resource identity cannot be determined, so no
                    // challenge is advertised.
                    warn!("missing or malformed authorization header, no challenge possible");
                    unauthorized_response(None, UNAUTHENTICATED_BODY)
                }
            };
        };

        match self.inner.mode {
            Mode::TokenExchanger => match self.exchange_token(token).await {
                Ok(exchanged) => {
                    debug!("token exchange succeeded, authorization header rewritten");
                    ok_response(vec![replace_header(
                        "authorization",
                        &format!("Bearer {exchanged}"),
                    )])
                }
                Err(AuthError::IdentitySourceNotReady) => {
                    warn!("token exchange aborted: identity source not ready");
                    service_unavailable_response(
                        "identity-source-not-ready",
                        Some(RETRY_AFTER_SECS),
                    )
                }
                Err(err) => {
                    error!(error = %err, "token exchange failed");
                    forbidden_response(&err.to_string())
                }
            },
            Mode::ValidatorWithDecision => {
                match claims::audience_matches(token, &self.inner.client_audience) {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!("audience check failed: audience mismatch");
                        return forbidden_response("audience check failed");
                    }
                    Err(err) => {
                        warn!(error = %err, "audience check failed");
                        return forbidden_response("audience check failed");
                    }
                }

                match self.inner.delegate.authorize(token, &path, &method).await {
                    Ok(true) => {
                        debug!(%path, %method, decision = "allow", "delegated decision");
                        ok_response(Vec::new())
                    }
                    Ok(false) => {
                        debug!(%path, %method, decision = "deny", "delegated decision");
                        forbidden_response("PERMISSION_DENIED")
                    }
                    Err(err) => {
                        error!(error = %err, "decision delegation failed");
                        forbidden_response(&err.to_string())
                    }
                }
            }
        }
    }
}

#[tonic::async_trait]
impl Authorization for DecisionServer {
    async fn check(
        &self,
        request: Request<CheckRequest>,
    ) -> Result<Response<CheckResponse>, Status> {
        let started = Instant::now();
        let request = request.into_inner();

        let response = self.do_check(&request).await;

        let grpc_code = response.status.as_ref().map(|s| s.code).unwrap_or_default();
        debug!(
            grpc_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "check completed"
        );
        Ok(Response::new(response))
    }
}

fn lowercase_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(key, value)| (key.to_lowercase(), value.clone()))
        .collect()
}

/// Header mutation that replaces any existing value instead of appending.
fn replace_header(key: &str, value: &str) -> HeaderValueOption {
    HeaderValueOption {
        header: Some(HeaderValue {
            key: key.to_string(),
            value: value.to_string(),
            ..Default::default()
        }),
        append_action: HeaderAppendAction::OverwriteIfExistsOrAdd.into(),
        ..Default::default()
    }
}

fn ok_response(headers: Vec<HeaderValueOption>) -> CheckResponse {
    CheckResponse {
        status: Some(rpc::Status {
            code: tonic::Code::Ok as i32,
            ..Default::default()
        }),
        http_response: Some(HttpResponse::OkResponse(OkHttpResponse {
            headers,
            ..Default::default()
        })),
        ..Default::default()
    }
}

fn forbidden_response(body: &str) -> CheckResponse {
    denied_response(
        tonic::Code::PermissionDenied,
        StatusCode::Forbidden,
        Vec::new(),
        body,
    )
}

fn unauthorized_response(resource_metadata_url: Option<&str>, body: &str) -> CheckResponse {
    let headers = match resource_metadata_url {
        Some(url) => vec![replace_header(
            "www-authenticate",
            &format!("Bearer resource_metadata=\"{url}\""),
        )],
        None => Vec::new(),
    };
    denied_response(
        tonic::Code::Unauthenticated,
        StatusCode::Unauthorized,
        headers,
        body,
    )
}

fn service_unavailable_response(body: &str, retry_after_secs: Option<u32>) -> CheckResponse {
    let headers = match retry_after_secs {
        Some(secs) => vec![replace_header("retry-after", &secs.to_string())],
        None => Vec::new(),
    };
    denied_response(
        tonic::Code::Unavailable,
        StatusCode::ServiceUnavailable,
        headers,
        body,
    )
}

fn denied_response(
    code: tonic::Code,
    http_status: StatusCode,
    headers: Vec<HeaderValueOption>,
    body: &str,
) -> CheckResponse {
    CheckResponse {
        status: Some(rpc::Status {
            code: code as i32,
            ..Default::default()
        }),
        http_response: Some(HttpResponse::DeniedResponse(DeniedHttpResponse {
            status: Some(HttpStatus {
                code: http_status.into(),
            }),
            headers,
            body: body.to_string(),
        })),
        ..Default::default()
    }
}
