// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Bearer token extraction and the unauthenticated challenge URL.
//!
//! Both operations are pure functions over the (lower-cased) header map of
//! the intercepted request.

use std::collections::HashMap;

/// Well-known path advertised in the `WWW-Authenticate` challenge, per the
/// protected-resource-metadata discovery contract.
pub const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";

/// Extract the token from an `Authorization: Bearer <token>` value.
///
/// The scheme is matched case-insensitively and surrounding whitespace is
/// ignored. Returns `None` for anything that does not carry a non-empty
/// bearer token.
pub fn parse_bearer(value: &str) -> Option<&str> {
    let value = value.trim();
    let scheme = value.get(..6)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = value[6..].trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Build `<scheme>://<host>/.well-known/oauth-protected-resource` strictly
/// from request headers: scheme from `x-forwarded-proto`, host from
/// `:authority` (H2) or `host` (H1). No fallback or defaults: if either is
/// missing the resource identity cannot be determined and `None` is
/// returned, so the caller answers 401 without a challenge rather than
/// advertising a guessed resource.
pub fn resource_metadata_url(headers: &HashMap<String, String>) -> Option<String> {
    let scheme = headers.get("x-forwarded-proto").filter(|s| !s.is_empty())?;
    let host = headers
        .get(":authority")
        .filter(|h| !h.is_empty())
        .or_else(|| headers.get("host").filter(|h| !h.is_empty()))?;
    Some(format!("{scheme}://{host}{PROTECTED_RESOURCE_PATH}"))
}
