// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Unverified JWT claim peeking.
//!
//! This module decodes the payload segment of a JWT without any signature
//! validation. It exists for one purpose only: rejecting tokens with the
//! wrong audience locally, before paying for a network round trip. Signature
//! trust is enforced elsewhere in the proxy chain. Do not grow this into a
//! verifying parser.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;

use crate::errors::AuthError;

/// Compare the `aud` claim of an (unverified) JWT against an expected
/// audience. The claim may be a single string or an array of strings; a
/// missing claim or an unexpected shape counts as a mismatch. Malformed
/// tokens are errors, never panics.
pub fn audience_matches(token: &str, expected: &str) -> Result<bool, AuthError> {
    let payload = token.split('.').nth(1).ok_or(AuthError::MalformedJwt)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    let claims: Value = serde_json::from_slice(&bytes)?;

    Ok(match claims.get("aud") {
        Some(Value::String(aud)) => aud == expected,
        Some(Value::Array(auds)) => auds.iter().any(|a| a.as_str() == Some(expected)),
        _ => false,
    })
}
