// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Credential masking for the structured logs of outbound HTTP calls.
//!
//! Every request to the authorization server carries tokens in its form
//! body and every response carries one in its JSON body. The `Redactor`
//! masks those values before anything reaches the log stream. The matcher
//! list is pluggable; the default set covers the fields this sidecar
//! actually sends and receives.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

const DEFAULT_SENSITIVE_FIELDS: &[&str] = &[
    "access_token",
    "refresh_token",
    "id_token",
    "subject_token",
    "client_assertion",
    "authorization",
];

/// Truncation limit for logged response bodies.
const MAX_LOGGED_BODY: usize = 4096;

#[derive(Debug, Clone)]
pub struct Redactor {
    sensitive_fields: Vec<String>,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVE_FIELDS.iter().map(|f| f.to_string()))
    }
}

impl Redactor {
    pub fn new(sensitive_fields: impl IntoIterator<Item = String>) -> Self {
        Self {
            sensitive_fields: sensitive_fields.into_iter().collect(),
        }
    }

    pub fn is_sensitive(&self, field: &str) -> bool {
        self.sensitive_fields
            .iter()
            .any(|f| f.eq_ignore_ascii_case(field))
    }

    /// Copy of a form body with sensitive values masked.
    pub fn redact_form(&self, form: &[(&str, &str)]) -> Vec<(String, String)> {
        form.iter()
            .map(|(key, value)| {
                let value = if self.is_sensitive(key) {
                    mask_token(value)
                } else {
                    (*value).to_string()
                };
                (key.to_string(), value)
            })
            .collect()
    }

    /// Copy of a JSON body with sensitive string members masked and other
    /// sensitive members replaced wholesale. Non-JSON bodies pass through.
    pub fn redact_json(&self, body: &str) -> String {
        let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(body) else {
            return body.to_string();
        };
        for (key, value) in map.iter_mut() {
            if !self.is_sensitive(key) {
                continue;
            }
            *value = match value {
                Value::String(s) => Value::String(mask_token(s)),
                _ => Value::String("<redacted>".to_string()),
            };
        }
        Value::Object(map).to_string()
    }

    /// Log an outbound request with its redacted form body.
    pub fn log_request(&self, tag: &str, method: &str, url: &str, form: &[(&str, &str)]) {
        debug!(
            tag,
            method,
            url,
            form = ?self.redact_form(form),
            "outbound request"
        );
    }

    /// Log an outbound response with its redacted, truncated body.
    pub fn log_response(&self, tag: &str, status: u16, body: &str, elapsed: Duration) {
        let mut body = self.redact_json(body);
        if body.len() > MAX_LOGGED_BODY {
            let mut cut = MAX_LOGGED_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
            body.push_str("...(truncated)");
        }
        debug!(
            tag,
            status,
            elapsed_ms = elapsed.as_millis() as u64,
            body = %body,
            "outbound response"
        );
    }
}

/// Mask a token-like value, keeping just enough to correlate log lines.
/// A `Bearer ` prefix is preserved and the rest masked.
pub fn mask_token(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    if let Some(prefix) = value.get(..7)
        && prefix.eq_ignore_ascii_case("bearer ")
    {
        return format!("Bearer {}", mask_token(value[7..].trim()));
    }
    let chars = value.chars().count();
    if chars <= 10 {
        return "****".to_string();
    }
    let head: String = value.chars().take(4).collect();
    let tail: String = value.chars().skip(chars - 4).collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_token_short_values() {
        assert_eq!(mask_token(""), "");
        assert_eq!(mask_token("short"), "****");
        assert_eq!(mask_token("0123456789"), "****");
    }

    #[test]
    fn test_mask_token_keeps_edges_of_long_values() {
        assert_eq!(mask_token("abcdefghijklmnop"), "abcd...mnop");
    }

    #[test]
    fn test_mask_token_preserves_bearer_prefix() {
        assert_eq!(
            mask_token("Bearer abcdefghijklmnop"),
            "Bearer abcd...mnop"
        );
        assert_eq!(mask_token("bearer tok"), "Bearer ****");
    }

    #[test]
    fn test_redact_form_masks_only_sensitive_fields() {
        let redactor = Redactor::default();
        let form = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:uma-ticket"),
            ("subject_token", "abcdefghijklmnop"),
        ];
        let redacted = redactor.redact_form(&form);
        assert_eq!(
            redacted[0].1,
            "urn:ietf:params:oauth:grant-type:uma-ticket"
        );
        assert_eq!(redacted[1].1, "abcd...mnop");
    }

    #[test]
    fn test_redact_json_masks_access_token() {
        let redactor = Redactor::default();
        let body = r#"{"access_token":"abcdefghijklmnop","expires_in":300}"#;
        let redacted = redactor.redact_json(body);
        assert!(redacted.contains(r#""access_token":"abcd...mnop""#));
        assert!(redacted.contains(r#""expires_in":300"#));
    }

    #[test]
    fn test_redact_json_passes_non_json_through() {
        let redactor = Redactor::default();
        assert_eq!(redactor.redact_json("plain error text"), "plain error text");
    }

    #[test]
    fn test_custom_matcher_list() {
        let redactor = Redactor::new(["ticket".to_string()]);
        assert!(redactor.is_sensitive("TICKET"));
        assert!(!redactor.is_sensitive("access_token"));
    }
}
