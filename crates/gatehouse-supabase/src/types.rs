//! GoTrue / PostgREST wire types.
//!
//! These never leave the crate boundary as-is; see [`crate::mappers`].

use std::fmt;

use chrono::{DateTime, Utc};
use gatehouse_types::mask_token;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::mappers::expiry_after;

/// User object as returned by GoTrue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoTrueUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_metadata: Option<Map<String, Value>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl GoTrueUser {
    /// Returns a non-empty string field from `user_metadata`.
    pub fn metadata_str(&self, key: &str) -> Option<String> {
        self.user_metadata
            .as_ref()?
            .get(key)?
            .as_str()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(String::from)
    }
}

/// Session object as returned by the token endpoints.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct GoTrueSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds, relative to issue time.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Absolute expiry, epoch seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: GoTrueUser,
}

impl GoTrueSession {
    /// Fills in `expires_at` from `expires_in` when the server omitted it.
    /// A lifetime out of range stamps the session as already expired.
    #[must_use]
    pub fn stamped(mut self, now: DateTime<Utc>) -> Self {
        if self.expires_at.is_none()
            && let Some(expires_in) = self.expires_in
        {
            let expiry = expiry_after(now, expires_in).unwrap_or(now);
            self.expires_at = Some(expiry.timestamp());
        }
        self
    }
}

impl fmt::Debug for GoTrueSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoTrueSession")
            .field("access_token", &mask_token(&self.access_token))
            .field("refresh_token", &"***")
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .field("user", &self.user.id)
            .finish_non_exhaustive()
    }
}

/// Error body shapes used by GoTrue (old and new) and PostgREST.
///
/// GoTrue sends either `{code, error_code, msg}` (where `code` is the HTTP
/// status) or `{error, error_description}`. PostgREST sends
/// `{code: "PGRST116", message, details, hint}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl ErrorBody {
    /// Returns the most specific human-readable message.
    pub fn message(&self) -> Option<String> {
        [
            &self.msg,
            &self.message,
            &self.error_description,
            &self.error,
        ]
        .into_iter()
        .flatten()
        .map(|m| m.trim())
        .find(|m| !m.is_empty())
        .map(String::from)
    }

    /// Returns the machine-readable code, if any.
    pub fn code(&self) -> Option<String> {
        self.error_code.clone().or_else(|| match &self.code {
            Some(Value::String(code)) => Some(code.clone()),
            _ => None,
        })
    }
}

/// Request body for `/signup`.
#[derive(Debug, Serialize)]
pub(crate) struct SignUpRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<&'a gatehouse_types::UserMetadata>,
}

/// Request body for `PUT /user`.
#[derive(Debug, Default, Serialize)]
pub(crate) struct UserUpdateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<gatehouse_types::UserMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_new_format() {
        let body: ErrorBody = serde_json::from_str(
            r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#,
        )
        .unwrap();
        assert_eq!(body.code().as_deref(), Some("invalid_credentials"));
        assert_eq!(body.message().as_deref(), Some("Invalid login credentials"));
    }

    #[test]
    fn test_error_body_legacy_format() {
        let body: ErrorBody = serde_json::from_str(
            r#"{"error":"invalid_grant","error_description":"Email not confirmed"}"#,
        )
        .unwrap();
        assert_eq!(body.code(), None);
        assert_eq!(body.message().as_deref(), Some("Email not confirmed"));
    }

    #[test]
    fn test_error_body_postgrest_format() {
        let body: ErrorBody = serde_json::from_str(
            r#"{"code":"PGRST116","details":"The result contains 0 rows","hint":null,"message":"JSON object requested, multiple (or no) rows returned"}"#,
        )
        .unwrap();
        assert_eq!(body.code().as_deref(), Some("PGRST116"));
    }

    #[test]
    fn test_stamped_fills_missing_expiry() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let session = GoTrueSession {
            access_token: "a".into(),
            refresh_token: "r".into(),
            token_type: None,
            expires_in: Some(3600),
            expires_at: None,
            user: GoTrueUser {
                id: "u".into(),
                email: None,
                email_confirmed_at: None,
                user_metadata: None,
                created_at: now,
                updated_at: None,
            },
        }
        .stamped(now);
        assert_eq!(session.expires_at, Some(1_700_003_600));
    }
}
