//! Users, sessions and the request/response shapes around them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated user snapshot.
///
/// Replaced wholesale on every update, never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Stable, opaque identifier assigned by the identity provider.
    pub id: String,
    pub email: String,
    /// When the email address was confirmed, if it has been.
    pub email_verified: Option<DateTime<Utc>>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Time-bounded authorization credential tied to one user.
///
/// The bearer token is never printed in full: `Debug` masks it.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub id: String,
    /// Always equal to the owning user's id.
    pub user_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: Option<AuthUser>,
}

impl AuthSession {
    /// Returns true while `now` is strictly before the expiry instant.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Returns true if the session has not expired yet.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("token", &mask_token(&self.token))
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Returns a masked version of a token for display (first 12 chars + ...).
pub fn mask_token(token: &str) -> String {
    if token.len() <= 16 {
        return "***".to_string();
    }
    let prefix: String = token.chars().take(12).collect();
    format!("{prefix}...")
}

/// Successful sign-up or sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub user: AuthUser,
    pub session: AuthSession,
}

/// Optional metadata attached to a new account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Changes to the identity-level user record (not the extended profile).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub email: Option<String>,
}

impl AccountUpdate {
    /// Returns true if no field would change.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.avatar_url.is_none() && self.email.is_none()
    }
}

/// Outcome of a password reset request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordResetResponse {
    pub success: bool,
    pub message: String,
}

/// Supported OAuth providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Apple,
    Github,
    Facebook,
}

impl OAuthProvider {
    /// Returns the provider id used by identity services.
    pub fn id(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Apple => "apple",
            OAuthProvider::Github => "github",
            OAuthProvider::Facebook => "facebook",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for OAuthProvider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "apple" => Ok(Self::Apple),
            "github" => Ok(Self::Github),
            "facebook" => Ok(Self::Facebook),
            other => Err(format!("Unknown OAuth provider: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn session(expires_at: DateTime<Utc>) -> AuthSession {
        AuthSession {
            id: "u1".to_string(),
            user_id: "u1".to_string(),
            token: "eyJhbGciOiJIUzI1NiJ9.payload.signature".to_string(),
            expires_at,
            user: None,
        }
    }

    #[test]
    fn test_session_validity_is_strict() {
        let now = Utc::now();
        assert!(session(now + Duration::seconds(1)).is_valid_at(now));
        assert!(!session(now).is_valid_at(now));
        assert!(!session(now - Duration::seconds(1)).is_valid_at(now));
    }

    #[test]
    fn test_debug_masks_token() {
        let rendered = format!("{:?}", session(Utc::now()));
        assert!(rendered.contains("eyJhbGciOiJI..."));
        assert!(!rendered.contains("signature"));
    }

    #[test]
    fn test_mask_token_short() {
        assert_eq!(mask_token("short"), "***");
    }

    #[test]
    fn test_oauth_provider_parse() {
        assert_eq!("GitHub".parse::<OAuthProvider>(), Ok(OAuthProvider::Github));
        assert!("myspace".parse::<OAuthProvider>().is_err());
    }
}
