//! Authentication error taxonomy.

use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of authentication failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthErrorCode {
    // Sign in
    InvalidCredentials,
    EmailNotConfirmed,
    UserNotFound,
    // Sign up
    EmailAlreadyExists,
    WeakPassword,
    InvalidEmail,
    // Session
    SessionExpired,
    InvalidToken,
    NoSession,
    // OAuth
    #[serde(rename = "OAUTH_PROVIDER_ERROR")]
    OAuthProviderError,
    #[serde(rename = "OAUTH_CANCELLED")]
    OAuthCancelled,
    // General
    NetworkError,
    UnknownError,
}

impl AuthErrorCode {
    /// Returns the stable wire name of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthErrorCode::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthErrorCode::EmailNotConfirmed => "EMAIL_NOT_CONFIRMED",
            AuthErrorCode::UserNotFound => "USER_NOT_FOUND",
            AuthErrorCode::EmailAlreadyExists => "EMAIL_ALREADY_EXISTS",
            AuthErrorCode::WeakPassword => "WEAK_PASSWORD",
            AuthErrorCode::InvalidEmail => "INVALID_EMAIL",
            AuthErrorCode::SessionExpired => "SESSION_EXPIRED",
            AuthErrorCode::InvalidToken => "INVALID_TOKEN",
            AuthErrorCode::NoSession => "NO_SESSION",
            AuthErrorCode::OAuthProviderError => "OAUTH_PROVIDER_ERROR",
            AuthErrorCode::OAuthCancelled => "OAUTH_CANCELLED",
            AuthErrorCode::NetworkError => "NETWORK_ERROR",
            AuthErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Returns all codes, in declaration order.
    pub fn all() -> &'static [AuthErrorCode] {
        &[
            AuthErrorCode::InvalidCredentials,
            AuthErrorCode::EmailNotConfirmed,
            AuthErrorCode::UserNotFound,
            AuthErrorCode::EmailAlreadyExists,
            AuthErrorCode::WeakPassword,
            AuthErrorCode::InvalidEmail,
            AuthErrorCode::SessionExpired,
            AuthErrorCode::InvalidToken,
            AuthErrorCode::NoSession,
            AuthErrorCode::OAuthProviderError,
            AuthErrorCode::OAuthCancelled,
            AuthErrorCode::NetworkError,
            AuthErrorCode::UnknownError,
        ]
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured authentication error.
///
/// Carries exactly one code, a human message suitable for display, and
/// optionally the provider error it was translated from.
#[derive(Debug)]
pub struct AuthError {
    pub code: AuthErrorCode,
    pub message: String,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl AuthError {
    /// Creates a new error without an underlying cause.
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the original provider error.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Creates an unknown error.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::UnknownError, message)
    }

    /// Creates a "no active session" error.
    pub fn no_session() -> Self {
        Self::new(AuthErrorCode::NoSession, "No active session")
    }

    /// Returns true if this error has the given code.
    pub fn is(&self, code: AuthErrorCode) -> bool {
        self.code == code
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for AuthError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// Result type for authentication operations.
pub type AuthResult<T> = std::result::Result<T, AuthError>;
