//! Translation of provider-originated failures into [`AuthError`].
//!
//! Adapters collect whatever the provider reported (message, HTTP status,
//! machine-readable code) into a [`ProviderFailure`] and hand it to
//! [`classify`], which is the single place deciding the [`AuthErrorCode`].

use std::fmt;

use gatehouse_types::{AuthError, AuthErrorCode};

/// Default message when neither the provider nor the caller supplies one.
pub const DEFAULT_FALLBACK_MESSAGE: &str = "An authentication error occurred";

/// Raw failure as reported by an identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderFailure {
    /// Human-readable message from the provider, if any.
    pub message: Option<String>,
    /// HTTP status of the failed request, if the failure came from HTTP.
    pub status: Option<u16>,
    /// Provider-specific error code (e.g. `invalid_credentials`).
    pub code: Option<String>,
}

impl ProviderFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Creates a failure for a request that never produced a response.
    pub fn transport(detail: impl fmt::Display) -> Self {
        Self::new(format!("Network request failed: {detail}"))
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status, &self.message) {
            (Some(status), Some(message)) => write!(f, "HTTP {status}: {message}"),
            (Some(status), None) => write!(f, "HTTP {status}"),
            (None, Some(message)) => f.write_str(message),
            (None, None) => f.write_str("provider error"),
        }
    }
}

impl std::error::Error for ProviderFailure {}

/// Lowercased view of a failure used for pattern matching.
struct Signals<'a> {
    message: String,
    code: Option<&'a str>,
    status: Option<u16>,
}

impl Signals<'_> {
    fn mentions(&self, needles: &[&str]) -> bool {
        needles.iter().any(|needle| self.message.contains(needle))
    }

    fn code_is(&self, codes: &[&str]) -> bool {
        self.code.is_some_and(|code| codes.contains(&code))
    }
}

/// Maps a provider failure to exactly one [`AuthError`].
///
/// Patterns are tested in a fixed priority order; the first match wins and
/// anything unmatched becomes [`AuthErrorCode::UnknownError`]. A missing
/// failure yields an unknown error carrying `fallback_message`.
pub fn classify(failure: Option<&ProviderFailure>, fallback_message: &str) -> AuthError {
    let Some(failure) = failure else {
        return AuthError::unknown(fallback_message);
    };

    let message = failure
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(fallback_message)
        .to_string();

    let signals = Signals {
        message: message.to_lowercase(),
        code: failure.code.as_deref(),
        status: failure.status,
    };

    AuthError::new(classify_code(&signals), message).with_source(failure.clone())
}

fn classify_code(s: &Signals<'_>) -> AuthErrorCode {
    // Sign in
    if s.mentions(&["invalid login credentials", "invalid email or password"])
        || s.code_is(&["invalid_credentials"])
    {
        return AuthErrorCode::InvalidCredentials;
    }
    if s.mentions(&["email not confirmed"]) || s.code_is(&["email_not_confirmed"]) {
        return AuthErrorCode::EmailNotConfirmed;
    }
    if s.mentions(&["user not found"]) || s.code_is(&["user_not_found"]) {
        return AuthErrorCode::UserNotFound;
    }

    // Sign up
    if s.mentions(&["user already registered", "email already exists"])
        || s.code_is(&["user_already_exists", "email_exists"])
    {
        return AuthErrorCode::EmailAlreadyExists;
    }
    if (s.mentions(&["password"]) && s.mentions(&["weak", "short", "at least"]))
        || s.code_is(&["weak_password"])
    {
        return AuthErrorCode::WeakPassword;
    }
    if s.mentions(&["invalid email", "unable to validate email address"])
        || s.code_is(&["email_address_invalid"])
    {
        return AuthErrorCode::InvalidEmail;
    }

    // Session
    if s.mentions(&["session expired", "token expired"])
        || s.code_is(&["session_expired", "refresh_token_not_found"])
    {
        return AuthErrorCode::SessionExpired;
    }
    if s.mentions(&["invalid token", "jwt"]) || s.code_is(&["bad_jwt"]) || s.status == Some(401) {
        return AuthErrorCode::InvalidToken;
    }
    if s.mentions(&["no session", "not authenticated"])
        || s.code_is(&["session_not_found", "no_authorization"])
    {
        return AuthErrorCode::NoSession;
    }

    // OAuth
    if s.mentions(&["cancelled", "canceled"]) && s.mentions(&["oauth", "provider", "authoriz"]) {
        return AuthErrorCode::OAuthCancelled;
    }
    if s.mentions(&["oauth", "provider"])
        || s.code_is(&["oauth_provider_not_supported", "provider_disabled"])
    {
        return AuthErrorCode::OAuthProviderError;
    }

    // Transport
    if s.mentions(&["network", "fetch failed", "connection", "timed out"]) {
        return AuthErrorCode::NetworkError;
    }

    AuthErrorCode::UnknownError
}
