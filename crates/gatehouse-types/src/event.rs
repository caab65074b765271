//! Auth state change events.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Provider-originated authentication event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    UserUpdated,
    TokenRefreshed,
    PasswordRecovery,
}

impl AuthEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEvent::SignedIn => "SIGNED_IN",
            AuthEvent::SignedOut => "SIGNED_OUT",
            AuthEvent::UserUpdated => "USER_UPDATED",
            AuthEvent::TokenRefreshed => "TOKEN_REFRESHED",
            AuthEvent::PasswordRecovery => "PASSWORD_RECOVERY",
        }
    }

    /// Returns all events, in declaration order.
    pub fn all() -> &'static [AuthEvent] {
        &[
            AuthEvent::SignedIn,
            AuthEvent::SignedOut,
            AuthEvent::UserUpdated,
            AuthEvent::TokenRefreshed,
            AuthEvent::PasswordRecovery,
        ]
    }
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
