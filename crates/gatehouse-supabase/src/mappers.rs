//! Translation from provider wire types to gatehouse domain types.
//!
//! Every code path (sign-up, sign-in, refresh, restore, events) goes through
//! the same functions so field semantics cannot drift between paths.

use chrono::{DateTime, TimeDelta, Utc};
use gatehouse_core::ProviderFailure;
use gatehouse_types::{AuthEvent, AuthSession, AuthUser};

use crate::types::{ErrorBody, GoTrueSession, GoTrueUser};

pub fn map_user(user: &GoTrueUser) -> AuthUser {
    AuthUser {
        id: user.id.clone(),
        email: user.email.clone().unwrap_or_default(),
        email_verified: user.email_confirmed_at,
        name: user.metadata_str("name"),
        avatar_url: user.metadata_str("avatar_url"),
        created_at: user.created_at,
        updated_at: user.updated_at.unwrap_or(user.created_at),
    }
}

/// Resolves the absolute expiry of a session.
///
/// `expires_at` is epoch seconds; when absent, `expires_in` counts from
/// `now`. A session with neither, or with a lifetime out of range, is
/// treated as already expired.
pub fn session_expiry(session: &GoTrueSession, now: DateTime<Utc>) -> DateTime<Utc> {
    if let Some(expiry) = session
        .expires_at
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
    {
        return expiry;
    }
    session
        .expires_in
        .and_then(|secs| expiry_after(now, secs))
        .unwrap_or(now)
}

/// `now + secs`, or `None` if that is not a representable time.
pub fn expiry_after(now: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_seconds(secs).and_then(|lifetime| now.checked_add_signed(lifetime))
}

/// Maps a session. The session id is the user id.
pub fn map_session(session: &GoTrueSession, now: DateTime<Utc>) -> AuthSession {
    let user = map_user(&session.user);
    AuthSession {
        id: user.id.clone(),
        user_id: user.id.clone(),
        token: session.access_token.clone(),
        expires_at: session_expiry(session, now),
        user: Some(user),
    }
}

/// Maps a provider event name; anything unrecognized counts as a user update.
pub fn map_event(name: &str) -> AuthEvent {
    match name {
        "SIGNED_IN" => AuthEvent::SignedIn,
        "SIGNED_OUT" => AuthEvent::SignedOut,
        "USER_UPDATED" => AuthEvent::UserUpdated,
        "TOKEN_REFRESHED" => AuthEvent::TokenRefreshed,
        "PASSWORD_RECOVERY" => AuthEvent::PasswordRecovery,
        other => {
            tracing::debug!(event = other, "unmapped provider event treated as USER_UPDATED");
            AuthEvent::UserUpdated
        }
    }
}

/// Collects status, message and code from a failed HTTP response.
pub async fn failure_from_response(response: reqwest::Response) -> ProviderFailure {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    failure_from_body(status, &text)
}

pub fn failure_from_body(status: u16, text: &str) -> ProviderFailure {
    let body: ErrorBody = serde_json::from_str(text).unwrap_or_default();
    let mut failure = ProviderFailure {
        message: body.message(),
        status: Some(status),
        code: body.code(),
    };
    if failure.message.is_none() && !text.trim().is_empty() && body.code().is_none() {
        failure.message = Some(text.trim().to_string());
    }
    failure
}

/// Returns true if a failure explicitly says the account does not exist.
pub fn says_user_not_found(failure: &ProviderFailure) -> bool {
    let message = failure.message.as_deref().unwrap_or_default().to_lowercase();
    message.contains("user not found")
        || message.contains("email not found")
        || failure.code.as_deref() == Some("user_not_found")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn user_json() -> serde_json::Value {
        json!({
            "id": "user-1",
            "email": "ana@example.com",
            "email_confirmed_at": "2024-01-01T10:00:00Z",
            "user_metadata": {"name": "Ana", "avatar_url": ""},
            "created_at": "2024-01-01T09:00:00Z"
        })
    }

    #[test]
    fn test_map_user_fields() {
        let user: GoTrueUser = serde_json::from_value(user_json()).unwrap();
        let mapped = map_user(&user);
        assert_eq!(mapped.id, "user-1");
        assert_eq!(mapped.email, "ana@example.com");
        assert_eq!(mapped.name.as_deref(), Some("Ana"));
        assert_eq!(mapped.avatar_url, None);
        assert!(mapped.email_verified.is_some());
        assert_eq!(mapped.updated_at, mapped.created_at);
    }

    #[test]
    fn test_map_session_uses_epoch_seconds() {
        let session: GoTrueSession = serde_json::from_value(json!({
            "access_token": "access",
            "refresh_token": "refresh",
            "expires_in": 3600,
            "expires_at": 1_900_000_000,
            "user": user_json()
        }))
        .unwrap();
        let mapped = map_session(&session, Utc::now());
        assert_eq!(mapped.expires_at.timestamp(), 1_900_000_000);
        assert_eq!(mapped.id, "user-1");
        assert_eq!(mapped.user_id, "user-1");
        assert_eq!(mapped.token, "access");
    }

    #[test]
    fn test_map_session_falls_back_to_expires_in() {
        let now = Utc::now();
        let session: GoTrueSession = serde_json::from_value(json!({
            "access_token": "access",
            "refresh_token": "refresh",
            "expires_in": 60,
            "user": user_json()
        }))
        .unwrap();
        let mapped = map_session(&session, now);
        assert_eq!(mapped.expires_at, now + TimeDelta::seconds(60));
        assert!(mapped.is_valid_at(now));
    }

    #[test]
    fn test_out_of_range_lifetime_is_already_expired() {
        let now = Utc::now();
        let session: GoTrueSession = serde_json::from_value(json!({
            "access_token": "access",
            "refresh_token": "refresh",
            "expires_in": i64::MAX,
            "user": user_json()
        }))
        .unwrap();
        assert_eq!(session_expiry(&session, now), now);
        assert!(!map_session(&session, now).is_valid_at(now));

        let stamped = session.stamped(now);
        assert_eq!(stamped.expires_at, Some(now.timestamp()));
    }

    #[test]
    fn test_unknown_events_become_user_updated() {
        assert_eq!(map_event("SIGNED_IN"), AuthEvent::SignedIn);
        assert_eq!(map_event("PASSWORD_RECOVERY"), AuthEvent::PasswordRecovery);
        assert_eq!(map_event("INITIAL_SESSION"), AuthEvent::UserUpdated);
        assert_eq!(map_event("MFA_CHALLENGE_VERIFIED"), AuthEvent::UserUpdated);
    }

    #[test]
    fn test_failure_from_plain_text_body() {
        let failure = failure_from_body(502, "Bad Gateway");
        assert_eq!(failure.status, Some(502));
        assert_eq!(failure.message.as_deref(), Some("Bad Gateway"));
    }

    #[test]
    fn test_user_not_found_detection() {
        assert!(says_user_not_found(&ProviderFailure::new("User not found")));
        assert!(says_user_not_found(
            &ProviderFailure::new("nope").with_code("user_not_found")
        ));
        assert!(!says_user_not_found(&ProviderFailure::new(
            "Invalid login credentials"
        )));
    }
}
