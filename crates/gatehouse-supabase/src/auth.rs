//! [`AuthService`] over the Supabase GoTrue REST API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use gatehouse_core::{
    AuthListeners, AuthService, AuthStateCallback, ProfileService, ProviderFailure, Subscription,
    classify,
};
use gatehouse_types::{
    AccountUpdate, AuthError, AuthErrorCode, AuthEvent, AuthResponse, AuthResult, AuthSession,
    AuthUser, OAuthProvider, PasswordResetResponse, UserMetadata,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::Mutex;

use crate::client::SupabaseClient;
use crate::mappers::{
    failure_from_response, map_event, map_session, map_user, says_user_not_found, session_expiry,
};
use crate::types::{GoTrueSession, GoTrueUser, SignUpRequest, UserUpdateRequest};

const NO_ACCOUNT_MESSAGE: &str = "No account found with this email address";
const REFRESH_FAILED_MESSAGE: &str = "Failed to refresh session";
const REFRESH_UNAVAILABLE_MESSAGE: &str = "Could not reach the server to refresh the session";

/// Supabase-backed authentication adapter.
///
/// Construct once at the composition root and share as
/// `Arc<dyn AuthService>`.
pub struct SupabaseAuthAdapter {
    pub(crate) client: SupabaseClient,
    listeners: AuthListeners,
    profiles: Option<Arc<dyn ProfileService>>,
    reset_redirect_url: Option<String>,
    /// Serializes refreshes so a rotating refresh token is spent once.
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for SupabaseAuthAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseAuthAdapter")
            .field("client", &self.client)
            .field("listeners", &self.listeners)
            .field("profiles", &self.profiles.is_some())
            .field("reset_redirect_url", &self.reset_redirect_url)
            .finish_non_exhaustive()
    }
}

impl SupabaseAuthAdapter {
    pub fn new(client: SupabaseClient) -> Self {
        Self {
            client,
            listeners: AuthListeners::new(),
            profiles: None,
            reset_redirect_url: None,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Creates a profile row for every new account.
    #[must_use]
    pub fn with_profile_service(mut self, profiles: Arc<dyn ProfileService>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    /// Sets the link target of password reset emails.
    #[must_use]
    pub fn with_reset_redirect_url(mut self, url: Option<String>) -> Self {
        self.reset_redirect_url = url;
        self
    }

    // ========================================================================
    // Events
    // ========================================================================

    fn emit(&self, event: AuthEvent, session: Option<&GoTrueSession>) {
        let mapped = session.map(|s| map_session(s, Utc::now()));
        self.listeners.emit(event, mapped.as_ref());
    }

    /// Emits a provider-native event name.
    fn emit_native(&self, name: &str, session: Option<&GoTrueSession>) {
        self.emit(map_event(name), session);
    }

    fn store_and_emit(&self, session: &GoTrueSession, event: AuthEvent) {
        self.client.store_session(session);
        self.emit(event, Some(session));
    }

    /// Clears the local session and tells listeners the user is gone.
    fn expire_session(&self) {
        self.client.clear_session();
        self.emit(AuthEvent::SignedOut, None);
    }

    /// Returns the stored session, announcing a freshly restored one.
    fn stored_session(&self) -> Option<GoTrueSession> {
        if let Some(restored) = self.client.take_restored() {
            tracing::debug!(user = %restored.user.id, "restored persisted session");
            self.emit_native("INITIAL_SESSION", Some(&restored));
        }
        self.client.current_session()
    }

    /// Returns a non-expired session, refreshing an expired one.
    ///
    /// If the server cannot be reached the stored session is kept for a
    /// later attempt and `None` is returned.
    async fn valid_session(&self) -> Option<GoTrueSession> {
        let session = self.stored_session()?;
        if !is_expired(&session) {
            return Some(session);
        }

        tracing::debug!("stored session expired; refreshing");
        match self.refresh_stored_if(is_expired).await {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!("Session refresh failed: {err}");
                None
            }
        }
    }

    /// Refreshes the current session if `needs_refresh` still holds once the
    /// refresh lock is taken. A caller that waited on the lock sees the
    /// session renewed by the one before it and does not refresh again.
    ///
    /// Returns `Ok(None)` when there is no session.
    pub(crate) async fn refresh_stored_if(
        &self,
        needs_refresh: impl Fn(&GoTrueSession) -> bool,
    ) -> AuthResult<Option<GoTrueSession>> {
        let _refreshing = self.refresh_lock.lock().await;
        let Some(session) = self.client.current_session() else {
            return Ok(None);
        };
        if !needs_refresh(&session) {
            return Ok(Some(session));
        }
        self.refresh_with(&session).await.map(Some)
    }

    // ========================================================================
    // HTTP plumbing
    // ========================================================================

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        fallback: &str,
    ) -> AuthResult<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|err| classify(Some(&ProviderFailure::transport(&err)), fallback))?;
        if response.status().is_success() {
            Ok(response)
        } else {
            let failure = failure_from_response(response).await;
            tracing::debug!(%failure, "provider request failed");
            Err(classify(Some(&failure), fallback))
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        fallback: &str,
    ) -> AuthResult<T> {
        let response = self.send(request, fallback).await?;
        response.json::<T>().await.map_err(|err| {
            AuthError::unknown(format!("{fallback}: unexpected provider response")).with_source(err)
        })
    }

    /// Exchanges a refresh token, stores the result and emits `TOKEN_REFRESHED`.
    ///
    /// Transport failures, 5xx and 429 answers are [`AuthErrorCode::NetworkError`]
    /// and leave the session in place. Any other rejection means the refresh
    /// token is dead: the session is cleared, `SIGNED_OUT` is emitted and the
    /// result is [`AuthErrorCode::SessionExpired`].
    async fn refresh_with(&self, current: &GoTrueSession) -> AuthResult<GoTrueSession> {
        let response = self
            .client
            .http()
            .post(self.client.auth_url("/token?grant_type=refresh_token"))
            .json(&json!({ "refresh_token": current.refresh_token }))
            .send()
            .await
            .map_err(|err| {
                AuthError::new(AuthErrorCode::NetworkError, REFRESH_UNAVAILABLE_MESSAGE)
                    .with_source(ProviderFailure::transport(&err))
            })?;

        let status = response.status();
        if !status.is_success() {
            let failure = failure_from_response(response).await;
            if is_retryable(status) {
                tracing::debug!(%failure, "session refresh unavailable; keeping session");
                return Err(
                    AuthError::new(AuthErrorCode::NetworkError, REFRESH_UNAVAILABLE_MESSAGE)
                        .with_source(failure),
                );
            }
            tracing::warn!(%failure, "Refresh token rejected; signing out");
            self.expire_if_current(current);
            return Err(
                AuthError::new(AuthErrorCode::SessionExpired, REFRESH_FAILED_MESSAGE)
                    .with_source(failure),
            );
        }

        let refreshed = response
            .json::<GoTrueSession>()
            .await
            .map_err(|err| {
                AuthError::unknown(format!("{REFRESH_FAILED_MESSAGE}: unexpected provider response"))
                    .with_source(err)
            })?
            .stamped(Utc::now());

        let now = Utc::now();
        if session_expiry(&refreshed, now) <= session_expiry(current, now) {
            tracing::warn!("Refreshed session does not extend the expiry");
        }
        self.store_and_emit(&refreshed, AuthEvent::TokenRefreshed);
        Ok(refreshed)
    }

    /// Expires the session only if it still holds the rejected refresh token.
    fn expire_if_current(&self, rejected: &GoTrueSession) {
        let still_current = self
            .client
            .current_session()
            .is_some_and(|session| session.refresh_token == rejected.refresh_token);
        if still_current {
            self.expire_session();
        }
    }

    /// Best-effort profile row creation after sign-up.
    async fn create_profile_row(&self, user_id: &str) {
        let Some(profiles) = &self.profiles else {
            return;
        };
        if let Err(err) = profiles.create_profile(user_id).await {
            tracing::warn!(user = %user_id, "Failed to create profile: {err:#}");
        }
    }

    /// Probes whether an account exists by signing in with a throwaway
    /// password.
    ///
    /// Only a successful probe proves existence. An explicit "user not found"
    /// proves absence; every other answer, including the deliberately vague
    /// "invalid login credentials" and transport failures, cannot confirm the
    /// account and also yields `false`. A successful probe's session is
    /// logged out immediately. The stored session is never touched and no
    /// events are emitted.
    pub async fn check_user_exists(&self, email: &str) -> bool {
        let probe_password = format!("probe-{}", uuid::Uuid::new_v4());
        let request = self
            .client
            .http()
            .post(self.client.auth_url("/token?grant_type=password"))
            .json(&json!({ "email": email, "password": probe_password }));

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!("Existence probe failed: {err}");
                return false;
            }
        };

        if !response.status().is_success() {
            let failure = failure_from_response(response).await;
            if says_user_not_found(&failure) {
                tracing::debug!("existence probe: account not found");
            } else {
                tracing::debug!(%failure, "existence probe inconclusive");
            }
            return false;
        }

        match response.json::<GoTrueSession>().await {
            Ok(session) => {
                self.logout_token(&session.access_token).await;
                true
            }
            Err(err) => {
                tracing::warn!("Existence probe returned an unreadable session: {err}");
                false
            }
        }
    }

    /// Revokes a token without touching the stored session.
    async fn logout_token(&self, access_token: &str) {
        let result = self
            .client
            .http()
            .post(self.client.auth_url("/logout"))
            .bearer_auth(access_token)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => tracing::warn!(status = %response.status(), "Probe logout rejected"),
            Err(err) => tracing::warn!("Probe logout failed: {err}"),
        }
    }

    async fn put_user(
        &self,
        session: &GoTrueSession,
        body: &UserUpdateRequest<'_>,
        fallback: &str,
    ) -> AuthResult<GoTrueUser> {
        let request = self
            .client
            .http()
            .put(self.client.auth_url("/user"))
            .bearer_auth(&session.access_token)
            .json(body);
        let user = self.send_json::<GoTrueUser>(request, fallback).await?;

        let mut updated = session.clone();
        updated.user = user.clone();
        self.store_and_emit(&updated, AuthEvent::UserUpdated);
        Ok(user)
    }
}

#[async_trait]
impl AuthService for SupabaseAuthAdapter {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<UserMetadata>,
    ) -> AuthResult<AuthResponse> {
        const FALLBACK: &str = "Failed to sign up";

        let body = SignUpRequest {
            email,
            password,
            data: metadata.as_ref(),
        };
        let request = self
            .client
            .http()
            .post(self.client.auth_url("/signup"))
            .json(&body);
        let value = self.send_json::<serde_json::Value>(request, FALLBACK).await?;

        // Without auto-confirm the server answers with a bare user.
        if value.get("access_token").is_none() {
            return Err(AuthError::unknown(
                "Sign up succeeded but no user or session returned",
            ));
        }
        let session = serde_json::from_value::<GoTrueSession>(value)
            .map_err(|err| {
                AuthError::unknown(format!("{FALLBACK}: unexpected provider response"))
                    .with_source(err)
            })?
            .stamped(Utc::now());

        self.store_and_emit(&session, AuthEvent::SignedIn);
        self.create_profile_row(&session.user.id).await;

        Ok(AuthResponse {
            user: map_user(&session.user),
            session: map_session(&session, Utc::now()),
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthResponse> {
        let request = self
            .client
            .http()
            .post(self.client.auth_url("/token?grant_type=password"))
            .json(&json!({ "email": email, "password": password }));
        let session = self
            .send_json::<GoTrueSession>(request, "Failed to sign in")
            .await?
            .stamped(Utc::now());

        self.store_and_emit(&session, AuthEvent::SignedIn);
        Ok(AuthResponse {
            user: map_user(&session.user),
            session: map_session(&session, Utc::now()),
        })
    }

    async fn sign_in_with_provider(&self, provider: OAuthProvider) -> AuthResult<AuthResponse> {
        Err(AuthError::new(
            AuthErrorCode::OAuthProviderError,
            format!("OAuth provider \"{provider}\" is not yet implemented"),
        ))
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let Some(session) = self.stored_session() else {
            tracing::debug!("sign out without session");
            return Ok(());
        };

        const FALLBACK: &str = "Failed to sign out";

        let response = self
            .client
            .http()
            .post(self.client.auth_url("/logout?scope=global"))
            .bearer_auth(&session.access_token)
            .send()
            .await
            .map_err(|err| classify(Some(&ProviderFailure::transport(&err)), FALLBACK))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            // 401/403/404: the token is already unusable server-side.
            if matches!(status, 401 | 403 | 404) {
                tracing::debug!(status, "logout rejected token; clearing locally");
            } else {
                let failure = failure_from_response(response).await;
                return Err(classify(Some(&failure), FALLBACK));
            }
        }

        self.expire_session();
        Ok(())
    }

    async fn get_current_user(&self) -> Option<AuthUser> {
        let session = self.valid_session().await?;
        let request = self
            .client
            .http()
            .get(self.client.auth_url("/user"))
            .bearer_auth(&session.access_token);
        match self
            .send_json::<GoTrueUser>(request, "Failed to get user")
            .await
        {
            Ok(user) => Some(map_user(&user)),
            Err(err) => {
                tracing::debug!("get_current_user degraded to none: {err}");
                None
            }
        }
    }

    async fn get_session(&self) -> Option<AuthSession> {
        self.valid_session()
            .await
            .map(|session| map_session(&session, Utc::now()))
    }

    fn on_auth_state_change(&self, callback: AuthStateCallback) -> Subscription {
        self.listeners.subscribe(callback)
    }

    async fn reset_password(&self, email: &str) -> AuthResult<PasswordResetResponse> {
        if !self.check_user_exists(email).await {
            return Err(AuthError::new(AuthErrorCode::UserNotFound, NO_ACCOUNT_MESSAGE));
        }

        let mut body = json!({ "email": email });
        if let Some(redirect) = &self.reset_redirect_url {
            body["redirect_to"] = json!(redirect);
        }
        let request = self
            .client
            .http()
            .post(self.client.auth_url("/recover"))
            .json(&body);

        let response = request.send().await.map_err(|err| {
            classify(
                Some(&ProviderFailure::transport(&err)),
                "Failed to send reset email",
            )
        })?;
        if !response.status().is_success() {
            let failure = failure_from_response(response).await;
            if says_user_not_found(&failure) {
                return Err(
                    AuthError::new(AuthErrorCode::UserNotFound, NO_ACCOUNT_MESSAGE)
                        .with_source(failure),
                );
            }
            return Err(classify(Some(&failure), "Failed to send reset email"));
        }

        Ok(PasswordResetResponse {
            success: true,
            message: "Password reset email sent successfully".to_string(),
        })
    }

    async fn update_password(&self, new_password: &str) -> AuthResult<()> {
        let session = self.valid_session().await.ok_or_else(AuthError::no_session)?;
        let body = UserUpdateRequest {
            password: Some(new_password),
            ..UserUpdateRequest::default()
        };
        self.put_user(&session, &body, "Failed to update password")
            .await
            .map(|_| ())
    }

    async fn update_account(&self, update: AccountUpdate) -> AuthResult<AuthUser> {
        let session = self.valid_session().await.ok_or_else(AuthError::no_session)?;
        let data = (update.name.is_some() || update.avatar_url.is_some()).then(|| UserMetadata {
            name: update.name.clone(),
            avatar_url: update.avatar_url.clone(),
        });
        let body = UserUpdateRequest {
            email: update.email.as_deref(),
            password: None,
            data,
        };
        let user = self
            .put_user(&session, &body, "Failed to update profile")
            .await?;
        Ok(map_user(&user))
    }

    async fn refresh_session(&self) -> AuthResult<AuthSession> {
        if self.stored_session().is_none() {
            return Err(AuthError::new(
                AuthErrorCode::SessionExpired,
                REFRESH_FAILED_MESSAGE,
            ));
        }
        let refreshed = self
            .refresh_stored_if(|_| true)
            .await?
            .ok_or_else(|| AuthError::new(AuthErrorCode::SessionExpired, REFRESH_FAILED_MESSAGE))?;
        Ok(map_session(&refreshed, Utc::now()))
    }
}

fn is_expired(session: &GoTrueSession) -> bool {
    let now = Utc::now();
    session_expiry(session, now) <= now
}

/// Refresh failures worth retrying later rather than signing out.
fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}
