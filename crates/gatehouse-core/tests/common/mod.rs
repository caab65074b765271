//! In-process auth adapter for store and guard tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use gatehouse_core::{AuthListeners, AuthService, AuthState, AuthStateCallback, AuthStore, Subscription};
use gatehouse_types::{
    AccountUpdate, AuthError, AuthErrorCode, AuthEvent, AuthResponse, AuthResult, AuthSession,
    AuthUser, OAuthProvider, PasswordResetResponse, UserMetadata,
};
use tokio::sync::Notify;

pub fn user(id: &str) -> AuthUser {
    let now = Utc::now();
    AuthUser {
        id: id.to_string(),
        email: format!("{id}@example.com"),
        email_verified: Some(now),
        name: Some(format!("User {id}")),
        avatar_url: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn session(user: &AuthUser, token: &str) -> AuthSession {
    AuthSession {
        id: user.id.clone(),
        user_id: user.id.clone(),
        token: token.to_string(),
        expires_at: Utc::now() + chrono::Duration::hours(1),
        user: Some(user.clone()),
    }
}

/// Adapter double that records listener attach/detach counts.
#[derive(Default)]
pub struct FakeAuthService {
    listeners: AuthListeners,
    user: Mutex<Option<AuthUser>>,
    session: Mutex<Option<AuthSession>>,
    pub attaches: AtomicUsize,
    pub detaches: Arc<AtomicUsize>,
    pub user_fetches: AtomicUsize,
    /// When set, the first `get_session` call waits for a notification.
    session_gate: Mutex<Option<Arc<Notify>>>,
    panic_on_init: bool,
}

impl FakeAuthService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user: AuthUser) -> Self {
        let fake = Self::default();
        fake.set_signed_in(&user, "token-initial");
        fake
    }

    pub fn panicking() -> Self {
        Self {
            panic_on_init: true,
            ..Self::default()
        }
    }

    pub fn gate_session(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.session_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn set_signed_in(&self, user: &AuthUser, token: &str) -> AuthSession {
        let session = session(user, token);
        *self.user.lock().unwrap() = Some(user.clone());
        *self.session.lock().unwrap() = Some(session.clone());
        session
    }

    pub fn clear(&self) {
        *self.user.lock().unwrap() = None;
        *self.session.lock().unwrap() = None;
    }

    /// Emits an event as the provider would.
    pub fn emit(&self, event: AuthEvent, session: Option<&AuthSession>) {
        self.listeners.emit(event, session);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

#[async_trait]
impl AuthService for FakeAuthService {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        _metadata: Option<UserMetadata>,
    ) -> AuthResult<AuthResponse> {
        self.sign_in(email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthResponse> {
        if password == "wrong" {
            return Err(AuthError::new(
                AuthErrorCode::InvalidCredentials,
                "Invalid login credentials",
            ));
        }
        let id = email.split('@').next().unwrap_or(email);
        let user = user(id);
        let session = self.set_signed_in(&user, "token-signed-in");
        self.emit(AuthEvent::SignedIn, Some(&session));
        Ok(AuthResponse { user, session })
    }

    async fn sign_in_with_provider(&self, provider: OAuthProvider) -> AuthResult<AuthResponse> {
        Err(AuthError::new(
            AuthErrorCode::OAuthProviderError,
            format!("OAuth provider \"{provider}\" is not yet implemented"),
        ))
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let had_session = self.session.lock().unwrap().is_some();
        if had_session {
            self.clear();
            self.emit(AuthEvent::SignedOut, None);
        }
        Ok(())
    }

    async fn get_current_user(&self) -> Option<AuthUser> {
        assert!(!self.panic_on_init, "provider exploded");
        self.user_fetches.fetch_add(1, Ordering::SeqCst);
        self.user.lock().unwrap().clone()
    }

    async fn get_session(&self) -> Option<AuthSession> {
        let gate = self.session_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.session.lock().unwrap().clone()
    }

    fn on_auth_state_change(&self, callback: AuthStateCallback) -> Subscription {
        self.attaches.fetch_add(1, Ordering::SeqCst);
        let inner = self.listeners.subscribe(callback);
        let detaches = Arc::clone(&self.detaches);
        Subscription::new(move || {
            detaches.fetch_add(1, Ordering::SeqCst);
            inner.unsubscribe();
        })
    }

    async fn reset_password(&self, _email: &str) -> AuthResult<PasswordResetResponse> {
        Ok(PasswordResetResponse {
            success: true,
            message: "Password reset email sent".to_string(),
        })
    }

    async fn update_password(&self, _new_password: &str) -> AuthResult<()> {
        if self.session.lock().unwrap().is_none() {
            return Err(AuthError::no_session());
        }
        Ok(())
    }

    async fn update_account(&self, update: AccountUpdate) -> AuthResult<AuthUser> {
        let updated = {
            let mut guard = self.user.lock().unwrap();
            let Some(user) = guard.as_mut() else {
                return Err(AuthError::no_session());
            };
            if let Some(name) = update.name {
                user.name = Some(name);
            }
            user.updated_at = Utc::now();
            user.clone()
        };
        let session = self.session.lock().unwrap().clone();
        self.emit(AuthEvent::UserUpdated, session.as_ref());
        Ok(updated)
    }

    async fn refresh_session(&self) -> AuthResult<AuthSession> {
        let current = self.user.lock().unwrap().clone();
        let Some(user) = current else {
            return Err(AuthError::new(
                AuthErrorCode::SessionExpired,
                "Session expired. Please sign in again.",
            ));
        };
        let session = self.set_signed_in(&user, "token-refreshed");
        self.emit(AuthEvent::TokenRefreshed, Some(&session));
        Ok(session)
    }
}

/// Waits until the store's state satisfies `predicate`.
pub async fn wait_for_state(store: &AuthStore, predicate: impl Fn(&AuthState) -> bool) -> AuthState {
    let mut rx = store.watch();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|state| predicate(state)))
        .await
        .expect("auth state did not converge")
        .expect("auth store dropped")
        .clone()
}
