//! The capability contract every identity-provider adapter implements.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use gatehouse_types::{
    AccountUpdate, AuthEvent, AuthResponse, AuthResult, AuthSession, AuthUser, OAuthProvider,
    PasswordResetResponse, UserMetadata,
};

/// Listener invoked once per provider-originated auth event.
pub type AuthStateCallback = Arc<dyn Fn(AuthEvent, Option<AuthSession>) + Send + Sync>;

/// Provider-agnostic authentication service.
///
/// Every fallible operation reports failures as exactly one
/// [`gatehouse_types::AuthError`]; provider-native errors never cross this
/// boundary. `get_current_user`, `get_session` and `is_session_valid` never
/// fail: retrieval errors degrade to "not authenticated".
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Registers a new account with email and password.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<UserMetadata>,
    ) -> AuthResult<AuthResponse>;

    /// Signs in with email and password.
    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthResponse>;

    /// Signs in through an OAuth provider.
    ///
    /// Adapters without OAuth support answer with
    /// [`gatehouse_types::AuthErrorCode::OAuthProviderError`].
    async fn sign_in_with_provider(&self, provider: OAuthProvider) -> AuthResult<AuthResponse>;

    /// Signs out. Succeeds as a no-op when there is no active session.
    async fn sign_out(&self) -> AuthResult<()>;

    /// Returns the current user, or `None` if unauthenticated or unreachable.
    async fn get_current_user(&self) -> Option<AuthUser>;

    /// Returns the current session, or `None` if there is none.
    async fn get_session(&self) -> Option<AuthSession>;

    /// Registers a listener for auth events.
    ///
    /// Events are delivered sequentially, in provider order. Dropping or
    /// unsubscribing the returned handle detaches the listener.
    fn on_auth_state_change(&self, callback: AuthStateCallback) -> Subscription;

    /// Sends a password reset email if the account can be confirmed to exist.
    async fn reset_password(&self, email: &str) -> AuthResult<PasswordResetResponse>;

    /// Changes the password of the signed-in user.
    async fn update_password(&self, new_password: &str) -> AuthResult<()>;

    /// Updates identity-level user fields (name, avatar, email).
    async fn update_account(&self, update: AccountUpdate) -> AuthResult<AuthUser>;

    /// Renews the current session.
    async fn refresh_session(&self) -> AuthResult<AuthSession>;

    /// Returns true if a session exists and has not expired.
    async fn is_session_valid(&self) -> bool {
        self.get_session()
            .await
            .is_some_and(|session| session.is_valid())
    }
}

// ============================================================================
// Subscription handle
// ============================================================================

type DetachFn = Box<dyn FnOnce() + Send>;

/// Handle returned by [`AuthService::on_auth_state_change`].
///
/// The detach action runs exactly once, on the first call to
/// [`Subscription::unsubscribe`] or on drop.
pub struct Subscription {
    detach: Mutex<Option<DetachFn>>,
}

impl Subscription {
    /// Creates a subscription that runs `detach` when released.
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Mutex::new(Some(Box::new(detach))),
        }
    }

    /// Creates a subscription with nothing to detach.
    pub fn noop() -> Self {
        Self {
            detach: Mutex::new(None),
        }
    }

    /// Detaches the listener. Further calls do nothing.
    pub fn unsubscribe(&self) {
        let detach = self
            .detach
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(detach) = detach {
            detach();
        }
    }

    /// Returns true while the listener is still attached.
    pub fn is_active(&self) -> bool {
        self.detach
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

// ============================================================================
// Listener registry
// ============================================================================

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    entries: Vec<(u64, AuthStateCallback)>,
}

/// Ordered registry of auth listeners, for adapters to build
/// [`AuthService::on_auth_state_change`] on.
#[derive(Clone, Default)]
pub struct AuthListeners {
    table: Arc<Mutex<ListenerTable>>,
}

impl AuthListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener and returns the handle that removes it.
    pub fn subscribe(&self, callback: AuthStateCallback) -> Subscription {
        let id = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            let id = table.next_id;
            table.next_id += 1;
            table.entries.push((id, callback));
            id
        };
        tracing::debug!(listener = id, "auth listener attached");

        let table: Weak<Mutex<ListenerTable>> = Arc::downgrade(&self.table);
        Subscription::new(move || {
            if let Some(table) = table.upgrade() {
                table
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entries
                    .retain(|(entry_id, _)| *entry_id != id);
                tracing::debug!(listener = id, "auth listener detached");
            }
        })
    }

    /// Delivers an event to every listener, in registration order.
    ///
    /// Listeners are invoked outside the registry lock, so a listener may
    /// subscribe or unsubscribe while being notified.
    pub fn emit(&self, event: AuthEvent, session: Option<&AuthSession>) {
        let listeners: Vec<AuthStateCallback> = self
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        tracing::debug!(%event, listeners = listeners.len(), "emitting auth event");
        for listener in listeners {
            listener(event, session.cloned());
        }
    }

    /// Returns the number of attached listeners.
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for AuthListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthListeners")
            .field("len", &self.len())
            .finish()
    }
}
