//! Auth state store.
//!
//! Reconciles the initial user/session fetch and the adapter's event stream
//! into one `(user, session, is_loading)` tuple. The store is the only writer;
//! everything else reads through [`AuthStore::state`] or a
//! [`tokio::sync::watch::Receiver`].
//!
//! Lifecycle:
//! 1. [`AuthStore::mount`] attaches exactly one event listener, then starts
//!    the initial fetch. Events arriving meanwhile are queued, never dropped.
//! 2. The worker applies the fetch result, then drains events one at a time
//!    (including any user re-fetch) through the pure [`reduce`] function.
//! 3. [`AuthStore::unmount`] (or drop) cancels in-flight work and detaches the
//!    listener. Writes that would land after teardown are discarded.

use std::sync::Arc;

use gatehouse_types::{
    AccountUpdate, AuthEvent, AuthResponse, AuthResult, AuthSession, AuthUser, OAuthProvider,
    PasswordResetResponse, UserMetadata,
};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::service::{AuthService, AuthStateCallback, Subscription};

/// Coarse auth phase derived from [`AuthState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Initializing,
    Authenticated,
    Unauthenticated,
}

/// Reactive auth state.
///
/// `is_authenticated` is derived, never stored, so it always equals
/// `user.is_some() && session.is_some()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub user: Option<AuthUser>,
    pub session: Option<AuthSession>,
    pub is_loading: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::initializing()
    }
}

impl AuthState {
    /// State on mount, before the initial fetch completes.
    pub fn initializing() -> Self {
        Self {
            user: None,
            session: None,
            is_loading: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.session.is_some()
    }

    pub fn phase(&self) -> AuthPhase {
        if self.is_loading {
            AuthPhase::Initializing
        } else if self.is_authenticated() {
            AuthPhase::Authenticated
        } else {
            AuthPhase::Unauthenticated
        }
    }
}

/// Input to the store's state machine.
#[derive(Debug, Clone)]
pub enum Transition {
    /// The initial concurrent fetch finished; either side may be `None`.
    Initialized {
        user: Option<AuthUser>,
        session: Option<AuthSession>,
    },
    /// The initial fetch failed abnormally.
    InitializationFailed,
    /// A provider event, with the user re-fetched after it (if applicable).
    Event {
        event: AuthEvent,
        session: Option<AuthSession>,
        user: Option<AuthUser>,
    },
    /// An explicit `get_current_user` read.
    UserFetched(Option<AuthUser>),
    /// An explicit `get_session` read.
    SessionFetched(Option<AuthSession>),
}

/// Returns true if the store re-reads the current user after `event`.
///
/// The event's session snapshot may carry stale user metadata, so the user
/// is always fetched fresh.
pub fn refetches_user(event: AuthEvent) -> bool {
    matches!(
        event,
        AuthEvent::SignedIn | AuthEvent::TokenRefreshed | AuthEvent::UserUpdated
    )
}

/// Pure state transition function.
pub fn reduce(state: &AuthState, transition: Transition) -> AuthState {
    match transition {
        Transition::Initialized { user, session } => AuthState {
            user,
            session,
            is_loading: false,
        },
        Transition::InitializationFailed => AuthState {
            user: None,
            session: None,
            is_loading: false,
        },
        Transition::Event {
            event,
            session,
            user,
        } => match event {
            AuthEvent::SignedIn | AuthEvent::TokenRefreshed | AuthEvent::UserUpdated => {
                AuthState {
                    user,
                    session,
                    is_loading: state.is_loading,
                }
            }
            AuthEvent::SignedOut => AuthState {
                user: None,
                session: None,
                is_loading: state.is_loading,
            },
            // Recovery is handled by a dedicated screen flow.
            AuthEvent::PasswordRecovery => state.clone(),
        },
        Transition::UserFetched(user) => AuthState {
            user,
            ..state.clone()
        },
        Transition::SessionFetched(session) => AuthState {
            session,
            ..state.clone()
        },
    }
}

struct QueuedEvent {
    event: AuthEvent,
    session: Option<AuthSession>,
}

/// Single writer of auth state, bound to one adapter instance.
pub struct AuthStore {
    service: Arc<dyn AuthService>,
    state: Arc<watch::Sender<AuthState>>,
    subscription: Subscription,
    cancel: CancellationToken,
}

impl AuthStore {
    /// Mounts a store over `service`.
    ///
    /// Must be called within a Tokio runtime. The listener is attached before
    /// the initial fetch starts.
    pub fn mount(service: Arc<dyn AuthService>) -> Self {
        let (state_tx, _) = watch::channel(AuthState::initializing());
        let state = Arc::new(state_tx);
        let cancel = CancellationToken::new();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let callback: AuthStateCallback = Arc::new(move |event, session| {
            if events_tx.send(QueuedEvent { event, session }).is_err() {
                tracing::trace!(%event, "auth store worker gone; event ignored");
            }
        });
        let subscription = service.on_auth_state_change(callback);

        tokio::spawn(run_worker(
            Arc::clone(&service),
            Arc::clone(&state),
            events_rx,
            cancel.clone(),
        ));

        tracing::debug!("auth store mounted");
        Self {
            service,
            state,
            subscription,
            cancel,
        }
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Returns a receiver notified on every state change.
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Waits until initialization has finished and returns the state.
    ///
    /// Returns immediately with the last state if the store is unmounted.
    pub async fn ready(&self) -> AuthState {
        let mut rx = self.state.subscribe();
        tokio::select! {
            result = rx.wait_for(|state| !state.is_loading) => drop(result),
            () = self.cancel.cancelled() => {}
        }
        self.state()
    }

    /// Returns the adapter this store is bound to.
    pub fn service(&self) -> &Arc<dyn AuthService> {
        &self.service
    }

    pub fn is_mounted(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Cancels in-flight work and detaches the event listener. Idempotent.
    pub fn unmount(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!("auth store unmounted");
        }
        self.cancel.cancel();
        self.subscription.unsubscribe();
    }

    // ========================================================================
    // Wrapped operations
    //
    // Results are passed through unmodified; state converges through the
    // event subscription, not through these return values.
    // ========================================================================

    /// # Errors
    /// Returns the adapter's error unchanged.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<UserMetadata>,
    ) -> AuthResult<AuthResponse> {
        self.service.sign_up(email, password, metadata).await
    }

    /// # Errors
    /// Returns the adapter's error unchanged.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthResponse> {
        self.service.sign_in(email, password).await
    }

    /// # Errors
    /// Returns the adapter's error unchanged.
    pub async fn sign_in_with_provider(&self, provider: OAuthProvider) -> AuthResult<AuthResponse> {
        self.service.sign_in_with_provider(provider).await
    }

    /// # Errors
    /// Returns the adapter's error unchanged.
    pub async fn sign_out(&self) -> AuthResult<()> {
        self.service.sign_out().await
    }

    /// Reads the current user and stores it.
    pub async fn get_current_user(&self) -> Option<AuthUser> {
        let user = self.service.get_current_user().await;
        apply(&self.state, &self.cancel, Transition::UserFetched(user.clone()));
        user
    }

    /// Reads the current session and stores it.
    pub async fn get_session(&self) -> Option<AuthSession> {
        let session = self.service.get_session().await;
        apply(
            &self.state,
            &self.cancel,
            Transition::SessionFetched(session.clone()),
        );
        session
    }

    /// # Errors
    /// Returns the adapter's error unchanged.
    pub async fn reset_password(&self, email: &str) -> AuthResult<PasswordResetResponse> {
        self.service.reset_password(email).await
    }

    /// # Errors
    /// Returns the adapter's error unchanged.
    pub async fn update_password(&self, new_password: &str) -> AuthResult<()> {
        self.service.update_password(new_password).await
    }

    /// # Errors
    /// Returns the adapter's error unchanged.
    pub async fn update_account(&self, update: AccountUpdate) -> AuthResult<AuthUser> {
        self.service.update_account(update).await
    }

    /// # Errors
    /// Returns the adapter's error unchanged.
    pub async fn refresh_session(&self) -> AuthResult<AuthSession> {
        self.service.refresh_session().await
    }

    pub async fn is_session_valid(&self) -> bool {
        self.service.is_session_valid().await
    }
}

impl Drop for AuthStore {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl std::fmt::Debug for AuthStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStore")
            .field("state", &*self.state.borrow())
            .field("mounted", &self.is_mounted())
            .finish_non_exhaustive()
    }
}

/// Applies a transition unless the store has been torn down.
fn apply(
    state: &watch::Sender<AuthState>,
    cancel: &CancellationToken,
    transition: Transition,
) -> bool {
    if cancel.is_cancelled() {
        tracing::debug!(?transition, "store unmounted; discarding state update");
        return false;
    }
    state.send_if_modified(|current| {
        let next = reduce(current, transition);
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
    true
}

async fn run_worker(
    service: Arc<dyn AuthService>,
    state: Arc<watch::Sender<AuthState>>,
    mut events: mpsc::UnboundedReceiver<QueuedEvent>,
    cancel: CancellationToken,
) {
    let mut init = tokio::spawn({
        let service = Arc::clone(&service);
        async move { tokio::join!(service.get_current_user(), service.get_session()) }
    });

    let transition = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            init.abort();
            return;
        }
        joined = &mut init => match joined {
            Ok((user, session)) => Transition::Initialized { user, session },
            Err(err) => {
                tracing::warn!("Failed to initialize auth state: {err}");
                Transition::InitializationFailed
            }
        },
    };
    if !apply(&state, &cancel, transition) {
        return;
    }
    tracing::debug!(phase = ?state.borrow().phase(), "auth state initialized");

    loop {
        let queued = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            queued = events.recv() => match queued {
                Some(queued) => queued,
                None => break,
            },
        };
        tracing::debug!(event = %queued.event, "auth state changed");

        let user = if refetches_user(queued.event) {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                user = service.get_current_user() => user,
            }
        } else {
            None
        };

        let transition = Transition::Event {
            event: queued.event,
            session: queued.session,
            user,
        };
        if !apply(&state, &cancel, transition) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn user(id: &str) -> AuthUser {
        let now = Utc::now();
        AuthUser {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            email_verified: None,
            name: None,
            avatar_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn session(id: &str) -> AuthSession {
        AuthSession {
            id: id.to_string(),
            user_id: id.to_string(),
            token: format!("token-{id}"),
            expires_at: Utc::now() + Duration::hours(1),
            user: None,
        }
    }

    fn signed_in() -> AuthState {
        AuthState {
            user: Some(user("u1")),
            session: Some(session("u1")),
            is_loading: false,
        }
    }

    fn all_transitions() -> Vec<Transition> {
        let mut transitions = vec![
            Transition::Initialized {
                user: Some(user("u1")),
                session: Some(session("u1")),
            },
            Transition::Initialized {
                user: Some(user("u1")),
                session: None,
            },
            Transition::Initialized {
                user: None,
                session: None,
            },
            Transition::InitializationFailed,
            Transition::UserFetched(None),
            Transition::UserFetched(Some(user("u2"))),
            Transition::SessionFetched(None),
            Transition::SessionFetched(Some(session("u2"))),
        ];
        for event in AuthEvent::all() {
            for (session, user) in [
                (Some(session("u3")), Some(user("u3"))),
                (Some(session("u3")), None),
                (None, Some(user("u3"))),
                (None, None),
            ] {
                transitions.push(Transition::Event {
                    event: *event,
                    session,
                    user,
                });
            }
        }
        transitions
    }

    #[test]
    fn test_initial_state_is_loading() {
        let state = AuthState::default();
        assert!(state.is_loading);
        assert!(!state.is_authenticated());
        assert_eq!(state.phase(), AuthPhase::Initializing);
    }

    #[test]
    fn test_initialized_with_both_is_authenticated() {
        let next = reduce(
            &AuthState::initializing(),
            Transition::Initialized {
                user: Some(user("u1")),
                session: Some(session("u1")),
            },
        );
        assert_eq!(next.phase(), AuthPhase::Authenticated);
    }

    #[test]
    fn test_initialized_with_only_user_is_unauthenticated() {
        let next = reduce(
            &AuthState::initializing(),
            Transition::Initialized {
                user: Some(user("u1")),
                session: None,
            },
        );
        assert_eq!(next.phase(), AuthPhase::Unauthenticated);
        assert!(!next.is_authenticated());
    }

    #[test]
    fn test_initialization_failure_degrades_to_unauthenticated() {
        let next = reduce(&AuthState::initializing(), Transition::InitializationFailed);
        assert_eq!(next.phase(), AuthPhase::Unauthenticated);
    }

    #[test]
    fn test_signed_out_clears_from_any_state() {
        for start in [signed_in(), AuthState::initializing(), AuthState {
            user: Some(user("u1")),
            session: None,
            is_loading: false,
        }] {
            let next = reduce(
                &start,
                Transition::Event {
                    event: AuthEvent::SignedOut,
                    session: Some(session("ignored")),
                    user: Some(user("ignored")),
                },
            );
            assert!(next.user.is_none());
            assert!(next.session.is_none());
        }
    }

    #[test]
    fn test_password_recovery_is_inert() {
        let start = signed_in();
        let next = reduce(
            &start,
            Transition::Event {
                event: AuthEvent::PasswordRecovery,
                session: None,
                user: None,
            },
        );
        assert_eq!(next, start);
    }

    #[test]
    fn test_token_refreshed_adopts_event_session_and_fresh_user() {
        let refreshed = session("u1-refreshed");
        let next = reduce(
            &signed_in(),
            Transition::Event {
                event: AuthEvent::TokenRefreshed,
                session: Some(refreshed.clone()),
                user: Some(user("u1")),
            },
        );
        assert_eq!(next.session, Some(refreshed));
        assert!(next.is_authenticated());
    }

    /// Property: `is_authenticated` matches `user && session` after every
    /// sequence of up to three transitions.
    #[test]
    fn test_is_authenticated_invariant_over_transition_sequences() {
        let transitions = all_transitions();
        let mut frontier = vec![AuthState::initializing()];
        for _ in 0..3 {
            let mut next_frontier = Vec::new();
            for state in &frontier {
                for transition in &transitions {
                    let next = reduce(state, transition.clone());
                    assert_eq!(
                        next.is_authenticated(),
                        next.user.is_some() && next.session.is_some()
                    );
                    match next.phase() {
                        AuthPhase::Initializing => assert!(next.is_loading),
                        AuthPhase::Authenticated => assert!(next.is_authenticated()),
                        AuthPhase::Unauthenticated => assert!(!next.is_authenticated()),
                    }
                    next_frontier.push(next);
                }
            }
            next_frontier.dedup();
            next_frontier.truncate(400);
            frontier = next_frontier;
        }
    }
}
