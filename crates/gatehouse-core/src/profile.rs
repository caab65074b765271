//! Extended profile records, kept apart from authentication.
//!
//! [`ProfileStore`] follows the authenticated user id published by the auth
//! store: it loads the profile when the id changes and clears it when the
//! user goes away.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use gatehouse_types::{Profile, ProfileChanges};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::store::AuthState;

/// Data-record API for profiles, keyed by user id.
#[async_trait]
pub trait ProfileService: Send + Sync {
    /// Returns the user's profile, or `None` if it was never created.
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>>;

    /// Creates an empty profile for the user.
    async fn create_profile(&self, user_id: &str) -> Result<Profile>;

    /// Applies `changes` to the user's existing profile.
    async fn update_profile(&self, user_id: &str, changes: ProfileChanges) -> Result<Profile>;
}

/// Reactive profile state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileState {
    /// User the state belongs to.
    pub user_id: Option<String>,
    pub profile: Option<Profile>,
    pub is_loading: bool,
    /// Message of the last failed load or update.
    pub error: Option<String>,
}

/// Profile cache bound to the auth state.
pub struct ProfileStore {
    service: Arc<dyn ProfileService>,
    auth: watch::Receiver<AuthState>,
    state: Arc<watch::Sender<ProfileState>>,
    cancel: CancellationToken,
}

impl ProfileStore {
    /// Mounts the store and starts following `auth`. Requires a Tokio runtime.
    pub fn mount(service: Arc<dyn ProfileService>, auth: watch::Receiver<AuthState>) -> Self {
        let (state_tx, _) = watch::channel(ProfileState::default());
        let state = Arc::new(state_tx);
        let cancel = CancellationToken::new();

        tokio::spawn(follow_user(
            Arc::clone(&service),
            auth.clone(),
            Arc::clone(&state),
            cancel.clone(),
        ));

        Self {
            service,
            auth,
            state,
            cancel,
        }
    }

    pub fn state(&self) -> ProfileState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ProfileState> {
        self.state.subscribe()
    }

    fn current_user_id(&self) -> Option<String> {
        self.auth.borrow().user.as_ref().map(|user| user.id.clone())
    }

    /// Re-fetches the profile of the current user.
    ///
    /// Returns `Ok(None)` without a request when nobody is signed in.
    ///
    /// # Errors
    /// Returns the profile service error; it is also recorded in the state.
    pub async fn refresh_profile(&self) -> Result<Option<Profile>> {
        let Some(user_id) = self.current_user_id() else {
            return Ok(None);
        };
        load(self.service.as_ref(), &self.state, &user_id).await
    }

    /// Updates the current user's profile, creating it first if absent.
    ///
    /// Returns `Ok(None)` when nobody is signed in.
    ///
    /// # Errors
    /// Returns the update error; a failed creation attempt is only logged,
    /// since a concurrent writer may have created the row already.
    pub async fn update_profile(&self, changes: ProfileChanges) -> Result<Option<Profile>> {
        let Some(user_id) = self.current_user_id() else {
            return Ok(None);
        };
        if self.cancel.is_cancelled() {
            anyhow::bail!("Profile store is unmounted");
        }

        self.state.send_modify(|state| state.is_loading = true);

        let known = self.state.borrow().profile.is_some();
        if !known && let Err(err) = self.service.create_profile(&user_id).await {
            tracing::debug!("Profile creation before update failed: {err:#}");
        }

        match self.service.update_profile(&user_id, changes).await {
            Ok(profile) => {
                self.state.send_modify(|state| {
                    state.user_id = Some(user_id);
                    state.profile = Some(profile.clone());
                    state.is_loading = false;
                    state.error = None;
                });
                Ok(Some(profile))
            }
            Err(err) => {
                tracing::warn!("Failed to update profile: {err:#}");
                self.state.send_modify(|state| {
                    state.is_loading = false;
                    state.error = Some(format!("{err:#}"));
                });
                Err(err)
            }
        }
    }

    /// Stops following the auth state. Idempotent.
    pub fn unmount(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ProfileStore {
    fn drop(&mut self) {
        self.unmount();
    }
}

async fn load(
    service: &dyn ProfileService,
    state: &watch::Sender<ProfileState>,
    user_id: &str,
) -> Result<Option<Profile>> {
    state.send_modify(|state| {
        state.is_loading = true;
        if state.user_id.as_deref() != Some(user_id) {
            state.user_id = Some(user_id.to_string());
            state.profile = None;
        }
    });

    match service.get_profile(user_id).await {
        Ok(profile) => {
            state.send_modify(|state| {
                state.profile = profile.clone();
                state.is_loading = false;
                state.error = None;
            });
            Ok(profile)
        }
        Err(err) => {
            tracing::warn!("Failed to load profile: {err:#}");
            state.send_modify(|state| {
                state.is_loading = false;
                state.error = Some(format!("{err:#}"));
            });
            Err(err)
        }
    }
}

async fn follow_user(
    service: Arc<dyn ProfileService>,
    mut auth: watch::Receiver<AuthState>,
    state: Arc<watch::Sender<ProfileState>>,
    cancel: CancellationToken,
) {
    let mut followed: Option<String> = None;
    loop {
        let user_id = auth
            .borrow_and_update()
            .user
            .as_ref()
            .map(|user| user.id.clone());

        if user_id != followed {
            followed.clone_from(&user_id);
            match user_id {
                None => {
                    let previous = state.send_replace(ProfileState::default());
                    if let Some(previous) = previous.user_id {
                        tracing::debug!(user = %previous, "profile cleared");
                    }
                }
                Some(user_id) => {
                    // Load failures are recorded in the state.
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return,
                        _ = load(service.as_ref(), &state, &user_id) => {}
                    }
                }
            }
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            changed = auth.changed() => if changed.is_err() { return },
        }
    }
}
