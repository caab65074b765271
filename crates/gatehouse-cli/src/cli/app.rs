//! Composition root: builds the adapters once and mounts the stores.

use std::sync::Arc;

use anyhow::{Context, Result};
use gatehouse_core::config::Config;
use gatehouse_core::{AuthService, AuthStore, FileStore, KeyValueStore, ProfileService, ProfileStore};
use gatehouse_supabase::{
    AutoRefreshConfig, AutoRefreshHandle, SupabaseAuthAdapter, SupabaseClient,
    SupabaseProfileAdapter,
};

pub struct App {
    pub auth: AuthStore,
    profile_service: Arc<dyn ProfileService>,
    _refresh: Option<AutoRefreshHandle>,
}

impl App {
    /// Connects to the configured project and waits for the initial auth state.
    pub async fn start(config: &Config) -> Result<Self> {
        let url = config.supabase_url()?;
        let anon_key = config.supabase_anon_key()?;

        let storage: Arc<dyn KeyValueStore> = Arc::new(FileStore::open_default());
        let client =
            SupabaseClient::new(&url, &anon_key, storage).context("create Supabase client")?;

        let profile_service: Arc<dyn ProfileService> =
            Arc::new(SupabaseProfileAdapter::new(client.clone()));
        let adapter = Arc::new(
            SupabaseAuthAdapter::new(client)
                .with_profile_service(Arc::clone(&profile_service))
                .with_reset_redirect_url(config.auth.reset_redirect_url.clone()),
        );
        let refresh = config
            .auth
            .auto_refresh
            .then(|| adapter.start_auto_refresh(AutoRefreshConfig::default()));

        let service: Arc<dyn AuthService> = adapter;
        let auth = AuthStore::mount(service);
        let state = auth.ready().await;
        tracing::debug!(phase = ?state.phase(), "auth state ready");

        Ok(Self {
            auth,
            profile_service,
            _refresh: refresh,
        })
    }

    /// Mounts a profile store following the signed-in user.
    pub fn profiles(&self) -> ProfileStore {
        ProfileStore::mount(Arc::clone(&self.profile_service), self.auth.watch())
    }
}
