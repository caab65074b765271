//! Shared HTTP client and session slot for one Supabase project.
//!
//! The auth and profile adapters hold clones of the same [`SupabaseClient`],
//! so the profile adapter sends the signed-in user's token automatically.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use gatehouse_core::KeyValueStore;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use url::Url;

use crate::types::GoTrueSession;

/// Storage key of the persisted session blob.
pub const SESSION_STORAGE_KEY: &str = "supabase.auth.token";

#[derive(Default)]
struct SessionSlot {
    loaded: bool,
    current: Option<GoTrueSession>,
    /// Whether a restored session has been announced to listeners.
    announced: bool,
}

struct ClientInner {
    http: reqwest::Client,
    auth_base: Url,
    rest_base: Url,
    anon_key: String,
    storage: Arc<dyn KeyValueStore>,
    session: Mutex<SessionSlot>,
}

/// Connection to one Supabase project.
#[derive(Clone)]
pub struct SupabaseClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("auth_base", &self.inner.auth_base.as_str())
            .field("anon_key", &"***")
            .finish_non_exhaustive()
    }
}

impl SupabaseClient {
    /// Creates a client for `project_url` (e.g. `https://xyz.supabase.co`).
    ///
    /// # Errors
    /// Returns an error if the URL is malformed or the key is not a valid
    /// header value.
    pub fn new(project_url: &str, anon_key: &str, storage: Arc<dyn KeyValueStore>) -> Result<Self> {
        let base = project_url.trim().trim_end_matches('/');
        let auth_base = Url::parse(&format!("{base}/auth/v1"))
            .with_context(|| format!("Invalid Supabase URL: {project_url}"))?;
        let rest_base = Url::parse(&format!("{base}/rest/v1"))
            .with_context(|| format!("Invalid Supabase URL: {project_url}"))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(anon_key).context("Invalid anon key header")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                auth_base,
                rest_base,
                anon_key: anon_key.to_string(),
                storage,
                session: Mutex::new(SessionSlot::default()),
            }),
        })
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub(crate) fn anon_key(&self) -> &str {
        &self.inner.anon_key
    }

    /// Builds a GoTrue URL; `path` may carry a query (`/token?grant_type=password`).
    pub(crate) fn auth_url(&self, path: &str) -> Url {
        join(&self.inner.auth_base, path)
    }

    /// Builds a PostgREST URL.
    pub(crate) fn rest_url(&self, path: &str) -> Url {
        join(&self.inner.rest_base, path)
    }

    fn with_slot<R>(&self, f: impl FnOnce(&mut SessionSlot) -> R) -> R {
        let mut slot = self
            .inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !slot.loaded {
            slot.loaded = true;
            slot.current = self.read_persisted();
        }
        f(&mut slot)
    }

    fn read_persisted(&self) -> Option<GoTrueSession> {
        let blob = match self.inner.storage.get(SESSION_STORAGE_KEY) {
            Ok(blob) => blob?,
            Err(err) => {
                tracing::warn!("Failed to read stored session: {err:#}");
                return None;
            }
        };
        match serde_json::from_str(&blob) {
            Ok(session) => Some(session),
            Err(err) => {
                tracing::warn!("Discarding unreadable stored session: {err}");
                None
            }
        }
    }

    /// Returns the current session, restoring it from storage on first use.
    pub(crate) fn current_session(&self) -> Option<GoTrueSession> {
        self.with_slot(|slot| slot.current.clone())
    }

    /// Returns a restored session exactly once, so it can be announced.
    pub(crate) fn take_restored(&self) -> Option<GoTrueSession> {
        self.with_slot(|slot| {
            if slot.announced {
                None
            } else {
                slot.announced = true;
                slot.current.clone()
            }
        })
    }

    /// Replaces the current session and persists it.
    pub(crate) fn store_session(&self, session: &GoTrueSession) {
        self.with_slot(|slot| {
            slot.current = Some(session.clone());
            slot.announced = true;
        });
        match serde_json::to_string(session) {
            Ok(blob) => {
                if let Err(err) = self.inner.storage.set(SESSION_STORAGE_KEY, &blob) {
                    tracing::warn!("Failed to persist session: {err:#}");
                }
            }
            Err(err) => tracing::warn!("Failed to serialize session: {err}"),
        }
    }

    /// Forgets the current session, in memory and in storage.
    pub(crate) fn clear_session(&self) {
        self.with_slot(|slot| {
            slot.current = None;
            slot.announced = true;
        });
        if let Err(err) = self.inner.storage.remove(SESSION_STORAGE_KEY) {
            tracing::warn!("Failed to remove stored session: {err:#}");
        }
    }

    /// Bearer token for data requests: the user's token, else the anon key.
    pub(crate) fn bearer_token(&self) -> String {
        self.current_session()
            .map_or_else(|| self.anon_key().to_string(), |s| s.access_token)
    }
}

fn join(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let current = url.path().trim_end_matches('/').to_string();
    match path.split_once('?') {
        Some((path, query)) => {
            url.set_path(&format!("{current}{path}"));
            url.set_query(Some(query));
        }
        None => url.set_path(&format!("{current}{path}")),
    }
    url
}

#[cfg(test)]
mod tests {
    use gatehouse_core::MemoryStore;

    use super::*;

    fn client(url: &str) -> SupabaseClient {
        SupabaseClient::new(url, "anon", Arc::new(MemoryStore::new())).unwrap()
    }

    #[test]
    fn test_url_building() {
        let client = client("https://demo.supabase.co/");
        assert_eq!(
            client.auth_url("/token?grant_type=password").as_str(),
            "https://demo.supabase.co/auth/v1/token?grant_type=password"
        );
        assert_eq!(
            client.rest_url("/profiles").as_str(),
            "https://demo.supabase.co/rest/v1/profiles"
        );
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let err = SupabaseClient::new("not a url", "anon", Arc::new(MemoryStore::new()))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid Supabase URL"));
    }

    #[test]
    fn test_bearer_falls_back_to_anon_key() {
        assert_eq!(client("https://demo.supabase.co").bearer_token(), "anon");
    }

    #[test]
    fn test_corrupt_stored_session_is_ignored() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(SESSION_STORAGE_KEY, "{oops").unwrap();
        let client = SupabaseClient::new("https://demo.supabase.co", "anon", storage).unwrap();
        assert!(client.current_session().is_none());
    }
}
