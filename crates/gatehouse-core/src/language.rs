//! UI language preference.
//!
//! A stored preference wins; otherwise the device locale decides. Storage
//! problems are logged and treated as "no preference".

use anyhow::{Context, Result};
use gatehouse_types::LanguageCode;

use crate::storage::KeyValueStore;

/// Storage key for the persisted language preference.
pub const LANGUAGE_KEY: &str = "user_language_preference";

/// Reads the stored preference. Unreadable or unknown values yield `None`.
pub fn load_preference(store: &dyn KeyValueStore) -> Option<LanguageCode> {
    match store.get(LANGUAGE_KEY) {
        Ok(Some(value)) => match value.parse() {
            Ok(language) => Some(language),
            Err(err) => {
                tracing::warn!("Ignoring stored language preference: {err}");
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            tracing::warn!("Failed to load language preference: {err:#}");
            None
        }
    }
}

/// Persists the preference.
///
/// # Errors
/// Returns an error if the store cannot be written.
pub fn store_preference(store: &dyn KeyValueStore, language: LanguageCode) -> Result<()> {
    store
        .set(LANGUAGE_KEY, language.as_str())
        .context("Failed to save language preference")
}

/// Persists the preference. Failures are logged, never returned.
pub fn save_preference(store: &dyn KeyValueStore, language: LanguageCode) {
    if let Err(err) = store_preference(store, language) {
        tracing::warn!("{err:#}");
    }
}

/// Maps a POSIX locale string (`es_MX.UTF-8`, `en`, `C`) to a language.
pub fn language_from_locale(locale: &str) -> LanguageCode {
    if locale.trim().to_ascii_lowercase().starts_with("es") {
        LanguageCode::Es
    } else {
        LanguageCode::En
    }
}

/// Detects the device language from `LC_ALL`, then `LANG`.
pub fn detect_device_language() -> LanguageCode {
    ["LC_ALL", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.trim().is_empty())
        .map_or(LanguageCode::En, |locale| language_from_locale(&locale))
}

/// Returns the effective language: stored preference, else device language.
pub fn resolve_language(store: &dyn KeyValueStore) -> LanguageCode {
    load_preference(store).unwrap_or_else(detect_device_language)
}
