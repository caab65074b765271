//! CLI command handlers.

pub mod auth;
pub mod config;
pub mod lang;
pub mod profile;
pub mod route;

use gatehouse_types::AuthError;

/// Flattens an auth error into a one-line message tagged with its kind.
///
/// The provider detail stays in the debug log.
pub(crate) fn auth_failure(err: &AuthError) -> anyhow::Error {
    if let Some(source) = std::error::Error::source(err) {
        tracing::debug!(code = %err.code, "provider detail: {source}");
    }
    anyhow::anyhow!("{} ({})", err.message, err.code)
}
