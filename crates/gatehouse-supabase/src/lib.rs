//! Supabase adapter for gatehouse.
//!
//! [`SupabaseAuthAdapter`] implements [`gatehouse_core::AuthService`] over the
//! GoTrue REST API and [`SupabaseProfileAdapter`] implements
//! [`gatehouse_core::ProfileService`] over PostgREST. Both share one
//! [`SupabaseClient`], which owns the persisted session.

pub mod auth;
pub mod client;
pub mod mappers;
pub mod profile;
pub mod refresh;
pub mod types;

pub use auth::SupabaseAuthAdapter;
pub use client::{SESSION_STORAGE_KEY, SupabaseClient};
pub use profile::SupabaseProfileAdapter;
pub use refresh::{AutoRefreshConfig, AutoRefreshHandle};
