//! Core gatehouse library (auth contract, state store, route guard, config).

pub mod classify;
pub mod config;
pub mod guard;
pub mod language;
pub mod logging;
pub mod profile;
pub mod service;
pub mod storage;
pub mod store;

pub use classify::{DEFAULT_FALLBACK_MESSAGE, ProviderFailure, classify};
pub use guard::{GuardAction, GuardConfig, HistoryNavigator, Navigator, RouteGuard, RouteLocation};
pub use profile::{ProfileService, ProfileState, ProfileStore};
pub use service::{AuthListeners, AuthService, AuthStateCallback, Subscription};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use store::{AuthPhase, AuthState, AuthStore, Transition};
