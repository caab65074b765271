//! Provider-agnostic domain types shared across gatehouse crates.

pub mod error;
pub mod event;
pub mod language;
pub mod profile;
pub mod user;

pub use error::{AuthError, AuthErrorCode, AuthResult};
pub use event::AuthEvent;
pub use language::LanguageCode;
pub use profile::{Profile, ProfileChanges};
pub use user::{
    AccountUpdate, AuthResponse, AuthSession, AuthUser, OAuthProvider, PasswordResetResponse,
    UserMetadata, mask_token,
};
