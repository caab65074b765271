//! Configuration management for gatehouse.
//!
//! Loads configuration from ${GATEHOUSE_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable overriding `[supabase] url`.
pub const SUPABASE_URL_ENV: &str = "SUPABASE_URL";
/// Environment variable overriding `[supabase] anon_key`.
pub const SUPABASE_ANON_KEY_ENV: &str = "SUPABASE_ANON_KEY";

pub mod paths {
    //! Path resolution for gatehouse configuration and state.
    //!
    //! GATEHOUSE_HOME resolution order:
    //! 1. GATEHOUSE_HOME environment variable (if set)
    //! 2. ~/.config/gatehouse (default)

    use std::path::PathBuf;

    /// Returns the gatehouse home directory.
    ///
    /// Falls back to a relative `.gatehouse` directory when no home directory
    /// can be determined.
    pub fn gatehouse_home() -> PathBuf {
        if let Ok(home) = std::env::var("GATEHOUSE_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".gatehouse"),
            |h| h.join(".config").join("gatehouse"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        gatehouse_home().join("config.toml")
    }

    /// Returns the path to the persisted key-value state (session, language).
    pub fn state_path() -> PathBuf {
        gatehouse_home().join("state.json")
    }

    /// Returns the directory holding log files.
    pub fn logs_dir() -> PathBuf {
        gatehouse_home().join("logs")
    }
}

/// Identity provider connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    pub url: Option<String>,
    /// Public anonymous API key.
    pub anon_key: Option<String>,
}

/// Auth adapter behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Where password reset emails link to.
    pub reset_redirect_url: Option<String>,
    /// Refresh the session in the background ahead of expiry.
    pub auto_refresh: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            reset_redirect_url: None,
            auto_refresh: true,
        }
    }
}

/// Route guard settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Route identifiers reachable without a session.
    pub public_routes: Vec<String>,
    /// Where unauthenticated users are sent.
    pub redirect_to: String,
    /// Where authenticated users land when visiting the login route.
    pub home_route: String,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            public_routes: ["login", "signup", "forgot-password", "reset-password"]
                .into_iter()
                .map(String::from)
                .collect(),
            redirect_to: "/login".to_string(),
            home_route: "/(tabs)".to_string(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub supabase: SupabaseConfig,
    pub auth: AuthConfig,
    pub guard: GuardConfig,
}

/// Returns the embedded default config template.
pub fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

impl Config {
    /// Loads configuration from the default path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Creates a default config file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, default_config_template())
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }

    /// Resolves the project URL with precedence: env > config.
    ///
    /// # Errors
    /// Returns an error if no URL is configured or the URL is malformed.
    pub fn supabase_url(&self) -> Result<String> {
        resolve_url(self.supabase.url.as_deref(), SUPABASE_URL_ENV)
    }

    /// Resolves the anonymous key with precedence: env > config.
    ///
    /// # Errors
    /// Returns an error if no key is configured.
    pub fn supabase_anon_key(&self) -> Result<String> {
        resolve_secret(self.supabase.anon_key.as_deref(), SUPABASE_ANON_KEY_ENV)
    }
}

fn non_empty_env(env_var: &str) -> Option<String> {
    std::env::var(env_var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
}

fn resolve_url(config_url: Option<&str>, env_var: &str) -> Result<String> {
    let url = non_empty_env(env_var)
        .or_else(|| non_empty(config_url))
        .with_context(|| format!("No Supabase URL available. Set {env_var} or url in [supabase]."))?;
    url::Url::parse(&url).with_context(|| format!("Invalid Supabase URL: {url}"))?;
    Ok(url.trim_end_matches('/').to_string())
}

fn resolve_secret(config_value: Option<&str>, env_var: &str) -> Result<String> {
    non_empty_env(env_var)
        .or_else(|| non_empty(config_value))
        .with_context(|| {
            format!("No Supabase anon key available. Set {env_var} or anon_key in [supabase].")
        })
}
