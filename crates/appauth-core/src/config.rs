use std::env;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;
use url::Url;

pub const DEFAULT_ISSUER: &str = "https://login.example.com/oauth/v2/oauth-anonymous";
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8765/callback";
pub const DEFAULT_SCOPES: &[&str; 2] = &["openid", "profile"];
pub const DEFAULT_CLIENT_NAME: &str = "appauth-rs";

/// Application-specific configuration helpers.
#[derive(Debug, Clone)]
pub struct ConfigLocator {
    root: PathBuf,
}

impl ConfigLocator {
    /// Attempt to discover the persistent configuration directory, creating it if needed.
    pub fn new() -> Result<Self, ConfigError> {
        let dirs = ProjectDirs::from("io", "appauth", "appauth-rs")
            .ok_or(ConfigError::MissingProjectDirs)?;
        Self::at(dirs.config_dir().to_path_buf())
    }

    /// Use an explicit directory as the configuration root.
    pub fn at(root: PathBuf) -> Result<Self, ConfigError> {
        fs::create_dir_all(&root).map_err(ConfigError::CreateDir)?;
        set_user_only_permissions(&root)?;
        Ok(Self { root })
    }

    /// Path to the persisted session for the given profile.
    pub fn session_file(&self, profile: &str) -> PathBuf {
        self.root.join(format!("session-{profile}.json"))
    }
}

fn set_user_only_permissions(path: &Path) -> Result<(), ConfigError> {
    #[cfg(unix)]
    {
        let metadata = fs::metadata(path)?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o700);
        fs::set_permissions(path, permissions)?;
        Ok(())
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

/// Client settings used for discovery, registration, and the authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub issuer: Url,
    pub redirect_uri: Url,
    pub scopes: Vec<String>,
    pub client_name: String,
}

impl ClientConfig {
    pub fn new(issuer: Url, redirect_uri: Url) -> Self {
        Self {
            issuer,
            redirect_uri,
            scopes: DEFAULT_SCOPES.iter().map(|scope| scope.to_string()).collect(),
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Resolve settings from `APPAUTH_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let issuer = parse_url(
            "APPAUTH_ISSUER",
            value("APPAUTH_ISSUER").as_deref().unwrap_or(DEFAULT_ISSUER),
        )?;
        let redirect_uri = parse_url(
            "APPAUTH_REDIRECT_URI",
            value("APPAUTH_REDIRECT_URI")
                .as_deref()
                .unwrap_or(DEFAULT_REDIRECT_URI),
        )?;

        let mut config = Self::new(issuer, redirect_uri);

        if let Some(scopes) = value("APPAUTH_SCOPES") {
            let requested = scopes
                .split_whitespace()
                .map(str::to_owned)
                .collect::<Vec<_>>();
            config = config.with_scopes(requested);
        }

        if let Some(name) = value("APPAUTH_CLIENT_NAME") {
            config.client_name = name.trim().to_owned();
        }

        Ok(config)
    }
}

fn parse_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|err| ConfigError::Invalid {
        key,
        reason: err.to_string(),
    })
}

/// Errors that can occur when working with configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to determine configuration directory for appauth-rs")]
    MissingProjectDirs,
    #[error("failed to create configuration directory: {0}")]
    CreateDir(#[source] std::io::Error),
    #[error("filesystem error: {0}")]
    Io(#[source] std::io::Error),
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}
