use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ConfigLocator;

use super::{AuthError, PersistedSession};

const ENVELOPE_VERSION: u32 = 1;

/// Persistence abstraction for authentication sessions.
pub trait SessionStore {
    fn load(&self, profile: &str) -> Result<Option<PersistedSession>, AuthError>;
    fn save(&self, profile: &str, session: &PersistedSession) -> Result<(), AuthError>;
    fn delete(&self, profile: &str) -> Result<(), AuthError>;
}

/// Stores one JSON document per profile under the user configuration directory.
pub struct FileSessionStore {
    locator: ConfigLocator,
}

impl FileSessionStore {
    pub fn new(locator: ConfigLocator) -> Self {
        Self { locator }
    }

    pub fn with_default_locator() -> Result<Self, AuthError> {
        ConfigLocator::new().map(Self::new).map_err(AuthError::from)
    }

    pub fn path(&self, profile: &str) -> PathBuf {
        self.locator.session_file(profile)
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, profile: &str) -> Result<Option<PersistedSession>, AuthError> {
        let path = self.path(profile);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let stored: StoredSession = serde_json::from_str(&raw)?;
        if stored.version != ENVELOPE_VERSION {
            tracing::warn!(
                profile,
                version = stored.version,
                "ignoring session written by an incompatible version"
            );
            return Ok(None);
        }
        Ok(Some(stored.session))
    }

    fn save(&self, profile: &str, session: &PersistedSession) -> Result<(), AuthError> {
        let stored = StoredSession {
            version: ENVELOPE_VERSION,
            profile: profile.to_owned(),
            session: session.clone(),
        };
        let json = serde_json::to_vec_pretty(&stored)?;
        let path = self.path(profile);
        tracing::debug!(profile, path = %path.display(), "writing session");
        replace_private_file(&path, &json)
    }

    fn delete(&self, profile: &str) -> Result<(), AuthError> {
        if let Err(err) = fs::remove_file(self.path(profile)) {
            if err.kind() != std::io::ErrorKind::NotFound {
                return Err(err.into());
            }
        }
        Ok(())
    }
}

/// Write `contents` next to `path` and rename over it, so readers never see a
/// partially written session.
fn replace_private_file(path: &Path, contents: &[u8]) -> Result<(), AuthError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let staging = path.with_extension("json.tmp");

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&staging)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&staging, path)?;
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    version: u32,
    profile: String,
    #[serde(flatten)]
    session: PersistedSession,
}
