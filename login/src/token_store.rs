use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use std::fs::File;
use std::fs::OpenOptions;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::PoisonError;

use crate::token_data::TokenData;

/// On-disk shape of `session.json`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct StoredSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh: Option<DateTime<Utc>>,
}

/// Durable two-slot storage for the access/refresh pair. The session manager
/// is the only writer; implementations just persist what they are handed.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> std::io::Result<Option<TokenData>>;
    fn save(&self, tokens: &TokenData) -> std::io::Result<()>;
    fn clear(&self) -> std::io::Result<()>;
}

pub fn get_session_file(campus_home: &Path) -> PathBuf {
    campus_home.join("session.json")
}

/// File-backed store keeping `session.json` under a caller-supplied
/// directory.
pub struct SessionFileStore {
    session_file: PathBuf,
}

impl SessionFileStore {
    pub fn new(campus_home: &Path) -> Self {
        Self {
            session_file: get_session_file(campus_home),
        }
    }
}

impl TokenStore for SessionFileStore {
    fn load(&self) -> std::io::Result<Option<TokenData>> {
        match try_read_session_json(&self.session_file) {
            Ok(session) => Ok(session.tokens),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn save(&self, tokens: &TokenData) -> std::io::Result<()> {
        let session = StoredSession {
            tokens: Some(tokens.clone()),
            last_refresh: Some(Utc::now()),
        };
        write_session_json(&self.session_file, &session)
    }

    fn clear(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.session_file) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Attempt to read and deserialize the `session.json` file at the given path.
pub fn try_read_session_json(session_file: &Path) -> std::io::Result<StoredSession> {
    let mut file = File::open(session_file)?;
    let mut contents = String::new();
    use std::io::Read as _;
    file.read_to_string(&mut contents)?;
    let session: StoredSession = serde_json::from_str(&contents)?;
    Ok(session)
}

pub(crate) fn write_session_json(
    session_file: &Path,
    session: &StoredSession,
) -> std::io::Result<()> {
    let json_data = serde_json::to_string_pretty(session)?;
    let mut options = OpenOptions::new();
    options.truncate(true).write(true).create(true);
    #[cfg(unix)]
    {
        options.mode(0o600);
    }
    let mut file = options.open(session_file)?;
    use std::io::Write as _;
    file.write_all(json_data.as_bytes())?;
    file.flush()?;
    Ok(())
}

/// In-process store for tests and embedders that handle persistence
/// themselves.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<Option<TokenData>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: TokenData) -> Self {
        Self {
            tokens: Mutex::new(Some(tokens)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> std::io::Result<Option<TokenData>> {
        Ok(self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, tokens: &TokenData) -> std::io::Result<()> {
        *self.tokens.lock().unwrap_or_else(PoisonError::into_inner) = Some(tokens.clone());
        Ok(())
    }

    fn clear(&self) -> std::io::Result<()> {
        *self.tokens.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
