use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

use super::pair::TokenPair;

/// Storage abstraction for the three persisted client values: access token,
/// refresh token, and device identifier.
///
/// Implementations must make `save_tokens` an atomic pair replacement; no
/// reader may ever observe a half-updated pair. `rotate_access` is the one
/// sanctioned partial write: it swaps the access token while preserving the
/// stored refresh token.
pub trait TokenStore: Send + Sync {
    fn tokens(&self) -> Result<Option<TokenPair>, AuthError>;
    fn save_tokens(&self, pair: &TokenPair) -> Result<(), AuthError>;
    /// Replace the access token only; errors if no pair is stored.
    fn rotate_access(&self, access_token: &str) -> Result<(), AuthError>;
    fn device_id(&self) -> Result<Option<String>, AuthError>;
    fn save_device_id(&self, device_id: &str) -> Result<(), AuthError>;
    /// Drop the token pair but keep the device id (explicit logout keeps the
    /// installation identity unless the teardown is fatal).
    fn clear_tokens(&self) -> Result<(), AuthError>;
    /// Drop tokens and device id together. Invoked on unrecoverable refresh
    /// failure; never a partial clear.
    fn clear_all(&self) -> Result<(), AuthError>;
}

/// Configuration for file-backed storage.
#[derive(Debug, Clone)]
pub struct TokenStoreConfig {
    pub base_dir: PathBuf,
}

impl TokenStoreConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_dir() -> PathBuf {
        default_authflow_dir()
    }
}

/// On-disk envelope for the persisted auth state.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuthFile {
    version: u32,
    tokens: Option<TokenPair>,
    device_id: Option<String>,
    saved_at: DateTime<Utc>,
}

impl AuthFile {
    fn empty() -> Self {
        Self {
            version: 1,
            tokens: None,
            device_id: None,
            saved_at: Utc::now(),
        }
    }
}

/// File-backed store using a single TOML file with 0600 permissions.
///
/// # Example
/// ```no_run
/// use authflow::token::{FileTokenStore, TokenPair, TokenStore};
///
/// let store = FileTokenStore::new_default();
/// store.save_tokens(&TokenPair::new("access", "refresh"))?;
/// # Ok::<(), authflow::error::AuthError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    base_dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(config: TokenStoreConfig) -> Self {
        Self {
            base_dir: config.base_dir,
        }
    }

    pub fn new_default() -> Self {
        Self {
            base_dir: default_authflow_dir(),
        }
    }

    fn file_path(&self) -> PathBuf {
        self.base_dir.join("auth.toml")
    }

    fn read_file(&self) -> Result<AuthFile, AuthError> {
        let raw = match fs::read_to_string(self.file_path()) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(AuthFile::empty());
            }
            Err(err) => return Err(AuthError::Io(err.to_string())),
        };
        Ok(toml::from_str(&raw)?)
    }

    fn write_file(&self, mut file: AuthFile) -> Result<(), AuthError> {
        file.saved_at = Utc::now();
        let path = self.file_path();
        Self::ensure_parent(&path)?;
        let serialized = toml::to_string(&file)?;
        fs::write(&path, serialized)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn ensure_parent(path: &Path) -> Result<(), AuthError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn tokens(&self) -> Result<Option<TokenPair>, AuthError> {
        Ok(self.read_file()?.tokens)
    }

    fn save_tokens(&self, pair: &TokenPair) -> Result<(), AuthError> {
        let mut file = self.read_file()?;
        file.tokens = Some(pair.clone());
        self.write_file(file)
    }

    fn rotate_access(&self, access_token: &str) -> Result<(), AuthError> {
        let mut file = self.read_file()?;
        let Some(tokens) = file.tokens.as_mut() else {
            return Err(AuthError::NotLoggedIn);
        };
        tokens.access_token = access_token.to_string();
        self.write_file(file)
    }

    fn device_id(&self) -> Result<Option<String>, AuthError> {
        Ok(self.read_file()?.device_id)
    }

    fn save_device_id(&self, device_id: &str) -> Result<(), AuthError> {
        let mut file = self.read_file()?;
        file.device_id = Some(device_id.to_string());
        self.write_file(file)
    }

    fn clear_tokens(&self) -> Result<(), AuthError> {
        let mut file = self.read_file()?;
        file.tokens = None;
        self.write_file(file)
    }

    fn clear_all(&self) -> Result<(), AuthError> {
        match fs::remove_file(self.file_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::Io(err.to_string())),
        }
    }
}

/// In-memory store for embedded use and tests.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    state: RwLock<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tokens: Option<TokenPair>,
    device_id: Option<String>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn tokens(&self) -> Result<Option<TokenPair>, AuthError> {
        Ok(self
            .state
            .read()
            .map_err(|_| AuthError::InvalidState("store lock poisoned".to_string()))?
            .tokens
            .clone())
    }

    fn save_tokens(&self, pair: &TokenPair) -> Result<(), AuthError> {
        self.with_state(|state| state.tokens = Some(pair.clone()))
    }

    fn rotate_access(&self, access_token: &str) -> Result<(), AuthError> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| AuthError::InvalidState("store lock poisoned".to_string()))?;
        let Some(tokens) = guard.tokens.as_mut() else {
            return Err(AuthError::NotLoggedIn);
        };
        tokens.access_token = access_token.to_string();
        Ok(())
    }

    fn device_id(&self) -> Result<Option<String>, AuthError> {
        Ok(self
            .state
            .read()
            .map_err(|_| AuthError::InvalidState("store lock poisoned".to_string()))?
            .device_id
            .clone())
    }

    fn save_device_id(&self, device_id: &str) -> Result<(), AuthError> {
        self.with_state(|state| state.device_id = Some(device_id.to_string()))
    }

    fn clear_tokens(&self) -> Result<(), AuthError> {
        self.with_state(|state| state.tokens = None)
    }

    fn clear_all(&self) -> Result<(), AuthError> {
        self.with_state(|state| *state = MemoryState::default())
    }
}

impl MemoryTokenStore {
    fn with_state(&self, apply: impl FnOnce(&mut MemoryState)) -> Result<(), AuthError> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| AuthError::InvalidState("store lock poisoned".to_string()))?;
        apply(&mut guard);
        Ok(())
    }
}

fn default_authflow_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".authflow"))
        .unwrap_or_else(|| PathBuf::from(".authflow"))
}
