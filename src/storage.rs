//!
//! smartrental credential storage
//! ------------------------------
//! Durable client-side storage for the bearer credential. The persisted layout
//! is a single JSON document `session.json` holding exactly one key, `token`.
//! Presence of that key is the only signal that survives a restart; everything
//! else about the session is re-derived from the backend on bootstrap.
//!
//! Only the session store writes through this module.

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AuthError, AuthResult};

pub const CREDENTIAL_KEY: &str = "token";
pub const SESSION_FILE: &str = "session.json";

/// Opaque bearer token. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self { Self(token.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn bearer_header(&self) -> String { format!("Bearer {}", self.0) }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("Credential(***)") }
}

pub trait CredentialStore: Send + Sync {
    fn load(&self) -> AuthResult<Option<Credential>>;
    fn save(&self, credential: &Credential) -> AuthResult<()>;
    /// Removing an absent credential is not an error.
    fn clear(&self) -> AuthResult<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionDoc {
    #[serde(default)]
    token: Option<String>,
}

/// File-backed store under the configured state directory.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self { Self { path: path.as_ref().to_path_buf() } }

    /// Store rooted at `<state_dir>/session.json`.
    pub fn in_dir<P: AsRef<Path>>(state_dir: P) -> Self { Self::new(state_dir.as_ref().join(SESSION_FILE)) }

    pub fn path(&self) -> &Path { &self.path }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> AuthResult<Option<Credential>> {
        if !self.path.exists() { return Ok(None); }
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| AuthError::storage(format!("read {}: {}", self.path.display(), e)))?;
        if text.trim().is_empty() { return Ok(None); }
        let doc: SessionDoc = serde_json::from_str(&text)
            .map_err(|e| AuthError::storage(format!("parse {}: {}", self.path.display(), e)))?;
        Ok(doc.token.filter(|t| !t.is_empty()).map(Credential))
    }

    fn save(&self, credential: &Credential) -> AuthResult<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| AuthError::storage(format!("create {}: {}", dir.display(), e)))?;
        }
        let doc = SessionDoc { token: Some(credential.as_str().to_string()) };
        let bytes = serde_json::to_vec(&doc).map_err(|e| AuthError::storage(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).map_err(|e| AuthError::storage(format!("write {}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| AuthError::storage(format!("rename {}: {}", self.path.display(), e)))?;
        debug!(target: "session", path = %self.path.display(), "credential persisted");
        Ok(())
    }

    fn clear(&self) -> AuthResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::storage(format!("remove {}: {}", self.path.display(), e))),
        }
    }
}

/// In-memory store; nothing survives the process.
#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self { Self::default() }
    pub fn with_credential(token: impl Into<String>) -> Self { Self { slot: Mutex::new(Some(Credential::new(token))) } }
    pub fn current(&self) -> Option<Credential> { self.slot.lock().clone() }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> AuthResult<Option<Credential>> { Ok(self.slot.lock().clone()) }
    fn save(&self, credential: &Credential) -> AuthResult<()> {
        *self.slot.lock() = Some(credential.clone());
        Ok(())
    }
    fn clear(&self) -> AuthResult<()> {
        *self.slot.lock() = None;
        Ok(())
    }
}
