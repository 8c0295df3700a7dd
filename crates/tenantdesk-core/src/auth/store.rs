//! Per-session storage of token records.
//!
//! `TokenStore` is a plain keyed store with no validation logic. Two
//! implementations ship with the crate:
//! - `MemoryTokenStore`: process-local map, used by tests and short-lived tools
//! - `FileTokenStore`: one encrypted file per session on disk

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use argon2::Argon2;
use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::TokenRecord;

/// Salt file shared by every record in a store directory
const SALT_FILE: &str = "store.salt";

/// Extension of encrypted record files
const RECORD_EXTENSION: &str = "rec";

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Longest session id accepted as a file name
const MAX_SESSION_ID_LENGTH: usize = 128;

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Fetch the record for a session, if any
    async fn get(&self, session_id: &str) -> Result<Option<TokenRecord>>;

    /// Store a record, replacing whatever the session held before
    async fn put(&self, session_id: &str, record: TokenRecord) -> Result<()>;

    /// Remove the record for a session
    async fn clear(&self, session_id: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryTokenStore {
    records: RwLock<HashMap<String, TokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently holding a record
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, session_id: &str) -> Result<Option<TokenRecord>> {
        Ok(self.records.read().await.get(session_id).cloned())
    }

    async fn put(&self, session_id: &str, record: TokenRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(session_id.to_string(), record);
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        self.records.write().await.remove(session_id);
        Ok(())
    }
}

/// Encrypted on-disk store, one file per session.
///
/// Records are serialized to JSON and sealed with ChaCha20-Poly1305. The key
/// is derived once from the caller's secret with Argon2 and a random salt kept
/// next to the records. Each file is `nonce || ciphertext`.
///
/// `open` derives the key and touches the salt file synchronously; record
/// reads and writes go through `tokio::fs`.
pub struct FileTokenStore {
    dir: PathBuf,
    cipher: ChaCha20Poly1305,
}

impl FileTokenStore {
    pub fn open(dir: impl Into<PathBuf>, secret: &str) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create session directory {}", dir.display()))?;

        let salt = Self::load_or_create_salt(&dir)?;
        let mut key = [0u8; 32];
        Argon2::default()
            .hash_password_into(secret.as_bytes(), &salt, &mut key)
            .map_err(|e| anyhow::anyhow!("Failed to derive session key: {}", e))?;

        Ok(Self {
            dir,
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        })
    }

    fn load_or_create_salt(dir: &Path) -> Result<Vec<u8>> {
        let path = dir.join(SALT_FILE);
        match std::fs::read(&path) {
            Ok(salt) if salt.len() == SALT_LEN => Ok(salt),
            Ok(_) => Err(anyhow::anyhow!("Corrupt salt file: {}", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let mut salt = vec![0u8; SALT_LEN];
                rand::thread_rng().fill_bytes(&mut salt);
                std::fs::write(&path, &salt).context("Failed to write salt file")?;
                debug!(path = %path.display(), "Created session store salt");
                Ok(salt)
            }
            Err(e) => Err(e).context("Failed to read salt file"),
        }
    }

    fn record_path(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self
            .dir
            .join(format!("{}.{}", session_id, RECORD_EXTENSION)))
    }

    fn seal(&self, record: &TokenRecord) -> Result<Vec<u8>> {
        let plaintext = serde_json::to_vec(record).context("Failed to serialize token record")?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|_| anyhow::anyhow!("Failed to encrypt token record"))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open_sealed(&self, sealed: &[u8]) -> Result<TokenRecord> {
        if sealed.len() <= NONCE_LEN {
            return Err(anyhow::anyhow!("Record file too short"));
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| anyhow::anyhow!("Failed to decrypt token record"))?;
        serde_json::from_slice(&plaintext).context("Failed to parse token record")
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self, session_id: &str) -> Result<Option<TokenRecord>> {
        let path = self.record_path(session_id)?;
        let sealed = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context("Failed to read session record"),
        };

        // An unreadable record is as good as no record: the caller re-authenticates
        match self.open_sealed(&sealed) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(session_id, error = %e, "Discarding unreadable session record");
                Ok(None)
            }
        }
    }

    async fn put(&self, session_id: &str, record: TokenRecord) -> Result<()> {
        let path = self.record_path(session_id)?;
        let sealed = self.seal(&record)?;

        // Write beside the target and rename over it so readers never see a partial file
        let tmp = self.dir.join(format!(
            "{}.{:016x}.tmp",
            session_id,
            rand::thread_rng().next_u64()
        ));
        tokio::fs::write(&tmp, sealed)
            .await
            .context("Failed to write session record")?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).context("Failed to replace session record");
        }
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        let path = self.record_path(session_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove session record"),
        }
    }
}

/// Session ids double as file names, so only `[A-Za-z0-9_-]` is allowed.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    let valid = !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID_LENGTH
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Invalid session id: {:?}", session_id))
    }
}
