use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;
use vigil_core::{validate_embedding, Embedding, EnrolledIdentity, EnrollmentStore, FaceAttributes};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;

#[derive(Error, Debug)]
pub enum SqliteStoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("embedding encryption failed")]
    EncryptionFailed,
    #[error("embedding decryption failed — key mismatch or corrupted data")]
    DecryptionFailed,
    #[error("invalid embedding blob size: {0} bytes")]
    InvalidBlob(usize),
    #[error("empty embedding")]
    EmptyEmbedding,
    #[error("invalid embedding value (NaN/Inf)")]
    InvalidEmbeddingValue,
    #[error("encryption key I/O error: {0}")]
    KeyIo(#[source] std::io::Error),
    #[error("metadata serialization error: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("invalid created_at timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

/// SQLite-backed identity gallery with AES-256-GCM embedding encryption.
///
/// Embeddings are encrypted before storage and decrypted on retrieval.
/// A per-installation 32-byte key is generated at first use and stored at
/// `{db_dir}/.key` (mode 0600, owner-readable only).
pub struct IdentityStore {
    conn: Connection,
    enc_key: [u8; 32],
}

impl IdentityStore {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(db_path: &Path) -> Result<Self, SqliteStoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let enc_key = if db_path == Path::new(":memory:") {
            // In-memory DB (tests, demo mode): fixed all-zeros key
            [0u8; 32]
        } else {
            let key_path = db_path
                .parent()
                .unwrap_or(Path::new("/var/lib/vigil"))
                .join(".key");
            load_or_generate_key(&key_path)?
        };

        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             CREATE TABLE IF NOT EXISTS identities (
                 id TEXT PRIMARY KEY,
                 name TEXT NOT NULL,
                 embedding BLOB NOT NULL,
                 model_version TEXT NOT NULL,
                 metadata TEXT,
                 created_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_identities_name ON identities(name);",
        )?;

        Ok(Self { conn, enc_key })
    }

    /// Insert a new identity. Returns the generated UUID.
    pub fn insert(
        &self,
        name: &str,
        embedding: &Embedding,
        metadata: Option<&FaceAttributes>,
    ) -> Result<String, SqliteStoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let model_version = embedding
            .model_version
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        let created_at = Utc::now().to_rfc3339();
        let metadata_json = metadata.map(serde_json::to_string).transpose()?;
        let blob = self.encrypt_embedding(&embedding.values)?;

        self.conn.execute(
            "INSERT INTO identities (id, name, embedding, model_version, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![id, name, blob, model_version, metadata_json, created_at],
        )?;

        Ok(id)
    }

    /// Load the full gallery, embeddings included.
    pub fn load_all(&self) -> Result<Vec<EnrolledIdentity>, SqliteStoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, embedding, model_version, metadata, created_at
             FROM identities ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut gallery = Vec::new();
        for row in rows {
            let (id, name, blob, model_version, metadata_json, created_at) = row?;
            let values = self.decrypt_embedding(&blob)?;
            let metadata = metadata_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?;
            gallery.push(EnrolledIdentity {
                id,
                name,
                embedding: Embedding {
                    values,
                    model_version: Some(model_version),
                },
                metadata,
                created_at: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
            });
        }
        Ok(gallery)
    }

    /// List enrolled identities (metadata only, no embeddings).
    pub fn list(&self) -> Result<Vec<IdentityInfo>, SqliteStoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, model_version, created_at
             FROM identities ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(IdentityInfo {
                id: row.get(0)?,
                name: row.get(1)?,
                model_version: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(SqliteStoreError::from)
    }

    /// Remove an identity by id. Returns whether a row was deleted.
    pub fn remove(&self, id: &str) -> Result<bool, SqliteStoreError> {
        let affected = self
            .conn
            .execute("DELETE FROM identities WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Count enrolled identities.
    pub fn count(&self) -> Result<u64, SqliteStoreError> {
        let count: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))?;
        Ok(count)
    }

    // ── Encryption helpers ────────────────────────────────────────────────────

    /// Encrypt embedding values with AES-256-GCM.
    ///
    /// Output: 12-byte random nonce || ciphertext || 16-byte GCM tag.
    fn encrypt_embedding(&self, values: &[f32]) -> Result<Vec<u8>, SqliteStoreError> {
        validate_values(values)?;
        let plaintext = embedding_to_bytes(values);

        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let key = Key::<Aes256Gcm>::from_slice(&self.enc_key);
        let cipher = Aes256Gcm::new(key);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|_| SqliteStoreError::EncryptionFailed)?;

        let mut blob = Vec::with_capacity(12 + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypt an embedding blob (12-byte nonce + ciphertext + 16-byte tag).
    fn decrypt_embedding(&self, blob: &[u8]) -> Result<Vec<f32>, SqliteStoreError> {
        const NONCE_LEN: usize = 12;

        if blob.len() <= NONCE_LEN {
            return Err(SqliteStoreError::InvalidBlob(blob.len()));
        }

        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let key = Key::<Aes256Gcm>::from_slice(&self.enc_key);
        let cipher = Aes256Gcm::new(key);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| SqliteStoreError::DecryptionFailed)?;

        bytes_to_embedding(&plaintext)
    }
}

impl EnrollmentStore for IdentityStore {
    fn get_all(&self) -> Result<Vec<EnrolledIdentity>, vigil_core::StoreError> {
        self.load_all()
            .map_err(|e| vigil_core::StoreError::Backend(Box::new(e)))
    }

    fn add(
        &mut self,
        name: &str,
        embedding: &Embedding,
        metadata: Option<&FaceAttributes>,
    ) -> Result<String, vigil_core::StoreError> {
        validate_embedding(embedding)?;
        self.insert(name, embedding, metadata)
            .map_err(|e| vigil_core::StoreError::Backend(Box::new(e)))
    }
}

// ── Key management ────────────────────────────────────────────────────────────

/// Load the encryption key from disk, or generate and persist a new one.
/// Written with mode 0600 (owner-readable only).
fn load_or_generate_key(key_path: &Path) -> Result<[u8; 32], SqliteStoreError> {
    if key_path.exists() {
        let bytes = std::fs::read(key_path).map_err(SqliteStoreError::KeyIo)?;
        if bytes.len() != 32 {
            return Err(SqliteStoreError::KeyIo(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "encryption key file has wrong length ({} bytes, expected 32)",
                    bytes.len()
                ),
            )));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        tracing::debug!(path = %key_path.display(), "loaded encryption key");
        Ok(key)
    } else {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);

        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(key_path)
            .map_err(SqliteStoreError::KeyIo)?;
        f.write_all(&key).map_err(SqliteStoreError::KeyIo)?;

        tracing::info!(path = %key_path.display(), "generated new AES-256 encryption key");
        Ok(key)
    }
}

// ── Serialization helpers ─────────────────────────────────────────────────────

fn embedding_to_bytes(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for &v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Embeddings are dimension-agnostic; the plaintext only has to be a
/// non-empty whole number of f32 values, all finite.
fn bytes_to_embedding(bytes: &[u8]) -> Result<Vec<f32>, SqliteStoreError> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(SqliteStoreError::InvalidBlob(bytes.len()));
    }

    let mut values = Vec::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        let arr: [u8; 4] = chunk
            .try_into()
            .map_err(|_| SqliteStoreError::InvalidBlob(bytes.len()))?;
        let v = f32::from_le_bytes(arr);
        if !v.is_finite() {
            return Err(SqliteStoreError::InvalidEmbeddingValue);
        }
        values.push(v);
    }
    Ok(values)
}

fn validate_values(values: &[f32]) -> Result<(), SqliteStoreError> {
    if values.is_empty() {
        return Err(SqliteStoreError::EmptyEmbedding);
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(SqliteStoreError::InvalidEmbeddingValue);
    }
    Ok(())
}

// ── Public types ──────────────────────────────────────────────────────────────

/// Metadata about an enrolled identity (no embedding data).
#[derive(Debug, Clone, serde::Serialize)]
pub struct IdentityInfo {
    pub id: String,
    pub name: String,
    pub model_version: String,
    pub created_at: String,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store() -> IdentityStore {
        IdentityStore::open(Path::new(":memory:")).unwrap()
    }

    fn embedding(values: Vec<f32>) -> Embedding {
        Embedding {
            values,
            model_version: Some("test-v1".to_string()),
        }
    }

    #[test]
    fn test_roundtrip() {
        let store = memory_store();

        let values: Vec<f32> = (0..128).map(|i| i as f32 / 128.0).collect();
        let id = store.insert("alice", &embedding(values.clone()), None).unwrap();
        assert!(!id.is_empty());

        let gallery = store.load_all().unwrap();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery[0].id, id);
        assert_eq!(gallery[0].name, "alice");
        assert_eq!(
            gallery[0].embedding.model_version.as_deref(),
            Some("test-v1")
        );
        for (orig, rec) in values.iter().zip(gallery[0].embedding.values.iter()) {
            assert_eq!(orig.to_bits(), rec.to_bits());
        }
    }

    #[test]
    fn test_metadata_roundtrip() {
        let store = memory_store();

        let attrs = FaceAttributes {
            age: Some(34),
            gender: Some("F".to_string()),
            emotion: Some("neutral".to_string()),
        };
        store
            .insert("alice", &embedding(vec![0.1, 0.2]), Some(&attrs))
            .unwrap();
        store.insert("bob", &embedding(vec![0.3, 0.4]), None).unwrap();

        let gallery = store.load_all().unwrap();
        assert_eq!(gallery.len(), 2);
        assert_eq!(gallery[0].metadata.as_ref().unwrap().age, Some(34));
        assert_eq!(
            gallery[0].metadata.as_ref().unwrap().emotion.as_deref(),
            Some("neutral")
        );
        assert!(gallery[1].metadata.is_none());
    }

    #[test]
    fn test_dimension_agnostic() {
        let store = memory_store();

        store.insert("small", &embedding(vec![1.0, 0.0, 0.0]), None).unwrap();
        store
            .insert("large", &embedding(vec![0.5; 512]), None)
            .unwrap();

        let gallery = store.load_all().unwrap();
        assert_eq!(gallery[0].embedding.len(), 3);
        assert_eq!(gallery[1].embedding.len(), 512);
    }

    #[test]
    fn test_remove_and_count() {
        let store = memory_store();

        let id = store.insert("alice", &embedding(vec![1.0]), None).unwrap();
        store.insert("bob", &embedding(vec![2.0]), None).unwrap();
        assert_eq!(store.count().unwrap(), 2);

        assert!(store.remove(&id).unwrap());
        assert!(!store.remove(&id).unwrap());
        assert!(!store.remove("no-such-id").unwrap());
        assert_eq!(store.count().unwrap(), 1);

        let gallery = store.load_all().unwrap();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery[0].name, "bob");
    }

    #[test]
    fn test_list_is_embedding_free_metadata() {
        let store = memory_store();

        store.insert("alice", &embedding(vec![1.0]), None).unwrap();
        store.insert("bob", &embedding(vec![2.0]), None).unwrap();

        let infos = store.list().unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].name, "alice");
        assert_eq!(infos[1].name, "bob");
        assert_eq!(infos[0].model_version, "test-v1");
        assert!(!infos[0].created_at.is_empty());
    }

    #[test]
    fn test_insert_rejects_bad_values() {
        let store = memory_store();

        let err = store.insert("x", &embedding(vec![]), None).unwrap_err();
        assert!(matches!(err, SqliteStoreError::EmptyEmbedding));

        let err = store
            .insert("x", &embedding(vec![0.5, f32::NAN]), None)
            .unwrap_err();
        assert!(matches!(err, SqliteStoreError::InvalidEmbeddingValue));

        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_wrong_key_fails() {
        // Encrypt with one key, try to decrypt with another
        let store1 = IdentityStore {
            conn: Connection::open_in_memory().unwrap(),
            enc_key: [1u8; 32],
        };
        let store2 = IdentityStore {
            conn: Connection::open_in_memory().unwrap(),
            enc_key: [2u8; 32],
        };

        let blob = store1.encrypt_embedding(&[0.1, 0.2, 0.3]).unwrap();
        let err = store2.decrypt_embedding(&blob).unwrap_err();
        assert!(matches!(err, SqliteStoreError::DecryptionFailed));
    }

    #[test]
    fn test_tampered_blob_fails() {
        let store = memory_store();

        let mut blob = store.encrypt_embedding(&[0.1, 0.2, 0.3]).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xff;
        let err = store.decrypt_embedding(&blob).unwrap_err();
        assert!(matches!(err, SqliteStoreError::DecryptionFailed));
    }

    #[test]
    fn test_short_blob_rejected() {
        let store = memory_store();
        let err = store.decrypt_embedding(&[0u8; 8]).unwrap_err();
        assert!(matches!(err, SqliteStoreError::InvalidBlob(8)));
    }

    #[test]
    fn test_enrollment_store_contract() {
        let mut store = memory_store();

        let id =
            EnrollmentStore::add(&mut store, "carol", &embedding(vec![0.6, 0.8]), None).unwrap();
        let gallery = EnrollmentStore::get_all(&store).unwrap();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery[0].id, id);
        assert_eq!(gallery[0].name, "carol");

        let err =
            EnrollmentStore::add(&mut store, "dave", &Embedding::new(vec![]), None).unwrap_err();
        assert!(matches!(err, vigil_core::StoreError::EmptyEmbedding));
    }
}
