// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Validity-checked persistence for large precomputed assets.
//!
//! Embeddings and the serialized search index are expensive to rebuild, so
//! they are cached behind fixed versioned keys. Every stored blob is
//! wrapped in a checksummed envelope:
//!
//! ```text
//! offset  size  field
//! 0       4     magic "QRYC"
//! 4       2     schema version (u16 LE)
//! 6       8     stored-at timestamp, ms since epoch (u64 LE)
//! 14      1     content-hash flag
//! 15      4     content hash (crc32, present iff flag = 1)
//! ..      8     payload length (u64 LE)
//! ..      n     payload
//! ..      4     crc32 of all preceding bytes
//! ```
//!
//! Every failure mode - missing key, IO error, bad magic, version skew,
//! checksum mismatch, expired TTL, hash mismatch - degrades to a cache
//! miss and evicts the offending entry. Nothing here returns an error
//! across the public boundary and nothing panics.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crc32fast::Hasher;

/// Embedding matrix blob.
pub const EMBEDDINGS_KEY: &str = "embeddings-v2";
/// Embedding metadata JSON.
pub const EMBEDDINGS_METADATA_KEY: &str = "embeddings-metadata-v2";
/// Serialized lexical index.
pub const SEARCH_INDEX_KEY: &str = "search-index-v1";

/// Envelope schema version. Bump on layout changes; readers treat any
/// other version as a miss.
pub const SCHEMA_VERSION: u16 = 2;

/// Default entry lifetime: 7 days.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const MAGIC: [u8; 4] = *b"QRYC";

// =============================================================================
// BLOB STORES
// =============================================================================

/// Raw key/value byte storage. Implementations are best-effort: a failed
/// read is `None`, a failed write is `false`.
pub trait BlobStore {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn set(&self, key: &str, bytes: &[u8]) -> bool;
    fn delete(&self, key: &str) -> bool;
    fn clear(&self) -> bool;
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryBlobStore {
    map: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.map.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, bytes: &[u8]) -> bool {
        match self.map.lock() {
            Ok(mut map) => {
                map.insert(key.to_string(), bytes.to_vec());
                true
            }
            Err(_) => false,
        }
    }

    fn delete(&self, key: &str) -> bool {
        self.map
            .lock()
            .map(|mut map| map.remove(key).is_some())
            .unwrap_or(false)
    }

    fn clear(&self) -> bool {
        match self.map.lock() {
            Ok(mut map) => {
                map.clear();
                true
            }
            Err(_) => false,
        }
    }
}

/// Directory-backed store, one file per key. Writes go through a temp
/// file and a rename so a concurrent reader never sees a torn blob;
/// last writer wins per key.
pub struct DirBlobStore {
    dir: PathBuf,
}

impl DirBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirBlobStore { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are fixed constants, but never trust them as paths.
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.bin"))
    }
}

impl BlobStore for DirBlobStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, bytes: &[u8]) -> bool {
        if fs::create_dir_all(&self.dir).is_err() {
            return false;
        }
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        if fs::write(&tmp, bytes).is_err() {
            return false;
        }
        fs::rename(&tmp, &path).is_ok()
    }

    fn delete(&self, key: &str) -> bool {
        fs::remove_file(self.path_for(key)).is_ok()
    }

    fn clear(&self) -> bool {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return false;
        };
        let mut ok = true;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(false, |e| e == "bin") {
                ok &= fs::remove_file(path).is_ok();
            }
        }
        ok
    }
}

// =============================================================================
// ENVELOPE
// =============================================================================

fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn encode(payload: &[u8], content_hash: Option<u32>, stored_at_ms: u64, version: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 32);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&version.to_le_bytes());
    out.extend_from_slice(&stored_at_ms.to_le_bytes());
    match content_hash {
        Some(hash) => {
            out.push(1);
            out.extend_from_slice(&hash.to_le_bytes());
        }
        None => out.push(0),
    }
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(payload);
    let footer = crc32(&out);
    out.extend_from_slice(&footer.to_le_bytes());
    out
}

struct Envelope {
    stored_at_ms: u64,
    content_hash: Option<u32>,
    payload: Vec<u8>,
}

fn decode(bytes: &[u8], version: u16) -> Option<Envelope> {
    // magic + version + timestamp + flag + length + footer
    if bytes.len() < 4 + 2 + 8 + 1 + 8 + 4 {
        return None;
    }
    let (body, footer) = bytes.split_at(bytes.len() - 4);
    let footer = u32::from_le_bytes(footer.try_into().ok()?);
    if crc32(body) != footer {
        return None;
    }
    if body[0..4] != MAGIC {
        return None;
    }
    if u16::from_le_bytes(body[4..6].try_into().ok()?) != version {
        return None;
    }
    let stored_at_ms = u64::from_le_bytes(body[6..14].try_into().ok()?);
    let mut cursor = 15;
    let content_hash = match body[14] {
        1 => {
            let hash = u32::from_le_bytes(body.get(15..19)?.try_into().ok()?);
            cursor = 19;
            Some(hash)
        }
        0 => None,
        _ => return None,
    };
    let len = u64::from_le_bytes(body.get(cursor..cursor + 8)?.try_into().ok()?) as usize;
    let payload = body.get(cursor + 8..)?;
    if payload.len() != len {
        return None;
    }
    Some(Envelope {
        stored_at_ms,
        content_hash,
        payload: payload.to_vec(),
    })
}

// =============================================================================
// CACHE
// =============================================================================

/// TTL- and checksum-validated cache over any [`BlobStore`].
pub struct AssetCache<S: BlobStore> {
    store: S,
    ttl: Duration,
    version: u16,
}

impl<S: BlobStore> AssetCache<S> {
    pub fn new(store: S) -> Self {
        AssetCache {
            store,
            ttl: DEFAULT_TTL,
            version: SCHEMA_VERSION,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Override the envelope version. Readers and writers must agree, so
    /// bumping this invalidates everything written before.
    pub fn with_version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    /// Fetch a payload. Any validity failure evicts the entry and reads
    /// as a miss.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.get_validated(key, None)
    }

    /// Like [`get`](Self::get), but additionally requires the stored
    /// content hash to equal `expected_hash`. Used to drop embedding
    /// caches when the catalog they were computed from changes.
    pub fn get_hashed(&self, key: &str, expected_hash: u32) -> Option<Vec<u8>> {
        self.get_validated(key, Some(expected_hash))
    }

    fn get_validated(&self, key: &str, expected_hash: Option<u32>) -> Option<Vec<u8>> {
        let bytes = self.store.get(key)?;
        let envelope = match decode(&bytes, self.version) {
            Some(e) => e,
            None => {
                self.store.delete(key);
                return None;
            }
        };

        let age_ms = now_ms().saturating_sub(envelope.stored_at_ms);
        if age_ms > self.ttl.as_millis() as u64 {
            self.store.delete(key);
            return None;
        }
        if let Some(expected) = expected_hash {
            if envelope.content_hash != Some(expected) {
                self.store.delete(key);
                return None;
            }
        }
        Some(envelope.payload)
    }

    pub fn set(&self, key: &str, payload: &[u8]) -> bool {
        self.store
            .set(key, &encode(payload, None, now_ms(), self.version))
    }

    /// Store with a content hash over the source the payload was derived
    /// from (not the payload itself).
    pub fn set_hashed(&self, key: &str, payload: &[u8], content_hash: u32) -> bool {
        self.store
            .set(key, &encode(payload, Some(content_hash), now_ms(), self.version))
    }

    pub fn delete(&self, key: &str) -> bool {
        self.store.delete(key)
    }

    pub fn clear(&self) -> bool {
        self.store.clear()
    }
}

/// Metadata about a stored entry, for inspection tooling. Validity is
/// checked the same way `get` checks it, but nothing is evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
    pub stored_at_ms: u64,
    pub payload_len: usize,
    pub content_hash: Option<u32>,
    pub expired: bool,
}

impl<S: BlobStore> AssetCache<S> {
    pub fn stat(&self, key: &str) -> Option<EntryInfo> {
        let bytes = self.store.get(key)?;
        let envelope = decode(&bytes, self.version)?;
        let age_ms = now_ms().saturating_sub(envelope.stored_at_ms);
        Some(EntryInfo {
            stored_at_ms: envelope.stored_at_ms,
            payload_len: envelope.payload.len(),
            content_hash: envelope.content_hash,
            expired: age_ms > self.ttl.as_millis() as u64,
        })
    }
}

/// CRC32 of arbitrary source bytes, for use with
/// [`AssetCache::set_hashed`].
pub fn content_hash(bytes: &[u8]) -> u32 {
    crc32(bytes)
}
