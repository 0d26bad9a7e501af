use crate::codec::{Codec, Value};
use crate::error::{Result, RpcError};
use crate::node::content_hash;

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Longest sanitized name used as-is. Longer ones are replaced by a hash,
/// leaving room for the temp-file decoration under the usual 255-byte limit.
const MAX_FILE_NAME: usize = 200;

/// Marks a hashed file name. Sanitized names never contain `%%`.
const HASHED_PREFIX: &str = "%%";

enum Backend {
    /// gid -> key -> value
    Memory(DashMap<String, DashMap<String, Value>>),
    /// `<root>/<gid>/<key>`, one codec-encoded value per file. A key too
    /// long for a file name is stored under its hash, with the key itself
    /// in a hidden `.<hash>.key` file next to it.
    Disk(PathBuf),
}

/// Single-node key/value store, namespaced by gid.
///
/// Plain `put`/`del` race freely (last write wins). Read-modify-write
/// operations (`append`, `update`) are serialized per store so two appends
/// to the same bucket never lose a value.
pub struct LocalStore {
    backend: Backend,
    codec: Codec,
    rmw: Mutex<()>,
}

impl LocalStore {
    pub fn memory(codec: Codec) -> Self {
        Self {
            backend: Backend::Memory(DashMap::new()),
            codec,
            rmw: Mutex::new(()),
        }
    }

    pub fn disk(codec: Codec, root: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::Disk(root.into()),
            codec,
            rmw: Mutex::new(()),
        }
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, Backend::Disk(_))
    }

    pub async fn get(&self, gid: &str, key: &str) -> Result<Value> {
        check_key(key)?;
        match &self.backend {
            Backend::Memory(spaces) => spaces
                .get(gid)
                .and_then(|space| space.get(key).map(|v| v.value().clone()))
                .ok_or_else(|| not_found(gid, key)),
            Backend::Disk(root) => {
                let path = entry_path(root, gid, key);
                match tokio::fs::read_to_string(&path).await {
                    Ok(body) => Ok(self.codec.decode(&body)?),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        Err(not_found(gid, key))
                    }
                    Err(e) => Err(io_error("read", &path, e)),
                }
            }
        }
    }

    /// Keys held in `gid` on this node, sorted. An unknown gid has no keys.
    pub async fn keys(&self, gid: &str) -> Result<Vec<String>> {
        let mut keys = match &self.backend {
            Backend::Memory(spaces) => spaces
                .get(gid)
                .map(|space| space.iter().map(|e| e.key().clone()).collect::<Vec<_>>())
                .unwrap_or_default(),
            Backend::Disk(root) => {
                let dir = root.join(file_name(gid));
                let mut entries = match tokio::fs::read_dir(&dir).await {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                    Err(e) => return Err(io_error("list", &dir, e)),
                };
                let mut keys = Vec::new();
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| io_error("list", &dir, e))?
                {
                    let name = entry.file_name();
                    let Some(name) = name.to_str() else { continue };
                    if name.starts_with('.') {
                        continue;
                    }
                    if name.starts_with(HASHED_PREFIX) {
                        let sidecar = dir.join(key_file(name));
                        match tokio::fs::read_to_string(&sidecar).await {
                            Ok(key) => keys.push(key),
                            Err(e) => tracing::warn!("Skipping {:?}, key unreadable: {}", name, e),
                        }
                        continue;
                    }
                    match unsanitize(name) {
                        Some(key) => keys.push(key),
                        None => tracing::warn!("Skipping foreign file {:?} in {:?}", name, dir),
                    }
                }
                keys
            }
        };
        keys.sort();
        Ok(keys)
    }

    /// Stores `value` under `key`, or under the content hash of its encoding
    /// when no key is given. Returns the key used.
    pub async fn put(&self, gid: &str, key: Option<&str>, value: Value) -> Result<String> {
        let key = match key {
            Some(key) => key.to_string(),
            None => self.derive_key(&value)?,
        };
        check_key(&key)?;
        self.write_entry(gid, &key, value).await?;
        Ok(key)
    }

    /// Removes `key` and returns the value it held.
    pub async fn del(&self, gid: &str, key: &str) -> Result<Value> {
        check_key(key)?;
        match &self.backend {
            Backend::Memory(spaces) => spaces
                .get(gid)
                .and_then(|space| space.remove(key).map(|(_, v)| v))
                .ok_or_else(|| not_found(gid, key)),
            Backend::Disk(root) => {
                let value = self.get(gid, key).await?;
                let path = entry_path(root, gid, key);
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        let name = file_name(key);
                        if name.starts_with(HASHED_PREFIX) {
                            let sidecar = root.join(file_name(gid)).join(key_file(&name));
                            let _ = tokio::fs::remove_file(sidecar).await;
                        }
                        Ok(value)
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        Err(not_found(gid, key))
                    }
                    Err(e) => Err(io_error("delete", &path, e)),
                }
            }
        }
    }

    /// Adds `value` to the bucket at `key` and returns the bucket.
    ///
    /// absent -> `[value]`, array -> array plus `value`, scalar -> `[old, value]`.
    pub async fn append(&self, gid: &str, key: &str, value: Value) -> Result<Value> {
        self.update(gid, key, move |current| {
            let items = match current {
                None => vec![value],
                Some(existing) => match existing.as_vec() {
                    Some(mut items) => {
                        items.push(value);
                        items
                    }
                    None => vec![existing, value],
                },
            };
            Ok(Value::array(items))
        })
        .await
    }

    /// Read-modify-write of one entry under the store's update lock.
    pub async fn update<F>(&self, gid: &str, key: &str, f: F) -> Result<Value>
    where
        F: FnOnce(Option<Value>) -> Result<Value>,
    {
        check_key(key)?;
        let _guard = self.rmw.lock().await;
        let current = match self.get(gid, key).await {
            Ok(value) => Some(value),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        let next = f(current)?;
        self.write_entry(gid, key, next.clone()).await?;
        Ok(next)
    }

    fn derive_key(&self, value: &Value) -> Result<String> {
        Ok(content_hash(&self.codec.encode(value)?))
    }

    async fn write_entry(&self, gid: &str, key: &str, value: Value) -> Result<()> {
        match &self.backend {
            Backend::Memory(spaces) => {
                spaces
                    .entry(gid.to_string())
                    .or_default()
                    .insert(key.to_string(), value);
            }
            Backend::Disk(root) => {
                let body = self.codec.encode(&value)?;
                let dir = root.join(file_name(gid));
                tokio::fs::create_dir_all(&dir)
                    .await
                    .map_err(|e| io_error("create", &dir, e))?;
                let name = file_name(key);
                if name.starts_with(HASHED_PREFIX) {
                    replace_file(&dir, &key_file(&name), key).await?;
                }
                replace_file(&dir, &name, &body).await?;
            }
        }
        tracing::debug!("Stored {}/{}", gid, key);
        Ok(())
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(RpcError::Validation("store key must not be empty".into()));
    }
    Ok(())
}

fn not_found(gid: &str, key: &str) -> RpcError {
    RpcError::NotFound(format!("key '{}' not found in '{}'", key, gid))
}

fn io_error(op: &str, path: &Path, e: std::io::Error) -> RpcError {
    tracing::error!("Failed to {} {:?}: {}", op, path, e);
    RpcError::Application(Value::error("StorageError", &format!("{} {:?}: {}", op, path, e)))
}

fn entry_path(root: &Path, gid: &str, key: &str) -> PathBuf {
    root.join(file_name(gid)).join(file_name(key))
}

/// Sanitized name, or `%%<hash>` when that would be too long.
fn file_name(name: &str) -> String {
    let safe = sanitize(name);
    if safe.len() <= MAX_FILE_NAME {
        safe
    } else {
        format!("{}{}", HASHED_PREFIX, content_hash(name))
    }
}

fn key_file(hashed: &str) -> String {
    format!(".{}.key", hashed)
}

/// Writes `dir/name` through a hidden temp file and a rename, so readers see
/// either the old contents or the new ones.
async fn replace_file(dir: &Path, name: &str, body: &str) -> Result<()> {
    let tmp = dir.join(format!(".{}.tmp-{}", name, Uuid::new_v4()));
    let path = dir.join(name);
    tokio::fs::write(&tmp, body)
        .await
        .map_err(|e| io_error("write", &tmp, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, &path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_error("rename", &path, e));
    }
    Ok(())
}

/// Filesystem-safe, reversible file name: `[A-Za-z0-9_-]` pass through,
/// every other byte becomes `%XX`.
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

pub fn unsanitize(name: &str) -> Option<String> {
    urlencoding::decode(name).ok().map(|s| s.into_owned())
}
