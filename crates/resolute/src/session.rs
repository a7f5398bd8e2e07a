//! Persisted authentication sessions.
//!
//! A session is the browser's storage state (cookies plus per-origin local
//! storage). It is produced after a successful login, persisted through a
//! [`SessionStore`], and reused by later runs until it is older than
//! [`auth_state_max_age`]. Stores are keyed so that parallel workers never
//! write the same file.

use crate::result::{ResoluteError, ResoluteResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::debug;

/// Hours after which a persisted session is considered stale
pub const AUTH_STATE_MAX_AGE_HOURS: i64 = 24;

/// Default key for single-worker runs
pub const DEFAULT_SESSION_KEY: &str = "user-auth";

/// Storage state for a browser context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    /// Cookies
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    /// Local storage, per origin
    #[serde(default)]
    pub origins: Vec<OriginStorage>,
}

impl StorageState {
    /// Create empty storage state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cookie
    #[must_use]
    pub fn with_cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Add local storage item
    #[must_use]
    pub fn with_local_storage(mut self, origin: &str, name: &str, value: &str) -> Self {
        let entry = NameValue {
            name: name.to_string(),
            value: value.to_string(),
        };
        if let Some(existing) = self.origins.iter_mut().find(|o| o.origin == origin) {
            existing.local_storage.retain(|kv| kv.name != name);
            existing.local_storage.push(entry);
        } else {
            self.origins.push(OriginStorage {
                origin: origin.to_string(),
                local_storage: vec![entry],
            });
        }
        self
    }

    /// Look up a local storage value
    #[must_use]
    pub fn local_storage_value(&self, origin: &str, name: &str) -> Option<&str> {
        self.origins
            .iter()
            .find(|o| o.origin == origin)
            .and_then(|o| o.local_storage.iter().find(|kv| kv.name == name))
            .map(|kv| kv.value.as_str())
    }

    /// Check if storage is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.iter().all(|o| o.local_storage.is_empty())
    }
}

/// Local storage for one origin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginStorage {
    /// Origin, e.g. `https://app.example.com`
    pub origin: String,
    /// Entries
    #[serde(rename = "localStorage", default)]
    pub local_storage: Vec<NameValue>,
}

/// A storage entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameValue {
    /// Key
    pub name: String,
    /// Value
    pub value: String,
}

/// Browser cookie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Domain
    pub domain: String,
    /// Path
    #[serde(default = "default_cookie_path")]
    pub path: String,
    /// Expiry as unix seconds; -1 for session cookies
    #[serde(default = "default_cookie_expiry")]
    pub expires: f64,
    /// HTTP only flag
    #[serde(default)]
    pub http_only: bool,
    /// Secure flag
    #[serde(default)]
    pub secure: bool,
    /// SameSite policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<SameSite>,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

const fn default_cookie_expiry() -> f64 {
    -1.0
}

impl Cookie {
    /// Create a session cookie
    #[must_use]
    pub fn new(name: &str, value: &str, domain: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            domain: domain.to_string(),
            path: default_cookie_path(),
            expires: default_cookie_expiry(),
            http_only: false,
            secure: false,
            same_site: None,
        }
    }

    /// Set expiry
    #[must_use]
    pub const fn with_expires(mut self, expires: f64) -> Self {
        self.expires = expires;
        self
    }

    /// Mark HTTP only
    #[must_use]
    pub const fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    /// Mark secure
    #[must_use]
    pub const fn secure(mut self) -> Self {
        self.secure = true;
        self
    }
}

/// SameSite cookie attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    /// Strict
    Strict,
    /// Lax
    Lax,
    /// None
    None,
}

/// A stored session plus when it was saved
#[derive(Debug, Clone, PartialEq)]
pub struct SessionBlob {
    /// Browser storage state
    pub state: StorageState,
    /// Save time
    pub saved_at: DateTime<Utc>,
}

impl SessionBlob {
    /// Wrap a state saved now
    #[must_use]
    pub fn now(state: StorageState) -> Self {
        Self {
            state,
            saved_at: Utc::now(),
        }
    }

    /// Wrap a state with an explicit save time
    #[must_use]
    pub const fn saved_at(state: StorageState, saved_at: DateTime<Utc>) -> Self {
        Self { state, saved_at }
    }

    /// Age at `now`
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> ChronoDuration {
        now - self.saved_at
    }

    /// Whether the blob is older than `max_age` at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: ChronoDuration) -> bool {
        self.age(now) > max_age
    }
}

/// Pluggable session persistence
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Load the blob stored under `key`
    fn load(&self, key: &str) -> ResoluteResult<Option<SessionBlob>>;

    /// Store a blob under `key`, replacing any previous one
    fn save(&self, key: &str, blob: &SessionBlob) -> ResoluteResult<()>;

    /// Remove the blob under `key`; returns whether one existed
    fn remove(&self, key: &str) -> ResoluteResult<bool>;

    /// Load the blob under `key` only if it is still fresh at `now`
    fn load_fresh(
        &self,
        key: &str,
        now: DateTime<Utc>,
        max_age: ChronoDuration,
    ) -> ResoluteResult<Option<SessionBlob>> {
        Ok(self.load(key)?.filter(|blob| {
            let fresh = !blob.is_expired(now, max_age);
            if !fresh {
                debug!(key, saved_at = %blob.saved_at, "stored session expired");
            }
            fresh
        }))
    }
}

/// One JSON file per key under a directory.
///
/// The file holds the engine's storage-state document; the save time is the
/// file's modification time.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Create a store rooted at `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the session files
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file for `key`
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(key)))
    }

    /// Keys currently stored
    pub fn keys(&self) -> ResoluteResult<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("json") {
                    path.file_stem().and_then(|s| s.to_str()).map(String::from)
                } else {
                    None
                }
            })
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn store_error(path: &Path, message: impl Into<String>) -> ResoluteError {
        ResoluteError::SessionStore {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, key: &str) -> ResoluteResult<Option<SessionBlob>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        let state: StorageState = serde_json::from_str(&raw)
            .map_err(|e| Self::store_error(&path, format!("invalid session file: {e}")))?;
        let modified = fs::metadata(&path)?.modified()?;
        Ok(Some(SessionBlob::saved_at(
            state,
            DateTime::<Utc>::from(modified),
        )))
    }

    fn save(&self, key: &str, blob: &SessionBlob) -> ResoluteResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = path.with_extension(format!("json.{}.tmp", std::process::id()));

        let json = serde_json::to_vec_pretty(&blob.state)?;
        let written = fs::write(&tmp, json)
            .and_then(|()| {
                fs::File::options()
                    .write(true)
                    .open(&tmp)?
                    .set_modified(SystemTime::from(blob.saved_at))
            })
            .and_then(|()| fs::rename(&tmp, &path));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                debug!(path = %tmp.display(), error = %cleanup, "temporary session file not removed");
            }
            return Err(Self::store_error(&path, e.to_string()));
        }

        debug!(path = %path.display(), "session saved");
        Ok(())
    }

    fn remove(&self, key: &str) -> ResoluteResult<bool> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    blobs: Mutex<HashMap<String, SessionBlob>>,
}

impl MemorySessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, key: &str) -> ResoluteResult<Option<SessionBlob>> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| ResoluteError::page("session store poisoned"))?;
        Ok(blobs.get(key).cloned())
    }

    fn save(&self, key: &str, blob: &SessionBlob) -> ResoluteResult<()> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| ResoluteError::page("session store poisoned"))?;
        let _ = blobs.insert(key.to_string(), blob.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> ResoluteResult<bool> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| ResoluteError::page("session store poisoned"))?;
        Ok(blobs.remove(key).is_some())
    }
}

/// Age after which a persisted session is considered stale
#[must_use]
pub fn auth_state_max_age() -> ChronoDuration {
    ChronoDuration::hours(AUTH_STATE_MAX_AGE_HOURS)
}

/// Whether the session file at `path` is missing or older than
/// [`auth_state_max_age`] at `now`
#[must_use]
pub fn is_auth_state_expired(path: &Path, now: DateTime<Utc>) -> bool {
    let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) else {
        return true;
    };
    now - DateTime::<Utc>::from(modified) > auth_state_max_age()
}

/// Session key for a parallel worker
#[must_use]
pub fn worker_key(worker: Option<usize>) -> String {
    worker.map_or_else(
        || DEFAULT_SESSION_KEY.to_string(),
        |id| format!("{DEFAULT_SESSION_KEY}-w{id}"),
    )
}

fn sanitize_key(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        DEFAULT_SESSION_KEY.to_string()
    } else {
        cleaned
    }
}
