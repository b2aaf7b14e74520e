//! Per-visitor state that outlives a request: sticky values and
//! one-shot flash messages, keyed by an opaque session id.

use std::{collections::{BTreeMap, HashMap},
          path::{Path, PathBuf},
          sync::Mutex};

use ::sqlite::State;
use blake3::Hasher;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{def_boxed_thiserror, try_sqlite, warn,
            storage::{StorageError, db::with_connection}};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    #[serde(default)]
    pub flash: BTreeMap<String, String>,
}

impl SessionData {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.flash.is_empty()
    }
}

def_boxed_thiserror!(SessionError, pub enum SessionErrorKind {
    #[error("session store: {0}")]
    Storage(#[from] StorageError),
    #[error("session data does not decode: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("session store lock was poisoned")]
    Poisoned,
});

pub trait SessionBackend: Send + Sync {
    /// The stored data for `sid`, None if there is none (or it
    /// expired).
    fn load(&self, sid: &str) -> Result<Option<SessionData>, SessionError>;

    fn save(&self, sid: &str, data: &SessionData) -> Result<(), SessionError>;
}

/// Keeps sessions in process memory; used by tests and when running
/// without a database.
#[derive(Default)]
pub struct MemoryBackend {
    sessions: Mutex<HashMap<String, SessionData>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionBackend for MemoryBackend {
    fn load(&self, sid: &str) -> Result<Option<SessionData>, SessionError> {
        let m = self.sessions.lock().map_err(|_| SessionErrorKind::Poisoned)?;
        Ok(m.get(sid).cloned())
    }

    fn save(&self, sid: &str, data: &SessionData) -> Result<(), SessionError> {
        let mut m = self.sessions.lock().map_err(|_| SessionErrorKind::Poisoned)?;
        m.insert(sid.to_string(), data.clone());
        Ok(())
    }
}

/// Stores sessions in the `Session` table. Only a keyed hash of the
/// session id is stored, so a leaked database does not allow taking
/// over sessions.
pub struct SqliteBackend {
    path: PathBuf,
    // Already filled with the secret key
    hasher: Hasher,
    timeout_secs: i64,
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>, secret: &str, timeout_secs: i64)
                -> Result<Self, SessionError>
    {
        let path = path.as_ref().to_path_buf();
        with_connection(&path, |c| -> Result<(), StorageError> {
            try_sqlite!(c.execute(
                "create table if not exists Session (
                     sid_hash blob primary key,
                     data text not null,
                     last_request_time integer not null
                 )"));
            Ok(())
        })?;
        let mut hasher = Hasher::new();
        hasher.update(secret.as_bytes());
        Ok(Self { path, hasher, timeout_secs })
    }

    fn sid_hash(&self, sid: &str) -> blake3::Hash {
        let mut hasher = self.hasher.clone();
        hasher.update(sid.as_bytes());
        hasher.finalize()
    }

    /// Delete all sessions older than the timeout; returns how many.
    pub fn purge_expired(&self) -> Result<usize, SessionError> {
        let cutoff = Utc::now().timestamp() - self.timeout_secs;
        Ok(with_connection(&self.path, |c| -> Result<usize, StorageError> {
            let mut sth = try_sqlite!(c.prepare(
                "delete from Session where last_request_time < ?"));
            try_sqlite!(sth.bind((1, cutoff)));
            while let State::Row = try_sqlite!(sth.next()) {}
            let mut sth = try_sqlite!(c.prepare("select changes()"));
            try_sqlite!(sth.next());
            Ok(try_sqlite!(sth.read::<i64, _>(0)) as usize)
        })?)
    }
}

impl SessionBackend for SqliteBackend {
    fn load(&self, sid: &str) -> Result<Option<SessionData>, SessionError> {
        let h = self.sid_hash(sid);
        let row = with_connection(&self.path, |c| -> Result<_, StorageError> {
            let mut sth = try_sqlite!(c.prepare(
                "select data, last_request_time from Session where sid_hash = ?"));
            try_sqlite!(sth.bind((1, &h.as_bytes()[..])));
            match try_sqlite!(sth.next()) {
                State::Row => Ok(Some((try_sqlite!(sth.read::<String, _>(0)),
                                       try_sqlite!(sth.read::<i64, _>(1))))),
                State::Done => Ok(None),
            }
        })?;
        match row {
            None => Ok(None),
            Some((_, t)) if Utc::now().timestamp() - t > self.timeout_secs => Ok(None),
            Some((json, _)) => match serde_json::from_str(&json) {
                Ok(data) => Ok(Some(data)),
                Err(e) => {
                    // Start over rather than locking the visitor out
                    warn!("discarding undecodable session data: {e}");
                    Ok(None)
                }
            }
        }
    }

    fn save(&self, sid: &str, data: &SessionData) -> Result<(), SessionError> {
        let h = self.sid_hash(sid);
        let json = serde_json::to_string(data)?;
        let now = Utc::now().timestamp();
        Ok(with_connection(&self.path, |c| -> Result<(), StorageError> {
            let mut sth = try_sqlite!(c.prepare(
                "insert into Session (sid_hash, data, last_request_time) values (?, ?, ?)
                 on conflict(sid_hash) do update
                 set data = excluded.data, last_request_time = excluded.last_request_time"));
            try_sqlite!(sth.bind((1, &h.as_bytes()[..])));
            try_sqlite!(sth.bind((2, json.as_str())));
            try_sqlite!(sth.bind((3, now)));
            while let State::Row = try_sqlite!(sth.next()) {}
            Ok(())
        })?)
    }
}

/// The session of the current request: a snapshot loaded at the
/// start, written back at the end if anything is in it. Concurrent
/// requests of the same visitor overwrite each other's changes.
#[derive(Debug)]
pub struct Session {
    sid: String,
    data: SessionData,
    dirty: bool,
    is_new: bool,
}

impl Session {
    pub fn load(backend: &dyn SessionBackend, sid: &str) -> Result<Self, SessionError> {
        let (data, is_new) = match backend.load(sid)? {
            Some(data) => (data, false),
            None => (SessionData::default(), true),
        };
        Ok(Session { sid: sid.into(), data, dirty: false, is_new })
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// Whether no stored data was found for this session id.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn get<'s>(&'s self, key: &str, default: &'s str) -> &'s str {
        self.data.values.get(key).map(String::as_str).unwrap_or(default)
    }

    pub fn get_opt(&self, key: &str) -> Option<&str> {
        self.data.values.get(key).map(String::as_str)
    }

    /// Store `value` under `key` until it is overwritten or removed.
    pub fn set_sticky(&mut self, key: &str, value: &str) {
        if self.get_opt(key) != Some(value) {
            self.data.values.insert(key.into(), value.into());
            self.dirty = true;
        }
    }

    pub fn remove(&mut self, key: &str) {
        if self.data.values.remove(key).is_some() {
            self.dirty = true;
        }
    }

    pub fn set_flash(&mut self, key: &str, value: &str) {
        self.data.flash.insert(key.into(), value.into());
        self.dirty = true;
    }

    /// Return the flash value and clear it; a second call returns
    /// None.
    pub fn take_flash(&mut self, key: &str) -> Option<String> {
        let v = self.data.flash.remove(key);
        if v.is_some() {
            self.dirty = true;
        }
        v
    }

    /// Write back. Non-empty sessions are always written, to refresh
    /// their last request time; untouched empty ones are not stored
    /// at all.
    pub fn save(&mut self, backend: &dyn SessionBackend) -> Result<(), SessionError> {
        if self.dirty || ! self.data.is_empty() {
            backend.save(&self.sid, &self.data)?;
            self.dirty = false;
            self.is_new = false;
        }
        Ok(())
    }
}
