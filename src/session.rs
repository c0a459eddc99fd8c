//! Server-side sessions.
//!
//! A [`SessionStore`] persists session data by id; the per-request [`Session`] loads it
//! when the request starts and writes it back (and refreshes the session cookie) when
//! the request ends.

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::SessionSettings;
use crate::ids::{new_session_id, session_id_from_cookie};
use crate::server::{CookieJar, CookieOptions};

/// Session payload.
pub type SessionData = serde_json::Map<String, Value>;

/// Backing storage for sessions.
pub trait SessionStore: Send + Sync {
    /// # Errors
    ///
    /// Backend failures.
    fn load(&self, id: &str) -> Result<Option<SessionData>>;

    /// Persist `data`; `ttl` is how long the session may sit idle.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn save(&self, id: &str, data: &SessionData, ttl: Duration) -> Result<()>;

    /// # Errors
    ///
    /// Backend failures.
    fn destroy(&self, id: &str) -> Result<()>;
}

/// Saves between two sweeps of expired sessions.
const SWEEP_EVERY: usize = 64;

/// Stored payload and the instant it goes stale (`None` when the TTL overflows).
type Entry = (SessionData, Option<Instant>);

fn is_expired(expires: Option<Instant>, now: Instant) -> bool {
    expires.is_some_and(|at| at <= now)
}

/// Process-local store; sessions vanish on restart.
///
/// Expired sessions are dropped when loaded and swept from the whole map every
/// 64 saves.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Entry>>,
    saves: AtomicUsize,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|(_, expires)| !is_expired(*expires, now))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, (_, expires)| !is_expired(*expires, now));
        before - sessions.len()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, id: &str) -> Result<Option<SessionData>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        match sessions.get(id) {
            Some((_, expires)) if is_expired(*expires, Instant::now()) => {
                sessions.remove(id);
                Ok(None)
            }
            Some((data, _)) => Ok(Some(data.clone())),
            None => Ok(None),
        }
    }

    fn save(&self, id: &str, data: &SessionData, ttl: Duration) -> Result<()> {
        if self.saves.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            let purged = self.purge_expired();
            if purged > 0 {
                debug!(purged, "Expired sessions swept");
            }
        }
        let expires = Instant::now().checked_add(ttl);
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), (data.clone(), expires));
        Ok(())
    }

    fn destroy(&self, id: &str) -> Result<()> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        Ok(())
    }
}

/// Session state for one request.
///
/// Reads and writes work before [`start`](Session::start) (for console requests the
/// session simply lives for the duration of the request); only a started session is
/// persisted. A session that was freshly created and is still empty at the end of the
/// request is neither stored nor given a cookie.
#[derive(Debug, Clone)]
pub struct Session {
    settings: SessionSettings,
    id: Option<String>,
    data: SessionData,
    started: bool,
    fresh: bool,
    destroyed: bool,
}

impl Session {
    #[must_use]
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            id: None,
            data: SessionData::new(),
            started: false,
            fresh: false,
            destroyed: false,
        }
    }

    /// Load the session named by the request's session cookie, or begin a new one.
    ///
    /// Starting twice is a no-op.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn start(&mut self, store: &dyn SessionStore, cookies: &CookieJar) -> Result<()> {
        if self.started {
            return Ok(());
        }
        let existing = session_id_from_cookie(cookies.get(&self.settings.name));
        let stored = match existing {
            Some(id) => store.load(&id)?.map(|data| (id, data)),
            None => None,
        };
        self.fresh = stored.is_none();
        let (id, data) = stored.unwrap_or_else(|| (new_session_id(), SessionData::new()));
        debug!(session_id = %id, keys = data.len(), "Session started");
        // keep values written before the session was started
        let mut merged = data;
        merged.extend(std::mem::take(&mut self.data));
        self.data = merged;
        self.id = Some(id);
        self.started = true;
        self.destroyed = false;
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Typed read; `None` when missing or of another shape.
    #[must_use]
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.data.insert(key.to_string(), value.into());
    }

    /// Store any serializable value.
    ///
    /// # Errors
    ///
    /// When `value` cannot be represented as JSON.
    pub fn set_serialized<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        self.data
            .insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Empty the session but keep its id.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    #[must_use]
    pub fn all(&self) -> &SessionData {
        &self.data
    }

    /// Empty the session and delete it from the store at the end of the request.
    pub fn destroy(&mut self) {
        self.data.clear();
        self.destroyed = true;
    }

    /// Write the session back to `store` and refresh (or expire) its cookie.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn flush(&mut self, store: &dyn SessionStore, cookies: &mut CookieJar) -> Result<()> {
        let Some(id) = self.id.clone() else {
            return Ok(());
        };
        if self.destroyed {
            store.destroy(&id)?;
            cookies.remove(&self.settings.name);
            debug!(session_id = %id, "Session destroyed");
            self.id = None;
            self.started = false;
            return Ok(());
        }
        if !self.started {
            return Ok(());
        }
        if self.fresh && self.data.is_empty() {
            return Ok(());
        }
        let ttl = Duration::from_secs(self.settings.expires);
        store.save(&id, &self.data, ttl)?;
        self.fresh = false;
        cookies.set_with(
            &self.settings.name,
            &id,
            CookieOptions {
                expires: Some(i64::try_from(self.settings.expires).unwrap_or(i64::MAX)),
                path: Some(self.settings.cookie_path.clone()),
                domain: self.settings.cookie_domain.clone(),
                secure: None,
                httponly: Some(true),
            },
        );
        Ok(())
    }
}
