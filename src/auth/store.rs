//! Persistence seam for the last verified session.
//!
//! The session manager reads and writes through [`SessionStore`]; the JSON
//! config file implements it in [`crate::config::ConfigStore`], tests use
//! [`MemorySessionStore`].

use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::AuthError;

/// A verified session cookie with the time it was stored.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    /// Full `Cookie` header value.
    pub cookie: String,
    /// RFC 3339 UTC timestamp.
    pub updated_at: String,
}

impl PersistedSession {
    /// Stamps `cookie` with the current UTC time.
    #[must_use]
    pub fn now(cookie: impl Into<String>) -> Self {
        Self {
            cookie: cookie.into(),
            updated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

impl fmt::Debug for PersistedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedSession")
            .field("cookie", &"[REDACTED]")
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Load/save access to the persisted session.
pub trait SessionStore: Send {
    /// Returns the stored session, if any.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Store`] when the backing storage is unreadable.
    fn load(&self) -> Result<Option<PersistedSession>, AuthError>;

    /// Replaces the stored session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Store`] when the backing storage cannot be written.
    fn save(&mut self, session: &PersistedSession) -> Result<(), AuthError>;
}

/// Process-local store.
#[derive(Debug, Default, Clone)]
pub struct MemorySessionStore {
    session: Option<PersistedSession>,
    saves: usize,
}

impl MemorySessionStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with `session`.
    #[must_use]
    pub fn with_session(session: PersistedSession) -> Self {
        Self {
            session: Some(session),
            saves: 0,
        }
    }

    /// The currently held session.
    #[must_use]
    pub fn session(&self) -> Option<&PersistedSession> {
        self.session.as_ref()
    }

    /// Number of `save` calls so far.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<PersistedSession>, AuthError> {
        Ok(self.session.clone())
    }

    fn save(&mut self, session: &PersistedSession) -> Result<(), AuthError> {
        self.session = Some(session.clone());
        self.saves += 1;
        Ok(())
    }
}
