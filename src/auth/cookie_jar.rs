//! Handshake-scoped cookie accumulator.
//!
//! Collects `Set-Cookie` values across the few requests of one login
//! handshake and replays them as a single `Cookie` header. There is no
//! expiry, path or domain scoping: the jar lives only as long as the handshake.

use std::fmt;

use reqwest::header::{HeaderMap, SET_COOKIE};
use tracing::{debug, warn};

/// Minimal ordered name/value cookie store.
///
/// Values are redacted in Debug output to prevent accidental logging of
/// session material.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    entries: Vec<(String, String)>,
}

impl CookieJar {
    /// Creates an empty jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses each line's `name=value` prefix, ignoring attributes.
    ///
    /// The last write per name wins; a name keeps the position of its first
    /// insertion. Lines without `=` or with an empty name are skipped.
    pub fn ingest<I, S>(&mut self, set_cookie_lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in set_cookie_lines {
            let line = line.as_ref();
            let pair = line.split(';').next().unwrap_or_default();
            let Some((name, value)) = pair.split_once('=') else {
                warn!("skipping Set-Cookie line without name=value");
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                warn!("skipping Set-Cookie line with empty name");
                continue;
            }
            debug!(name, "captured cookie");
            self.set(name, value.trim());
        }
    }

    /// Ingests every `Set-Cookie` header of a response.
    pub fn ingest_headers(&mut self, headers: &HeaderMap) {
        self.ingest(
            headers
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok()),
        );
    }

    /// Sets one cookie, overwriting in place.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(existing, _)| existing == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    /// Returns a cookie value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    /// Number of distinct cookie names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no cookie was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `name=value; name=value` in insertion order.
    #[must_use]
    pub fn serialize(&self) -> String {
        self.entries
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(name, _)| format!("{name}=[REDACTED]")))
            .finish()
    }
}
