//! Shared User-Agent string for every outgoing request.
//!
//! Login, profile probes and media transfers all go through one
//! [`RequestClient`](crate::download::RequestClient), so a single format is enough.

/// Project URL embedded in the User-Agent.
const PROJECT_UA_URL: &str = "https://github.com/coursefetch/coursefetch";

/// Default User-Agent (identifies the tool and its version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("coursefetch/{version} (+{PROJECT_UA_URL})")
}
