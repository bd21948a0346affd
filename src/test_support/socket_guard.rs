//! Localhost socket check for wiremock-backed unit tests.
//!
//! Some sandboxes forbid binding even `127.0.0.1`. Tests call
//! [`start_mock_server_or_skip`] and return early on `None`, unless
//! `COURSEFETCH_REQUIRE_SOCKET_TESTS` is truthy, in which case a missing
//! socket fails the test.

use std::net::TcpListener;

use wiremock::MockServer;

const REQUIRE_SOCKETS_VAR: &str = "COURSEFETCH_REQUIRE_SOCKET_TESTS";

fn sockets_required() -> bool {
    std::env::var(REQUIRE_SOCKETS_VAR).is_ok_and(|value| {
        matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
    })
}

fn loopback_available() -> Result<(), std::io::Error> {
    TcpListener::bind("127.0.0.1:0").map(drop)
}

/// Starts a mock server, or `None` when loopback sockets are unavailable.
///
/// # Panics
///
/// When sockets are unavailable and `COURSEFETCH_REQUIRE_SOCKET_TESTS` is set.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    match loopback_available() {
        Ok(()) => Some(MockServer::start().await),
        Err(error) if sockets_required() => {
            panic!("loopback bind failed ({error}) and {REQUIRE_SOCKETS_VAR} is set")
        }
        Err(error) => {
            eprintln!("skipping mock-server test: loopback bind failed ({error})");
            None
        }
    }
}
