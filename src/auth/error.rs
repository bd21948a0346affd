//! Error types for session establishment.

use thiserror::Error;

use crate::download::DownloadError;

/// Errors that can occur while establishing an authenticated session.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The login page answered with a non-2xx status.
    #[error("login page returned HTTP {status}")]
    LoginPage {
        /// Status of the login page response.
        status: u16,
    },

    /// No CSRF token could be obtained before login.
    #[error("could not obtain a CSRF token from the login page or profile probe")]
    LoginCsrf,

    /// The account check asked for a login step this client does not support.
    #[error("account check requested unsupported login step {next_step:?}")]
    LoginFlow {
        /// Instruction returned by the server, when present.
        next_step: Option<String>,
    },

    /// The account check was rejected or returned an unexpected shape.
    #[error("account check failed: {reason}")]
    LoginCheckFailed {
        /// What was wrong with the response.
        reason: String,
    },

    /// The password login was rejected.
    #[error("login rejected: {reason}")]
    LoginAuthFailed {
        /// What was wrong with the response.
        reason: String,
    },

    /// Login succeeded but no session cookie was issued.
    #[error("login response did not set a session cookie")]
    LoginCookie,

    /// No credential source was available.
    #[error("no session available: no cookie, saved session, or login credentials were provided")]
    SessionMissing,

    /// Every available credential was rejected by the profile probe.
    #[error("session rejected: {tried} credential source(s) failed verification")]
    SessionInvalid {
        /// How many sources were tried.
        tried: usize,
    },

    /// A handshake request failed at the transport level.
    #[error("login request failed during {step}: {source}")]
    Transport {
        /// Handshake step name.
        step: &'static str,
        /// Underlying request error.
        #[source]
        source: DownloadError,
    },

    /// The session store could not be read or written.
    #[error("session store error: {message}")]
    Store {
        /// Description from the store.
        message: String,
    },
}

impl AuthError {
    /// Creates an unsupported-flow error.
    pub fn login_flow(next_step: Option<String>) -> Self {
        Self::LoginFlow { next_step }
    }

    /// Creates an account-check failure.
    pub fn login_check_failed(reason: impl Into<String>) -> Self {
        Self::LoginCheckFailed {
            reason: reason.into(),
        }
    }

    /// Creates a login rejection.
    pub fn login_auth_failed(reason: impl Into<String>) -> Self {
        Self::LoginAuthFailed {
            reason: reason.into(),
        }
    }

    /// Wraps a transport failure of one handshake step.
    pub fn transport(step: &'static str, source: DownloadError) -> Self {
        Self::Transport { step, source }
    }

    /// Creates a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Stable machine-readable kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LoginPage { .. } => "LOGIN_PAGE",
            Self::LoginCsrf => "LOGIN_CSRF",
            Self::LoginFlow { .. } => "LOGIN_FLOW",
            Self::LoginCheckFailed { .. } => "LOGIN_CHECK_FAILED",
            Self::LoginAuthFailed { .. } => "LOGIN_AUTH_FAILED",
            Self::LoginCookie => "LOGIN_COOKIE",
            Self::SessionMissing => "SESSION_MISSING",
            Self::SessionInvalid { .. } => "SESSION_INVALID",
            Self::Transport { .. } => "NETWORK",
            Self::Store { .. } => "STORE",
        }
    }

    /// Concrete remediation step for the operator.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::LoginPage { .. } => {
                "Check --base-url points at the site root, or pass a browser cookie with --cookie."
            }
            Self::LoginCsrf => {
                "The login page issued no CSRF token. Pass a browser cookie with --cookie."
            }
            Self::LoginFlow { .. } => {
                "This account needs a non-password login step. Sign in with a browser and \
                 pass the cookie with --cookie or --cookie-file."
            }
            Self::LoginCheckFailed { .. } => "Check the --email value and --base-url, then re-run.",
            Self::LoginAuthFailed { .. } => {
                "Check the password (--password or COURSEFETCH_PASSWORD), then re-run."
            }
            Self::LoginCookie => {
                "The server accepted the login but issued no session. Use --cookie instead."
            }
            Self::SessionMissing => {
                "Provide --cookie, --cookie-file, or --email with --password (or the config file)."
            }
            Self::SessionInvalid { .. } => {
                "The session expired. Re-run with --force-login, or supply a fresh --cookie."
            }
            Self::Transport { .. } => "Check network connectivity/VPN and --base-url, then re-run.",
            Self::Store { .. } => {
                "Check that the config file is valid JSON and that its directory is writable."
            }
        }
    }
}
