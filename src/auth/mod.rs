//! Authentication: session establishment, verification and persistence.
//!
//! A [`Session`] is produced once per run by [`SessionManager::establish`]
//! and lent by reference to every request that needs credentials.

mod cookie_jar;
mod error;
mod session;
mod store;

pub use cookie_jar::CookieJar;
pub use error::AuthError;
pub use session::{
    Credential, LoginIdentity, Session, SessionManager, SessionRequest, SiteEndpoints,
};
pub use store::{MemorySessionStore, PersistedSession, SessionStore};
