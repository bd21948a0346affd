//! Authenticated session establishment.
//!
//! [`SessionManager::establish`] tries, in order: a caller-supplied cookie, the
//! persisted session (unless a fresh login is forced), and a full
//! CSRF-protected login handshake. Every candidate is gated by a profile probe;
//! only `success == true` in the probe's JSON body marks a session valid.

use std::fmt;

use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue, REFERER};
use reqwest::{Method, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::cookie_jar::CookieJar;
use super::store::{PersistedSession, SessionStore};
use super::AuthError;
use crate::download::{RequestClient, RequestOptions};

/// Cookie carrying the anti-forgery token.
const CSRF_COOKIE: &str = "csrftoken";
/// Cookie carrying the session id.
const SESSION_COOKIE: &str = "sessionid";
/// Profile-probe body field holding a fallback CSRF token.
const CSRF_BODY_FIELD: &str = "csrf_token";
/// The only account-check instruction this client can follow.
const PASSWORD_STEP: &str = "password";

const CSRF_HEADER: HeaderName = HeaderName::from_static("x-csrftoken");

const DEFAULT_LOGIN_PAGE_PATH: &str = "/login/";
const DEFAULT_CHECK_ACCOUNT_PATH: &str = "/api/auth/check-account/";
const DEFAULT_LOGIN_PATH: &str = "/api/auth/login/";
const DEFAULT_PROFILE_PATH: &str = "/api/profile/";

/// Cookie header value plus the probe verdict.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    cookie: String,
    authenticated: bool,
}

impl Credential {
    /// The `Cookie` header value.
    #[must_use]
    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    /// True only when a profile probe accepted this cookie.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("cookie", &"[REDACTED]")
            .field("authenticated", &self.authenticated)
            .finish()
    }
}

/// The process's active credential, lent by reference to every request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    credential: Option<Credential>,
}

impl Session {
    /// Session without any credential.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Session carrying `cookie` that no probe has vouched for.
    #[must_use]
    pub fn unverified(cookie: impl Into<String>) -> Self {
        Self {
            credential: Some(Credential {
                cookie: cookie.into(),
                authenticated: false,
            }),
        }
    }

    fn verified(cookie: impl Into<String>) -> Self {
        Self {
            credential: Some(Credential {
                cookie: cookie.into(),
                authenticated: true,
            }),
        }
    }

    /// The active credential, if any.
    #[must_use]
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// True when the credential passed a profile probe.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.credential.as_ref().is_some_and(Credential::is_authenticated)
    }

    /// Request headers for this session: `Cookie` when a credential is held,
    /// `Referer` when given. Values that are not valid header text are dropped.
    #[must_use]
    pub fn headers(&self, referer: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(credential) = &self.credential
            && !credential.cookie.is_empty()
        {
            match HeaderValue::from_str(&credential.cookie) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(COOKIE, value);
                }
                Err(_) => warn!("session cookie is not a valid header value; sending without it"),
            }
        }
        if let Some(referer) = referer {
            match HeaderValue::from_str(referer) {
                Ok(value) => {
                    headers.insert(REFERER, value);
                }
                Err(_) => debug!("dropping invalid referer header"),
            }
        }
        headers
    }
}

/// Absolute URLs of the four endpoints the handshake touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteEndpoints {
    /// Page that issues the CSRF cookie.
    pub login_page: String,
    /// Account lookup returning the next login step.
    pub check_account: String,
    /// Password login.
    pub login: String,
    /// Authenticated profile probe.
    pub profile: String,
}

impl SiteEndpoints {
    /// Default endpoint paths under `base_url`.
    ///
    /// # Errors
    ///
    /// Returns the parse error when `base_url` is not an absolute URL.
    pub fn from_base_url(base_url: &str) -> Result<Self, url::ParseError> {
        let base = Url::parse(base_url)?;
        Ok(Self {
            login_page: base.join(DEFAULT_LOGIN_PAGE_PATH)?.to_string(),
            check_account: base.join(DEFAULT_CHECK_ACCOUNT_PATH)?.to_string(),
            login: base.join(DEFAULT_LOGIN_PATH)?.to_string(),
            profile: base.join(DEFAULT_PROFILE_PATH)?.to_string(),
        })
    }
}

/// Account identity and secret for the password handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginIdentity {
    email: String,
    password: String,
}

impl LoginIdentity {
    /// Pairs an account email with its password.
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// The account email.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }
}

impl fmt::Debug for LoginIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginIdentity")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Inputs to [`SessionManager::establish`].
#[derive(Clone, Default)]
pub struct SessionRequest {
    /// Cookie supplied on the command line or in config; tried first.
    pub override_cookie: Option<String>,
    /// Credentials for a fresh login.
    pub identity: Option<LoginIdentity>,
    /// Skip the persisted session.
    pub force_login: bool,
}

impl fmt::Debug for SessionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRequest")
            .field("override_cookie", &self.override_cookie.as_ref().map(|_| "[REDACTED]"))
            .field("identity", &self.identity)
            .field("force_login", &self.force_login)
            .finish()
    }
}

/// Transient handshake state.
#[derive(Debug, Default)]
struct LoginSession {
    csrf_token: String,
    cookies: CookieJar,
    session_id: Option<String>,
}

impl LoginSession {
    fn headers(&self, referer: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.csrf_token) {
            headers.insert(CSRF_HEADER, value);
        }
        if !self.cookies.is_empty()
            && let Ok(mut value) = HeaderValue::from_str(&self.cookies.serialize())
        {
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }
        if let Ok(value) = HeaderValue::from_str(referer) {
            headers.insert(REFERER, value);
        }
        headers
    }

    fn credential_cookie(&self, session_id: &str) -> String {
        let csrf = self.cookies.get(CSRF_COOKIE).unwrap_or(&self.csrf_token);
        format!("{CSRF_COOKIE}={csrf}; {SESSION_COOKIE}={session_id}")
    }
}

/// Application-level status shared by the login and profile endpoints.
#[derive(Debug, Default, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    next_step: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

async fn read_status(response: Response) -> Option<ApiStatus> {
    response.json::<ApiStatus>().await.ok()
}

/// Establishes and verifies sessions against one site.
#[derive(Debug, Clone)]
pub struct SessionManager {
    client: RequestClient,
    endpoints: SiteEndpoints,
    options: RequestOptions,
}

impl SessionManager {
    /// Creates a manager issuing requests through `client`.
    #[must_use]
    pub fn new(client: RequestClient, endpoints: SiteEndpoints, options: RequestOptions) -> Self {
        Self {
            client,
            endpoints,
            options,
        }
    }

    /// The endpoints in use.
    #[must_use]
    pub fn endpoints(&self) -> &SiteEndpoints {
        &self.endpoints
    }

    /// Produces a verified session from the first source that passes the
    /// profile probe.
    ///
    /// A successful fresh login is persisted to `store`; a failed save is
    /// logged and does not fail the call.
    ///
    /// # Errors
    ///
    /// - Any `LOGIN_*` [`AuthError`] from the handshake, which is never
    ///   retried as a whole.
    /// - [`AuthError::SessionInvalid`] when at least one source was tried and
    ///   rejected, [`AuthError::SessionMissing`] when none was available.
    /// - [`AuthError::Transport`] when a probe or handshake request could not
    ///   be completed, [`AuthError::Store`] when the store cannot be read.
    #[instrument(skip_all, fields(force_login = request.force_login))]
    pub async fn establish(
        &self,
        request: SessionRequest,
        store: &mut dyn SessionStore,
    ) -> Result<Session, AuthError> {
        let mut tried = 0usize;

        if let Some(cookie) = request.override_cookie.as_deref().map(str::trim)
            && !cookie.is_empty()
        {
            tried += 1;
            if self.verify(cookie).await? {
                info!(source = "override", "session verified");
                return Ok(Session::verified(cookie));
            }
            warn!("supplied cookie was rejected by the profile probe");
        }

        if request.force_login {
            debug!("skipping persisted session: fresh login forced");
        } else if let Some(persisted) = store.load()?
            && !persisted.cookie.trim().is_empty()
        {
            tried += 1;
            if self.verify(&persisted.cookie).await? {
                info!(source = "persisted", updated_at = %persisted.updated_at, "session verified");
                return Ok(Session::verified(persisted.cookie));
            }
            warn!(
                updated_at = %persisted.updated_at,
                "persisted session was rejected by the profile probe"
            );
        }

        if let Some(identity) = &request.identity {
            tried += 1;
            let cookie = self.handshake(identity).await?;
            if self.verify(&cookie).await? {
                if let Err(error) = store.save(&PersistedSession::now(cookie.as_str())) {
                    warn!(error = %error, "could not persist session");
                }
                info!(source = "login", "session verified");
                return Ok(Session::verified(cookie));
            }
            warn!("freshly issued session was rejected by the profile probe");
        }

        if tried > 0 {
            Err(AuthError::SessionInvalid { tried })
        } else {
            Err(AuthError::SessionMissing)
        }
    }

    /// Probes the profile endpoint with `cookie`.
    ///
    /// Non-2xx statuses and bodies without a boolean `success: true` count as
    /// not authenticated.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Transport`] when the probe request itself fails.
    #[instrument(level = "debug", skip_all)]
    pub async fn verify(&self, cookie: &str) -> Result<bool, AuthError> {
        let headers = Session::unverified(cookie).headers(None);
        let response = self
            .client
            .get(&self.endpoints.profile, &headers, self.options)
            .await
            .map_err(|error| AuthError::transport("profile probe", error))?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "profile probe rejected");
            return Ok(false);
        }
        Ok(read_status(response).await.is_some_and(|body| body.success))
    }

    #[instrument(level = "debug", skip_all, fields(email = %identity.email))]
    async fn handshake(&self, identity: &LoginIdentity) -> Result<String, AuthError> {
        let mut login = LoginSession::default();

        let response = self
            .client
            .get(&self.endpoints.login_page, &HeaderMap::new(), self.options)
            .await
            .map_err(|error| AuthError::transport("login page", error))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::LoginPage {
                status: status.as_u16(),
            });
        }
        login.cookies.ingest_headers(response.headers());

        let cookie_token = login
            .cookies
            .get(CSRF_COOKIE)
            .filter(|token| !token.is_empty())
            .map(str::to_string);
        login.csrf_token = match cookie_token {
            Some(token) => token,
            None => self
                .csrf_from_profile(&mut login.cookies)
                .await?
                .ok_or(AuthError::LoginCsrf)?,
        };
        debug!(cookies = login.cookies.len(), "csrf token obtained");

        self.check_account(&mut login, identity).await?;
        self.password_login(&mut login, identity).await?;

        login.session_id = login.cookies.get(SESSION_COOKIE).map(str::to_string);
        let session_id = login
            .session_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(AuthError::LoginCookie)?;
        Ok(login.credential_cookie(session_id))
    }

    async fn csrf_from_profile(
        &self,
        cookies: &mut CookieJar,
    ) -> Result<Option<String>, AuthError> {
        debug!("no csrf cookie on login page; falling back to profile probe");
        let mut headers = HeaderMap::new();
        if !cookies.is_empty()
            && let Ok(value) = HeaderValue::from_str(&cookies.serialize())
        {
            headers.insert(COOKIE, value);
        }
        let response = self
            .client
            .get(&self.endpoints.profile, &headers, self.options)
            .await
            .map_err(|error| AuthError::transport("profile probe", error))?;
        cookies.ingest_headers(response.headers());

        if let Some(token) = cookies.get(CSRF_COOKIE).filter(|token| !token.is_empty()) {
            return Ok(Some(token.to_string()));
        }
        let body = response.json::<serde_json::Value>().await.ok();
        Ok(body
            .as_ref()
            .and_then(|value| value.get(CSRF_BODY_FIELD))
            .and_then(serde_json::Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string))
    }

    async fn check_account(
        &self,
        login: &mut LoginSession,
        identity: &LoginIdentity,
    ) -> Result<(), AuthError> {
        let body = json!({ "email": identity.email });
        let response = self
            .client
            .request(
                &self.endpoints.check_account,
                Method::POST,
                &login.headers(&self.endpoints.login_page),
                Some(&body),
                self.options,
            )
            .await
            .map_err(|error| AuthError::transport("account check", error))?;
        login.cookies.ingest_headers(response.headers());

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::login_check_failed(format!("HTTP {}", status.as_u16())));
        }
        let reply = read_status(response)
            .await
            .ok_or_else(|| AuthError::login_check_failed("response was not the expected JSON"))?;
        if !reply.success {
            return Err(AuthError::login_check_failed(
                reply.message.unwrap_or_else(|| "server reported failure".to_string()),
            ));
        }
        if reply.next_step.as_deref() != Some(PASSWORD_STEP) {
            return Err(AuthError::login_flow(reply.next_step));
        }
        Ok(())
    }

    async fn password_login(
        &self,
        login: &mut LoginSession,
        identity: &LoginIdentity,
    ) -> Result<(), AuthError> {
        let body = json!({ "email": identity.email, "password": identity.password });
        let response = self
            .client
            .request(
                &self.endpoints.login,
                Method::POST,
                &login.headers(&self.endpoints.login_page),
                Some(&body),
                self.options,
            )
            .await
            .map_err(|error| AuthError::transport("login", error))?;
        login.cookies.ingest_headers(response.headers());

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::login_auth_failed(format!("HTTP {}", status.as_u16())));
        }
        match read_status(response).await {
            Some(reply) if reply.success => Ok(()),
            Some(reply) => Err(AuthError::login_auth_failed(
                reply.message.unwrap_or_else(|| "server reported failure".to_string()),
            )),
            None => Err(AuthError::login_auth_failed("response was not the expected JSON")),
        }
    }
}
