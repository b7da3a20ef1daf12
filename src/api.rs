// API client module: a small blocking HTTP client for the itisadb web
// front-end. Every console request goes through one of its fixed
// resources and gets back `{"text": ...}`.
//
// Calls are blocking; the console runs each one on a task thread (see
// `task.rs`) so the input line stays responsive.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::blocking::{Client, Response};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ConsoleConfig;
use crate::cookies::SessionCookies;
use crate::router::RemoteCall;

/// Characters left alone by `encodeURIComponent`; everything else is
/// percent-encoded, so a space becomes `%20` rather than `+`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Encodes a command line for the `action` query parameter.
pub fn encode_action(line: &str) -> String {
    utf8_percent_encode(line, COMPONENT).to_string()
}

/// Inverse of [`encode_action`].
pub fn decode_action(encoded: &str) -> Cow<'_, str> {
    percent_decode_str(encoded).decode_utf8_lossy()
}

/// Body shape of every console resource.
#[derive(Serialize, Deserialize, Debug)]
pub struct TextResponse {
    pub text: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("server answered {status}: {text}")]
    Status { status: u16, text: String },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("session expired, restart the console to log in again")]
    Unauthenticated,
    #[error("request cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RemoteError::Timeout
        } else {
            RemoteError::Transport(e.to_string())
        }
    }
}

/// Anything that can answer a [`RemoteCall`]. The console only sees this
/// trait, so tests can swap the HTTP client for a recording fake.
pub trait Backend: Send + Sync + 'static {
    fn fetch(&self, call: &RemoteCall) -> Result<String, RemoteError>;
}

/// Interprets a console resource response. Error statuses still carry a
/// `text` body when the service produced one.
pub fn parse_text_body(status: u16, body: &str) -> Result<String, RemoteError> {
    let ok = (200..300).contains(&status);
    match serde_json::from_str::<TextResponse>(body) {
        Ok(resp) if ok => Ok(resp.text),
        Ok(resp) => Err(RemoteError::Status {
            status,
            text: resp.text,
        }),
        Err(e) if ok => Err(RemoteError::Decode(e.to_string())),
        Err(_) => Err(RemoteError::Status {
            status,
            text: body.trim().chars().take(200).collect(),
        }),
    }
}

/// Blocking client for the web front-end. Cookies live in a shared
/// [`SessionCookies`] store so the console can expire them on `exit`.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    cookies: Arc<SessionCookies>,
}

impl ApiClient {
    pub fn new(base_url: Url, timeout: Duration, cookies: Arc<SessionCookies>) -> Result<Self> {
        let client = Client::builder()
            .cookie_provider(cookies.clone())
            .timeout(timeout)
            .user_agent(concat!("itisadb-console/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ApiClient {
            client,
            base_url,
            cookies,
        })
    }

    pub fn from_config(config: &ConsoleConfig) -> Result<Self> {
        Self::new(
            config.base_url.clone(),
            config.request_timeout,
            Arc::new(SessionCookies::new()),
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn cookies(&self) -> &Arc<SessionCookies> {
        &self.cookies
    }

    /// Absolute URL for a front-end path such as `/doc/` or `/exit`.
    pub fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid path {path:?}"))
    }

    /// Full request URL for a remote call.
    pub fn call_url(&self, call: &RemoteCall) -> Result<Url> {
        let mut url = self.url(call.resource.path())?;
        if let Some(action) = &call.action {
            url.set_query(Some(&format!("action={}", encode_action(action))));
        }
        Ok(url)
    }

    fn read_text(resp: Response) -> Result<String, RemoteError> {
        // the front-end redirects unauthenticated requests to its login page
        if resp.url().path() == "/auth" {
            return Err(RemoteError::Unauthenticated);
        }
        let status = resp.status().as_u16();
        let body = resp.text()?;
        parse_text_body(status, &body)
    }

    /// Log in through the front-end's form. The service answers with a
    /// `session` cookie and a redirect to `/`.
    pub fn login(&self, username: &str, password: &str) -> Result<()> {
        let url = self.url("/auth")?;
        let res = self
            .client
            .post(url)
            .form(&[("username", username), ("password", password)])
            .send()
            .context("Failed to send auth request")?;
        if !self.cookies.has_session() {
            let status = res.status();
            let txt = res.text().unwrap_or_else(|_| "".into());
            anyhow::bail!("Login failed: {} - {}", status, txt.trim());
        }
        info!(user = username, "logged in");
        Ok(())
    }
}

impl Backend for ApiClient {
    fn fetch(&self, call: &RemoteCall) -> Result<String, RemoteError> {
        let url = self
            .call_url(call)
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        debug!(%url, "remote call");
        let result = self
            .client
            .get(url)
            .send()
            .map_err(RemoteError::from)
            .and_then(Self::read_text);
        if let Err(e) = &result {
            warn!(resource = ?call.resource, error = %e, "remote call failed");
        }
        result
    }
}
