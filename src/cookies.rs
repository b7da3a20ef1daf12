// Session cookie store.
//
// reqwest's built-in `Jar` cannot enumerate or drop cookies, and the `exit`
// command has to expire every one of them. This store implements
// `CookieStore` itself. Headers are parsed with the `cookie` crate, and
// every cookie is scoped to the host (or `Domain`) and path that set it,
// so the session never leaks to another server the client reaches.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use cookie::Cookie;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const SESSION_COOKIE: &str = "session";

/// (domain, path, name)
type CookieKey = (String, String, String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredCookie {
    name: String,
    value: String,
    domain: String,
    /// Set when the cookie had no `Domain` attribute: only the exact host
    /// that set it gets it back.
    host_only: bool,
    path: String,
    secure: bool,
    /// Unix seconds. `None` lives until the store is cleared.
    expires: Option<i64>,
}

impl StoredCookie {
    fn key(&self) -> CookieKey {
        (self.domain.clone(), self.path.clone(), self.name.clone())
    }

    fn is_expired(&self, now: i64) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }

    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let domain_ok = if self.host_only {
            host == self.domain
        } else {
            domain_matches(&host, &self.domain)
        };
        domain_ok
            && path_matches(url.path(), &self.path)
            && (!self.secure || url.scheme() == "https")
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn domain_matches(host: &str, domain: &str) -> bool {
    if host == domain {
        return true;
    }
    let is_ip = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok();
    !is_ip
        && host
            .strip_suffix(domain)
            .is_some_and(|rest| rest.ends_with('.'))
}

fn path_matches(request: &str, cookie: &str) -> bool {
    request == cookie
        || (request.starts_with(cookie)
            && (cookie.ends_with('/') || request[cookie.len()..].starts_with('/')))
}

/// Directory of the request path, used when a cookie has no `Path`.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

#[derive(Debug, Default)]
pub struct SessionCookies {
    cookies: Mutex<BTreeMap<CookieKey, StoredCookie>>,
}

impl SessionCookies {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<CookieKey, StoredCookie>> {
        // a poisoned map is still a valid map
        self.cookies.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn has_session(&self) -> bool {
        let now = unix_now();
        self.lock()
            .values()
            .any(|c| c.name == SESSION_COOKIE && !c.is_expired(now))
    }

    /// Names of every live cookie, sorted.
    pub fn names(&self) -> Vec<String> {
        let now = unix_now();
        let mut names: Vec<String> = self
            .lock()
            .values()
            .filter(|c| !c.is_expired(now))
            .map(|c| c.name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Expires every cookie and returns the names that were dropped.
    pub fn expire_all(&self) -> Vec<String> {
        let mut expired: Vec<String> = std::mem::take(&mut *self.lock())
            .into_values()
            .map(|c| c.name)
            .collect();
        expired.sort();
        expired.dedup();
        debug!(?expired, "expired session cookies");
        expired
    }

    /// Applies one `Set-Cookie` header received from `url`. An empty value,
    /// a non-positive `Max-Age` or an `Expires` in the past removes the
    /// cookie. `Max-Age` wins over `Expires` when both are present.
    pub fn apply_set_cookie(&self, header: &str, url: &Url) {
        let parsed = match Cookie::parse(header) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "ignoring malformed Set-Cookie header");
                return;
            }
        };
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            return;
        };

        let (domain, host_only) = match parsed.domain() {
            Some(domain) if !domain.is_empty() => {
                let domain = domain.trim_start_matches('.').to_ascii_lowercase();
                if !domain_matches(&host, &domain) {
                    warn!(%domain, %host, "ignoring cookie set for another domain");
                    return;
                }
                (domain, false)
            }
            _ => (host, true),
        };
        let path = match parsed.path() {
            Some(path) if path.starts_with('/') => path.to_string(),
            _ => default_path(url),
        };

        let now = unix_now();
        let expires = match (parsed.max_age(), parsed.expires_datetime()) {
            (Some(age), _) => Some(now.saturating_add(age.whole_seconds())),
            (None, Some(at)) => Some(at.unix_timestamp()),
            (None, None) => None,
        };

        let cookie = StoredCookie {
            name: parsed.name().to_string(),
            value: parsed.value().trim_matches('"').to_string(),
            domain,
            host_only,
            path,
            secure: parsed.secure().unwrap_or(false),
            expires,
        };

        let mut cookies = self.lock();
        if cookie.value.is_empty() || cookie.is_expired(now) {
            if cookies.remove(&cookie.key()).is_some() {
                debug!(name = %cookie.name, "cookie removed by server");
            }
        } else {
            cookies.insert(cookie.key(), cookie);
        }
    }

    /// `Cookie` request header for `url`, or `None` when no live cookie
    /// applies to it.
    pub fn header(&self, url: &Url) -> Option<String> {
        let now = unix_now();
        let pairs: Vec<String> = self
            .lock()
            .values()
            .filter(|c| !c.is_expired(now) && c.matches(url))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    /// Writes the live cookies to `path` as JSON.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let now = unix_now();
        let live: Vec<StoredCookie> = self
            .lock()
            .values()
            .filter(|c| !c.is_expired(now))
            .cloned()
            .collect();
        let json = serde_json::to_string(&live).context("Serializing session cookies")?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Creating {}", dir.display()))?;
        }
        std::fs::write(path, json).with_context(|| format!("Writing {}", path.display()))?;
        Ok(())
    }

    /// Loads cookies persisted by a previous run, skipping any that expired
    /// in the meantime. A missing file is not an error.
    pub fn restore(&self, path: &Path) -> Result<()> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e).with_context(|| format!("Reading {}", path.display())),
        };
        let stored: Vec<StoredCookie> = serde_json::from_str(&data)
            .with_context(|| format!("Parsing session file {}", path.display()))?;

        let now = unix_now();
        let mut cookies = self.lock();
        for cookie in stored.into_iter().filter(|c| !c.is_expired(now)) {
            cookies.insert(cookie.key(), cookie);
        }
        Ok(())
    }
}

impl CookieStore for SessionCookies {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        for header in cookie_headers {
            match header.to_str() {
                Ok(h) => self.apply_set_cookie(h, url),
                Err(_) => warn!("ignoring non-ASCII Set-Cookie header"),
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.header(url).and_then(|h| HeaderValue::from_str(&h).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn front_end() -> Url {
        url("http://127.0.0.1:8087/auth")
    }

    #[test]
    fn set_cookie_headers_are_applied() {
        let jar = SessionCookies::new();
        jar.apply_set_cookie("session=abc; Path=/; Max-Age=3600; HttpOnly", &front_end());
        jar.apply_set_cookie("theme=dark", &front_end());
        assert!(jar.has_session());
        assert_eq!(
            jar.header(&url("http://127.0.0.1:8087/act?action=get%20a"))
                .as_deref(),
            Some("session=abc; theme=dark")
        );
    }

    #[test]
    fn past_expires_removes_the_cookie() {
        let jar = SessionCookies::new();
        jar.apply_set_cookie("session=abc", &front_end());
        jar.apply_set_cookie(
            "session=abc; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
            &front_end(),
        );
        assert!(!jar.has_session());
        assert!(jar.names().is_empty());
    }

    #[test]
    fn future_expires_keeps_the_cookie() {
        let jar = SessionCookies::new();
        jar.apply_set_cookie(
            "session=abc; Expires=Fri, 01 Jan 2100 00:00:00 GMT",
            &front_end(),
        );
        assert!(jar.has_session());
    }

    #[test]
    fn max_age_wins_over_expires() {
        let jar = SessionCookies::new();
        jar.apply_set_cookie(
            "session=abc; Max-Age=0; Expires=Fri, 01 Jan 2100 00:00:00 GMT",
            &front_end(),
        );
        assert!(!jar.has_session());
    }

    #[test]
    fn zero_max_age_or_empty_value_removes() {
        let jar = SessionCookies::new();
        jar.apply_set_cookie("session=abc", &front_end());
        jar.apply_set_cookie("session=abc; Max-Age=0", &front_end());
        assert!(!jar.has_session());

        jar.apply_set_cookie("theme=dark", &front_end());
        jar.apply_set_cookie("theme=; Path=/", &front_end());
        assert!(jar.names().is_empty());
    }

    #[test]
    fn host_only_cookies_stay_on_their_host() {
        let jar = SessionCookies::new();
        jar.apply_set_cookie("session=abc", &front_end());
        assert!(jar.header(&url("http://127.0.0.1:9000/act")).is_some());
        assert!(jar.header(&url("http://evil.example.com/act")).is_none());
        assert!(jar.header(&url("http://127.0.0.2:8087/act")).is_none());
    }

    #[test]
    fn domain_cookies_reach_subdomains_only() {
        let jar = SessionCookies::new();
        let origin = url("http://db.example.com/auth");
        jar.apply_set_cookie("session=abc; Domain=.example.com", &origin);
        jar.apply_set_cookie("theme=dark; Domain=other.org", &origin);

        assert_eq!(jar.names(), vec!["session"]);
        assert!(jar.header(&url("http://api.example.com/")).is_some());
        assert!(jar.header(&url("http://example.com/")).is_some());
        assert!(jar.header(&url("http://notexample.com/")).is_none());
        assert!(jar.header(&url("http://example.org/")).is_none());
    }

    #[test]
    fn path_scoping() {
        let jar = SessionCookies::new();
        jar.apply_set_cookie("docs=1; Path=/doc", &front_end());
        assert!(jar.header(&url("http://127.0.0.1:8087/doc")).is_some());
        assert!(jar.header(&url("http://127.0.0.1:8087/doc/acl.html")).is_some());
        assert!(jar.header(&url("http://127.0.0.1:8087/docs")).is_none());
        assert!(jar.header(&url("http://127.0.0.1:8087/act")).is_none());
    }

    #[test]
    fn missing_path_defaults_to_request_directory() {
        assert_eq!(default_path(&url("http://h/auth")), "/");
        assert_eq!(default_path(&url("http://h/doc/acl.html")), "/doc");
    }

    #[test]
    fn secure_cookies_need_https() {
        let jar = SessionCookies::new();
        jar.apply_set_cookie("session=abc; Secure", &url("https://db.example.com/auth"));
        assert!(jar.header(&url("https://db.example.com/act")).is_some());
        assert!(jar.header(&url("http://db.example.com/act")).is_none());
    }

    #[test]
    fn expire_all_leaves_nothing() {
        let jar = SessionCookies::new();
        jar.apply_set_cookie("session=abc", &front_end());
        jar.apply_set_cookie("theme=dark", &front_end());
        assert_eq!(jar.expire_all(), vec!["session", "theme"]);
        assert!(jar.names().is_empty());
        assert!(jar.header(&front_end()).is_none());
    }

    #[test]
    fn malformed_headers_are_ignored() {
        let jar = SessionCookies::new();
        jar.apply_set_cookie("garbage", &front_end());
        jar.apply_set_cookie("=value", &front_end());
        assert!(jar.names().is_empty());
    }

    #[test]
    fn persist_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let jar = SessionCookies::new();
        jar.apply_set_cookie("session=abc; Max-Age=3600", &front_end());
        jar.persist(&path).unwrap();

        let restored = SessionCookies::new();
        restored.restore(&path).unwrap();
        assert!(restored.has_session());
        assert_eq!(
            restored.header(&front_end()).as_deref(),
            Some("session=abc")
        );
        assert!(restored.header(&url("http://elsewhere.net/")).is_none());
    }

    #[test]
    fn restore_skips_expired_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let stale = StoredCookie {
            name: SESSION_COOKIE.into(),
            value: "abc".into(),
            domain: "127.0.0.1".into(),
            host_only: true,
            path: "/".into(),
            secure: false,
            expires: Some(1),
        };
        std::fs::write(&path, serde_json::to_string(&vec![stale]).unwrap()).unwrap();

        let jar = SessionCookies::new();
        jar.restore(&path).unwrap();
        assert!(!jar.has_session());
    }

    #[test]
    fn restore_without_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let jar = SessionCookies::new();
        jar.restore(&dir.path().join("missing")).unwrap();
        assert!(!jar.has_session());
    }
}
