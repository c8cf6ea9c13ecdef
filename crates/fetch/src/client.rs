//! reqwest-backed [`HttpGet`] with origin-scoped basic auth and retries.

use std::fmt;
use std::time::Duration;

use tracing::debug;
use url::{Origin, Url};

use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::{FetchError, HttpGet, HttpResponse};

const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Credentials that are only ever sent to one origin.
#[derive(Clone)]
pub struct TrustedOrigin {
    origin: Origin,
    user: String,
    password: String,
}

impl fmt::Debug for TrustedOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustedOrigin")
            .field("origin", &self.origin.ascii_serialization())
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl TrustedOrigin {
    pub fn new(origin: &str, user: &str, password: &str) -> Result<Self, FetchError> {
        let url = Url::parse(origin).map_err(|_| FetchError::InvalidUrl(origin.to_string()))?;
        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }
        Ok(Self { origin, user: user.to_string(), password: password.to_string() })
    }

    /// Scheme, host and port must all match.
    pub fn covers(&self, url: &Url) -> bool {
        url.origin() == self.origin
    }
}

enum Attempt {
    Status(HttpResponse),
    Transport(reqwest::Error),
}

impl Attempt {
    /// Gateway statuses and network-level failures; request-building and decode errors are final.
    fn is_retryable(&self) -> bool {
        match self {
            Attempt::Status(_) => true,
            Attempt::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
        }
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attempt::Status(r) => write!(f, "status {}", r.status),
            Attempt::Transport(e) => write!(f, "{}", e),
        }
    }
}

pub struct ReqwestClient {
    http: reqwest::Client,
    auth: Option<TrustedOrigin>,
    retry: RetryPolicy,
}

impl ReqwestClient {
    pub fn new(auth: Option<TrustedOrigin>, retry: RetryPolicy, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { http, auth, retry })
    }

    async fn attempt(&self, url: &Url) -> Result<HttpResponse, Attempt> {
        let mut req = self.http.get(url.clone());
        if let Some(auth) = self.auth.as_ref().filter(|a| a.covers(url)) {
            req = req.basic_auth(&auth.user, Some(&auth.password));
        }
        let resp = req.send().await.map_err(Attempt::Transport)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(Attempt::Transport)?;
        let out = HttpResponse { status, body };
        if RETRY_STATUSES.contains(&status) {
            return Err(Attempt::Status(out));
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl HttpGet for ReqwestClient {
    async fn get(&self, url: &Url) -> Result<HttpResponse, FetchError> {
        debug!(url = %url, authed = self.auth.as_ref().is_some_and(|a| a.covers(url)), "http: GET");
        match retry_with_backoff(&self.retry, "config_fetch", || self.attempt(url), Attempt::is_retryable).await {
            Ok(resp) => Ok(resp),
            Err(Attempt::Status(resp)) => Ok(resp),
            Err(Attempt::Transport(e)) => Err(FetchError::Transport(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trusted() -> TrustedOrigin {
        TrustedOrigin::new("https://artifactory.example.com", "user", "pwd").unwrap()
    }

    #[test]
    fn same_origin_is_covered() {
        let t = trusted();
        assert!(t.covers(&Url::parse("https://artifactory.example.com/repo/config.yml").unwrap()));
        assert!(t.covers(&Url::parse("https://artifactory.example.com:443/x").unwrap()));
    }

    #[test]
    fn other_origins_are_not_covered() {
        let t = trusted();
        for u in [
            "http://artifactory.example.com/repo/config.yml",
            "https://foo.example.com/config.yml",
            "https://artifactory.example.com.other.com/config.yml",
            "https://artifactory.example.com:8443/config.yml",
        ] {
            assert!(!t.covers(&Url::parse(u).unwrap()), "{}", u);
        }
    }

    #[test]
    fn opaque_origin_is_rejected() {
        assert!(TrustedOrigin::new("not a url", "u", "p").is_err());
        assert!(TrustedOrigin::new("data:text/plain,hi", "u", "p").is_err());
    }

    #[test]
    fn debug_hides_password() {
        let s = format!("{:?}", trusted());
        assert!(!s.contains("pwd"));
    }

    #[test]
    fn gateway_statuses_are_retryable() {
        let resp = HttpResponse { status: 503, body: bytes::Bytes::new() };
        assert!(Attempt::Status(resp).is_retryable());
    }

    #[test]
    fn builder_errors_are_final() {
        let err = reqwest::Client::new().get("http://[::1").build().unwrap_err();
        assert!(err.is_builder());
        assert!(!Attempt::Transport(err).is_retryable());
    }
}
