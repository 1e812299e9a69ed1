//! HTTP access for cascade sources and the news sampler.
//!
//! [`HttpFetch`] is the seam: [`ReqwestHttp`] talks to the network with a
//! browser-like identity, [`FixtureHttp`] replays canned replies offline.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, USER_AGENT};
use std::sync::Mutex;
use std::time::Duration;

use super::types::FetchError;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct HttpRequest<'a> {
    pub url: &'a str,
    pub timeout: Option<Duration>,
    pub user_agent: Option<&'a str>,
}

impl<'a> HttpRequest<'a> {
    pub fn get(url: &'a str) -> Self {
        Self {
            url,
            timeout: None,
            user_agent: None,
        }
    }
}

#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// GET `req.url`; any transport error, timeout or non-2xx status is an error.
    async fn get_text(&self, req: &HttpRequest<'_>) -> Result<String, FetchError>;
}

fn default_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,text/csv,application/json;q=0.8,*/*;q=0.7",
        ),
    );
    h.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-IN,en;q=0.9"));
    h.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    h
}

pub struct ReqwestHttp {
    client: reqwest::Client,
    user_agent: String,
    timeout: Duration,
}

impl ReqwestHttp {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .default_headers(default_headers())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            user_agent: user_agent.into(),
            timeout,
        }
    }
}

impl Default for ReqwestHttp {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENT, DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl HttpFetch for ReqwestHttp {
    async fn get_text(&self, req: &HttpRequest<'_>) -> Result<String, FetchError> {
        let url = req.url.to_string();
        let resp = self
            .client
            .get(req.url)
            .timeout(req.timeout.unwrap_or(self.timeout))
            .header(USER_AGENT, req.user_agent.unwrap_or(self.user_agent.as_str()))
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }
        resp.text().await.map_err(|e| transport_error(&url, e))
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Body(String),
    Status(u16),
    Timeout,
}

#[derive(Debug, Clone)]
struct Route {
    pattern: String,
    reply: Reply,
    delay: Duration,
}

/// Offline stand-in: the first route whose pattern is a substring of the URL answers.
/// Unmatched URLs fail as network errors. Every requested URL is recorded.
#[derive(Debug, Default)]
pub struct FixtureHttp {
    routes: Vec<Route>,
    calls: Mutex<Vec<String>>,
}

impl FixtureHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, pattern: impl Into<String>, body: impl Into<String>) -> Self {
        self.push(pattern.into(), Reply::Body(body.into()), Duration::ZERO);
        self
    }

    pub fn with_status(mut self, pattern: impl Into<String>, status: u16) -> Self {
        self.push(pattern.into(), Reply::Status(status), Duration::ZERO);
        self
    }

    pub fn with_timeout(mut self, pattern: impl Into<String>) -> Self {
        self.push(pattern.into(), Reply::Timeout, Duration::ZERO);
        self
    }

    /// Like `with_body`, answering only after `delay`.
    pub fn with_delayed_body(
        mut self,
        pattern: impl Into<String>,
        body: impl Into<String>,
        delay: Duration,
    ) -> Self {
        self.push(pattern.into(), Reply::Body(body.into()), delay);
        self
    }

    fn push(&mut self, pattern: String, reply: Reply, delay: Duration) {
        self.routes.push(Route {
            pattern,
            reply,
            delay,
        });
    }

    /// URLs requested so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        match self.calls.lock() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    /// Number of recorded calls whose URL contains `pattern`.
    pub fn call_count(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|u| u.contains(pattern)).count()
    }
}

#[async_trait]
impl HttpFetch for FixtureHttp {
    async fn get_text(&self, req: &HttpRequest<'_>) -> Result<String, FetchError> {
        match self.calls.lock() {
            Ok(mut g) => g.push(req.url.to_string()),
            Err(poison) => poison.into_inner().push(req.url.to_string()),
        }

        let url = req.url.to_string();
        let Some(route) = self.routes.iter().find(|r| req.url.contains(&r.pattern)) else {
            return Err(FetchError::Network {
                url,
                message: "connection refused".into(),
            });
        };
        if !route.delay.is_zero() {
            tokio::time::sleep(route.delay).await;
        }
        match &route.reply {
            Reply::Body(b) => Ok(b.clone()),
            Reply::Status(s) => Err(FetchError::Status { url, status: *s }),
            Reply::Timeout => Err(FetchError::Timeout { url }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixture_routes_by_substring_and_records_calls() {
        let http = FixtureHttp::new()
            .with_body("good", "hello")
            .with_status("bad", 503)
            .with_timeout("slow");

        assert_eq!(http.get_text(&HttpRequest::get("https://good.example/a")).await.unwrap(), "hello");
        assert!(matches!(
            http.get_text(&HttpRequest::get("https://bad.example")).await,
            Err(FetchError::Status { status: 503, .. })
        ));
        assert!(matches!(
            http.get_text(&HttpRequest::get("https://slow.example")).await,
            Err(FetchError::Timeout { .. })
        ));
        assert!(matches!(
            http.get_text(&HttpRequest::get("https://nowhere.example")).await,
            Err(FetchError::Network { .. })
        ));
        assert_eq!(http.calls().len(), 4);
        assert_eq!(http.call_count("good"), 1);
    }
}
