//! Shared HTTP client with adaptive per-domain rate limiting.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::{Client, Proxy, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::rate_limiter::RateLimiter;

const USER_AGENT: &str = concat!("ytinsights/", env!("CARGO_PKG_VERSION"));

/// Real browser user agents for impersonate mode.
const IMPERSONATE_USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Chrome on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Firefox on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Safari on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
];

fn random_user_agent() -> &'static str {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as usize)
        .unwrap_or(0);
    IMPERSONATE_USER_AGENTS[nanos % IMPERSONATE_USER_AGENTS.len()]
}

/// Resolve user agent from config value.
/// - None => default ytinsights user agent
/// - "impersonate" => random real browser user agent
/// - other => custom user agent string
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config {
        None => USER_AGENT.to_string(),
        Some("impersonate") => random_user_agent().to_string(),
        Some(custom) => custom.to_string(),
    }
}

/// HTTP client that paces requests per domain.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    request_delay: Duration,
    rate_limiter: RateLimiter,
}

impl HttpClient {
    /// Create a client with the default user agent and no proxy.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::builder(timeout).build()
    }

    pub fn builder(timeout: Duration) -> HttpClientBuilder {
        HttpClientBuilder {
            timeout,
            user_agent: None,
            proxy: None,
            request_delay: Duration::ZERO,
            rate_limiter: None,
        }
    }

    /// Get the rate limiter for this client.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// GET with query parameters.
    pub async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<HttpResponse, reqwest::Error> {
        let request = self.client.get(url).query(query);
        self.send(url, request).await
    }

    /// POST a JSON body with extra headers.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &B,
    ) -> Result<HttpResponse, reqwest::Error> {
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        self.send(url, request).await
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<HttpResponse, reqwest::Error> {
        let domain = self.rate_limiter.acquire(url).await;

        let start = Instant::now();
        let response = request.send().await?;
        let status = response.status();
        debug!(
            "{} {} in {}ms",
            status.as_u16(),
            url,
            start.elapsed().as_millis()
        );

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.to_string(), v.to_string());
            }
        }

        if let Some(ref domain) = domain {
            self.rate_limiter.report_status(domain, status.as_u16()).await;
        }

        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        Ok(HttpResponse {
            status,
            headers,
            response,
        })
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    user_agent: Option<String>,
    proxy: Option<String>,
    request_delay: Duration,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClientBuilder {
    /// `None`, `"impersonate"` or a custom string; see [`resolve_user_agent`].
    pub fn user_agent(mut self, user_agent: Option<&str>) -> Self {
        self.user_agent = user_agent.map(str::to_string);
        self
    }

    /// Route every request through this proxy (http, https or socks5 URL).
    pub fn proxy(mut self, proxy: Option<&str>) -> Self {
        self.proxy = proxy.filter(|p| !p.trim().is_empty()).map(str::to_string);
        self
    }

    /// Fixed pause after every request, on top of the adaptive delay.
    pub fn request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Share a rate limiter with other clients.
    pub fn rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    pub fn build(self) -> Result<HttpClient, reqwest::Error> {
        let user_agent = resolve_user_agent(self.user_agent.as_deref());
        let mut builder = Client::builder()
            .user_agent(user_agent)
            .timeout(self.timeout)
            .cookie_store(true)
            .gzip(true)
            .brotli(true);
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(Proxy::all(proxy)?);
        }

        Ok(HttpClient {
            client: builder.build()?,
            request_delay: self.request_delay,
            rate_limiter: self.rate_limiter.unwrap_or_default(),
        })
    }
}

/// HTTP response wrapper.
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    response: Response,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub async fn text(self) -> Result<String, reqwest::Error> {
        self.response.text().await
    }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T, reqwest::Error> {
        self.response.json().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_user_agent_default() {
        let ua = resolve_user_agent(None);
        assert!(ua.starts_with("ytinsights/"));
    }

    #[test]
    fn test_resolve_user_agent_impersonate() {
        let ua = resolve_user_agent(Some("impersonate"));
        assert!(ua.contains("Mozilla"));
        assert!(!ua.contains("ytinsights"));
    }

    #[test]
    fn test_resolve_user_agent_custom() {
        let ua = resolve_user_agent(Some("MyBot/1.0"));
        assert_eq!(ua, "MyBot/1.0");
    }

    #[tokio::test]
    async fn test_get_reports_to_rate_limiter() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ping")
            .match_query(mockito::Matcher::UrlEncoded("q".into(), "1".into()))
            .with_status(200)
            .with_header("content-type", "text/plain")
            .with_body("pong")
            .create_async()
            .await;

        let client = HttpClient::new(Duration::from_secs(5)).unwrap();
        let response = client
            .get(&format!("{}/ping", server.url()), &[("q", "1")])
            .await
            .unwrap();
        assert!(response.is_success());
        assert_eq!(
            response.headers.get("content-type").map(String::as_str),
            Some("text/plain")
        );
        assert_eq!(response.text().await.unwrap(), "pong");
        mock.assert_async().await;

        let stats = client.rate_limiter().get_stats().await;
        assert_eq!(stats.values().map(|s| s.total_requests).sum::<u64>(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_response_backs_off() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/busy")
            .with_status(429)
            .with_header("retry-after", "7")
            .create_async()
            .await;

        let client = HttpClient::new(Duration::from_secs(5)).unwrap();
        let response = client
            .post_json(
                &format!("{}/busy", server.url()),
                &[("X-Test", "1")],
                &serde_json::json!({"hello": "world"}),
            )
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers.get("retry-after").map(String::as_str), Some("7"));

        let stats = client.rate_limiter().get_stats().await;
        assert!(stats.values().all(|s| s.in_backoff));
    }
}
