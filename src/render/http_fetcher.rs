use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::static_engine::PageFetcher;
use super::user_agent::UserAgentRotator;
use crate::config::HttpConfig;
use crate::error::{HarvestError, HarvestResult};

/// Page fetcher over plain HTTP with retries and user agent rotation
pub struct HttpFetcher {
    client: Client,
    config: HttpConfig,
    user_agents: UserAgentRotator,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> HarvestResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Accept",
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert("Accept-Language", HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert("DNT", HeaderValue::from_static("1"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| HarvestError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
            user_agents: UserAgentRotator::new(&config.user_agents),
        })
    }

    async fn fetch_once(&self, url: &Url) -> HarvestResult<String> {
        let response = self
            .client
            .get(url.as_str())
            .header("User-Agent", self.user_agents.random())
            .send()
            .await
            .map_err(|e| HarvestError::page_load(url.as_str(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::http_status(url.as_str(), status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| HarvestError::page_load(url.as_str(), e.to_string()))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> HarvestResult<String> {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!("HTTP GET attempt {} for: {}", attempt, url);

            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if !e.is_recoverable() => {
                    warn!("HTTP request failed for {}, not retrying: {}", url, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("HTTP request failed for {} (attempt {}): {}", url, attempt, e);
                    last_error = Some(e);

                    if attempt < attempts {
                        let delay =
                            Duration::from_millis(self.config.retry_delay_ms * attempt as u64);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| HarvestError::page_load(url.as_str(), "all retry attempts failed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Local server answering every request with `status`; returns its URL
    /// and the number of requests served so far
    async fn serve_status(status: &'static str) -> (Url, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));

        let counter = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (Url::parse(&format!("http://{}/dp/1", addr)).unwrap(), requests)
    }

    fn fast_retry_config() -> HttpConfig {
        HttpConfig {
            max_retries: 3,
            retry_delay_ms: 10,
            ..HttpConfig::default()
        }
    }

    #[test]
    fn test_builds_with_default_config() {
        let fetcher = HttpFetcher::new(&HttpConfig::default()).unwrap();
        assert!(fetcher.user_agents.count() > 0);
        assert_eq!(fetcher.config.max_retries, 3);
    }

    #[test]
    fn test_empty_agent_list_falls_back() {
        let config = HttpConfig {
            user_agents: Vec::new(),
            ..HttpConfig::default()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();
        assert!(!fetcher.user_agents.random().is_empty());
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (url, requests) = serve_status("404 Not Found").await;
        let fetcher = HttpFetcher::new(&fast_retry_config()).unwrap();

        let result = fetcher.fetch(&url).await;

        assert!(matches!(result, Err(HarvestError::HttpStatus { status: 404, .. })));
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_retried_up_to_the_limit() {
        let (url, requests) = serve_status("503 Service Unavailable").await;
        let fetcher = HttpFetcher::new(&fast_retry_config()).unwrap();

        let result = fetcher.fetch(&url).await;

        assert!(matches!(result, Err(HarvestError::HttpStatus { status: 503, .. })));
        assert_eq!(requests.load(Ordering::SeqCst), 3);
    }
}
