use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ReconConfig;
use super::tokens::TokenJar;
use crate::errors::{ScanError, StatusBearing};

/// Reading stops once a body reaches this many bytes.
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// A fully read response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub elapsed: Duration,
    /// Declared length when the server sent one, otherwise the bytes read.
    pub content_length: usize,
}

impl StatusBearing for HttpResponse {
    fn status_code(&self) -> Option<u16> {
        Some(self.status)
    }
}

/// Shared client for one scan. Every request holds a permit from one semaphore,
/// and both the wait and the request race the scan's cancellation token.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    gate: Arc<Semaphore>,
    cancel: CancellationToken,
    max_body_size: usize,
    tokens: Option<Arc<TokenJar>>,
}

impl HttpClient {
    pub fn new(client: Client, max_concurrent: usize, cancel: CancellationToken) -> Self {
        Self {
            client,
            gate: Arc::new(Semaphore::new(max_concurrent.max(1))),
            cancel,
            max_body_size: MAX_BODY_SIZE,
            tokens: None,
        }
    }

    pub fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    /// Scan every response's headers and body for JSON Web Tokens.
    pub fn with_token_jar(mut self, jar: Arc<TokenJar>) -> Self {
        self.tokens = Some(jar);
        self
    }

    pub fn from_config(config: &ReconConfig, cancel: CancellationToken) -> Result<Self, ScanError> {
        let scan = &config.scan;
        let redirect = if scan.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };

        let mut builder = Client::builder()
            .timeout(scan.request_timeout())
            .redirect(redirect)
            .danger_accept_invalid_certs(!scan.verify_tls)
            .user_agent(scan.user_agent.clone())
            .cookie_store(true);

        if let Some(proxy) = &config.proxy.url {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| ScanError::Config(format!("Invalid proxy '{}': {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ScanError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::new(client, scan.max_concurrent_requests, cancel))
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse, ScanError> {
        self.send(self.client.get(url), true).await
    }

    pub async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpResponse, ScanError> {
        self.send(self.client.post(url).json(body), true).await
    }

    /// HEAD request with its own timeout; the body is not read.
    pub async fn head_status(&self, url: &str, timeout: Duration) -> Result<u16, ScanError> {
        let response = self.send(self.client.head(url).timeout(timeout), false).await?;
        Ok(response.status)
    }

    /// Close the request gate. Waiting and future requests fail with `Cancelled`.
    pub fn shutdown(&self) {
        self.gate.close();
    }

    async fn send(&self, request: RequestBuilder, read_body: bool) -> Result<HttpResponse, ScanError> {
        let _permit = tokio::select! {
            permit = self.gate.acquire() => permit.map_err(|_| ScanError::Cancelled)?,
            _ = self.cancel.cancelled() => return Err(ScanError::Cancelled),
        };

        let started = Instant::now();
        let limit = self.max_body_size;
        let jar = self.tokens.as_deref();
        let exchange = async {
            let mut response = request.send().await?;
            let status = response.status().as_u16();
            let declared = response.content_length();
            let source = response.url().to_string();
            if let Some(jar) = jar {
                for value in response.headers().values() {
                    if let Ok(text) = value.to_str() {
                        jar.observe(&source, text);
                    }
                }
            }
            let mut bytes = Vec::new();
            if read_body {
                while let Some(chunk) = response.chunk().await? {
                    let take = chunk.len().min(limit - bytes.len());
                    bytes.extend_from_slice(&chunk[..take]);
                    if bytes.len() >= limit {
                        break;
                    }
                }
            }
            Ok::<_, ScanError>((status, declared, bytes, source))
        };
        let (status, declared, bytes, source) = tokio::select! {
            result = exchange => result?,
            _ = self.cancel.cancelled() => return Err(ScanError::Cancelled),
        };
        let elapsed = started.elapsed();

        let content_length = declared.map_or(bytes.len(), |n| (n as usize).max(bytes.len()));
        let body = String::from_utf8_lossy(&bytes).into_owned();
        if let Some(jar) = jar {
            jar.observe(&source, &body);
        }
        debug!(status, bytes = content_length, elapsed_ms = elapsed.as_millis() as u64, "HTTP response");

        Ok(HttpResponse { status, body, elapsed, content_length })
    }
}
