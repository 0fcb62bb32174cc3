//! Process platform implementations
//!
//! Implements core platform traits using native Rust libraries:
//! - HttpClient: reqwest, with a per-request timeout
//! - Clock: std::time::SystemTime
//! - Environment: std::env

use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dispatch_proxy_core::error::{ApiError, Result};
use dispatch_proxy_core::platform::{Clock, Environment, HttpClient, HttpResponse};

/// reqwest-based HTTP client
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn send(&self, builder: reqwest::RequestBuilder, headers: &[(&str, &str)]) -> Result<HttpResponse> {
        let mut builder = builder;
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::upstream_error("request timed out")
            } else {
                ApiError::upstream_error(format!("request failed: {}", e.without_url()))
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::upstream_error(format!("failed to read response: {}", e.without_url())))?
            .to_vec();

        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse> {
        self.send(self.client.get(url), headers).await
    }

    async fn post(&self, url: &str, headers: &[(&str, &str)], body: &[u8]) -> Result<HttpResponse> {
        let builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(body.to_vec());
        self.send(builder, headers).await
    }
}

/// System clock using std::time
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs()
    }
}

/// Process environment
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn get_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}
