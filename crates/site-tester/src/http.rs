//! Async HTTP client wrapping reqwest.
//!
//! One request per call: no retries and no backoff. A check that fails to
//! fetch simply fails.

use std::time::Duration;

use crate::types::SiteTesterResult;

/// A fully-read HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

/// HTTP client shared by the API and site runners.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a new HTTP client with a desktop Chrome user-agent.
    pub fn new(timeout: Duration) -> Self {
        let ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                  AppleWebKit/537.36 (KHTML, like Gecko) \
                  Chrome/131.0.0.0 Safari/537.36";

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(ua)
            .build()
            .unwrap_or_default();

        Self { client }
    }

    /// GET `url` and read the whole body as text.
    pub async fn get(&self, url: &str) -> SiteTesterResult<HttpResponse> {
        let r = self.client.get(url).send().await?;
        Self::read(url, r).await
    }

    /// POST `data` as a JSON body and read the whole response as text.
    pub async fn post_json(&self, url: &str, data: &serde_json::Value) -> SiteTesterResult<HttpResponse> {
        let r = self.client.post(url).json(data).send().await?;
        Self::read(url, r).await
    }

    async fn read(url: &str, r: reqwest::Response) -> SiteTesterResult<HttpResponse> {
        let status = r.status().as_u16();
        let final_url = r.url().to_string();
        let body = r.text().await?;

        tracing::debug!(url, status, bytes = body.len(), "response read");

        Ok(HttpResponse {
            final_url,
            status,
            body,
        })
    }
}
