//! HTTP client for a running retrieval service.

use reqwest::Client;
use std::time::Duration;

use crate::error::{RagError, Result};
use crate::models::QueryResponse;

const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Clone)]
pub struct RagClient {
    client: Client,
    endpoint: String,
}

impl RagClient {
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| RagError::UpstreamQuery(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `GET {endpoint}/api/query?query_text=<question>`.
    ///
    /// Network failures, non-2xx statuses and unparseable bodies are all
    /// [`RagError::UpstreamQuery`].
    pub async fn query(&self, question: &str) -> Result<QueryResponse> {
        let response = self
            .client
            .get(format!("{}/api/query", self.endpoint))
            .query(&[("query_text", question)])
            .send()
            .await
            .map_err(|e| RagError::UpstreamQuery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::UpstreamQuery(format!("HTTP {}: {}", status, body)));
        }

        response
            .json::<QueryResponse>()
            .await
            .map_err(|e| RagError::UpstreamQuery(e.to_string()))
    }
}
