use tracing::debug;

use super::types::{ChatRequest, ChatResponse};
use crate::error::{AiError, Result};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Transport for the Messages endpoint. One POST per call, no retries.
pub(crate) struct ClaudeClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl ClaudeClient {
    pub fn new(api_key: &str, base_url: Option<&str>) -> Self {
        let base = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{base}/messages"),
            api_key: api_key.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        debug!(model = %request.model, endpoint = %self.endpoint, "Claude messages request");

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AiError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }
}
