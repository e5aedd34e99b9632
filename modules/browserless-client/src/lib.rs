pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Navigation milestone Browserless waits for before reading the DOM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[serde(rename = "networkidle0")]
    NetworkIdle0,
    #[default]
    #[serde(rename = "networkidle2")]
    NetworkIdle2,
}

/// Request for the `/scrape` endpoint. Each selector is evaluated independently,
/// so callers can pass a primary selector followed by broader fallbacks.
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub url: String,
    pub selectors: Vec<String>,
    pub wait_until: WaitUntil,
    pub timeout: Duration,
}

impl ScrapeRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            selectors: Vec::new(),
            wait_until: WaitUntil::default(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.selectors.push(selector.into());
        self
    }

    pub fn wait_until(mut self, wait_until: WaitUntil) -> Self {
        self.wait_until = wait_until;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn body(&self) -> serde_json::Value {
        let elements: Vec<serde_json::Value> = self
            .selectors
            .iter()
            .map(|s| serde_json::json!({ "selector": s }))
            .collect();

        serde_json::json!({
            "url": self.url,
            "elements": elements,
            "bestAttempt": true,
            "gotoOptions": {
                "waitUntil": self.wait_until,
                "timeout": self.timeout.as_millis() as u64,
            },
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeResponse {
    #[serde(default)]
    pub data: Vec<SelectorMatches>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectorMatches {
    pub selector: String,
    #[serde(default)]
    pub results: Vec<ElementResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElementResult {
    #[serde(default)]
    pub text: String,
}

impl ScrapeResponse {
    /// Concatenated text of every element matched by `selector`, if any match has text.
    pub fn text_for(&self, selector: &str) -> Option<String> {
        let matches = self.data.iter().find(|m| m.selector == selector)?;
        let text = matches
            .results
            .iter()
            .map(|r| r.text.as_str())
            .filter(|t| !t.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BrowserlessError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }

    /// The `/scrape` POST, with the token (if any) as an encoded query param.
    fn build_scrape(&self, request: &ScrapeRequest) -> Result<reqwest::Request> {
        let mut builder = self
            .client
            .post(format!("{}/scrape", self.base_url))
            .timeout(request.timeout + Duration::from_secs(5))
            .json(&request.body());
        if let Some(ref token) = self.token {
            builder = builder.query(&[("token", token)]);
        }
        Ok(builder.build()?)
    }

    /// Render `request.url` and return the text of each requested selector.
    ///
    /// The HTTP call gets a few seconds of headroom over the navigation timeout
    /// so Browserless can report its own timeout before ours fires.
    pub async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeResponse> {
        debug!(url = %request.url, selectors = ?request.selectors, "Browserless scrape");

        let resp = self.client.execute(self.build_scrape(request)?).await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::REQUEST_TIMEOUT
                || status == reqwest::StatusCode::GATEWAY_TIMEOUT
            {
                return Err(BrowserlessError::Timeout(message));
            }
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_lists_selectors_in_order() {
        let req = ScrapeRequest::new("https://example.com")
            .selector("#booking")
            .selector("body")
            .wait_until(WaitUntil::Load)
            .timeout(Duration::from_secs(20));

        let body = req.body();
        assert_eq!(body["url"], "https://example.com");
        assert_eq!(body["elements"][0]["selector"], "#booking");
        assert_eq!(body["elements"][1]["selector"], "body");
        assert_eq!(body["gotoOptions"]["waitUntil"], "load");
        assert_eq!(body["gotoOptions"]["timeout"], 20_000);
    }

    #[test]
    fn default_wait_is_network_idle() {
        let body = ScrapeRequest::new("https://example.com").body();
        assert_eq!(body["gotoOptions"]["waitUntil"], "networkidle2");
    }

    #[test]
    fn text_for_joins_non_empty_results() {
        let resp: ScrapeResponse = serde_json::from_value(serde_json::json!({
            "data": [
                { "selector": "#slots", "results": [] },
                { "selector": "body", "results": [
                    { "text": "Tables", "html": "<p>Tables</p>" },
                    { "text": "  " },
                    { "text": "7pm" }
                ]}
            ]
        }))
        .unwrap();

        assert_eq!(resp.text_for("#slots"), None);
        assert_eq!(resp.text_for("body").as_deref(), Some("Tables\n7pm"));
        assert_eq!(resp.text_for("main"), None);
    }

    #[test]
    fn trailing_slash_trimmed_from_base_url() {
        let client = BrowserlessClient::new("http://localhost:3000/", None).unwrap();
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn token_is_query_encoded() {
        let client = BrowserlessClient::new("http://localhost:3000", Some("a b&c=d")).unwrap();
        let req = client
            .build_scrape(&ScrapeRequest::new("https://example.com"))
            .unwrap();

        assert_eq!(req.url().path(), "/scrape");
        let pairs: Vec<_> = req.url().query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("token".to_string(), "a b&c=d".to_string())]);
    }

    #[test]
    fn no_token_no_query() {
        let client = BrowserlessClient::new("http://localhost:3000", None).unwrap();
        let req = client
            .build_scrape(&ScrapeRequest::new("https://example.com"))
            .unwrap();
        assert_eq!(req.url().query(), None);
    }
}
