use async_trait::async_trait;
use browserless_client::{BrowserlessClient, BrowserlessError, ScrapeRequest, WaitUntil};
use tracing::warn;

use pagewatch_common::WaitStrategy;

use crate::traits::{FetchError, FetchRequest, PageFetcher};

/// Selector used when the configured one matches nothing.
const FALLBACK_SELECTOR: &str = "body";

/// Renders pages through a Browserless instance.
pub struct BrowserlessFetcher {
    client: BrowserlessClient,
}

impl BrowserlessFetcher {
    pub fn new(client: BrowserlessClient) -> Self {
        Self { client }
    }

    pub(crate) fn scrape_request(request: &FetchRequest) -> ScrapeRequest {
        let mut scrape = ScrapeRequest::new(&request.url)
            .selector(&request.selector)
            .wait_until(wait_until(request.wait))
            .timeout(request.timeout);
        if request.selector != FALLBACK_SELECTOR {
            scrape = scrape.selector(FALLBACK_SELECTOR);
        }
        scrape
    }
}

fn wait_until(wait: WaitStrategy) -> WaitUntil {
    match wait {
        WaitStrategy::Load => WaitUntil::Load,
        WaitStrategy::DomContentLoaded => WaitUntil::DomContentLoaded,
        WaitStrategy::NetworkIdle0 => WaitUntil::NetworkIdle0,
        WaitStrategy::NetworkIdle2 => WaitUntil::NetworkIdle2,
    }
}

fn fetch_error(url: &str, e: BrowserlessError) -> FetchError {
    match e {
        BrowserlessError::Timeout(msg) => FetchError::Timeout(format!("{url}: {msg}")),
        other => FetchError::NavigationFailed(format!("{url}: {other}")),
    }
}

#[async_trait]
impl PageFetcher for BrowserlessFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<String, FetchError> {
        let response = self
            .client
            .scrape(&Self::scrape_request(request))
            .await
            .map_err(|e| fetch_error(&request.url, e))?;

        if let Some(text) = response.text_for(&request.selector) {
            return Ok(text);
        }

        match response.text_for(FALLBACK_SELECTOR) {
            Some(text) => {
                warn!(url = %request.url, selector = %request.selector, "Selector matched nothing, using page body");
                Ok(text)
            }
            None => Err(FetchError::SelectorMissing(request.selector.clone())),
        }
    }
}
