//! Web search API searcher.

use std::time::Duration;

use async_trait::async_trait;
use deepqa_core::Searcher;
use deepqa_shared::{DeepQaError, Passage, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

/// Engine name stamped on web passages.
pub const ENGINE: &str = "web";

/// Header carrying the API key.
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// User-Agent string for search requests.
const USER_AGENT: &str = concat!("deepqa/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "webPages", default)]
    web_pages: Option<WebPages>,
}

#[derive(Debug, Deserialize)]
struct WebPages {
    #[serde(default)]
    value: Vec<WebPage>,
}

#[derive(Debug, Deserialize)]
struct WebPage {
    name: String,
    #[serde(default)]
    snippet: String,
    url: String,
}

/// Queries a web search API: `GET {endpoint}?q=<text>&count=<n>`.
pub struct WebSearcher {
    client: Client,
    endpoint: Url,
    api_key: String,
    max_results: u32,
}

impl WebSearcher {
    pub fn new(endpoint: &str, api_key: String, max_results: u32, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| DeepQaError::config(format!("invalid web search endpoint {endpoint}: {e}")))?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| DeepQaError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            max_results,
        })
    }

    fn request_url(&self, text: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("q", text)
            .append_pair("count", &self.max_results.to_string());
        url
    }
}

#[async_trait]
impl Searcher for WebSearcher {
    fn name(&self) -> &str {
        ENGINE
    }

    #[instrument(skip_all, fields(engine = ENGINE))]
    async fn query(&self, text: &str) -> Result<Vec<Passage>> {
        let response = self
            .client
            .get(self.request_url(text))
            .header(KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| DeepQaError::backend(ENGINE, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeepQaError::backend(ENGINE, format!("HTTP {status}")));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| DeepQaError::backend(ENGINE, format!("unreadable response: {e}")))?;

        let pages = body.web_pages.map(|w| w.value).unwrap_or_default();
        debug!(count = pages.len(), "web results");
        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(i, page)| {
                Passage::new(ENGINE, page.name, page.snippet, page.url).with_rank(i as u32 + 1)
            })
            .collect())
    }
}
