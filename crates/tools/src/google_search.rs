//! Web search tool backed by the Google Custom Search JSON API.
//!
//! Needs an API key and a search engine ID (`GOOGLE_API_KEY` and
//! `GOOGLE_CSE_ID`, or the `[tools]` config section). Missing credentials
//! and HTTP failures are reported to the model as `ERROR` observations.

use async_trait::async_trait;
use ponder_core::error::ToolError;
use ponder_core::tool::{Tool, ToolResult, string_argument};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

pub struct GoogleSearchTool {
    api_key: Option<String>,
    cse_id: Option<String>,
    num_results: usize,
    endpoint: String,
    client: reqwest::Client,
}

impl GoogleSearchTool {
    pub fn new(api_key: Option<String>, cse_id: Option<String>, num_results: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            api_key,
            cse_id,
            // The API caps `num` at 10
            num_results: num_results.clamp(1, 10),
            endpoint: DEFAULT_ENDPOINT.into(),
            client,
        }
    }

    /// Point the tool at a different Custom Search endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn search(&self, api_key: &str, cse_id: &str, query: &str) -> Result<SearchResponse, String> {
        let num = self.num_results.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("key", api_key), ("cx", cse_id), ("q", query), ("num", num.as_str())])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status.as_u16(), body.trim()));
        }

        response.json::<SearchResponse>().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Tool for GoogleSearchTool {
    fn name(&self) -> &str {
        "google_search"
    }

    fn description(&self) -> &str {
        "Searches the web using Google and returns result titles, URLs and snippets. \
         Input: the search query as plain text."
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = string_argument(&arguments, "query")
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let Some(cse_id) = self.cse_id.as_deref() else {
            return Ok(ToolResult::failed(
                "ERROR: The 'GOOGLE_CSE_ID' environment variable is not set. This tool cannot function.",
            ));
        };
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(ToolResult::failed(
                "ERROR: The 'GOOGLE_API_KEY' environment variable is not set. This tool cannot function.",
            ));
        };

        debug!(query = %query, "Running Google search");

        match self.search(api_key, cse_id, &query).await {
            Ok(response) if response.items.is_empty() => Ok(ToolResult::ok(format!(
                "No results found for query: '{query}'"
            ))),
            Ok(response) => Ok(ToolResult {
                success: true,
                output: format!("Search results for '{query}':\n{}", format_results(&response.items)),
                data: Some(serde_json::json!({ "count": response.items.len() })),
            }),
            Err(e) => {
                warn!(query = %query, error = %e, "Google search failed");
                Ok(ToolResult::failed(format!(
                    "ERROR running search for '{query}': {e}"
                )))
            }
        }
    }
}

fn format_results(items: &[SearchItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            format!(
                "{}. {}\n   {}\n   {}",
                i + 1,
                item.title,
                item.link,
                item.snippet.replace('\n', " ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}
