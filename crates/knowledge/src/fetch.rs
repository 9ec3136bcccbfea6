//! Web page fetching for URL sources.

use crate::parser::{self, ParsedDocument};
use ragloop_core::{AppError, AppResult};
use std::time::Duration;

const FETCH_TIMEOUT_SECS: u64 = 30;

/// Pages larger than this are truncated before parsing.
const MAX_PAGE_BYTES: usize = 2_000_000;

/// HTTP client shared by all URL sources of one learn run.
pub fn http_client() -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .user_agent(concat!("ragloop/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::Knowledge(format!("Failed to build HTTP client: {}", e)))
}

/// Fetch `url` and extract its text.
pub async fn fetch_page(client: &reqwest::Client, url: &str) -> AppResult<ParsedDocument> {
    tracing::debug!("Fetching {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::Knowledge(format!("Failed to fetch {}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Knowledge(format!(
            "Failed to fetch {}: HTTP {}",
            url, status
        )));
    }

    let mut body = response
        .text()
        .await
        .map_err(|e| AppError::Knowledge(format!("Failed to read {}: {}", url, e)))?;

    if body.len() > MAX_PAGE_BYTES {
        let mut end = MAX_PAGE_BYTES;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        tracing::debug!("Truncated {} to {} bytes", url, end);
    }

    Ok(parser::parse_html(&body))
}
