pub mod duckduckgo;
pub mod tavily;

pub use duckduckgo::DuckDuckGoProvider;
pub use tavily::TavilyProvider;

use ragloop_core::AppError;
use reqwest::StatusCode;

/// Map a failed HTTP status to an error.
///
/// 4xx responses are permanent and map to `Config`, except 408 and 429
/// which stay retryable `Search` errors like any 5xx.
pub(crate) fn status_error(provider: &str, status: StatusCode, body: &str) -> AppError {
    let retryable = status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS;

    if retryable {
        AppError::Search(format!("{} error ({}): {}", provider, status.as_u16(), body))
    } else {
        AppError::Config(format!(
            "{} rejected the request ({}): {}",
            provider,
            status.as_u16(),
            body
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_permanent() {
        let err = status_error("Tavily", StatusCode::UNAUTHORIZED, "invalid api key");
        assert!(matches!(err, AppError::Config(_)));
        assert!(!err.is_transient());
        assert!(err.to_string().contains("401"));

        assert!(!status_error("Tavily", StatusCode::BAD_REQUEST, "").is_transient());
    }

    #[test]
    fn test_server_errors_and_throttling_are_transient() {
        for status in [
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::REQUEST_TIMEOUT,
        ] {
            let err = status_error("DuckDuckGo", status, "");
            assert!(matches!(err, AppError::Search(_)), "{}", status);
            assert!(err.is_transient());
        }
    }
}
