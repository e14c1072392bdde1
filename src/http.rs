//! Shared HTTP plumbing for the collaborator clients.
//!
//! Maps `reqwest` failures and non-success responses onto
//! [`CollaboratorError`] so every client reports failures the same way.

use std::time::Duration;

use anyhow::{Context, Result};
use belly_buzz_core::CollaboratorError;
use reqwest::{Response, StatusCode};

pub const USER_AGENT: &str = concat!("belly-buzz/", env!("CARGO_PKG_VERSION"));

/// Longest response body excerpt kept in an error message.
const ERROR_BODY_MAX: usize = 300;

pub fn client(timeout_secs: u64, user_agent: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(user_agent)
        .build()
        .context("Failed to build HTTP client")
}

pub fn transport_error(err: reqwest::Error, timeout_secs: u64) -> CollaboratorError {
    if err.is_timeout() {
        CollaboratorError::Timeout(timeout_secs)
    } else if err.is_decode() {
        CollaboratorError::Parse(err.to_string())
    } else {
        CollaboratorError::Network(err.to_string())
    }
}

/// Turn a non-success response into an `Api` error, keeping a body excerpt.
pub async fn api_error(response: Response) -> CollaboratorError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = match body.char_indices().nth(ERROR_BODY_MAX) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body,
    };
    CollaboratorError::Api { status, message }
}

/// Rate limits and server errors are worth another attempt.
pub fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Exponential backoff: 1s, 2s, 4s, … capped at 32s.
pub fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_backoff_caps() {
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(3), Duration::from_secs(4));
        assert_eq!(backoff(20), Duration::from_secs(32));
    }
}
