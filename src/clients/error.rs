//! Provider API error classification.
//!
//! Every REST facade funnels non-success responses through here so callers
//! can distinguish the classes the engine cares about: rate limiting (which
//! is retried inside C3/C4), not-found (often fine), and everything else
//! (surfaced immediately).

use thiserror::Error;

/// Classified provider API error.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("HTTP {status}: {body}")]
    Unexpected { status: u16, body: String },
}

impl ApiError {
    /// Classify an HTTP status + body pair.
    #[must_use]
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            429 => ApiError::RateLimited(body),
            404 => ApiError::NotFound(body),
            401 | 403 => ApiError::PermissionDenied(body),
            code => ApiError::Unexpected { status: code, body },
        }
    }
}

/// Turn a non-success response into a classified error. The body is read for
/// the message; provider JSON error envelopes are passed through verbatim.
pub async fn classify_response(context: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    anyhow::Error::new(ApiError::from_status(status, body)).context(context.to_string())
}

/// True when the error chain bottoms out in a 429.
#[must_use]
pub fn is_rate_limited(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<ApiError>(), Some(ApiError::RateLimited(_)))
}

/// True when the error chain bottoms out in a 404.
#[must_use]
pub fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<ApiError>(), Some(ApiError::NotFound(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_by_status() {
        let cases = [
            (429, true, false),
            (404, false, true),
            (500, false, false),
            (403, false, false),
        ];
        for (status, rate_limited, not_found) in cases {
            let err = anyhow::Error::new(ApiError::from_status(
                reqwest::StatusCode::from_u16(status).unwrap(),
                "body".to_string(),
            ));
            assert_eq!(is_rate_limited(&err), rate_limited, "status {status}");
            assert_eq!(is_not_found(&err), not_found, "status {status}");
        }
    }

    #[test]
    fn test_classification_survives_context() {
        let err = anyhow::Error::new(ApiError::RateLimited("slow down".to_string()))
            .context("creating key");
        assert!(is_rate_limited(&err));
    }
}
