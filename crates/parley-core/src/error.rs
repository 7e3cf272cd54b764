//! Error types for Parley

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("LLM authentication failed: {0}")]
    Auth(String),

    #[error("LLM rate limited: {0}")]
    RateLimited(String),

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("LLM backend unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),
}

impl Error {
    /// Whether this is an upstream LLM failure (unreachable, auth, rate limit, timeout)
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Http(_)
                | Self::Auth(_)
                | Self::RateLimited(_)
                | Self::Timeout(_)
                | Self::Unavailable(_)
        )
    }

    /// Map an HTTP status from an LLM server to the typed failure
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = format!("{}: {}", status, truncate_body(body));
        match status.as_u16() {
            401 | 403 => Self::Auth(detail),
            429 => Self::RateLimited(detail),
            408 | 504 => Self::Unavailable(format!("gateway timeout ({})", detail)),
            s if s >= 500 => Self::Unavailable(detail),
            _ => Self::InvalidData(format!("LLM API error {}", detail)),
        }
    }

    /// Map a transport error, separating client-side timeouts
    pub fn from_transport(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout_secs)
        } else if err.is_connect() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() > 200 {
        let mut end = 200;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            Error::from_status(StatusCode::UNAUTHORIZED, ""),
            Error::Auth(_)
        ));
        assert!(matches!(
            Error::from_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            Error::RateLimited(_)
        ));
        assert!(matches!(
            Error::from_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            Error::Unavailable(_)
        ));
        assert!(matches!(
            Error::from_status(StatusCode::BAD_REQUEST, "bad"),
            Error::InvalidData(_)
        ));
    }

    #[test]
    fn test_is_upstream() {
        assert!(Error::Timeout(30).is_upstream());
        assert!(Error::RateLimited("x".into()).is_upstream());
        assert!(!Error::MalformedResponse("x".into()).is_upstream());
        assert!(!Error::NotFound("x".into()).is_upstream());
    }

    #[test]
    fn test_truncate_body_multibyte() {
        let body = "é".repeat(300);
        let truncated = truncate_body(&body);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= 204);
    }
}
