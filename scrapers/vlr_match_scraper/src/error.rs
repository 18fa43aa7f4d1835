use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("{url} answered HTTP {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },
}

impl FetchError {
    /// Timeouts, connection failures, 429 and 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Network { .. } => true,
            FetchError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no parser layer recognised the page layout")]
    StructureChanged,
    #[error("page contained no match rows")]
    Empty,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// The only failures a caller ever sees.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UserError {
    #[error("invalid request: {0}")]
    InvalidFilter(String),
    #[error("no results found, try again later")]
    NoResults,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let url = "https://www.vlr.gg/matches".to_string();
        assert!(FetchError::Timeout { url: url.clone() }.is_retryable());
        assert!(FetchError::HttpStatus { url: url.clone(), status: 429 }.is_retryable());
        assert!(FetchError::HttpStatus { url: url.clone(), status: 503 }.is_retryable());
        assert!(!FetchError::HttpStatus { url: url.clone(), status: 404 }.is_retryable());
        assert!(!FetchError::HttpStatus { url, status: 403 }.is_retryable());
    }
}
