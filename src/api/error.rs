use thiserror::Error;

/// Errors returned by the separation backend HTTP client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Server error (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Error message reported by the backend in a successful response body.
    #[error("{0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Message suitable for a status code error, preferring the backend's
    /// `{"error": "..."}` body over the raw text.
    pub(crate) fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or_else(|| body.trim().to_string());
        ApiError::Status { status, message }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Connection(_) | ApiError::Timeout)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::InvalidResponse(e.to_string())
        } else {
            ApiError::Connection(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_prefers_backend_message() {
        let err = ApiError::from_status(404, r#"{"error": "Job not found"}"#);
        assert_eq!(err.to_string(), "Server error (status 404): Job not found");
    }

    #[test]
    fn test_status_error_falls_back_to_body() {
        let err = ApiError::from_status(404, "File not found\n");
        match err {
            ApiError::Status { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "File not found");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_transport_classification() {
        assert!(ApiError::Timeout.is_transport());
        assert!(ApiError::Connection("refused".into()).is_transport());
        assert!(!ApiError::Backend("boom".into()).is_transport());
    }
}
