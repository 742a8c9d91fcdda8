use thiserror::Error;

/// SigCap Desktop application errors
#[derive(Debug, Error)]
pub enum SigCapError {
    /// Configuration file errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication errors (missing/expired token, failed login)
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Backend API errors (non-success responses)
    #[error("API error: {0}")]
    Api(String),

    /// Upload/pipeline errors
    #[error("Upload error: {0}")]
    Upload(String),

    /// Validation errors (missing fields, bad paths)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Screen capture errors
    #[error("Capture error: {0}")]
    Capture(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Mutex poison error
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Convert SigCapError to String for presentation layers that can only
/// surface plain messages
impl From<SigCapError> for String {
    fn from(err: SigCapError) -> String {
        err.to_string()
    }
}

impl From<Box<dyn std::error::Error>> for SigCapError {
    fn from(err: Box<dyn std::error::Error>) -> Self {
        SigCapError::Other(err.to_string())
    }
}

/// Helper trait for adding context to errors
#[allow(dead_code)]
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> Result<T, SigCapError>;
}

impl<T, E: Into<SigCapError>> ErrorContext<T> for Result<T, E> {
    fn context(self, msg: &str) -> Result<T, SigCapError> {
        self.map_err(|e| {
            let err: SigCapError = e.into();
            match err {
                SigCapError::Config(s) => SigCapError::Config(format!("{}: {}", msg, s)),
                SigCapError::Auth(s) => SigCapError::Auth(format!("{}: {}", msg, s)),
                SigCapError::Api(s) => SigCapError::Api(format!("{}: {}", msg, s)),
                SigCapError::Upload(s) => SigCapError::Upload(format!("{}: {}", msg, s)),
                SigCapError::Validation(s) => {
                    SigCapError::Validation(format!("{}: {}", msg, s))
                }
                SigCapError::Capture(s) => SigCapError::Capture(format!("{}: {}", msg, s)),
                SigCapError::Io(e) => SigCapError::Io(e),
                SigCapError::Json(e) => SigCapError::Json(e),
                SigCapError::Http(e) => SigCapError::Http(e),
                SigCapError::LockPoisoned(s) => {
                    SigCapError::LockPoisoned(format!("{}: {}", msg, s))
                }
                SigCapError::Other(s) => SigCapError::Other(format!("{}: {}", msg, s)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SigCapError::Validation("Missing signal id".to_string());
        assert_eq!(err.to_string(), "Validation error: Missing signal id");
    }

    #[test]
    fn test_error_conversion_to_string() {
        let err = SigCapError::Auth("No access token".to_string());
        let s: String = err.into();
        assert_eq!(s, "Authentication error: No access token");
    }

    #[test]
    fn test_error_context() {
        let result: Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));
        let result = result.context("Failed to read screenshot");

        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("I/O error"));
    }
}
