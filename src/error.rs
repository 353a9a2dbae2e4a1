use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ROILensError {
    #[error("Metrics source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ROILensError {
    fn from(error: reqwest::Error) -> Self {
        Self::SourceUnavailable(error.to_string())
    }
}

impl ROILensError {
    /// Status the HTTP boundary should answer with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::SourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) | Self::Json(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, ROILensError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_maps_to_client_error() {
        let err = ROILensError::InvalidInput("timeframeDays must be positive".to_string());
        assert!(err.status_code().is_client_error());
    }

    #[test]
    fn test_source_unavailable_maps_to_server_error() {
        let err = ROILensError::SourceUnavailable("connection refused".to_string());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.status_code().is_server_error());
    }

    #[test]
    fn test_config_maps_to_internal_error() {
        let err = ROILensError::Config("hourlyCost must be finite".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_messages() {
        let err = ROILensError::SourceUnavailable("timeout".to_string());
        assert_eq!(err.to_string(), "Metrics source unavailable: timeout");

        let err = ROILensError::InvalidInput("empty repository id".to_string());
        assert_eq!(err.to_string(), "Invalid input: empty repository id");
    }
}
