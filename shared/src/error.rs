//! Error types for the furniture detection service.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur anywhere in the detection pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Client-caused problem (disclaimer, image quality, nothing recognised)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upload or model call failed after all attempts
    #[error("{service} failed after {attempts} attempt(s): {message}")]
    ExternalService {
        service: ExternalService,
        attempts: u32,
        message: String,
    },

    /// Knowledge base could not be loaded
    #[error("Knowledge base error: {0}")]
    KnowledgeBase(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// AWS SDK error
    #[error("AWS error: {0}")]
    Aws(String),

    /// Image could not be decoded or encoded
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// External collaborators whose failures surface as [`Error::ExternalService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalService {
    VisionModel,
    ImageStorage,
}

impl std::fmt::Display for ExternalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExternalService::VisionModel => write!(f, "Vision model"),
            ExternalService::ImageStorage => write!(f, "Image storage"),
        }
    }
}

impl Error {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            Error::ExternalService {
                service: ExternalService::VisionModel,
                ..
            } => 502,
            _ => 500,
        }
    }

    /// Whether the caller caused this failure (4xx) rather than the service.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }

    /// Shorthand for a model failure after `attempts` calls.
    pub fn model(attempts: u32, message: impl Into<String>) -> Self {
        Error::ExternalService {
            service: ExternalService::VisionModel,
            attempts,
            message: message.into(),
        }
    }

    /// Shorthand for a failed upload. Uploads are attempted once.
    pub fn storage(message: impl Into<String>) -> Self {
        Error::ExternalService {
            service: ExternalService::ImageStorage,
            attempts: 1,
            message: message.into(),
        }
    }
}
