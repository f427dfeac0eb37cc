//! Error types for Gallerycast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GallerycastError>;

#[derive(Error, Debug)]
pub enum GallerycastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl GallerycastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            GallerycastError::InvalidInput(_) => 3,
            GallerycastError::Config(_) => 3,
            GallerycastError::Platform(PlatformError::Authentication(_)) => 2,
            GallerycastError::Platform(_) => 1,
            GallerycastError::Feed(_) => 1,
            GallerycastError::Database(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
}

/// Failures talking to the gallery feed. Any of these aborts a poll cycle.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Feed returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Failed to decode feed: {0}")]
    Decode(String),

    #[error("Feed reported failure (success={success}, status={status})")]
    Unsuccessful { success: bool, status: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = GallerycastError::InvalidInput("bad format".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_config_error() {
        let config_error = ConfigError::MissingField("gallery.client_id".to_string());
        let error = GallerycastError::Config(config_error);
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication_error() {
        let platform_error = PlatformError::Authentication("Token rejected".to_string());
        let error = GallerycastError::Platform(platform_error);
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_runtime_errors() {
        let posting = GallerycastError::Platform(PlatformError::Posting("test".to_string()));
        let rate_limit = GallerycastError::Platform(PlatformError::RateLimit("test".to_string()));
        let feed = GallerycastError::Feed(FeedError::HttpStatus(503));
        let db = GallerycastError::Database(DbError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        )));

        assert_eq!(posting.exit_code(), 1);
        assert_eq!(rate_limit.exit_code(), 1);
        assert_eq!(feed.exit_code(), 1);
        assert_eq!(db.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting_posting() {
        let platform_error = PlatformError::Posting("status rejected".to_string());
        let error = GallerycastError::Platform(platform_error);
        assert_eq!(
            error.to_string(),
            "Platform error: Posting failed: status rejected"
        );
    }

    #[test]
    fn test_error_message_formatting_feed() {
        let error: GallerycastError = FeedError::Unsuccessful {
            success: false,
            status: 403,
        }
        .into();
        assert_eq!(
            error.to_string(),
            "Feed error: Feed reported failure (success=false, status=403)"
        );
    }

    #[test]
    fn test_invalid_value_formatting() {
        let error = ConfigError::InvalidValue {
            field: "processing.cooldown".to_string(),
            reason: "expected a duration".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid value for processing.cooldown: expected a duration"
        );
    }

    #[test]
    fn test_error_conversion_from_platform_error() {
        let platform_error = PlatformError::RateLimit("test".to_string());
        let error: GallerycastError = platform_error.into();

        match error {
            GallerycastError::Platform(PlatformError::RateLimit(_)) => {}
            _ => panic!("Expected GallerycastError::Platform"),
        }
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::Network("Connection failed".to_string());
        let cloned = original.clone();

        assert_eq!(original.to_string(), cloned.to_string());
    }
}
