use thiserror::Error;

/// Main error type for GraphReader
#[derive(Error, Debug)]
pub enum GraphReaderError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding API errors
    #[error("Embedding API error: {0}")]
    Embedding(String),

    /// Decision oracle failed or returned something outside the stage schema
    #[error("Decision oracle error: {0}")]
    Oracle(String),

    /// Oracle action string could not be turned into a stage action
    #[error("Malformed action: {0}")]
    MalformedAction(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using GraphReaderError
pub type Result<T> = std::result::Result<T, GraphReaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphReaderError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: GraphReaderError = rusqlite_err.into();
        assert!(matches!(err, GraphReaderError::Database(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: GraphReaderError = io_err.into();
        assert!(matches!(err, GraphReaderError::Io(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: GraphReaderError = json_err.into();
        assert!(matches!(err, GraphReaderError::Serialization(_)));
    }

    #[test]
    fn test_malformed_action_display() {
        let err = GraphReaderError::MalformedAction("read chunk please".to_string());
        assert_eq!(err.to_string(), "Malformed action: read chunk please");
    }
}
