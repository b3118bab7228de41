//! Error types for record storage

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid record metadata: {0}")]
    InvalidMetadata(String),

    #[error("Storage full: cannot store record")]
    StorageFull,
}

impl StorageError {
    /// True for a missing file, which callers treat as a miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let missing = StorageError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(missing.is_not_found());
        assert!(!StorageError::StorageFull.is_not_found());
        assert_eq!(
            StorageError::InvalidMetadata("bad json".into()).to_string(),
            "Invalid record metadata: bad json"
        );
    }
}
