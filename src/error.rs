//! Error and status taxonomy for the storage core.

use thiserror::Error;

/// All fallible outcomes produced by the storage core.
///
/// `OK` is represented by `Result::Ok` rather than a variant here; this enum
/// only carries the three failure families the core can produce.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corruption: {0}")]
    Corruption(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    pub fn corruption(msg: impl Into<String>) -> Self {
        StorageError::Corruption(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        StorageError::NotFound(msg.into())
    }

    /// Classifies this error into the status family a caller would branch on.
    pub fn status(&self) -> StorageStatus {
        match self {
            StorageError::Io(_) => StorageStatus::IoError,
            StorageError::NotFound(_) => StorageStatus::NotFound,
            StorageError::Corruption(_) => StorageStatus::Corruption,
        }
    }
}

/// Mirrors the reference `Status` taxonomy: OK, NotFound, Corruption, IoError.
///
/// Unlike `StorageError` this carries no message; it exists for callers that
/// want to classify an outcome without matching on the full error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStatus {
    Ok,
    NotFound,
    Corruption,
    IoError,
}

impl StorageStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, StorageStatus::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(StorageError::corruption("bad").status(), StorageStatus::Corruption);
        assert_eq!(StorageError::not_found("missing").status(), StorageStatus::NotFound);
        let io = StorageError::Io(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(io.status(), StorageStatus::IoError);
    }
}
