use crate::BookId;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure to obtain a book from an upstream provider.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("book {0} not found")]
    NotFound(BookId),
    #[error("fetching book {book_id} timed out after {timeout:?}")]
    Timeout { book_id: BookId, timeout: Duration },
    #[error("fetching book {book_id} failed: {reason}")]
    Failed { book_id: BookId, reason: String },
}

impl FetchError {
    pub fn book_id(&self) -> BookId {
        match self {
            FetchError::NotFound(id) => *id,
            FetchError::Timeout { book_id, .. } | FetchError::Failed { book_id, .. } => *book_id,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound(_))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("corrupt index record: {0}")]
    Codec(#[from] bincode::Error),
    #[error("corrupt index metadata: {0}")]
    Meta(#[from] serde_json::Error),
    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("ingestion worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error("query cancelled")]
    Cancelled,
}
