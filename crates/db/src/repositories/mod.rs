mod event_log;

use thiserror::Error;

pub use event_log::SqlEventLogRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("stored row could not be decoded: {0}")]
    Decode(String),
}
