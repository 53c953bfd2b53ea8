#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unknown subscription state {0:?}")]
    UnknownSubscriptionState(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
