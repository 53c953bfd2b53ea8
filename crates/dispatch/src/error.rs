#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("store: {0}")]
    Store(#[from] txmon_store::StoreError),

    #[error("signing key: {0}")]
    Key(#[from] secp256k1::Error),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
