use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    /// A record exists but is missing or mangling a required field.
    #[error("corrupt record at {key}: {detail}")]
    Corrupt { key: String, detail: String },

    /// The accept script returned a code outside the contract.
    #[error("accept script returned unknown code {0}")]
    UnknownAcceptCode(i64),
}

impl StoreError {
    pub fn corrupt(key: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.into(),
            detail: detail.into(),
        }
    }
}
