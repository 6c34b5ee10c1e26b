use thiserror::Error;

use daisy_core::error::CheckError;
use daisy_core::types::{EntityKind, EntityRef};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("redb database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("redb transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Check(CheckError),

    #[error("entity not found: {0}")]
    NotFound(EntityRef),

    #[error("entity type '{0}' has no custodians")]
    MembershipUnsupported(EntityKind),

    #[error("invalid key component: {0:?}")]
    InvalidKey(String),

    #[error("corrupt row in table '{table}': {detail}")]
    Corrupt { table: &'static str, detail: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Check(CheckError::NotFound(_))
        )
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Check(e) if e.is_configuration())
    }
}

/// Store failures surfacing through the checker come back unwrapped.
impl From<CheckError> for StoreError {
    fn from(err: CheckError) -> Self {
        match err {
            CheckError::Source(source) => match source.downcast::<StoreError>() {
                Ok(store) => *store,
                Err(other) => StoreError::Check(CheckError::Source(other)),
            },
            other => StoreError::Check(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
