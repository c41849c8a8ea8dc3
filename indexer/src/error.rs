//! Error types for the indexer

use rpc_core::RpcError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    /// Local state contradicts the node or itself. Never retried silently.
    #[error("Sync invariant violated: {0}")]
    SyncInvariant(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, IndexerError>;

impl IndexerError {
    /// Lost or unusable storage connection; the driver reconnects on these.
    pub fn is_storage_connectivity(&self) -> bool {
        matches!(
            self,
            IndexerError::Database(
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            )
        )
    }

    pub fn is_node_transport(&self) -> bool {
        matches!(self, IndexerError::Rpc(e) if e.is_transport())
    }

    pub fn is_sync_invariant(&self) -> bool {
        matches!(self, IndexerError::SyncInvariant(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = IndexerError::from(sqlx::Error::PoolClosed);
        assert!(err.is_storage_connectivity());
        assert!(!err.is_node_transport());

        let err = IndexerError::from(RpcError::Transport("connection refused".into()));
        assert!(err.is_node_transport());
        assert!(!err.is_storage_connectivity());

        let err = IndexerError::from(RpcError::Rpc { code: -708, message: "not found".into() });
        assert!(!err.is_node_transport());

        let err = IndexerError::SyncInvariant("database is ahead of node".into());
        assert!(err.is_sync_invariant());
        assert!(err.to_string().contains("ahead of node"));
    }
}
