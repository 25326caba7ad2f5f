use thiserror::Error;

use crate::EntityId;

/// Errors that can occur when interacting with the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The document does not exist.
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: EntityId },

    /// An insert or replace clashed with an existing id or unique key.
    #[error("Conflict in {collection}: {detail}")]
    Conflict { collection: String, detail: String },

    /// A guarded increment would have taken a field below its floor, or a
    /// compare guard saw a different value. The whole batch was rolled back.
    #[error("Guard failed for {collection}/{id} on {field}")]
    GuardFailed {
        collection: String,
        id: EntityId,
        field: String,
    },

    /// A stored document does not have the shape an operation expects.
    #[error("Invalid document {collection}/{id}: {reason}")]
    InvalidDocument {
        collection: String,
        id: EntityId,
        reason: String,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for document store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
