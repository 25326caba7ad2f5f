//! Document persistence for the storefront backend.
//!
//! Entities are stored as JSON documents grouped into collections. All
//! writes go through a [`WriteBatch`], which a [`DocumentStore`] applies
//! atomically: either every operation in the batch becomes visible or none
//! does. Two stores are provided:
//! - [`InMemoryDocumentStore`] for tests and local development
//! - [`PostgresDocumentStore`] backed by a JSONB table

pub mod batch;
pub mod document;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use batch::{WriteBatch, WriteOp};
pub use common::EntityId;
pub use document::Document;
pub use error::{Result, StoreError};
pub use memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;
pub use query::{DocumentQuery, Filter, SortKey};
pub use store::{DocumentStore, DocumentStoreExt, Repository};
