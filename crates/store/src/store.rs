use std::marker::PhantomData;

use async_trait::async_trait;
use serde_json::Value;

use crate::{Document, DocumentQuery, EntityId, Result, StoreError, WriteBatch};

/// Core trait for document store implementations.
///
/// A document store keeps JSON documents in named collections. Reads are
/// untyped; use [`Repository`] for typed access. All implementations must
/// be thread-safe (Send + Sync).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetches a document by id.
    async fn get(&self, collection: &str, id: EntityId) -> Result<Option<Value>>;

    /// Returns documents matching a query, honoring sort, limit and offset.
    async fn find(&self, collection: &str, query: &DocumentQuery) -> Result<Vec<Value>>;

    /// Counts documents matching a query. Limit and offset are ignored.
    async fn count(&self, collection: &str, query: &DocumentQuery) -> Result<u64>;

    /// Applies a batch of writes atomically.
    ///
    /// Either every operation succeeds or the store is left unchanged. A
    /// guarded increment that would cross its floor fails the whole batch
    /// with [`StoreError::GuardFailed`].
    async fn commit(&self, batch: WriteBatch) -> Result<()>;
}

/// Extension trait providing convenience methods for document stores.
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    /// Returns true if any document in the collection matches.
    async fn exists(&self, collection: &str, query: &DocumentQuery) -> Result<bool> {
        Ok(self.count(collection, query).await? > 0)
    }
}

impl<T: DocumentStore + ?Sized> DocumentStoreExt for T {}

/// Typed access to one collection of a [`DocumentStore`].
pub struct Repository<D, S> {
    store: S,
    _marker: PhantomData<fn() -> D>,
}

impl<D, S: Clone> Clone for Repository<D, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _marker: PhantomData,
        }
    }
}

impl<D: Document, S: DocumentStore> Repository<D, S> {
    /// Wraps a store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn get(&self, id: EntityId) -> Result<Option<D>> {
        self.store
            .get(D::COLLECTION, id)
            .await?
            .map(serde_json::from_value)
            .transpose()
            .map_err(StoreError::from)
    }

    /// Like [`get`](Self::get) but a missing document is an error.
    pub async fn require(&self, id: EntityId) -> Result<D> {
        self.get(id).await?.ok_or_else(|| StoreError::NotFound {
            collection: D::COLLECTION.to_string(),
            id,
        })
    }

    pub async fn find(&self, query: &DocumentQuery) -> Result<Vec<D>> {
        self.store
            .find(D::COLLECTION, query)
            .await?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
            .collect()
    }

    pub async fn find_one(&self, query: &DocumentQuery) -> Result<Option<D>> {
        let query = query.clone().limit(1);
        Ok(self.find(&query).await?.into_iter().next())
    }

    pub async fn count(&self, query: &DocumentQuery) -> Result<u64> {
        self.store.count(D::COLLECTION, query).await
    }

    pub async fn exists(&self, query: &DocumentQuery) -> Result<bool> {
        self.store.exists(D::COLLECTION, query).await
    }

    pub async fn insert(&self, doc: &D) -> Result<()> {
        self.store.commit(WriteBatch::new().insert(doc)?).await
    }

    pub async fn replace(&self, doc: &D) -> Result<()> {
        self.store.commit(WriteBatch::new().replace(doc)?).await
    }

    pub async fn delete(&self, id: EntityId) -> Result<()> {
        self.store.commit(WriteBatch::new().delete::<D>(id)).await
    }
}
