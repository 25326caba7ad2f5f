use serde::Serialize;
use serde_json::Value;

use crate::{Document, EntityId, Result};

/// A single write inside a [`WriteBatch`].
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Create a document. Fails with a conflict if the id or a unique key is taken.
    Insert {
        collection: &'static str,
        id: EntityId,
        doc: Value,
        unique_keys: &'static [&'static [&'static str]],
    },

    /// Overwrite an existing document. Fails if it does not exist.
    Replace {
        collection: &'static str,
        id: EntityId,
        doc: Value,
        unique_keys: &'static [&'static [&'static str]],
    },

    /// Overwrite one top-level field of an existing document.
    Set {
        collection: &'static str,
        id: EntityId,
        field: String,
        value: Value,
        unique_keys: &'static [&'static [&'static str]],
    },

    /// Remove an existing document. Fails if it does not exist.
    Delete {
        collection: &'static str,
        id: EntityId,
    },

    /// Add `by` to an integer field. With a `floor`, the batch fails if the
    /// result would be below it.
    Increment {
        collection: &'static str,
        id: EntityId,
        field: &'static str,
        by: i64,
        floor: Option<i64>,
    },

    /// Assert that a field of an existing document still holds `value`.
    /// Fails the batch with a guard error otherwise.
    Expect {
        collection: &'static str,
        id: EntityId,
        field: &'static str,
        value: Value,
    },
}

impl WriteOp {
    /// Collection touched by this operation.
    pub fn collection(&self) -> &'static str {
        match self {
            WriteOp::Insert { collection, .. }
            | WriteOp::Replace { collection, .. }
            | WriteOp::Set { collection, .. }
            | WriteOp::Delete { collection, .. }
            | WriteOp::Increment { collection, .. }
            | WriteOp::Expect { collection, .. } => collection,
        }
    }
}

/// An ordered set of writes applied atomically by a
/// [`DocumentStore`](crate::DocumentStore).
///
/// # Example
///
/// ```ignore
/// let batch = WriteBatch::new()
///     .insert(&order)?
///     .increment::<Product>(product_id, "quantity", -2, Some(0))
///     .delete::<Cart>(cart_id);
/// store.commit(batch).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an insert.
    pub fn insert<D: Document>(mut self, doc: &D) -> Result<Self> {
        self.ops.push(WriteOp::Insert {
            collection: D::COLLECTION,
            id: doc.id(),
            doc: serde_json::to_value(doc)?,
            unique_keys: D::UNIQUE_KEYS,
        });
        Ok(self)
    }

    /// Queues a full replacement of an existing document.
    pub fn replace<D: Document>(mut self, doc: &D) -> Result<Self> {
        self.ops.push(WriteOp::Replace {
            collection: D::COLLECTION,
            id: doc.id(),
            doc: serde_json::to_value(doc)?,
            unique_keys: D::UNIQUE_KEYS,
        });
        Ok(self)
    }

    /// Queues a single field overwrite.
    pub fn set<D: Document>(
        mut self,
        id: EntityId,
        field: impl Into<String>,
        value: impl Serialize,
    ) -> Result<Self> {
        self.ops.push(WriteOp::Set {
            collection: D::COLLECTION,
            id,
            field: field.into(),
            value: serde_json::to_value(value)?,
            unique_keys: D::UNIQUE_KEYS,
        });
        Ok(self)
    }

    /// Queues a field overwrite for every top-level field that differs
    /// between `before` and `after`. Fields untouched by the caller are
    /// left alone, so concurrent increments on them are not lost.
    pub fn patch<D: Document>(mut self, before: &D, after: &D) -> Result<Self> {
        let (Value::Object(old), Value::Object(new)) =
            (serde_json::to_value(before)?, serde_json::to_value(after)?)
        else {
            return self.replace(after);
        };

        for (field, value) in new {
            if old.get(&field) != Some(&value) {
                self.ops.push(WriteOp::Set {
                    collection: D::COLLECTION,
                    id: after.id(),
                    field,
                    value,
                    unique_keys: D::UNIQUE_KEYS,
                });
            }
        }
        Ok(self)
    }

    /// Queues a delete.
    pub fn delete<D: Document>(mut self, id: EntityId) -> Self {
        self.ops.push(WriteOp::Delete {
            collection: D::COLLECTION,
            id,
        });
        self
    }

    /// Queues an integer increment, optionally guarded by a floor.
    pub fn increment<D: Document>(
        mut self,
        id: EntityId,
        field: &'static str,
        by: i64,
        floor: Option<i64>,
    ) -> Self {
        self.ops.push(WriteOp::Increment {
            collection: D::COLLECTION,
            id,
            field,
            by,
            floor,
        });
        self
    }

    /// Queues a compare guard: the batch only commits if `field` still
    /// equals `value` when it is applied.
    pub fn expect<D: Document>(
        mut self,
        id: EntityId,
        field: &'static str,
        value: impl Serialize,
    ) -> Result<Self> {
        self.ops.push(WriteOp::Expect {
            collection: D::COLLECTION,
            id,
            field,
            value: serde_json::to_value(value)?,
        });
        Ok(self)
    }

    /// Returns the queued operations.
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Consumes the batch, returning its operations in order.
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    /// Returns the number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
