use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::document::{segments, value_at_mut, values_at};
use crate::query::{compare_values, ratio_of};
use crate::{
    DocumentQuery, EntityId, Result, SortKey, StoreError, WriteBatch, WriteOp,
    store::DocumentStore,
};

#[derive(Debug, Clone)]
struct Stored {
    seq: u64,
    doc: Value,
}

type Collection = HashMap<EntityId, Stored>;

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, Collection>,
    next_seq: u64,
}

/// In-memory document store implementation for testing and local runs.
///
/// A batch is applied to scratch copies of the collections it touches and
/// swapped in only if every operation succeeds, all under one write lock.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryDocumentStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of documents in a collection.
    pub async fn len(&self, collection: &str) -> usize {
        self.state
            .read()
            .await
            .collections
            .get(collection)
            .map_or(0, HashMap::len)
    }

    /// Removes every document.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.collections.clear();
        state.next_seq = 0;
    }
}

fn unique_tuple<'a>(doc: &'a Value, key: &[&str]) -> Option<Vec<&'a Value>> {
    key.iter()
        .map(|path| {
            values_at(doc, &segments(path))
                .into_iter()
                .next()
                .filter(|v| !v.is_null())
        })
        .collect()
}

fn check_unique(
    collection: &'static str,
    docs: &Collection,
    id: EntityId,
    doc: &Value,
    unique_keys: &[&[&str]],
) -> Result<()> {
    for key in unique_keys {
        let Some(tuple) = unique_tuple(doc, key) else {
            continue;
        };
        let clash = docs
            .iter()
            .filter(|(other, _)| **other != id)
            .any(|(_, stored)| unique_tuple(&stored.doc, key).as_ref() == Some(&tuple));
        if clash {
            return Err(StoreError::Conflict {
                collection: collection.to_string(),
                detail: format!("duplicate value for ({})", key.join(", ")),
            });
        }
    }
    Ok(())
}

fn apply(
    scratch: &mut HashMap<&'static str, Collection>,
    op: WriteOp,
    next_seq: &mut u64,
) -> Result<()> {
    let docs = scratch.entry(op.collection()).or_default();

    match op {
        WriteOp::Insert {
            collection,
            id,
            doc,
            unique_keys,
        } => {
            if docs.contains_key(&id) {
                return Err(StoreError::Conflict {
                    collection: collection.to_string(),
                    detail: format!("document {id} already exists"),
                });
            }
            check_unique(collection, docs, id, &doc, unique_keys)?;
            docs.insert(id, Stored { seq: *next_seq, doc });
            *next_seq += 1;
        }
        WriteOp::Replace {
            collection,
            id,
            doc,
            unique_keys,
        } => {
            if !docs.contains_key(&id) {
                return Err(StoreError::NotFound {
                    collection: collection.to_string(),
                    id,
                });
            }
            check_unique(collection, docs, id, &doc, unique_keys)?;
            if let Some(stored) = docs.get_mut(&id) {
                stored.doc = doc;
            }
        }
        WriteOp::Set {
            collection,
            id,
            field,
            value,
            unique_keys,
        } => {
            let mut doc = docs
                .get(&id)
                .map(|stored| stored.doc.clone())
                .ok_or_else(|| StoreError::NotFound {
                    collection: collection.to_string(),
                    id,
                })?;
            let Some(map) = doc.as_object_mut() else {
                return Err(StoreError::InvalidDocument {
                    collection: collection.to_string(),
                    id,
                    reason: "not an object".to_string(),
                });
            };
            map.insert(field, value);
            check_unique(collection, docs, id, &doc, unique_keys)?;
            if let Some(stored) = docs.get_mut(&id) {
                stored.doc = doc;
            }
        }
        WriteOp::Delete { collection, id } => {
            if docs.remove(&id).is_none() {
                return Err(StoreError::NotFound {
                    collection: collection.to_string(),
                    id,
                });
            }
        }
        WriteOp::Increment {
            collection,
            id,
            field,
            by,
            floor,
        } => {
            let stored = docs.get_mut(&id).ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id,
            })?;
            let invalid = |reason: &str| StoreError::InvalidDocument {
                collection: collection.to_string(),
                id,
                reason: format!("{field}: {reason}"),
            };

            let slot = value_at_mut(&mut stored.doc, &segments(field))
                .ok_or_else(|| invalid("path crosses a non-object"))?;
            let current = match &*slot {
                Value::Null => 0,
                other => other.as_i64().ok_or_else(|| invalid("not an integer"))?,
            };

            let next = current
                .checked_add(by)
                .ok_or_else(|| invalid("integer overflow"))?;
            if floor.is_some_and(|floor| next < floor) {
                return Err(StoreError::GuardFailed {
                    collection: collection.to_string(),
                    id,
                    field: field.to_string(),
                });
            }
            *slot = Value::from(next);
        }
        WriteOp::Expect {
            collection,
            id,
            field,
            value,
        } => {
            let stored = docs.get(&id).ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id,
            })?;
            let current = values_at(&stored.doc, &segments(field)).into_iter().next();
            if current.unwrap_or(&Value::Null) != &value {
                return Err(StoreError::GuardFailed {
                    collection: collection.to_string(),
                    id,
                    field: field.to_string(),
                });
            }
        }
    }

    Ok(())
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, id: EntityId) -> Result<Option<Value>> {
        let state = self.state.read().await;
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(&id))
            .map(|stored| stored.doc.clone()))
    }

    async fn find(&self, collection: &str, query: &DocumentQuery) -> Result<Vec<Value>> {
        let state = self.state.read().await;
        let Some(docs) = state.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<&Stored> = docs
            .values()
            .filter(|stored| query.matches(&stored.doc))
            .collect();

        match &query.sort {
            SortKey::Created => matched.sort_by_key(|stored| stored.seq),
            SortKey::Field(path) => {
                let path = segments(path);
                matched.sort_by(|a, b| {
                    let left = values_at(&a.doc, &path).into_iter().next();
                    let right = values_at(&b.doc, &path).into_iter().next();
                    compare_values(left, right).then(a.seq.cmp(&b.seq))
                });
            }
            SortKey::Ratio {
                numerator,
                denominator,
            } => {
                matched.sort_by(|a, b| {
                    let left = ratio_of(&a.doc, numerator, denominator);
                    let right = ratio_of(&b.doc, numerator, denominator);
                    left.total_cmp(&right).then(a.seq.cmp(&b.seq))
                });
            }
        }
        if query.descending {
            matched.reverse();
        }

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|stored| stored.doc.clone())
            .collect())
    }

    async fn count(&self, collection: &str, query: &DocumentQuery) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state.collections.get(collection).map_or(0, |docs| {
            docs.values().filter(|s| query.matches(&s.doc)).count() as u64
        }))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().await;

        let touched: HashSet<&'static str> = batch.ops().iter().map(WriteOp::collection).collect();
        let mut scratch: HashMap<&'static str, Collection> = touched
            .into_iter()
            .map(|name| {
                let docs = state.collections.get(name).cloned().unwrap_or_default();
                (name, docs)
            })
            .collect();

        let mut next_seq = state.next_seq;
        for op in batch.into_ops() {
            apply(&mut scratch, op, &mut next_seq)?;
        }

        for (name, docs) in scratch {
            state.collections.insert(name.to_string(), docs);
        }
        state.next_seq = next_seq;
        Ok(())
    }
}
