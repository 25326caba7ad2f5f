use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::EntityId;

/// An entity persisted as a JSON document.
///
/// `UNIQUE_KEYS` lists field sets (dotted paths) whose combined values must
/// be unique within the collection. The in-memory store enforces them on
/// write; the Postgres store relies on matching partial unique indexes.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Name of the collection the document lives in.
    const COLLECTION: &'static str;

    /// Field sets that must be unique across the collection.
    const UNIQUE_KEYS: &'static [&'static [&'static str]] = &[];

    /// The document's identifier.
    fn id(&self) -> EntityId;
}

/// Splits a dotted path (`items.product_id`) into its segments.
pub(crate) fn segments(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

/// Collects every value reachable from `doc` through `path`.
///
/// Arrays met along the way are flattened, so `items.product_id` yields the
/// product id of every line item.
pub(crate) fn values_at<'a>(doc: &'a Value, path: &[&str]) -> Vec<&'a Value> {
    let Some((head, rest)) = path.split_first() else {
        return vec![doc];
    };

    match doc {
        Value::Object(map) => map
            .get(*head)
            .map(|child| values_at(child, rest))
            .unwrap_or_default(),
        Value::Array(items) => items
            .iter()
            .flat_map(|item| values_at(item, path))
            .collect(),
        _ => Vec::new(),
    }
}

/// Returns a mutable reference to the value at `path`, creating missing
/// intermediate objects. Fails if a non-object sits on the path.
pub(crate) fn value_at_mut<'a>(doc: &'a mut Value, path: &[&str]) -> Option<&'a mut Value> {
    let Some((head, rest)) = path.split_first() else {
        return Some(doc);
    };

    let map = doc.as_object_mut()?;
    let child = map.entry(head.to_string()).or_insert(Value::Null);
    if rest.is_empty() {
        Some(child)
    } else {
        if child.is_null() {
            *child = Value::Object(serde_json::Map::new());
        }
        value_at_mut(child, rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn values_at_walks_nested_objects() {
        let doc = json!({"address": {"city": "Lyon"}});
        let found = values_at(&doc, &segments("address.city"));
        assert_eq!(found, vec![&json!("Lyon")]);
    }

    #[test]
    fn values_at_flattens_arrays() {
        let doc = json!({"items": [{"product_id": "a"}, {"product_id": "b"}]});
        let found = values_at(&doc, &segments("items.product_id"));
        assert_eq!(found, vec![&json!("a"), &json!("b")]);
    }

    #[test]
    fn values_at_missing_path_is_empty() {
        let doc = json!({"name": "x"});
        assert!(values_at(&doc, &segments("price")).is_empty());
    }

    #[test]
    fn value_at_mut_creates_missing_leaf() {
        let mut doc = json!({"stats": {}});
        *value_at_mut(&mut doc, &segments("stats.sold")).unwrap() = json!(3);
        assert_eq!(doc, json!({"stats": {"sold": 3}}));
    }

    #[test]
    fn value_at_mut_refuses_non_object_parent() {
        let mut doc = json!({"quantity": 5});
        assert!(value_at_mut(&mut doc, &segments("quantity.inner")).is_none());
    }
}
