use std::cmp::Ordering;

use serde_json::Value;

use crate::document::{segments, values_at};

/// A single predicate on a document field.
///
/// Paths are dotted (`items.product_id`). When a path crosses an array, the
/// predicate holds if any element satisfies it.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals the value, or the field is an array containing it.
    Eq { path: String, value: Value },

    /// Numeric field within an inclusive range.
    Range {
        path: String,
        min: Option<f64>,
        max: Option<f64>,
    },
}

/// What to order results by.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SortKey {
    /// Insertion order.
    #[default]
    Created,
    /// A document field.
    Field(String),
    /// `numerator / denominator` of two numeric fields. A missing or zero
    /// denominator sorts as 0.
    Ratio {
        numerator: String,
        denominator: String,
    },
}

/// Case-insensitive substring search across one or more string fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Search {
    pub fields: Vec<String>,
    pub term: String,
}

/// Builder for constructing document queries.
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    /// Predicates that must all hold.
    pub filters: Vec<Filter>,

    /// Optional keyword search.
    pub search: Option<Search>,

    /// Sort key.
    pub sort: SortKey,

    /// Sort descending instead of ascending.
    pub descending: bool,

    /// Maximum number of documents to return.
    pub limit: Option<usize>,

    /// Number of documents to skip.
    pub offset: Option<usize>,
}

impl DocumentQuery {
    /// Creates a new empty query matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query with a single equality filter.
    pub fn by(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().eq(path, value)
    }

    /// Adds an equality filter.
    pub fn eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    /// Adds an inclusive numeric range filter. Open ends are `None`.
    pub fn range(mut self, path: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        if min.is_some() || max.is_some() {
            self.filters.push(Filter::Range {
                path: path.into(),
                min,
                max,
            });
        }
        self
    }

    /// Matches documents where any of `fields` contains `term`, ignoring case.
    pub fn search<I, F>(mut self, fields: I, term: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        let term = term.into();
        if !term.trim().is_empty() {
            self.search = Some(Search {
                fields: fields.into_iter().map(Into::into).collect(),
                term: term.trim().to_string(),
            });
        }
        self
    }

    /// Orders by a field.
    pub fn sort_by(mut self, path: impl Into<String>, descending: bool) -> Self {
        self.sort = SortKey::Field(path.into());
        self.descending = descending;
        self
    }

    /// Orders by the quotient of two numeric fields.
    pub fn sort_by_ratio(
        mut self,
        numerator: impl Into<String>,
        denominator: impl Into<String>,
        descending: bool,
    ) -> Self {
        self.sort = SortKey::Ratio {
            numerator: numerator.into(),
            denominator: denominator.into(),
        };
        self.descending = descending;
        self
    }

    /// Orders by insertion time.
    pub fn sort_by_created(mut self, descending: bool) -> Self {
        self.sort = SortKey::Created;
        self.descending = descending;
        self
    }

    /// Limits the number of documents returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips this many documents before returning results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the document satisfies every filter and the search.
    pub fn matches(&self, doc: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
            && self.search.as_ref().is_none_or(|s| s.matches(doc))
    }
}

impl Filter {
    fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::Eq { path, value } => values_at(doc, &segments(path))
                .into_iter()
                .any(|found| match found {
                    Value::Array(items) => found == value || items.contains(value),
                    _ => found == value,
                }),
            Filter::Range { path, min, max } => values_at(doc, &segments(path))
                .into_iter()
                .flat_map(|found| match found {
                    Value::Array(items) => items.iter().collect(),
                    other => vec![other],
                })
                .filter_map(Value::as_f64)
                .any(|n| min.is_none_or(|lo| n >= lo) && max.is_none_or(|hi| n <= hi)),
        }
    }
}

impl Search {
    fn matches(&self, doc: &Value) -> bool {
        let needle = self.term.to_lowercase();
        self.fields.iter().any(|field| {
            values_at(doc, &segments(field))
                .into_iter()
                .filter_map(Value::as_str)
                .any(|s| s.to_lowercase().contains(&needle))
        })
    }
}

/// Value of a ratio sort key for one document.
pub(crate) fn ratio_of(doc: &Value, numerator: &str, denominator: &str) -> f64 {
    let number = |path: &str| {
        values_at(doc, &segments(path))
            .into_iter()
            .next()
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    };
    let den = number(denominator);
    if den == 0.0 { 0.0 } else { number(numerator) / den }
}

/// Total order over JSON values used for field sorting.
///
/// Missing and null sort first, then booleans, numbers and strings.
pub(crate) fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product() -> Value {
        json!({
            "name": "Blue Hoodie",
            "description": "Warm cotton",
            "price": 4500,
            "colors": ["blue", "navy"],
            "items": [{"product_id": "p1"}, {"product_id": "p2"}],
        })
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(DocumentQuery::new().matches(&product()));
    }

    #[test]
    fn eq_matches_scalar_and_array_members() {
        assert!(DocumentQuery::by("name", "Blue Hoodie").matches(&product()));
        assert!(DocumentQuery::by("colors", "navy").matches(&product()));
        assert!(DocumentQuery::by("items.product_id", "p2").matches(&product()));
        assert!(!DocumentQuery::by("items.product_id", "p3").matches(&product()));
    }

    #[test]
    fn range_is_inclusive_and_open_ended() {
        let doc = product();
        assert!(DocumentQuery::new().range("price", Some(4500.0), None).matches(&doc));
        assert!(DocumentQuery::new().range("price", None, Some(4500.0)).matches(&doc));
        assert!(!DocumentQuery::new().range("price", Some(4501.0), None).matches(&doc));
    }

    #[test]
    fn range_without_bounds_is_dropped() {
        let query = DocumentQuery::new().range("price", None, None);
        assert!(query.filters.is_empty());
    }

    #[test]
    fn search_ignores_case_across_fields() {
        let doc = product();
        assert!(DocumentQuery::new().search(["name", "description"], "COTTON").matches(&doc));
        assert!(!DocumentQuery::new().search(["name"], "cotton").matches(&doc));
    }

    #[test]
    fn blank_search_is_ignored() {
        assert!(DocumentQuery::new().search(["name"], "  ").search.is_none());
    }

    #[test]
    fn compare_values_orders_numbers_numerically() {
        assert_eq!(
            compare_values(Some(&json!(9)), Some(&json!(10))),
            Ordering::Less
        );
        assert_eq!(compare_values(None, Some(&json!(1))), Ordering::Less);
    }
}
