use async_trait::async_trait;
use serde_json::{Value, json};
use sqlx::{PgPool, Postgres, Row, postgres::PgArguments, query::Query};

use crate::document::segments;
use crate::{
    DocumentQuery, EntityId, Filter, Result, SortKey, StoreError, WriteBatch, WriteOp,
    store::DocumentStore,
};

/// PostgreSQL-backed document store implementation.
///
/// Documents live in a single `documents` table as JSONB. Filters compile to
/// SQL/JSON path predicates, and a batch runs inside one transaction.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

/// A positional parameter for a dynamically built statement.
enum Bind {
    Text(String),
    Path(Vec<String>),
    Json(Value),
    Int(i64),
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    binds: Vec<Bind>,
) -> Query<'q, Postgres, PgArguments> {
    for bind in binds {
        query = match bind {
            Bind::Text(s) => query.bind(s),
            Bind::Path(p) => query.bind(p),
            Bind::Json(v) => query.bind(v),
            Bind::Int(n) => query.bind(n),
        };
    }
    query
}

/// Renders a dotted path as a quoted SQL/JSON path (`$."items"."product_id"`).
fn json_path(path: &str) -> String {
    let mut out = String::from("$");
    for segment in segments(path) {
        let escaped = segment.replace('\\', "\\\\").replace('"', "\\\"");
        out.push_str(&format!(".\"{escaped}\""));
    }
    out
}

fn text_path(path: &str) -> Vec<String> {
    segments(path).into_iter().map(str::to_string).collect()
}

fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Appends the WHERE clauses for `query` to `sql`. Parameter `$1` is the
/// collection name.
fn push_filters(query: &DocumentQuery, sql: &mut String, binds: &mut Vec<Bind>) {
    let mut param_count = 1 + binds.len();

    for filter in &query.filters {
        match filter {
            Filter::Eq { path, value } => {
                param_count += 2;
                sql.push_str(&format!(
                    " AND jsonb_path_exists(doc, ${}::jsonpath, ${}::jsonb)",
                    param_count - 1,
                    param_count
                ));
                binds.push(Bind::Text(format!("{} ? (@ == $v)", json_path(path))));
                binds.push(Bind::Json(json!({ "v": value })));
            }
            Filter::Range { path, min, max } => {
                let mut conditions = Vec::new();
                if min.is_some() {
                    conditions.push("@ >= $min");
                }
                if max.is_some() {
                    conditions.push("@ <= $max");
                }
                param_count += 2;
                sql.push_str(&format!(
                    " AND jsonb_path_exists(doc, ${}::jsonpath, ${}::jsonb)",
                    param_count - 1,
                    param_count
                ));
                binds.push(Bind::Text(format!(
                    "{} ? ({})",
                    json_path(path),
                    conditions.join(" && ")
                )));
                binds.push(Bind::Json(json!({ "min": min, "max": max })));
            }
        }
    }

    if let Some(search) = &query.search {
        param_count += 1;
        let pattern_param = param_count;
        binds.push(Bind::Text(like_pattern(&search.term)));

        let mut clauses = Vec::new();
        for field in &search.fields {
            param_count += 1;
            clauses.push(format!(
                "doc #>> ${param_count}::text[] ILIKE ${pattern_param}"
            ));
            binds.push(Bind::Path(text_path(field)));
        }
        if !clauses.is_empty() {
            sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
        }
    }
}

impl PostgresDocumentStore {
    /// Creates a new PostgreSQL document store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    async fn apply(tx: &mut sqlx::PgConnection, op: WriteOp) -> Result<()> {
        match op {
            WriteOp::Insert {
                collection, id, doc, ..
            } => {
                sqlx::query("INSERT INTO documents (collection, id, doc) VALUES ($1, $2, $3)")
                    .bind(collection)
                    .bind(id.as_uuid())
                    .bind(doc)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| conflict_or_database(collection, e))?;
            }
            WriteOp::Replace {
                collection, id, doc, ..
            } => {
                let result = sqlx::query(
                    r#"
                    UPDATE documents SET doc = $3, updated_at = NOW()
                    WHERE collection = $1 AND id = $2
                    "#,
                )
                .bind(collection)
                .bind(id.as_uuid())
                .bind(doc)
                .execute(&mut *tx)
                .await
                .map_err(|e| conflict_or_database(collection, e))?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::NotFound {
                        collection: collection.to_string(),
                        id,
                    });
                }
            }
            WriteOp::Set {
                collection,
                id,
                field,
                value,
                ..
            } => {
                let result = sqlx::query(
                    r#"
                    UPDATE documents
                    SET doc = jsonb_set(doc, $3::text[], $4, true), updated_at = NOW()
                    WHERE collection = $1 AND id = $2
                    "#,
                )
                .bind(collection)
                .bind(id.as_uuid())
                .bind(vec![field])
                .bind(value)
                .execute(&mut *tx)
                .await
                .map_err(|e| conflict_or_database(collection, e))?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::NotFound {
                        collection: collection.to_string(),
                        id,
                    });
                }
            }
            WriteOp::Delete { collection, id } => {
                let result =
                    sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                        .bind(collection)
                        .bind(id.as_uuid())
                        .execute(&mut *tx)
                        .await?;

                if result.rows_affected() == 0 {
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
                // The floor check and the write happen in one statement, so
                // concurrent decrements cannot both pass the guard.
                let result = sqlx::query(
                    r#"
                    UPDATE documents
                    SET doc = jsonb_set(doc, $3::text[], to_jsonb(COALESCE((doc #>> $3::text[])::bigint, 0) + $4), true),
                        updated_at = NOW()
                    WHERE collection = $1 AND id = $2
                      AND ($5::bigint IS NULL OR COALESCE((doc #>> $3::text[])::bigint, 0) + $4 >= $5)
                    "#,
                )
                .bind(collection)
                .bind(id.as_uuid())
                .bind(text_path(field))
                .bind(by)
                .bind(floor)
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() == 0 {
                    let exists: bool = sqlx::query_scalar(
                        "SELECT EXISTS(SELECT 1 FROM documents WHERE collection = $1 AND id = $2)",
                    )
                    .bind(collection)
                    .bind(id.as_uuid())
                    .fetch_one(&mut *tx)
                    .await?;

                    return Err(if exists {
                        StoreError::GuardFailed {
                            collection: collection.to_string(),
                            id,
                            field: field.to_string(),
                        }
                    } else {
                        StoreError::NotFound {
                            collection: collection.to_string(),
                            id,
                        }
                    });
                }
            }
            WriteOp::Expect {
                collection,
                id,
                field,
                value,
            } => {
                // FOR UPDATE waits for any writer holding the row and then
                // reads its committed value, so the guard sees the latest state.
                let current: Option<Option<Value>> = sqlx::query_scalar(
                    r#"
                    SELECT doc #> $3::text[] FROM documents
                    WHERE collection = $1 AND id = $2
                    FOR UPDATE
                    "#,
                )
                .bind(collection)
                .bind(id.as_uuid())
                .bind(text_path(field))
                .fetch_optional(&mut *tx)
                .await?;

                let Some(current) = current else {
                    return Err(StoreError::NotFound {
                        collection: collection.to_string(),
                        id,
                    });
                };
                if current.unwrap_or(Value::Null) != value {
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
}

fn conflict_or_database(collection: &str, e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return StoreError::Conflict {
            collection: collection.to_string(),
            detail: db_err
                .constraint()
                .map_or_else(|| db_err.message().to_string(), str::to_string),
        };
    }
    StoreError::Database(e)
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn get(&self, collection: &str, id: EntityId) -> Result<Option<Value>> {
        let doc: Option<Value> =
            sqlx::query_scalar("SELECT doc FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        Ok(doc)
    }

    async fn find(&self, collection: &str, query: &DocumentQuery) -> Result<Vec<Value>> {
        let mut sql = String::from("SELECT doc FROM documents WHERE collection = $1");
        let mut binds = Vec::new();
        push_filters(query, &mut sql, &mut binds);

        let direction = if query.descending { "DESC" } else { "ASC" };
        let mut param_count = 1 + binds.len();
        match &query.sort {
            SortKey::Created => sql.push_str(&format!(" ORDER BY seq {direction}")),
            SortKey::Field(path) => {
                param_count += 1;
                sql.push_str(&format!(
                    " ORDER BY doc #> ${param_count}::text[] {direction} NULLS FIRST, seq {direction}"
                ));
                binds.push(Bind::Path(text_path(path)));
            }
            SortKey::Ratio {
                numerator,
                denominator,
            } => {
                let (num, den) = (param_count + 1, param_count + 2);
                param_count += 2;
                sql.push_str(&format!(
                    " ORDER BY COALESCE((doc #>> ${num}::text[])::float8 \
                     / NULLIF((doc #>> ${den}::text[])::float8, 0), 0) {direction}, seq {direction}"
                ));
                binds.push(Bind::Path(text_path(numerator)));
                binds.push(Bind::Path(text_path(denominator)));
            }
        }

        if let Some(limit) = query.limit {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
            binds.push(Bind::Int(limit as i64));
        }
        if let Some(offset) = query.offset {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
            binds.push(Bind::Int(offset as i64));
        }

        let rows = bind_all(sqlx::query(&sql).bind(collection), binds)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| row.try_get::<Value, _>("doc").map_err(StoreError::from))
            .collect()
    }

    async fn count(&self, collection: &str, query: &DocumentQuery) -> Result<u64> {
        let mut sql = String::from("SELECT COUNT(*) AS total FROM documents WHERE collection = $1");
        let mut binds = Vec::new();
        push_filters(query, &mut sql, &mut binds);

        let row = bind_all(sqlx::query(&sql).bind(collection), binds)
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = row.try_get("total")?;
        Ok(total as u64)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let ops = batch.len();
        let mut tx = self.pool.begin().await?;
        for op in batch.into_ops() {
            Self::apply(&mut *tx, op).await?;
        }
        tx.commit().await?;

        tracing::debug!(ops, "committed write batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_path_quotes_segments() {
        assert_eq!(json_path("items.product_id"), r#"$."items"."product_id""#);
        assert_eq!(json_path(r#"we"ird"#), r#"$."we\"ird""#);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), r"%50\%\_off%");
    }

    #[test]
    fn filters_number_parameters_after_collection() {
        let query = DocumentQuery::by("user_id", "u1")
            .range("price", Some(1.0), None)
            .search(["name", "description"], "shirt");
        let mut sql = String::new();
        let mut binds = Vec::new();
        push_filters(&query, &mut sql, &mut binds);

        assert!(sql.contains("jsonb_path_exists(doc, $2::jsonpath, $3::jsonb)"));
        assert!(sql.contains("jsonb_path_exists(doc, $4::jsonpath, $5::jsonb)"));
        assert!(sql.contains("doc #>> $7::text[] ILIKE $6 OR doc #>> $8::text[] ILIKE $6"));
        assert_eq!(binds.len(), 7);
    }
}
