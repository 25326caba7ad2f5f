//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and truncate the documents
//! table before each test. Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    Document, DocumentQuery, DocumentStore, DocumentStoreExt, EntityId, PostgresDocumentStore,
    Repository, StoreError, WriteBatch,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresDocumentStore::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and an empty documents table
async fn get_test_store() -> PostgresDocumentStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE documents")
        .execute(&pool)
        .await
        .unwrap();

    PostgresDocumentStore::new(pool)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Product {
    id: EntityId,
    slug: String,
    name: String,
    quantity: i64,
    price: i64,
    colors: Vec<String>,
}

impl Document for Product {
    const COLLECTION: &'static str = "products";
    const UNIQUE_KEYS: &'static [&'static [&'static str]] = &[&["slug"]];

    fn id(&self) -> EntityId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Line {
    product_id: EntityId,
    quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    id: EntityId,
    items: Vec<Line>,
}

impl Document for Order {
    const COLLECTION: &'static str = "orders";

    fn id(&self) -> EntityId {
        self.id
    }
}

fn product(slug: &str, quantity: i64, price: i64) -> Product {
    Product {
        id: EntityId::new(),
        slug: slug.to_string(),
        name: slug.replace('-', " "),
        quantity,
        price,
        colors: vec!["#000000".to_string()],
    }
}

#[tokio::test]
#[serial]
async fn insert_and_get_roundtrips_document() {
    let store = get_test_store().await;
    let products = Repository::<Product, _>::new(store.clone());
    let p = product("red-shirt", 3, 1500);

    products.insert(&p).await.unwrap();

    assert_eq!(products.get(p.id).await.unwrap(), Some(p));
    assert!(products.get(EntityId::new()).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn unique_index_maps_to_conflict() {
    let store = get_test_store().await;
    let products = Repository::<Product, _>::new(store);
    products.insert(&product("red-shirt", 3, 1500)).await.unwrap();

    let err = products
        .insert(&product("red-shirt", 1, 100))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
}

#[tokio::test]
#[serial]
async fn replace_and_delete() {
    let store = get_test_store().await;
    let products = Repository::<Product, _>::new(store);
    let mut p = product("red-shirt", 3, 1500);
    products.insert(&p).await.unwrap();

    p.price = 1200;
    products.replace(&p).await.unwrap();
    assert_eq!(products.require(p.id).await.unwrap().price, 1200);

    products.delete(p.id).await.unwrap();
    let err = products.delete(p.id).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
#[serial]
async fn batch_with_failed_guard_changes_nothing() {
    let store = get_test_store().await;
    let products = Repository::<Product, _>::new(store.clone());
    let plenty = product("plenty", 10, 100);
    let scarce = product("scarce", 1, 100);
    products.insert(&plenty).await.unwrap();
    products.insert(&scarce).await.unwrap();

    let order = Order {
        id: EntityId::new(),
        items: vec![Line {
            product_id: plenty.id,
            quantity: 2,
        }],
    };
    let batch = WriteBatch::new()
        .insert(&order)
        .unwrap()
        .increment::<Product>(plenty.id, "quantity", -2, Some(0))
        .increment::<Product>(scarce.id, "quantity", -2, Some(0));

    let err = store.commit(batch).await.unwrap_err();
    assert!(matches!(err, StoreError::GuardFailed { .. }));

    assert_eq!(products.require(plenty.id).await.unwrap().quantity, 10);
    assert_eq!(products.require(scarce.id).await.unwrap().quantity, 1);
    assert!(store.get("orders", order.id).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn compare_guard_rejects_stale_value() {
    let store = get_test_store().await;
    let products = Repository::<Product, _>::new(store.clone());
    let item = product("item", 3, 100);
    products.insert(&item).await.unwrap();

    let stale = WriteBatch::new()
        .expect::<Product>(item.id, "quantity", 2)
        .unwrap()
        .increment::<Product>(item.id, "quantity", 1, None);
    let err = store.commit(stale).await.unwrap_err();
    assert!(matches!(err, StoreError::GuardFailed { .. }));
    assert_eq!(products.require(item.id).await.unwrap().quantity, 3);

    let fresh = WriteBatch::new()
        .expect::<Product>(item.id, "quantity", 3)
        .unwrap()
        .increment::<Product>(item.id, "quantity", 1, None);
    store.commit(fresh).await.unwrap();
    assert_eq!(products.require(item.id).await.unwrap().quantity, 4);
}

#[tokio::test]
#[serial]
async fn increment_missing_document_is_not_found() {
    let store = get_test_store().await;
    let batch = WriteBatch::new().increment::<Product>(EntityId::new(), "sold", 1, None);

    let err = store.commit(batch).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
#[serial]
async fn concurrent_guarded_decrements_never_oversell() {
    let store = get_test_store().await;
    let products = Repository::<Product, _>::new(store.clone());
    let p = product("limited", 3, 100);
    products.insert(&p).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let batch = WriteBatch::new().increment::<Product>(p.id, "quantity", -1, Some(0));
            store.commit(batch).await.is_ok()
        }));
    }

    let results = futures_util::future::join_all(handles).await;
    let succeeded = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();

    assert_eq!(succeeded, 3);
    assert_eq!(products.require(p.id).await.unwrap().quantity, 0);
}

#[tokio::test]
#[serial]
async fn find_filters_sorts_and_pages() {
    let store = get_test_store().await;
    let products = Repository::<Product, _>::new(store);
    for (slug, price) in [("a-cap", 300), ("b-cap", 100), ("c-hat", 200), ("d-hat", 400)] {
        products.insert(&product(slug, 1, price)).await.unwrap();
    }

    let query = DocumentQuery::new()
        .range("price", Some(150.0), Some(400.0))
        .sort_by("price", true)
        .limit(2);
    let prices: Vec<i64> = products
        .find(&query)
        .await
        .unwrap()
        .iter()
        .map(|p| p.price)
        .collect();
    assert_eq!(prices, vec![400, 300]);
    assert_eq!(products.count(&query).await.unwrap(), 3);

    let hats = DocumentQuery::new().search(["name"], "HAT");
    assert_eq!(products.count(&hats).await.unwrap(), 2);

    let oldest = products.find_one(&DocumentQuery::new()).await.unwrap().unwrap();
    assert_eq!(oldest.slug, "a-cap");
}

#[tokio::test]
#[serial]
async fn eq_filter_reaches_into_arrays() {
    let store = get_test_store().await;
    let wanted = EntityId::new();
    let orders = Repository::<Order, _>::new(store.clone());
    orders
        .insert(&Order {
            id: EntityId::new(),
            items: vec![
                Line {
                    product_id: EntityId::new(),
                    quantity: 1,
                },
                Line {
                    product_id: wanted,
                    quantity: 2,
                },
            ],
        })
        .await
        .unwrap();

    let query = DocumentQuery::by("items.product_id", wanted.to_string());
    assert!(store.exists("orders", &query).await.unwrap());

    let products = Repository::<Product, _>::new(store);
    products.insert(&product("tee", 1, 1)).await.unwrap();
    assert!(products.exists(&DocumentQuery::by("colors", "#000000")).await.unwrap());
    assert!(!products.exists(&DocumentQuery::by("colors", "#FFFFFF")).await.unwrap());
}
