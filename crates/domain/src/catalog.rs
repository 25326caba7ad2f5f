//! Products: cached reads, admin CRUD, and the stock and rating writes used by
//! checkout and reviews.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gateways::Cache;
use serde::{Deserialize, Serialize};
use store::{Document, DocumentQuery, DocumentStore, Repository, WriteBatch};

use crate::category::Category;
use crate::page::{Page, PageRequest};
use crate::slug::slugify;
use crate::{DomainError, EntityId, Money, Result};

/// How long a product stays in the read cache.
pub const PRODUCT_CACHE_TTL: Duration = Duration::from_secs(600);

pub fn cache_key(id: EntityId) -> String {
    format!("product:{id}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: EntityId,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub quantity: i64,
    pub sold: i64,
    pub price: Money,
    pub discount_percentage: u8,
    pub colors: Vec<String>,
    pub image_cover: String,
    pub images: Vec<String>,
    pub category_id: EntityId,
    #[serde(default)]
    pub ratings_sum: i64,
    #[serde(default)]
    pub ratings_quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Product {
    const COLLECTION: &'static str = "products";
    const UNIQUE_KEYS: &'static [&'static [&'static str]] = &[&["slug"]];

    fn id(&self) -> EntityId {
        self.id
    }
}

impl Product {
    pub fn price_after_discount(&self) -> Money {
        self.price.discounted(self.discount_percentage)
    }

    /// Mean review rating rounded to one decimal; 0 with no reviews.
    pub fn average_rating(&self) -> f64 {
        average_rating(self.ratings_sum, self.ratings_quantity)
    }

    pub fn view(self) -> ProductView {
        ProductView {
            price_after_discount: self.price_after_discount(),
            average_rating: self.average_rating(),
            product: self,
        }
    }
}

/// Product as returned to clients, with derived price and rating.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub price_after_discount: Money,
    pub average_rating: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    pub description: String,
    pub quantity: i64,
    pub price: Money,
    #[serde(default)]
    pub discount_percentage: u8,
    #[serde(default)]
    pub colors: Vec<String>,
    pub image_cover: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub category_id: EntityId,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<i64>,
    pub price: Option<Money>,
    pub discount_percentage: Option<u8>,
    pub colors: Option<Vec<String>>,
    pub image_cover: Option<String>,
    pub images: Option<Vec<String>>,
    pub category_id: Option<EntityId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Rating,
}

/// List filters. Prices are in cents.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub category: Option<EntityId>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub keyword: Option<String>,
    #[serde(default)]
    pub sort: ProductSort,
}

impl ProductFilter {
    fn to_query(&self) -> DocumentQuery {
        let mut query = DocumentQuery::new().range(
            "price",
            self.min_price.map(|p| p as f64),
            self.max_price.map(|p| p as f64),
        );
        if let Some(category) = self.category {
            query = query.eq("category_id", category.to_string());
        }
        if let Some(keyword) = &self.keyword {
            query = query.search(["name", "description"], keyword.as_str());
        }
        match self.sort {
            ProductSort::Newest => query.sort_by_created(true),
            ProductSort::PriceAsc => query.sort_by("price", false),
            ProductSort::PriceDesc => query.sort_by("price", true),
            ProductSort::Rating => query.sort_by_ratio("ratings_sum", "ratings_quantity", true),
        }
    }
}

fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Upper bound on a product price, in cents.
pub const MAX_PRICE_CENTS: i64 = 100_000_000_000;

fn validate(product: &Product) -> Result<()> {
    let invalid = |msg: &str| Err(DomainError::Validation(msg.to_string()));
    let name_len = product.name.chars().count();
    if !(3..=200).contains(&name_len) {
        return invalid("name must be between 3 and 200 characters");
    }
    if product.description.trim().is_empty() {
        return invalid("description should not be empty");
    }
    if product.quantity < 0 {
        return invalid("quantity must not be negative");
    }
    if product.price.is_negative() {
        return invalid("price must not be negative");
    }
    if product.price.cents() > MAX_PRICE_CENTS {
        return invalid("price is too large");
    }
    if product.discount_percentage > 100 {
        return invalid("discount_percentage must be between 0 and 100");
    }
    if !product.colors.iter().all(|c| is_hex_color(c)) {
        return invalid("each color must be a hex color like #1A2B3C");
    }
    if product.image_cover.trim().is_empty() {
        return invalid("image_cover should not be empty");
    }
    Ok(())
}

/// One-decimal average of `count` ratings adding up to `sum`.
pub fn average_rating(sum: i64, count: i64) -> f64 {
    if count <= 0 {
        return 0.0;
    }
    (sum as f64 / count as f64 * 10.0).round() / 10.0
}

#[derive(Clone)]
pub struct Catalog<S> {
    products: Repository<Product, S>,
    categories: Repository<Category, S>,
    cache: Arc<dyn Cache>,
}

impl<S: DocumentStore + Clone> Catalog<S> {
    pub fn new(store: S, cache: Arc<dyn Cache>) -> Self {
        Self {
            products: Repository::new(store.clone()),
            categories: Repository::new(store),
            cache,
        }
    }

    pub fn repository(&self) -> &Repository<Product, S> {
        &self.products
    }

    /// Reads a product through the cache. Cache failures fall through to the
    /// store.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: EntityId) -> Result<Product> {
        let key = cache_key(id);
        match self.cache.get(&key).await {
            Ok(Some(json)) => match serde_json::from_str::<Product>(&json) {
                Ok(product) => {
                    metrics::counter!("product_cache_requests_total", "result" => "hit")
                        .increment(1);
                    return Ok(product);
                }
                Err(e) => tracing::warn!(%key, error = %e, "discarding unreadable cache entry"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(%key, error = %e, "product cache read failed"),
        }
        metrics::counter!("product_cache_requests_total", "result" => "miss").increment(1);

        let product = self.products.require(id).await?;
        self.store_in_cache(&product).await;
        Ok(product)
    }

    /// Reads a product straight from the store.
    pub async fn get_uncached(&self, id: EntityId) -> Result<Option<Product>> {
        Ok(self.products.get(id).await?)
    }

    async fn store_in_cache(&self, product: &Product) {
        let key = cache_key(product.id);
        let json = match serde_json::to_string(product) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(%key, error = %e, "failed to encode product for cache");
                return;
            }
        };
        if let Err(e) = self.cache.set_ex(&key, json, PRODUCT_CACHE_TTL).await {
            tracing::warn!(%key, error = %e, "product cache write failed");
        }
    }

    /// Drops cached entries for the given products.
    pub async fn invalidate(&self, ids: &[EntityId]) {
        for id in ids {
            let key = cache_key(*id);
            if let Err(e) = self.cache.delete(&key).await {
                tracing::warn!(%key, error = %e, "product cache invalidation failed");
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn list(&self, filter: &ProductFilter, page: PageRequest) -> Result<Page<ProductView>> {
        let query = filter.to_query();
        let total = self.products.count(&query).await?;
        let products = self.products.find(&page.apply(query)).await?;
        Ok(Page::new(page, total, products).map(Product::view))
    }

    async fn require_category(&self, id: EntityId) -> Result<()> {
        if self.categories.get(id).await?.is_none() {
            return Err(DomainError::Validation("Category does not exist".to_string()));
        }
        Ok(())
    }

    async fn slug_taken(&self, slug: &str, except: Option<EntityId>) -> Result<bool> {
        let existing = self.products.find_one(&DocumentQuery::by("slug", slug)).await?;
        Ok(existing.is_some_and(|p| Some(p.id) != except))
    }

    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: CreateProduct) -> Result<Product> {
        let now = Utc::now();
        let name = input.name.trim().to_string();
        let product = Product {
            id: EntityId::new(),
            slug: slugify(&name),
            name,
            description: input.description,
            quantity: input.quantity,
            sold: 0,
            price: input.price,
            discount_percentage: input.discount_percentage,
            colors: input.colors,
            image_cover: input.image_cover,
            images: input.images,
            category_id: input.category_id,
            ratings_sum: 0,
            ratings_quantity: 0,
            created_at: now,
            updated_at: now,
        };
        validate(&product)?;
        self.require_category(product.category_id).await?;
        if self.slug_taken(&product.slug, None).await? {
            return Err(DomainError::Conflict(
                "Product with this name already exists".to_string(),
            ));
        }

        self.products.insert(&product).await?;
        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    /// Applies an admin edit. Only changed fields are written so concurrent
    /// stock movements are preserved.
    #[tracing::instrument(skip(self, input))]
    pub async fn update(&self, id: EntityId, input: UpdateProduct) -> Result<Product> {
        let before = self.products.require(id).await?;
        let mut after = before.clone();

        if let Some(name) = input.name {
            after.name = name.trim().to_string();
            after.slug = slugify(&after.name);
        }
        if let Some(description) = input.description {
            after.description = description;
        }
        if let Some(quantity) = input.quantity {
            after.quantity = quantity;
        }
        if let Some(price) = input.price {
            after.price = price;
        }
        if let Some(discount) = input.discount_percentage {
            after.discount_percentage = discount;
        }
        if let Some(colors) = input.colors {
            after.colors = colors;
        }
        if let Some(cover) = input.image_cover {
            after.image_cover = cover;
        }
        if let Some(images) = input.images {
            after.images = images;
        }
        if let Some(category) = input.category_id {
            after.category_id = category;
        }
        validate(&after)?;
        if after.category_id != before.category_id {
            self.require_category(after.category_id).await?;
        }
        if after.slug != before.slug && self.slug_taken(&after.slug, Some(id)).await? {
            return Err(DomainError::Conflict(
                "Product with this name already exists".to_string(),
            ));
        }
        after.updated_at = Utc::now();

        self.products
            .store()
            .commit(WriteBatch::new().patch(&before, &after)?)
            .await?;

        let fresh = self.products.require(id).await?;
        self.store_in_cache(&fresh).await;
        Ok(fresh)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: EntityId) -> Result<()> {
        self.products.delete(id).await?;
        self.invalidate(&[id]).await;
        tracing::info!(product_id = %id, "product deleted");
        Ok(())
    }
}

/// Adds guarded stock decrements and sold increments to `batch`. The batch
/// fails as a whole if any product would go below zero.
pub fn stock_decrements(
    batch: WriteBatch,
    lines: impl IntoIterator<Item = (EntityId, u32)>,
) -> WriteBatch {
    lines.into_iter().fold(batch, |batch, (id, quantity)| {
        let quantity = i64::from(quantity);
        batch
            .increment::<Product>(id, "quantity", -quantity, Some(0))
            .increment::<Product>(id, "sold", quantity, None)
    })
}

/// Adds rating total movements for `product_id` to `batch`. Both are
/// relative increments floored at zero.
pub fn rating_update(
    batch: WriteBatch,
    product_id: EntityId,
    sum_delta: i64,
    count_delta: i64,
) -> WriteBatch {
    batch
        .increment::<Product>(product_id, "ratings_sum", sum_delta, Some(0))
        .increment::<Product>(product_id, "ratings_quantity", count_delta, Some(0))
}

#[cfg(test)]
mod tests {
    use gateways::MokaCache;
    use store::InMemoryDocumentStore;

    use super::*;

    struct Fixture {
        catalog: Catalog<InMemoryDocumentStore>,
        cache: Arc<MokaCache>,
        category: EntityId,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryDocumentStore::new();
        let now = Utc::now();
        let category = Category {
            id: EntityId::new(),
            name: "Shoes".to_string(),
            slug: "shoes".to_string(),
            image: None,
            description: None,
            created_at: now,
            updated_at: now,
        };
        Repository::<Category, _>::new(store.clone())
            .insert(&category)
            .await
            .unwrap();
        let cache = Arc::new(MokaCache::default());
        Fixture {
            catalog: Catalog::new(store, cache.clone()),
            cache,
            category: category.id,
        }
    }

    fn input(name: &str, price: i64, category: EntityId) -> CreateProduct {
        CreateProduct {
            name: name.to_string(),
            description: "A fine product".to_string(),
            quantity: 10,
            price: Money::from_cents(price),
            discount_percentage: 0,
            colors: vec!["#FF0000".to_string()],
            image_cover: "cover.png".to_string(),
            images: vec![],
            category_id: category,
        }
    }

    #[test]
    fn average_rating_rounds_to_one_decimal() {
        assert_eq!(average_rating(0, 0), 0.0);
        assert_eq!(average_rating(13, 3), 4.3);
        assert_eq!(average_rating(3, 2), 1.5);
    }

    #[test]
    fn discounted_price() {
        let now = Utc::now();
        let product = Product {
            id: EntityId::new(),
            name: "Runner".to_string(),
            slug: "runner".to_string(),
            description: "d".to_string(),
            quantity: 1,
            sold: 0,
            price: Money::from_cents(2000),
            discount_percentage: 25,
            colors: vec![],
            image_cover: "c".to_string(),
            images: vec![],
            category_id: EntityId::new(),
            ratings_sum: 0,
            ratings_quantity: 0,
            created_at: now,
            updated_at: now,
        };
        let view = product.view();
        assert_eq!(view.price_after_discount, Money::from_cents(1500));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["price_after_discount"], 1500);
        assert_eq!(json["price"], 2000);
    }

    #[test]
    fn hex_colors() {
        assert!(is_hex_color("#a1B2c3"));
        assert!(!is_hex_color("a1B2c3"));
        assert!(!is_hex_color("#a1B2cZ"));
        assert!(!is_hex_color("#abc"));
    }

    #[tokio::test]
    async fn create_requires_existing_category() {
        let f = fixture().await;
        let err = f.catalog.create(input("Runner", 100, EntityId::new())).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn create_rejects_invalid_fields() {
        let f = fixture().await;
        let mut bad = input("Runner", 100, f.category);
        bad.colors = vec!["red".to_string()];
        assert!(matches!(f.catalog.create(bad).await, Err(DomainError::Validation(_))));

        let mut bad = input("Runner", 100, f.category);
        bad.discount_percentage = 101;
        assert!(matches!(f.catalog.create(bad).await, Err(DomainError::Validation(_))));

        let bad = input("Runner", -1, f.category);
        assert!(matches!(f.catalog.create(bad).await, Err(DomainError::Validation(_))));

        let bad = input("Runner", MAX_PRICE_CENTS + 1, f.category);
        assert!(matches!(f.catalog.create(bad).await, Err(DomainError::Validation(_))));
        f.catalog
            .create(input("Runner", MAX_PRICE_CENTS, f.category))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_slug_conflicts() {
        let f = fixture().await;
        f.catalog.create(input("Trail Runner", 100, f.category)).await.unwrap();
        let err = f
            .catalog
            .create(input("trail   runner", 100, f.category))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn get_populates_cache_and_update_refreshes_it() {
        let f = fixture().await;
        let product = f.catalog.create(input("Runner", 100, f.category)).await.unwrap();
        assert!(f.cache.get(&cache_key(product.id)).await.unwrap().is_none());

        f.catalog.get(product.id).await.unwrap();
        assert!(f.cache.get(&cache_key(product.id)).await.unwrap().is_some());

        f.catalog
            .update(
                product.id,
                UpdateProduct {
                    price: Some(Money::from_cents(250)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let cached = f.cache.get(&cache_key(product.id)).await.unwrap().unwrap();
        let cached: Product = serde_json::from_str(&cached).unwrap();
        assert_eq!(cached.price, Money::from_cents(250));

        f.catalog.delete(product.id).await.unwrap();
        assert!(f.cache.get(&cache_key(product.id)).await.unwrap().is_none());
        assert!(matches!(
            f.catalog.get(product.id).await,
            Err(DomainError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn unreadable_cache_entry_falls_through() {
        let f = fixture().await;
        let product = f.catalog.create(input("Runner", 100, f.category)).await.unwrap();
        f.cache
            .set_ex(&cache_key(product.id), "not json".to_string(), PRODUCT_CACHE_TTL)
            .await
            .unwrap();
        assert_eq!(f.catalog.get(product.id).await.unwrap(), product);
    }

    #[tokio::test]
    async fn list_filters_and_sorts() {
        let f = fixture().await;
        f.catalog.create(input("Cheap Sandal", 500, f.category)).await.unwrap();
        f.catalog.create(input("Mid Runner", 1500, f.category)).await.unwrap();
        f.catalog.create(input("Pricey Boot", 9000, f.category)).await.unwrap();

        let filter = ProductFilter {
            min_price: Some(1000),
            sort: ProductSort::PriceDesc,
            ..Default::default()
        };
        let page = f.catalog.list(&filter, PageRequest::default()).await.unwrap();
        let names: Vec<_> = page.data.iter().map(|p| p.product.name.as_str()).collect();
        assert_eq!(names, ["Pricey Boot", "Mid Runner"]);

        let filter = ProductFilter {
            keyword: Some("RUNNER".to_string()),
            category: Some(f.category),
            ..Default::default()
        };
        let page = f.catalog.list(&filter, PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 1);

        let filter = ProductFilter {
            category: Some(EntityId::new()),
            ..Default::default()
        };
        assert_eq!(f.catalog.list(&filter, PageRequest::default()).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn list_sorts_by_average_rating() {
        let f = fixture().await;
        let unrated = f.catalog.create(input("Plain Sock", 100, f.category)).await.unwrap();
        let good = f.catalog.create(input("Good Runner", 100, f.category)).await.unwrap();
        let best = f.catalog.create(input("Best Boot", 100, f.category)).await.unwrap();
        let docs = f.catalog.repository().store();

        // 4.0 from two reviews, 5.0 from one
        docs.commit(rating_update(WriteBatch::new(), good.id, 8, 2)).await.unwrap();
        docs.commit(rating_update(WriteBatch::new(), best.id, 5, 1)).await.unwrap();

        let filter = ProductFilter {
            sort: ProductSort::Rating,
            ..Default::default()
        };
        let page = f.catalog.list(&filter, PageRequest::default()).await.unwrap();
        let ids: Vec<_> = page.data.iter().map(|p| p.product.id).collect();
        assert_eq!(ids, [best.id, good.id, unrated.id]);
        assert_eq!(page.data[1].average_rating, 4.0);
    }

    #[tokio::test]
    async fn stock_decrements_are_guarded() {
        let f = fixture().await;
        let product = f.catalog.create(input("Runner", 100, f.category)).await.unwrap();
        let docs = f.catalog.repository().store();

        docs
            .commit(stock_decrements(
                WriteBatch::new(),
                [(product.id, 4)],
            ))
            .await
            .unwrap();
        let after = f.catalog.get_uncached(product.id).await.unwrap().unwrap();
        assert_eq!((after.quantity, after.sold), (6, 4));

        let err = docs
            .commit(stock_decrements(
                WriteBatch::new(),
                [(product.id, 7)],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, store::StoreError::GuardFailed { .. }));
        let after = f.catalog.get_uncached(product.id).await.unwrap().unwrap();
        assert_eq!((after.quantity, after.sold), (6, 4));
    }
}
