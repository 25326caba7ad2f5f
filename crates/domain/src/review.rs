//! Product reviews and the rating aggregate they drive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use store::{Document, DocumentQuery, DocumentStore, Repository, StoreError, WriteBatch};

use crate::catalog::{Catalog, rating_update};
use crate::order::Order;
use crate::page::{Page, PageRequest};
use crate::user::Actor;
use crate::{DomainError, EntityId, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: EntityId,
    pub user_id: EntityId,
    pub product_id: EntityId,
    pub rating: u8,
    pub title: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Review {
    const COLLECTION: &'static str = "reviews";
    const UNIQUE_KEYS: &'static [&'static [&'static str]] = &[&["user_id", "product_id"]];

    fn id(&self) -> EntityId {
        self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReview {
    pub product_id: EntityId,
    pub rating: u8,
    pub title: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateReview {
    pub rating: Option<u8>,
    pub title: Option<String>,
    pub details: Option<String>,
}

fn validate(review: &Review) -> Result<()> {
    if !(1..=5).contains(&review.rating) {
        return Err(DomainError::Validation(
            "rating must be between 1 and 5".to_string(),
        ));
    }
    if !(3..=100).contains(&review.title.trim().chars().count()) {
        return Err(DomainError::Validation(
            "title must be between 3 and 100 characters".to_string(),
        ));
    }
    if let Some(details) = &review.details {
        if !(3..=5000).contains(&details.trim().chars().count()) {
            return Err(DomainError::Validation(
                "details must be between 3 and 5000 characters".to_string(),
            ));
        }
    }
    Ok(())
}

fn already_reviewed() -> DomainError {
    DomainError::Conflict("You already reviewed this product".to_string())
}

/// A stale rating guard on the review itself means another request changed
/// it between our read and our commit.
fn changed_concurrently(e: DomainError) -> DomainError {
    match e {
        DomainError::Store(StoreError::GuardFailed { collection, .. })
            if collection == Review::COLLECTION =>
        {
            DomainError::Conflict("Review was changed by another request, try again".to_string())
        }
        other => other,
    }
}

#[derive(Clone)]
pub struct ReviewService<S> {
    store: S,
    reviews: Repository<Review, S>,
    orders: Repository<Order, S>,
    catalog: Catalog<S>,
}

impl<S: DocumentStore + Clone> ReviewService<S> {
    pub fn new(store: S, catalog: Catalog<S>) -> Self {
        Self {
            reviews: Repository::new(store.clone()),
            orders: Repository::new(store.clone()),
            store,
            catalog,
        }
    }

    async fn has_purchased(&self, user_id: EntityId, product_id: EntityId) -> Result<bool> {
        let query = DocumentQuery::by("user_id", user_id.to_string())
            .eq("items.product_id", product_id.to_string())
            .eq("is_paid", true);
        Ok(self.orders.exists(&query).await?)
    }

    /// Commits `batch` together with the product's rating totals moved by
    /// the given deltas. The totals are skipped if the product is gone.
    async fn commit_with_rating(
        &self,
        batch: WriteBatch,
        product_id: EntityId,
        sum_delta: i64,
        count_delta: i64,
    ) -> Result<()> {
        let batch = if self.catalog.get_uncached(product_id).await?.is_some() {
            rating_update(batch, product_id, sum_delta, count_delta)
        } else {
            batch
        };
        self.store.commit(batch).await?;
        self.catalog.invalidate(&[product_id]).await;
        Ok(())
    }

    #[tracing::instrument(skip(self, input), fields(user_id = %actor.user_id, product_id = %input.product_id))]
    pub async fn create(&self, actor: &Actor, input: CreateReview) -> Result<Review> {
        let now = Utc::now();
        let review = Review {
            id: EntityId::new(),
            user_id: actor.user_id,
            product_id: input.product_id,
            rating: input.rating,
            title: input.title.trim().to_string(),
            details: input.details,
            created_at: now,
            updated_at: now,
        };
        validate(&review)?;

        if self.catalog.get_uncached(review.product_id).await?.is_none() {
            return Err(DomainError::not_found("Product"));
        }
        if !self.has_purchased(actor.user_id, review.product_id).await? {
            return Err(DomainError::NotPurchased);
        }
        let duplicate = DocumentQuery::by("user_id", actor.user_id.to_string())
            .eq("product_id", review.product_id.to_string());
        if self.reviews.exists(&duplicate).await? {
            return Err(already_reviewed());
        }

        let batch = WriteBatch::new().insert(&review)?;
        self.commit_with_rating(batch, review.product_id, i64::from(review.rating), 1)
            .await
            .map_err(|e| match e {
                DomainError::Conflict(_) => already_reviewed(),
                other => other,
            })?;

        tracing::info!(review_id = %review.id, rating = review.rating, "review created");
        Ok(review)
    }

    /// Customers see their own reviews; admins see all.
    pub async fn list(&self, actor: &Actor, page: PageRequest) -> Result<Page<Review>> {
        let mut query = DocumentQuery::new().sort_by_created(true);
        if !actor.is_admin() {
            query = query.eq("user_id", actor.user_id.to_string());
        }
        let total = self.reviews.count(&query).await?;
        let reviews = self.reviews.find(&page.apply(query)).await?;
        Ok(Page::new(page, total, reviews))
    }

    pub async fn get(&self, id: EntityId) -> Result<Review> {
        Ok(self.reviews.require(id).await?)
    }

    #[tracing::instrument(skip(self, input), fields(user_id = %actor.user_id))]
    pub async fn update(&self, actor: &Actor, id: EntityId, input: UpdateReview) -> Result<Review> {
        let before = self.reviews.require(id).await?;
        if before.user_id != actor.user_id {
            return Err(DomainError::Forbidden(
                "You can only update your own reviews".to_string(),
            ));
        }

        let mut after = before.clone();
        if let Some(rating) = input.rating {
            after.rating = rating;
        }
        if let Some(title) = input.title {
            after.title = title.trim().to_string();
        }
        if input.details.is_some() {
            after.details = input.details;
        }
        validate(&after)?;
        after.updated_at = Utc::now();

        let delta = i64::from(after.rating) - i64::from(before.rating);
        let batch = WriteBatch::new()
            .expect::<Review>(before.id, "rating", before.rating)?
            .patch(&before, &after)?;
        self.commit_with_rating(batch, after.product_id, delta, 0)
            .await
            .map_err(changed_concurrently)?;
        Ok(after)
    }

    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn delete(&self, actor: &Actor, id: EntityId) -> Result<()> {
        let review = self.reviews.require(id).await?;
        if !actor.can_access(review.user_id) {
            return Err(DomainError::Forbidden(
                "You can only delete your own reviews".to_string(),
            ));
        }

        let batch = WriteBatch::new()
            .expect::<Review>(review.id, "rating", review.rating)?
            .delete::<Review>(review.id);
        self.commit_with_rating(batch, review.product_id, -i64::from(review.rating), -1)
            .await
            .map_err(changed_concurrently)?;

        tracing::info!(review_id = %id, "review deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(rating: u8, title: &str, details: Option<&str>) -> Review {
        let now = Utc::now();
        Review {
            id: EntityId::new(),
            user_id: EntityId::new(),
            product_id: EntityId::new(),
            rating,
            title: title.to_string(),
            details: details.map(str::to_string),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn validation_bounds() {
        assert!(validate(&review(5, "Great", None)).is_ok());
        assert!(validate(&review(0, "Great", None)).is_err());
        assert!(validate(&review(6, "Great", None)).is_err());
        assert!(validate(&review(3, "ok", None)).is_err());
        assert!(validate(&review(3, "Fine", Some("no"))).is_err());
        assert!(validate(&review(3, "Fine", Some("Solid shoe"))).is_ok());
    }
}
