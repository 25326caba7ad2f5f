//! Per-user shopping carts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use store::{Document, DocumentQuery, DocumentStore, Repository, WriteBatch};

use crate::catalog::Catalog;
use crate::{DomainError, EntityId, Money, Result};

/// A line in a cart. `price` is the unit price when the product was first
/// added, not the live price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: EntityId,
    pub quantity: u32,
    pub price: Money,
}

impl CartItem {
    pub fn subtotal(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: EntityId,
    pub user_id: EntityId,
    pub items: Vec<CartItem>,
    pub total: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Cart {
    const COLLECTION: &'static str = "carts";
    const UNIQUE_KEYS: &'static [&'static [&'static str]] = &[&["user_id"]];

    fn id(&self) -> EntityId {
        self.id
    }
}

impl Cart {
    pub fn new(user_id: EntityId) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            user_id,
            items: Vec::new(),
            total: Money::zero(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn touch(&mut self) {
        self.total = self.items.iter().map(CartItem::subtotal).sum();
        self.updated_at = Utc::now();
    }

    /// Adds a line, or increments the quantity of an existing one. An
    /// existing line keeps its original price.
    pub fn add(&mut self, product_id: EntityId, quantity: u32, price: Money) {
        match self.items.iter_mut().find(|i| i.product_id == product_id) {
            Some(item) => item.quantity = item.quantity.saturating_add(quantity),
            None => self.items.push(CartItem {
                product_id,
                quantity,
                price,
            }),
        }
        self.touch();
    }

    /// Sets a line's quantity; zero or less removes it.
    pub fn set_quantity(&mut self, product_id: EntityId, quantity: i64) -> Result<()> {
        let index = self
            .items
            .iter()
            .position(|i| i.product_id == product_id)
            .ok_or_else(|| DomainError::NotFound("Product in cart".to_string()))?;

        if quantity <= 0 {
            self.items.remove(index);
        } else {
            self.items[index].quantity = u32::try_from(quantity)
                .map_err(|_| DomainError::Validation("quantity is too large".to_string()))?;
        }
        self.touch();
        Ok(())
    }

    pub fn remove(&mut self, product_id: EntityId) {
        self.items.retain(|i| i.product_id != product_id);
        self.touch();
    }
}

/// Adds the writes that empty `cart_id` to `batch`.
pub fn clear_cart(batch: WriteBatch, cart_id: EntityId) -> Result<WriteBatch> {
    Ok(batch
        .set::<Cart>(cart_id, "items", Vec::<CartItem>::new())?
        .set::<Cart>(cart_id, "total", Money::zero())?
        .set::<Cart>(cart_id, "updated_at", Utc::now())?)
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddToCart {
    pub product_id: EntityId,
    pub quantity: u32,
}

#[derive(Clone)]
pub struct CartService<S> {
    carts: Repository<Cart, S>,
    catalog: Catalog<S>,
}

impl<S: DocumentStore + Clone> CartService<S> {
    pub fn new(store: S, catalog: Catalog<S>) -> Self {
        Self {
            carts: Repository::new(store),
            catalog,
        }
    }

    pub fn repository(&self) -> &Repository<Cart, S> {
        &self.carts
    }

    async fn find_by_user(&self, user_id: EntityId) -> Result<Option<Cart>> {
        Ok(self
            .carts
            .find_one(&DocumentQuery::by("user_id", user_id.to_string()))
            .await?)
    }

    pub async fn get_by_user(&self, user_id: EntityId) -> Result<Cart> {
        self.find_by_user(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Cart"))
    }

    pub async fn get(&self, cart_id: EntityId) -> Result<Cart> {
        Ok(self.carts.require(cart_id).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn add_item(&self, user_id: EntityId, input: AddToCart) -> Result<Cart> {
        if input.quantity == 0 {
            return Err(DomainError::Validation(
                "Quantity must be at least 1".to_string(),
            ));
        }
        let product = self.catalog.get(input.product_id).await?;

        match self.find_by_user(user_id).await? {
            Some(mut cart) => {
                cart.add(product.id, input.quantity, product.price);
                self.carts.replace(&cart).await?;
                Ok(cart)
            }
            None => {
                let mut cart = Cart::new(user_id);
                cart.add(product.id, input.quantity, product.price);
                self.carts.insert(&cart).await?;
                tracing::debug!(cart_id = %cart.id, "cart created");
                Ok(cart)
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        user_id: EntityId,
        product_id: EntityId,
        quantity: i64,
    ) -> Result<Cart> {
        let mut cart = self.get_by_user(user_id).await?;
        cart.set_quantity(product_id, quantity)?;
        self.carts.replace(&cart).await?;
        Ok(cart)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, user_id: EntityId, product_id: EntityId) -> Result<Cart> {
        let mut cart = self.get_by_user(user_id).await?;
        cart.remove(product_id);
        self.carts.replace(&cart).await?;
        Ok(cart)
    }

    /// Deletes the user's cart. Having no cart is not an error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_cart(&self, user_id: EntityId) -> Result<()> {
        if let Some(cart) = self.find_by_user(user_id).await? {
            self.carts.delete(cart.id).await?;
        }
        Ok(())
    }
}
