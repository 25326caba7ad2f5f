//! Domain layer for the storefront.
//!
//! This crate provides the entities and services behind the HTTP API:
//! - Users, roles and token-based authentication
//! - Categories and a cached product catalog
//! - Per-user carts
//! - The order workflow (cash orders, hosted checkout, payment webhooks)
//! - Reviews and product rating aggregates

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod category;
pub mod error;
pub mod money;
pub mod order;
pub mod page;
pub mod review;
pub mod slug;
pub mod user;

pub use auth::{AccessClaims, AuthService, LoginOutput, RegisterInput, TokenIssuer};
pub use cart::{AddToCart, Cart, CartItem, CartService};
pub use catalog::{Catalog, CreateProduct, Product, ProductFilter, ProductSort, ProductView, UpdateProduct};
pub use category::{Category, CategoryService, CreateCategory, UpdateCategory};
pub use error::{DomainError, Result};
pub use money::Money;
pub use order::{
    CheckoutSessionOutput, Order, OrderItem, OrderStatus, OrderWorkflow, PaymentMethod,
    ShippingAddress, WebhookOutcome,
};
pub use page::{Page, PageRequest};
pub use review::{CreateReview, Review, ReviewService, UpdateReview};
pub use common::EntityId;
pub use user::{Actor, CreateUser, Role, UpdateUser, User, UserService, UserView};
