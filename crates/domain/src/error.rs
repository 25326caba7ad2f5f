//! Domain error types.

use gateways::GatewayError;
use store::StoreError;
use thiserror::Error;

use crate::Money;
use crate::order::OrderStatus;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The requested entity does not exist (or is not visible to the caller).
    #[error("{0} not found")]
    NotFound(String),

    /// Checkout was attempted on a cart with no items.
    #[error("Cart is empty")]
    EmptyCart,

    /// The live catalog price no longer matches the cart snapshot.
    #[error("Price of {product} has changed")]
    PriceChanged { product: String },

    /// Live stock is below the requested quantity.
    #[error("Not enough stock for {product}")]
    InsufficientStock { product: String },

    /// The processor reported a paid amount different from the cart total.
    #[error("Payment amount mismatch: expected {expected}, paid {paid}")]
    AmountMismatch { expected: Money, paid: Money },

    /// A uniqueness rule was violated (duplicate email, review, name...).
    #[error("{0}")]
    Conflict(String),

    /// Reviews require a paid order containing the product.
    #[error("You must purchase the product before reviewing it")]
    NotPurchased,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Verify your email to get full access")]
    EmailNotVerified,

    /// A bearer, verification or reset token failed validation.
    #[error("Token is invalid or has expired")]
    InvalidToken,

    /// Webhook signature verification failed.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Input failed validation.
    #[error("{0}")]
    Validation(String),

    /// Order status may only move forward.
    #[error("Cannot move order from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// The caller is authenticated but may not act on this resource.
    #[error("{0}")]
    Forbidden(String),

    /// An error occurred in the document store.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// An external service failed.
    #[error("Gateway error: {0}")]
    Gateway(GatewayError),

    /// Unexpected failure in a local dependency (hashing, token encoding).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(entity: &str) -> Self {
        DomainError::NotFound(entity.to_string())
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { collection, .. } => DomainError::NotFound(entity_name(&collection)),
            StoreError::Conflict { collection, detail } => {
                DomainError::Conflict(format!("Duplicate {}: {detail}", entity_name(&collection)))
            }
            other => DomainError::Store(other),
        }
    }
}

impl From<GatewayError> for DomainError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::InvalidSignature(reason) => {
                tracing::warn!(%reason, "rejected webhook signature");
                DomainError::InvalidSignature
            }
            GatewayError::MalformedEvent(reason) => DomainError::Validation(reason),
            other => DomainError::Gateway(other),
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        DomainError::Store(StoreError::Serialization(e))
    }
}

/// Singular, capitalized entity name for a collection.
fn entity_name(collection: &str) -> String {
    let singular = collection.strip_suffix("ies").map_or_else(
        || collection.strip_suffix('s').unwrap_or(collection).to_string(),
        |stem| format!("{stem}y"),
    );
    let mut chars = singular.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => singular,
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;
    use store::EntityId;

    #[test]
    fn store_not_found_names_the_entity() {
        let err: DomainError = StoreError::NotFound {
            collection: "categories".to_string(),
            id: EntityId::new(),
        }
        .into();
        assert_eq!(err.to_string(), "Category not found");

        let err: DomainError = StoreError::NotFound {
            collection: "products".to_string(),
            id: EntityId::new(),
        }
        .into();
        assert_eq!(err.to_string(), "Product not found");
    }

    #[test]
    fn store_conflict_becomes_domain_conflict() {
        let err: DomainError = StoreError::Conflict {
            collection: "users".to_string(),
            detail: "uniq_users_email".to_string(),
        }
        .into();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn bad_signature_is_not_a_gateway_failure() {
        let err: DomainError = GatewayError::InvalidSignature("mismatch".to_string()).into();
        assert!(matches!(err, DomainError::InvalidSignature));
    }
}
