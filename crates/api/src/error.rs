//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;

/// API-level error type that maps to HTTP responses.
///
/// Every error body has the shape `{"status": "error", "error": <message>}`.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed input rejected before reaching the domain.
    BadRequest(String),
    /// Missing or invalid bearer token.
    Unauthorized(String),
    /// Authenticated, but the role may not use this endpoint.
    Forbidden(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Internal server error.
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Domain(err) => domain_status(err),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::InvalidCredentials | DomainError::EmailNotVerified => {
            StatusCode::UNAUTHORIZED
        }
        DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
        DomainError::EmptyCart
        | DomainError::PriceChanged { .. }
        | DomainError::InsufficientStock { .. }
        | DomainError::AmountMismatch { .. }
        | DomainError::Conflict(_)
        | DomainError::NotPurchased
        | DomainError::InvalidToken
        | DomainError::InvalidSignature
        | DomainError::Validation(_)
        | DomainError::InvalidStatusTransition { .. } => StatusCode::BAD_REQUEST,
        DomainError::Store(_) | DomainError::Gateway(_) | DomainError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(msg) | ApiError::Unauthorized(msg) | ApiError::Forbidden(msg) => {
                msg
            }
            ApiError::Domain(err) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = %err, "internal server error");
                "Internal server error".to_string()
            }
            ApiError::Domain(err) => err.to_string(),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                "Internal server error".to_string()
            }
        };

        let body = serde_json::json!({ "status": "error", "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

#[cfg(test)]
mod tests {
    use domain::{Money, OrderStatus};

    use super::*;

    #[test]
    fn business_rule_violations_are_bad_requests() {
        for err in [
            DomainError::EmptyCart,
            DomainError::PriceChanged { product: "p".to_string() },
            DomainError::InsufficientStock { product: "p".to_string() },
            DomainError::AmountMismatch {
                expected: Money::from_cents(1),
                paid: Money::from_cents(2),
            },
            DomainError::Conflict("dup".to_string()),
            DomainError::InvalidSignature,
            DomainError::InvalidToken,
            DomainError::InvalidStatusTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Pending,
            },
        ] {
            assert_eq!(ApiError::from(err).status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn auth_and_lookup_statuses() {
        assert_eq!(
            ApiError::from(DomainError::InvalidCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(DomainError::EmailNotVerified).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(DomainError::Forbidden("no".to_string())).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(DomainError::not_found("Order")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(DomainError::Internal("boom".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
