//! Order status state machine.

use serde::{Deserialize, Serialize};

use crate::{DomainError, Result};

/// The status of an order in its lifecycle.
///
/// Transitions only move forward:
/// ```text
/// Pending ──► Confirmed ──► Delivered
///    └────────────────────────▲
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,

    /// Placed and accepted; awaiting delivery.
    Confirmed,

    /// Handed to the customer (terminal state).
    Delivered,
}

impl OrderStatus {
    fn rank(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Confirmed => 1,
            OrderStatus::Delivered => 2,
        }
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        next.rank() > self.rank()
    }

    /// Validates a move to `next`.
    pub fn transition(self, next: OrderStatus) -> Result<OrderStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidStatusTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Delivered => "delivered",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
