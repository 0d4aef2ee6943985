//! Order state machine and pricing
//!
//! Amounts are i64 minor units (paise). Totals are computed exactly once at
//! order creation and never recomputed afterwards.

use serde::{Deserialize, Serialize};

/// Order lifecycle. `pending → confirmed → shipped → delivered`, with
/// cancellation allowed from `pending` and `confirmed` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "confirmed" => Some(OrderStatus::Confirmed),
            "shipped" => Some(OrderStatus::Shipped),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, Shipped)
                | (Shipped, Delivered)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
        )
    }
}

/// Payment state carried on the order itself, distinct from the session's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderPaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
}

impl OrderPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderPaymentStatus::Pending => "pending",
            OrderPaymentStatus::Paid => "paid",
            OrderPaymentStatus::Failed => "failed",
        }
    }
}

/// Fixed pricing constants, injected from configuration.
#[derive(Clone, Copy, Debug)]
pub struct PricingPolicy {
    /// Flat shipping fee in minor units, charged below the threshold.
    pub shipping_fee: i64,
    /// Subtotal at or above which shipping is free.
    pub free_shipping_threshold: i64,
    /// Tax rate in basis points (1800 = 18%).
    pub tax_rate_bps: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    pub subtotal: i64,
    pub shipping: i64,
    pub tax: i64,
    pub discount: i64,
    pub total: i64,
}

impl PricingPolicy {
    /// total = subtotal + shipping + tax. No discount path at creation.
    pub fn quote(&self, subtotal: i64) -> OrderTotals {
        let shipping = if subtotal < self.free_shipping_threshold {
            self.shipping_fee
        } else {
            0
        };
        let tax = subtotal * self.tax_rate_bps / 10_000;
        OrderTotals {
            subtotal,
            shipping,
            tax,
            discount: 0,
            total: subtotal + shipping + tax,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PricingPolicy {
        PricingPolicy {
            shipping_fee: 5_000,
            free_shipping_threshold: 50_000,
            tax_rate_bps: 1_800,
        }
    }

    #[test]
    fn test_quote_below_free_shipping_threshold() {
        // ₹450 cart: ₹50 shipping, 18% tax, ₹581 total
        let t = policy().quote(45_000);
        assert_eq!(t.shipping, 5_000);
        assert_eq!(t.tax, 8_100);
        assert_eq!(t.total, 58_100);
    }

    #[test]
    fn test_quote_above_free_shipping_threshold() {
        // ₹600 cart: free shipping, ₹108 tax, ₹708 total
        let t = policy().quote(60_000);
        assert_eq!(t.shipping, 0);
        assert_eq!(t.tax, 10_800);
        assert_eq!(t.total, 70_800);
    }

    #[test]
    fn test_quote_at_exact_threshold_ships_free() {
        let t = policy().quote(50_000);
        assert_eq!(t.shipping, 0);
    }

    #[test]
    fn test_totals_identity() {
        for subtotal in [1, 499, 45_000, 50_000, 123_456] {
            let t = policy().quote(subtotal);
            assert_eq!(t.total, t.subtotal + t.shipping - t.discount + t.tax);
        }
    }

    #[test]
    fn test_cancel_guards() {
        assert!(OrderStatus::Pending.can_cancel());
        assert!(OrderStatus::Confirmed.can_cancel());
        assert!(!OrderStatus::Shipped.can_cancel());
        assert!(!OrderStatus::Delivered.can_cancel());
        assert!(!OrderStatus::Cancelled.can_cancel());
    }

    #[test]
    fn test_transition_matrix() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Cancelled));

        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Pending.can_transition_to(Shipped));
    }

    #[test]
    fn test_status_round_trip() {
        for s in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(OrderStatus::parse("refunded"), None);
    }
}
