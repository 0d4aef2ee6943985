//! Payment session vocabulary and gateway status mapping.

use serde::{Deserialize, Serialize};

/// Session state, independent of `Order.payment_status`. The two move
/// together inside the settlement transaction but carry different vocabularies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Created,
    Pending,
    Success,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::Pending => "pending",
            SessionStatus::Success => "success",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(SessionStatus::Created),
            "pending" => Some(SessionStatus::Pending),
            "success" => Some(SessionStatus::Success),
            "failed" => Some(SessionStatus::Failed),
            "cancelled" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }

    /// A session in this state is reused instead of opening a new gateway
    /// order. This is the adapter's idempotency guard.
    pub fn is_reusable(&self) -> bool {
        matches!(self, SessionStatus::Created | SessionStatus::Pending)
    }
}

/// The gateway's order_status vocabulary, as observed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOrderStatus {
    Paid,
    Active,
    Cancelled,
    Terminated,
    Other,
}

impl GatewayOrderStatus {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "paid" => GatewayOrderStatus::Paid,
            "active" => GatewayOrderStatus::Active,
            "cancelled" => GatewayOrderStatus::Cancelled,
            "terminated" => GatewayOrderStatus::Terminated,
            _ => GatewayOrderStatus::Other,
        }
    }

    /// Local session status this gateway state maps onto, if any.
    pub fn session_status(&self) -> Option<SessionStatus> {
        match self {
            GatewayOrderStatus::Paid => Some(SessionStatus::Success),
            GatewayOrderStatus::Cancelled | GatewayOrderStatus::Terminated => {
                Some(SessionStatus::Failed)
            }
            GatewayOrderStatus::Active => Some(SessionStatus::Pending),
            GatewayOrderStatus::Other => None,
        }
    }
}

/// Which entry point settled the payment. Success can arrive over four
/// independent paths; all of them converge on the same terminal order state,
/// differing only in the history note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementSource {
    Card,
    Otp,
    StatusPoll,
    Webhook,
}

impl SettlementSource {
    pub fn history_note(&self) -> &'static str {
        match self {
            SettlementSource::Card => "Payment completed successfully",
            SettlementSource::Otp => "Payment completed via OTP",
            SettlementSource::StatusPoll => "Payment completed successfully",
            SettlementSource::Webhook => "Payment completed via webhook",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_status_mapping() {
        assert_eq!(
            GatewayOrderStatus::parse("PAID").session_status(),
            Some(SessionStatus::Success)
        );
        assert_eq!(
            GatewayOrderStatus::parse("cancelled").session_status(),
            Some(SessionStatus::Failed)
        );
        assert_eq!(
            GatewayOrderStatus::parse("TERMINATED").session_status(),
            Some(SessionStatus::Failed)
        );
        assert_eq!(
            GatewayOrderStatus::parse("Active").session_status(),
            Some(SessionStatus::Pending)
        );
        assert_eq!(GatewayOrderStatus::parse("expired").session_status(), None);
    }

    #[test]
    fn test_session_reuse_guard() {
        assert!(SessionStatus::Created.is_reusable());
        assert!(SessionStatus::Pending.is_reusable());
        assert!(!SessionStatus::Success.is_reusable());
        assert!(!SessionStatus::Failed.is_reusable());
        assert!(!SessionStatus::Cancelled.is_reusable());
    }
}
