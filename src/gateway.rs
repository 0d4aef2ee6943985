//! Payment gateway client
//!
//! All outbound traffic to the card-payment gateway goes through
//! `GatewayClient`. Calls are synchronous from the handler's point of view,
//! bounded by a 30-second client timeout. HTTP-status failures and transport
//! failures are classified into `GatewayError`, a fixed vocabulary with
//! stable codes so callers can decide retry vs. abort.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

const GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub api_version: String,
    pub webhook_secret: String,
    /// "sandbox" or "production"; echoed back to clients so the frontend SDK
    /// can pick the matching environment.
    pub mode: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway rejected the request: {0}")]
    BadRequest(String),
    #[error("gateway credentials were rejected")]
    Unauthorized,
    #[error("gateway object not found")]
    NotFound,
    #[error("gateway reported a conflict")]
    Conflict,
    #[error("gateway validation failed: {0}")]
    Validation(String),
    #[error("gateway rate limit exceeded")]
    RateLimited,
    #[error("gateway internal error")]
    Internal,
    #[error("bad gateway response")]
    BadGateway,
    #[error("unexpected gateway status {0}")]
    Unknown(u16),
    #[error("gateway call timed out")]
    Timeout,
    #[error("could not connect to gateway")]
    ConnectionFailed,
    #[error("gateway transport error: {0}")]
    Transport(String),
    #[error("gateway returned an unreadable response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "GATEWAY_BAD_REQUEST",
            GatewayError::Unauthorized => "GATEWAY_UNAUTHORIZED",
            GatewayError::NotFound => "GATEWAY_NOT_FOUND",
            GatewayError::Conflict => "GATEWAY_CONFLICT",
            GatewayError::Validation(_) => "GATEWAY_VALIDATION",
            GatewayError::RateLimited => "GATEWAY_RATE_LIMITED",
            GatewayError::Internal => "GATEWAY_INTERNAL",
            GatewayError::BadGateway => "GATEWAY_BAD_GATEWAY",
            GatewayError::Unknown(_) => "GATEWAY_UNKNOWN",
            GatewayError::Timeout => "GATEWAY_TIMEOUT",
            GatewayError::ConnectionFailed => "GATEWAY_UNREACHABLE",
            GatewayError::Transport(_) => "GATEWAY_TRANSPORT",
            GatewayError::InvalidResponse(_) => "GATEWAY_BAD_RESPONSE",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::RateLimited
                | GatewayError::Internal
                | GatewayError::BadGateway
                | GatewayError::Timeout
                | GatewayError::ConnectionFailed
        )
    }

    fn from_status(status: u16, message: String) -> Self {
        match status {
            400 => GatewayError::BadRequest(message),
            401 | 403 => GatewayError::Unauthorized,
            404 => GatewayError::NotFound,
            409 => GatewayError::Conflict,
            422 => GatewayError::Validation(message),
            429 => GatewayError::RateLimited,
            500 => GatewayError::Internal,
            502 | 503 | 504 => GatewayError::BadGateway,
            other => GatewayError::Unknown(other),
        }
    }

    fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_connect() {
            GatewayError::ConnectionFailed
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Request body for gateway order creation.
#[derive(Debug, Serialize)]
pub struct CreateGatewayOrder {
    pub order_id: String,
    pub order_currency: String,
    /// Major units with two decimals; the gateway API speaks decimal amounts.
    pub order_amount: f64,
    pub customer_details: GatewayCustomer,
    pub order_meta: GatewayOrderMeta,
    pub order_note: String,
}

#[derive(Debug, Serialize)]
pub struct GatewayCustomer {
    pub customer_id: String,
    pub customer_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    pub customer_phone: String,
}

#[derive(Debug, Serialize)]
pub struct GatewayOrderMeta {
    pub return_url: String,
    pub notify_url: String,
}

/// Result of gateway order creation: the session id the client SDK needs,
/// plus the untouched response body for the audit blob.
#[derive(Debug)]
pub struct GatewayOrderCreated {
    pub payment_session_id: String,
    pub raw: Value,
}

/// Card fields relayed to the gateway's charge endpoint. Presence is checked
/// at the API boundary; no format validation beyond that.
#[derive(Debug, Serialize)]
pub struct CardDetails {
    pub card_number: String,
    pub card_expiry_mm: String,
    pub card_expiry_yy: String,
    pub card_cvv: String,
    pub card_holder_name: String,
}

/// Outcome of a card charge attempt.
#[derive(Debug)]
pub enum ChargeOutcome {
    /// Gateway demands step-up authentication; the client must collect an
    /// OTP and submit it to this URL.
    OtpRequired { otp_url: String },
    Succeeded { transaction_id: Option<String> },
    Failed { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpSignal {
    Success,
    Failed,
    /// None of the known signals present; caller falls back to a status poll.
    Ambiguous,
}

/// Map the OTP submission response onto one outcome. The gateway signals
/// success through any of three alternative shapes (`payment_status`,
/// `authenticate_status`, or `action: COMPLETE`); explicit FAILED in either
/// status field means failure; anything else is ambiguous.
pub fn interpret_otp(body: &Value) -> OtpSignal {
    let field = |name: &str| body.get(name).and_then(Value::as_str).unwrap_or("");
    if field("payment_status").eq_ignore_ascii_case("SUCCESS")
        || field("authenticate_status").eq_ignore_ascii_case("SUCCESS")
        || field("action").eq_ignore_ascii_case("COMPLETE")
    {
        OtpSignal::Success
    } else if field("payment_status").eq_ignore_ascii_case("FAILED")
        || field("authenticate_status").eq_ignore_ascii_case("FAILED")
    {
        OtpSignal::Failed
    } else {
        OtpSignal::Ambiguous
    }
}

/// Gateway's view of an order: the status vocabulary plus the untouched body.
#[derive(Debug)]
pub struct GatewayOrderInfo {
    pub order_status: String,
    pub raw: Value,
}

#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    cfg: GatewayConfig,
}

impl GatewayClient {
    pub fn new(cfg: GatewayConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(GATEWAY_TIMEOUT).build()?;
        Ok(Self { http, cfg })
    }

    fn auth_headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("x-api-version", &self.cfg.api_version)
            .header("x-client-id", &self.cfg.client_id)
            .header("x-client-secret", &self.cfg.client_secret)
    }

    async fn read_json(resp: reqwest::Response) -> Result<Value, GatewayError> {
        let status = resp.status().as_u16();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        if (200..300).contains(&status) {
            Ok(body)
        } else {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error from payment gateway")
                .to_string();
            Err(GatewayError::from_status(status, message))
        }
    }

    /// Open an order on the gateway and obtain a payment session id.
    pub async fn create_order(
        &self,
        req: &CreateGatewayOrder,
    ) -> Result<GatewayOrderCreated, GatewayError> {
        let url = format!("{}/orders", self.cfg.base_url);
        let resp = self
            .auth_headers(self.http.post(&url))
            .json(req)
            .send()
            .await
            .map_err(|e| GatewayError::from_transport(&e))?;
        let body = Self::read_json(resp).await?;
        let payment_session_id = body
            .get("payment_session_id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                GatewayError::InvalidResponse("missing payment_session_id".to_string())
            })?
            .to_string();
        Ok(GatewayOrderCreated {
            payment_session_id,
            raw: body,
        })
    }

    /// Fetch the gateway's view of an order.
    pub async fn order_status(
        &self,
        gateway_order_id: &str,
    ) -> Result<GatewayOrderInfo, GatewayError> {
        let url = format!("{}/orders/{}", self.cfg.base_url, gateway_order_id);
        let resp = self
            .auth_headers(self.http.get(&url))
            .send()
            .await
            .map_err(|e| GatewayError::from_transport(&e))?;
        let body = Self::read_json(resp).await?;
        let order_status = body
            .get("order_status")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        Ok(GatewayOrderInfo {
            order_status,
            raw: body,
        })
    }

    /// Submit card details against a payment session.
    pub async fn charge_card(
        &self,
        payment_session_id: &str,
        card: &CardDetails,
    ) -> Result<(ChargeOutcome, Value), GatewayError> {
        let url = format!("{}/orders/sessions", self.cfg.base_url);
        let payload = serde_json::json!({
            "payment_session_id": payment_session_id,
            "payment_method": { "card": {
                "channel": "post",
                "card_number": card.card_number,
                "card_expiry_mm": card.card_expiry_mm,
                "card_expiry_yy": card.card_expiry_yy,
                "card_cvv": card.card_cvv,
                "card_holder_name": card.card_holder_name,
            }},
        });
        let resp = self
            .auth_headers(self.http.post(&url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::from_transport(&e))?;
        let body = Self::read_json(resp).await?;
        Ok((interpret_charge(&body), body))
    }

    /// Submit an OTP to the callback URL returned by a step-up charge.
    /// Returns the raw response body; callers interpret it via `interpret_otp`.
    pub async fn submit_otp(&self, otp_url: &str, otp: &str) -> Result<Value, GatewayError> {
        let payload = serde_json::json!({ "otp": otp, "action": "SUBMIT_OTP" });
        let resp = self
            .auth_headers(self.http.post(otp_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::from_transport(&e))?;
        Self::read_json(resp).await
    }
}

/// Map the gateway's charge response onto one of the three outcomes. A
/// redirect URL in `data.url` means step-up OTP; an explicit SUCCESS payment
/// status means settled; anything else is a failure.
pub fn interpret_charge(body: &Value) -> ChargeOutcome {
    if let Some(url) = body
        .get("data")
        .and_then(|d| d.get("url"))
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
    {
        return ChargeOutcome::OtpRequired {
            otp_url: url.to_string(),
        };
    }
    let payment_status = body
        .get("payment_status")
        .and_then(Value::as_str)
        .unwrap_or("");
    if payment_status.eq_ignore_ascii_case("SUCCESS") {
        let transaction_id = body
            .get("cf_payment_id")
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
        return ChargeOutcome::Succeeded { transaction_id };
    }
    let reason = body
        .get("payment_message")
        .and_then(Value::as_str)
        .unwrap_or("payment was not accepted")
        .to_string();
    ChargeOutcome::Failed { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            GatewayError::from_status(400, "bad".into()),
            GatewayError::BadRequest(_)
        ));
        assert!(matches!(
            GatewayError::from_status(401, String::new()),
            GatewayError::Unauthorized
        ));
        assert!(matches!(
            GatewayError::from_status(409, String::new()),
            GatewayError::Conflict
        ));
        assert!(matches!(
            GatewayError::from_status(422, "v".into()),
            GatewayError::Validation(_)
        ));
        assert!(matches!(
            GatewayError::from_status(429, String::new()),
            GatewayError::RateLimited
        ));
        assert!(matches!(
            GatewayError::from_status(503, String::new()),
            GatewayError::BadGateway
        ));
        assert!(matches!(
            GatewayError::from_status(418, String::new()),
            GatewayError::Unknown(418)
        ));
    }

    #[test]
    fn test_retryable_flags() {
        assert!(GatewayError::Timeout.is_retryable());
        assert!(GatewayError::ConnectionFailed.is_retryable());
        assert!(GatewayError::RateLimited.is_retryable());
        assert!(!GatewayError::Unauthorized.is_retryable());
        assert!(!GatewayError::BadRequest("x".into()).is_retryable());
    }

    #[test]
    fn test_interpret_charge_otp_redirect() {
        let body = json!({"data": {"url": "https://gw.test/otp/abc"}});
        match interpret_charge(&body) {
            ChargeOutcome::OtpRequired { otp_url } => {
                assert_eq!(otp_url, "https://gw.test/otp/abc")
            }
            other => panic!("expected OTP redirect, got {:?}", other),
        }
    }

    #[test]
    fn test_interpret_charge_immediate_success() {
        let body = json!({"payment_status": "SUCCESS", "cf_payment_id": 992188});
        match interpret_charge(&body) {
            ChargeOutcome::Succeeded { transaction_id } => {
                assert_eq!(transaction_id.as_deref(), Some("992188"))
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_interpret_charge_failure() {
        let body = json!({"payment_status": "FAILED", "payment_message": "insufficient funds"});
        match interpret_charge(&body) {
            ChargeOutcome::Failed { reason } => assert_eq!(reason, "insufficient funds"),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_otp_union_success_shapes() {
        let shapes = [
            json!({"payment_status": "SUCCESS"}),
            json!({"authenticate_status": "SUCCESS"}),
            json!({"action": "COMPLETE"}),
            json!({"action": "complete"}),
        ];
        for shape in shapes {
            assert_eq!(interpret_otp(&shape), OtpSignal::Success, "shape {}", shape);
        }
    }

    #[test]
    fn test_otp_union_failure_and_ambiguous() {
        assert_eq!(
            interpret_otp(&json!({"payment_status": "FAILED"})),
            OtpSignal::Failed
        );
        assert_eq!(
            interpret_otp(&json!({"authenticate_status": "FAILED"})),
            OtpSignal::Failed
        );
        assert_eq!(
            interpret_otp(&json!({"channel": "otp", "action": "PENDING"})),
            OtpSignal::Ambiguous
        );
    }
}
