//! Payment gateway adapter endpoints
//!
//! Bridges order state to the external card-payment gateway. Success can
//! arrive over four independent entry points (synchronous card response, OTP
//! verification, client status poll, gateway webhook) racing each other with
//! no coordination beyond the database. All four funnel through
//! `settle_payment`, which writes the same terminal values, so repeated or
//! out-of-order delivery converges; duplicate history rows are cosmetic.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::domain::order::{OrderPaymentStatus, OrderStatus};
use crate::domain::payment::{GatewayOrderStatus, SessionStatus, SettlementSource};
use crate::error::ApiError;
use crate::events::{subjects, PaymentEvent};
use crate::gateway::{
    CardDetails, ChargeOutcome, CreateGatewayOrder, GatewayCustomer, GatewayOrderMeta, OtpSignal,
};
use crate::routes::orders::Order;
use crate::state::AppState;

const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentSession {
    pub id: Uuid,
    pub order_id: Uuid,
    pub gateway_order_id: String,
    pub gateway_session_id: String,
    pub payment_status: String,
    pub transaction_id: Option<String>,
    pub gateway_response: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub async fn list_sessions(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<PaymentSession>>, ApiError> {
    let rows = sqlx::query_as::<_, PaymentSession>(
        "SELECT ps.* FROM payment_sessions ps \
         JOIN orders o ON o.id = ps.order_id \
         WHERE o.user_id = $1 ORDER BY ps.created_at DESC",
    )
    .bind(user_id)
    .fetch_all(&s.db)
    .await?;
    Ok(Json(rows))
}

pub async fn get_session(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentSession>, ApiError> {
    let row = sqlx::query_as::<_, PaymentSession>(
        "SELECT ps.* FROM payment_sessions ps \
         JOIN orders o ON o.id = ps.order_id \
         WHERE ps.id = $1 AND o.user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(&s.db)
    .await?
    .ok_or(ApiError::NotFound("payment session"))?;
    Ok(Json(row))
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub order_id: Uuid,
    pub return_url: Option<String>,
    pub notify_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub payment_session_id: String,
    pub gateway_order_id: String,
    pub order_amount: f64,
    pub order_currency: String,
    pub return_url: String,
    pub gateway_mode: String,
}

pub async fn create_session(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(r): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    let order = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE id = $1 AND user_id = $2",
    )
    .bind(r.order_id)
    .bind(user_id)
    .fetch_optional(&s.db)
    .await?
    .ok_or(ApiError::NotFound("order"))?;

    let return_url = r
        .return_url
        .unwrap_or_else(|| format!("{}/payment/success/", s.config.public_base_url));
    let notify_url = r
        .notify_url
        .unwrap_or_else(|| format!("{}/api/v1/payments/webhook", s.config.public_base_url));

    // Idempotency guard: a live session is returned unchanged instead of
    // opening a duplicate gateway order.
    let existing = sqlx::query_as::<_, PaymentSession>(
        "SELECT * FROM payment_sessions WHERE order_id = $1",
    )
    .bind(order.id)
    .fetch_optional(&s.db)
    .await?;
    if let Some(session) = &existing {
        let reusable = SessionStatus::parse(&session.payment_status)
            .map(|st| st.is_reusable())
            .unwrap_or(false);
        if reusable {
            return Ok(Json(CreateSessionResponse {
                payment_session_id: session.gateway_session_id.clone(),
                gateway_order_id: session.gateway_order_id.clone(),
                order_amount: to_major_units(order.total_amount),
                order_currency: s.config.currency.clone(),
                return_url,
                gateway_mode: s.config.gateway.mode.clone(),
            }));
        }
    }

    // Random suffix so a retry after a terminal session cannot collide with
    // the id already registered at the gateway.
    let gateway_order_id = format!(
        "ORDER_{}_{:08x}",
        order.order_number,
        rand::random::<u32>()
    );

    let created = s
        .gateway
        .create_order(&CreateGatewayOrder {
            order_id: gateway_order_id.clone(),
            order_currency: s.config.currency.clone(),
            order_amount: to_major_units(order.total_amount),
            customer_details: GatewayCustomer {
                customer_id: user_id.to_string(),
                customer_name: order.shipping_name.clone(),
                customer_email: None,
                customer_phone: order.shipping_mobile.clone(),
            },
            order_meta: GatewayOrderMeta {
                return_url: return_url.clone(),
                notify_url,
            },
            order_note: format!("Payment for order {}", order.order_number),
        })
        .await?;

    sqlx::query(
        "INSERT INTO payment_sessions \
            (id, order_id, gateway_order_id, gateway_session_id, payment_status, gateway_response, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, 'created', $5, NOW(), NOW()) \
         ON CONFLICT (order_id) DO UPDATE SET \
            gateway_order_id = EXCLUDED.gateway_order_id, \
            gateway_session_id = EXCLUDED.gateway_session_id, \
            payment_status = 'created', \
            gateway_response = EXCLUDED.gateway_response, \
            updated_at = NOW()",
    )
    .bind(Uuid::now_v7())
    .bind(order.id)
    .bind(&gateway_order_id)
    .bind(&created.payment_session_id)
    .bind(&created.raw)
    .execute(&s.db)
    .await?;

    Ok(Json(CreateSessionResponse {
        payment_session_id: created.payment_session_id,
        gateway_order_id,
        order_amount: to_major_units(order.total_amount),
        order_currency: s.config.currency.clone(),
        return_url,
        gateway_mode: s.config.gateway.mode.clone(),
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CardPaymentRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub payment_session_id: String,
    #[validate]
    pub card: CardData,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CardData {
    #[validate(length(min = 1, message = "is required"))]
    pub number: String,
    #[validate(length(min = 1, message = "is required"))]
    pub expiry_month: String,
    #[validate(length(min = 1, message = "is required"))]
    pub expiry_year: String,
    #[validate(length(min = 1, message = "is required"))]
    pub cvv: String,
    #[validate(length(min = 1, message = "is required"))]
    pub holder_name: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CardPaymentResponse {
    /// Step-up authentication: the client collects an OTP and submits it to
    /// `otp_url` via the verify-otp endpoint.
    OtpRequired { otp_url: String },
    Paid { order_id: Uuid },
}

pub async fn process_card_payment(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(r): Json<CardPaymentRequest>,
) -> Result<Json<CardPaymentResponse>, ApiError> {
    r.validate()?;

    let session = session_for_user(&s, user_id, &r.payment_session_id).await?;

    let card = CardDetails {
        card_number: r.card.number.clone(),
        card_expiry_mm: r.card.expiry_month.clone(),
        card_expiry_yy: r.card.expiry_year.clone(),
        card_cvv: r.card.cvv.clone(),
        card_holder_name: r.card.holder_name.clone(),
    };
    let (outcome, raw) = s.gateway.charge_card(&r.payment_session_id, &card).await?;

    match outcome {
        ChargeOutcome::OtpRequired { otp_url } => {
            Ok(Json(CardPaymentResponse::OtpRequired { otp_url }))
        }
        ChargeOutcome::Succeeded { transaction_id } => {
            settle_payment(
                &s,
                &session,
                SettlementSource::Card,
                transaction_id.as_deref(),
                Some(&raw),
                user_id,
            )
            .await?;
            Ok(Json(CardPaymentResponse::Paid {
                order_id: session.order_id,
            }))
        }
        ChargeOutcome::Failed { reason } => Err(ApiError::PaymentFailed(reason)),
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(url(message = "must be a URL"))]
    pub otp_url: String,
    #[validate(length(equal = 6, message = "must be 6 digits"))]
    pub otp: String,
    #[validate(length(min = 1, message = "is required"))]
    pub payment_session_id: String,
}

pub async fn verify_otp(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(r): Json<VerifyOtpRequest>,
) -> Result<Json<CardPaymentResponse>, ApiError> {
    r.validate()?;

    let session = session_for_user(&s, user_id, &r.payment_session_id).await?;

    let resp = s.gateway.submit_otp(&r.otp_url, &r.otp).await?;
    let signal = match crate::gateway::interpret_otp(&resp) {
        // The response shape is not fully determined; when none of the known
        // signals is present, ask the gateway directly before giving up.
        OtpSignal::Ambiguous => {
            let info = s.gateway.order_status(&session.gateway_order_id).await?;
            match GatewayOrderStatus::parse(&info.order_status) {
                GatewayOrderStatus::Paid => OtpSignal::Success,
                _ => OtpSignal::Failed,
            }
        }
        resolved => resolved,
    };

    match signal {
        OtpSignal::Success => {
            settle_payment(
                &s,
                &session,
                SettlementSource::Otp,
                None,
                Some(&resp),
                user_id,
            )
            .await?;
            Ok(Json(CardPaymentResponse::Paid {
                order_id: session.order_id,
            }))
        }
        _ => Err(ApiError::PaymentFailed(
            "OTP verification failed".to_string(),
        )),
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub payment_status: String,
    pub order_status: String,
    pub gateway_order_id: String,
    pub order_details: Value,
}

pub async fn get_payment_status(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(gateway_order_id): Path<String>,
) -> Result<Json<PaymentStatusResponse>, ApiError> {
    let session = sqlx::query_as::<_, PaymentSession>(
        "SELECT ps.* FROM payment_sessions ps \
         JOIN orders o ON o.id = ps.order_id \
         WHERE ps.gateway_order_id = $1 AND o.user_id = $2",
    )
    .bind(&gateway_order_id)
    .bind(user_id)
    .fetch_optional(&s.db)
    .await?
    .ok_or(ApiError::NotFound("payment session"))?;

    let info = s.gateway.order_status(&gateway_order_id).await?;
    let gateway_status = GatewayOrderStatus::parse(&info.order_status);

    let payment_status = match gateway_status.session_status() {
        Some(SessionStatus::Success) => {
            settle_payment(
                &s,
                &session,
                SettlementSource::StatusPoll,
                None,
                Some(&info.raw),
                user_id,
            )
            .await?;
            SessionStatus::Success
        }
        Some(status) => {
            sqlx::query(
                "UPDATE payment_sessions SET payment_status = $2, gateway_response = $3, updated_at = NOW() \
                 WHERE id = $1",
            )
            .bind(session.id)
            .bind(status.as_str())
            .bind(&info.raw)
            .execute(&s.db)
            .await?;
            if status == SessionStatus::Failed {
                s.events
                    .publish(
                        subjects::PAYMENT_FAILED,
                        &PaymentEvent {
                            order_id: session.order_id,
                            gateway_order_id: session.gateway_order_id.clone(),
                            transaction_id: None,
                        },
                    )
                    .await;
            }
            status
        }
        None => {
            // Unrecognized gateway vocabulary: persist the blob, change nothing.
            sqlx::query(
                "UPDATE payment_sessions SET gateway_response = $2, updated_at = NOW() WHERE id = $1",
            )
            .bind(session.id)
            .bind(&info.raw)
            .execute(&s.db)
            .await?;
            SessionStatus::parse(&session.payment_status).unwrap_or(SessionStatus::Pending)
        }
    };

    Ok(Json(PaymentStatusResponse {
        payment_status: payment_status.as_str().to_string(),
        order_status: info.order_status.to_lowercase(),
        gateway_order_id,
        order_details: info.raw,
    }))
}

/// Gateway webhook ingestion. Unauthenticated route: the gateway cannot
/// present caller credentials, so authenticity rests on the HMAC signature.
/// Every delivery is persisted to the audit log before interpretation.
pub async fn payment_webhook(
    State(s): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Validation(format!("invalid webhook payload: {}", e)))?;

    let gateway_order_id = payload
        .pointer("/order/order_id")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let event_type = payload
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    // Persist-first: no delivery is ever silently lost, signed or not.
    let webhook_id: (Uuid,) = sqlx::query_as(
        "INSERT INTO payment_webhooks (id, gateway_order_id, event_type, payload, created_at) \
         VALUES ($1, $2, $3, $4, NOW()) RETURNING id",
    )
    .bind(Uuid::now_v7())
    .bind(&gateway_order_id)
    .bind(&event_type)
    .bind(&payload)
    .fetch_one(&s.db)
    .await?;

    let timestamp = header_str(&headers, "x-webhook-timestamp");
    let signature = header_str(&headers, "x-webhook-signature");
    if !verify_webhook_signature(
        &s.config.gateway.webhook_secret,
        timestamp,
        &body,
        signature,
        Utc::now().timestamp(),
    ) {
        tracing::warn!(%gateway_order_id, %event_type, "webhook signature rejected");
        return Err(ApiError::Unauthorized);
    }

    match event_type.as_str() {
        "PAYMENT_SUCCESS_WEBHOOK" => {
            let session = sqlx::query_as::<_, PaymentSession>(
                "SELECT * FROM payment_sessions WHERE gateway_order_id = $1",
            )
            .bind(&gateway_order_id)
            .fetch_optional(&s.db)
            .await?;
            match session {
                Some(session) => {
                    let transaction_id = payload
                        .pointer("/payment/cf_payment_id")
                        .and_then(|v| match v {
                            Value::String(v) => Some(v.clone()),
                            Value::Number(n) => Some(n.to_string()),
                            _ => None,
                        });
                    // created_by: the order owner; the gateway has no actor id.
                    let owner: (Uuid,) =
                        sqlx::query_as("SELECT user_id FROM orders WHERE id = $1")
                            .bind(session.order_id)
                            .fetch_one(&s.db)
                            .await?;
                    settle_payment(
                        &s,
                        &session,
                        SettlementSource::Webhook,
                        transaction_id.as_deref(),
                        Some(&payload),
                        owner.0,
                    )
                    .await?;
                    mark_webhook_processed(&s, webhook_id.0).await?;
                }
                None => {
                    // Session may belong to a flow this instance never saw;
                    // the sender cannot act on an error, so drop quietly.
                    tracing::info!(%gateway_order_id, "webhook for unknown payment session ignored");
                }
            }
        }
        "PAYMENT_FAILED_WEBHOOK" => {
            // Policy: a failed payment marks only the session. The order
            // stays pending so the customer can retry or support reconcile.
            let session = sqlx::query_as::<_, PaymentSession>(
                "SELECT * FROM payment_sessions WHERE gateway_order_id = $1",
            )
            .bind(&gateway_order_id)
            .fetch_optional(&s.db)
            .await?;
            match session {
                Some(session) => {
                    sqlx::query(
                        "UPDATE payment_sessions SET payment_status = 'failed', gateway_response = $2, updated_at = NOW() \
                         WHERE id = $1",
                    )
                    .bind(session.id)
                    .bind(&payload)
                    .execute(&s.db)
                    .await?;
                    mark_webhook_processed(&s, webhook_id.0).await?;
                    s.events
                        .publish(
                            subjects::PAYMENT_FAILED,
                            &PaymentEvent {
                                order_id: session.order_id,
                                gateway_order_id: gateway_order_id.clone(),
                                transaction_id: None,
                            },
                        )
                        .await;
                }
                None => {
                    tracing::info!(%gateway_order_id, "webhook for unknown payment session ignored");
                }
            }
        }
        other => {
            tracing::debug!(event_type = other, "unhandled webhook event type stored");
        }
    }

    Ok(Json(serde_json::json!({ "status": "success" })))
}

async fn mark_webhook_processed(s: &AppState, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE payment_webhooks SET processed = TRUE WHERE id = $1")
        .bind(id)
        .execute(&s.db)
        .await?;
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// The convergence point for all four success paths. Session and order move
/// in one transaction; every caller writes the same terminal values, so
/// concurrent settlement attempts differ only in duplicated history rows.
async fn settle_payment(
    s: &AppState,
    session: &PaymentSession,
    source: SettlementSource,
    transaction_id: Option<&str>,
    gateway_response: Option<&Value>,
    actor: Uuid,
) -> Result<(), ApiError> {
    let mut tx = s.db.begin().await?;

    sqlx::query(
        "UPDATE payment_sessions SET payment_status = $2, \
            transaction_id = COALESCE($3, transaction_id), \
            gateway_response = COALESCE($4, gateway_response), \
            updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(session.id)
    .bind(SessionStatus::Success.as_str())
    .bind(transaction_id)
    .bind(gateway_response)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE orders SET payment_status = $2, status = $3, updated_at = NOW() WHERE id = $1",
    )
    .bind(session.order_id)
    .bind(OrderPaymentStatus::Paid.as_str())
    .bind(OrderStatus::Confirmed.as_str())
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO order_status_history (id, order_id, status, notes, created_by, created_at) \
         VALUES ($1, $2, $3, $4, $5, NOW())",
    )
    .bind(Uuid::now_v7())
    .bind(session.order_id)
    .bind(OrderStatus::Confirmed.as_str())
    .bind(source.history_note())
    .bind(actor)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    s.events
        .publish(
            subjects::PAYMENT_SETTLED,
            &PaymentEvent {
                order_id: session.order_id,
                gateway_order_id: session.gateway_order_id.clone(),
                transaction_id: transaction_id.map(str::to_string),
            },
        )
        .await;

    Ok(())
}

async fn session_for_user(
    s: &AppState,
    user_id: Uuid,
    gateway_session_id: &str,
) -> Result<PaymentSession, ApiError> {
    sqlx::query_as::<_, PaymentSession>(
        "SELECT ps.* FROM payment_sessions ps \
         JOIN orders o ON o.id = ps.order_id \
         WHERE ps.gateway_session_id = $1 AND o.user_id = $2",
    )
    .bind(gateway_session_id)
    .bind(user_id)
    .fetch_optional(&s.db)
    .await?
    .ok_or(ApiError::NotFound("payment session"))
}

fn to_major_units(minor: i64) -> f64 {
    minor as f64 / 100.0
}

/// HMAC-SHA256 over `timestamp + raw body`, base64-encoded. Constant-time
/// comparison via `Mac::verify_slice`; deliveries older than the tolerance
/// window are rejected to block replays.
pub fn verify_webhook_signature(
    secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now_epoch_secs: i64,
) -> bool {
    if timestamp.is_empty() || signature.is_empty() {
        return false;
    }
    let Ok(ts) = timestamp.parse::<i64>() else {
        return false;
    };
    if (now_epoch_secs - ts).abs() > WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
        return false;
    }
    let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(signature) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(timestamp.as_bytes());
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123";

    fn sign(timestamp: &str, body: &[u8], secret: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.as_bytes());
        mac.update(body);
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature_accepted() {
        let body = br#"{"type":"PAYMENT_SUCCESS_WEBHOOK"}"#;
        let now = 1_700_000_000;
        let ts = now.to_string();
        let sig = sign(&ts, body, SECRET);
        assert!(verify_webhook_signature(SECRET, &ts, body, &sig, now));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = br#"{"type":"PAYMENT_SUCCESS_WEBHOOK"}"#;
        let now = 1_700_000_000;
        let ts = now.to_string();
        let sig = sign(&ts, body, "some_other_secret");
        assert!(!verify_webhook_signature(SECRET, &ts, body, &sig, now));
    }

    #[test]
    fn test_modified_payload_rejected() {
        let now = 1_700_000_000;
        let ts = now.to_string();
        let sig = sign(&ts, br#"{"amount":100}"#, SECRET);
        assert!(!verify_webhook_signature(
            SECRET,
            &ts,
            br#"{"amount":999}"#,
            &sig,
            now
        ));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let body = b"{}";
        let now = 1_700_000_000;
        let ts = (now - 600).to_string();
        let sig = sign(&ts, body, SECRET);
        assert!(!verify_webhook_signature(SECRET, &ts, body, &sig, now));
    }

    #[test]
    fn test_missing_headers_rejected() {
        assert!(!verify_webhook_signature(SECRET, "", b"{}", "", 0));
        assert!(!verify_webhook_signature(
            SECRET,
            "not-a-number",
            b"{}",
            "c2ln",
            0
        ));
    }
}
