//! Order engine endpoints
//!
//! Orders are immutable snapshots: line items freeze the server-resolved unit
//! price at creation time, totals are computed once, and all later changes go
//! through status transitions with an append-only history trail.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::domain::order::{OrderStatus, OrderTotals};
use crate::error::ApiError;
use crate::events::{subjects, OrderEvent};
use crate::routes::addresses::Address;
use crate::routes::cart::load_cart_lines;
use crate::routes::{ListParams, PaginatedResponse};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: String,
    pub payment_status: String,
    pub payment_method: String,
    pub subtotal: i64,
    pub shipping_cost: i64,
    pub tax_amount: i64,
    pub discount_amount: i64,
    pub total_amount: i64,
    pub shipping_name: String,
    pub shipping_mobile: String,
    pub shipping_line1: String,
    pub shipping_line2: Option<String>,
    pub shipping_city: String,
    pub shipping_state: String,
    pub shipping_pincode: String,
    pub tracking_number: Option<String>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderStatusHistory {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: String,
    pub notes: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub status_history: Vec<OrderStatusHistory>,
}

/// A resolved line ready to be frozen into the order.
struct ResolvedLine {
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
    unit_price: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub address_id: Uuid,
    #[validate(custom = "validate_payment_method")]
    pub payment_method: String,
    #[serde(default)]
    pub notes: String,
    /// Explicit line items. When absent the caller's cart is used instead.
    /// Prices are always resolved server-side; the client never submits them.
    pub items: Option<Vec<CreateOrderItem>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderItem {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub quantity: i32,
}

fn validate_payment_method(value: &str) -> Result<(), validator::ValidationError> {
    match value {
        "cod" | "card" | "upi" => Ok(()),
        _ => {
            let mut err = validator::ValidationError::new("payment_method");
            err.message = Some("must be one of cod, card, upi".into());
            Err(err)
        }
    }
}

pub async fn create_order(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(r): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    r.validate()?;
    if let Some(items) = &r.items {
        for item in items {
            item.validate()?;
        }
    }

    let address = sqlx::query_as::<_, Address>(
        "SELECT * FROM addresses WHERE id = $1 AND user_id = $2",
    )
    .bind(r.address_id)
    .bind(user_id)
    .fetch_optional(&s.db)
    .await?
    .ok_or(ApiError::NotFound("address"))?;

    let from_cart = r.items.as_ref().map(|i| i.is_empty()).unwrap_or(true);
    let lines = if from_cart {
        resolve_cart_lines(&s, user_id).await?
    } else {
        resolve_explicit_lines(&s, r.items.as_deref().unwrap_or_default()).await?
    };

    let subtotal: i64 = lines
        .iter()
        .map(|l| l.unit_price * l.quantity as i64)
        .sum();
    let totals = s.config.pricing.quote(subtotal);

    let order = persist_order(&s, user_id, &address, &r, &lines, totals, from_cart).await?;

    s.events
        .publish(
            subjects::ORDER_CREATED,
            &OrderEvent {
                order_id: order.order.id,
                order_number: order.order.order_number.clone(),
                user_id,
                total_amount: order.order.total_amount,
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(order)))
}

async fn resolve_cart_lines(s: &AppState, user_id: Uuid) -> Result<Vec<ResolvedLine>, ApiError> {
    let cart = load_cart_lines(&s.db, user_id).await?;
    if cart.is_empty() {
        return Err(ApiError::Validation("cart is empty".to_string()));
    }
    Ok(cart
        .into_iter()
        .map(|l| ResolvedLine {
            product_id: l.product_id,
            variant_id: l.variant_id,
            quantity: l.quantity,
            unit_price: l.unit_price,
        })
        .collect())
}

async fn resolve_explicit_lines(
    s: &AppState,
    items: &[CreateOrderItem],
) -> Result<Vec<ResolvedLine>, ApiError> {
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let unit_price = match item.variant_id {
            Some(variant_id) => {
                sqlx::query_as::<_, (i64,)>(
                    "SELECT pv.price FROM product_variants pv \
                     JOIN products p ON p.id = pv.product_id \
                     WHERE pv.id = $1 AND pv.product_id = $2 AND p.status = 'active'",
                )
                .bind(variant_id)
                .bind(item.product_id)
                .fetch_optional(&s.db)
                .await?
                .ok_or(ApiError::NotFound("product variant"))?
                .0
            }
            None => {
                sqlx::query_as::<_, (i64,)>(
                    "SELECT price FROM products WHERE id = $1 AND status = 'active'",
                )
                .bind(item.product_id)
                .fetch_optional(&s.db)
                .await?
                .ok_or(ApiError::NotFound("product"))?
                .0
            }
        };
        lines.push(ResolvedLine {
            product_id: item.product_id,
            variant_id: item.variant_id,
            quantity: item.quantity,
            unit_price,
        });
    }
    Ok(lines)
}

/// Insert order, items and the initial history row in one transaction; the
/// cart-derived path also clears the cart inside the same transaction.
async fn persist_order(
    s: &AppState,
    user_id: Uuid,
    address: &Address,
    r: &CreateOrderRequest,
    lines: &[ResolvedLine],
    totals: OrderTotals,
    clear_cart: bool,
) -> Result<OrderResponse, ApiError> {
    let order_number = format!("ORD-{:08}", rand::random::<u32>());
    let mut tx = s.db.begin().await?;

    let order = sqlx::query_as::<_, Order>(
        "INSERT INTO orders (id, order_number, user_id, status, payment_status, payment_method, \
            subtotal, shipping_cost, tax_amount, discount_amount, total_amount, \
            shipping_name, shipping_mobile, shipping_line1, shipping_line2, shipping_city, \
            shipping_state, shipping_pincode, notes, created_at, updated_at) \
         VALUES ($1, $2, $3, 'pending', 'pending', $4, $5, $6, $7, $8, $9, \
            $10, $11, $12, $13, $14, $15, $16, $17, NOW(), NOW()) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(&order_number)
    .bind(user_id)
    .bind(&r.payment_method)
    .bind(totals.subtotal)
    .bind(totals.shipping)
    .bind(totals.tax)
    .bind(totals.discount)
    .bind(totals.total)
    .bind(&address.name)
    .bind(&address.mobile)
    .bind(&address.line1)
    .bind(&address.line2)
    .bind(&address.city)
    .bind(&address.state)
    .bind(&address.pincode)
    .bind(&r.notes)
    .fetch_one(&mut *tx)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let item = sqlx::query_as::<_, OrderItem>(
            "INSERT INTO order_items (id, order_id, product_id, variant_id, quantity, unit_price) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(order.id)
        .bind(line.product_id)
        .bind(line.variant_id)
        .bind(line.quantity)
        .bind(line.unit_price)
        .fetch_one(&mut *tx)
        .await?;
        items.push(item);
    }

    let history = sqlx::query_as::<_, OrderStatusHistory>(
        "INSERT INTO order_status_history (id, order_id, status, notes, created_by, created_at) \
         VALUES ($1, $2, 'pending', 'Order created', $3, NOW()) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(order.id)
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    if clear_cart {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(OrderResponse {
        order,
        items,
        status_history: vec![history],
    })
}

pub async fn cancel_order(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE id = $1 AND user_id = $2",
    )
    .bind(order_id)
    .bind(user_id)
    .fetch_optional(&s.db)
    .await?
    .ok_or(ApiError::NotFound("order"))?;

    let status = OrderStatus::parse(&order.status)
        .ok_or_else(|| anyhow::anyhow!("order {} has unknown status {}", order.id, order.status))?;
    if !status.can_cancel() {
        return Err(ApiError::InvalidState(format!(
            "Cannot cancel order with status {}",
            status.as_str()
        )));
    }

    let mut tx = s.db.begin().await?;
    let order = sqlx::query_as::<_, Order>(
        "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(order.id)
    .bind(OrderStatus::Cancelled.as_str())
    .fetch_one(&mut *tx)
    .await?;
    sqlx::query(
        "INSERT INTO order_status_history (id, order_id, status, notes, created_by, created_at) \
         VALUES ($1, $2, $3, 'Order cancelled by customer', $4, NOW())",
    )
    .bind(Uuid::now_v7())
    .bind(order.id)
    .bind(OrderStatus::Cancelled.as_str())
    .bind(user_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    s.events
        .publish(
            subjects::ORDER_CANCELLED,
            &OrderEvent {
                order_id: order.id,
                order_number: order.order_number.clone(),
                user_id,
                total_amount: order.total_amount,
            },
        )
        .await;

    load_order_response(&s, order).await
}

pub async fn list_orders(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(p): Query<ListParams>,
) -> Result<Json<PaginatedResponse<Order>>, ApiError> {
    let (page, per_page) = p.clamp();
    let orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(per_page as i64)
    .bind(((page - 1) * per_page) as i64)
    .fetch_all(&s.db)
    .await?;
    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&s.db)
        .await?;
    Ok(Json(PaginatedResponse {
        data: orders,
        total: total.0,
        page,
    }))
}

pub async fn get_order(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE id = $1 AND user_id = $2",
    )
    .bind(order_id)
    .bind(user_id)
    .fetch_optional(&s.db)
    .await?
    .ok_or(ApiError::NotFound("order"))?;
    load_order_response(&s, order).await
}

async fn load_order_response(
    s: &AppState,
    order: Order,
) -> Result<Json<OrderResponse>, ApiError> {
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = $1",
    )
    .bind(order.id)
    .fetch_all(&s.db)
    .await?;
    let status_history = sqlx::query_as::<_, OrderStatusHistory>(
        "SELECT * FROM order_status_history WHERE order_id = $1 ORDER BY created_at",
    )
    .bind(order.id)
    .fetch_all(&s.db)
    .await?;
    Ok(Json(OrderResponse {
        order,
        items,
        status_history,
    }))
}
