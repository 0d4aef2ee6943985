//! Per-user cart endpoints. The cart feeds the cart-derived order path;
//! prices shown here are resolved live from the catalog, never stored.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

/// Cart row joined against the catalog for display and order creation.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: i64,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartLine>,
    pub subtotal: i64,
}

pub(crate) async fn load_cart_lines(
    db: &sqlx::PgPool,
    user_id: Uuid,
) -> Result<Vec<CartLine>, sqlx::Error> {
    sqlx::query_as::<_, CartLine>(
        "SELECT ci.id, ci.product_id, ci.variant_id, p.name AS product_name, ci.quantity, \
                COALESCE(pv.price, p.price) AS unit_price \
         FROM cart_items ci \
         JOIN products p ON p.id = ci.product_id \
         LEFT JOIN product_variants pv ON pv.id = ci.variant_id \
         WHERE ci.user_id = $1 \
         ORDER BY ci.created_at",
    )
    .bind(user_id)
    .fetch_all(db)
    .await
}

pub async fn get_cart(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<CartView>, ApiError> {
    let items = load_cart_lines(&s.db, user_id).await?;
    let subtotal = items.iter().map(|i| i.unit_price * i.quantity as i64).sum();
    Ok(Json(CartView { items, subtotal }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub quantity: i32,
}

pub async fn add_to_cart(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(r): Json<AddToCartRequest>,
) -> Result<(StatusCode, Json<CartItem>), ApiError> {
    r.validate()?;

    let exists: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM products WHERE id = $1 AND status = 'active'")
            .bind(r.product_id)
            .fetch_optional(&s.db)
            .await?;
    if exists.is_none() {
        return Err(ApiError::NotFound("product"));
    }
    if let Some(variant_id) = r.variant_id {
        let variant: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM product_variants WHERE id = $1 AND product_id = $2",
        )
        .bind(variant_id)
        .bind(r.product_id)
        .fetch_optional(&s.db)
        .await?;
        if variant.is_none() {
            return Err(ApiError::NotFound("product variant"));
        }
    }

    let item = sqlx::query_as::<_, CartItem>(
        "INSERT INTO cart_items (id, user_id, product_id, variant_id, quantity, created_at) \
         VALUES ($1, $2, $3, $4, $5, NOW()) \
         ON CONFLICT (user_id, product_id, variant_id) \
         DO UPDATE SET quantity = cart_items.quantity + $5 RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .bind(r.product_id)
    .bind(r.variant_id)
    .bind(r.quantity)
    .fetch_one(&s.db)
    .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn remove_cart_item(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(&s.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("cart item"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_cart(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<StatusCode, ApiError> {
    sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
        .bind(user_id)
        .execute(&s.db)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
