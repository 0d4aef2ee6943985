//! Catalog endpoints
//!
//! Minimal product surface: enough for storefront listing and for the order
//! engine to resolve server-side prices. Rich catalog features live elsewhere.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;
use crate::routes::{ListParams, PaginatedResponse};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub price: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub variants: Vec<ProductVariant>,
}

pub async fn list_products(
    State(s): State<AppState>,
    Query(p): Query<ListParams>,
) -> Result<Json<PaginatedResponse<Product>>, ApiError> {
    let (page, per_page) = p.clamp();
    let products = sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE status = 'active' ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(per_page as i64)
    .bind(((page - 1) * per_page) as i64)
    .fetch_all(&s.db)
    .await?;
    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products WHERE status = 'active'")
        .fetch_one(&s.db)
        .await?;
    Ok(Json(PaginatedResponse {
        data: products,
        total: total.0,
        page,
    }))
}

pub async fn get_product(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProductDetail>, ApiError> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&s.db)
        .await?
        .ok_or(ApiError::NotFound("product"))?;
    let variants = sqlx::query_as::<_, ProductVariant>(
        "SELECT * FROM product_variants WHERE product_id = $1 ORDER BY created_at",
    )
    .bind(id)
    .fetch_all(&s.db)
    .await?;
    Ok(Json(ProductDetail { product, variants }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub price: i64,
    #[serde(default)]
    pub variants: Vec<CreateVariantRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVariantRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub name: String,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub price: i64,
}

pub async fn create_product(
    State(s): State<AppState>,
    Json(r): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductDetail>), ApiError> {
    r.validate()?;
    for v in &r.variants {
        v.validate()?;
    }

    let sku = format!("SKU-{:08}", rand::random::<u32>());
    let mut tx = s.db.begin().await?;
    let product = sqlx::query_as::<_, Product>(
        "INSERT INTO products (id, sku, name, description, price, currency, status, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, 'active', NOW(), NOW()) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(&sku)
    .bind(&r.name)
    .bind(&r.description)
    .bind(r.price)
    .bind(&s.config.currency)
    .fetch_one(&mut *tx)
    .await?;

    let mut variants = Vec::with_capacity(r.variants.len());
    for v in &r.variants {
        let row = sqlx::query_as::<_, ProductVariant>(
            "INSERT INTO product_variants (id, product_id, name, price, created_at) \
             VALUES ($1, $2, $3, $4, NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(product.id)
        .bind(&v.name)
        .bind(v.price)
        .fetch_one(&mut *tx)
        .await?;
        variants.push(row);
    }
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(ProductDetail { product, variants })))
}
