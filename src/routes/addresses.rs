//! Address book endpoints. Orders snapshot these rows at creation time.

use axum::extract::State;
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
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub mobile: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub created_at: DateTime<Utc>,
}

pub async fn list_addresses(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<Address>>, ApiError> {
    let rows = sqlx::query_as::<_, Address>(
        "SELECT * FROM addresses WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(&s.db)
    .await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAddressRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "is required"))]
    pub mobile: String,
    #[validate(length(min = 1, message = "is required"))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1, message = "is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "is required"))]
    pub pincode: String,
}

pub async fn create_address(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(r): Json<CreateAddressRequest>,
) -> Result<(StatusCode, Json<Address>), ApiError> {
    r.validate()?;
    let row = sqlx::query_as::<_, Address>(
        "INSERT INTO addresses (id, user_id, name, mobile, line1, line2, city, state, pincode, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW()) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .bind(&r.name)
    .bind(&r.mobile)
    .bind(&r.line1)
    .bind(&r.line2)
    .bind(&r.city)
    .bind(&r.state)
    .bind(&r.pincode)
    .fetch_one(&s.db)
    .await?;
    Ok((StatusCode::CREATED, Json(row)))
}
