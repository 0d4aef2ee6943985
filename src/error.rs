//! Request error taxonomy
//!
//! Every handler returns `Result<_, ApiError>`; the `IntoResponse` impl maps
//! each variant onto a status code and a JSON body carrying a stable machine
//! code, so clients can branch without string-matching messages.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Validation(String),

    /// Illegal state transition (e.g. cancelling a shipped order). A client
    /// error with a human-readable reason, never a 500.
    #[error("{0}")]
    InvalidState(String),

    /// The gateway accepted the request but the payment did not go through.
    #[error("{0}")]
    PaymentFailed(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields: Vec<String> = errors
            .field_errors()
            .iter()
            .map(|(field, errs)| {
                let reason = errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "is invalid".to_string());
                format!("{}: {}", field, reason)
            })
            .collect();
        ApiError::Validation(fields.join("; "))
    }
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Validation(_) => "VALIDATION",
            ApiError::InvalidState(_) => "INVALID_STATE",
            ApiError::PaymentFailed(_) => "PAYMENT_FAILED",
            ApiError::Gateway(e) => e.code(),
            ApiError::Database(_) | ApiError::Internal(_) => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) | ApiError::InvalidState(_) => StatusCode::BAD_REQUEST,
            ApiError::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
            ApiError::Gateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internals are logged, not leaked.
        let message = match &self {
            ApiError::Database(e) => {
                tracing::error!(error = %e, "database error");
                "An internal error occurred".to_string()
            }
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "unexpected error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let mut body = serde_json::json!({
            "success": false,
            "code": self.code(),
            "message": message,
        });
        if let ApiError::Gateway(e) = &self {
            body["retryable"] = serde_json::json!(e.is_retryable());
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::NotFound("order").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::InvalidState("cannot cancel".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::PaymentFailed("declined".into()).status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ApiError::Gateway(GatewayError::Timeout).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_gateway_codes_pass_through() {
        assert_eq!(ApiError::Gateway(GatewayError::Timeout).code(), "GATEWAY_TIMEOUT");
        assert_eq!(ApiError::NotFound("address").code(), "NOT_FOUND");
    }
}
