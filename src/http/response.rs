//! Error to response mapping.
//!
//! Authorization and quota rejections are both reported as 403 Forbidden so
//! clients see a permission outcome, not a server fault.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::GatewayError;

pub fn status_for(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::Unauthorized { .. } | GatewayError::QuotaExceeded(_) => StatusCode::FORBIDDEN,
        GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::State(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = json!({
            "reason": status.canonical_reason().unwrap_or("Error"),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&GatewayError::Unauthorized { user: "root".into() }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status_for(&GatewayError::QuotaExceeded("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&GatewayError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&GatewayError::Launch("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
