//! HTTP error mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chatcast_core::CampaignError;
use serde::Serialize;
use tracing::error;

/// Error response body
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// API error wrapper implementing the HTTP mapping for pipeline errors
#[derive(Debug)]
pub struct ApiError(pub CampaignError);

impl From<CampaignError> for ApiError {
    fn from(e: CampaignError) -> Self {
        Self(e)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        Self(CampaignError::Database(e))
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            CampaignError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            CampaignError::ChannelNotFound => (StatusCode::NOT_FOUND, "channel_not_found"),
            CampaignError::TemplateNotFound => (StatusCode::NOT_FOUND, "template_not_found"),
            // A mismatched trigger key is indistinguishable from an unknown
            // one on purpose
            CampaignError::UnknownKey => (StatusCode::UNAUTHORIZED, "unauthorized"),
            CampaignError::NotActive => (StatusCode::BAD_REQUEST, "campaign_not_active"),
            CampaignError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            CampaignError::InsufficientData => (StatusCode::BAD_REQUEST, "insufficient_data"),
            CampaignError::SendingDenied => (StatusCode::FORBIDDEN, "sending_denied"),
            CampaignError::Gateway(_) => (StatusCode::BAD_GATEWAY, "gateway_error"),
            CampaignError::Database(_) | CampaignError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }

        let message = match &self.0 {
            // Internal detail stays out of responses
            CampaignError::Database(_) | CampaignError::Internal(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(ErrorResponse {
                error: code.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CampaignError::NotFound, StatusCode::NOT_FOUND),
            (CampaignError::UnknownKey, StatusCode::UNAUTHORIZED),
            (CampaignError::NotActive, StatusCode::BAD_REQUEST),
            (CampaignError::InsufficientData, StatusCode::BAD_REQUEST),
            (CampaignError::SendingDenied, StatusCode::FORBIDDEN),
            (
                CampaignError::Validation("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError(err).status_and_code().0, expected);
        }
    }
}
