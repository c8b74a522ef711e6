use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Request-level error taxonomy. Every variant resolves to an HTTP error
/// response; nothing here is fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} already registered")]
    Duplicate(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    Unauthenticated(String),
    #[error("Invalid OTP.")]
    InvalidOtp,
    #[error("OTP expired. Request a new one.")]
    ExpiredOtp,
    #[error("Failed to send OTP email: {0}")]
    Delivery(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::Duplicate(_)
            | ApiError::NotFound(_)
            | ApiError::InvalidCredentials
            | ApiError::InvalidOtp
            | ApiError::ExpiredOtp
            | ApiError::Delivery(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the logs, not the response body.
        let message = match &self {
            ApiError::Internal(e) => {
                error!(error = %e, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                let field = match db.constraint() {
                    Some(c) if c.contains("email") => "Email",
                    Some(c) if c.contains("username") => "Username",
                    Some(c) if c.contains("phone") => "Phone number",
                    _ => "Identity",
                };
                return ApiError::Duplicate(field.to_string());
            }
        }
        ApiError::Internal(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_400() {
        for err in [
            ApiError::Validation("Passwords do not match".into()),
            ApiError::Duplicate("Email".into()),
            ApiError::NotFound("User not found.".into()),
            ApiError::InvalidCredentials,
            ApiError::InvalidOtp,
            ApiError::ExpiredOtp,
            ApiError::Delivery("connection refused".into()),
        ] {
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn unauthenticated_maps_to_401() {
        let err = ApiError::Unauthenticated("Missing Authorization header".into());
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn internal_maps_to_500() {
        let err = ApiError::Internal(anyhow::anyhow!("boom"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn messages_match_wire_contract() {
        assert_eq!(ApiError::InvalidCredentials.to_string(), "Invalid credentials");
        assert_eq!(ApiError::InvalidOtp.to_string(), "Invalid OTP.");
        assert_eq!(
            ApiError::ExpiredOtp.to_string(),
            "OTP expired. Request a new one."
        );
        assert_eq!(
            ApiError::Duplicate("Email".into()).to_string(),
            "Email already registered"
        );
    }
}
