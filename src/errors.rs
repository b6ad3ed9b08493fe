use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use log::error;
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;
use crate::checkout::form::{CustomerValidationError, FieldErrors};
use crate::checkout::service::CheckoutError;
use crate::notify::NotificationError;
use crate::payment::PaymentError;
use crate::pricing::PriceError;
use crate::store::RepositoryError;

const RETRY: &str = "Payment could not be completed. Please try again.";

/// Every failure an HTTP handler can report, rendered as
/// `{ "success": false, "message": ... }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Please correct the highlighted fields.")]
    Validation(FieldErrors),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Payment {order_id} is {status}, not completed.")]
    PaymentNotCompleted { order_id: String, status: String },
    #[error("{0}")]
    PaymentFailed(String),
    #[error("Payment is still being processed. Please check again shortly.")]
    PaymentPending,
    #[error("{0}")]
    Unavailable(String),
    #[error("Internal Server Error")]
    Internal,
}

impl ApiError {
    fn internal(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Internal
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) | Self::PaymentNotCompleted { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PaymentFailed(_) => StatusCode::BAD_GATEWAY,
            Self::PaymentPending => StatusCode::GATEWAY_TIMEOUT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = json!({
            "success": false,
            "message": self.to_string(),
        });
        match self {
            Self::Validation(fields) => body["errors"] = json!(fields),
            Self::PaymentNotCompleted { status, .. } => body["status"] = json!(status),
            _ => {}
        }
        HttpResponse::build(self.status_code()).json(body)
    }
}

impl From<CustomerValidationError> for ApiError {
    fn from(e: CustomerValidationError) -> Self {
        Self::Validation(e.fields)
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(id) => Self::NotFound(format!("{id} not found")),
            RepositoryError::Duplicate(id) => Self::Conflict(format!("{id} already exists")),
            other => Self::internal("Database error", other),
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::NotCompleted { order_id, status } => {
                Self::PaymentNotCompleted { order_id, status }
            }
            PaymentError::Timeout => Self::PaymentPending,
            PaymentError::NotConfigured => {
                Self::Unavailable("Payments are not available right now.".to_string())
            }
            PaymentError::InvalidAmount(_) | PaymentError::InvalidOrderId(_) => {
                Self::BadRequest(e.to_string())
            }
            other => {
                error!("Payment processor error: {}", other);
                Self::PaymentFailed(RETRY.to_string())
            }
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::Validation(e) => e.into(),
            CheckoutError::EmptyCart => Self::BadRequest(e.to_string()),
            CheckoutError::PaymentCreate(e) | CheckoutError::PaymentCapture(e) => e.into(),
            CheckoutError::Processing { .. } => Self::PaymentPending,
            CheckoutError::NotCompleted { order_id, status } => {
                Self::PaymentNotCompleted { order_id, status }
            }
            CheckoutError::UnknownCheckout(id) => {
                Self::NotFound(format!("No checkout found for payment {id}"))
            }
            CheckoutError::MissingAmount { .. } => {
                error!("{}", e);
                Self::PaymentFailed(RETRY.to_string())
            }
            CheckoutError::Pricing(e) => e.into(),
            CheckoutError::Repository(e) => e.into(),
        }
    }
}

impl From<PriceError> for ApiError {
    fn from(e: PriceError) -> Self {
        match e {
            PriceError::Store(_) => Self::internal("Price store error", e),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => Self::Unauthorized("Invalid credentials".to_string()),
            AuthError::MissingToken => {
                Self::Unauthorized("Authorization header missing".to_string())
            }
            AuthError::InvalidScheme => {
                Self::Unauthorized("Invalid authorization scheme".to_string())
            }
            AuthError::InvalidToken => Self::Unauthorized("Invalid token".to_string()),
            AuthError::Repository(e) => e.into(),
            other => Self::internal("Authentication error", other),
        }
    }
}

impl From<NotificationError> for ApiError {
    fn from(e: NotificationError) -> Self {
        error!("Mail delivery failed: {}", e);
        Self::PaymentFailed("Message could not be sent. Please try again.".to_string())
    }
}
