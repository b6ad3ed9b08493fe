//! Payment processor seam.
//!
//! A [`PaymentGateway`] only ever receives amounts the server computed. A
//! capture is treated as paid when the processor reports [`COMPLETED`] and
//! nothing else.

use async_trait::async_trait;
use log::warn;
use serde::Serialize;
use thiserror::Error;

pub mod paypal;

pub use paypal::{PayPalConfig, PayPalGateway};

pub const COMPLETED: &str = "COMPLETED";

/// What the processor reported for a capture or an order lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_id: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl CaptureResult {
    pub fn is_completed(&self) -> bool {
        self.status == COMPLETED
    }
}

#[derive(Debug, Error)]
pub enum PaymentError {
    /// The processor refused the request.
    #[error("payment processor rejected the request: {0}")]
    Rejected(String),
    #[error("invalid payment amount: {0} cents")]
    InvalidAmount(i64),
    #[error("invalid payment order id: {0:?}")]
    InvalidOrderId(String),
    #[error("payment processor unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response from payment processor: {0}")]
    UnexpectedResponse(String),
    /// The order exists but is not paid.
    #[error("payment {order_id} is {status}, not completed")]
    NotCompleted { order_id: String, status: String },
    #[error("payment {0} was already captured")]
    AlreadyCaptured(String),
    #[error("payment processing is not configured")]
    NotConfigured,
    #[error("payment processor did not answer in time")]
    Timeout,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a processor order for `amount_cents` and returns its id.
    async fn create_order(
        &self,
        amount_cents: i64,
        currency: &str,
        description: &str,
    ) -> Result<String, PaymentError>;

    /// Captures funds for an approved order.
    async fn capture_order(&self, order_id: &str) -> Result<CaptureResult, PaymentError>;

    /// Looks the order up without changing it.
    async fn get_order(&self, order_id: &str) -> Result<CaptureResult, PaymentError>;
}

/// Re-queries the processor and accepts the order only when it is completed.
pub async fn verify_order(
    gateway: &dyn PaymentGateway,
    order_id: &str,
) -> Result<CaptureResult, PaymentError> {
    let result = gateway.get_order(order_id).await?;
    if result.is_completed() {
        Ok(result)
    } else {
        warn!("Payment {} verification returned {}", order_id, result.status);
        Err(PaymentError::NotCompleted {
            order_id: order_id.to_string(),
            status: result.status,
        })
    }
}

/// Stand-in used when no processor credentials are configured.
#[derive(Debug, Default)]
pub struct DisabledGateway;

#[async_trait]
impl PaymentGateway for DisabledGateway {
    async fn create_order(&self, _: i64, _: &str, _: &str) -> Result<String, PaymentError> {
        Err(PaymentError::NotConfigured)
    }

    async fn capture_order(&self, _: &str) -> Result<CaptureResult, PaymentError> {
        Err(PaymentError::NotConfigured)
    }

    async fn get_order(&self, _: &str) -> Result<CaptureResult, PaymentError> {
        Err(PaymentError::NotConfigured)
    }
}
