use actix_web::{web, HttpResponse};
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::catalog;
use crate::checkout::form::{ContactFlow, CustomerInfo, CustomerValidationError, ValidatedCustomer};
use crate::errors::ApiError;
use crate::models::CartLine;
use crate::notify::ContactMessage;
use crate::pricing::{format_cents, parse_cents};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    #[serde(default)]
    pub items: Vec<CartLine>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub items: Vec<CartLine>,
    pub customer_info: CustomerInfo,
    #[serde(default)]
    pub contact_flow: ContactFlow,
    /// Client-side total; informational only.
    #[serde(default)]
    pub amount: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct CaptureRequest {
    #[serde(rename = "orderID", alias = "orderId")]
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(rename = "orderId", alias = "orderID")]
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PaypalDetails {
    pub id: String,
}

/// Only the payment id is trusted; the rest of the client's summary is
/// ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    pub paypal_details: PaypalDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailRequest {
    pub order_details: OrderDetails,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ContactRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[validate(length(min = 1, message = "Message is required"))]
    pub message: String,
}

fn client_amount_cents(amount: &Value) -> Option<i64> {
    match amount {
        Value::Number(n) => parse_cents(&n.to_string()),
        Value::String(s) => parse_cents(s),
        _ => None,
    }
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "healthy" }))
}

pub async fn catalog(state: web::Data<AppState>) -> HttpResponse {
    let snapshot = state.prices.fetch_prices().await;
    HttpResponse::Ok().json(json!({
        "success": true,
        "products": catalog::priced(&snapshot.prices),
        "warning": snapshot.warning,
    }))
}

pub async fn prices(state: web::Data<AppState>) -> HttpResponse {
    let snapshot = state.prices.fetch_prices().await;
    HttpResponse::Ok().json(json!({
        "success": true,
        "prices": snapshot.prices,
        "warning": snapshot.warning,
    }))
}

pub async fn quote(
    state: web::Data<AppState>,
    data: web::Json<QuoteRequest>,
) -> Result<HttpResponse, ApiError> {
    let quote = state.checkout.quote(&data.items).await?;
    Ok(HttpResponse::Ok().json(quote))
}

pub async fn create_payment(
    state: web::Data<AppState>,
    data: web::Json<CheckoutRequest>,
) -> Result<HttpResponse, ApiError> {
    let CheckoutRequest {
        items,
        customer_info,
        contact_flow,
        amount,
    } = data.into_inner();
    let customer = ValidatedCustomer::new(customer_info, contact_flow)?;

    let created = state.checkout.create_payment(&items, customer).await?;

    if let Some(claimed) = amount.as_ref().and_then(client_amount_cents) {
        if claimed != created.total_cents {
            warn!(
                "Client total {} ignored for payment {}; charged {}",
                format_cents(claimed),
                created.order_id,
                format_cents(created.total_cents)
            );
        }
    }

    Ok(HttpResponse::Ok().json(json!({
        "orderId": created.order_id,
        "amount": format_cents(created.total_cents),
        "currency": state.checkout.currency(),
        "excluded": created.quote.excluded,
    })))
}

pub async fn capture_payment(
    state: web::Data<AppState>,
    data: web::Json<CaptureRequest>,
) -> Result<HttpResponse, ApiError> {
    let finalized = state.checkout.capture(&data.order_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "captureId": finalized.capture.capture_id,
        "status": finalized.capture.status,
        "orderID": finalized.order.id,
        "order": finalized.order,
        "alreadyRecorded": finalized.already_recorded,
        "notifications": finalized.notifications,
    })))
}

pub async fn verify_payment(
    state: web::Data<AppState>,
    data: web::Json<VerifyRequest>,
) -> Result<HttpResponse, ApiError> {
    let result = state.checkout.verify(&data.order_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "order": result })))
}

pub async fn send_email(
    state: web::Data<AppState>,
    data: web::Json<SendEmailRequest>,
) -> Result<HttpResponse, ApiError> {
    let order_id = &data.order_details.paypal_details.id;
    let finalized = state.checkout.finalize(order_id).await?;
    let message = if finalized.already_recorded {
        "Order already recorded"
    } else {
        "Emails sent successfully"
    };
    Ok(HttpResponse::Ok().json(json!({
        "message": message,
        "order": finalized.order,
        "notifications": finalized.notifications,
    })))
}

pub async fn place_order(
    state: web::Data<AppState>,
    data: web::Json<CheckoutRequest>,
) -> Result<HttpResponse, ApiError> {
    let CheckoutRequest {
        items,
        customer_info,
        contact_flow,
        ..
    } = data.into_inner();
    let customer = ValidatedCustomer::new(customer_info, contact_flow)?;
    let (order, notifications) = state.checkout.place_manual_order(&items, customer).await?;
    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "order": order,
        "notifications": notifications,
    })))
}

pub async fn contact(
    state: web::Data<AppState>,
    data: web::Json<ContactRequest>,
) -> Result<HttpResponse, ApiError> {
    if let Err(errors) = data.validate() {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let messages = errs
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();
        return Err(CustomerValidationError { fields }.into());
    }

    let request = data.into_inner();
    let message = ContactMessage {
        name: request.name,
        email: request.email,
        subject: request.subject,
        message: request.message,
    };
    let settings = state.checkout.email_settings().await;
    state.notifier.send_contact_message(&message, &settings).await?;
    info!("Forwarded contact message from {}", message.email);
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Email sent successfully",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_amounts_parse_from_numbers_and_strings() {
        assert_eq!(client_amount_cents(&json!(97.17)), Some(9717));
        assert_eq!(client_amount_cents(&json!("97.17")), Some(9717));
        assert_eq!(client_amount_cents(&json!(null)), None);
        assert_eq!(client_amount_cents(&json!("abc")), None);
    }

    #[test]
    fn checkout_request_accepts_cart_items() {
        let raw = json!({
            "items": [{"cartId": "c1", "productId": "car-basic", "title": "Basic Car Report", "price": 0.01, "quantity": 3}],
            "customerInfo": {"fullName": "Jane", "email": "jane@example.com", "vinNumber": "1HGCM82633A004352"},
            "amount": "0.03"
        });
        let request: CheckoutRequest = serde_json::from_value(raw).expect("parse");
        assert_eq!(request.items, vec![CartLine::new("car-basic", 3)]);
        assert_eq!(request.contact_flow, ContactFlow::Email);
    }
}
