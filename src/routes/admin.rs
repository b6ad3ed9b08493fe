use std::collections::BTreeMap;

use actix_web::{web, HttpResponse};
use log::info;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crate::auth;
use crate::errors::ApiError;
use crate::middleware::AdminIdentity;
use crate::models::{AuthResponse, EmailSettingsUpdate, OrderStatus, SignInInput};
use crate::state::AppState;
use crate::store::OrderListQuery;

#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    pub page: Option<usize>,
    pub status: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct PricesUpdate {
    pub prices: BTreeMap<String, Decimal>,
}

fn parse_status(value: &str) -> Result<OrderStatus, ApiError> {
    OrderStatus::parse(value)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown order status {value:?}")))
}

pub async fn login(
    state: web::Data<AppState>,
    data: web::Json<SignInInput>,
) -> Result<HttpResponse, ApiError> {
    let token = auth::login(
        state.admins.as_ref(),
        &state.tokens,
        &data.email,
        &data.password,
    )
    .await?;
    Ok(HttpResponse::Ok().json(AuthResponse { token }))
}

pub async fn list_orders(
    state: web::Data<AppState>,
    params: web::Query<OrderQuery>,
) -> Result<HttpResponse, ApiError> {
    let params = params.into_inner();
    let mut query = OrderListQuery::new().paginate(params.page.unwrap_or(1), state.page_size);
    if let Some(status) = params.status.as_deref().filter(|s| !s.is_empty() && *s != "all") {
        query = query.status(parse_status(status)?);
    }
    if let Some(search) = params.search {
        query = query.search(search);
    }

    let page = state.orders.list(&query).await?;
    Ok(HttpResponse::Ok().json(page))
}

pub async fn update_order(
    state: web::Data<AppState>,
    admin: web::ReqData<AdminIdentity>,
    id: web::Path<String>,
    data: web::Json<StatusUpdate>,
) -> Result<HttpResponse, ApiError> {
    let status = parse_status(&data.status)?;
    let order = state.orders.update_status(&id, status).await?;
    info!("{} set order {} to {}", admin.email, order.id, status.as_str());
    Ok(HttpResponse::Ok().json(json!({ "success": true, "order": order })))
}

pub async fn delete_order(
    state: web::Data<AppState>,
    admin: web::ReqData<AdminIdentity>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    state.orders.remove(&id).await?;
    info!("{} removed order {}", admin.email, id);
    Ok(HttpResponse::Ok().json(json!({ "success": true, "message": "Order deleted" })))
}

pub async fn get_prices(state: web::Data<AppState>) -> HttpResponse {
    let snapshot = state.prices.fetch_prices().await;
    HttpResponse::Ok().json(json!({
        "success": true,
        "prices": snapshot.prices,
        "warning": snapshot.warning,
    }))
}

pub async fn update_prices(
    state: web::Data<AppState>,
    admin: web::ReqData<AdminIdentity>,
    data: web::Json<PricesUpdate>,
) -> Result<HttpResponse, ApiError> {
    let prices = state.prices.update_prices(&data.prices).await?;
    info!("{} updated prices", admin.email);
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Prices updated successfully",
        "prices": prices,
    })))
}

pub async fn get_email_settings(state: web::Data<AppState>) -> HttpResponse {
    let settings = state.checkout.email_settings().await;
    HttpResponse::Ok().json(json!({ "success": true, "settings": settings }))
}

pub async fn update_email_settings(
    state: web::Data<AppState>,
    data: web::Json<EmailSettingsUpdate>,
) -> Result<HttpResponse, ApiError> {
    let settings = state
        .checkout
        .update_email_settings(data.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Email settings updated successfully",
        "settings": settings,
    })))
}
