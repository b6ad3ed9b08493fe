use std::sync::Arc;

use actix_web::web;

use crate::auth::TokenIssuer;
use crate::errors::ApiError;
use crate::middleware::AdminAuth;

pub mod admin;
pub mod storefront;

/// Malformed JSON bodies get the same error shape as every other failure.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into())
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into())
}

pub fn configure(cfg: &mut web::ServiceConfig, tokens: Arc<TokenIssuer>) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(storefront::health))
            .route("/catalog", web::get().to(storefront::catalog))
            .route("/prices", web::get().to(storefront::prices))
            .route("/quote", web::post().to(storefront::quote))
            .route(
                "/create-paypal-order",
                web::post().to(storefront::create_payment),
            )
            .route(
                "/capture-paypal-order",
                web::post().to(storefront::capture_payment),
            )
            .route(
                "/verify-paypal-order",
                web::post().to(storefront::verify_payment),
            )
            .route("/send-email", web::post().to(storefront::send_email))
            .route("/orders", web::post().to(storefront::place_order))
            .route("/contact", web::post().to(storefront::contact))
            // Registered ahead of the guarded scope so it stays public.
            .route("/admin/login", web::post().to(admin::login))
            .service(
                web::scope("/admin")
                    .wrap(AdminAuth::new(tokens))
                    .route("/orders", web::get().to(admin::list_orders))
                    .route("/orders/{id}", web::patch().to(admin::update_order))
                    .route("/orders/{id}", web::delete().to(admin::delete_order))
                    .route("/settings/prices", web::get().to(admin::get_prices))
                    .route("/settings/prices", web::post().to(admin::update_prices))
                    .route("/settings/email", web::get().to(admin::get_email_settings))
                    .route(
                        "/settings/email",
                        web::post().to(admin::update_email_settings),
                    ),
            ),
    );
}
