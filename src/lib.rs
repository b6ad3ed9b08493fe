//! Vehicle history report storefront: cart, server-side pricing, PayPal
//! checkout, order records and admin API.

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod db;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod payment;
pub mod pricing;
pub mod routes;
pub mod state;
pub mod store;
