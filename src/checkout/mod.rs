pub mod form;
pub mod service;

pub use form::{CheckoutForm, ContactFlow, CustomerInfo, FormState, ValidatedCustomer};
pub use service::{CheckoutError, CheckoutService, CheckoutSettings, Finalized};
