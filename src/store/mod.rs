//! Persistence seams for orders, pending checkouts, settings and admins.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::{AdminUser, EmailSettings, Order, OrderStatus, PendingCheckout};
use crate::pricing::PriceTable;

pub mod memory;
pub mod mongo;

pub use memory::InMemoryStore;
pub use mongo::MongoStore;

pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record already exists: {0}")]
    Duplicate(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
    #[error("failed to convert stored record: {0}")]
    Decode(String),
}

impl From<mongodb::bson::ser::Error> for RepositoryError {
    fn from(e: mongodb::bson::ser::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<mongodb::bson::de::Error> for RepositoryError {
    fn from(e: mongodb::bson::de::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Filter and page selection for the admin order listing.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub search: Option<String>,
    pub page: usize,
    pub per_page: usize,
}

impl Default for OrderListQuery {
    fn default() -> Self {
        Self {
            status: None,
            search: None,
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

impl OrderListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact match on order status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Case-insensitive substring match on customer name or VIN. Blank
    /// terms are ignored.
    pub fn search(mut self, term: impl Into<String>) -> Self {
        let term = term.into();
        let term = term.trim();
        self.search = (!term.is_empty()).then(|| term.to_string());
        self
    }

    /// Pages are 1-based; zero values are raised to 1.
    pub fn paginate(mut self, page: usize, per_page: usize) -> Self {
        self.page = page.max(1);
        self.per_page = per_page.max(1);
        self
    }

    pub fn offset(&self) -> usize {
        (self.page - 1) * self.per_page
    }

    pub fn matches(&self, order: &Order) -> bool {
        if let Some(status) = self.status {
            if order.status != status {
                return false;
            }
        }
        match &self.search {
            Some(term) => {
                let term = term.to_lowercase();
                order.customer.full_name.to_lowercase().contains(&term)
                    || order.customer.vin_number.to_lowercase().contains(&term)
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: usize,
    pub page: usize,
    pub total_pages: usize,
}

impl OrderPage {
    pub fn new(orders: Vec<Order>, total: usize, query: &OrderListQuery) -> Self {
        Self {
            orders,
            total,
            page: query.page,
            total_pages: total.div_ceil(query.per_page),
        }
    }
}

/// Append-only record of finalized purchases, newest first.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Fails with [`RepositoryError::Duplicate`] when the id is taken.
    async fn append(&self, order: &Order) -> RepositoryResult<()>;
    async fn get(&self, id: &str) -> RepositoryResult<Option<Order>>;
    async fn list(&self, query: &OrderListQuery) -> RepositoryResult<OrderPage>;
    async fn update_status(&self, id: &str, status: OrderStatus) -> RepositoryResult<Order>;
    async fn remove(&self, id: &str) -> RepositoryResult<()>;
}

/// Server-side state bound to a gateway order between create and capture.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CheckoutRepository: Send + Sync {
    async fn save_pending(&self, checkout: &PendingCheckout) -> RepositoryResult<()>;
    async fn get_pending(&self, gateway_order_id: &str)
        -> RepositoryResult<Option<PendingCheckout>>;
    async fn remove_pending(&self, gateway_order_id: &str) -> RepositoryResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// `None` until an admin saves a table.
    async fn load_prices(&self) -> RepositoryResult<Option<PriceTable>>;
    async fn save_prices(&self, prices: &PriceTable) -> RepositoryResult<()>;
    async fn load_email_settings(&self) -> RepositoryResult<Option<EmailSettings>>;
    async fn save_email_settings(&self, settings: &EmailSettings) -> RepositoryResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdminRepository: Send + Sync {
    async fn find_admin_by_email(&self, email: &str) -> RepositoryResult<Option<AdminUser>>;
    async fn create_admin(&self, admin: &AdminUser) -> RepositoryResult<()>;
    async fn count_admins(&self) -> RepositoryResult<u64>;
}
