use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{
    AdminRepository, CheckoutRepository, OrderListQuery, OrderPage, OrderRepository,
    RepositoryError, RepositoryResult, SettingsRepository,
};
use crate::models::{AdminUser, EmailSettings, Order, OrderStatus, PendingCheckout};
use crate::pricing::PriceTable;

/// Process-local store used in development and tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    /// Insertion order; listings walk it backwards.
    orders: RwLock<Vec<Order>>,
    checkouts: RwLock<HashMap<String, PendingCheckout>>,
    prices: RwLock<Option<PriceTable>>,
    email: RwLock<Option<EmailSettings>>,
    admins: RwLock<Vec<AdminUser>>,
}

fn read<T>(lock: &RwLock<T>) -> RepositoryResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| RepositoryError::Unavailable("lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> RepositoryResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| RepositoryError::Unavailable("lock poisoned".to_string()))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn append(&self, order: &Order) -> RepositoryResult<()> {
        let mut orders = write(&self.orders)?;
        if orders.iter().any(|existing| existing.id == order.id) {
            return Err(RepositoryError::Duplicate(order.id.clone()));
        }
        orders.push(order.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> RepositoryResult<Option<Order>> {
        let orders = read(&self.orders)?;
        Ok(orders.iter().find(|order| order.id == id).cloned())
    }

    async fn list(&self, query: &OrderListQuery) -> RepositoryResult<OrderPage> {
        let orders = read(&self.orders)?;
        let matching: Vec<&Order> = orders.iter().rev().filter(|o| query.matches(o)).collect();
        let page = matching
            .iter()
            .skip(query.offset())
            .take(query.per_page)
            .map(|order| (*order).clone())
            .collect();
        Ok(OrderPage::new(page, matching.len(), query))
    }

    async fn update_status(&self, id: &str, status: OrderStatus) -> RepositoryResult<Order> {
        let mut orders = write(&self.orders)?;
        let order = orders
            .iter_mut()
            .find(|order| order.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        order.status = status;
        Ok(order.clone())
    }

    async fn remove(&self, id: &str) -> RepositoryResult<()> {
        let mut orders = write(&self.orders)?;
        let before = orders.len();
        orders.retain(|order| order.id != id);
        if orders.len() == before {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CheckoutRepository for InMemoryStore {
    async fn save_pending(&self, checkout: &PendingCheckout) -> RepositoryResult<()> {
        write(&self.checkouts)?.insert(checkout.gateway_order_id.clone(), checkout.clone());
        Ok(())
    }

    async fn get_pending(
        &self,
        gateway_order_id: &str,
    ) -> RepositoryResult<Option<PendingCheckout>> {
        Ok(read(&self.checkouts)?.get(gateway_order_id).cloned())
    }

    async fn remove_pending(&self, gateway_order_id: &str) -> RepositoryResult<()> {
        write(&self.checkouts)?.remove(gateway_order_id);
        Ok(())
    }
}

#[async_trait]
impl SettingsRepository for InMemoryStore {
    async fn load_prices(&self) -> RepositoryResult<Option<PriceTable>> {
        Ok(read(&self.prices)?.clone())
    }

    async fn save_prices(&self, prices: &PriceTable) -> RepositoryResult<()> {
        *write(&self.prices)? = Some(prices.clone());
        Ok(())
    }

    async fn load_email_settings(&self) -> RepositoryResult<Option<EmailSettings>> {
        Ok(read(&self.email)?.clone())
    }

    async fn save_email_settings(&self, settings: &EmailSettings) -> RepositoryResult<()> {
        *write(&self.email)? = Some(settings.clone());
        Ok(())
    }
}

#[async_trait]
impl AdminRepository for InMemoryStore {
    async fn find_admin_by_email(&self, email: &str) -> RepositoryResult<Option<AdminUser>> {
        let admins = read(&self.admins)?;
        Ok(admins
            .iter()
            .find(|admin| admin.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_admin(&self, admin: &AdminUser) -> RepositoryResult<()> {
        let mut admins = write(&self.admins)?;
        if admins
            .iter()
            .any(|existing| existing.email.eq_ignore_ascii_case(&admin.email))
        {
            return Err(RepositoryError::Duplicate(admin.email.clone()));
        }
        admins.push(admin.clone());
        Ok(())
    }

    async fn count_admins(&self) -> RepositoryResult<u64> {
        Ok(read(&self.admins)?.len() as u64)
    }
}
