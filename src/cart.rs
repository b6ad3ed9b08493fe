//! Durable client-side cart.
//!
//! The cart is a single JSON array persisted under [`CART_STORAGE_KEY`] in a
//! [`KeyValueStore`]. Reads fail soft: a missing or corrupt value is an empty
//! cart. Writes may fail (quota, I/O) without invalidating the in-memory cart.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{error, warn};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{CartItem, CartLine, NewCartItem};
use crate::pricing::MAX_LINE_QUANTITY;

pub const CART_STORAGE_KEY: &str = "vehicle_reports_cart";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to serialize cart: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to access cart storage: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage quota of {limit} bytes exceeded")]
    QuotaExceeded { limit: usize },
}

/// Minimal string key-value persistence, modelled on browser local storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// In-memory storage with an optional byte quota.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: HashMap::new(),
            quota: Some(quota),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(limit) = self.quota {
            if value.len() > limit {
                return Err(StorageError::QuotaExceeded { limit });
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = tmp_path(&path);
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

pub fn encode(items: &[CartItem]) -> Result<String, serde_json::Error> {
    serde_json::to_string(items)
}

/// Parses a persisted cart, degrading to an empty cart on bad data.
pub fn decode(raw: &str) -> Vec<CartItem> {
    match serde_json::from_str::<Vec<CartItem>>(raw) {
        Ok(items) => items,
        Err(e) => {
            warn!("Discarding unreadable cart data: {}", e);
            Vec::new()
        }
    }
}

#[derive(Debug)]
pub struct CartStore<S: KeyValueStore> {
    storage: S,
    items: Vec<CartItem>,
}

impl<S: KeyValueStore> CartStore<S> {
    /// Loads the persisted cart. Never fails; see module docs.
    pub fn open(storage: S) -> Self {
        let items = match storage.get(CART_STORAGE_KEY) {
            Ok(Some(raw)) => decode(&raw),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Cart storage unavailable, starting empty: {}", e);
                Vec::new()
            }
        };
        Self { storage, items }
    }

    pub fn get(&self) -> &[CartItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends `item` with a fresh cart id and quantity 1.
    ///
    /// On a storage error the item stays in the in-memory cart.
    pub fn add(&mut self, item: NewCartItem) -> Result<CartItem, StorageError> {
        let cart_item = CartItem {
            cart_id: Uuid::new_v4().to_string(),
            product_id: item.product_id,
            title: item.title,
            description: item.description,
            image: item.image,
            price: item.price,
            quantity: 1,
        };
        self.items.push(cart_item.clone());
        self.persist()?;
        Ok(cart_item)
    }

    pub fn remove(&mut self, cart_id: &str) -> Result<(), StorageError> {
        let before = self.items.len();
        self.items.retain(|item| item.cart_id != cart_id);
        if self.items.len() == before {
            return Ok(());
        }
        self.persist()
    }

    /// Sets the quantity of an item. Values below 1 are ignored; values above
    /// [`MAX_LINE_QUANTITY`] are capped.
    pub fn update_quantity(&mut self, cart_id: &str, quantity: i64) -> Result<(), StorageError> {
        if quantity < 1 {
            return Ok(());
        }
        let quantity = u32::try_from(quantity)
            .unwrap_or(u32::MAX)
            .min(MAX_LINE_QUANTITY);
        let Some(item) = self.items.iter_mut().find(|item| item.cart_id == cart_id) else {
            return Ok(());
        };
        item.quantity = quantity;
        self.persist()
    }

    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.items.clear();
        self.persist()
    }

    /// Display subtotal from the snapshot prices. Not used for charging.
    pub fn subtotal(&self) -> Decimal {
        self.items
            .iter()
            .map(|item| item.price * Decimal::from(item.quantity))
            .sum()
    }

    pub fn lines(&self) -> Vec<CartLine> {
        self.items.iter().map(CartLine::from).collect()
    }

    fn persist(&mut self) -> Result<(), StorageError> {
        let raw = encode(&self.items)?;
        self.storage.set(CART_STORAGE_KEY, &raw).map_err(|e| {
            error!("Error saving cart: {}", e);
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    fn basic_report() -> NewCartItem {
        catalog::find("car-basic")
            .expect("catalog has car-basic")
            .to_cart_item(Decimal::new(2999, 2))
    }

    #[test]
    fn add_assigns_unique_ids_and_quantity_one() {
        let mut cart = CartStore::open(MemoryStore::new());
        let first = cart.add(basic_report()).expect("add should persist");
        let second = cart.add(basic_report()).expect("add should persist");

        assert_ne!(first.cart_id, second.cart_id);
        assert_eq!(first.quantity, 1);
        assert_eq!(cart.len(), 2);
    }

    #[test]
    fn quantity_below_one_is_ignored() {
        let mut cart = CartStore::open(MemoryStore::new());
        let item = cart.add(basic_report()).expect("add");
        cart.update_quantity(&item.cart_id, 4).expect("update");

        for n in [0, -1, i64::MIN] {
            cart.update_quantity(&item.cart_id, n).expect("update");
            assert_eq!(cart.get()[0].quantity, 4);
        }
    }

    #[test]
    fn removing_unknown_id_is_a_no_op() {
        let mut cart = CartStore::open(MemoryStore::new());
        cart.add(basic_report()).expect("add");
        cart.remove("missing").expect("remove");
        assert_eq!(cart.len(), 1);
    }

    #[test]
    fn corrupt_storage_opens_as_empty_cart() {
        let mut storage = MemoryStore::new();
        storage
            .set(CART_STORAGE_KEY, "{not json")
            .expect("seed storage");
        let cart = CartStore::open(storage);
        assert!(cart.is_empty());
    }

    #[test]
    fn quota_failure_keeps_in_memory_state() {
        let mut cart = CartStore::open(MemoryStore::with_quota(16));
        let result = cart.add(basic_report());

        assert!(matches!(result, Err(StorageError::QuotaExceeded { limit: 16 })));
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.get()[0].title, "Basic Car Report");
    }

    #[test]
    fn persisted_cart_round_trips_after_mutations() {
        let mut cart = CartStore::open(MemoryStore::new());
        let a = cart.add(basic_report()).expect("add");
        let b = cart
            .add(catalog::find("truck-report").expect("truck").to_cart_item(Decimal::new(4499, 2)))
            .expect("add");
        cart.update_quantity(&a.cart_id, 3).expect("update");
        cart.remove(&b.cart_id).expect("remove");
        cart.add(basic_report()).expect("add");

        let raw = encode(cart.get()).expect("encode");
        assert_eq!(decode(&raw), cart.get());

        let reopened = CartStore::open(cart.storage.clone());
        assert_eq!(reopened.get(), cart.get());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cart = CartStore::open(FileStore::new(dir.path()));
        let item = cart.add(basic_report()).expect("add");
        cart.update_quantity(&item.cart_id, 2).expect("update");

        let reopened = CartStore::open(FileStore::new(dir.path()));
        assert_eq!(reopened.get(), cart.get());

        let mut reopened = reopened;
        reopened.clear().expect("clear");
        assert!(CartStore::open(FileStore::new(dir.path())).is_empty());
    }

    #[test]
    fn subtotal_uses_snapshot_prices() {
        let mut cart = CartStore::open(MemoryStore::new());
        let item = cart.add(basic_report()).expect("add");
        cart.update_quantity(&item.cart_id, 3).expect("update");
        assert_eq!(cart.subtotal(), Decimal::new(8997, 2));
    }

    #[test]
    fn quantity_is_capped_at_line_limit() {
        let mut cart = CartStore::open(MemoryStore::new());
        let item = cart.add(basic_report()).expect("add");
        cart.update_quantity(&item.cart_id, i64::MAX).expect("update");
        assert_eq!(cart.get()[0].quantity, MAX_LINE_QUANTITY);
    }
}
