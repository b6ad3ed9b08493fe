//! Price table, quotes and the price service.
//!
//! Prices are `Decimal` currency units; everything charged is integer cents.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use decimal_percentage::Percentage;
use futures::lock::Mutex;
use log::{info, warn};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog;
use crate::models::{CartLine, OrderItem};
use crate::store::SettingsRepository;

/// Largest quantity a single cart line may carry.
pub const MAX_LINE_QUANTITY: u32 = 100;

/// Product-type key to price, in currency units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceTable(BTreeMap<String, Decimal>);

impl Default for PriceTable {
    fn default() -> Self {
        Self(
            catalog::DEFAULT_PRICES
                .iter()
                .map(|(key, cents)| ((*key).to_string(), Decimal::new(*cents, 2)))
                .collect(),
        )
    }
}

impl PriceTable {
    pub fn get(&self, key: &str) -> Option<Decimal> {
        self.0.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Decimal)> {
        self.0.iter()
    }

    /// Merges `updates` into the table. Every entry is checked first, so a
    /// rejected update leaves the table untouched.
    pub fn merge(&mut self, updates: &BTreeMap<String, Decimal>) -> Result<(), PriceError> {
        for (key, value) in updates {
            if !catalog::is_price_key(key) {
                return Err(PriceError::UnknownKey(key.clone()));
            }
            if value.is_sign_negative() || to_cents(*value).is_none() {
                return Err(PriceError::InvalidPrice {
                    key: key.clone(),
                    value: *value,
                });
            }
        }
        for (key, value) in updates {
            self.0.insert(key.clone(), *value);
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PriceError {
    #[error("unknown price key `{0}`")]
    UnknownKey(String),
    #[error("price for `{key}` must be a non-negative amount, got {value}")]
    InvalidPrice { key: String, value: Decimal },
    #[error("no prices supplied")]
    Empty,
    #[error("quantity {quantity} of `{product_id}` exceeds the limit of {max}")]
    QuantityLimit {
        product_id: String,
        quantity: u32,
        max: u32,
    },
    #[error("order total is too large")]
    Overflow,
    #[error("failed to save prices: {0}")]
    Store(String),
}

#[derive(Debug, Error)]
pub enum PriceFetchError {
    #[error("price request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("price endpoint answered with status {0}")]
    Status(u16),
}

/// Converts a currency amount to cents, rounding half away from zero.
pub fn to_cents(amount: Decimal) -> Option<i64> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Formats cents as a plain decimal amount, e.g. `9717` as `"97.17"`.
pub fn format_cents(cents: i64) -> String {
    Decimal::new(cents, 2).to_string()
}

/// Parses a decimal amount such as `"97.17"` into cents.
pub fn parse_cents(value: &str) -> Option<i64> {
    value.trim().parse::<Decimal>().ok().and_then(to_cents)
}

/// Tax on `subtotal_cents` at the exact rate, rounded half-up to the cent.
pub fn tax_cents(subtotal_cents: i64, tax_rate: &Percentage) -> Result<i64, PriceError> {
    let subtotal = Decimal::from_i64(subtotal_cents).ok_or(PriceError::Overflow)?;
    ((*tax_rate) * Decimal::ONE)
        .checked_mul(subtotal)
        .ok_or(PriceError::Overflow)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(PriceError::Overflow)
}

/// Server-side pricing of a set of cart lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub lines: Vec<OrderItem>,
    /// Product ids left out of the total: unknown product, unpriced key or
    /// zero quantity.
    pub excluded: Vec<String>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Prices `lines` against `table`. Quantities above [`MAX_LINE_QUANTITY`]
/// and totals that do not fit in `i64` cents are rejected.
pub fn quote(
    lines: &[CartLine],
    table: &PriceTable,
    tax_rate: &Percentage,
) -> Result<Quote, PriceError> {
    let mut priced = Vec::with_capacity(lines.len());
    let mut excluded = Vec::new();

    for line in lines {
        if line.quantity > MAX_LINE_QUANTITY {
            return Err(PriceError::QuantityLimit {
                product_id: line.product_id.clone(),
                quantity: line.quantity,
                max: MAX_LINE_QUANTITY,
            });
        }
        let product = catalog::find(&line.product_id);
        let price = product.and_then(|p| table.get(p.price_key));
        match (product, price) {
            (Some(product), Some(price)) if line.quantity > 0 => priced.push(OrderItem {
                product_id: product.id.to_string(),
                title: product.title.to_string(),
                price_key: product.price_key.to_string(),
                unit_price_cents: to_cents(price).ok_or(PriceError::Overflow)?,
                quantity: line.quantity,
            }),
            _ => excluded.push(line.product_id.clone()),
        }
    }

    let subtotal_cents = priced.iter().try_fold(0_i64, |sum, item| {
        item.line_total_cents()
            .and_then(|line_total| sum.checked_add(line_total))
            .ok_or(PriceError::Overflow)
    })?;
    let tax_cents = tax_cents(subtotal_cents, tax_rate)?;
    let total_cents = subtotal_cents
        .checked_add(tax_cents)
        .ok_or(PriceError::Overflow)?;

    Ok(Quote {
        lines: priced,
        excluded,
        subtotal_cents,
        tax_cents,
        total_cents,
        warning: None,
    })
}

/// A price table plus a warning when it did not come from the live source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSnapshot {
    pub prices: PriceTable,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Authoritative prices backed by the settings store.
///
/// Reads fall back to the last table successfully loaded (initially the
/// defaults) so a store outage never blocks checkout.
pub struct PriceService {
    store: Arc<dyn SettingsRepository>,
    last_known_good: RwLock<PriceTable>,
    writer: Mutex<()>,
    tax_rate: Percentage,
}

impl PriceService {
    pub fn new(store: Arc<dyn SettingsRepository>, tax_rate: Percentage) -> Self {
        Self {
            store,
            last_known_good: RwLock::new(PriceTable::default()),
            writer: Mutex::new(()),
            tax_rate,
        }
    }

    pub fn tax_rate(&self) -> Percentage {
        self.tax_rate
    }

    fn cached(&self) -> PriceTable {
        match self.last_known_good.read() {
            Ok(table) => table.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn remember(&self, table: &PriceTable) {
        match self.last_known_good.write() {
            Ok(mut guard) => *guard = table.clone(),
            Err(poisoned) => *poisoned.into_inner() = table.clone(),
        }
    }

    pub async fn fetch_prices(&self) -> PriceSnapshot {
        match self.store.load_prices().await {
            Ok(Some(prices)) => {
                self.remember(&prices);
                PriceSnapshot {
                    prices,
                    warning: None,
                }
            }
            Ok(None) => PriceSnapshot {
                prices: self.cached(),
                warning: None,
            },
            Err(e) => {
                warn!("Falling back to cached prices: {}", e);
                PriceSnapshot {
                    prices: self.cached(),
                    warning: Some(
                        "Live prices are temporarily unavailable; showing last known prices."
                            .to_string(),
                    ),
                }
            }
        }
    }

    pub async fn quote(&self, lines: &[CartLine]) -> Result<Quote, PriceError> {
        let snapshot = self.fetch_prices().await;
        let mut quote = quote(lines, &snapshot.prices, &self.tax_rate)?;
        quote.warning = snapshot.warning;
        Ok(quote)
    }

    pub async fn update_price(&self, key: &str, value: Decimal) -> Result<PriceTable, PriceError> {
        let mut updates = BTreeMap::new();
        updates.insert(key.to_string(), value);
        self.update_prices(&updates).await
    }

    /// Validates and merges `updates`, persists the whole table and returns it.
    pub async fn update_prices(
        &self,
        updates: &BTreeMap<String, Decimal>,
    ) -> Result<PriceTable, PriceError> {
        if updates.is_empty() {
            return Err(PriceError::Empty);
        }

        let _guard = self.writer.lock().await;
        let mut table = match self.store.load_prices().await {
            Ok(Some(stored)) => stored,
            Ok(None) => self.cached(),
            Err(e) => return Err(PriceError::Store(e.to_string())),
        };
        table.merge(updates)?;

        self.store
            .save_prices(&table)
            .await
            .map_err(|e| PriceError::Store(e.to_string()))?;
        self.remember(&table);
        info!("Updated prices: {:?}", updates.keys().collect::<Vec<_>>());
        Ok(table)
    }
}

/// Storefront-side client for `GET /api/prices`.
pub struct PriceClient {
    http: reqwest::Client,
    url: String,
    last_known_good: RwLock<Option<PriceTable>>,
}

#[derive(Deserialize)]
struct PricesResponse {
    prices: PriceTable,
}

impl PriceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PriceFetchError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: format!("{}/api/prices", base_url.trim_end_matches('/')),
            last_known_good: RwLock::new(None),
        })
    }

    pub async fn fetch_prices(&self) -> Result<PriceTable, PriceFetchError> {
        let response = self.http.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(PriceFetchError::Status(response.status().as_u16()));
        }
        let body: PricesResponse = response.json().await?;
        Ok(body.prices)
    }

    /// Fetches prices, falling back to the last good table or the defaults
    /// with a user-facing warning.
    pub async fn fetch_or_fallback(&self) -> PriceSnapshot {
        match self.fetch_prices().await {
            Ok(prices) => {
                if let Ok(mut guard) = self.last_known_good.write() {
                    *guard = Some(prices.clone());
                }
                PriceSnapshot {
                    prices,
                    warning: None,
                }
            }
            Err(e) => {
                warn!("Price fetch failed, using fallback prices: {}", e);
                let cached = self
                    .last_known_good
                    .read()
                    .ok()
                    .and_then(|guard| guard.clone());
                PriceSnapshot {
                    prices: cached.unwrap_or_default(),
                    warning: Some(
                        "Could not load current prices; showing default prices.".to_string(),
                    ),
                }
            }
        }
    }
}
