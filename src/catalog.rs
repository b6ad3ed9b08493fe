//! Report products offered by the storefront.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::NewCartItem;
use crate::pricing::PriceTable;

pub const BASIC_REPORT: &str = "basicReport";
pub const FULL_REPORT: &str = "fullReport";
pub const PREMIUM_REPORT: &str = "premiumReport";
pub const MOTORCYCLE_REPORT: &str = "motorcycleReport";
pub const TRUCK_REPORT: &str = "truckReport";

/// Every price key the price table may hold, with its default price in cents.
pub const DEFAULT_PRICES: &[(&str, i64)] = &[
    (BASIC_REPORT, 2999),
    (FULL_REPORT, 4999),
    (PREMIUM_REPORT, 7999),
    (MOTORCYCLE_REPORT, 3499),
    (TRUCK_REPORT, 4499),
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub image: Option<&'static str>,
    /// Key into the price table; the product has no price of its own.
    pub price_key: &'static str,
    pub features: &'static [&'static str],
    pub featured: bool,
}

impl Product {
    /// Snapshot of this product for the cart, at the given display price.
    pub fn to_cart_item(&self, price: Decimal) -> NewCartItem {
        NewCartItem {
            product_id: self.id.to_string(),
            title: self.title.to_string(),
            description: Some(self.description.to_string()),
            image: self.image.map(str::to_string),
            price,
        }
    }
}

pub const PRODUCTS: &[Product] = &[
    Product {
        id: "car-basic",
        title: "Basic Car Report",
        description: "Essential vehicle history information",
        image: None,
        price_key: BASIC_REPORT,
        features: &["VIN Check", "Accident History", "Title Information"],
        featured: false,
    },
    Product {
        id: "car-standard",
        title: "Standard Car Report",
        description: "Comprehensive vehicle analysis",
        image: None,
        price_key: FULL_REPORT,
        features: &[
            "Basic Report Features",
            "Ownership History",
            "Vehicle Specifications",
        ],
        featured: false,
    },
    Product {
        id: "car-premium",
        title: "Premium Car Report",
        description: "Complete vehicle history and analysis",
        image: None,
        price_key: PREMIUM_REPORT,
        features: &[
            "Standard Report Features",
            "Market Value",
            "Detailed Service Records",
        ],
        featured: true,
    },
    Product {
        id: "motorcycle-report",
        title: "Motorcycle Report",
        description: "Detailed motorcycle history check",
        image: None,
        price_key: MOTORCYCLE_REPORT,
        features: &[
            "VIN History",
            "Performance Specs",
            "Accident History",
            "Service Records",
            "Market Value Assessment",
        ],
        featured: false,
    },
    Product {
        id: "truck-report",
        title: "Truck Report",
        description: "Commercial vehicle report",
        image: None,
        price_key: TRUCK_REPORT,
        features: &[
            "Complete VIN History",
            "Technical Specifications",
            "Accident Records",
            "Load Capacity Details",
            "Commercial Usage History",
        ],
        featured: false,
    },
];

pub fn find(product_id: &str) -> Option<&'static Product> {
    PRODUCTS.iter().find(|product| product.id == product_id)
}

pub fn is_price_key(key: &str) -> bool {
    DEFAULT_PRICES.iter().any(|(known, _)| *known == key)
}

/// A catalog product together with its current price, if the table has one.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub product: &'static Product,
    pub price: Option<Decimal>,
}

pub fn priced(table: &PriceTable) -> Vec<CatalogEntry> {
    PRODUCTS
        .iter()
        .map(|product| CatalogEntry {
            product,
            price: table.get(product.price_key),
        })
        .collect()
}
