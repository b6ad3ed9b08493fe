use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::checkout::form::{ContactFlow, CustomerInfo};

/// A single report selection held in the client-side cart.
///
/// `title`, `description`, `image` and `price` are a display snapshot taken
/// when the item was added. The charged amount is always recomputed from the
/// price table on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub cart_id: String,
    pub product_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    pub price: Decimal,
    pub quantity: u32,
}

/// Attributes supplied when adding a product to the cart.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCartItem {
    pub product_id: String,
    pub title: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub price: Decimal,
}

/// The part of a cart item the server needs: what was picked and how many.
///
/// Deserializes from a full [`CartItem`] payload as well; the snapshot fields
/// are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl CartLine {
    pub fn new(product_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

impl From<&CartItem> for CartLine {
    fn from(item: &CartItem) -> Self {
        Self::new(item.product_id.clone(), item.quantity)
    }
}

/// A re-priced line item, frozen into an order at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    pub title: String,
    pub price_key: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
}

impl OrderItem {
    /// `None` when the line total does not fit in `i64` cents.
    pub fn line_total_cents(&self) -> Option<i64> {
        self.unit_price_cents.checked_mul(i64::from(self.quantity))
    }
}

/// Lifecycle states an admin can move an order between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A finalized purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Gateway order id, or a locally generated id for orders placed without
    /// a payment gateway.
    pub id: String,
    pub items: Vec<OrderItem>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    /// Amount actually charged.
    pub amount_cents: i64,
    pub currency: String,
    pub customer: CustomerInfo,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_status: Option<String>,
    /// Total the buyer was quoted, set only when the processor captured a
    /// different amount. Such orders need an admin's review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_cents: Option<i64>,
}

static LOCAL_ORDER_COUNTER: AtomicU64 = AtomicU64::new(0);

fn compose_local_id(millis: i64, seq: u64) -> String {
    format!("{millis}-{seq:04}")
}

impl Order {
    /// Generates an id for an order that never went through the gateway:
    /// unix millis plus a process-wide counter.
    pub fn local_id() -> String {
        let seq = LOCAL_ORDER_COUNTER.fetch_add(1, Ordering::Relaxed);
        compose_local_id(Utc::now().timestamp_millis(), seq)
    }

    pub fn needs_review(&self) -> bool {
        self.quoted_cents.is_some()
    }

    pub fn buyer_email(&self) -> Option<&str> {
        self.customer
            .email
            .as_deref()
            .filter(|email| !email.is_empty())
    }
}

/// Re-priced cart and customer details bound to a gateway order id between
/// payment creation and capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCheckout {
    pub gateway_order_id: String,
    pub items: Vec<OrderItem>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub customer: CustomerInfo,
    pub contact_flow: ContactFlow,
    pub created_at: DateTime<Utc>,
}

impl PendingCheckout {
    /// Turns the pending checkout into an order record charged `amount_cents`.
    pub fn into_order(self, amount_cents: i64) -> Order {
        Order {
            id: self.gateway_order_id,
            items: self.items,
            subtotal_cents: self.subtotal_cents,
            tax_cents: self.tax_cents,
            amount_cents,
            currency: self.currency,
            customer: self.customer,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            capture_id: None,
            gateway_status: None,
            quoted_cents: None,
        }
    }
}

/// Admin-editable e-mail preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSettings {
    pub admin_email: String,
    pub email_signature: String,
    pub notification_enabled: bool,
}

impl EmailSettings {
    pub fn with_admin_email(admin_email: impl Into<String>) -> Self {
        Self {
            admin_email: admin_email.into(),
            email_signature: "Best regards,\nThe VehicleInfo Team".to_string(),
            notification_enabled: true,
        }
    }
}

/// Partial update of [`EmailSettings`]; absent fields stay untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSettingsUpdate {
    pub admin_email: Option<String>,
    pub email_signature: Option<String>,
    pub notification_enabled: Option<bool>,
}

impl EmailSettings {
    pub fn apply(&mut self, update: EmailSettingsUpdate) {
        if let Some(admin_email) = update.admin_email.filter(|v| !v.trim().is_empty()) {
            self.admin_email = admin_email.trim().to_string();
        }
        if let Some(signature) = update.email_signature.filter(|v| !v.is_empty()) {
            self.email_signature = signature;
        }
        if let Some(enabled) = update.notification_enabled {
            self.notification_enabled = enabled;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminUser {
    pub id: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignInInput {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Counter {
    pub _id: String,
    pub seq: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_parses_case_insensitively() {
        assert_eq!(OrderStatus::parse("Completed"), Some(OrderStatus::Completed));
        assert_eq!(OrderStatus::parse(" cancelled "), Some(OrderStatus::Cancelled));
        assert_eq!(OrderStatus::parse("shipped"), None);
    }

    #[test]
    fn cart_line_reads_full_cart_item_payload() {
        let raw = r#"{"cartId":"c1","productId":"car-basic","title":"Basic Car Report","price":29.99,"quantity":2}"#;
        let line: CartLine = serde_json::from_str(raw).expect("line should parse");
        assert_eq!(line, CartLine::new("car-basic", 2));
    }

    #[test]
    fn local_ids_are_unique() {
        let first = Order::local_id();
        let second = Order::local_id();
        assert_ne!(first, second);
    }

    #[test]
    fn local_id_counter_never_wraps() {
        assert_eq!(compose_local_id(1_700_000_000_000, 7), "1700000000000-0007");
        assert_ne!(
            compose_local_id(1_700_000_000_000, 10_000),
            compose_local_id(1_700_000_000_000, 0)
        );
        assert_eq!(compose_local_id(1, 10_000), "1-10000");
    }

    #[test]
    fn line_totals_report_overflow() {
        let item = OrderItem {
            product_id: "car-premium".to_string(),
            title: "Premium Car Report".to_string(),
            price_key: "premiumReport".to_string(),
            unit_price_cents: i64::MAX / 2,
            quantity: 3,
        };
        assert_eq!(item.line_total_cents(), None);
    }

    #[test]
    fn email_settings_update_ignores_blank_values() {
        let mut settings = EmailSettings::with_admin_email("admin@example.com");
        settings.apply(EmailSettingsUpdate {
            admin_email: Some("  ".to_string()),
            email_signature: None,
            notification_enabled: Some(false),
        });
        assert_eq!(settings.admin_email, "admin@example.com");
        assert!(!settings.notification_enabled);
    }
}
