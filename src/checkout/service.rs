//! Checkout orchestration: re-price, create payment, capture, record, notify.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use actix_web::rt::time::timeout;
use chrono::Utc;
use log::{error, info, warn};
use serde::Serialize;
use thiserror::Error;

use super::form::{CustomerValidationError, ValidatedCustomer};
use crate::models::{
    CartLine, EmailSettings, EmailSettingsUpdate, Order, OrderStatus, PendingCheckout,
};
use crate::notify::{DispatchReport, NotificationDispatcher};
use crate::payment::{self, CaptureResult, PaymentError, PaymentGateway, COMPLETED};
use crate::pricing::{format_cents, PriceError, PriceService, Quote};
use crate::store::{
    CheckoutRepository, OrderRepository, RepositoryError, RepositoryResult, SettingsRepository,
};

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Validation(#[from] CustomerValidationError),
    #[error("the cart has no purchasable items")]
    EmptyCart,
    #[error("could not create the payment: {0}")]
    PaymentCreate(PaymentError),
    #[error("could not capture the payment: {0}")]
    PaymentCapture(PaymentError),
    #[error("payment {order_id} is still being processed")]
    Processing { order_id: String },
    #[error("payment {order_id} is {status}, not completed")]
    NotCompleted { order_id: String, status: String },
    #[error("no pending checkout for payment {0}")]
    UnknownCheckout(String),
    #[error("payment {order_id} reported no captured amount")]
    MissingAmount { order_id: String },
    #[error(transparent)]
    Pricing(#[from] PriceError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    /// Upper bound for each call to the payment processor.
    pub payment_timeout: Duration,
    /// Admin inbox used until one is saved in the settings store.
    pub admin_email: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCreated {
    pub order_id: String,
    pub total_cents: i64,
    pub quote: Quote,
}

/// A recorded order and how it got there.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finalized {
    pub order: Order,
    pub capture: CaptureResult,
    /// The order already existed; nothing was written or sent this time.
    pub already_recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<DispatchReport>,
}

pub struct CheckoutService {
    prices: Arc<PriceService>,
    gateway: Arc<dyn PaymentGateway>,
    orders: Arc<dyn OrderRepository>,
    checkouts: Arc<dyn CheckoutRepository>,
    settings: Arc<dyn SettingsRepository>,
    notifier: NotificationDispatcher,
    config: CheckoutSettings,
}

fn capture_from_order(order: &Order) -> CaptureResult {
    CaptureResult {
        order_id: order.id.clone(),
        capture_id: order.capture_id.clone(),
        status: order
            .gateway_status
            .clone()
            .unwrap_or_else(|| COMPLETED.to_string()),
        amount_cents: Some(order.amount_cents),
        currency: Some(order.currency.clone()),
    }
}

impl CheckoutService {
    pub fn new(
        prices: Arc<PriceService>,
        gateway: Arc<dyn PaymentGateway>,
        orders: Arc<dyn OrderRepository>,
        checkouts: Arc<dyn CheckoutRepository>,
        settings: Arc<dyn SettingsRepository>,
        notifier: NotificationDispatcher,
        config: CheckoutSettings,
    ) -> Self {
        Self {
            prices,
            gateway,
            orders,
            checkouts,
            settings,
            notifier,
            config,
        }
    }

    pub fn currency(&self) -> &str {
        &self.config.currency
    }

    /// Runs a processor call under the configured timeout.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, PaymentError>>,
    ) -> Result<T, PaymentError> {
        match timeout(self.config.payment_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(PaymentError::Timeout),
        }
    }

    pub async fn quote(&self, lines: &[CartLine]) -> Result<Quote, CheckoutError> {
        Ok(self.prices.quote(lines).await?)
    }

    pub async fn email_settings(&self) -> EmailSettings {
        match self.settings.load_email_settings().await {
            Ok(Some(settings)) => settings,
            Ok(None) => EmailSettings::with_admin_email(&self.config.admin_email),
            Err(e) => {
                warn!("Using default e-mail settings: {}", e);
                EmailSettings::with_admin_email(&self.config.admin_email)
            }
        }
    }

    pub async fn update_email_settings(
        &self,
        update: EmailSettingsUpdate,
    ) -> RepositoryResult<EmailSettings> {
        let mut settings = match self.settings.load_email_settings().await? {
            Some(settings) => settings,
            None => EmailSettings::with_admin_email(&self.config.admin_email),
        };
        settings.apply(update);
        self.settings.save_email_settings(&settings).await?;
        Ok(settings)
    }

    /// Prices the cart server-side and opens a processor order for the total.
    ///
    /// The re-priced cart and the customer are kept against the processor's
    /// order id until capture.
    pub async fn create_payment(
        &self,
        lines: &[CartLine],
        customer: ValidatedCustomer,
    ) -> Result<PaymentCreated, CheckoutError> {
        let quote = self.quote(lines).await?;
        if !quote.excluded.is_empty() {
            warn!("Excluded unpriced cart lines: {:?}", quote.excluded);
        }
        if quote.lines.is_empty() || quote.total_cents <= 0 {
            return Err(CheckoutError::EmptyCart);
        }

        let count: u64 = quote.lines.iter().map(|line| u64::from(line.quantity)).sum();
        let description = format!("Vehicle history reports ({count})");
        let order_id = self
            .bounded(
                self.gateway
                    .create_order(quote.total_cents, &self.config.currency, &description),
            )
            .await
            .map_err(|e| {
                error!("Payment creation failed: {}", e);
                CheckoutError::PaymentCreate(e)
            })?;

        let flow = customer.flow();
        let pending = PendingCheckout {
            gateway_order_id: order_id.clone(),
            items: quote.lines.clone(),
            subtotal_cents: quote.subtotal_cents,
            tax_cents: quote.tax_cents,
            total_cents: quote.total_cents,
            currency: self.config.currency.clone(),
            customer: customer.into_inner(),
            contact_flow: flow,
            created_at: Utc::now(),
        };
        self.checkouts.save_pending(&pending).await?;

        info!(
            "Opened payment {} for {} {}",
            order_id,
            format_cents(quote.total_cents),
            self.config.currency
        );
        Ok(PaymentCreated {
            order_id,
            total_cents: quote.total_cents,
            quote,
        })
    }

    /// Re-queries the processor; anything but completed is a rejection.
    ///
    /// Only ids this service opened or recorded are looked up.
    pub async fn verify(&self, order_id: &str) -> Result<CaptureResult, CheckoutError> {
        let known = self.orders.get(order_id).await?.is_some()
            || self.checkouts.get_pending(order_id).await?.is_some();
        if !known {
            return Err(CheckoutError::UnknownCheckout(order_id.to_string()));
        }
        self.verify_with_gateway(order_id).await
    }

    async fn verify_with_gateway(&self, order_id: &str) -> Result<CaptureResult, CheckoutError> {
        match self
            .bounded(payment::verify_order(self.gateway.as_ref(), order_id))
            .await
        {
            Ok(result) => Ok(result),
            Err(PaymentError::NotCompleted { order_id, status }) => {
                Err(CheckoutError::NotCompleted { order_id, status })
            }
            Err(PaymentError::Timeout) => Err(CheckoutError::Processing {
                order_id: order_id.to_string(),
            }),
            Err(e) => Err(CheckoutError::PaymentCapture(e)),
        }
    }

    /// Captures an approved payment and records the order exactly once.
    ///
    /// A timed-out or already-captured capture is resolved by asking the
    /// processor for the order's actual state.
    pub async fn capture(&self, order_id: &str) -> Result<Finalized, CheckoutError> {
        if let Some(order) = self.orders.get(order_id).await? {
            info!("Payment {} already recorded", order_id);
            return Ok(Finalized {
                capture: capture_from_order(&order),
                order,
                already_recorded: true,
                notifications: None,
            });
        }

        let pending = self
            .checkouts
            .get_pending(order_id)
            .await?
            .ok_or_else(|| CheckoutError::UnknownCheckout(order_id.to_string()))?;

        let capture = match self.bounded(self.gateway.capture_order(order_id)).await {
            Ok(capture) => capture,
            Err(PaymentError::Timeout) => {
                warn!("Capture of {} timed out, verifying", order_id);
                self.verify_with_gateway(order_id).await?
            }
            Err(PaymentError::AlreadyCaptured(_)) => {
                warn!("Payment {} reported as already captured, verifying", order_id);
                self.verify_with_gateway(order_id).await?
            }
            Err(e) => {
                error!("Capture of {} failed: {}", order_id, e);
                return Err(CheckoutError::PaymentCapture(e));
            }
        };

        if !capture.is_completed() {
            return Err(CheckoutError::NotCompleted {
                order_id: order_id.to_string(),
                status: capture.status,
            });
        }

        self.record(pending, capture).await
    }

    /// Records a payment the buyer reports as done, after verifying it with
    /// the processor. Client-supplied totals play no part.
    pub async fn finalize(&self, order_id: &str) -> Result<Finalized, CheckoutError> {
        if let Some(order) = self.orders.get(order_id).await? {
            return Ok(Finalized {
                capture: capture_from_order(&order),
                order,
                already_recorded: true,
                notifications: None,
            });
        }

        let pending = self
            .checkouts
            .get_pending(order_id)
            .await?
            .ok_or_else(|| CheckoutError::UnknownCheckout(order_id.to_string()))?;
        let capture = self.verify_with_gateway(order_id).await?;
        self.record(pending, capture).await
    }

    async fn record(
        &self,
        pending: PendingCheckout,
        capture: CaptureResult,
    ) -> Result<Finalized, CheckoutError> {
        let order_id = pending.gateway_order_id.clone();
        let Some(amount_cents) = capture.amount_cents else {
            error!("Payment {} completed without a captured amount", order_id);
            return Err(CheckoutError::MissingAmount { order_id });
        };
        let quoted_cents = pending.total_cents;

        // The money has moved; keep the order and flag it instead of dropping it.
        let mut order = pending.into_order(amount_cents);
        if amount_cents != quoted_cents {
            error!(
                "Payment {} captured {} but the cart totals {}, flagged for review",
                order_id,
                format_cents(amount_cents),
                format_cents(quoted_cents)
            );
            order.quoted_cents = Some(quoted_cents);
        }
        order.capture_id = capture.capture_id.clone();
        order.gateway_status = Some(capture.status.clone());

        match self.orders.append(&order).await {
            Ok(()) => {}
            Err(RepositoryError::Duplicate(_)) => {
                info!("Payment {} recorded concurrently, returning stored order", order_id);
                let stored = self
                    .orders
                    .get(&order_id)
                    .await?
                    .ok_or_else(|| RepositoryError::NotFound(order_id.clone()))?;
                return Ok(Finalized {
                    order: stored,
                    capture,
                    already_recorded: true,
                    notifications: None,
                });
            }
            Err(e) => return Err(e.into()),
        }
        info!("Recorded order {}", order_id);

        if let Err(e) = self.checkouts.remove_pending(&order_id).await {
            warn!("Could not clear pending checkout {}: {}", order_id, e);
        }

        let settings = self.email_settings().await;
        let notifications = self.notifier.dispatch(&order, &settings).await;
        Ok(Finalized {
            order,
            capture,
            already_recorded: false,
            notifications: Some(notifications),
        })
    }

    /// Records an unpaid order under a locally generated id.
    pub async fn place_manual_order(
        &self,
        lines: &[CartLine],
        customer: ValidatedCustomer,
    ) -> Result<(Order, DispatchReport), CheckoutError> {
        let quote = self.quote(lines).await?;
        if quote.lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let order = Order {
            id: Order::local_id(),
            items: quote.lines,
            subtotal_cents: quote.subtotal_cents,
            tax_cents: quote.tax_cents,
            amount_cents: quote.total_cents,
            currency: self.config.currency.clone(),
            customer: customer.into_inner(),
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            capture_id: None,
            gateway_status: None,
            quoted_cents: None,
        };
        self.orders.append(&order).await?;
        info!("Recorded manual order {}", order.id);

        let settings = self.email_settings().await;
        let notifications = self.notifier.dispatch(&order, &settings).await;
        Ok((order, notifications))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use decimal_percentage::Percentage;

    use super::*;
    use crate::checkout::form::{ContactFlow, CustomerInfo};
    use crate::notify::{Delivery, MockMailer};
    use crate::payment::MockPaymentGateway;
    use crate::store::{InMemoryStore, OrderListQuery};

    const VIN: &str = "1HGCM82633A004352";

    fn customer() -> ValidatedCustomer {
        ValidatedCustomer::new(
            CustomerInfo {
                full_name: "Jane Doe".to_string(),
                email: Some("jane@example.com".to_string()),
                vin_number: VIN.to_string(),
                ..CustomerInfo::default()
            },
            ContactFlow::Email,
        )
        .expect("valid customer")
    }

    fn completed(order_id: &str, amount_cents: i64) -> CaptureResult {
        CaptureResult {
            order_id: order_id.to_string(),
            capture_id: Some("CAPTURE9".to_string()),
            status: COMPLETED.to_string(),
            amount_cents: Some(amount_cents),
            currency: Some("USD".to_string()),
        }
    }

    fn quiet_mailer() -> MockMailer {
        let mut mailer = MockMailer::new();
        mailer.expect_send().returning(|_| Ok(()));
        mailer
    }

    fn service(
        gateway: impl PaymentGateway + 'static,
        mailer: MockMailer,
        timeout: Duration,
    ) -> (CheckoutService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let tax_rate = Percentage::from(rust_decimal::Decimal::new(8, 2));
        let prices = Arc::new(PriceService::new(store.clone(), tax_rate));
        let templates = crate::notify::load_templates(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/templates"
        ))
        .expect("templates parse");
        let service = CheckoutService::new(
            prices,
            Arc::new(gateway),
            store.clone(),
            store.clone(),
            store.clone(),
            NotificationDispatcher::new(Arc::new(mailer), Arc::new(templates), "support@example.com"),
            CheckoutSettings {
                currency: "USD".to_string(),
                payment_timeout: timeout,
                admin_email: "admin@example.com".to_string(),
            },
        );
        (service, store)
    }

    #[actix_web::test]
    async fn payment_amount_is_recomputed_from_price_table() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_order()
            .withf(|amount, currency, _| *amount == 9717 && currency == "USD")
            .times(1)
            .returning(|_, _, _| Ok("ORDER123".to_string()));
        let (service, store) = service(gateway, quiet_mailer(), Duration::from_secs(5));

        let created = service
            .create_payment(&[CartLine::new("car-basic", 3)], customer())
            .await
            .expect("payment created");

        assert_eq!(created.order_id, "ORDER123");
        assert_eq!(created.quote.subtotal_cents, 8997);
        assert_eq!(created.quote.tax_cents, 720);
        let pending = store
            .get_pending("ORDER123")
            .await
            .expect("store")
            .expect("pending checkout saved");
        assert_eq!(pending.total_cents, 9717);
        assert_eq!(pending.customer.vin_number, VIN);
    }

    #[actix_web::test]
    async fn cart_without_priced_items_never_reaches_gateway() {
        let gateway = MockPaymentGateway::new();
        let (service, _) = service(gateway, quiet_mailer(), Duration::from_secs(5));

        let result = service
            .create_payment(&[CartLine::new("boat-report", 1)], customer())
            .await;
        assert!(matches!(result, Err(CheckoutError::EmptyCart)));
    }

    #[actix_web::test]
    async fn double_capture_records_one_order() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_order()
            .returning(|_, _, _| Ok("ORDER123".to_string()));
        gateway
            .expect_capture_order()
            .times(1)
            .returning(|id| Ok(completed(id, 9717)));
        let mut mailer = MockMailer::new();
        mailer.expect_send().times(2).returning(|_| Ok(()));
        let (service, store) = service(gateway, mailer, Duration::from_secs(5));

        service
            .create_payment(&[CartLine::new("car-basic", 3)], customer())
            .await
            .expect("created");

        let first = service.capture("ORDER123").await.expect("first capture");
        let second = service.capture("ORDER123").await.expect("second capture");

        assert!(!first.already_recorded);
        assert!(second.already_recorded);
        assert_eq!(first.order, second.order);
        assert_eq!(first.order.amount_cents, 9717);
        assert_eq!(first.order.status, OrderStatus::Pending);
        assert_eq!(first.order.capture_id.as_deref(), Some("CAPTURE9"));
        let notifications = first.notifications.expect("notifications sent");
        assert_eq!(notifications.buyer, Delivery::Sent);
        assert_eq!(notifications.admin, Delivery::Sent);

        let page = store.list(&OrderListQuery::new()).await.expect("list");
        assert_eq!(page.total, 1);
        assert!(store.get_pending("ORDER123").await.expect("store").is_none());
    }

    #[actix_web::test]
    async fn concurrent_duplicate_returns_stored_order() {
        let (service, store) = service(
            MockPaymentGateway::new(),
            quiet_mailer(),
            Duration::from_secs(5),
        );
        let pending = PendingCheckout {
            gateway_order_id: "ORDER123".to_string(),
            items: Vec::new(),
            subtotal_cents: 8997,
            tax_cents: 720,
            total_cents: 9717,
            currency: "USD".to_string(),
            customer: customer().into_inner(),
            contact_flow: ContactFlow::Email,
            created_at: Utc::now(),
        };

        let first = service
            .record(pending.clone(), completed("ORDER123", 9717))
            .await
            .expect("first");
        let second = service
            .record(pending, completed("ORDER123", 9717))
            .await
            .expect("duplicate is a success");

        assert!(!first.already_recorded);
        assert!(second.already_recorded);
        assert_eq!(second.order.id, "ORDER123");
        assert!(second.notifications.is_none());
        assert_eq!(store.list(&OrderListQuery::new()).await.expect("list").total, 1);
    }

    #[actix_web::test]
    async fn incomplete_capture_records_nothing() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_order()
            .returning(|_, _, _| Ok("ORDER123".to_string()));
        gateway.expect_capture_order().returning(|id| {
            let mut result = completed(id, 9717);
            result.status = "PENDING".to_string();
            Ok(result)
        });
        let (service, store) = service(gateway, MockMailer::new(), Duration::from_secs(5));
        service
            .create_payment(&[CartLine::new("car-basic", 3)], customer())
            .await
            .expect("created");

        match service.capture("ORDER123").await {
            Err(CheckoutError::NotCompleted { status, .. }) => assert_eq!(status, "PENDING"),
            other => panic!("expected NotCompleted, got {other:?}"),
        }
        assert!(store.get("ORDER123").await.expect("store").is_none());
    }

    #[actix_web::test]
    async fn mismatched_capture_is_recorded_for_review() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_order()
            .returning(|_, _, _| Ok("ORDER123".to_string()));
        gateway
            .expect_capture_order()
            .returning(|id| Ok(completed(id, 100)));
        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .withf(|email| email.to == "jane@example.com")
            .times(1)
            .returning(|_| Ok(()));
        mailer
            .expect_send()
            .withf(|email| {
                email.to == "admin@example.com" && email.subject == "Order Needs Review - VehicleInfo"
            })
            .times(1)
            .returning(|_| Ok(()));
        let (service, store) = service(gateway, mailer, Duration::from_secs(5));
        service
            .create_payment(&[CartLine::new("car-basic", 3)], customer())
            .await
            .expect("created");

        let finalized = service.capture("ORDER123").await.expect("recorded");
        assert_eq!(finalized.order.amount_cents, 100);
        assert_eq!(finalized.order.quoted_cents, Some(9717));
        assert!(finalized.order.needs_review());

        let stored = store
            .get("ORDER123")
            .await
            .expect("store")
            .expect("order kept");
        assert!(stored.needs_review());
        assert!(store.get_pending("ORDER123").await.expect("store").is_none());
    }

    #[actix_web::test]
    async fn capture_without_amount_is_not_recorded() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_order()
            .returning(|_, _, _| Ok("ORDER123".to_string()));
        gateway.expect_capture_order().returning(|id| {
            let mut result = completed(id, 9717);
            result.amount_cents = None;
            Ok(result)
        });
        let (service, store) = service(gateway, MockMailer::new(), Duration::from_secs(5));
        service
            .create_payment(&[CartLine::new("car-basic", 3)], customer())
            .await
            .expect("created");

        assert!(matches!(
            service.capture("ORDER123").await,
            Err(CheckoutError::MissingAmount { .. })
        ));
        assert!(store.get("ORDER123").await.expect("store").is_none());
        assert!(store.get_pending("ORDER123").await.expect("store").is_some());
    }

    #[actix_web::test]
    async fn already_captured_payment_is_verified_and_recorded_once() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_order()
            .returning(|_, _, _| Ok("ORDER123".to_string()));
        gateway
            .expect_capture_order()
            .times(1)
            .returning(|id| Err(PaymentError::AlreadyCaptured(id.to_string())));
        gateway
            .expect_get_order()
            .times(1)
            .returning(|id| Ok(completed(id, 9717)));
        let mut mailer = MockMailer::new();
        mailer.expect_send().times(2).returning(|_| Ok(()));
        let (service, store) = service(gateway, mailer, Duration::from_secs(5));
        service
            .create_payment(&[CartLine::new("car-basic", 3)], customer())
            .await
            .expect("created");

        let finalized = service.capture("ORDER123").await.expect("verified");
        assert!(!finalized.already_recorded);
        assert_eq!(finalized.order.amount_cents, 9717);
        assert!(!finalized.order.needs_review());
        let notifications = finalized.notifications.expect("dispatched");
        assert_eq!(notifications.buyer, Delivery::Sent);
        assert_eq!(notifications.admin, Delivery::Sent);
        assert_eq!(store.list(&OrderListQuery::new()).await.expect("list").total, 1);

        let again = service.capture("ORDER123").await.expect("stored order");
        assert!(again.already_recorded);
    }

    #[actix_web::test]
    async fn unknown_ids_never_reach_the_gateway() {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_get_order().times(0);
        gateway.expect_capture_order().times(0);
        let (service, _) = service(gateway, MockMailer::new(), Duration::from_secs(5));

        for id in ["UNKNOWN1", "X/../../v1/oauth2/token"] {
            assert!(matches!(
                service.finalize(id).await,
                Err(CheckoutError::UnknownCheckout(_))
            ));
            assert!(matches!(
                service.verify(id).await,
                Err(CheckoutError::UnknownCheckout(_))
            ));
            assert!(matches!(
                service.capture(id).await,
                Err(CheckoutError::UnknownCheckout(_))
            ));
        }
    }

    #[actix_web::test]
    async fn oversized_cart_is_refused_before_payment() {
        let gateway = MockPaymentGateway::new();
        let (service, _) = service(gateway, MockMailer::new(), Duration::from_secs(5));

        let lines = vec![CartLine::new("car-premium", u32::MAX); 2];
        assert!(matches!(
            service.create_payment(&lines, customer()).await,
            Err(CheckoutError::Pricing(PriceError::QuantityLimit { .. }))
        ));
    }

    /// Creates instantly, hangs on capture, reports completion on lookup.
    struct SlowCapture;

    #[async_trait]
    impl PaymentGateway for SlowCapture {
        async fn create_order(&self, _: i64, _: &str, _: &str) -> Result<String, PaymentError> {
            Ok("ORDER123".to_string())
        }

        async fn capture_order(&self, _: &str) -> Result<CaptureResult, PaymentError> {
            actix_web::rt::time::sleep(Duration::from_secs(5)).await;
            Err(PaymentError::Rejected("too late".to_string()))
        }

        async fn get_order(&self, order_id: &str) -> Result<CaptureResult, PaymentError> {
            Ok(completed(order_id, 9717))
        }
    }

    #[actix_web::test]
    async fn capture_timeout_is_resolved_by_verification() {
        let (service, _) = service(SlowCapture, quiet_mailer(), Duration::from_millis(50));
        service
            .create_payment(&[CartLine::new("car-basic", 3)], customer())
            .await
            .expect("created");

        let finalized = service.capture("ORDER123").await.expect("verified");
        assert!(!finalized.already_recorded);
        assert_eq!(finalized.order.amount_cents, 9717);
    }

    #[actix_web::test]
    async fn finalize_requires_completed_payment() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_order()
            .returning(|_, _, _| Ok("ORDER123".to_string()));
        gateway.expect_get_order().returning(|id| {
            let mut result = completed(id, 9717);
            result.status = "APPROVED".to_string();
            Ok(result)
        });
        let (service, _) = service(gateway, MockMailer::new(), Duration::from_secs(5));
        service
            .create_payment(&[CartLine::new("car-basic", 3)], customer())
            .await
            .expect("created");

        assert!(matches!(
            service.finalize("ORDER123").await,
            Err(CheckoutError::NotCompleted { .. })
        ));
    }

    #[actix_web::test]
    async fn manual_order_gets_local_id_and_pending_status() {
        let (service, store) = service(
            MockPaymentGateway::new(),
            quiet_mailer(),
            Duration::from_secs(5),
        );
        let (order, report) = service
            .place_manual_order(&[CartLine::new("truck-report", 1)], customer())
            .await
            .expect("placed");

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.subtotal_cents, 4499);
        assert_eq!(report.admin, Delivery::Sent);
        assert!(store.get(&order.id).await.expect("store").is_some());
    }

    #[actix_web::test]
    async fn email_settings_fall_back_to_configured_admin() {
        let (service, _) = service(
            MockPaymentGateway::new(),
            MockMailer::new(),
            Duration::from_secs(5),
        );
        assert_eq!(service.email_settings().await.admin_email, "admin@example.com");

        let updated = service
            .update_email_settings(EmailSettingsUpdate {
                admin_email: Some("ops@example.com".to_string()),
                ..EmailSettingsUpdate::default()
            })
            .await
            .expect("saved");
        assert_eq!(updated.admin_email, "ops@example.com");
        assert_eq!(service.email_settings().await.admin_email, "ops@example.com");
    }
}
