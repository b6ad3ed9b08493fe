use std::sync::Arc;

use decimal_percentage::Percentage;
use tera::Tera;

use crate::auth::TokenIssuer;
use crate::checkout::service::{CheckoutService, CheckoutSettings};
use crate::notify::{Mailer, NotificationDispatcher};
use crate::payment::PaymentGateway;
use crate::pricing::PriceService;
use crate::store::{
    AdminRepository, CheckoutRepository, OrderRepository, SettingsRepository, DEFAULT_PAGE_SIZE,
};

/// Shared handler state, registered once as `web::Data<AppState>`.
pub struct AppState {
    pub checkout: CheckoutService,
    pub prices: Arc<PriceService>,
    pub orders: Arc<dyn OrderRepository>,
    pub admins: Arc<dyn AdminRepository>,
    pub tokens: Arc<TokenIssuer>,
    pub notifier: NotificationDispatcher,
    pub page_size: usize,
}

/// Wiring inputs that vary between production and tests.
pub struct Services {
    pub gateway: Arc<dyn PaymentGateway>,
    pub mailer: Arc<dyn Mailer>,
    pub tokens: Arc<TokenIssuer>,
    pub checkout: CheckoutSettings,
    pub tax_rate: Percentage,
    /// E-mail bodies, loaded from `templates/email/`.
    pub templates: Arc<Tera>,
    pub support_email: String,
}

impl AppState {
    /// Builds the state over one store implementing every repository.
    pub fn new<S>(store: Arc<S>, services: Services) -> Self
    where
        S: OrderRepository + CheckoutRepository + SettingsRepository + AdminRepository + 'static,
    {
        let prices = Arc::new(PriceService::new(store.clone(), services.tax_rate));
        let notifier = NotificationDispatcher::new(
            services.mailer,
            services.templates,
            services.support_email,
        );
        let checkout = CheckoutService::new(
            prices.clone(),
            services.gateway,
            store.clone(),
            store.clone(),
            store.clone(),
            notifier.clone(),
            services.checkout,
        );

        Self {
            checkout,
            prices,
            orders: store.clone(),
            admins: store,
            tokens: services.tokens,
            notifier,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}
