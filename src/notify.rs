//! Order e-mails.
//!
//! Buyer and admin messages are independent: one failing never stops the
//! other and never undoes the order they describe.

use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tera::{Context, Tera};
use thiserror::Error;

use crate::models::{EmailSettings, Order};
use crate::pricing::format_cents;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub reply_to: Option<String>,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("mail relay unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail relay refused message: {0}")]
    Rejected(String),
    #[error("failed to render e-mail: {0}")]
    Template(#[from] tera::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), NotificationError>;
}

/// Posts messages to a transactional mail HTTP API.
pub struct HttpMailer {
    http: Client,
    url: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
            api_key: api_key.into(),
            from: from.into(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &Email) -> Result<(), NotificationError> {
        let body = json!({
            "from": self.from,
            "to": email.to,
            "subject": email.subject,
            "html": email.html,
            "reply_to": email.reply_to,
        });
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected(format!("status {status}: {text}")));
        }
        Ok(())
    }
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), NotificationError> {
        info!("Mail relay not configured; would send {:?} to {}", email.subject, email.to);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Delivery {
    Sent,
    Skipped { reason: String },
    Failed { error: String },
}

impl Delivery {
    fn skipped(reason: &str) -> Self {
        Self::Skipped {
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub buyer: Delivery,
    pub admin: Delivery,
}

/// A visitor message from the storefront contact form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
}

/// Loads every template below `dir`, e.g. `"templates"`.
pub fn load_templates(dir: &str) -> Result<Tera, tera::Error> {
    Tera::new(&format!("{}/**/*", dir.trim_end_matches('/')))
}

#[derive(Serialize)]
struct ItemRow<'a> {
    title: &'a str,
    quantity: u32,
    price: String,
}

fn item_rows(order: &Order) -> Vec<ItemRow<'_>> {
    order
        .items
        .iter()
        .map(|item| ItemRow {
            title: &item.title,
            quantity: item.quantity,
            price: format_cents(item.unit_price_cents),
        })
        .collect()
}

fn order_context(order: &Order) -> Context {
    let mut context = Context::new();
    context.insert("order_id", &order.id);
    context.insert("name", &order.customer.full_name);
    context.insert("vin", &order.customer.vin_number);
    context.insert("email", &order.buyer_email());
    context.insert("phone", &order.customer.phone_number);
    context.insert("subtotal", &format_cents(order.subtotal_cents));
    context.insert("tax", &format_cents(order.tax_cents));
    context.insert("total", &format_cents(order.amount_cents));
    context.insert("currency", &order.currency);
    context.insert("items", &item_rows(order));
    context.insert("needs_review", &order.needs_review());
    context.insert("quoted_total", &order.quoted_cents.map(format_cents));
    context
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    mailer: Arc<dyn Mailer>,
    templates: Arc<Tera>,
    support_email: String,
}

impl NotificationDispatcher {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        templates: Arc<Tera>,
        support_email: impl Into<String>,
    ) -> Self {
        Self {
            mailer,
            templates,
            support_email: support_email.into(),
        }
    }

    async fn deliver(
        &self,
        kind: &str,
        order_id: &str,
        email: Result<Email, NotificationError>,
    ) -> Delivery {
        let result = match email {
            Ok(email) => self.mailer.send(&email).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                info!("Sent {} e-mail for order {}", kind, order_id);
                Delivery::Sent
            }
            Err(e) => {
                error!("Failed to send {} e-mail for order {}: {}", kind, order_id, e);
                Delivery::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    fn buyer_confirmation(
        &self,
        to: &str,
        order: &Order,
        settings: &EmailSettings,
    ) -> Result<Email, NotificationError> {
        let mut context = order_context(order);
        context.insert("support_email", &self.support_email);
        context.insert("signature", &settings.email_signature);
        Ok(Email {
            to: to.to_string(),
            subject: "Order Confirmation - VehicleInfo".to_string(),
            html: self
                .templates
                .render("email/buyer_confirmation.html", &context)?,
            reply_to: None,
        })
    }

    fn admin_notification(
        &self,
        order: &Order,
        settings: &EmailSettings,
    ) -> Result<Email, NotificationError> {
        let subject = if order.needs_review() {
            "Order Needs Review - VehicleInfo"
        } else {
            "New Order Received - VehicleInfo"
        };
        Ok(Email {
            to: settings.admin_email.clone(),
            subject: subject.to_string(),
            html: self
                .templates
                .render("email/admin_notification.html", &order_context(order))?,
            reply_to: order.buyer_email().map(str::to_string),
        })
    }

    /// Skipped when the order carries no buyer address (phone flow).
    pub async fn send_buyer_confirmation(&self, order: &Order, settings: &EmailSettings) -> Delivery {
        let Some(to) = order.buyer_email() else {
            return Delivery::skipped("no buyer e-mail address");
        };
        let email = self.buyer_confirmation(to, order, settings);
        self.deliver("confirmation", &order.id, email).await
    }

    pub async fn send_admin_notification(&self, order: &Order, settings: &EmailSettings) -> Delivery {
        if !settings.notification_enabled && !order.needs_review() {
            return Delivery::skipped("admin notifications disabled");
        }
        if settings.admin_email.is_empty() {
            return Delivery::skipped("no admin e-mail address");
        }
        let email = self.admin_notification(order, settings);
        self.deliver("admin notification", &order.id, email).await
    }

    /// Sends both messages concurrently and waits for both.
    pub async fn dispatch(&self, order: &Order, settings: &EmailSettings) -> DispatchReport {
        let (buyer, admin) = futures::join!(
            self.send_buyer_confirmation(order, settings),
            self.send_admin_notification(order, settings)
        );
        DispatchReport { buyer, admin }
    }

    /// Forwards a contact-form message to the admin inbox.
    pub async fn send_contact_message(
        &self,
        message: &ContactMessage,
        settings: &EmailSettings,
    ) -> Result<(), NotificationError> {
        let subject = message
            .subject
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| format!("New Contact Form Message from {}", message.name));

        let mut context = Context::new();
        context.insert("name", &message.name);
        context.insert("email", &message.email);
        context.insert("message", &message.message);
        let email = Email {
            to: settings.admin_email.clone(),
            subject,
            html: self.templates.render("email/contact.html", &context)?,
            reply_to: Some(message.email.clone()),
        };
        self.mailer.send(&email).await.map_err(|e| {
            error!("Failed to forward contact message: {}", e);
            e
        })
    }
}
