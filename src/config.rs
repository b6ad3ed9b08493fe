//! Process configuration read from the environment (and `.env`).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use decimal_percentage::Percentage;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::checkout::service::CheckoutSettings;
use crate::payment::paypal::{PayPalConfig, SANDBOX_API_BASE};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_name: String,
    pub address: String,
    pub port: u16,
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
    /// `None` disables payments.
    pub paypal: Option<PayPalConfig>,
    pub currency: String,
    pub tax_rate: Percentage,
    pub payment_timeout: Duration,
    /// `None` logs mail instead of sending it.
    pub mail: Option<MailConfig>,
    pub support_email: String,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional(lookup, name).ok_or(ConfigError::Missing(name))
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match optional(lookup, name) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

/// Sales tax as a fraction in `[0, 1)`, e.g. `0.08875`. Kept exact.
fn tax_rate(lookup: &impl Fn(&str) -> Option<String>) -> Result<Percentage, ConfigError> {
    let value = optional(lookup, "TAX_RATE").unwrap_or_else(|| "0.08".to_string());
    let invalid = || ConfigError::Invalid {
        name: "TAX_RATE",
        value: value.clone(),
    };
    let fraction: Decimal = value.parse().map_err(|_| invalid())?;
    if fraction.is_sign_negative() || fraction >= Decimal::ONE {
        return Err(invalid());
    }
    Ok(Percentage::from(fraction))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let tax_rate = tax_rate(&lookup)?;

        let paypal = match (
            optional(&lookup, "PAYPAL_CLIENT_ID"),
            optional(&lookup, "PAYPAL_CLIENT_SECRET"),
        ) {
            (Some(client_id), Some(client_secret)) => Some(PayPalConfig {
                client_id,
                client_secret,
                api_base: optional(&lookup, "PAYPAL_API_BASE")
                    .unwrap_or_else(|| SANDBOX_API_BASE.to_string()),
            }),
            _ => None,
        };

        let mail_from = optional(&lookup, "MAIL_FROM");
        let mail = match (
            optional(&lookup, "MAIL_API_URL"),
            optional(&lookup, "MAIL_API_KEY"),
            mail_from.clone(),
        ) {
            (Some(api_url), Some(api_key), Some(from)) => Some(MailConfig {
                api_url,
                api_key,
                from,
            }),
            _ => None,
        };

        let admin_email = optional(&lookup, "ADMIN_EMAIL");
        let support_email = mail_from
            .or_else(|| admin_email.clone())
            .unwrap_or_else(|| "support@localhost".to_string());

        Ok(Self {
            database_url: required(&lookup, "DATABASE_URL")?,
            database_name: optional(&lookup, "DATABASE_NAME")
                .unwrap_or_else(|| "vehicle_reports".to_string()),
            address: optional(&lookup, "ADDRESS").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parsed(&lookup, "PORT", 8080)?,
            jwt_secret: required(&lookup, "JWT_SECRET")?,
            token_ttl_minutes: parsed(&lookup, "TOKEN_TTL_MINUTES", 60)?,
            paypal,
            currency: optional(&lookup, "CURRENCY")
                .map(|c| c.to_uppercase())
                .unwrap_or_else(|| "USD".to_string()),
            tax_rate,
            payment_timeout: Duration::from_secs(parsed(&lookup, "PAYMENT_TIMEOUT_SECS", 30)?),
            mail,
            support_email,
            admin_email,
            admin_password: optional(&lookup, "ADMIN_PASSWORD"),
        })
    }

    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            currency: self.currency.clone(),
            payment_timeout: self.payment_timeout,
            admin_email: self
                .admin_email
                .clone()
                .unwrap_or_else(|| self.support_email.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(move |name| vars.get(name).cloned())
    }

    const BASE: &[(&str, &str)] = &[
        ("DATABASE_URL", "mongodb://localhost:27017"),
        ("JWT_SECRET", "secret"),
    ];

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(BASE).expect("config");
        assert_eq!(config.database_name, "vehicle_reports");
        assert_eq!(config.port, 8080);
        assert_eq!(config.currency, "USD");
        assert_eq!(config.tax_rate * Decimal::ONE, Decimal::new(8, 2));
        assert_eq!(config.payment_timeout, Duration::from_secs(30));
        assert!(config.paypal.is_none());
        assert!(config.mail.is_none());
    }

    #[test]
    fn required_values_are_reported() {
        assert_eq!(
            config(&[("JWT_SECRET", "secret")]).err(),
            Some(ConfigError::Missing("DATABASE_URL"))
        );
        assert_eq!(
            config(&[("DATABASE_URL", "mongodb://x"), ("JWT_SECRET", "  ")]).err(),
            Some(ConfigError::Missing("JWT_SECRET"))
        );
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let mut vars = BASE.to_vec();
        vars.push(("PORT", "eighty"));
        assert!(matches!(
            config(&vars),
            Err(ConfigError::Invalid { name: "PORT", .. })
        ));

        let mut vars = BASE.to_vec();
        vars.push(("TAX_RATE", "8"));
        assert!(matches!(
            config(&vars),
            Err(ConfigError::Invalid { name: "TAX_RATE", .. })
        ));
    }

    #[test]
    fn tax_rate_keeps_sub_basis_point_precision() {
        let mut vars = BASE.to_vec();
        vars.push(("TAX_RATE", "0.08875"));
        let config = config(&vars).expect("config");
        assert_eq!(config.tax_rate * Decimal::ONE, Decimal::new(8875, 5));
    }

    #[test]
    fn paypal_needs_both_credentials() {
        let mut vars = BASE.to_vec();
        vars.push(("PAYPAL_CLIENT_ID", "id"));
        assert!(config(&vars).expect("config").paypal.is_none());

        vars.push(("PAYPAL_CLIENT_SECRET", "secret"));
        let paypal = config(&vars).expect("config").paypal.expect("paypal");
        assert_eq!(paypal.api_base, SANDBOX_API_BASE);
    }
}
