use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use env_logger::Env;
use log::{error, info, warn};

use vehicle_reports::auth::{self, TokenIssuer};
use vehicle_reports::config::Config;
use vehicle_reports::db;
use vehicle_reports::notify::{self, HttpMailer, LogMailer, Mailer};
use vehicle_reports::payment::{DisabledGateway, PayPalGateway, PaymentGateway};
use vehicle_reports::routes;
use vehicle_reports::state::{AppState, Services};
use vehicle_reports::store::MongoStore;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let templates = match notify::load_templates("templates") {
        Ok(templates) => Arc::new(templates),
        Err(e) => {
            error!("Failed to load e-mail templates: {}", e);
            std::process::exit(1);
        }
    };

    let database = match db::connect(&config.database_url, &config.database_name).await {
        Ok(database) => database,
        Err(e) => {
            error!("Failed to connect to MongoDB: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = db::ensure_indexes(&database).await {
        warn!("Could not create indexes: {}", e);
    }
    let store = Arc::new(MongoStore::new(database));

    if let Err(e) = auth::ensure_bootstrap_admin(
        store.as_ref(),
        config.admin_email.as_deref(),
        config.admin_password.as_deref(),
    )
    .await
    {
        error!("Failed to create admin account: {}", e);
        std::process::exit(1);
    }

    let gateway: Arc<dyn PaymentGateway> = match config.paypal.clone() {
        Some(paypal) => {
            info!("Payments go to {}", paypal.api_base);
            Arc::new(PayPalGateway::new(paypal))
        }
        None => {
            warn!("PAYPAL_CLIENT_ID/PAYPAL_CLIENT_SECRET not set; payments are disabled");
            Arc::new(DisabledGateway)
        }
    };

    let mailer: Arc<dyn Mailer> = match config.mail.clone() {
        Some(mail) => Arc::new(HttpMailer::new(mail.api_url, mail.api_key, mail.from)),
        None => {
            warn!("Mail relay not configured; e-mails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let tokens = Arc::new(TokenIssuer::new(
        config.jwt_secret.clone(),
        config.token_ttl_minutes,
    ));
    let state = web::Data::new(AppState::new(
        store,
        Services {
            gateway,
            mailer,
            tokens: tokens.clone(),
            checkout: config.checkout_settings(),
            tax_rate: config.tax_rate,
            templates,
            support_email: config.support_email.clone(),
        },
    ));

    let bind_address = (config.address.clone(), config.port);
    info!("Starting server on {}:{}", bind_address.0, bind_address.1);

    HttpServer::new(move || {
        let tokens = tokens.clone();
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .app_data(routes::json_config())
            .app_data(routes::query_config())
            .configure(move |cfg| routes::configure(cfg, tokens))
    })
    .bind(bind_address)?
    .run()
    .await
}
