use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::Method;
use envconfig::Envconfig;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;
use univo::{
    auth::SessionManager,
    config::Config,
    connect_to_db,
    payments::{PaymentProvider, PaymentRelay, StripeProvider, WebhookVerifier},
    store::{DynStore, PgStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::init_from_env().context("invalid configuration")?;
    let sessions = SessionManager::from_base64_secret(&config.session_secret, config.cookie_secure)
        .context("SESSION_SECRET must be valid base64")?;

    let provider = match &config.stripe_secret_key {
        Some(key) => {
            let provider = StripeProvider::new(config.stripe_api_base.clone(), key.clone())?;
            Some(Arc::new(provider) as Arc<dyn PaymentProvider>)
        }
        None => {
            tracing::warn!("STRIPE_SECRET_KEY not set, payment intents are disabled");
            None
        }
    };
    let verifier = config
        .stripe_webhook_secret
        .as_ref()
        .map(|secret| WebhookVerifier::new(secret.as_bytes()));
    if verifier.is_none() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not set, webhooks are rejected");
    }
    let relay = PaymentRelay::new(provider, verifier);

    let pool = connect_to_db(&config.db_url)?;
    let store: DynStore = Arc::new(PgStore::new(pool));

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .allow_origin(Any);
    let app = univo::router(store, sessions, relay, &config.static_dir).layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "listening");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
