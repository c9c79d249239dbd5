use std::io;

use axum::{http::StatusCode, routing::get_service, Extension, Router};
use tower_http::services::ServeDir;

pub mod announcements;
pub mod api;
pub mod applications;
pub mod auth;
pub mod clubs;
pub mod config;
pub mod dues;
pub mod error;
pub mod events;
pub mod fundraising;
pub mod membership;
pub mod models;
pub mod notifications;
pub mod payments;
pub mod retry;
pub mod schema;
pub mod store;
pub mod users;
pub mod validate;

pub use store::{connect_to_db, DbPool};

pub fn app(static_dir: &str) -> Router {
    let serve = get_service(ServeDir::new(static_dir)).handle_error(handle_error);
    Router::new()
        .nest("/api", api::app())
        .nest("/assets", serve)
}

/// The full application with its shared state attached.
pub fn router(
    store: store::DynStore,
    sessions: auth::SessionManager,
    relay: payments::PaymentRelay,
    static_dir: &str,
) -> Router {
    app(static_dir)
        .layer(Extension(store))
        .layer(Extension(sessions))
        .layer(Extension(relay))
}

async fn handle_error(_: io::Error) -> error::AppError {
    error::AppError::from(StatusCode::INTERNAL_SERVER_ERROR, "failed to fetch asset")
}
