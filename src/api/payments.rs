use crate::{
    error::AppResult,
    payments::{self, CreateIntentRequest, CreateIntentResponse, PaymentRelay},
    store::DynStore,
};
use axum::{
    body::Bytes,
    http::{HeaderMap, StatusCode},
    routing::post,
    Extension, Json, Router,
};

async fn create_payment_intent(
    Extension(store): Extension<DynStore>,
    Extension(relay): Extension<PaymentRelay>,
    Json(req): Json<CreateIntentRequest>,
) -> AppResult<Json<CreateIntentResponse>> {
    Ok(Json(
        payments::create_payment_intent(&store, &relay, req).await?,
    ))
}

/// The raw body is needed as sent; the signature covers its exact bytes.
async fn stripe_webhook(
    Extension(store): Extension<DynStore>,
    Extension(relay): Extension<PaymentRelay>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<StatusCode> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok());
    payments::handle_webhook(&store, &relay, signature, &body).await?;
    Ok(StatusCode::OK)
}

pub fn app() -> Router {
    Router::new()
        .route("/create-payment-intent", post(create_payment_intent))
        .route("/stripe-webhook", post(stripe_webhook))
}
