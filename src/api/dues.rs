use crate::{
    auth::ExtractAuth,
    dues::{self, CreateDues, DuesQuery, PayDues},
    error::AppResult,
    models::{ClubDues, DuesChanges, DuesPayment},
    store::DynStore,
};
use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};

async fn list(
    Extension(store): Extension<DynStore>,
    Path(club_id): Path<i32>,
    Query(query): Query<DuesQuery>,
    ExtractAuth(auth): ExtractAuth,
) -> AppResult<Json<Vec<ClubDues>>> {
    Ok(Json(dues::list(&store, auth.id(), club_id, query).await?))
}

async fn create(
    Extension(store): Extension<DynStore>,
    Path(club_id): Path<i32>,
    ExtractAuth(auth): ExtractAuth,
    Json(req): Json<CreateDues>,
) -> AppResult<(StatusCode, Json<ClubDues>)> {
    let dues = dues::create(&store, auth.id(), club_id, req).await?;
    Ok((StatusCode::CREATED, Json(dues)))
}

async fn update(
    Extension(store): Extension<DynStore>,
    Path(id): Path<i32>,
    ExtractAuth(auth): ExtractAuth,
    Json(changes): Json<DuesChanges>,
) -> AppResult<Json<ClubDues>> {
    Ok(Json(dues::update(&store, auth.id(), id, changes).await?))
}

async fn list_payments(
    Extension(store): Extension<DynStore>,
    Path(id): Path<i32>,
    ExtractAuth(auth): ExtractAuth,
) -> AppResult<Json<Vec<DuesPayment>>> {
    Ok(Json(dues::list_payments(&store, auth.id(), id).await?))
}

async fn pay(
    Extension(store): Extension<DynStore>,
    ExtractAuth(auth): ExtractAuth,
    Json(req): Json<PayDues>,
) -> AppResult<(StatusCode, Json<DuesPayment>)> {
    let payment = dues::pay(&store, auth.id(), req.dues_id).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

pub fn app() -> Router {
    Router::new()
        .route("/clubs/:id/dues", get(list).post(create))
        .route("/dues/:id", patch(update))
        .route("/dues/:id/payments", get(list_payments))
        .route("/dues-payments", post(pay))
}
