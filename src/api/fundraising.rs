use crate::{
    auth::{ExtractAuth, MaybeAuth},
    error::AppResult,
    fundraising::{self, CampaignQuery, CreateCampaign, CreateDonation, PublicDonation},
    models::{Campaign, CampaignChanges, Donation},
    store::DynStore,
};
use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};

async fn list(
    Extension(store): Extension<DynStore>,
    Query(query): Query<CampaignQuery>,
) -> AppResult<Json<Vec<Campaign>>> {
    Ok(Json(fundraising::list(&store, query).await?))
}

async fn create(
    Extension(store): Extension<DynStore>,
    ExtractAuth(auth): ExtractAuth,
    Json(req): Json<CreateCampaign>,
) -> AppResult<(StatusCode, Json<Campaign>)> {
    let campaign = fundraising::create(&store, auth.id(), req).await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

async fn info(
    Extension(store): Extension<DynStore>,
    Path(id): Path<i32>,
) -> AppResult<Json<Campaign>> {
    Ok(Json(fundraising::get(&store, id).await?))
}

async fn update(
    Extension(store): Extension<DynStore>,
    Path(id): Path<i32>,
    ExtractAuth(auth): ExtractAuth,
    Json(changes): Json<CampaignChanges>,
) -> AppResult<Json<Campaign>> {
    Ok(Json(fundraising::update(&store, auth.id(), id, changes).await?))
}

async fn list_donations(
    Extension(store): Extension<DynStore>,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<PublicDonation>>> {
    Ok(Json(fundraising::list_donations(&store, id).await?))
}

async fn donate(
    Extension(store): Extension<DynStore>,
    MaybeAuth(auth): MaybeAuth,
    Json(req): Json<CreateDonation>,
) -> AppResult<(StatusCode, Json<Donation>)> {
    let donation = fundraising::donate(&store, auth.map(|a| a.id()), req).await?;
    Ok((StatusCode::CREATED, Json(donation)))
}

pub fn app() -> Router {
    Router::new()
        .route("/campaigns", get(list).post(create))
        .route("/campaigns/:id", get(info).patch(update))
        .route("/campaigns/:id/donations", get(list_donations))
        .route("/donations", post(donate))
}
