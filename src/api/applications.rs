use crate::{
    applications,
    auth::ExtractAuth,
    error::AppResult,
    models::{ApplicationStatus, ClubApplication},
    store::{DynStore, ReviewOutcome},
};
use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyRequest {
    #[serde(default)]
    cover_letter: String,
}

#[derive(Deserialize)]
struct StatusQuery {
    status: Option<ApplicationStatus>,
}

#[derive(Deserialize)]
struct ReviewRequest {
    status: ApplicationStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReviewResponse {
    application: ClubApplication,
    member: Option<crate::models::ClubMember>,
}

impl From<ReviewOutcome> for ReviewResponse {
    fn from(outcome: ReviewOutcome) -> Self {
        Self {
            application: outcome.application,
            member: outcome.member,
        }
    }
}

async fn apply(
    Extension(store): Extension<DynStore>,
    Path(club_id): Path<i32>,
    ExtractAuth(auth): ExtractAuth,
    Json(req): Json<ApplyRequest>,
) -> AppResult<(StatusCode, Json<ClubApplication>)> {
    let application = applications::apply(&store, club_id, auth.id(), req.cover_letter).await?;
    Ok((StatusCode::CREATED, Json(application)))
}

async fn list_for_club(
    Extension(store): Extension<DynStore>,
    Path(club_id): Path<i32>,
    Query(query): Query<StatusQuery>,
    ExtractAuth(auth): ExtractAuth,
) -> AppResult<Json<Vec<ClubApplication>>> {
    Ok(Json(
        applications::list_for_club(&store, club_id, auth.id(), query.status).await?,
    ))
}

async fn review(
    Extension(store): Extension<DynStore>,
    Path(application_id): Path<i32>,
    ExtractAuth(auth): ExtractAuth,
    Json(req): Json<ReviewRequest>,
) -> AppResult<Json<ReviewResponse>> {
    let outcome = applications::review(&store, application_id, req.status, auth.id()).await?;
    Ok(Json(outcome.into()))
}

async fn withdraw(
    Extension(store): Extension<DynStore>,
    Path(application_id): Path<i32>,
    ExtractAuth(auth): ExtractAuth,
) -> AppResult<StatusCode> {
    applications::withdraw(&store, application_id, auth.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn app() -> Router {
    Router::new()
        .route("/clubs/:id/apply", post(apply))
        .route("/clubs/:id/applications", get(list_for_club))
        .route("/club-applications/:id", patch(review).delete(withdraw))
}
