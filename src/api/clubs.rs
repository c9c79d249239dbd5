use crate::{
    auth::ExtractAuth,
    clubs::{self, ClubStats, CreateClub},
    error::AppResult,
    membership::{self, AddMember},
    models::{Club, ClubChanges, ClubMember, MemberChanges},
    store::{ClubFilter, DynStore},
};
use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::{get, patch},
    Extension, Json, Router,
};

async fn list(
    Extension(store): Extension<DynStore>,
    Query(filter): Query<ClubFilter>,
) -> AppResult<Json<Vec<Club>>> {
    Ok(Json(clubs::list(&store, filter).await?))
}

async fn create(
    Extension(store): Extension<DynStore>,
    ExtractAuth(auth): ExtractAuth,
    Json(req): Json<CreateClub>,
) -> AppResult<(StatusCode, Json<Club>)> {
    let (club, _admin) = clubs::create(&store, auth.id(), req).await?;
    Ok((StatusCode::CREATED, Json(club)))
}

async fn info(
    Extension(store): Extension<DynStore>,
    Path(club_id): Path<i32>,
) -> AppResult<Json<Club>> {
    Ok(Json(clubs::get(&store, club_id).await?))
}

async fn update(
    Extension(store): Extension<DynStore>,
    Path(club_id): Path<i32>,
    ExtractAuth(auth): ExtractAuth,
    Json(changes): Json<ClubChanges>,
) -> AppResult<Json<Club>> {
    Ok(Json(clubs::update(&store, auth.id(), club_id, changes).await?))
}

async fn stats(
    Extension(store): Extension<DynStore>,
    Path(club_id): Path<i32>,
) -> AppResult<Json<ClubStats>> {
    Ok(Json(clubs::stats(&store, club_id).await?))
}

async fn list_members(
    Extension(store): Extension<DynStore>,
    Path(club_id): Path<i32>,
    ExtractAuth(_): ExtractAuth,
) -> AppResult<Json<Vec<ClubMember>>> {
    Ok(Json(membership::list_members(&store, club_id).await?))
}

async fn add_member(
    Extension(store): Extension<DynStore>,
    Path(club_id): Path<i32>,
    ExtractAuth(auth): ExtractAuth,
    Json(req): Json<AddMember>,
) -> AppResult<(StatusCode, Json<ClubMember>)> {
    let member = membership::add_member(&store, auth.id(), club_id, req).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

async fn update_member(
    Extension(store): Extension<DynStore>,
    Path(member_id): Path<i32>,
    ExtractAuth(auth): ExtractAuth,
    Json(changes): Json<MemberChanges>,
) -> AppResult<Json<ClubMember>> {
    Ok(Json(
        membership::update_member(&store, auth.id(), member_id, changes).await?,
    ))
}

async fn remove_member(
    Extension(store): Extension<DynStore>,
    Path(member_id): Path<i32>,
    ExtractAuth(auth): ExtractAuth,
) -> AppResult<StatusCode> {
    membership::remove_member(&store, auth.id(), member_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn app() -> Router {
    Router::new()
        .route("/clubs", get(list).post(create))
        .route("/clubs/:id", get(info).patch(update))
        .route("/clubs/:id/stats", get(stats))
        .route("/clubs/:id/members", get(list_members).post(add_member))
        .route("/club-members/:id", patch(update_member).delete(remove_member))
}
