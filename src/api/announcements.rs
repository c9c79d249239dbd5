use crate::{
    announcements::{self, AnnouncementQuery, CreateAnnouncement},
    auth::ExtractAuth,
    error::AppResult,
    models::Announcement,
    store::DynStore,
};
use axum::{extract::Query, http::StatusCode, routing::get, Extension, Json, Router};

async fn list(
    Extension(store): Extension<DynStore>,
    ExtractAuth(auth): ExtractAuth,
    Query(query): Query<AnnouncementQuery>,
) -> AppResult<Json<Vec<Announcement>>> {
    Ok(Json(announcements::list(&store, auth.id(), query).await?))
}

async fn post(
    Extension(store): Extension<DynStore>,
    ExtractAuth(auth): ExtractAuth,
    Json(req): Json<CreateAnnouncement>,
) -> AppResult<(StatusCode, Json<Announcement>)> {
    let announcement = announcements::post(&store, auth.id(), req).await?;
    Ok((StatusCode::CREATED, Json(announcement)))
}

pub fn app() -> Router {
    Router::new().route("/announcements", get(list).post(post))
}
