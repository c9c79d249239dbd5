use super::Segment;
use crate::{
    auth::ExtractAuth,
    error::{AppResult, Error},
    models::Notification,
    notifications,
    store::DynStore,
};
use axum::{extract::Path, routing::get, Extension, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct MarkAllResponse {
    updated: usize,
}

async fn list(
    Extension(store): Extension<DynStore>,
    ExtractAuth(auth): ExtractAuth,
) -> AppResult<Json<Vec<Notification>>> {
    Ok(Json(notifications::list(&store, auth.id()).await?))
}

fn notification_id(raw: &str) -> AppResult<i32> {
    match Segment::parse(raw, "mark-all-read")? {
        Segment::Id(id) => Ok(id),
        Segment::Keyword => Err(Error::NotFound("notification").into()),
    }
}

async fn info(
    Extension(store): Extension<DynStore>,
    Path(id): Path<String>,
    ExtractAuth(auth): ExtractAuth,
) -> AppResult<Json<Notification>> {
    let id = notification_id(&id)?;
    Ok(Json(notifications::get(&store, auth.id(), id).await?))
}

async fn mark_read(
    Extension(store): Extension<DynStore>,
    Path(id): Path<String>,
    ExtractAuth(auth): ExtractAuth,
) -> AppResult<Json<Notification>> {
    let id = notification_id(&id)?;
    Ok(Json(notifications::mark_read(&store, auth.id(), id).await?))
}

/// `POST /notifications/mark-all-read`
async fn mark_all_read(
    Extension(store): Extension<DynStore>,
    Path(keyword): Path<String>,
    ExtractAuth(auth): ExtractAuth,
) -> AppResult<Json<MarkAllResponse>> {
    match Segment::parse(&keyword, "mark-all-read")? {
        Segment::Keyword => Ok(Json(MarkAllResponse {
            updated: notifications::mark_all_read(&store, auth.id()).await?,
        })),
        Segment::Id(_) => Err(Error::NotFound("route").into()),
    }
}

pub fn app() -> Router {
    Router::new()
        .route("/notifications", get(list))
        .route(
            "/notifications/:id",
            get(info).patch(mark_read).post(mark_all_read),
        )
}
