use crate::{
    auth::{ExtractAuth, MaybeAuth},
    error::AppResult,
    events::{self, CreateEvent, CreateRsvp, EventQuery},
    models::{Event, EventChanges, Rsvp},
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
    Query(query): Query<EventQuery>,
) -> AppResult<Json<Vec<Event>>> {
    Ok(Json(events::list(&store, query).await?))
}

async fn create(
    Extension(store): Extension<DynStore>,
    ExtractAuth(auth): ExtractAuth,
    Json(req): Json<CreateEvent>,
) -> AppResult<(StatusCode, Json<Event>)> {
    let event = events::create(&store, auth.id(), req).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn info(
    Extension(store): Extension<DynStore>,
    Path(id): Path<i32>,
) -> AppResult<Json<Event>> {
    Ok(Json(events::get(&store, id).await?))
}

async fn update(
    Extension(store): Extension<DynStore>,
    Path(id): Path<i32>,
    ExtractAuth(auth): ExtractAuth,
    Json(changes): Json<EventChanges>,
) -> AppResult<Json<Event>> {
    Ok(Json(events::update(&store, auth.id(), id, changes).await?))
}

async fn delete(
    Extension(store): Extension<DynStore>,
    Path(id): Path<i32>,
    ExtractAuth(auth): ExtractAuth,
) -> AppResult<StatusCode> {
    events::delete(&store, auth.id(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_rsvps(
    Extension(store): Extension<DynStore>,
    Path(id): Path<i32>,
    ExtractAuth(auth): ExtractAuth,
) -> AppResult<Json<Vec<Rsvp>>> {
    Ok(Json(events::list_rsvps(&store, auth.id(), id).await?))
}

async fn rsvp(
    Extension(store): Extension<DynStore>,
    MaybeAuth(auth): MaybeAuth,
    Json(req): Json<CreateRsvp>,
) -> AppResult<(StatusCode, Json<Rsvp>)> {
    let rsvp = events::rsvp(&store, auth.map(|a| a.id()), req).await?;
    Ok((StatusCode::CREATED, Json(rsvp)))
}

pub fn app() -> Router {
    Router::new()
        .route("/events", get(list).post(create))
        .route("/events/:id", get(info).patch(update).delete(delete))
        .route("/events/:id/rsvps", get(list_rsvps))
        .route("/rsvps", post(rsvp))
}
