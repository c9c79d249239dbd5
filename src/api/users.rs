use super::Segment;
use crate::{
    applications,
    auth::{ExtractAuth, MaybeAuth},
    clubs::{self, Membership},
    dues,
    error::{AppResult, Error},
    models::{ClubApplication, DuesPayment, UserChanges},
    store::DynStore,
    users,
};
use axum::{
    extract::Path,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};

/// `GET /users/me` is the caller's own account, any other id a public profile.
async fn show(
    Extension(store): Extension<DynStore>,
    Path(id): Path<String>,
    MaybeAuth(auth): MaybeAuth,
) -> AppResult<Response> {
    match Segment::parse(&id, "me")? {
        Segment::Keyword => match auth {
            Some(auth) => Ok(Json(auth.user).into_response()),
            None => Err(Error::Unauthorized.into()),
        },
        Segment::Id(id) => Ok(Json(users::profile(&store, id).await?).into_response()),
    }
}

async fn update(
    Extension(store): Extension<DynStore>,
    Path(id): Path<String>,
    ExtractAuth(auth): ExtractAuth,
    Json(changes): Json<UserChanges>,
) -> AppResult<Response> {
    match Segment::parse(&id, "me")? {
        Segment::Id(id) if id != auth.id() => {
            Err(Error::forbidden("only your own profile can be edited").into())
        }
        _ => Ok(Json(users::update_profile(&store, auth.id(), changes).await?).into_response()),
    }
}

async fn my_clubs(
    Extension(store): Extension<DynStore>,
    ExtractAuth(auth): ExtractAuth,
) -> AppResult<Json<Vec<Membership>>> {
    Ok(Json(clubs::for_user(&store, auth.id()).await?))
}

async fn my_applications(
    Extension(store): Extension<DynStore>,
    ExtractAuth(auth): ExtractAuth,
) -> AppResult<Json<Vec<ClubApplication>>> {
    Ok(Json(applications::list_for_user(&store, auth.id()).await?))
}

async fn my_dues_payments(
    Extension(store): Extension<DynStore>,
    ExtractAuth(auth): ExtractAuth,
) -> AppResult<Json<Vec<DuesPayment>>> {
    Ok(Json(dues::list_own_payments(&store, auth.id()).await?))
}

pub fn app() -> Router {
    Router::new()
        .route("/users/:id", get(show).patch(update))
        .route("/me/clubs", get(my_clubs))
        .route("/me/applications", get(my_applications))
        .route("/me/dues-payments", get(my_dues_payments))
}
