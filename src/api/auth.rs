use crate::{
    auth::{ExtractAuth, SessionManager},
    error::AppResult,
    models::User,
    store::DynStore,
    users::{self, LoginRequest, RegisterRequest},
};
use axum::{
    http::{header::SET_COOKIE, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};

async fn register(
    Extension(store): Extension<DynStore>,
    Extension(sessions): Extension<SessionManager>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let user = users::register(&store, req).await?;
    let cookie = sessions.start(&store, user.id).await?;
    Ok((StatusCode::CREATED, [(SET_COOKIE, cookie)], Json(user)))
}

async fn login(
    Extension(store): Extension<DynStore>,
    Extension(sessions): Extension<SessionManager>,
    Json(req): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let user = users::login(&store, req).await?;
    let cookie = sessions.start(&store, user.id).await?;
    Ok(([(SET_COOKIE, cookie)], Json(user)))
}

async fn logout(
    Extension(store): Extension<DynStore>,
    Extension(sessions): Extension<SessionManager>,
    ExtractAuth(auth): ExtractAuth,
) -> AppResult<impl IntoResponse> {
    let cookie = sessions.end(&store, &auth.session_id).await?;
    Ok(([(SET_COOKIE, cookie)], Json(serde_json::json!({}))))
}

async fn me(ExtractAuth(auth): ExtractAuth) -> Json<User> {
    Json(auth.user)
}

pub fn app() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}
