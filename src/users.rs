use crate::{
    auth,
    error::{Error, Result},
    models::{NewUser, PublicUser, User, UserChanges},
    store::DynStore,
    validate,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[instrument(skip_all, fields(username = %req.username))]
pub async fn register(store: &DynStore, req: RegisterRequest) -> Result<User> {
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(Error::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let password_hash = auth::hash_password(&req.password)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?;

    let user = store
        .insert_user(NewUser {
            username: validate::required("username", &req.username)?,
            email: validate::email(&req.email)?.to_lowercase(),
            password_hash,
            first_name: validate::required("firstName", &req.first_name)?,
            last_name: validate::required("lastName", &req.last_name)?,
            created_at: Utc::now(),
        })
        .await?;
    tracing::info!(user_id = user.id, "user registered");
    Ok(user)
}

/// Unknown user and wrong password fail the same way.
#[instrument(skip_all, fields(username = %req.username))]
pub async fn login(store: &DynStore, req: LoginRequest) -> Result<User> {
    if let Some(user) = store.find_user_by_username(req.username.trim()).await? {
        let valid = auth::verify_password(&req.password, &user.password_hash)
            .map_err(|e| anyhow::anyhow!("stored password hash is unreadable: {e}"))?;
        if valid {
            return Ok(user);
        }
    }
    Err(Error::Unauthorized)
}

pub async fn profile(store: &DynStore, id: i32) -> Result<PublicUser> {
    store
        .find_user(id)
        .await?
        .map(PublicUser::from)
        .ok_or(Error::NotFound("user"))
}

#[instrument(skip(store))]
pub async fn update_profile(store: &DynStore, id: i32, changes: UserChanges) -> Result<User> {
    let changes = UserChanges {
        first_name: changes
            .first_name
            .map(|n| validate::required("firstName", &n))
            .transpose()?,
        last_name: changes
            .last_name
            .map(|n| validate::required("lastName", &n))
            .transpose()?,
        avatar: validate::url("avatar", changes.avatar)?,
        ..changes
    };
    store.update_user(id, changes).await
}
