use crate::{
    error::{AppError, Error},
    models::{Session, User},
    store::DynStore,
};
use argon2::Argon2;
use async_trait::async_trait;
use axum::{
    extract::{FromRequest, RequestParts},
    headers::{Cookie, HeaderMapExt},
    Extension,
};
use chrono::Utc;
use jsonwebtoken::{
    errors::Result as JwtResult, DecodingKey, EncodingKey, Header, TokenData, Validation,
};
use password_hash::{
    self, rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

pub const SESSION_COOKIE: &str = "univo_session";
pub const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub fn hash_password(password: impl AsRef<[u8]>) -> password_hash::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_ref(), &salt)
        .map(|h| h.to_string())
}

pub fn verify_password(
    password: impl AsRef<[u8]>,
    password_hash: impl AsRef<str>,
) -> password_hash::Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash.as_ref())?;
    Ok(Argon2::default()
        .verify_password(password.as_ref(), &parsed_hash)
        .is_ok())
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sid: String,
    pub uid: i32,
    pub exp: u64,
}

/// Issues and checks session cookies. The cookie carries a signed token; the
/// `sessions` row it names has to exist and be unexpired as well.
#[derive(Clone)]
pub struct SessionManager {
    keys: Arc<Keys>,
    secure: bool,
}

impl SessionManager {
    pub fn from_base64_secret(secret: &str, secure: bool) -> JwtResult<Self> {
        Ok(Self {
            keys: Arc::new(Keys {
                encoding: EncodingKey::from_base64_secret(secret)?,
                decoding: DecodingKey::from_base64_secret(secret)?,
            }),
            secure,
        })
    }

    pub fn from_secret(secret: &[u8], secure: bool) -> Self {
        Self {
            keys: Arc::new(Keys {
                encoding: EncodingKey::from_secret(secret),
                decoding: DecodingKey::from_secret(secret),
            }),
            secure,
        }
    }

    fn generate_jwt(&self, sid: &str, uid: i32) -> JwtResult<String> {
        jsonwebtoken::encode(
            &Header::default(),
            &Claims {
                sid: sid.to_string(),
                uid,
                exp: jsonwebtoken::get_current_timestamp() + SESSION_TTL.as_secs(),
            },
            &self.keys.encoding,
        )
    }

    fn validate_jwt(&self, token: &str) -> JwtResult<TokenData<Claims>> {
        jsonwebtoken::decode::<Claims>(token, &self.keys.decoding, &Validation::default())
    }

    /// Stores a new session row and returns the `Set-Cookie` value for it.
    pub async fn start(&self, store: &DynStore, user_id: i32) -> Result<String, Error> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(SESSION_TTL).map_err(anyhow::Error::from)?;
        let session = Session {
            id: nanoid::nanoid!(32),
            user_id,
            created_at: now,
            expires_at: now + ttl,
        };
        let token = self
            .generate_jwt(&session.id, user_id)
            .map_err(anyhow::Error::from)?;
        store.insert_session(session).await?;
        tracing::debug!(user_id, "session started");
        Ok(self.cookie(&token, SESSION_TTL.as_secs()))
    }

    /// The user behind a cookie token, if the token and its session row are both valid.
    pub async fn resolve(&self, store: &DynStore, token: &str) -> Result<Option<AuthUser>, Error> {
        let claims = match self.validate_jwt(token) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::debug!(error = %e, "rejected session token");
                return Ok(None);
            }
        };
        let session = match store.find_session(&claims.sid).await? {
            Some(session) if session.user_id == claims.uid && session.expires_at > Utc::now() => {
                session
            }
            _ => return Ok(None),
        };
        Ok(store
            .find_user(session.user_id)
            .await?
            .map(|user| AuthUser {
                user,
                session_id: session.id,
            }))
    }

    pub async fn end(&self, store: &DynStore, session_id: &str) -> Result<String, Error> {
        store.delete_session(session_id).await?;
        Ok(self.cookie("", 0))
    }

    fn cookie(&self, value: &str, max_age: u64) -> String {
        let secure = if self.secure { "; Secure" } else { "" };
        format!(
            "{SESSION_COOKIE}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}{secure}"
        )
    }
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub session_id: String,
}

impl AuthUser {
    pub fn id(&self) -> i32 {
        self.user.id
    }
}

/// Requires a logged-in user.
pub struct ExtractAuth(pub AuthUser);

/// The logged-in user, when there is one.
pub struct MaybeAuth(pub Option<AuthUser>);

#[async_trait]
impl<B: Send> FromRequest<B> for MaybeAuth {
    type Rejection = AppError;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let token = req
            .headers()
            .typed_get::<Cookie>()
            .and_then(|cookie| cookie.get(SESSION_COOKIE).map(str::to_string));
        let Some(token) = token else {
            return Ok(MaybeAuth(None));
        };

        let Extension(sessions) = Extension::<SessionManager>::from_request(req)
            .await
            .map_err(|e| anyhow::anyhow!("session manager missing: {e}"))?;
        let Extension(store) = Extension::<DynStore>::from_request(req)
            .await
            .map_err(|e| anyhow::anyhow!("store missing: {e}"))?;

        Ok(MaybeAuth(sessions.resolve(&store, &token).await?))
    }
}

#[async_trait]
impl<B: Send> FromRequest<B> for ExtractAuth {
    type Rejection = AppError;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        match MaybeAuth::from_request(req).await? {
            MaybeAuth(Some(auth)) => Ok(ExtractAuth(auth)),
            MaybeAuth(None) => Err(Error::Unauthorized.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::NewUser, store::MemoryStore};

    #[test]
    fn password_round_trip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
    }

    #[test]
    fn cookie_flags() {
        let manager = SessionManager::from_secret(b"test", true);
        let cookie = manager.cookie("abc", 60);
        assert!(cookie.starts_with("univo_session=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.ends_with("; Secure"));
    }

    #[tokio::test]
    async fn ended_sessions_no_longer_resolve() {
        let store: DynStore = Arc::new(MemoryStore::new());
        let user = store
            .insert_user(NewUser {
                username: "ada".into(),
                email: "ada@example.edu".into(),
                password_hash: "x".into(),
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let manager = SessionManager::from_secret(b"test", false);

        let cookie = manager.start(&store, user.id).await.unwrap();
        let token = cookie
            .strip_prefix("univo_session=")
            .and_then(|rest| rest.split(';').next())
            .unwrap();
        let auth = manager.resolve(&store, token).await.unwrap().unwrap();
        assert_eq!(auth.id(), user.id);

        manager.end(&store, &auth.session_id).await.unwrap();
        assert!(manager.resolve(&store, token).await.unwrap().is_none());

        let forged = SessionManager::from_secret(b"other", false);
        assert!(forged.resolve(&store, token).await.unwrap().is_none());
    }
}
