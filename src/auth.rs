use actix_session::SessionExt;
use actix_web::http::{header, StatusCode};
use actix_web::{dev::Payload, web, Error, FromRequest, HttpRequest, HttpResponse, ResponseError};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use futures_util::future::LocalBoxFuture;

use crate::flash;
use crate::models::{Id, NewUser, User};
use crate::repo::{RepoError, RepoResult, UserRepo};
use crate::routes::AppState;

/// Session key holding the authenticated user id.
pub const USER_ID_KEY: &str = "user_id";

pub const BOOTSTRAP_USERNAME: &str = "admin";
pub const BOOTSTRAP_PASSWORD: &str = "admin123";

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

/// Seeds the default administrator on first startup and self-heals on every
/// later one: an existing `admin` user without the admin flag is upgraded in
/// place.
pub async fn ensure_admin_user<R: UserRepo + ?Sized>(repo: &R) -> anyhow::Result<()> {
    match repo.get_user_by_username(BOOTSTRAP_USERNAME).await {
        Ok(user) => {
            if !user.is_admin {
                repo.grant_admin(BOOTSTRAP_USERNAME).await?;
                log::info!("upgraded existing '{BOOTSTRAP_USERNAME}' user to administrator");
            }
        }
        Err(RepoError::NotFound) => {
            let password_hash = hash_password(BOOTSTRAP_PASSWORD)?;
            repo.create_user(NewUser {
                username: BOOTSTRAP_USERNAME.to_string(),
                password_hash,
                is_admin: true,
            })
            .await?;
            log::info!("seeded default administrator '{BOOTSTRAP_USERNAME}'");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Checks a submitted credential pair against the store. Both unknown-username
/// and wrong-password collapse to `None` so callers cannot distinguish them.
pub async fn authenticate<R: UserRepo + ?Sized>(
    repo: &R,
    username: &str,
    password: &str,
) -> RepoResult<Option<User>> {
    let user = match repo.get_user_by_username(username).await {
        Ok(u) => u,
        Err(RepoError::NotFound) => return Ok(None),
        Err(e) => return Err(e),
    };
    if verify_password(password, &user.password_hash) {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

/// Rejection produced by the [`AdminUser`] extractor; renders as a redirect.
#[derive(thiserror::Error, Debug)]
pub enum AuthRedirect {
    #[error("login required")] ToLogin,
    #[error("administrator access required")] ToFeed,
}

impl ResponseError for AuthRedirect {
    fn status_code(&self) -> StatusCode {
        StatusCode::SEE_OTHER
    }

    fn error_response(&self) -> HttpResponse {
        let target = match self {
            AuthRedirect::ToLogin => "/login",
            AuthRedirect::ToFeed => "/blog/",
        };
        HttpResponse::SeeOther()
            .insert_header((header::LOCATION, target))
            .finish()
    }
}

/// Extractor guarding every administrative handler. Resolves the session's
/// user id against the store; anonymous requests bounce to the login page and
/// authenticated non-admins bounce to the public feed with a warning flash.
pub struct AdminUser(pub User);

impl FromRequest for AdminUser {
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _pl: &mut Payload) -> Self::Future {
        let session = req.get_session();
        let state = req.app_data::<web::Data<AppState>>().cloned();
        Box::pin(async move {
            let state = state
                .ok_or_else(|| actix_web::error::ErrorInternalServerError("app state missing"))?;
            let user_id: Option<Id> = session.get(USER_ID_KEY).unwrap_or(None);
            let Some(user_id) = user_id else {
                return Err(AuthRedirect::ToLogin.into());
            };
            let user = match state.repo.get_user(user_id).await {
                Ok(u) => u,
                Err(_) => {
                    // stale session pointing at a vanished user
                    session.purge();
                    return Err(AuthRedirect::ToLogin.into());
                }
            };
            if !user.is_admin {
                flash::flash(&session, "warning", "Administrator access required");
                return Err(AuthRedirect::ToFeed.into());
            }
            Ok(AdminUser(user))
        })
    }
}
