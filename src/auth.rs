use actix_web::{
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    error::ErrorUnauthorized,
    http::header,
    middleware::Next,
    web, Error, HttpMessage, HttpRequest, HttpResponse,
};
use actix_web::cookie::{Cookie, SameSite, time::Duration};
use actix_web_httpauth::extractors::basic::BasicAuth;
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand_core::OsRng;
use serde_json::json;
use uuid::Uuid;

use crate::{
    models::{Role, UserRow, UserStatus},
    state::AppState,
};

pub const AUTH_REALM: &str = "Reenove";
const LOGOUT_COOKIE: &str = "rnv_logged_out";
pub const VISITOR_COOKIE: &str = "reenove_visitor";

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: String,
    pub display_name: String,
    pub role: Role,
}

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed_hash = PasswordHash::new(password_hash);
    match parsed_hash {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

async fn authenticate(req: &ServiceRequest, credentials: &BasicAuth) -> Result<AuthUser, Error> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ErrorUnauthorized("Unauthorized"))?;
    let email = credentials.user_id();
    let password = credentials.password().unwrap_or_default();
    authenticate_credentials(state, email, password)
        .await
        .ok_or_else(|| ErrorUnauthorized("Unauthorized"))
}

pub async fn authenticate_credentials(
    state: &AppState,
    email: &str,
    password: &str,
) -> Option<AuthUser> {
    let user = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, email, password_hash, first_name, last_name, company, phone, role, status, created_at
           FROM users
           WHERE email = ? AND status = ?
           LIMIT 1"#,
    )
    .bind(email)
    .bind(UserStatus::Active)
    .fetch_optional(&state.db)
    .await
    .ok()?;

    let user = match user {
        Some(user) => user,
        None => return None,
    };

    if !verify_password(password, &user.password_hash) {
        return None;
    }

    Some(AuthUser {
        display_name: user.display_name(),
        id: user.id,
        role: user.role,
    })
}

pub async fn basic_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    match authenticate(&req, &credentials).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            Ok(req)
        }
        Err(err) => Err((err, req)),
    }
}

pub async fn admin_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    role_validator(req, credentials, Role::Admin, "Admin access required").await
}

pub async fn artisan_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    role_validator(req, credentials, Role::Artisan, "Artisan access required").await
}

pub async fn agent_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    role_validator(req, credentials, Role::Agent, "Agent access required").await
}

async fn role_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
    role: Role,
    denial: &'static str,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    match authenticate(&req, &credentials).await {
        Ok(user) => {
            if user.role != role {
                return Err((ErrorUnauthorized(denial), req));
            }
            req.extensions_mut().insert(user);
            Ok(req)
        }
        Err(err) => Err((err, req)),
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn logout_cookie(req: &HttpRequest) -> Cookie<'static> {
    let mut builder = Cookie::build(LOGOUT_COOKIE, "1")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::days(365));
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

pub fn clear_logout_cookie(req: &HttpRequest) -> Cookie<'static> {
    let mut builder = Cookie::build(LOGOUT_COOKIE, "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::seconds(0));
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

pub fn visitor_cookie(req: &HttpRequest, visitor_id: &str) -> Cookie<'static> {
    let mut builder = Cookie::build(VISITOR_COOKIE, visitor_id.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::days(180));
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

pub fn is_logged_out(req: &HttpRequest) -> bool {
    req.cookie(LOGOUT_COOKIE).is_some()
}

/// Basic auth has no server-side session to revoke, so an explicit logout
/// marks the browser with a cookie that this guard checks before any
/// authenticated scope.
pub async fn logout_guard<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<BoxBody>, Error>
where
    B: actix_web::body::MessageBody + 'static,
{
    if is_logged_out(req.request()) {
        let response = HttpResponse::Unauthorized()
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .json(json!({ "error": "Session fermée. Reconnectez-vous." }));
        return Ok(req.into_response(response));
    }

    let res = next.call(req).await?;
    Ok(res.map_into_boxed_body())
}
