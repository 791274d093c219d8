use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Duration, Local, Utc};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::serde::json::Json;
use rocket::{Request, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{self, DbPool};
use crate::error::ApiError;
use crate::models::User;

const MAX_SESSIONS: i64 = 5;
const SESSION_TTL_DAYS: i64 = 30;
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

/// Request guard for a valid bearer token. A missing or malformed
/// Authorization header yields 401; a token the store does not know,
/// or one past its TTL, yields 403.
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = ApiError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(header) = req.headers().get_one("Authorization") else {
            return Outcome::Error((Status::Unauthorized, ApiError::Unauthenticated));
        };
        let Some(token) = header.strip_prefix("Bearer ") else {
            return Outcome::Error((Status::Unauthorized, ApiError::Unauthenticated));
        };

        let Some(pool) = req.rocket().state::<DbPool>() else {
            return Outcome::Error((Status::InternalServerError, ApiError::Internal));
        };
        let conn = match pool.get() {
            Ok(conn) => conn,
            Err(err) => {
                log::error!("connection pool error: {err}");
                return Outcome::Error((Status::InternalServerError, ApiError::Internal));
            }
        };

        match db::user_by_session(&conn, token) {
            Ok(Some((user, created_at))) => {
                if session_expired(&created_at) {
                    let _ = db::delete_session(&conn, token);
                    Outcome::Error((Status::Forbidden, ApiError::Forbidden))
                } else {
                    Outcome::Success(AuthUser {
                        user,
                        token: token.to_string(),
                    })
                }
            }
            Ok(None) => Outcome::Error((Status::Forbidden, ApiError::Forbidden)),
            Err(err) => {
                log::error!("session lookup failed: {err}");
                Outcome::Error((Status::InternalServerError, ApiError::Internal))
            }
        }
    }
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes())
        .map_err(|_| ApiError::Internal)?;
    Ok(hash.to_string())
}

fn verify_password(hash: &str, password: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn session_expired(created_at: &str) -> bool {
    match DateTime::parse_from_rfc3339(created_at) {
        Ok(created) => {
            let age = Utc::now().signed_duration_since(created.with_timezone(&Utc));
            age > Duration::days(SESSION_TTL_DAYS)
        }
        Err(_) => true,
    }
}

fn issue_session(conn: &rusqlite::Connection, user_id: i64) -> Result<String, ApiError> {
    let token = Uuid::new_v4().to_string();
    let created_at = Local::now().to_rfc3339();
    db::create_session(conn, user_id, &token, &created_at)?;
    db::prune_sessions(conn, user_id, MAX_SESSIONS)?;
    Ok(token)
}

#[post("/auth/register", data = "<payload>", format = "json")]
pub fn register(
    pool: &State<DbPool>,
    payload: Json<RegisterRequest>,
) -> Result<(Status, Json<AuthResponse>), ApiError> {
    let payload = payload.into_inner();
    let username = payload.username.trim();
    let email = payload.email.trim();
    if username.is_empty() {
        return Err(ApiError::BadRequest("Username is required"));
    }
    if email.is_empty() {
        return Err(ApiError::BadRequest("Email is required"));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(
            "Password must be at least 6 characters",
        ));
    }

    let mut conn = pool.get()?;
    if db::email_taken(&conn, email)? {
        return Err(ApiError::BadRequest("Email already registered"));
    }
    if db::username_taken(&conn, username)? {
        return Err(ApiError::BadRequest("Username already taken"));
    }

    let password_hash = hash_password(&payload.password)?;
    let created_at = Local::now().to_rfc3339();
    // a concurrent registration can land between the taken checks and
    // this insert; the UNIQUE constraints answer with the same bodies
    let user_id = match db::insert_user(&conn, username, email, &password_hash, &created_at) {
        Ok(id) => id,
        Err(err) if db::is_unique_violation(&err, "users.email") => {
            return Err(ApiError::BadRequest("Email already registered"));
        }
        Err(err) if db::is_unique_violation(&err, "users.username") => {
            return Err(ApiError::BadRequest("Username already taken"));
        }
        Err(err) => return Err(err.into()),
    };
    db::seed_default_categories(&mut conn, user_id)?;

    let token = issue_session(&conn, user_id)?;
    Ok((
        Status::Created,
        Json(AuthResponse {
            token,
            user: User {
                id: user_id,
                username: username.to_string(),
                email: email.to_string(),
                created_at,
            },
        }),
    ))
}

#[post("/auth/login", data = "<payload>", format = "json")]
pub fn login(
    pool: &State<DbPool>,
    payload: Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let payload = payload.into_inner();
    let conn = pool.get()?;

    let Some((user, hash)) = db::user_credentials(&conn, payload.email.trim())? else {
        return Err(ApiError::InvalidCredentials);
    };
    if !verify_password(&hash, &payload.password) {
        return Err(ApiError::InvalidCredentials);
    }

    let token = issue_session(&conn, user.id)?;
    Ok(Json(AuthResponse { token, user }))
}

#[post("/auth/logout")]
pub fn logout(pool: &State<DbPool>, auth: AuthUser) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = pool.get()?;
    db::delete_session(&conn, &auth.token)?;
    Ok(Json(serde_json::json!({ "message": "Logged out successfully" })))
}

#[get("/auth/me")]
pub fn me(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}
