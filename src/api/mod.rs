//! HTTP surface: thin request/response mapping onto the core database and
//! progression operations. Every protected route authenticates through the
//! [`AuthUser`] extractor.

use axum::extract::{FromRequestParts, Path, State};
use axum::http::{header, request::Parts, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use questlog_core::models::{
    CreateTaskInput, Credentials, Task, UpdateTaskInput, UserProfile,
};
use questlog_core::{auth, Database, Error};

mod error;
pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    db: Database,
}

pub fn create_router(db: Database) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/users/me", get(me))
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{id}", put(update_task).delete(delete_task))
        .layer(TraceLayer::new_for_http())
        // The reference deployment serves the frontend from another origin.
        .layer(CorsLayer::permissive())
        .with_state(AppState { db })
}

/// The authenticated caller, resolved from `Authorization: Bearer <token>`.
pub struct AuthUser {
    pub user_id: Uuid,
    pub token: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| Error::auth("missing bearer token"))?;
        let token = raw
            .strip_prefix("Bearer ")
            .ok_or_else(|| Error::auth("malformed authorization header"))?;

        let session = state
            .db
            .find_session(token)?
            .ok_or_else(|| Error::auth("invalid or expired session"))?;

        Ok(Self {
            user_id: session.user_id,
            token: token.to_string(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

// --- Account handlers ---

async fn register(
    State(state): State<AppState>,
    Json(creds): Json<Credentials>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let username = creds.username.trim();
    if username.is_empty() || creds.password.is_empty() {
        return Err(Error::validation("username and password required").into());
    }

    let password_hash = auth::hash_password(&creds.password)?;
    let user = state.db.create_user(username, &password_hash)?;
    let session = state.db.create_session(user.id)?;
    tracing::info!(username = %user.username, "registered new user");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token: session.token,
            user: user.into(),
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(creds): Json<Credentials>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = state
        .db
        .find_user_by_username(creds.username.trim())?
        .filter(|user| auth::verify_password(&creds.password, &user.password_hash))
        .ok_or_else(|| Error::auth("invalid credentials"))?;

    let session = state.db.create_session(user.id)?;
    Ok(Json(AuthResponse {
        token: session.token,
        user: user.into(),
    }))
}

async fn logout(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<StatusCode, ApiError> {
    state.db.delete_session(&caller.token)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn me(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<UserProfile>, ApiError> {
    let user = state
        .db
        .get_user(caller.user_id)?
        .ok_or_else(|| Error::not_found("user not found"))?;
    Ok(Json(user.into()))
}

// --- Task handlers ---

async fn list_tasks(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.db.list_tasks(caller.user_id)?))
}

async fn create_task(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(input): Json<CreateTaskInput>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let task = state.db.create_task(caller.user_id, input)?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(task_id): Path<Uuid>,
    Json(patch): Json<UpdateTaskInput>,
) -> Result<Json<Task>, ApiError> {
    let task = state.db.update_task(caller.user_id, task_id, patch)?;
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(task_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.db.delete_task(caller.user_id, task_id)?;
    Ok(StatusCode::NO_CONTENT)
}
