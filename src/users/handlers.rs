use axum::{
    extract::{Path, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, instrument};

use crate::{
    auth::{
        cookie::{clear_session_cookie, session_cookie},
        extractors::SessionUser,
    },
    config::AppConfig,
    error::AccountError,
    state::AppState,
    users::{
        dto::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, UpdateRequest},
        repo_types::User,
        services::AccountService,
    },
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
}

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/users/me", get(get_me)).route(
        "/users/:roll_no",
        get(get_by_roll_no)
            .patch(update_by_roll_no)
            .delete(delete_by_roll_no),
    )
}

#[instrument(skip(accounts, payload))]
pub async fn signup(
    State(accounts): State<AccountService>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AccountError> {
    let user = accounts.register(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully",
            user,
        }),
    ))
}

#[instrument(skip(accounts, config, payload))]
pub async fn login(
    State(accounts): State<AccountService>,
    State(config): State<std::sync::Arc<AppConfig>>,
    Json(payload): Json<LoginRequest>,
) -> Result<(HeaderMap, Json<LoginResponse>), AccountError> {
    let session = accounts
        .authenticate(&payload.email, &payload.password)
        .await?;

    let cookie = session_cookie(&session.token, config.cookie_secure).map_err(|e| {
        error!(error = %e, "session cookie rejected");
        AccountError::Unexpected(e.into())
    })?;
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);

    Ok((
        headers,
        Json(LoginResponse {
            message: "Logged in successfully",
            user: session.user,
            token: session.token,
        }),
    ))
}

#[instrument(skip_all)]
pub async fn logout(
    State(accounts): State<AccountService>,
    State(config): State<std::sync::Arc<AppConfig>>,
    session: Option<SessionUser>,
) -> impl IntoResponse {
    accounts.end_session(session.map(|SessionUser(id)| id));

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, clear_session_cookie(config.cookie_secure));
    (StatusCode::OK, headers, "Logged Out")
}

#[instrument(skip(accounts))]
pub async fn get_me(
    State(accounts): State<AccountService>,
    SessionUser(user_id): SessionUser,
) -> Result<Json<User>, AccountError> {
    let user = accounts.fetch_by_id(user_id).await?;
    Ok(Json(user))
}

#[instrument(skip(accounts))]
pub async fn get_by_roll_no(
    State(accounts): State<AccountService>,
    Path(roll_no): Path<String>,
) -> Result<Json<User>, AccountError> {
    let user = accounts
        .fetch_by_roll_no(&roll_no)
        .await
        .map_err(AccountError::into_lookup_failure)?;
    Ok(Json(user))
}

/// An unmatched roll number answers 200 with a `null` body.
#[instrument(skip(accounts, payload))]
pub async fn update_by_roll_no(
    State(accounts): State<AccountService>,
    Path(roll_no): Path<String>,
    Json(payload): Json<UpdateRequest>,
) -> Result<Json<Option<User>>, AccountError> {
    let user = accounts
        .update_by_roll_no(&roll_no, payload)
        .await
        .map_err(AccountError::into_lookup_failure)?;
    Ok(Json(user))
}

#[instrument(skip(accounts))]
pub async fn delete_by_roll_no(
    State(accounts): State<AccountService>,
    Path(roll_no): Path<String>,
) -> Result<Json<User>, AccountError> {
    let user = accounts
        .delete_by_roll_no(&roll_no)
        .await
        .map_err(AccountError::into_lookup_failure)?;
    Ok(Json(user))
}
