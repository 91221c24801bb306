use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    state::AppState,
    users::{
        dto::{AddAddressRequest, CreateUserRequest, MessageResponse, ReadUser, UpdateUserRequest},
        repo_types::{Address, User, UserId},
    },
};

type ApiError = (StatusCode, String);

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/:id/addresses", post(add_address))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, HeaderMap, Json<User>), ApiError> {
    let user = state.users.create_user(payload).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/v1/users/{}", user.id).parse() {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(user)))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<ReadUser>, ApiError> {
    Ok(Json(state.users.get_user(id).await?))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.users.update_user(payload, id).await?))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = state.users.delete_user(id).await?;
    Ok(Json(MessageResponse {
        message: message.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn add_address(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Json(payload): Json<AddAddressRequest>,
) -> Result<Json<Address>, ApiError> {
    match state.users.add_address(payload, id).await? {
        Some(address) => Ok(Json(address)),
        None => Err((
            StatusCode::NOT_IMPLEMENTED,
            "Adding addresses is not supported yet".into(),
        )),
    }
}
