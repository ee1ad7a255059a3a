//! Channel API endpoints
//!
//! - GET /channels?limit&offset - List channels, newest first
//! - GET /channels/user?user_id= - List a user's channels
//! - GET /channels/{id} - Get channel by ID
//! - POST /channels - Create a channel (auth required)
//! - PATCH /channels/{id} - Update title/description (owner only)
//! - DELETE /channels/{id} - Delete channel (owner only)

use axum::{
    Json, Router,
    extract::{
        FromRef, OriginalUri, Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::api_error::{ApiError, ApiJson, ErrorResponse, ResultExt};
use crate::core::auth::extractor::CurrentUser;
use crate::core::auth::jwt::TokenService;
use crate::core::db::models::{Channel, CreateChannel, UpdateChannel};
use crate::core::db::repositories::{ChannelRepositoryError, ChannelStore};

/// Page size when `limit` is absent
pub const DEFAULT_LIMIT: i64 = 20;

/// Largest page a client may request
pub const MAX_LIMIT: i64 = 100;

const MAX_TITLE_LEN: usize = 255;

/// Channel API state containing the channel store and token service
#[derive(Clone)]
pub struct ChannelApiState {
    pub channels: Arc<dyn ChannelStore>,
    pub token_service: TokenService,
}

impl FromRef<Arc<ChannelApiState>> for TokenService {
    fn from_ref(state: &Arc<ChannelApiState>) -> Self {
        state.token_service.clone()
    }
}

/// Channel API error types
#[derive(Debug, thiserror::Error)]
pub enum ChannelApiError {
    #[error("no channel found")]
    NotFound,

    #[error("Access denied")]
    AccessDenied,

    #[error("error while parsing query params: {0}")]
    QueryParamParsing(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<ChannelRepositoryError> for ChannelApiError {
    fn from(err: ChannelRepositoryError) -> Self {
        match err {
            ChannelRepositoryError::NotFound => ChannelApiError::NotFound,
            ChannelRepositoryError::DatabaseError(e) => {
                ChannelApiError::InternalError(e.to_string())
            }
        }
    }
}

impl From<QueryRejection> for ChannelApiError {
    fn from(rejection: QueryRejection) -> Self {
        ChannelApiError::QueryParamParsing(rejection.body_text())
    }
}

impl From<PathRejection> for ChannelApiError {
    fn from(rejection: PathRejection) -> Self {
        ChannelApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError for ChannelApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ChannelApiError::NotFound => StatusCode::NOT_FOUND,
            ChannelApiError::AccessDenied => StatusCode::FORBIDDEN,
            ChannelApiError::QueryParamParsing(_) | ChannelApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ChannelApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Pagination for the channel listing
#[derive(Debug, Default, Deserialize)]
pub struct ListChannelsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListChannelsQuery {
    /// Resolve defaults and reject out-of-range values
    fn page(&self) -> Result<(i64, i64), ChannelApiError> {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        let offset = self.offset.unwrap_or(0);

        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(ChannelApiError::QueryParamParsing(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        if offset < 0 {
            return Err(ChannelApiError::QueryParamParsing(
                "offset must not be negative".to_string(),
            ));
        }

        Ok((limit, offset))
    }
}

/// Query for listing one user's channels
#[derive(Debug, Deserialize)]
pub struct UserChannelsQuery {
    pub user_id: Uuid,
}

/// Request for creating a channel
#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Request for updating a channel (absent fields are left unchanged)
#[derive(Debug, Deserialize)]
pub struct UpdateChannelRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

fn validate_title(title: &str) -> Result<(), ChannelApiError> {
    if title.trim().is_empty() {
        return Err(ChannelApiError::BadRequest("title must not be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ChannelApiError::BadRequest(format!(
            "title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

/// Create the channel API router
pub fn channel_api_router(state: ChannelApiState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/channels", get(list_channels).post(create_channel))
        .route("/channels/user", get(list_user_channels))
        .route(
            "/channels/{id}",
            get(get_channel).patch(update_channel).delete(delete_channel),
        )
        .with_state(state)
}

/// Load a channel and make sure `user_id` owns it
async fn owned_channel(
    state: &ChannelApiState,
    id: Uuid,
    user_id: Uuid,
) -> Result<Channel, ChannelApiError> {
    let channel = state.channels.find_by_id(id).await?;

    if channel.user_id != user_id {
        tracing::warn!(channel_id = %id, user_id = %user_id, "Channel access denied");
        return Err(ChannelApiError::AccessDenied);
    }

    Ok(channel)
}

async fn find_page(
    state: &ChannelApiState,
    query: Result<Query<ListChannelsQuery>, QueryRejection>,
) -> Result<Vec<Channel>, ChannelApiError> {
    let Query(query) = query?;
    let (limit, offset) = query.page()?;

    Ok(state.channels.find_all(limit, offset).await?)
}

async fn apply_update(
    state: &ChannelApiState,
    user_id: Uuid,
    id: Uuid,
    request: UpdateChannelRequest,
) -> Result<Channel, ChannelApiError> {
    if let Some(title) = &request.title {
        validate_title(title)?;
    }

    owned_channel(state, id, user_id).await?;

    let update = UpdateChannel {
        title: request.title,
        description: request.description,
    };
    Ok(state.channels.update(id, &update).await?)
}

async fn remove(state: &ChannelApiState, user_id: Uuid, id: Uuid) -> Result<(), ChannelApiError> {
    owned_channel(state, id, user_id).await?;

    // Lost a race with another delete
    if !state.channels.delete(id).await? {
        return Err(ChannelApiError::NotFound);
    }

    Ok(())
}

/// GET /channels
async fn list_channels(
    State(state): State<Arc<ChannelApiState>>,
    OriginalUri(uri): OriginalUri,
    query: Result<Query<ListChannelsQuery>, QueryRejection>,
) -> Result<Json<Vec<Channel>>, ErrorResponse> {
    let channels = find_page(&state, query).await.at(&uri)?;

    Ok(Json(channels))
}

/// GET /channels/user
async fn list_user_channels(
    State(state): State<Arc<ChannelApiState>>,
    OriginalUri(uri): OriginalUri,
    query: Result<Query<UserChannelsQuery>, QueryRejection>,
) -> Result<Json<Vec<Channel>>, ErrorResponse> {
    let Query(query) = query.map_err(ChannelApiError::from).at(&uri)?;

    let channels = state
        .channels
        .find_by_user_id(query.user_id)
        .await
        .map_err(ChannelApiError::from)
        .at(&uri)?;

    Ok(Json(channels))
}

/// GET /channels/{id}
async fn get_channel(
    State(state): State<Arc<ChannelApiState>>,
    OriginalUri(uri): OriginalUri,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Channel>, ErrorResponse> {
    let Path(id) = id.map_err(ChannelApiError::from).at(&uri)?;

    let channel = state
        .channels
        .find_by_id(id)
        .await
        .map_err(ChannelApiError::from)
        .at(&uri)?;

    Ok(Json(channel))
}

/// POST /channels
async fn create_channel(
    State(state): State<Arc<ChannelApiState>>,
    OriginalUri(uri): OriginalUri,
    CurrentUser(user): CurrentUser,
    ApiJson(request): ApiJson<CreateChannelRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    validate_title(&request.title).at(&uri)?;

    let channel = state
        .channels
        .create(&CreateChannel {
            user_id: user.id,
            title: request.title,
            description: request.description,
        })
        .await
        .map_err(ChannelApiError::from)
        .at(&uri)?;

    tracing::info!(channel_id = %channel.id, user_id = %user.id, "Channel created");

    Ok((StatusCode::CREATED, Json(channel)))
}

/// PATCH /channels/{id}
async fn update_channel(
    State(state): State<Arc<ChannelApiState>>,
    OriginalUri(uri): OriginalUri,
    CurrentUser(user): CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
    ApiJson(request): ApiJson<UpdateChannelRequest>,
) -> Result<Json<Channel>, ErrorResponse> {
    let Path(id) = id.map_err(ChannelApiError::from).at(&uri)?;

    let channel = apply_update(&state, user.id, id, request).await.at(&uri)?;

    Ok(Json(channel))
}

/// DELETE /channels/{id}
async fn delete_channel(
    State(state): State<Arc<ChannelApiState>>,
    OriginalUri(uri): OriginalUri,
    CurrentUser(user): CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, ErrorResponse> {
    let Path(id) = id.map_err(ChannelApiError::from).at(&uri)?;

    remove(&state, user.id, id).await.at(&uri)?;

    tracing::info!(channel_id = %id, user_id = %user.id, "Channel deleted");

    Ok(StatusCode::NO_CONTENT)
}
