use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use json::Json;
use plaza_common::{
    model::{
        Id,
        auth::{AuthTokenDecodeError, AuthTokenHashError},
        post::PostMarker,
        preference::InvalidPreferenceValueError,
        user::{UserHandle, UserMarker},
    },
    util::PositiveDuration,
};
use plaza_db::client::{DbClient, DbError};
use serde::{Deserialize, Serialize};
use std::{num::NonZeroU64, sync::Arc};
use thiserror::Error;
use tracing::error;

mod auth;
mod json;
mod query;
mod routes;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub settings: Settings,
}

/// Request handling knobs taken from the environment.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct Settings {
    pub page_size: NonZeroU64,
    pub token_lifetime: Option<PositiveDuration>,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authorization header was missing or invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("The provided auth token could not be decoded: {0}")]
    InvalidAuthToken(#[from] AuthTokenDecodeError),
    #[error("The auth token could not be hashed: {0}")]
    AuthTokenHash(#[from] AuthTokenHashError),
    #[error("Provided token was invalid")]
    InvalidToken,
    #[error(transparent)]
    InvalidPreferenceValue(#[from] InvalidPreferenceValueError),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
    #[error("User with id {0} was not found.")]
    UserByIdNotFound(Id<UserMarker>),
    #[error("User with handle {0} was not found.")]
    UserByHandleNotFound(UserHandle),
    #[error("Page {0} was not found.")]
    PageNotFound(u64),
    #[error("Only the author may modify post {0}.")]
    NotPostAuthor(Id<PostMarker>),
    #[error("Users cannot follow themselves.")]
    CannotFollowSelf,
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::PostByIdNotFound(_)
            | ServerError::UserByIdNotFound(_)
            | ServerError::UserByHandleNotFound(_)
            | ServerError::PageNotFound(_)
            | ServerError::Database(DbError::PageOutOfRange(_)) => StatusCode::NOT_FOUND,
            ServerError::InvalidAuthorizationHeader(rejection) if rejection.is_missing() => {
                StatusCode::UNAUTHORIZED
            }
            ServerError::InvalidToken => StatusCode::UNAUTHORIZED,
            ServerError::NotPostAuthor(_) => StatusCode::FORBIDDEN,
            ServerError::CannotFollowSelf
            | ServerError::Database(DbError::Conflict | DbError::HandleTaken(_)) => {
                StatusCode::CONFLICT
            }
            ServerError::QueryRejection(_)
            | ServerError::JsonRejection(_)
            | ServerError::InvalidAuthorizationHeader(_)
            | ServerError::InvalidAuthToken(_)
            | ServerError::InvalidPreferenceValue(_) => StatusCode::BAD_REQUEST,
            ServerError::JsonResponse(_)
            | ServerError::Database(_)
            | ServerError::AuthTokenHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
struct ErrorResponse {
    status: u16,
    error: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        // Internal details stay in the log.
        let error = if status.is_server_error() {
            status.canonical_reason().unwrap_or("Internal error").to_owned()
        } else {
            self.to_string()
        };
        let error_response = ErrorResponse {
            status: status.as_u16(),
            error,
        };
        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests;
