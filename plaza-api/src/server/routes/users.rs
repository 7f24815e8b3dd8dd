use crate::server::{Result, ServerError, ServerRouter, Settings, json::Json};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use plaza_common::model::{
    Id,
    auth::AuthToken,
    user::{CreateUser, Profile, User, UserMarker, UserPostCount},
};
use plaza_db::client::DbClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const TOP_AUTHOR_COUNT: u64 = 6;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(register_user)
        .typed_get(get_top_users)
        .typed_get(get_user)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users", rejection(ServerError))]
struct RegisterUserPath();

/// A freshly registered user. `token` is only ever shown here.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct Registration {
    pub user: User,
    pub profile: Profile,
    pub token: String,
    pub expires_after_seconds: Option<i64>,
}

async fn register_user(
    RegisterUserPath(): RegisterUserPath,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Settings>,
    Json(create_user): Json<CreateUser>,
) -> Result<(StatusCode, Json<Registration>)> {
    let (user, profile) = db.create_user(&create_user).await?;

    let token = AuthToken::generate_random(user.id);
    db.create_auth(user.id, &token.hash()?, settings.token_lifetime)
        .await?;

    info!(user = %user.id, handle = user.handle.get(), "Registered user");

    let registration = Registration {
        user,
        profile,
        token: token.to_string(),
        expires_after_seconds: settings
            .token_lifetime
            .map(|lifetime| lifetime.whole_seconds()),
    };
    Ok((StatusCode::CREATED, Json(registration)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/top", rejection(ServerError))]
struct GetTopUsersPath();

async fn get_top_users(
    GetTopUsersPath(): GetTopUsersPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<Vec<UserPostCount>>> {
    let authors = db.fetch_top_authors(TOP_AUTHOR_COUNT).await?;

    Ok(Json(authors))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{id}", rejection(ServerError))]
struct GetUserPath {
    id: Id<UserMarker>,
}

async fn get_user(
    GetUserPath { id }: GetUserPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<User>> {
    let user = db
        .fetch_user(id)
        .await?
        .ok_or(ServerError::UserByIdNotFound(id))?;

    Ok(Json(user))
}
