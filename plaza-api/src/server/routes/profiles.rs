use crate::server::{
    Result, ServerError, ServerRouter, Settings,
    auth::AuthenticatedUser,
    json::Json,
    query::{PageQuery, Query},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use plaza_common::model::{
    follow::Follow,
    page::Page,
    post::Post,
    user::{Profile, User, UserHandle},
};
use plaza_db::client::DbClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_profile)
        .typed_post(follow)
        .typed_delete(unfollow)
        .typed_get(get_follows)
        .typed_get(get_followers)
}

async fn user_by_handle(db: &DbClient, handle: UserHandle) -> Result<User> {
    db.fetch_user_by_handle(&handle)
        .await?
        .ok_or(ServerError::UserByHandleNotFound(handle))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profiles/{handle}", rejection(ServerError))]
struct ProfilePath {
    handle: UserHandle,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct ProfileView {
    pub user: User,
    pub profile: Profile,
    pub posts: Page<Post>,
    /// Whether the caller could start following this user.
    pub can_follow: bool,
}

async fn get_profile(
    ProfilePath { handle }: ProfilePath,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Settings>,
    caller: AuthenticatedUser,
    Query(page_query): Query<PageQuery>,
) -> Result<Json<ProfileView>> {
    let request = page_query.request(settings.page_size)?;
    let user = user_by_handle(&db, handle).await?;
    let profile = db
        .fetch_profile(user.id)
        .await?
        .ok_or(ServerError::UserByIdNotFound(user.id))?;

    let posts = db.fetch_user_posts(user.id, request).await?;
    let can_follow =
        caller.user_id() != user.id && !db.is_following(caller.user_id(), user.id).await?;

    Ok(Json(ProfileView {
        user,
        profile,
        posts,
        can_follow,
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profiles/{handle}/follow", rejection(ServerError))]
struct FollowPath {
    handle: UserHandle,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct FollowStatus {
    pub user: User,
    pub following: bool,
    /// Whether this request changed anything.
    pub changed: bool,
}

async fn follow(
    FollowPath { handle }: FollowPath,
    State(db): State<Arc<DbClient>>,
    caller: AuthenticatedUser,
) -> Result<Json<FollowStatus>> {
    let user = user_by_handle(&db, handle).await?;
    if user.id == caller.user_id() {
        return Err(ServerError::CannotFollowSelf);
    }

    let changed = db.follow(caller.user_id(), user.id).await?;
    debug!(follower = %caller.user_id(), followed = %user.id, changed, "Follow");

    Ok(Json(FollowStatus {
        user,
        following: true,
        changed,
    }))
}

async fn unfollow(
    FollowPath { handle }: FollowPath,
    State(db): State<Arc<DbClient>>,
    caller: AuthenticatedUser,
) -> Result<Json<FollowStatus>> {
    let user = user_by_handle(&db, handle).await?;

    let changed = db.unfollow(caller.user_id(), user.id).await?;
    debug!(follower = %caller.user_id(), followed = %user.id, changed, "Unfollow");

    Ok(Json(FollowStatus {
        user,
        following: false,
        changed,
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profiles/{handle}/follows", rejection(ServerError))]
struct FollowsPath {
    handle: UserHandle,
}

async fn get_follows(
    FollowsPath { handle }: FollowsPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<Vec<Follow>>> {
    let user = user_by_handle(&db, handle).await?;
    let follows = db.fetch_follows(user.id).await?;

    Ok(Json(follows))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profiles/{handle}/followers", rejection(ServerError))]
struct FollowersPath {
    handle: UserHandle,
}

async fn get_followers(
    FollowersPath { handle }: FollowersPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<Vec<Follow>>> {
    let user = user_by_handle(&db, handle).await?;
    let followers = db.fetch_followers(user.id).await?;

    Ok(Json(followers))
}
