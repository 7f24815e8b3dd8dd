use crate::server::{Result, ServerError, ServerRouter, auth::AuthenticatedUser, json::Json};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use plaza_common::model::{
    Id,
    comment::Comment,
    post::{Post, PostContent, PostMarker, can_modify},
    preference::{PreferenceOutcome, PreferenceValue},
    user::UserMarker,
};
use plaza_db::client::DbClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(create_post)
        .typed_get(get_post)
        .typed_patch(edit_post)
        .typed_delete(delete_post)
        .typed_post(create_comment)
        .typed_post(apply_preference)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts", rejection(ServerError))]
struct CreatePostPath();

async fn create_post(
    CreatePostPath(): CreatePostPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Json(post): Json<PostContent>,
) -> Result<(StatusCode, Json<Post>)> {
    let post = db.create_post(user.user_id(), &post.content).await?;

    Ok((StatusCode::CREATED, Json(post)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}", rejection(ServerError))]
struct PostPath {
    id: Id<PostMarker>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct PostDetail {
    pub post: Post,
    /// Newest first.
    pub comments: Vec<Comment>,
}

async fn get_post(
    PostPath { id }: PostPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<PostDetail>> {
    let post = db
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;
    let comments = db.fetch_post_comments(id).await?;

    Ok(Json(PostDetail { post, comments }))
}

/// Loads a post the caller is about to change, rejecting anyone but its author.
async fn fetch_modifiable_post(
    db: &DbClient,
    actor: Id<UserMarker>,
    id: Id<PostMarker>,
) -> Result<Post> {
    let post = db
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    if can_modify(actor, &post) {
        Ok(post)
    } else {
        Err(ServerError::NotPostAuthor(id))
    }
}

async fn edit_post(
    PostPath { id }: PostPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Json(edit): Json<PostContent>,
) -> Result<Json<Post>> {
    fetch_modifiable_post(&db, user.user_id(), id).await?;

    let post = db
        .update_post_content(id, &edit.content)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(post))
}

async fn delete_post(
    PostPath { id }: PostPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<StatusCode> {
    fetch_modifiable_post(&db, user.user_id(), id).await?;

    if !db.delete_post(id).await? {
        return Err(ServerError::PostByIdNotFound(id));
    }
    info!(post = %id, "Deleted post");

    Ok(StatusCode::NO_CONTENT)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/comments", rejection(ServerError))]
struct CommentsPath {
    id: Id<PostMarker>,
}

async fn create_comment(
    CommentsPath { id }: CommentsPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Json(comment): Json<PostContent>,
) -> Result<(StatusCode, Json<Comment>)> {
    let comment = db
        .create_comment(id, user.user_id(), &comment.content)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok((StatusCode::CREATED, Json(comment)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/preference/{value}", rejection(ServerError))]
struct PreferencePath {
    id: Id<PostMarker>,
    value: i64,
}

async fn apply_preference(
    PreferencePath { id, value }: PreferencePath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Json<PreferenceOutcome>> {
    let value = PreferenceValue::try_from(value)?;

    let outcome = db
        .apply_preference(user.user_id(), id, value)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(outcome))
}
