use crate::server::{
    Result, ServerError, ServerRouter, Settings,
    auth::AuthenticatedUser,
    json::Json,
    query::{PageQuery, Query},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use plaza_common::model::{page::Page, post::FeedPost};
use plaza_db::client::DbClient;
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(get_feed)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/feed", rejection(ServerError))]
struct FeedPath();

/// The caller's own posts and those of everyone they follow.
async fn get_feed(
    FeedPath(): FeedPath,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Settings>,
    user: AuthenticatedUser,
    Query(page_query): Query<PageQuery>,
) -> Result<Json<Page<FeedPost>>> {
    let request = page_query.request(settings.page_size)?;
    let feed = db.fetch_feed(user.user_id(), request).await?;

    Ok(Json(feed))
}
