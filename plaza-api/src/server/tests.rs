use crate::server::{ServerError, ServerState, Settings, routes};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use plaza_common::{
    model::{auth::AuthToken, page::DEFAULT_PAGE_SIZE},
    snowflake::{ProcessId, WorkerId},
};
use plaza_db::client::{DbClient, DbError};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

async fn app() -> Router {
    let db_client = DbClient::connect(
        "sqlite::memory:",
        4,
        WorkerId::new(1).unwrap(),
        ProcessId::new(0).unwrap(),
    )
    .await
    .unwrap();

    routes().with_state(ServerState {
        db_client: Arc::new(db_client),
        settings: Settings {
            page_size: DEFAULT_PAGE_SIZE,
            token_lifetime: None,
        },
    })
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, body)
}

/// Registers `handle` and returns its id and token.
async fn register(app: &Router, handle: &str) -> (u64, String) {
    let (status, body) = send(
        app,
        Method::POST,
        "/users",
        None,
        Some(json!({ "handle": handle })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let id = body["user"]["id"].as_u64().unwrap();
    let token = body["token"].as_str().unwrap().to_owned();
    (id, token)
}

async fn create_post(app: &Router, token: &str, content: &str) -> u64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/posts",
        Some(token),
        Some(json!({ "content": content })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    body["id"].as_u64().unwrap()
}

#[tokio::test]
async fn registration_returns_user_profile_and_token() {
    let app = app().await;
    let (id, token) = register(&app, "ada").await;

    assert!(token.starts_with(&format!("{id}:")));

    let (status, body) = send(&app, Method::GET, &format!("/users/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "id": id, "handle": "ada" }));
}

#[tokio::test]
async fn registration_rejects_taken_and_invalid_handles() {
    let app = app().await;
    register(&app, "ada").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/users",
        None,
        Some(json!({ "handle": "ada" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], 409);

    let (status, _) = send(
        &app,
        Method::POST,
        "/users",
        None,
        Some(json!({ "handle": "two words" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn preference_toggles_through_http() {
    let app = app().await;
    let (_, token) = register(&app, "ada").await;
    let post = create_post(&app, &token, "hello").await;

    let like = format!("/posts/{post}/preference/1");
    let dislike = format!("/posts/{post}/preference/2");

    let (status, body) = send(&app, Method::POST, &like, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["post"]["likes"], 1);
    assert_eq!(body["post"]["dislikes"], 0);
    assert_eq!(body["preference"], 1);

    let (_, body) = send(&app, Method::POST, &dislike, Some(&token), None).await;
    assert_eq!(body["post"]["likes"], 0);
    assert_eq!(body["post"]["dislikes"], 1);
    assert_eq!(body["preference"], 2);

    let (_, body) = send(&app, Method::POST, &dislike, Some(&token), None).await;
    assert_eq!(body["post"]["likes"], 0);
    assert_eq!(body["post"]["dislikes"], 0);
    assert_eq!(body["preference"], Value::Null);
}

#[tokio::test]
async fn preference_rejections() {
    let app = app().await;
    let (_, token) = register(&app, "ada").await;
    let post = create_post(&app, &token, "hello").await;

    for value in ["0", "3", "256", "-1"] {
        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/posts/{post}/preference/{value}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{value}: {body}");
    }

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/posts/{}/preference/1", post + 1),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/posts/{post}/preference/1"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = send(&app, Method::GET, &format!("/posts/{post}"), None, None).await;
    assert_eq!(body["post"]["likes"], 0);
    assert_eq!(body["post"]["dislikes"], 0);
}

#[tokio::test]
async fn tokens_are_checked() {
    let app = app().await;
    let (id, token) = register(&app, "ada").await;
    let body = Some(json!({ "content": "hi" }));

    let (status, _) = send(&app, Method::POST, "/posts", None, body.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::POST, "/posts", Some("garbage"), body.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = AuthToken::generate_random(id.into()).to_string();
    let (status, _) = send(&app, Method::POST, "/posts", Some(&unknown), body.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A valid token must not be usable under someone else's id.
    let (other, _) = register(&app, "grace").await;
    let (_, rest) = token.split_once(':').unwrap();
    let forged = format!("{other}:{rest}");
    let (status, _) = send(&app, Method::POST, "/posts", Some(&forged), body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn only_the_author_modifies_a_post() {
    let app = app().await;
    let (_, ada) = register(&app, "ada").await;
    let (_, grace) = register(&app, "grace").await;
    let post = create_post(&app, &ada, "draft").await;
    let uri = format!("/posts/{post}");

    let edit = Some(json!({ "content": "final" }));
    let (status, _) = send(&app, Method::PATCH, &uri, Some(&grace), edit.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, Method::DELETE, &uri, Some(&grace), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::PATCH, &uri, Some(&ada), edit).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "final");

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&ada), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn post_detail_lists_comments_newest_first() {
    let app = app().await;
    let (_, ada) = register(&app, "ada").await;
    let (_, grace) = register(&app, "grace").await;
    let post = create_post(&app, &ada, "hello").await;
    let comments = format!("/posts/{post}/comments");

    for (token, content) in [(&ada, "first"), (&grace, "second")] {
        let (status, _) = send(
            &app,
            Method::POST,
            &comments,
            Some(token),
            Some(json!({ "content": content })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, _) = send(
        &app,
        Method::POST,
        &comments,
        Some(&ada),
        Some(json!({ "content": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, Method::GET, &format!("/posts/{post}"), None, None).await;
    assert_eq!(body["comments"][0]["content"], "second");
    assert_eq!(body["comments"][0]["author"]["handle"], "grace");
    assert_eq!(body["comments"][1]["content"], "first");
}

#[tokio::test]
async fn following_shapes_the_feed() {
    let app = app().await;
    let (_, ada) = register(&app, "ada").await;
    let (_, grace) = register(&app, "grace").await;
    let (_, linus) = register(&app, "linus").await;
    create_post(&app, &ada, "from ada").await;
    create_post(&app, &linus, "from linus").await;
    create_post(&app, &grace, "from grace").await;

    let (_, body) = send(&app, Method::GET, "/profiles/ada", Some(&grace), None).await;
    assert_eq!(body["can_follow"], true);
    assert_eq!(body["posts"]["total_items"], 1);

    let (status, body) = send(&app, Method::POST, "/profiles/ada/follow", Some(&grace), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
    let (_, body) = send(&app, Method::POST, "/profiles/ada/follow", Some(&grace), None).await;
    assert_eq!(body["changed"], false);

    let (_, body) = send(&app, Method::GET, "/profiles/ada", Some(&grace), None).await;
    assert_eq!(body["can_follow"], false);

    let (status, body) = send(&app, Method::GET, "/feed", Some(&grace), None).await;
    assert_eq!(status, StatusCode::OK);
    let contents: Vec<_> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|post| post["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, ["from grace", "from ada"]);

    let (_, body) = send(&app, Method::GET, "/profiles/ada/followers", None, None).await;
    assert_eq!(body[0]["follower"]["handle"], "grace");

    let (status, _) = send(&app, Method::POST, "/profiles/grace/follow", Some(&grace), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send(&app, Method::DELETE, "/profiles/ada/follow", Some(&grace), None).await;
    assert_eq!(body["changed"], true);
    let (_, body) = send(&app, Method::GET, "/profiles/grace/follows", None, None).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn feed_pagination_bounds() {
    let app = app().await;
    let (_, ada) = register(&app, "ada").await;

    let (status, body) = send(&app, Method::GET, "/feed", Some(&ada), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"], json!([]));
    assert_eq!(body["total_pages"], 1);

    for content in ["1", "2", "3", "4"] {
        create_post(&app, &ada, content).await;
    }

    let (_, body) = send(&app, Method::GET, "/feed?page=2", Some(&ada), None).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["has_next"], false);
    assert_eq!(body["has_previous"], true);

    for page in ["0", "3"] {
        let (status, _) = send(
            &app,
            Method::GET,
            &format!("/feed?page={page}"),
            Some(&ada),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn top_users_and_unknown_routes() {
    let app = app().await;
    let (_, ada) = register(&app, "ada").await;
    let (_, grace) = register(&app, "grace").await;
    create_post(&app, &ada, "one").await;
    create_post(&app, &grace, "two").await;
    create_post(&app, &grace, "three").await;

    let (status, body) = send(&app, Method::GET, "/users/top", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["user"]["handle"], "grace");
    assert_eq!(body[0]["post_count"], 2);
    assert_eq!(body[1]["user"]["handle"], "ada");

    let (status, body) = send(&app, Method::GET, "/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[test]
fn unresolved_conflicts_are_409() {
    assert_eq!(
        ServerError::Database(DbError::Conflict).status(),
        StatusCode::CONFLICT
    );
}
