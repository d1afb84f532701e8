//! Router-level tests.

use std::sync::atomic::{AtomicU32, Ordering};

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, StatusCode},
    response::Response,
};
use rand::{rngs::StdRng, SeedableRng};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::*;
use crate::hashid;
use crate::store::NewPost;

static NEXT_IP: AtomicU32 = AtomicU32::new(1);

fn setup() -> (Router, Arc<ApiState>) {
    let config = AppConfig::new(vec!["test-secret".to_string()]);
    let state = Arc::new(ApiState::new(Store::open_in_memory().unwrap(), config).unwrap());
    (router(state.clone()), state)
}

/// Each request comes from a fresh address unless one is given.
fn request(
    method: Method,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
    ip: Option<&str>,
) -> axum::http::Request<Body> {
    let ip = ip.map(str::to_string).unwrap_or_else(|| {
        let n = NEXT_IP.fetch_add(1, Ordering::SeqCst);
        format!("10.{}.{}.{}", (n >> 16) & 0xff, (n >> 8) & 0xff, n & 0xff)
    });

    let mut builder = axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", ip);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: axum::http::Request<Body>) -> Response {
    app.clone().oneshot(req).await.unwrap()
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let response = send(app, request(method, uri, body, token, None)).await;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn seed_post(state: &ApiState, content: &str, edit_code: Option<&str>) -> String {
    let password_hash = edit_code.map(|c| auth::hash_password(c).unwrap());
    state
        .store
        .lock()
        .await
        .create_post(&NewPost {
            content: content.to_string(),
            password_hash,
            ..Default::default()
        })
        .unwrap()
}

async fn admin_token(app: &Router, state: &ApiState, username: &str) -> String {
    let code = state
        .store
        .lock()
        .await
        .create_signup_code(&mut StdRng::seed_from_u64(username.len() as u64))
        .unwrap();

    let (status, body) = call(
        app,
        Method::POST,
        "/api/v1/admin/signup",
        Some(json!({"username": username, "password": "long enough", "signupCode": code})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["data"]["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_status() {
    let (app, state) = setup();
    seed_post(&state, "one", None).await;

    let (status, body) = call(&app, Method::GET, "/api/v1/status", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["posts"], 1);
}

#[tokio::test]
async fn test_create_and_view_post() {
    let (app, _state) = setup();

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/post",
        Some(json!({"content": "The sea was wide.", "title": " Tides ", "nickname": "gull"})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(id, hashid::encode(1).unwrap());

    let (status, body) = call(&app, Method::GET, &format!("/api/v1/post/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    let post = &body["data"];
    assert_eq!(post["content"], "The sea was wide.");
    assert_eq!(post["title"], "Tides");
    assert_eq!(post["author"], "gull");
    assert_eq!(post["views"], 1);
    assert_eq!(post["has_edit_code"], false);
    assert_eq!(post["edition"]["name"], "No edition");
    assert!(post.get("password").is_none());

    let (_, body) = call(&app, Method::GET, &format!("/api/v1/post/{id}"), None, None).await;
    assert_eq!(body["data"]["views"], 2);
}

#[tokio::test]
async fn test_create_post_validation() {
    let (app, _state) = setup();

    for body in [
        json!({"content": "   "}),
        json!({"content": "x".repeat(100_001)}),
        json!({"content": "ok", "title": "t".repeat(201)}),
        json!({"content": "ok", "edition": 42}),
        json!({"title": "no content"}),
    ] {
        let (status, response) = call(&app, Method::POST, "/api/v1/post", Some(body), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["success"], false);
        assert_eq!(response["error"]["code"], "ValidationError");
    }
}

#[tokio::test]
async fn test_post_not_found_and_invalid_link() {
    let (app, _state) = setup();

    let (status, body) = call(&app, Method::GET, "/api/v1/post/zzzz", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["title"], "Invalid link");

    let missing = hashid::encode(999).unwrap();
    let (status, body) = call(&app, Method::GET, &format!("/api/v1/post/{missing}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NotFound");
}

#[tokio::test]
async fn test_legacy_ulid_redirect() {
    let (app, state) = setup();
    let token = seed_post(&state, "old", None).await;
    state
        .store
        .lock()
        .await
        .conn()
        .execute(
            "INSERT INTO post_id_map (ulid, new_id) VALUES ('01HZY3A7Q9J0V5C2M8N4P6R1ST', 1)",
            [],
        )
        .unwrap();

    let response = send(
        &app,
        request(Method::GET, "/api/v1/post/01HZY3A7Q9J0V5C2M8N4P6R1ST", None, None, None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(
        response.headers()[header::LOCATION],
        format!("/api/v1/post/{token}").as_str()
    );
}

#[tokio::test]
async fn test_random_post() {
    let (app, state) = setup();

    let (status, body) = call(&app, Method::GET, "/api/v1/post/random", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["title"], "No posts yet");

    let token = seed_post(&state, "only", None).await;
    let response = send(&app, request(Method::GET, "/api/v1/post/random", None, None, None)).await;
    assert!(response.status().is_redirection());
    assert_eq!(
        response.headers()[header::LOCATION],
        format!("/api/v1/post/{token}").as_str()
    );
}

#[tokio::test]
async fn test_rate_limited() {
    let (app, _state) = setup();
    let body = || Some(json!({"content": "again and again"}));

    let first = send(&app, request(Method::POST, "/api/v1/post", body(), None, Some("7.7.7.7"))).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = send(&app, request(Method::POST, "/api/v1/post", body(), None, Some("7.7.7.7"))).await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key(header::RETRY_AFTER));

    let other = send(&app, request(Method::POST, "/api/v1/post", body(), None, Some("8.8.8.8"))).await;
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_list_and_search() {
    let (app, state) = setup();
    seed_post(&state, "The moon rose over the harbour", None).await;
    seed_post(&state, "A quiet morning", None).await;

    let (status, body) = call(&app, Method::GET, "/api/v1/posts", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["posts"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["total_pages"], 1);

    let (_, body) = call(&app, Method::GET, "/api/v1/posts?search=moon&sort=views&order=asc", None, None).await;
    assert_eq!(body["data"]["posts"].as_array().unwrap().len(), 1);

    let (status, _) = call(&app, Method::GET, "/api/v1/posts?sort=sideways", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    state
        .store
        .lock()
        .await
        .create_post(&NewPost {
            content: "Something grim".to_string(),
            nsfw: true,
            ..Default::default()
        })
        .unwrap();

    let (_, body) = call(&app, Method::GET, "/api/v1/posts", None, None).await;
    assert_eq!(body["data"]["posts"].as_array().unwrap().len(), 2);
    let (status, body) = call(&app, Method::GET, "/api/v1/posts?nsfw=yes", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["posts"].as_array().unwrap().len(), 3);
    let (_, body) = call(&app, Method::GET, "/api/v1/posts?nsfw=no", None, None).await;
    assert_eq!(body["data"]["posts"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_edit_session_flow() {
    let (app, state) = setup();
    let token = seed_post(&state, "draft", Some("hunter22")).await;
    let manage = format!("/api/v1/post/{token}/manage");
    let update = format!("/api/v1/post/{token}/update");

    let (status, _) = call(&app, Method::POST, &manage, Some(json!({"password": "wrong"})), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(&app, Method::POST, &manage, Some(json!({"password": "hunter22"})), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let session = body["data"]["session"].as_str().unwrap().to_string();

    let edit = json!({"session": session, "action": "update", "content": "final", "title": "Done"});
    let (status, body) = call(&app, Method::POST, &update, Some(edit.clone()), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["action"], "update");

    // Sessions are single use.
    let (status, body) = call(&app, Method::POST, &update, Some(edit), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["title"], "Editing session expired");

    let post = state.store.lock().await.post_by_token(&token).unwrap().unwrap();
    assert_eq!(post.content, "final");
    assert_eq!(post.summary.title.as_deref(), Some("Done"));
}

#[tokio::test]
async fn test_rejected_update_keeps_session() {
    let (app, state) = setup();
    let token = seed_post(&state, "draft", Some("hunter22")).await;
    let edition = state.store.lock().await.create_edition("Week 1", "").unwrap();
    let update = format!("/api/v1/post/{token}/update");

    let (_, body) = call(
        &app,
        Method::POST,
        &format!("/api/v1/post/{token}/manage"),
        Some(json!({"password": "hunter22"})),
        None,
    )
    .await;
    let session = body["data"]["session"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app,
        Method::POST,
        &update,
        Some(json!({"session": session, "action": "update", "content": "final", "edition": 999})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "ValidationError");

    let (status, _) = call(
        &app,
        Method::POST,
        &update,
        Some(json!({"session": session, "action": "update", "content": "   "})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The same session still works once the request is fixed.
    let (status, body) = call(
        &app,
        Method::POST,
        &update,
        Some(json!({"session": session, "action": "update", "content": "final", "edition": edition.id})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let post = state.store.lock().await.post_by_token(&token).unwrap().unwrap();
    assert_eq!(post.content, "final");
    assert_eq!(post.summary.edition(), edition.id);
}

#[tokio::test]
async fn test_edit_session_delete_and_other_posts() {
    let (app, state) = setup();
    let token = seed_post(&state, "mine", Some("hunter22")).await;
    let other = seed_post(&state, "theirs", Some("hunter22")).await;
    let open = seed_post(&state, "no code", None).await;

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/v1/post/{open}/manage"),
        Some(json!({"password": "anything"})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = call(
        &app,
        Method::POST,
        &format!("/api/v1/post/{token}/manage"),
        Some(json!({"password": "hunter22"})),
        None,
    )
    .await;
    let session = body["data"]["session"].as_str().unwrap().to_string();

    // A session only works for the post it was opened on.
    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/v1/post/{other}/update"),
        Some(json!({"session": session, "action": "delete"})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/v1/post/{token}/update"),
        Some(json!({"session": session, "action": "delete"})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, Method::GET, &format!("/api/v1/post/{token}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_comments() {
    let (app, state) = setup();
    let token = seed_post(&state, "poem", None).await;

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/v1/post/{token}/comment"),
        Some(json!({"content": "  lovely  "})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["content"], "lovely");
    assert_eq!(body["data"]["author"], "Anonymous");
    assert_eq!(body["data"]["for"], token.as_str());

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/v1/post/{token}/comment"),
        Some(json!({"content": ""})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&app, Method::GET, &format!("/api/v1/post/{token}/comments"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let missing = hashid::encode(500).unwrap();
    let (status, _) = call(&app, Method::GET, &format!("/api/v1/post/{missing}/comments"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_guard() {
    let (app, _state) = setup();

    let (status, body) = call(&app, Method::GET, "/api/v1/admin/whoami", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "MissingToken");

    let (status, body) = call(&app, Method::GET, "/api/v1/admin/whoami", None, Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "InvalidToken");

    let other = JwtKeys::new(&["someone-else".to_string()]).unwrap().sign("mallory").unwrap();
    let (status, _) = call(&app, Method::GET, "/api/v1/admin/whoami", None, Some(&other)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signup_and_signin() {
    let (app, state) = setup();
    let token = admin_token(&app, &state, "marlowe").await;

    let (status, body) = call(&app, Method::GET, "/api/v1/admin/whoami", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "marlowe");

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/admin/signup",
        Some(json!({"username": "marlowe", "password": "long enough", "signupCode": "deadbeef"})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "UserExists");

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/admin/signup",
        Some(json!({"username": "newcomer", "password": "long enough", "signupCode": "deadbeef"})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "InvalidCode");

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/admin/signin",
        Some(json!({"username": "marlowe", "password": "long enough"})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["token"].is_string());

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/admin/signin",
        Some(json!({"username": "marlowe", "password": "not it at all"})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "InvalidCredentials");
}

#[tokio::test]
async fn test_moderation() {
    let (app, state) = setup();
    let admin = admin_token(&app, &state, "marlowe").await;
    let token = seed_post(&state, "spam", None).await;
    let comment = state
        .store
        .lock()
        .await
        .create_comment(&token, "more spam", None)
        .unwrap();

    let (status, body) = call(
        &app,
        Method::PATCH,
        &format!("/api/v1/admin/posts/{token}/nsfw"),
        Some(json!({"nsfw": true})),
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/admin/comments/{}", comment.id),
        None,
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["content"], "more spam");

    let (status, _) = call(
        &app,
        Method::GET,
        "/api/v1/admin/comments/not-a-ulid",
        None,
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/api/v1/admin/comments/{}", comment.id),
        None,
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/v1/admin/posts/{token}/reset-edit-code"),
        None,
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let code = body["data"]["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 8);
    let hash = state.store.lock().await.edit_code_hash(&token).unwrap().unwrap();
    assert!(auth::verify_password(&code, &hash));

    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/api/v1/admin/posts/{token}"),
        None,
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, Method::GET, &format!("/api/v1/post/{token}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, Method::GET, "/api/v1/admin/moderation-log", None, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    let actions: Vec<&str> = body["data"]["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert_eq!(
        actions,
        vec!["delete_post", "reset_edit_code", "delete_comment", "set_nsfw"]
    );
    assert!(body["data"]["entries"]
        .as_array()
        .unwrap()
        .iter()
        .all(|e| e["admin"] == "marlowe"));
}

#[tokio::test]
async fn test_editions() {
    let (app, state) = setup();
    let admin = admin_token(&app, &state, "marlowe").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/admin/editions",
        Some(json!({"name": "Week 1", "description": "Rain"})),
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/post",
        Some(json!({"content": "drizzle", "edition": id})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (_, body) = call(&app, Method::GET, "/api/v1/editions", None, None).await;
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["No edition", "Week 1"]);

    let (status, body) = call(&app, Method::GET, &format!("/api/v1/editions/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["edition"]["description"], "Rain");
    assert_eq!(body["data"]["posts"].as_array().unwrap().len(), 1);

    let (status, body) = call(&app, Method::GET, "/api/v1/home", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["currentEdition"], id);
    assert_eq!(body["data"]["editionInfo"]["name"], "Week 1");
    assert_eq!(body["data"]["edition"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["stats"]["posts"], 1);

    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/api/v1/admin/editions/{id}"),
        None,
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, Method::GET, &format!("/api/v1/editions/{id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        Method::DELETE,
        "/api/v1/admin/editions/0",
        None,
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_store_jobs_run_off_the_runtime() {
    let (app, state) = setup();

    let (count, missing) = tokio::join!(
        state.db(|store| Ok(store.post_count()?)),
        state.db(|store| store.random_post()?.ok_or(ApiError::NoPosts)),
    );
    assert_eq!(count.unwrap(), 0);
    assert!(matches!(missing, Err(ApiError::NoPosts)));

    let hash = blocking(|| Ok(auth::hash_password("hunter22")?)).await.unwrap();
    assert!(auth::verify_password("hunter22", &hash));

    // Concurrent submissions from different clients all land.
    let submissions: Vec<_> = (0..4)
        .map(|n| {
            let app = app.clone();
            tokio::spawn(async move {
                call(
                    &app,
                    Method::POST,
                    "/api/v1/post",
                    Some(json!({"content": format!("piece {n}"), "password": "hunter22"})),
                    None,
                )
                .await
            })
        })
        .collect();
    for submission in submissions {
        let (status, body) = submission.await.unwrap();
        assert_eq!(status, StatusCode::OK, "{body}");
    }
    assert_eq!(state.db(|store| Ok(store.post_count()?)).await.unwrap(), 4);
}
