mod common;

use std::{collections::HashMap, sync::Arc};

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use rishiconnect::{AppState, app, config::Settings, notifier::LogNotifier};
use serde_json::{Value, json};
use tower::ServiceExt;

type Reply = (StatusCode, Option<String>, Value);

async fn call(
    router: &Router,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> Reply {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::to_owned);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, set_cookie, json)
}

async fn get(router: &Router, uri: &str, cookie: &str) -> Reply {
    call(router, Method::GET, uri, Some(cookie), None).await
}

async fn send(router: &Router, method: Method, uri: &str, cookie: &str, body: Value) -> Reply {
    call(router, method, uri, Some(cookie), Some(body)).await
}

async fn login(router: &Router, token: &str) -> String {
    let body = json!({ "token": token });
    let (status, cookie, body) = call(router, Method::POST, "/login", None, Some(body)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    cookie.expect("session cookie")
}

async fn signed_in_pair() -> (Router, String, String, String, String) {
    let h = common::harness(&["Anu", "Bela"]).await;
    let [anu, bela] = h.users[..] else { unreachable!() };

    let mut settings = Settings::default();
    settings.identity.tokens = HashMap::from([
        ("anu-token".to_owned(), anu),
        ("bela-token".to_owned(), bela),
    ]);
    let state = AppState::new(h.state.db_pool.clone(), settings, Arc::new(LogNotifier));
    let router = app(state);

    let anu_cookie = login(&router, "anu-token").await;
    let bela_cookie = login(&router, "bela-token").await;
    (router, anu_cookie, bela_cookie, anu.to_string(), bela.to_string())
}

#[tokio::test]
async fn health_is_public() {
    let h = common::harness(&[]).await;
    let router = app(h.state);
    let (status, _, _) = call(&router, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn engine_routes_need_a_session() {
    let h = common::harness(&["Anu"]).await;
    let router = app(h.state);

    let (status, _, body) = call(&router, Method::GET, "/feed", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let body = json!({ "token": "nope" });
    let (status, _, _) = call(&router, Method::POST, "/login", None, Some(body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn swipe_match_message_and_unmatch_over_http() {
    let (router, anu_cookie, bela_cookie, anu, bela) = signed_in_pair().await;

    let (status, _, feed) = get(&router, "/feed?limit=10", &anu_cookie).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed[0]["id"], bela.as_str());

    let like = |target: &str| json!({ "target_id": target, "action": "like" });
    let (status, _, outcome) =
        send(&router, Method::POST, "/swipes", &anu_cookie, like(&bela)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["matched"], false);

    let (status, _, body) = send(&router, Method::POST, "/swipes", &anu_cookie, like(&bela)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "DUPLICATE_SWIPE");

    let (_, _, outcome) = send(&router, Method::POST, "/swipes", &bela_cookie, like(&anu)).await;
    assert_eq!(outcome["matched"], true);
    assert_eq!(outcome["matched_profile"]["id"], anu.as_str());
    let room_id = outcome["room_id"].as_str().unwrap().to_owned();

    let messages_uri = format!("/r/{room_id}/messages");
    let hello = json!({ "body": "hello" });
    let (status, _, message) = send(&router, Method::POST, &messages_uri, &anu_cookie, hello).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message["status"], "sent");

    let (_, _, rooms) = get(&router, "/r", &bela_cookie).await;
    assert_eq!(rooms[0]["unread_count"], 1);
    assert_eq!(rooms[0]["peer"]["name"], "Anu");

    let read = json!({ "message_ids": [message["id"]] });
    let read_uri = format!("/r/{room_id}/read");
    let (_, _, changed) = send(&router, Method::POST, &read_uri, &bela_cookie, read).await;
    assert_eq!(changed[0]["status"], "read");

    let room_uri = format!("/r/{room_id}");
    for _ in 0..2 {
        let (status, _, _) =
            call(&router, Method::DELETE, &room_uri, Some(&bela_cookie), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let (status, _, _) = get(&router, &messages_uri, &anu_cookie).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn profile_routes_and_logout() {
    let (router, anu_cookie, _, _, bela) = signed_in_pair().await;

    let update = json!({ "name": "Anu R", "year": 2, "interests": ["chess", "chess"] });
    let (status, _, profile) = send(&router, Method::PUT, "/me/profile", &anu_cookie, update).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["name"], "Anu R");
    assert_eq!(profile["interests"], json!(["chess"]));

    let nameless = json!({ "name": "" });
    let (status, _, body) = send(&router, Method::PUT, "/me/profile", &anu_cookie, nameless).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION");

    let token = json!({ "token": "abc" });
    let (status, _, _) = send(&router, Method::PUT, "/me/push-token", &anu_cookie, token).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, other) = get(&router, &format!("/p/{bela}"), &anu_cookie).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(other["name"], "Bela");

    let (status, _, _) = call(&router, Method::POST, "/logout", Some(&anu_cookie), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = get(&router, "/me/profile", &anu_cookie).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
