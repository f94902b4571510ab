//! HTTP-level tests for the request guard.
//!
//! Each test builds a small router around a fresh guard so stores never leak
//! between tests.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use request_guard_api::{
    rate_limit_middleware, replay_to_response, response_rate_limited, GuardConfig,
    RateLimitOptions, RateLimitRule, ReplayPayload, RequestGuard,
};
use request_guard_core::{ManualClock, RequestPolicy};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

const SCOPE: &str = "api:quiz:submit";

/// Helper to extract the raw body from a response
async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body")
        .to_vec()
}

/// Helper to extract JSON body from response
async fn extract_json_body(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("Failed to parse JSON")
}

fn test_guard() -> (RequestGuard, ManualClock) {
    let clock = ManualClock::new();
    let policy = RequestPolicy::with_clock(GuardConfig::default(), Arc::new(clock.clone()));
    (RequestGuard::new(policy), clock)
}

#[derive(Clone)]
struct AppState {
    guard: RequestGuard,
    side_effects: Arc<AtomicUsize>,
}

/// Handler that performs a counted side effect, protected by replay.
async fn submit(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let key = state.guard.replay_key(&headers);
    if let Some(payload) = key.as_deref().and_then(|k| state.guard.get_replay(SCOPE, k)) {
        return state.guard.replay_to_response(&payload);
    }

    let n = state.side_effects.fetch_add(1, Ordering::SeqCst) + 1;
    let body = json!({"submission": n, "score": 3});
    if let Some(key) = key {
        state.guard.cache_api_response(SCOPE, &key, 201, body.clone());
    }
    (StatusCode::CREATED, Json(body)).into_response()
}

fn create_test_app(guard: RequestGuard, options: RateLimitOptions) -> (Router, Arc<AtomicUsize>) {
    let side_effects = Arc::new(AtomicUsize::new(0));
    let rule = RateLimitRule::new(guard.clone(), SCOPE, options);
    let app = Router::new()
        .route("/submit", post(submit))
        .layer(middleware::from_fn_with_state(rule, rate_limit_middleware))
        .with_state(AppState {
            guard,
            side_effects: Arc::clone(&side_effects),
        });
    (app, side_effects)
}

fn submit_request(client: &str, idempotency_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/submit")
        .header("x-forwarded-for", client);
    if let Some(key) = idempotency_key {
        builder = builder.header("idempotency-key", key);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_rate_limited_body_shape() {
    let response = response_rate_limited(17, Some(SCOPE));

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "17");

    let json = extract_json_body(response).await;
    assert_eq!(
        json,
        json!({
            "error": {
                "code": "RATE_LIMITED",
                "message": "Request rate limit exceeded",
                "details": {"scope": SCOPE}
            }
        })
    );
}

#[tokio::test]
async fn test_rate_limited_without_scope_omits_details() {
    let json = extract_json_body(response_rate_limited(1, None)).await;
    assert!(json["error"].get("details").is_none());
    assert_eq!(json["error"]["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn test_middleware_admits_budget_then_refuses() {
    let (guard, _clock) = test_guard();
    let (app, _) = create_test_app(guard, RateLimitOptions::new(1000, 2));

    let first = app.clone().oneshot(submit_request("203.0.113.1", None)).await.unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    assert_eq!(first.headers()["x-ratelimit-limit"], "2");
    assert_eq!(first.headers()["x-ratelimit-remaining"], "1");

    let second = app.clone().oneshot(submit_request("203.0.113.1", None)).await.unwrap();
    assert_eq!(second.status(), StatusCode::CREATED);
    assert_eq!(second.headers()["x-ratelimit-remaining"], "0");

    let third = app.clone().oneshot(submit_request("203.0.113.1", None)).await.unwrap();
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(third.headers()["retry-after"], "1");
    let json = extract_json_body(third).await;
    assert_eq!(json["error"]["details"]["scope"], SCOPE);

    // A different client has its own budget.
    let other = app.oneshot(submit_request("203.0.113.2", None)).await.unwrap();
    assert_eq!(other.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_middleware_reopens_after_window() {
    let (guard, clock) = test_guard();
    let (app, _) = create_test_app(guard, RateLimitOptions::new(1000, 1));

    app.clone().oneshot(submit_request("c", None)).await.unwrap();
    let refused = app.clone().oneshot(submit_request("c", None)).await.unwrap();
    assert_eq!(refused.status(), StatusCode::TOO_MANY_REQUESTS);

    clock.advance_ms(1000);
    let admitted = app.oneshot(submit_request("c", None)).await.unwrap();
    assert_eq!(admitted.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_retry_with_same_key_replays_without_side_effect() {
    let (guard, _clock) = test_guard();
    let (app, side_effects) = create_test_app(guard, RateLimitOptions::new(60_000, 10));

    let first = app
        .clone()
        .oneshot(submit_request("c", Some("retry-1")))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first_body = body_bytes(first).await;

    let retry = app
        .clone()
        .oneshot(submit_request("c", Some("retry-1")))
        .await
        .unwrap();
    assert_eq!(retry.status(), StatusCode::CREATED);
    assert_eq!(retry.headers()["content-type"], "application/json");
    assert_eq!(body_bytes(retry).await, first_body);
    assert_eq!(side_effects.load(Ordering::SeqCst), 1);

    // Another client reusing the key is not served someone else's result.
    let other = app
        .oneshot(submit_request("d", Some("retry-1")))
        .await
        .unwrap();
    assert_eq!(extract_json_body(other).await["submission"], 2);
}

#[tokio::test]
async fn test_replay_expires_and_side_effect_reruns() {
    let (guard, clock) = test_guard();
    let (app, side_effects) = create_test_app(guard, RateLimitOptions::new(60_000, 10));

    app.clone().oneshot(submit_request("c", Some("k"))).await.unwrap();
    clock.advance_ms(20_000);
    app.oneshot(submit_request("c", Some("k"))).await.unwrap();

    assert_eq!(side_effects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_json_replay_round_trips_status_body_and_headers() {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    headers.insert("x-quiz-attempt".to_string(), "3".to_string());
    let body = json!({"score": 3, "feedback": ["a", "b"], "passed": true});
    let payload = ReplayPayload::Json {
        status: 202,
        body: body.clone(),
        headers,
    };

    let (guard, _clock) = test_guard();
    guard.set_replay("quiz", "key1", payload, None);
    let stored = guard.get_replay("quiz", "key1").unwrap();

    let first = replay_to_response(&stored);
    let second = replay_to_response(&stored);
    assert_eq!(first.status(), StatusCode::ACCEPTED);
    assert_eq!(first.headers()["x-quiz-attempt"], "3");
    assert_eq!(first.headers()["content-type"], "application/json");

    let first_bytes = body_bytes(first).await;
    assert_eq!(first_bytes, body.to_string().into_bytes());
    assert_eq!(first_bytes, body_bytes(second).await);
}

#[tokio::test]
async fn test_redirect_replay_round_trips_location() {
    let (guard, _clock) = test_guard();
    guard.cache_redirect_response("session", "k", 303, "/workspaces/acme");

    let payload = guard.get_replay("session", "k").unwrap();
    let response = guard.replay_to_response(&payload);

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()["location"], "/workspaces/acme");
}

#[tokio::test]
async fn test_invalid_redirect_location_falls_back_to_login() {
    let payload = ReplayPayload::redirect(307, "http://[not-a-host");

    let response = replay_to_response(&payload);

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()["location"], "/login");
}
