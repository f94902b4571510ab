//! Request Guard Demo Server
//!
//! Small API showing the guard in front of two side-effecting endpoints:
//! a JSON quiz submission and a redirecting session switch.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use request_guard_api::{
    rate_limit_middleware, GuardConfig, RateLimitOptions, RateLimitRule, RequestGuard,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

const QUIZ_SCOPE: &str = "api:quiz:submit";
const SESSION_SCOPE: &str = "api:session:switch";

const ANSWER_KEY: [u8; 5] = [2, 0, 3, 1, 1];

#[derive(Debug, Deserialize)]
struct QuizSubmission {
    quiz_id: String,
    answers: Vec<u8>,
}

#[derive(Debug, Serialize)]
struct QuizResult {
    quiz_id: String,
    score: usize,
    total: usize,
}

#[derive(Debug, Deserialize)]
struct SessionSwitch {
    workspace: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GuardConfig::from_env();
    tracing::info!(?config, "Request guard configured");
    let guard = RequestGuard::from_config(config);

    let session_rule = RateLimitRule::new(
        guard.clone(),
        SESSION_SCOPE,
        RateLimitOptions::new(60_000, 20),
    );

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/quiz/submit", post(submit_quiz))
        .route(
            "/api/v1/session/switch",
            post(switch_session).layer(middleware::from_fn_with_state(
                session_rule,
                rate_limit_middleware,
            )),
        );

    #[cfg(feature = "metrics")]
    let app = app.route("/metrics", get(request_guard_api::metrics::metrics_handler));

    let app = app.layer(TraceLayer::new_for_http()).with_state(guard);

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
        .expect("PORT must be a valid number");

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Request guard demo listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Health check with store sizes
async fn health_check(State(guard): State<RequestGuard>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "tracked_windows": guard.policy().tracked_windows(),
        "cached_replays": guard.policy().cached_replays(),
    }))
}

/// Score a quiz submission, at most 10 per minute per client.
async fn submit_quiz(
    State(guard): State<RequestGuard>,
    headers: HeaderMap,
    Json(submission): Json<QuizSubmission>,
) -> Response {
    if let Err(rejected) = guard.enforce(QUIZ_SCOPE, &headers, RateLimitOptions::new(60_000, 10)) {
        return rejected;
    }

    let replay_key = guard.replay_key(&headers);
    if let Some(payload) = replay_key
        .as_deref()
        .and_then(|key| guard.get_replay(QUIZ_SCOPE, key))
    {
        return guard.replay_to_response(&payload);
    }

    let result = QuizResult {
        score: submission
            .answers
            .iter()
            .zip(ANSWER_KEY.iter())
            .filter(|(given, expected)| given == expected)
            .count(),
        total: ANSWER_KEY.len(),
        quiz_id: submission.quiz_id,
    };
    tracing::info!(quiz_id = %result.quiz_id, score = result.score, "Quiz submitted");

    let body = match serde_json::to_value(&result) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize quiz result");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Some(key) = replay_key {
        guard.cache_api_response(QUIZ_SCOPE, &key, StatusCode::OK.as_u16(), body.clone());
    }
    (StatusCode::OK, Json(body)).into_response()
}

/// Switch the active workspace and redirect to it. Rate limited by middleware.
async fn switch_session(
    State(guard): State<RequestGuard>,
    headers: HeaderMap,
    Json(switch): Json<SessionSwitch>,
) -> Response {
    let replay_key = guard.replay_key(&headers);
    if let Some(payload) = replay_key
        .as_deref()
        .and_then(|key| guard.get_replay(SESSION_SCOPE, key))
    {
        return guard.replay_to_response(&payload);
    }

    tracing::info!(workspace = %switch.workspace, "Switching workspace");
    let location = format!("/workspaces/{}", switch.workspace);
    let status = StatusCode::SEE_OTHER.as_u16();

    if let Some(key) = replay_key {
        guard.cache_redirect_response(SESSION_SCOPE, &key, status, &location);
    }
    guard.replay_to_response(&request_guard_api::ReplayPayload::redirect(status, location))
}
