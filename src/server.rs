use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

/// Builds the demo `Router`, instrumented by the shared `StatsD`.
pub fn create_router(state: Arc<AppState>) -> Router {
    let statsd = Arc::clone(&state.statsd);

    let routes = Router::new()
        // ── User endpoints ──────────────────────────────────────
        .route("/api/users/:id", get(handlers::users::get_user))
        .route("/api/users", post(handlers::users::create_user))
        // ── Liveness ────────────────────────────────────────────
        .route("/api/health", get(handlers::health))
        .with_state(state);

    // ── Global middleware (applied bottom-up) ───────────────────
    statsd
        .instrument(routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum_datadog::metrics::InMemoryClient;
    use axum_datadog::{Config, MetricOp, StatsD};
    use tower::ServiceExt;

    #[tokio::test]
    async fn create_then_fetch_user_is_instrumented() {
        let client = Arc::new(InMemoryClient::new());
        let statsd = Arc::new(StatsD::with_client(Config::default(), client.clone()));
        let state = Arc::new(AppState {
            statsd,
            users: handlers::users::UserStore::default(),
        });
        let app = create_router(state);

        let create = Request::builder()
            .method("POST")
            .uri("/api/users")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"name":"Ada","email":"ada@example.com"}"#))
            .unwrap();
        let resp = app.clone().oneshot(create).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 4096).await.unwrap();
        let user: handlers::users::User = serde_json::from_slice(&body).unwrap();

        let fetch = Request::builder()
            .uri(format!("/api/users/{}", user.id))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(fetch).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let timings: Vec<_> = client
            .emissions_for(MetricOp::Timing)
            .into_iter()
            .filter(|e| e.name == axum_datadog::config::DEFAULT_METRIC_NAME)
            .collect();
        assert_eq!(timings.len(), 2);
        assert_eq!(
            timings[0].tags,
            vec![
                "endpoint:/api/users",
                "method:post",
                "role:viewer",
                "status_code:200"
            ]
        );
        assert!(timings[1].tags.contains(&format!("user:{}", user.id)));

        let lookup = client
            .emissions()
            .into_iter()
            .find(|e| e.name == "users.lookup.time")
            .unwrap();
        assert!(lookup.tags.contains(&"endpoint:/api/users/:id".to_string()));
        assert_eq!(client.emissions_for(MetricOp::Increment)[0].name, "users.lookup.hit");
    }
}
