//! Route configuration.

use crate::auth::{access_middleware, permission_middleware};
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post, put};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Everything here runs behind the access gate.
    let gated_routes = Router::new()
        .route("/v1/auth/whoami", get(handlers::whoami))
        .route("/v1/users", post(handlers::create_user))
        .route(
            "/v1/users/{username}/password",
            put(handlers::rotate_password),
        )
        .route(
            "/v1/cases",
            get(handlers::list_cases).post(handlers::create_case),
        )
        .route(
            "/v1/cases/{case_id}",
            get(handlers::get_case).delete(handlers::delete_case),
        )
        .route(
            "/v1/cases/{case_id}/evidences",
            get(handlers::list_evidences).post(handlers::create_evidence),
        )
        .route(
            "/v1/cases/{case_id}/evidences/{evidence_id}",
            get(handlers::get_evidence).delete(handlers::delete_evidence),
        )
        .route(
            "/v1/cases/{case_id}/evidences/{evidence_id}/content",
            get(handlers::download_evidence),
        )
        .route(
            "/v1/cases/{case_id}/evidences/{evidence_id}/comments",
            get(handlers::list_comments).post(handlers::add_comment),
        )
        // Layers run outermost first: access check, then permission check.
        .layer(middleware::from_fn(permission_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            access_middleware,
        ));

    let public_routes = Router::new()
        // Health check (intentionally unauthenticated for load balancers/k8s probes)
        .route("/v1/health", get(handlers::health_check))
        .route(
            "/v1/tokens/authentication",
            post(handlers::create_authentication_token),
        );

    let mut router = Router::new().merge(gated_routes).merge(public_routes);

    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to authorized Prometheus scraper IPs only.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.server.request_timeout(),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
