use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::middleware::{auth_middleware, metrics_middleware, rate_limit_middleware};
use super::{audit, handlers, tickets};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let rate_limited = || middleware::from_fn_with_state(Arc::clone(&state), rate_limit_middleware);

    // Authenticated routes; issuance and redemption are also rate limited
    let protected_routes = Router::new()
        .route("/config", get(handlers::get_config))
        // Audit
        .route("/audit", get(audit::query_audit))
        // Tickets
        .route("/brts", post(tickets::create_ticket).layer(rate_limited()))
        .route("/brts", get(tickets::list_tickets))
        .route("/brts/redeem", post(tickets::redeem_ticket).layer(rate_limited()))
        .route(
            "/brts/{id}",
            get(tickets::get_ticket)
                .patch(tickets::update_ticket)
                .put(tickets::update_ticket)
                .delete(tickets::delete_ticket),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(Arc::clone(&state));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics).with_state(state))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
