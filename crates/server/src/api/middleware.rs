//! Authentication, rate limiting and metrics middleware for API routes.

use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header, request::Parts, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use brt_core::{resolve_key, Admission, AuthRequest, Identity};

use super::ApiError;
use crate::metrics::{
    normalize_path, AUTH_FAILURES_TOTAL, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION,
};
use crate::state::AppState;

pub const RATE_LIMIT_LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const RATE_LIMIT_REMAINING_HEADER: HeaderName =
    HeaderName::from_static("x-ratelimit-remaining");

/// Peer address of the connection, or localhost when served without one.
fn client_ip(request: &Request<Body>) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Metrics middleware that tracks HTTP request duration and counts.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();

    let response = next.run(request).await;

    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

/// Authentication middleware that validates requests using the configured authenticator.
///
/// On success the resolved [`Identity`] is stored in the request extensions.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let authenticator = state.authenticator();

    let headers: HashMap<String, String> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    let auth_request = AuthRequest {
        headers,
        source_ip: client_ip(&request),
    };

    match authenticator.authenticate(&auth_request).await {
        Ok(identity) => {
            debug!(user_id = %identity.user_id, method = %identity.method, "Request authenticated");
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => {
            AUTH_FAILURES_TOTAL.with_label_values(&[e.reason()]).inc();
            if e.is_client_error() {
                debug!(reason = e.reason(), "Request rejected by authenticator");
                ApiError::Unauthorized.into_response()
            } else {
                ApiError::Internal(e.to_string()).into_response()
            }
        }
    }
}

/// Identity key of the caller, from the authenticated user or the user agent.
fn limiter_key(request: &Request<Body>) -> String {
    let origin = client_ip(request).to_string();
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());
    resolve_key(request.extensions().get::<Identity>(), &origin, user_agent)
}

/// Admission control for sensitive routes.
///
/// Must run after [`auth_middleware`] so the caller's identity is known.
/// Allowed responses carry the remaining budget; denials short-circuit
/// with 429.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config().rate_limit.enabled {
        return next.run(request).await;
    }

    let key = limiter_key(&request);
    let limiter = state.rate_limiter();
    match limiter.check_policy(&key, limiter.policy()).await {
        Admission::Allow { limit, remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(limit));
            headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(remaining));
            response
        }
        Admission::Deny {
            limit, retry_after, ..
        } => ApiError::RateLimited { limit, retry_after }.into_response(),
    }
}

/// Extractor for authenticated user ID.
///
/// Routes without an identity act as [`Identity::ANONYMOUS`].
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let user_id = parts
            .extensions
            .get::<Identity>()
            .map(|id| id.user_id.clone())
            .unwrap_or_else(|| Identity::ANONYMOUS.to_string());
        std::future::ready(Ok(AuthUser(user_id)))
    }
}
