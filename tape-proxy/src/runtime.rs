use std::{sync::Arc, time::Instant};

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{Response, StatusCode},
    middleware::{self, Next},
    response::IntoResponse,
    routing::any,
};
use http_body_util::LengthLimitError;
use tracing::{info, warn};

use crate::{
    config::ConfigHandle,
    control_plane::{ControlPlaneError, ControlPlaneRequest, ControlPlaneRouter},
    logging::{category_access, category_control, category_tapes, method_label, status_label},
};

#[derive(Clone)]
pub struct SharedState {
    pub config: ConfigHandle,
    pub router: Arc<ControlPlaneRouter>,
}

impl SharedState {
    pub fn new(config: ConfigHandle, router: ControlPlaneRouter) -> Self {
        Self {
            config,
            router: Arc::new(router),
        }
    }
}

/// Mounts the control plane in front of `data_plane`. Requests under the
/// control-plane prefix never reach the data plane.
pub fn build_app(state: SharedState, data_plane: Router) -> Router {
    Router::new()
        .fallback_service(data_plane)
        .layer(middleware::from_fn_with_state(
            state,
            control_plane_middleware,
        ))
        .layer(middleware::from_fn(access_log_middleware))
}

pub fn build_data_app() -> Router {
    Router::new().fallback(any(data_plane_handler))
}

async fn data_plane_handler(request: Request) -> Response<Body> {
    warn!(
        "{} no replay pipeline attached; returning 404 for {}",
        category_tapes(),
        request.uri()
    );
    text_response(StatusCode::NOT_FOUND, "not found")
}

async fn control_plane_middleware(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response<Body> {
    let url = request
        .uri()
        .path_and_query()
        .map(|value| value.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    if !state.router.is_control_plane_url(&url) {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let limit = state.config.max_control_body_bytes();
    let body = match to_bytes(body, limit).await {
        Ok(body) => body,
        Err(err) => {
            let err = body_read_error(err, limit);
            warn!("{} {err}", category_control());
            return err.into_response();
        }
    };

    let request = ControlPlaneRequest {
        method: parts.method,
        url,
        headers: parts.headers,
        body,
    };
    match state.router.handle_request(&request).await {
        Ok(response) => response.into_response(),
        Err(err) => {
            warn!(
                "{} request failed url={} method={}: {err}",
                category_control(),
                request.url,
                request.method
            );
            err.into_response()
        }
    }
}

fn body_read_error(err: axum::Error, limit: usize) -> ControlPlaneError {
    let mut source = std::error::Error::source(&err);
    while let Some(inner) = source {
        if inner.is::<LengthLimitError>() {
            return ControlPlaneError::BodyTooLarge { limit };
        }
        source = inner.source();
    }
    ControlPlaneError::UnreadableBody(err)
}

fn text_response(status: StatusCode, text: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(text.to_string()));
    *response.status_mut() = status;
    response
}

async fn access_log_middleware(request: Request, next: Next) -> Response<Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_millis();
    let status = response.status();

    info!(
        "{} {} {} {} {}ms",
        category_access(),
        method_label(method.as_str()),
        status_label(status.as_u16()),
        uri,
        elapsed_ms
    );

    response
}
