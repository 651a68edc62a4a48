//! HTTP request metrics.
//!
//! Runs as the outermost layer so responses produced by axum itself (404,
//! 405, 415, JSON rejections) and by the auth layer are counted too.

use crate::observability::metrics::record_http_request;
use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed());

    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::{get, post},
        Router,
    };
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/health", get(|| async { "OK" }))
            .route(
                "/api/v1/rooms/:code/join",
                post(|| async { StatusCode::CONFLICT }),
            )
            .layer(middleware::from_fn(http_metrics_middleware))
    }

    async fn status_of(method: &str, uri: &str) -> StatusCode {
        let request = HttpRequest::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_passes_responses_through() {
        assert_eq!(status_of("GET", "/health").await, StatusCode::OK);
        assert_eq!(
            status_of("POST", "/api/v1/rooms/Ab3dE6gH9jKm/join").await,
            StatusCode::CONFLICT
        );
    }

    #[tokio::test]
    async fn test_framework_errors_pass_through() {
        assert_eq!(status_of("GET", "/nope").await, StatusCode::NOT_FOUND);
        assert_eq!(
            status_of("DELETE", "/health").await,
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
