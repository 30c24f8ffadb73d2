//! Sample HTTP API.
//!
//! Two endpoints that take a random amount of time to respond, with every request timed into a histogram.
use std::time::{Duration, Instant};

use axum::{routing::get, Router};
use metrics::{describe_histogram, histogram, Unit};
use tokio::net::TcpListener;
use tracing::debug;

const REQUEST_DURATION: &str = "sample_api_http_request_duration_seconds";

/// Builds the API router.
pub fn router() -> Router {
    describe_histogram!(
        REQUEST_DURATION,
        Unit::Seconds,
        "A histogram of the sample API request durations in seconds."
    );

    Router::new().route("/api/foo", get(foo)).route("/api/bar", get(bar))
}

/// Serves the API on the given listener until the server fails.
pub async fn serve(listener: TcpListener) -> std::io::Result<()> {
    axum::serve(listener, router()).await
}

async fn foo() -> &'static str {
    debug!("Handling foo...");
    handle("foo", Duration::from_millis(25), 150.0).await;
    "Handled foo"
}

async fn bar() -> &'static str {
    debug!("Handling bar...");
    handle("bar", Duration::from_millis(50), 200.0).await;
    "Handled bar"
}

async fn handle(handler: &'static str, base: Duration, max_jitter_ms: f64) {
    let start = Instant::now();

    // Simulates the work the handler needs to do.
    let jitter = Duration::from_millis((rand::random::<f64>() * max_jitter_ms) as u64);
    tokio::time::sleep(base + jitter).await;

    histogram!(REQUEST_DURATION, "handler" => handler).record(start.elapsed());
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt as _;
    use tower::ServiceExt as _;

    use super::*;

    async fn get_body(path: &str) -> String {
        let response = router()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());

        let body = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn handlers_respond() {
        assert_eq!(get_body("/api/foo").await, "Handled foo");
        assert_eq!(get_body("/api/bar").await, "Handled bar");
    }
}
