//! Helpers for testing against a local remote write endpoint.
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{extract::State, http::HeaderMap, routing::post, Router};
use bytes::Bytes;
use http::{header::AsHeaderName, StatusCode};
use promwrite_protos::prometheus::WriteRequest;
use prost::Message as _;
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::TcpListener,
};

use crate::{
    codec::encode_and_compress,
    series::build_write_request,
    snapshot::{Metric, MetricFamily, MetricType, MetricValue},
};

/// A request received by a [`TestEndpoint`].
pub struct ReceivedRequest {
    headers: HeaderMap,
    body: Bytes,
}

impl ReceivedRequest {
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn write_request(&self) -> WriteRequest {
        let decompressed = snap::raw::Decoder::new().decompress_vec(&self.body).unwrap();
        WriteRequest::decode(&decompressed[..]).unwrap()
    }
}

struct EndpointState {
    status: StatusCode,
    delay: Option<Duration>,
    requests: Mutex<Vec<ReceivedRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// A local remote write endpoint that records every request it receives and answers with a fixed status.
pub struct TestEndpoint {
    addr: SocketAddr,
    state: Arc<EndpointState>,
}

impl TestEndpoint {
    pub async fn spawn(status: StatusCode) -> Self {
        Self::spawn_inner(status, None).await
    }

    pub async fn spawn_with_delay(status: StatusCode, delay: Duration) -> Self {
        Self::spawn_inner(status, Some(delay)).await
    }

    async fn spawn_inner(status: StatusCode, delay: Option<Duration>) -> Self {
        let state = Arc::new(EndpointState {
            status,
            delay,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });

        let router = Router::new()
            .route("/api/v1/write", post(handle_write))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}/api/v1/write", self.addr)
    }

    pub fn requests(&self) -> std::sync::MutexGuard<'_, Vec<ReceivedRequest>> {
        self.state.requests.lock().unwrap()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

async fn handle_write(
    State(state): State<Arc<EndpointState>>, headers: HeaderMap, body: Bytes,
) -> (StatusCode, &'static str) {
    let in_flight = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
    state.requests.lock().unwrap().push(ReceivedRequest { headers, body });

    if let Some(delay) = state.delay {
        tokio::time::sleep(delay).await;
    }

    state.in_flight.fetch_sub(1, Ordering::SeqCst);
    (state.status, state.status.canonical_reason().unwrap_or_default())
}

/// Spawns an endpoint that answers every connection with `response`, verbatim, and then closes it.
pub async fn spawn_raw_endpoint(response: Vec<u8>) -> String {
    spawn_raw_endpoint_inner(response, false).await
}

/// Spawns an endpoint that answers every connection with `response`, verbatim, and then goes quiet while holding the
/// connection open.
pub async fn spawn_stalled_endpoint(response: &'static [u8]) -> String {
    spawn_raw_endpoint_inner(response.to_vec(), true).await
}

async fn spawn_raw_endpoint_inner(response: Vec<u8>, stall: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            let response = response.clone();
            tokio::spawn(async move {
                // The request itself doesn't matter, but reading some of it keeps the client from seeing a reset.
                let mut buf = vec![0; 64 * 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream.write_all(&response).await;
                let _ = stream.flush().await;

                if stall {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
            });
        }
    });

    format!("http://{}/api/v1/write", addr)
}

/// Builds a payload holding a single gauge, along with the write request it encodes.
pub fn payload_for(name: &str, value: f64) -> (Bytes, WriteRequest) {
    let families = vec![gauge_family(name, value)];
    let request = build_write_request(&families, 1_700_000_000_000).unwrap();
    let payload = encode_and_compress(&request).unwrap();
    (payload, request)
}

pub fn gauge_family(name: &str, value: f64) -> MetricFamily {
    MetricFamily::new(name, MetricType::Gauge).with_metric(Metric::new(MetricValue::Gauge { value }))
}
