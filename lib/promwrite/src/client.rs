//! Delivery of remote write payloads.
use std::{sync::Arc, time::Duration};

use bytes::{Bytes, BytesMut};
use http::{header, Request, StatusCode, Uri};
use http_body_util::{BodyExt as _, Full};
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioTimer},
};
use rustls::{ClientConfig, RootCertStore};
use snafu::ResultExt as _;
use tracing::{debug, warn};

use crate::{
    config::{parse_endpoint, ConfigurationError, Tls},
    error::{DeliveryRejected, ExportError},
};

const CONTENT_ENCODING_SNAPPY: &str = "snappy";
const CONTENT_TYPE_PROTOBUF: &str = "application/x-protobuf";
const REMOTE_WRITE_VERSION_HEADER: &str = "x-prometheus-remote-write-version";
const REMOTE_WRITE_VERSION: &str = "0.1.0";
const USER_AGENT: &str = concat!("promwrite/", env!("CARGO_PKG_VERSION"));

// Rejected response bodies are only kept for error reporting.
const REJECTED_BODY_LIMIT_BYTES: usize = 512;

/// A client for a single remote write endpoint.
///
/// Supports both `http` and `https` endpoints. Server certificates are validated against the platform's native root
/// certificates.
///
/// Connections are pooled and reused between sends, but every send is independent: there is no retry, and a failure
/// of one send has no effect on the next.
#[derive(Clone)]
pub struct RemoteWriteClient {
    endpoint: Uri,
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    request_timeout: Option<Duration>,
}

impl RemoteWriteClient {
    /// Creates a new `RemoteWriteClient` for the given endpoint.
    ///
    /// If `request_timeout` is set, a send that doesn't complete within it fails with a transport error.
    ///
    /// # Errors
    ///
    /// If the endpoint is not a valid `http` or `https` URL, or the TLS configuration can't be built, an error will be
    /// returned.
    pub fn new(endpoint: &str, request_timeout: Option<Duration>) -> Result<Self, ConfigurationError> {
        let endpoint = parse_endpoint(endpoint)?;

        let connector = HttpsConnectorBuilder::new()
            .with_tls_config(build_tls_config()?)
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(Duration::from_secs(45))
            .pool_max_idle_per_host(1)
            .build(connector);

        Ok(Self {
            endpoint,
            client,
            request_timeout,
        })
    }

    /// Returns the endpoint this client sends to.
    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    /// Sends a compressed payload to the remote endpoint.
    ///
    /// The send only succeeds if the endpoint responds with `200 OK`.
    ///
    /// # Errors
    ///
    /// If the request can't be sent, doesn't complete within the configured timeout, or the endpoint responds with any
    /// status other than `200 OK`, an error will be returned.
    pub async fn send(&self, payload: Bytes) -> Result<(), ExportError> {
        let payload_len = payload.len();
        let request = Request::post(self.endpoint.clone())
            .header(header::CONTENT_ENCODING, CONTENT_ENCODING_SNAPPY)
            .header(header::CONTENT_TYPE, CONTENT_TYPE_PROTOBUF)
            .header(REMOTE_WRITE_VERSION_HEADER, REMOTE_WRITE_VERSION)
            .header(header::USER_AGENT, USER_AGENT)
            .body(Full::new(payload))
            .map_err(|e| ExportError::Transport { source: e.into() })?;

        match self.request_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.exchange(request)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(ExportError::Transport {
                        source: format!("request timed out after {:?}", timeout).into(),
                    })
                }
            },
            None => self.exchange(request).await?,
        }

        debug!(endpoint = %self.endpoint, payload_len, "Sent write request.");

        Ok(())
    }

    // Covers the whole round trip, including reading the response body, so a configured timeout bounds all of it.
    async fn exchange(&self, request: Request<Full<Bytes>>) -> Result<(), ExportError> {
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ExportError::Transport { source: e.into() })?;

        let status = response.status();
        if status != StatusCode::OK {
            // Only a bounded prefix of the body is kept for the error.
            let body = match read_body_prefix(response.into_body(), REJECTED_BODY_LIMIT_BYTES).await {
                Ok((prefix, truncated)) => body_text(&prefix, truncated),
                Err(e) => format!("<failed to read response body: {}>", e),
            };

            return DeliveryRejected { status, body }.fail();
        }

        // Drain the body so the connection can go back to the pool.
        if let Err(e) = response.into_body().collect().await {
            debug!(error = %e, "Failed to drain response body after successful write.");
        }

        Ok(())
    }
}

/// Reads at most `limit` bytes of `body`, returning them along with whether the body had more.
async fn read_body_prefix(mut body: Incoming, limit: usize) -> Result<(BytesMut, bool), hyper::Error> {
    let mut prefix = BytesMut::new();

    while let Some(frame) = body.frame().await {
        let Ok(data) = frame?.into_data() else {
            continue;
        };

        let remaining = limit - prefix.len();
        if data.len() > remaining {
            prefix.extend_from_slice(&data[..remaining]);
            return Ok((prefix, true));
        }
        prefix.extend_from_slice(&data);
    }

    Ok((prefix, false))
}

fn body_text(prefix: &[u8], truncated: bool) -> String {
    let mut text = String::from_utf8_lossy(prefix).into_owned();
    if truncated {
        text.push_str("...");
    }
    text
}

fn build_tls_config() -> Result<ClientConfig, ConfigurationError> {
    let mut root_cert_store = RootCertStore::empty();

    // Missing platform certificates only matter for `https` endpoints, where they surface as handshake failures.
    let result = rustls_native_certs::load_native_certs();
    for e in &result.errors {
        warn!(error = %e, "Failed to load certificate from platform's native certificate store.");
    }

    let (added, failed) = root_cert_store.add_parsable_certificates(result.certs);
    debug!(added, failed, "Loaded platform root certificates.");

    let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
        .with_safe_default_protocol_versions()
        .context(Tls)?
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();

    Ok(config)
}
