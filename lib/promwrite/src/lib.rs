//! Prometheus remote write exporter.
//!
//! This crate periodically gathers a snapshot of in-process metrics, converts it into Prometheus remote write time
//! series, and delivers it to a remote storage endpoint as a Snappy-compressed Protocol Buffers payload.
//!
//! The pieces are usable on their own:
//!
//! - [`MetricsRegistry`] records metrics emitted through the `metrics` facade and can be gathered from.
//! - [`build_write_request`] converts a snapshot into a [`WriteRequest`][promwrite_protos::prometheus::WriteRequest].
//! - [`encode_and_compress`] produces the payload for a write request.
//! - [`RemoteWriteClient`] sends payloads to a remote write endpoint.
//! - [`RemoteWriter`] ties all of the above together on a fixed interval.
#![deny(warnings)]
#![deny(missing_docs)]

mod client;
pub use self::client::RemoteWriteClient;

mod codec;
pub use self::codec::{compress, decode_write_request, decompress, encode_and_compress, encode_write_request};

pub mod config;
pub use self::config::RemoteWriteConfiguration;

mod error;
pub use self::error::{CodecError, ExportError};

mod registry;
pub use self::registry::{normalize_label_name, normalize_metric_name, MetricsRegistry};

mod series;
pub use self::series::{build_write_request, current_timestamp_ms, METRIC_NAME_LABEL};

pub mod snapshot;
pub use self::snapshot::{GatherError, Gatherer};

mod writer;
pub use self::writer::RemoteWriter;

#[cfg(test)]
mod test_util;
