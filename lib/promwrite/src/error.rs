use http::StatusCode;
use snafu::Snafu;

use crate::snapshot::{GatherError, MetricType};

/// An error encountered while exporting a snapshot to a remote write endpoint.
///
/// Every stage of the export pipeline reports failures through this type. None of them are retried: the caller
/// driving the pipeline decides what a failure means, which for [`RemoteWriter::run`][crate::RemoteWriter::run] is
/// to stop.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum ExportError {
    /// Gathering the metrics snapshot failed.
    #[snafu(display("failed to gather metrics: {}", source))]
    Gather {
        /// Error source.
        source: GatherError,
    },

    /// A metric family declared a type with no value extraction rule.
    #[snafu(display("unknown metric type '{}' for metric family '{}'", metric_type, family))]
    UnknownMetricType {
        /// Name of the offending metric family.
        family: String,

        /// The declared metric type.
        metric_type: MetricType,
    },

    /// Serializing, compressing, or decoding the write request failed.
    #[snafu(display("failed to encode write request: {}", source))]
    Encoding {
        /// Error source.
        source: CodecError,
    },

    /// The HTTP request could not be sent, or did not complete.
    #[snafu(display("failed to send write request to remote endpoint: {}", source))]
    Transport {
        /// Error source.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The remote endpoint responded with a status other than `200 OK`.
    #[snafu(display("remote endpoint rejected write request with status {}: {}", status, body))]
    DeliveryRejected {
        /// Response status.
        status: StatusCode,

        /// Response body, possibly truncated.
        body: String,
    },
}

impl ExportError {
    /// Returns a short, stable name for the kind of error.
    ///
    /// Used as a structured logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Gather { .. } => "gather",
            Self::UnknownMetricType { .. } => "unknown_metric_type",
            Self::Encoding { .. } => "encoding",
            Self::Transport { .. } => "transport",
            Self::DeliveryRejected { .. } => "delivery_rejected",
        }
    }
}

/// A wire codec error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum CodecError {
    /// Serializing the write request into its Protocol Buffers form failed.
    #[snafu(display("protobuf serialization failed: {}", source))]
    Serialize {
        /// Error source.
        source: prost::EncodeError,
    },

    /// Deserializing a write request from its Protocol Buffers form failed.
    #[snafu(display("protobuf deserialization failed: {}", source))]
    Deserialize {
        /// Error source.
        source: prost::DecodeError,
    },

    /// Compressing or decompressing the payload failed.
    #[snafu(display("snappy {} failed: {}", operation, source))]
    Snappy {
        /// Whether we were compressing or decompressing.
        operation: &'static str,

        /// Error source.
        source: snap::Error,
    },
}
