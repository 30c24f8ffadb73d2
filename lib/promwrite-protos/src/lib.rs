//! Prometheus remote write Protocol Buffers definitions.
//!
//! This crate contains the message types used to ship time series to a Prometheus-compatible remote storage
//! backend. The definitions mirror `proto/remote.proto`, and the field numbers are fixed by the upstream schema.
#![deny(warnings)]
#![deny(missing_docs)]

/// Remote write (v1) definitions.
pub mod prometheus {
    /// The top-level envelope sent to a remote write endpoint.
    #[allow(clippy::derive_partial_eq_without_eq)]
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct WriteRequest {
        /// Time series being written.
        #[prost(message, repeated, tag = "1")]
        pub timeseries: ::prost::alloc::vec::Vec<TimeSeries>,
    }

    /// A single time series: a label set and its samples.
    #[allow(clippy::derive_partial_eq_without_eq)]
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TimeSeries {
        /// Labels identifying the series, including the reserved `__name__` label.
        #[prost(message, repeated, tag = "1")]
        pub labels: ::prost::alloc::vec::Vec<Label>,
        /// Samples, in timestamp order.
        #[prost(message, repeated, tag = "2")]
        pub samples: ::prost::alloc::vec::Vec<Sample>,
    }

    /// A label name/value pair.
    #[allow(clippy::derive_partial_eq_without_eq)]
    #[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
    pub struct Label {
        /// Label name.
        #[prost(string, tag = "1")]
        pub name: ::prost::alloc::string::String,
        /// Label value.
        #[prost(string, tag = "2")]
        pub value: ::prost::alloc::string::String,
    }

    /// A single sample.
    #[allow(clippy::derive_partial_eq_without_eq)]
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Sample {
        /// Sample value.
        #[prost(double, tag = "1")]
        pub value: f64,
        /// Timestamp, in milliseconds since the Unix epoch.
        #[prost(int64, tag = "2")]
        pub timestamp: i64,
    }

    impl Label {
        /// Creates a new `Label` from the given name and value.
        pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                value: value.into(),
            }
        }
    }
}
