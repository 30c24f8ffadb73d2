//! Snapshot model.
//!
//! A snapshot is the ordered list of [`MetricFamily`] values returned by a [`Gatherer`]. It is built fresh for every
//! export and never cached.
use std::fmt;

/// An error returned by a [`Gatherer`].
pub type GatherError = Box<dyn std::error::Error + Send + Sync>;

/// A source of metric snapshots.
pub trait Gatherer: Send + Sync {
    /// Collects the current value of every metric.
    ///
    /// # Errors
    ///
    /// If the snapshot cannot be collected, an error will be returned.
    fn gather(&self) -> Result<Vec<MetricFamily>, GatherError>;
}

impl<F> Gatherer for F
where
    F: Fn() -> Result<Vec<MetricFamily>, GatherError> + Send + Sync,
{
    fn gather(&self) -> Result<Vec<MetricFamily>, GatherError> {
        self()
    }
}

/// Metric type.
///
/// Discriminants match the Prometheus client data model.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MetricType {
    /// A monotonically increasing value.
    Counter = 0,

    /// A point-in-time value.
    Gauge = 1,

    /// Client-side computed quantiles, with a sample count and sum.
    Summary = 2,

    /// A value with no declared semantics.
    Untyped = 3,

    /// Bucketed observations, with a sample count and sum.
    Histogram = 4,

    /// A histogram whose buckets may go down as well as up.
    GaugeHistogram = 5,
}

impl MetricType {
    /// Returns the name of this metric type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Summary => "summary",
            Self::Untyped => "untyped",
            Self::Histogram => "histogram",
            Self::GaugeHistogram => "gaugehistogram",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i32> for MetricType {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Counter),
            1 => Ok(Self::Gauge),
            2 => Ok(Self::Summary),
            3 => Ok(Self::Untyped),
            4 => Ok(Self::Histogram),
            5 => Ok(Self::GaugeHistogram),
            other => Err(format!("invalid metric type marker {}", other)),
        }
    }
}

/// A label attached to a metric.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LabelPair {
    /// Label name.
    pub name: String,

    /// Label value.
    pub value: String,
}

impl LabelPair {
    /// Creates a new `LabelPair`.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The value of a single metric.
#[derive(Clone, Debug, PartialEq)]
pub enum MetricValue {
    /// Counter value.
    Counter {
        /// Current value.
        value: f64,
    },

    /// Gauge value.
    Gauge {
        /// Current value.
        value: f64,
    },

    /// Untyped value.
    Untyped {
        /// Current value.
        value: f64,
    },

    /// Summary value.
    Summary {
        /// Number of observations.
        sample_count: u64,

        /// Sum of all observations.
        sample_sum: f64,
    },

    /// Histogram value.
    Histogram {
        /// Number of observations.
        sample_count: u64,

        /// Sum of all observations.
        sample_sum: f64,
    },
}

impl MetricValue {
    /// Returns the counter value, if this is a counter.
    pub fn counter(&self) -> Option<f64> {
        match self {
            Self::Counter { value } => Some(*value),
            _ => None,
        }
    }

    /// Returns the gauge value, if this is a gauge.
    pub fn gauge(&self) -> Option<f64> {
        match self {
            Self::Gauge { value } => Some(*value),
            _ => None,
        }
    }

    /// Returns the untyped value, if this is an untyped value.
    pub fn untyped(&self) -> Option<f64> {
        match self {
            Self::Untyped { value } => Some(*value),
            _ => None,
        }
    }

    /// Returns the sum of observations, if this is a summary.
    pub fn summary_sum(&self) -> Option<f64> {
        match self {
            Self::Summary { sample_sum, .. } => Some(*sample_sum),
            _ => None,
        }
    }

    /// Returns the sum of observations, if this is a histogram.
    pub fn histogram_sum(&self) -> Option<f64> {
        match self {
            Self::Histogram { sample_sum, .. } => Some(*sample_sum),
            _ => None,
        }
    }
}

/// A single labeled metric within a family.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    /// Labels, in order. Never contains `__name__`.
    pub labels: Vec<LabelPair>,

    /// Value.
    pub value: MetricValue,
}

impl Metric {
    /// Creates a new `Metric` with no labels.
    pub fn new(value: MetricValue) -> Self {
        Self {
            labels: Vec::new(),
            value,
        }
    }

    /// Adds a label to this metric.
    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push(LabelPair::new(name, value));
        self
    }
}

/// A named group of metrics sharing one type.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricFamily {
    /// Family name.
    pub name: String,

    /// Help text. May be empty.
    pub help: String,

    /// Declared type of every metric in the family.
    pub metric_type: MetricType,

    /// Metrics, in order.
    pub metrics: Vec<Metric>,
}

impl MetricFamily {
    /// Creates a new, empty `MetricFamily`.
    pub fn new(name: impl Into<String>, metric_type: MetricType) -> Self {
        Self {
            name: name.into(),
            help: String::new(),
            metric_type,
            metrics: Vec::new(),
        }
    }

    /// Sets the help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    /// Adds a metric to this family.
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metrics.push(metric);
        self
    }
}
