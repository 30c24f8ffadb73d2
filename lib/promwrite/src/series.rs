//! Conversion of metric snapshots into remote write time series.
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use promwrite_protos::prometheus::{Label, Sample, TimeSeries, WriteRequest};
use tracing::debug;

use crate::{
    error::{ExportError, UnknownMetricType},
    snapshot::{Metric, MetricFamily, MetricType, MetricValue},
};

/// Name of the reserved label carrying the metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// Returns the current time, in milliseconds since the Unix epoch.
pub fn current_timestamp_ms() -> i64 {
    // A clock set before the epoch reads as the epoch itself.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(millis_since_epoch)
        .unwrap_or(0)
}

fn millis_since_epoch(elapsed: Duration) -> i64 {
    i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
}

/// Builds a write request from the given snapshot.
///
/// Every metric in every family produces exactly one time series, in snapshot order. Each series is labeled with
/// `__name__` set to the family name, followed by the metric's own labels, and carries a single sample stamped with
/// `timestamp_ms`.
///
/// # Errors
///
/// If any family declares a metric type that has no value extraction rule, an error is returned and no partial
/// output is produced.
pub fn build_write_request(families: &[MetricFamily], timestamp_ms: i64) -> Result<WriteRequest, ExportError> {
    let series_len = families.iter().map(|family| family.metrics.len()).sum();
    let mut timeseries = Vec::with_capacity(series_len);

    for family in families {
        let extract = value_extractor(family)?;

        for metric in &family.metrics {
            // A value of the wrong kind for the family's declared type reads as zero, the same as an unset field
            // would.
            let value = extract(&metric.value).unwrap_or_default();

            timeseries.push(TimeSeries {
                labels: build_labels(&family.name, metric),
                samples: vec![Sample {
                    value,
                    timestamp: timestamp_ms,
                }],
            });
        }
    }

    debug!(series = timeseries.len(), timestamp_ms, "Built write request.");

    Ok(WriteRequest { timeseries })
}

fn build_labels(family_name: &str, metric: &Metric) -> Vec<Label> {
    let mut labels = Vec::with_capacity(metric.labels.len() + 1);
    labels.push(Label::new(METRIC_NAME_LABEL, family_name));
    labels.extend(
        metric
            .labels
            .iter()
            .map(|label| Label::new(label.name.as_str(), label.value.as_str())),
    );
    labels
}

type ValueExtractor = fn(&MetricValue) -> Option<f64>;

fn value_extractor(family: &MetricFamily) -> Result<ValueExtractor, ExportError> {
    match family.metric_type {
        MetricType::Counter => Ok(MetricValue::counter),
        MetricType::Gauge => Ok(MetricValue::gauge),
        MetricType::Untyped => Ok(MetricValue::untyped),
        MetricType::Summary => Ok(MetricValue::summary_sum),
        MetricType::Histogram => Ok(MetricValue::histogram_sum),
        metric_type => UnknownMetricType {
            family: family.name.clone(),
            metric_type,
        }
        .fail(),
    }
}
