//! Periodic export of metric snapshots.
use std::{convert::Infallible, time::Duration};

use snafu::ResultExt as _;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::{
    client::RemoteWriteClient,
    codec::encode_and_compress,
    config::{ConfigurationError, RemoteWriteConfiguration},
    error::{ExportError, Gather},
    series::{build_write_request, current_timestamp_ms},
    snapshot::Gatherer,
};

/// Periodically exports metric snapshots to a remote write endpoint.
///
/// Each iteration gathers a fresh snapshot, converts it into time series stamped with the current time, encodes and
/// compresses it, and sends it to the remote endpoint. Iterations run one at a time on a fixed interval.
pub struct RemoteWriter<G> {
    gatherer: G,
    client: RemoteWriteClient,
    interval: Duration,
}

impl<G> RemoteWriter<G>
where
    G: Gatherer,
{
    /// Creates a new `RemoteWriter`.
    pub fn new(gatherer: G, client: RemoteWriteClient, interval: Duration) -> Self {
        Self {
            gatherer,
            client,
            interval,
        }
    }

    /// Creates a new `RemoteWriter` from the given configuration.
    ///
    /// # Errors
    ///
    /// If the remote write client can't be created from the configuration, an error will be returned.
    pub fn from_configuration(gatherer: G, config: &RemoteWriteConfiguration) -> Result<Self, ConfigurationError> {
        let client = RemoteWriteClient::new(&config.remote_write_url, config.request_timeout())?;
        Ok(Self::new(gatherer, client, config.flush_interval()))
    }

    /// Gathers, converts, and sends a single snapshot.
    ///
    /// Returns the number of time series that were sent.
    ///
    /// # Errors
    ///
    /// If any stage of the export fails, an error will be returned. Nothing is sent unless every stage before
    /// delivery succeeded.
    pub async fn run_once(&self) -> Result<usize, ExportError> {
        let families = self.gatherer.gather().context(Gather)?;

        let timestamp_ms = current_timestamp_ms();
        let request = build_write_request(&families, timestamp_ms)?;
        let series = request.timeseries.len();

        let payload = encode_and_compress(&request)?;
        debug!(series, payload_len = payload.len(), "Encoded write request.");

        self.client.send(payload).await?;
        info!(series, "Data written successfully to remote storage.");

        Ok(series)
    }

    /// Runs the writer until an export fails.
    ///
    /// The first export happens one full interval after this is called. If an export takes longer than the interval,
    /// the next one starts as soon as it completes, and then the schedule resumes from there: missed ticks are not
    /// made up for.
    ///
    /// # Errors
    ///
    /// The first export error stops the writer and is returned, after being logged.
    pub async fn run(&self) -> Result<Infallible, ExportError> {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(endpoint = %self.client.endpoint(), interval = ?self.interval, "Remote writer started.");

        loop {
            ticker.tick().await;

            if let Err(e) = self.run_once().await {
                error!(kind = e.kind(), error = %e, "Failed to write metrics to remote storage. Stopping.");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::{
        series::METRIC_NAME_LABEL,
        snapshot::{GatherError, Metric, MetricFamily, MetricType, MetricValue},
        test_util::{gauge_family, TestEndpoint},
    };

    fn writer<G: Gatherer>(gatherer: G, endpoint: &TestEndpoint, interval: Duration) -> RemoteWriter<G> {
        let client = RemoteWriteClient::new(&endpoint.url(), None).unwrap();
        RemoteWriter::new(gatherer, client, interval)
    }

    fn up() -> Result<Vec<MetricFamily>, GatherError> {
        Ok(vec![gauge_family("up", 1.0)])
    }

    #[tokio::test]
    async fn run_once_delivers_snapshot() {
        let endpoint = TestEndpoint::spawn(StatusCode::OK).await;
        let gatherer = || -> Result<Vec<MetricFamily>, GatherError> {
            Ok(vec![
                gauge_family("up", 1.0),
                MetricFamily::new("jobs_total", MetricType::Counter)
                    .with_metric(Metric::new(MetricValue::Counter { value: 3.0 }).with_label("queue", "a"))
                    .with_metric(Metric::new(MetricValue::Counter { value: 4.0 }).with_label("queue", "b")),
            ])
        };
        let writer = writer(gatherer, &endpoint, Duration::from_secs(5));

        let series = writer.run_once().await.unwrap();
        assert_eq!(series, 3);

        let requests = endpoint.requests();
        assert_eq!(requests.len(), 1);

        let request = requests[0].write_request();
        assert_eq!(request.timeseries.len(), 3);

        let timestamp = request.timeseries[0].samples[0].timestamp;
        assert!(timestamp > 0);
        for series in &request.timeseries {
            assert_eq!(series.labels[0].name, METRIC_NAME_LABEL);
            assert_eq!(series.samples.len(), 1);
            assert_eq!(series.samples[0].timestamp, timestamp);
        }

        let values = request
            .timeseries
            .iter()
            .map(|series| series.samples[0].value)
            .collect::<Vec<_>>();
        assert_eq!(values, vec![1.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn unknown_metric_type_is_never_sent() {
        let endpoint = TestEndpoint::spawn(StatusCode::OK).await;
        let gatherer = || -> Result<Vec<MetricFamily>, GatherError> {
            Ok(vec![MetricFamily::new("odd", MetricType::GaugeHistogram).with_metric(
                Metric::new(MetricValue::Histogram {
                    sample_count: 1,
                    sample_sum: 2.0,
                }),
            )])
        };
        let writer = writer(gatherer, &endpoint, Duration::from_millis(50));

        let result = tokio::time::timeout(Duration::from_secs(5), writer.run()).await.unwrap();
        assert!(matches!(result, Err(ExportError::UnknownMetricType { .. })));
        assert_eq!(endpoint.requests().len(), 0);
    }

    #[tokio::test]
    async fn rejected_delivery_stops_the_writer() {
        let endpoint = TestEndpoint::spawn(StatusCode::SERVICE_UNAVAILABLE).await;
        let writer = writer(up, &endpoint, Duration::from_millis(50));

        let result = tokio::time::timeout(Duration::from_secs(5), writer.run()).await.unwrap();
        match result {
            Err(ExportError::DeliveryRejected { status, .. }) => assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE),
            other => panic!("expected delivery rejected error, got {:?}", other),
        }

        assert_eq!(endpoint.requests().len(), 1);
    }

    #[tokio::test]
    async fn gather_failure_stops_the_writer() {
        let endpoint = TestEndpoint::spawn(StatusCode::OK).await;
        let gatherer = || -> Result<Vec<MetricFamily>, GatherError> { Err("registry unavailable".into()) };
        let writer = writer(gatherer, &endpoint, Duration::from_millis(50));

        let result = tokio::time::timeout(Duration::from_secs(5), writer.run()).await.unwrap();
        assert!(matches!(result, Err(ExportError::Gather { .. })));
        assert_eq!(endpoint.requests().len(), 0);
    }

    #[tokio::test]
    async fn first_export_waits_one_interval() {
        let endpoint = TestEndpoint::spawn(StatusCode::OK).await;
        let writer = writer(up, &endpoint, Duration::from_secs(1));

        let result = tokio::time::timeout(Duration::from_millis(200), writer.run()).await;
        assert!(result.is_err());
        assert_eq!(endpoint.requests().len(), 0);
    }

    #[tokio::test]
    async fn slow_deliveries_never_overlap() {
        let endpoint = TestEndpoint::spawn_with_delay(StatusCode::OK, Duration::from_millis(300)).await;
        let writer = writer(up, &endpoint, Duration::from_millis(100));

        // The writer only stops on error, so bound it and check what happened in the meantime.
        let result = tokio::time::timeout(Duration::from_millis(1500), writer.run()).await;
        assert!(result.is_err());

        assert!(endpoint.requests().len() >= 2);
        assert_eq!(endpoint.max_in_flight(), 1);
    }
}
