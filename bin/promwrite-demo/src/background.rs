//! Simulated periodic background task.
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};
use tokio::time::{interval, sleep};
use tracing::debug;

const RUNS_TOTAL: &str = "sample_background_task_runs_total";
const FAILURES_TOTAL: &str = "sample_background_task_failures_total";
const LAST_RUN_TIMESTAMP: &str = "sample_background_task_last_run_timestamp_seconds";
const LAST_SUCCESS_TIMESTAMP: &str = "sample_background_task_last_success_timestamp_seconds";

const RUN_INTERVAL: Duration = Duration::from_secs(5);
const FAILURE_PROBABILITY: f64 = 0.3;

/// Runs the background task forever, once every five seconds.
///
/// Each run takes a random amount of time and fails with a fixed probability, and is tracked with run and failure
/// counters along with the timestamps of the last run and the last successful run.
pub async fn run_periodic_task() {
    describe_counter!(RUNS_TOTAL, "The total number of background task runs.");
    describe_counter!(FAILURES_TOTAL, "The total number of background task failures.");
    describe_gauge!(
        LAST_RUN_TIMESTAMP,
        Unit::Seconds,
        "The Unix timestamp in seconds of the last background task run, successful or not."
    );
    describe_gauge!(
        LAST_SUCCESS_TIMESTAMP,
        Unit::Seconds,
        "The Unix timestamp in seconds of the last successful background task run."
    );

    let mut ticker = interval(RUN_INTERVAL);
    loop {
        ticker.tick().await;

        // Simulates the work the task needs to do.
        let work = Duration::from_secs(1) + Duration::from_millis((rand::random::<f64>() * 500.0) as u64);
        sleep(work).await;

        let succeeded = rand::random::<f64>() > FAILURE_PROBABILITY;
        record_run(succeeded, unix_timestamp_secs());
        debug!(succeeded, "Background task run completed.");
    }
}

// Both gauges get the exact same timestamp on success, so the last run can be checked for success by comparing them.
fn record_run(succeeded: bool, timestamp_secs: f64) {
    if succeeded {
        gauge!(LAST_SUCCESS_TIMESTAMP).set(timestamp_secs);
    } else {
        counter!(FAILURES_TOTAL).increment(1);
    }
    counter!(RUNS_TOTAL).increment(1);
    gauge!(LAST_RUN_TIMESTAMP).set(timestamp_secs);
}

fn unix_timestamp_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
