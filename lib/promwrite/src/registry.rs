//! In-process metrics registry.
//!
//! [`MetricsRegistry`] is a [`Recorder`] for the `metrics` facade, so application code can emit metrics with the usual
//! `counter!`/`gauge!`/`histogram!` macros, and a [`Gatherer`] that turns the current state of those metrics into a
//! snapshot for export.
use std::{
    collections::{BTreeMap, HashMap},
    sync::{atomic::Ordering, Arc, Mutex},
};

use metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Label, Metadata, Recorder, SetRecorderError, SharedString, Unit,
};
use metrics_util::registry::{AtomicStorage, Registry};
use tracing::debug;

use crate::snapshot::{GatherError, Gatherer, LabelPair, Metric, MetricFamily, MetricType, MetricValue};

#[derive(Default)]
struct HistogramTotals {
    count: u64,
    sum: f64,
}

struct State {
    registry: Registry<Key, AtomicStorage>,
    descriptions: Mutex<HashMap<String, String>>,
    histogram_totals: Mutex<HashMap<Key, HistogramTotals>>,
    prefix: Option<String>,
}

/// A metrics registry that can be gathered from.
///
/// Metric names are normalized into valid Prometheus metric names when they are registered: periods become a pair of
/// underscores, and any other invalid character becomes a single underscore. If a prefix is configured, it's prepended
/// to every name, separated by an underscore. Label names are normalized too, and reserved names such as `__name__` are
/// prefixed with `exported`, so a gathered metric never carries a label the remote endpoint would reject. Labels are
/// kept sorted by name.
///
/// Counters and gauges are exported as their current value. Histograms are exported with a running count and sum of
/// every observation recorded since the registry was created: raw samples are folded into those totals each time the
/// registry is gathered.
#[derive(Clone)]
pub struct MetricsRegistry {
    state: Arc<State>,
}

impl MetricsRegistry {
    /// Creates a new, empty `MetricsRegistry`.
    pub fn new() -> Self {
        Self::with_prefix(None::<String>)
    }

    /// Creates a new, empty `MetricsRegistry` that prefixes every metric name with `prefix`.
    pub fn with_prefix<P>(prefix: P) -> Self
    where
        P: Into<Option<String>>,
    {
        let prefix = prefix
            .into()
            .filter(|prefix| !prefix.is_empty())
            .map(|prefix| normalize_metric_name(&prefix));

        Self {
            state: Arc::new(State {
                registry: Registry::new(AtomicStorage),
                descriptions: Mutex::new(HashMap::new()),
                histogram_totals: Mutex::new(HashMap::new()),
                prefix,
            }),
        }
    }

    /// Installs this registry as the global recorder for the `metrics` facade.
    ///
    /// # Errors
    ///
    /// If a global recorder was already installed, an error will be returned.
    pub fn install(&self) -> Result<(), SetRecorderError<Self>> {
        metrics::set_global_recorder(self.clone())?;
        debug!(prefix = ?self.state.prefix, "Installed global metrics recorder.");

        Ok(())
    }

    fn metric_name(&self, name: &str) -> String {
        let name = normalize_metric_name(name);
        match &self.state.prefix {
            Some(prefix) => format!("{}_{}", prefix, name),
            None => name,
        }
    }

    fn normalize_key(&self, key: &Key) -> Key {
        let mut labels = key
            .labels()
            .map(|label| Label::new(normalize_label_name(label.key()), label.value().to_string()))
            .collect::<Vec<_>>();

        // Keys that only differ in label order, or in names that normalize to the same thing, share one metric. When
        // two labels end up with the same name, the first one wins.
        labels.sort_by(|a, b| a.key().cmp(b.key()));
        labels.dedup_by(|a, b| a.key() == b.key());

        Key::from_parts(self.metric_name(key.name()), labels)
    }

    fn describe(&self, key: KeyName, description: SharedString) {
        let name = self.metric_name(key.as_str());
        if let Ok(mut descriptions) = self.state.descriptions.lock() {
            descriptions.insert(name, String::from(&*description));
        }
    }
}

impl Recorder for MetricsRegistry {
    fn describe_counter(&self, key: KeyName, _: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn describe_gauge(&self, key: KeyName, _: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn describe_histogram(&self, key: KeyName, _: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        self.state
            .registry
            .get_or_create_counter(&self.normalize_key(key), |c| c.clone().into())
    }

    fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
        self.state
            .registry
            .get_or_create_gauge(&self.normalize_key(key), |g| g.clone().into())
    }

    fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
        self.state
            .registry
            .get_or_create_histogram(&self.normalize_key(key), |h| h.clone().into())
    }
}

impl Gatherer for MetricsRegistry {
    fn gather(&self) -> Result<Vec<MetricFamily>, GatherError> {
        let mut families = BTreeMap::new();

        for (key, counter) in self.state.registry.get_counter_handles() {
            let value = counter.load(Ordering::Relaxed) as f64;
            add_metric(&mut families, key, MetricType::Counter, MetricValue::Counter { value })?;
        }

        for (key, gauge) in self.state.registry.get_gauge_handles() {
            let value = f64::from_bits(gauge.load(Ordering::Relaxed));
            add_metric(&mut families, key, MetricType::Gauge, MetricValue::Gauge { value })?;
        }

        {
            let mut histogram_totals = self
                .state
                .histogram_totals
                .lock()
                .map_err(|_| "histogram totals lock poisoned")?;

            for (key, histogram) in self.state.registry.get_histogram_handles() {
                let totals = histogram_totals.entry(key.clone()).or_default();
                histogram.clear_with(|samples| {
                    totals.count += samples.len() as u64;
                    totals.sum += samples.iter().sum::<f64>();
                });

                let value = MetricValue::Histogram {
                    sample_count: totals.count,
                    sample_sum: totals.sum,
                };
                add_metric(&mut families, key, MetricType::Histogram, value)?;
            }
        }

        let descriptions = self.state.descriptions.lock().map_err(|_| "descriptions lock poisoned")?;

        let families = families
            .into_values()
            .map(|mut family| {
                family.metrics.sort_by(|a, b| a.labels.cmp(&b.labels));
                if let Some(help) = descriptions.get(&family.name) {
                    family.help.clone_from(help);
                }
                family
            })
            .collect();

        Ok(families)
    }
}

fn add_metric(
    families: &mut BTreeMap<String, MetricFamily>, key: Key, metric_type: MetricType, value: MetricValue,
) -> Result<(), GatherError> {
    let (name, labels) = key.into_parts();
    let name = name.as_str();

    let family = families
        .entry(name.to_string())
        .or_insert_with(|| MetricFamily::new(name, metric_type));
    if family.metric_type != metric_type {
        return Err(format!(
            "metric '{}' is registered as both a {} and a {}",
            name, family.metric_type, metric_type
        )
        .into());
    }

    family.metrics.push(Metric {
        labels: labels
            .into_iter()
            .map(|label| LabelPair::new(label.key(), label.value()))
            .collect(),
        value,
    });

    Ok(())
}

/// Normalizes `name` into a valid Prometheus metric name.
///
/// Valid names match `[a-zA-Z_:][a-zA-Z0-9_:]*`. Periods are replaced with two underscores, so that dotted names can
/// still be told apart from names that already used underscores, and every other invalid character is replaced with a
/// single underscore.
pub fn normalize_metric_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());

    for (i, c) in name.chars().enumerate() {
        if i == 0 && is_valid_name_start_char(c) || i != 0 && is_valid_name_char(c) {
            normalized.push(c);
        } else {
            normalized.push_str(if c == '.' { "__" } else { "_" });
        }
    }

    normalized
}

/// Normalizes `name` into a valid, non-reserved Prometheus label name.
///
/// Valid names match `[a-zA-Z_][a-zA-Z0-9_]*`, and every invalid character is replaced with an underscore. Names
/// starting with `__` are reserved, `__name__` included, so they get an `exported` prefix.
pub fn normalize_label_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len() + 8);

    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_alphabetic() || c == '_' || i != 0 && c.is_ascii_digit() {
            normalized.push(c);
        } else {
            normalized.push('_');
        }
    }

    if normalized.is_empty() {
        normalized.push('_');
    }

    if normalized.starts_with("__") {
        normalized.insert_str(0, "exported");
    }

    normalized
}

#[inline]
fn is_valid_name_start_char(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == ':'
}

#[inline]
fn is_valid_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}
