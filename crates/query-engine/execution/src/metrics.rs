//! Metrics setup and update for query execution.

use prometheus::core::{AtomicU64, GenericCounter};
use prometheus::{HistogramOpts, HistogramTimer, HistogramVec};

#[derive(Debug, Clone)]
pub struct Metrics {
    pub query_total: GenericCounter<AtomicU64>,
    pub count_total: GenericCounter<AtomicU64>,
    pub error_total: GenericCounter<AtomicU64>,
    phase_seconds: HistogramVec,
}

/// The stages of a request that are timed separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Build,
    Execute,
    Materialize,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Build => "build",
            Phase::Execute => "execute",
            Phase::Materialize => "materialize",
        }
    }
}

impl Metrics {
    /// Start timing a phase. The time is recorded when the timer is dropped.
    pub fn time_phase(&self, phase: Phase) -> HistogramTimer {
        self.phase_seconds
            .with_label_values(&[phase.label()])
            .start_timer()
    }

    /// How many times a phase has been timed.
    pub fn phase_count(&self, phase: Phase) -> u64 {
        self.phase_seconds
            .with_label_values(&[phase.label()])
            .get_sample_count()
    }
}

/// Create a new int counter metric and register it with the provided Prometheus Registry
fn add_int_counter_metric(
    metrics_registry: &mut prometheus::Registry,
    metric_name: &str,
    metric_description: &str,
) -> Result<GenericCounter<AtomicU64>, prometheus::Error> {
    let int_counter =
        prometheus::IntCounter::with_opts(prometheus::Opts::new(metric_name, metric_description))?;
    metrics_registry.register(Box::new(int_counter.clone()))?;
    Ok(int_counter)
}

/// Setup counters and histograms used to produce Prometheus metrics
pub fn initialise_metrics(
    metrics_registry: &mut prometheus::Registry,
) -> Result<Metrics, prometheus::Error> {
    let query_total = add_int_counter_metric(
        metrics_registry,
        "tsql_graph_query_total",
        "Total successful queries.",
    )?;

    let count_total = add_int_counter_metric(
        metrics_registry,
        "tsql_graph_count_total",
        "Total successful count queries.",
    )?;

    let error_total = add_int_counter_metric(
        metrics_registry,
        "tsql_graph_error_total",
        "Total queries that failed to execute or to build their objects.",
    )?;

    let phase_seconds = HistogramVec::new(
        HistogramOpts::new(
            "tsql_graph_query_phase_seconds",
            "Time spent in each phase of a query, in seconds.",
        ),
        &["phase"],
    )?;
    metrics_registry.register(Box::new(phase_seconds.clone()))?;

    Ok(Metrics {
        query_total,
        count_total,
        error_total,
        phase_seconds,
    })
}
