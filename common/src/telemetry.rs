// Telemetry: structured logging, the per-instance log context, and query metrics

use crate::config::ObservabilityConfig;
use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::Span;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Keeps the background log writer alive.
///
/// Dropping the guard flushes and stops the file writer, so the caller that
/// installed logging owns its lifetime.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the process-wide tracing subscriber.
///
/// Console output is always enabled (JSON when `config.json` is set). When
/// `config.log_dir` is present, a plain-text copy is appended to
/// `<log_dir>/<log_file>` through a non-blocking writer.
pub fn init_logging(config: &ObservabilityConfig) -> Result<LoggingGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let (layers, guard) = build_layers(config)?;

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(
        log_level = %config.log_level,
        log_dir = ?config.log_dir,
        json = config.json,
        "Logging initialized"
    );

    Ok(guard)
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Console layer plus, when `log_dir` is set, the non-blocking file layer
fn build_layers(config: &ObservabilityConfig) -> Result<(Vec<BoxedLayer>, LoggingGuard)> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console = if config.json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };
    layers.push(console);

    let mut file_guard = None;
    if let Some(dir) = &config.log_dir {
        std::fs::create_dir_all(dir)?;
        let appender = tracing_appender::rolling::never(dir, &config.log_file);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .with_ansi(false)
                .with_thread_ids(true)
                .with_writer(writer)
                .boxed(),
        );
        file_guard = Some(guard);
    }

    Ok((
        layers,
        LoggingGuard {
            _file_guard: file_guard,
        },
    ))
}

/// Logging context handed to a [`crate::db::Database`] at construction.
///
/// Every event the data layer emits is recorded under this span, so callers
/// decide how database activity is labelled and filtered.
#[derive(Debug, Clone)]
pub struct LogContext {
    span: Span,
}

impl LogContext {
    pub fn new(component: &str) -> Self {
        Self {
            span: tracing::info_span!("db", component = component),
        }
    }

    /// Nest data-layer events under an existing span
    pub fn from_span(span: Span) -> Self {
        Self { span }
    }

    /// Context whose span records nothing
    pub fn disabled() -> Self {
        Self { span: Span::none() }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Default for LogContext {
    fn default() -> Self {
        Self::new("msql")
    }
}

/// Install the Prometheus exporter and describe the data-layer metrics
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!("db_query_attempts_total", "Query attempts, including retries");
    describe_counter!("db_query_failures_total", "Failed query attempts by reason");
    describe_counter!("db_query_timeouts_total", "Query attempts abandoned on timeout");
    describe_histogram!(
        "db_query_duration_seconds",
        "Duration of successful query attempts in seconds"
    );

    tracing::info!(metrics_port = metrics_port, "Prometheus metrics exporter initialized");

    Ok(())
}

#[inline]
pub fn record_query_attempt(kind: &'static str) {
    counter!("db_query_attempts_total", "kind" => kind).increment(1);
}

#[inline]
pub fn record_query_failure(kind: &'static str, reason: &'static str) {
    counter!("db_query_failures_total", "kind" => kind, "reason" => reason).increment(1);
}

#[inline]
pub fn record_query_timeout(kind: &'static str) {
    counter!("db_query_timeouts_total", "kind" => kind).increment(1);
}

#[inline]
pub fn record_query_duration(kind: &'static str, duration_seconds: f64) {
    histogram!("db_query_duration_seconds", "kind" => kind).record(duration_seconds);
}
