//! Prometheus metrics export.
//!
//! The pipeline's counters live in `playlist_ingest_core::metrics`; this
//! module registers them alongside per-run gauges and writes the text
//! exposition to a file for a node-exporter textfile collector.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use prometheus::{self, Encoder, Gauge, IntGauge, Registry, TextEncoder};
use tracing::warn;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Wall-clock duration of the last run in seconds.
pub static RUN_DURATION_SECONDS: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new(
        "ingest_run_duration_seconds",
        "Wall-clock duration of the last run in seconds",
    )
    .unwrap()
});

/// Unix time at which the last run finished.
pub static LAST_RUN_TIMESTAMP_SECONDS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "ingest_last_run_timestamp_seconds",
        "Unix time at which the last run finished",
    )
    .unwrap()
});

/// 1 if the last run succeeded, 0 otherwise.
pub static LAST_RUN_SUCCESS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("ingest_last_run_success", "Whether the last run succeeded").unwrap()
});

fn register_metrics(registry: &Registry) {
    let mut collectors = playlist_ingest_core::metrics::all_metrics();
    collectors.push(Box::new(RUN_DURATION_SECONDS.clone()));
    collectors.push(Box::new(LAST_RUN_TIMESTAMP_SECONDS.clone()));
    collectors.push(Box::new(LAST_RUN_SUCCESS.clone()));

    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            warn!("Failed to register metric: {}", e);
        }
    }
}

/// Record the outcome of a run.
pub fn record_run(duration_secs: f64, success: bool) {
    RUN_DURATION_SECONDS.set(duration_secs);
    LAST_RUN_SUCCESS.set(success as i64);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default();
    LAST_RUN_TIMESTAMP_SECONDS.set(now);
}

/// Encode all metrics in Prometheus text format.
pub fn encode_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics are not valid UTF-8")
}

/// Write the exposition to `path`, replacing it atomically.
pub fn write_metrics_file(path: &Path) -> Result<()> {
    let contents = encode_metrics()?;
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, contents)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move metrics into {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_encode_includes_core_and_run_metrics() {
        playlist_ingest_core::metrics::CATALOG_PAGES.inc();
        record_run(1.5, true);

        let text = encode_metrics().unwrap();
        assert!(text.contains("ingest_catalog_pages_total"));
        assert!(text.contains("ingest_run_duration_seconds 1.5"));
        assert!(text.contains("ingest_last_run_success 1"));
    }

    #[test]
    fn test_write_metrics_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ingest.prom");

        write_metrics_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("# TYPE ingest_last_run_success gauge"));
        assert!(!temp.path().join("ingest.prom.tmp").exists());
    }
}
