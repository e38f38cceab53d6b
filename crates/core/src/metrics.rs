//! Prometheus metrics for the ingestion pipeline.
//!
//! This module provides metrics for:
//! - Catalog enumeration (pages fetched, server-reported errors)
//! - Downloads (items by outcome, download duration)
//! - Uploads (objects by result, bytes sent)
//! - Pipeline runs

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Catalog
// =============================================================================

/// Catalog pages fetched.
pub static CATALOG_PAGES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "ingest_catalog_pages_total",
        "Total playlist pages fetched from the catalog",
    )
    .unwrap()
});

/// Catalog errors by kind.
pub static CATALOG_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ingest_catalog_errors_total", "Total catalog errors"),
        &["kind"], // "api", "http", "malformed", "skipped_entry"
    )
    .unwrap()
});

/// Playlist items enumerated.
pub static CATALOG_ITEMS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "ingest_catalog_items_total",
        "Total playlist items enumerated",
    )
    .unwrap()
});

// =============================================================================
// Downloads
// =============================================================================

/// Work items processed by outcome.
pub static ITEMS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ingest_items_processed_total", "Total work items processed"),
        &["outcome"], // "completed", "skipped", "failed", "cancelled"
    )
    .unwrap()
});

/// Download+transcode duration in seconds.
pub static DOWNLOAD_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "ingest_download_duration_seconds",
            "Duration of a single download and transcode",
        )
        .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
        &["result"],
    )
    .unwrap()
});

// =============================================================================
// Uploads
// =============================================================================

/// Object uploads by result.
pub static UPLOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ingest_uploads_total", "Total object uploads"),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Bytes uploaded to object storage.
pub static UPLOADED_BYTES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("ingest_uploaded_bytes_total", "Total bytes uploaded").unwrap()
});

// =============================================================================
// Pipeline
// =============================================================================

/// Pipeline runs by result.
pub static PIPELINE_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ingest_pipeline_runs_total", "Total pipeline runs"),
        &["result"], // "done", "catalog_failed", "upload_failed", "cancelled"
    )
    .unwrap()
});

/// All core metrics, for registration with a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Catalog
        Box::new(CATALOG_PAGES.clone()),
        Box::new(CATALOG_ERRORS.clone()),
        Box::new(CATALOG_ITEMS.clone()),
        // Downloads
        Box::new(ITEMS_PROCESSED.clone()),
        Box::new(DOWNLOAD_DURATION.clone()),
        // Uploads
        Box::new(UPLOADS_TOTAL.clone()),
        Box::new(UPLOADED_BYTES.clone()),
        // Pipeline
        Box::new(PIPELINE_RUNS.clone()),
    ]
}
