mod metrics;
mod progress;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use playlist_ingest_core::{
    load_config, validate_config, Config, ErrorLog, IngestionWorker, MediaDownloader,
    PipelineError, PipelineOrchestrator, ProgressHandle, S3ObjectStore, SanitizedConfig,
    StorageUploader, UploadDestination, UploadedObject, WorkerConfig, YoutubeCatalogClient,
    YtDlpDownloader,
};

use progress::ProgressRenderer;

/// Buffer size for the progress event channel
const PROGRESS_BUFFER_SIZE: usize = 1024;

#[derive(Parser, Debug)]
#[command(name = "ingest", version)]
#[command(about = "Download a YouTube playlist as audio files and optionally upload them to S3")]
struct Args {
    /// Playlist to ingest
    #[arg(value_name = "PLAYLIST_ID")]
    playlist_id: String,

    /// Configuration file (defaults to ./ingest.toml when present)
    #[arg(long, short, env = "INGEST_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory for downloaded artifacts
    #[arg(long, value_name = "DIR")]
    target_dir: Option<PathBuf>,

    /// Skip the upload stage even when storage is configured
    #[arg(long, default_value_t = false)]
    no_upload: bool,

    /// Number of downloads to run at once
    #[arg(long, value_name = "N")]
    parallel: Option<usize>,

    /// Write Prometheus metrics to this file when the run ends
    #[arg(long, value_name = "PATH")]
    metrics_file: Option<PathBuf>,

    /// Do not draw progress bars
    #[arg(long, short, default_value_t = false)]
    quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Logs go to stderr so stdout carries only the final report
    let json_layer = args
        .log_json
        .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!args.log_json)
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(json_layer)
        .with(text_layer)
        .init();

    if let Err(e) = run(args).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(dir) = &args.target_dir {
        config.downloader.target_dir = dir.clone();
    }
    if let Some(parallel) = args.parallel {
        config.downloader.max_parallel_downloads = parallel;
    }
    if args.no_upload {
        config.storage = None;
    }
}

async fn run(args: Args) -> Result<()> {
    let started = Instant::now();

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut config, &args);
    validate_config(&config).context("Configuration validation failed")?;
    info!("Configuration: {:?}", SanitizedConfig::from(&config));

    let (progress, renderer) = if args.quiet {
        (ProgressHandle::disabled(), None)
    } else {
        let (handle, rx) = ProgressHandle::channel(PROGRESS_BUFFER_SIZE);
        (handle, Some(tokio::spawn(ProgressRenderer::new().run(rx))))
    };

    let downloader = YtDlpDownloader::from_config(&config.downloader);
    downloader
        .validate()
        .await
        .with_context(|| format!("{} is not usable", config.downloader.ytdlp_path.display()))?;

    let catalog = YoutubeCatalogClient::new(&config.catalog)
        .context("Failed to create catalog client")?
        .with_progress(progress.clone());

    let worker = IngestionWorker::new(
        WorkerConfig::from(&config.downloader),
        downloader,
        ErrorLog::new(),
    );

    let mut pipeline: PipelineOrchestrator<_, _, S3ObjectStore> =
        PipelineOrchestrator::new(catalog, worker);

    if let Some(storage) = config.upload_target() {
        // Credentials are resolved here, before any network activity
        let store = S3ObjectStore::from_config(storage)
            .await
            .context("Failed to set up object storage")?;
        let destination = UploadDestination::new(
            storage.bucket.clone().unwrap_or_default(),
            storage.directory.clone(),
        );
        info!(
            "Uploading to bucket {} under '{}'",
            destination.bucket, destination.directory
        );
        pipeline = pipeline.with_uploader(StorageUploader::new(store), destination);
    } else {
        info!("No storage bucket configured, upload stage disabled");
    }

    let pipeline = pipeline.with_progress(progress);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown signal received, cancelling run");
        trigger.cancel();
    });

    let result = pipeline.run(&args.playlist_id, &cancel).await;
    let errors = pipeline.errors().entries().await;

    // Dropping the pipeline closes the progress channel
    drop(pipeline);
    if let Some(renderer) = renderer {
        let _ = renderer.await;
    }

    metrics::record_run(started.elapsed().as_secs_f64(), result.is_ok());
    if let Some(path) = &args.metrics_file {
        metrics::write_metrics_file(path)?;
        info!("Metrics written to {}", path.display());
    }

    match result {
        Ok(report) => {
            print_artifacts(&report.artifacts);
            print_uploaded(&report.uploaded);
            print_errors(&errors);
            Ok(())
        }
        Err(e) => {
            if let PipelineError::Upload { uploaded, .. } = &e {
                print_uploaded(uploaded);
            }
            print_errors(&errors);
            Err(e).context("Pipeline run failed")
        }
    }
}

fn print_artifacts(artifacts: &[PathBuf]) {
    println!("Downloaded {} files:", artifacts.len());
    for path in artifacts {
        println!("  {}", path.display());
    }
}

fn print_uploaded(uploaded: &[UploadedObject]) {
    if uploaded.is_empty() {
        return;
    }
    println!("Uploaded {} objects:", uploaded.len());
    for object in uploaded {
        println!("  {} ({} bytes)", object.key, object.size_bytes);
    }
}

fn print_errors(errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    println!("{} errors:", errors.len());
    for (i, message) in errors.iter().enumerate() {
        println!("  {}. {}", i + 1, message);
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
