//! Terminal progress rendering.
//!
//! Consumes [`ProgressEvent`]s from the pipeline and draws an aggregate bar
//! per stage plus one byte bar per in-flight download or upload.

use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc;

use playlist_ingest_core::{ItemStatus, ProgressEvent, Stage};

const AGGREGATE_TEMPLATE: &str = "{prefix:>12.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}";
const BYTES_TEMPLATE: &str =
    "{prefix:>12.dim} [{bar:40}] {bytes}/{total_bytes} {bytes_per_sec} {wide_msg}";
const SPINNER_TEMPLATE: &str = "{prefix:>12.bold} {spinner} {msg}";

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

pub struct ProgressRenderer {
    multi: MultiProgress,
    /// Spinner while listing, aggregate bar while downloading or uploading.
    overall: Option<ProgressBar>,
    /// Byte bars keyed by source id or object key.
    transfers: HashMap<String, ProgressBar>,
    failed: usize,
}

impl ProgressRenderer {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            overall: None,
            transfers: HashMap::new(),
            failed: 0,
        }
    }

    /// Render events until every sender is dropped.
    pub async fn run(mut self, mut rx: mpsc::Receiver<ProgressEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle(event);
        }
        self.finish();
    }

    fn replace_overall(&mut self, bar: ProgressBar) {
        if let Some(previous) = self.overall.take() {
            previous.finish_and_clear();
            self.multi.remove(&previous);
        }
        self.overall = Some(self.multi.add(bar));
    }

    fn aggregate_bar(&mut self, prefix: &'static str, total: usize) {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(style(AGGREGATE_TEMPLATE));
        bar.set_prefix(prefix);
        self.replace_overall(bar);
    }

    fn start_transfer(&mut self, id: String, label: String, total: Option<u64>) {
        let bar = self.multi.add(ProgressBar::new(total.unwrap_or(0)));
        bar.set_style(style(BYTES_TEMPLATE));
        bar.set_prefix("");
        bar.set_message(label);
        if let Some(previous) = self.transfers.insert(id, bar) {
            previous.finish_and_clear();
            self.multi.remove(&previous);
        }
    }

    fn update_transfer(&mut self, id: &str, position: u64, total: Option<u64>) {
        if let Some(bar) = self.transfers.get(id) {
            if let Some(total) = total {
                bar.set_length(total);
            }
            bar.set_position(position);
        }
    }

    fn end_transfer(&mut self, id: &str) {
        if let Some(bar) = self.transfers.remove(id) {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
    }

    pub fn handle(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::StageChanged { to, .. } => match to {
                Stage::Listing => {
                    let spinner = ProgressBar::new_spinner();
                    spinner.set_style(style(SPINNER_TEMPLATE));
                    spinner.set_prefix("Listing");
                    spinner.enable_steady_tick(Duration::from_millis(120));
                    self.replace_overall(spinner);
                }
                Stage::Done => self.finish(),
                Stage::Idle | Stage::Draining | Stage::Uploading => {}
            },
            ProgressEvent::PageFetched { page, items } => {
                if let Some(bar) = &self.overall {
                    bar.set_message(format!("page {}, {} items", page, items));
                }
            }
            ProgressEvent::BatchStarted { total } => {
                self.failed = 0;
                self.aggregate_bar("Downloading", total);
            }
            ProgressEvent::ItemStarted { source_id, name } => {
                self.start_transfer(source_id, name, None);
            }
            ProgressEvent::DownloadProgress {
                source_id,
                downloaded_bytes,
                total_bytes,
            } => self.update_transfer(&source_id, downloaded_bytes, total_bytes),
            ProgressEvent::ItemFinished {
                source_id,
                completed,
                status,
                ..
            } => {
                self.end_transfer(&source_id);
                if status == ItemStatus::Failed {
                    self.failed += 1;
                }
                if let Some(bar) = &self.overall {
                    bar.set_position(completed as u64);
                    if self.failed > 0 {
                        bar.set_message(format!("{} failed", self.failed));
                    }
                }
            }
            ProgressEvent::UploadStarted { total } => self.aggregate_bar("Uploading", total),
            ProgressEvent::UploadFileStarted { key, size_bytes } => {
                self.start_transfer(key.clone(), key, Some(size_bytes));
            }
            ProgressEvent::UploadProgress {
                key,
                sent_bytes,
                total_bytes,
            } => self.update_transfer(&key, sent_bytes, Some(total_bytes)),
            ProgressEvent::UploadFileFinished { key, completed, .. } => {
                self.end_transfer(&key);
                if let Some(bar) = &self.overall {
                    bar.set_position(completed as u64);
                }
            }
        }
    }

    /// Clear every bar.
    pub fn finish(&mut self) {
        for (_, bar) in self.transfers.drain() {
            bar.finish_and_clear();
        }
        if let Some(bar) = self.overall.take() {
            bar.finish_and_clear();
        }
        let _ = self.multi.clear();
    }
}
