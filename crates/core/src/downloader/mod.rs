//! Media download and audio extraction.
//!
//! The [`MediaDownloader`] trait abstracts the external tool that turns a
//! source URL into a local audio file. [`YtDlpDownloader`] drives the
//! `yt-dlp` binary (which in turn uses ffmpeg for extraction).
//!
//! # Example
//!
//! ```ignore
//! use playlist_ingest_core::downloader::{DownloadRequest, MediaDownloader, YtDlpDownloader};
//!
//! let downloader = YtDlpDownloader::from_config(&config.downloader);
//! downloader.validate().await?;
//!
//! let result = downloader
//!     .download(
//!         DownloadRequest {
//!             source_id: "dQw4w9WgXcQ".to_string(),
//!             source_url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
//!             output_path: PathBuf::from("/tmp/staging/Rick Astley - Never Gonna Give You Up.mp3"),
//!         },
//!         None,
//!     )
//!     .await?;
//! println!("Downloaded {} bytes in {} ms", result.size_bytes, result.duration_ms);
//! ```

mod error;
mod traits;
mod types;
mod ytdlp;

pub use error::DownloaderError;
pub use traits::MediaDownloader;
pub use types::{AudioCodec, DownloadProgress, DownloadRequest, DownloadResult};
pub use ytdlp::YtDlpDownloader;
