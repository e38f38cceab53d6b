//! Types for the downloader module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Target audio codec for extracted tracks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCodec {
    /// MPEG Audio Layer III
    #[default]
    Mp3,
    /// AAC in an MPEG-4 container
    M4a,
    /// Opus
    Opus,
    /// Ogg Vorbis
    Vorbis,
    /// Free Lossless Audio Codec (lossless)
    Flac,
    /// WAVE (uncompressed)
    Wav,
}

impl AudioCodec {
    /// Returns the file extension for this codec.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::Opus => "opus",
            Self::Vorbis => "ogg",
            Self::Flac => "flac",
            Self::Wav => "wav",
        }
    }

    /// Returns the `--audio-format` value understood by yt-dlp.
    pub fn ytdlp_format(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::Opus => "opus",
            Self::Vorbis => "vorbis",
            Self::Flac => "flac",
            Self::Wav => "wav",
        }
    }

    /// Returns the MIME type used when storing the artifact.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::M4a => "audio/mp4",
            Self::Opus => "audio/opus",
            Self::Vorbis => "audio/ogg",
            Self::Flac => "audio/flac",
            Self::Wav => "audio/wav",
        }
    }

    /// Looks up a codec by artifact file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp3" => Some(Self::Mp3),
            "m4a" => Some(Self::M4a),
            "opus" => Some(Self::Opus),
            "ogg" => Some(Self::Vorbis),
            "flac" => Some(Self::Flac),
            "wav" => Some(Self::Wav),
            _ => None,
        }
    }
}

/// A single download+transcode request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Catalog identity of the item.
    pub source_id: String,
    /// URL handed to the downloader.
    pub source_url: String,
    /// Where the finished audio file must end up (extension included).
    pub output_path: PathBuf,
}

/// Byte-level progress of a running download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadProgress {
    pub source_id: String,
    pub downloaded_bytes: u64,
    /// Exact or estimated size, when the source reports one.
    pub total_bytes: Option<u64>,
}

/// Result of a successful download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub source_id: String,
    pub output_path: PathBuf,
    pub size_bytes: u64,
    pub duration_ms: u64,
}
