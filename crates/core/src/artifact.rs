//! Artifact naming.
//!
//! An artifact's filename is derived only from `(author, title, codec)`. The
//! same name is the skip-if-exists key on disk and the basename of the
//! storage key, so it must stay a pure function.

use std::path::{Path, PathBuf};

use crate::catalog::PlaylistItem;
use crate::downloader::AudioCodec;

/// Replace characters that would split or truncate a path component.
fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect()
}

/// `"<author> - <title>.<ext>"`, always a single path component.
pub fn artifact_file_name(author: &str, title: &str, codec: AudioCodec) -> String {
    format!(
        "{} - {}.{}",
        sanitize_component(author),
        sanitize_component(title),
        codec.extension()
    )
}

/// Location of the artifact for `item` under `target_dir`.
pub fn artifact_path(target_dir: &Path, item: &PlaylistItem, codec: AudioCodec) -> PathBuf {
    target_dir.join(artifact_file_name(&item.author, &item.title, codec))
}
