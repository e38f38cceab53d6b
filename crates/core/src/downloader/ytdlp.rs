//! yt-dlp based downloader implementation.

use async_trait::async_trait;
use regex_lite::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::error::DownloaderError;
use super::traits::MediaDownloader;
use super::types::{AudioCodec, DownloadProgress, DownloadRequest, DownloadResult};
use crate::config::DownloaderConfig;

/// Marker prefixed to the progress lines we ask yt-dlp to print.
const PROGRESS_MARKER: &str = "[ingest]";

/// Stderr lines kept for error reporting.
const MAX_STDERR_LINES: usize = 20;

/// yt-dlp based downloader.
pub struct YtDlpDownloader {
    ytdlp_path: PathBuf,
    codec: AudioCodec,
    audio_quality: String,
    timeout_secs: u64,
}

impl YtDlpDownloader {
    /// Creates a downloader from the `[downloader]` config section.
    pub fn from_config(config: &DownloaderConfig) -> Self {
        Self {
            ytdlp_path: config.ytdlp_path.clone(),
            codec: config.codec,
            audio_quality: config.audio_quality.clone(),
            timeout_secs: config.timeout_secs,
        }
    }

    /// Creates a downloader with default settings.
    pub fn with_defaults() -> Self {
        Self::from_config(&DownloaderConfig::default())
    }

    /// Builds yt-dlp arguments for one request.
    ///
    /// yt-dlp picks the extension itself, so the output template replaces the
    /// extension of `output_path` with `%(ext)s`; after extraction the file
    /// lands exactly on `output_path`.
    fn build_args(&self, request: &DownloadRequest) -> Vec<String> {
        let template = output_template(&request.output_path);

        vec![
            "--quiet".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            format!(
                "download:{} %(progress.downloaded_bytes)s/%(progress.total_bytes)s/%(progress.total_bytes_estimate)s",
                PROGRESS_MARKER
            ),
            "-f".to_string(),
            "bestaudio/best".to_string(),
            "-x".to_string(),
            "--audio-format".to_string(),
            self.codec.ytdlp_format().to_string(),
            "--audio-quality".to_string(),
            self.audio_quality.clone(),
            "-o".to_string(),
            template,
            request.source_url.clone(),
        ]
    }

    fn spawn_error(&self, e: std::io::Error) -> DownloaderError {
        if e.kind() == std::io::ErrorKind::NotFound {
            DownloaderError::BinaryNotFound {
                path: self.ytdlp_path.clone(),
            }
        } else {
            DownloaderError::Io(e)
        }
    }

    /// Runs yt-dlp with optional progress reporting.
    async fn run_download(
        &self,
        request: &DownloadRequest,
        progress_tx: Option<mpsc::Sender<DownloadProgress>>,
    ) -> Result<DownloadResult, DownloaderError> {
        let start = Instant::now();

        if let Some(parent) = request.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args = self.build_args(request);
        debug!(
            "Running {} for {}",
            self.ytdlp_path.display(),
            request.source_id
        );

        let mut child = Command::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child.stdout.take().expect("stdout should be captured");
        let stderr = child.stderr.take().expect("stderr should be captured");
        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();

        let progress_regex = progress_regex();

        let timeout_duration = Duration::from_secs(self.timeout_secs);
        let result = timeout(timeout_duration, async {
            let mut stdout_done = false;
            let mut stderr_done = false;
            let mut error_lines: Vec<String> = Vec::new();
            let mut stderr_tail: Vec<String> = Vec::new();

            // Progress may arrive on either stream depending on quiet mode.
            while !(stdout_done && stderr_done) {
                let (line, from_stderr) = tokio::select! {
                    line = stdout_lines.next_line(), if !stdout_done => (line, false),
                    line = stderr_lines.next_line(), if !stderr_done => (line, true),
                };

                let line = match line {
                    Ok(Some(line)) => line,
                    _ => {
                        if from_stderr {
                            stderr_done = true;
                        } else {
                            stdout_done = true;
                        }
                        continue;
                    }
                };

                if let Some((downloaded_bytes, total_bytes)) =
                    parse_progress_line(&progress_regex, &line)
                {
                    if let Some(ref tx) = progress_tx {
                        // Non-blocking send
                        let _ = tx.try_send(DownloadProgress {
                            source_id: request.source_id.clone(),
                            downloaded_bytes,
                            total_bytes,
                        });
                    }
                    continue;
                }

                if from_stderr {
                    if line.starts_with("ERROR") {
                        error_lines.push(line.clone());
                    }
                    if stderr_tail.len() == MAX_STDERR_LINES {
                        stderr_tail.remove(0);
                    }
                    stderr_tail.push(line);
                }
            }

            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, error_lines, stderr_tail))
        })
        .await;

        match result {
            Ok(Ok((status, error_lines, stderr_tail))) => {
                if !status.success() {
                    let reason = if error_lines.is_empty() {
                        format!("yt-dlp exited with code: {:?}", status.code())
                    } else {
                        error_lines.join(" ")
                    };
                    let stderr = if stderr_tail.is_empty() {
                        None
                    } else {
                        Some(stderr_tail.join("\n"))
                    };
                    return Err(DownloaderError::download_failed(reason, stderr));
                }
            }
            Ok(Err(e)) => return Err(DownloaderError::Io(e)),
            Err(_) => {
                // Kill the process on timeout
                let _ = child.kill().await;
                return Err(DownloaderError::Timeout {
                    timeout_secs: self.timeout_secs,
                });
            }
        }

        let metadata = tokio::fs::metadata(&request.output_path)
            .await
            .map_err(|_| DownloaderError::OutputMissing {
                path: request.output_path.clone(),
            })?;

        Ok(DownloadResult {
            source_id: request.source_id.clone(),
            output_path: request.output_path.clone(),
            size_bytes: metadata.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl MediaDownloader for YtDlpDownloader {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    fn codec(&self) -> AudioCodec {
        self.codec
    }

    async fn download(
        &self,
        request: DownloadRequest,
        progress_tx: Option<mpsc::Sender<DownloadProgress>>,
    ) -> Result<DownloadResult, DownloaderError> {
        self.run_download(&request, progress_tx).await
    }

    async fn clear_cache(&self) -> Result<(), DownloaderError> {
        let output = Command::new(&self.ytdlp_path)
            .arg("--rm-cache-dir")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(DownloaderError::download_failed(
                format!(
                    "cache removal failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
                None,
            ));
        }

        Ok(())
    }

    async fn validate(&self) -> Result<(), DownloaderError> {
        let output = Command::new(&self.ytdlp_path)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(DownloaderError::download_failed(
                format!("yt-dlp --version exited with code: {:?}", output.status.code()),
                None,
            ));
        }

        debug!(
            "yt-dlp version {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }
}

/// `/dir/Band - Song.mp3` becomes `/dir/Band - Song.%(ext)s`.
fn output_template(output_path: &Path) -> String {
    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let file_name = format!("{}.%(ext)s", stem.replace('%', "%%"));

    match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            let parent = parent.to_string_lossy().replace('%', "%%");
            Path::new(&parent).join(file_name).to_string_lossy().to_string()
        }
        _ => file_name,
    }
}

fn progress_regex() -> Regex {
    Regex::new(r"^\[ingest\] (\d+|NA)/(\d+|NA)/(\d+(?:\.\d+)?|NA)")
        .expect("progress pattern is valid")
}

/// Parses `[ingest] <downloaded>/<total>/<estimate>`; any field may be `NA`.
fn parse_progress_line(re: &Regex, line: &str) -> Option<(u64, Option<u64>)> {
    let caps = re.captures(line.trim())?;
    let downloaded = caps.get(1)?.as_str().parse::<u64>().ok()?;

    let total = caps
        .get(2)
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .or_else(|| {
            caps.get(3)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .map(|estimate| estimate as u64)
        });

    Some((downloaded, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(output_path: PathBuf) -> DownloadRequest {
        DownloadRequest {
            source_id: "abc123".to_string(),
            source_url: "https://www.youtube.com/watch?v=abc123".to_string(),
            output_path,
        }
    }

    #[test]
    fn test_build_args_mp3() {
        let downloader = YtDlpDownloader::with_defaults();
        let args = downloader.build_args(&request(PathBuf::from("/stage/Band - Song.mp3")));

        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&"-x".to_string()));
        let fmt = args.iter().position(|a| a == "--audio-format").unwrap();
        assert_eq!(args[fmt + 1], "mp3");
        let quality = args.iter().position(|a| a == "--audio-quality").unwrap();
        assert_eq!(args[quality + 1], "192K");
        let out = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(args[out + 1], "/stage/Band - Song.%(ext)s");
        assert_eq!(
            args.last().unwrap(),
            "https://www.youtube.com/watch?v=abc123"
        );
    }

    #[test]
    fn test_build_args_vorbis() {
        let downloader = YtDlpDownloader::from_config(&DownloaderConfig {
            codec: AudioCodec::Vorbis,
            audio_quality: "0".to_string(),
            ..Default::default()
        });
        let args = downloader.build_args(&request(PathBuf::from("/stage/Band - Song.ogg")));

        let fmt = args.iter().position(|a| a == "--audio-format").unwrap();
        assert_eq!(args[fmt + 1], "vorbis");
        let quality = args.iter().position(|a| a == "--audio-quality").unwrap();
        assert_eq!(args[quality + 1], "0");
    }

    #[test]
    fn test_output_template_escapes_percent() {
        assert_eq!(
            output_template(Path::new("/stage/100% Band - Song.mp3")),
            "/stage/100%% Band - Song.%(ext)s"
        );
        assert_eq!(output_template(Path::new("Song.mp3")), "Song.%(ext)s");
    }

    #[test]
    fn test_parse_progress_line() {
        let re = progress_regex();
        assert_eq!(
            parse_progress_line(&re, "[ingest] 512/1024/NA"),
            Some((512, Some(1024)))
        );
        assert_eq!(
            parse_progress_line(&re, "[ingest] 512/NA/2048.5"),
            Some((512, Some(2048)))
        );
        assert_eq!(
            parse_progress_line(&re, "[ingest] 512/NA/NA"),
            Some((512, None))
        );
        assert_eq!(parse_progress_line(&re, "[ingest] NA/NA/NA"), None);
        assert_eq!(
            parse_progress_line(&re, "[youtube] abc123: Downloading webpage"),
            None
        );
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let downloader = YtDlpDownloader::from_config(&DownloaderConfig {
            ytdlp_path: PathBuf::from("/nonexistent/yt-dlp"),
            ..Default::default()
        });

        let result = downloader.validate().await;
        assert!(matches!(
            result,
            Err(DownloaderError::BinaryNotFound { .. })
        ));
    }

    #[cfg(unix)]
    fn fake_ytdlp(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-yt-dlp");
        let script = format!(
            "#!/bin/sh\n\
             out=''\n\
             prev=''\n\
             for arg in \"$@\"; do\n\
               if [ \"$prev\" = '-o' ]; then out=\"$arg\"; fi\n\
               prev=\"$arg\"\n\
             done\n\
             out=$(printf '%s' \"$out\" | sed 's/%(ext)s/mp3/')\n\
             {}\n",
            body
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_reports_progress_and_output() {
        let temp = TempDir::new().unwrap();
        let script = fake_ytdlp(
            temp.path(),
            "echo '[ingest] 2/4/NA'\necho '[ingest] 4/4/NA'\nprintf 'data' > \"$out\"",
        );
        let downloader = YtDlpDownloader::from_config(&DownloaderConfig {
            ytdlp_path: script,
            ..Default::default()
        });

        let output_path = temp.path().join("stage").join("Band - Song.mp3");
        let (tx, mut rx) = mpsc::channel(16);
        let result = downloader
            .download(request(output_path.clone()), Some(tx))
            .await
            .unwrap();

        assert_eq!(result.output_path, output_path);
        assert_eq!(result.size_bytes, 4);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.downloaded_bytes, 2);
        assert_eq!(first.total_bytes, Some(4));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.downloaded_bytes, 4);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_failure_uses_error_lines() {
        let temp = TempDir::new().unwrap();
        let script = fake_ytdlp(
            temp.path(),
            "echo 'ERROR: [youtube] abc123: Video unavailable' >&2\nexit 1",
        );
        let downloader = YtDlpDownloader::from_config(&DownloaderConfig {
            ytdlp_path: script,
            ..Default::default()
        });

        let result = downloader
            .download(request(temp.path().join("Band - Song.mp3")), None)
            .await;

        match result {
            Err(DownloaderError::DownloadFailed { reason, stderr }) => {
                assert_eq!(reason, "ERROR: [youtube] abc123: Video unavailable");
                assert!(stderr.unwrap().contains("Video unavailable"));
            }
            other => panic!("expected download failure, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_without_output_is_reported() {
        let temp = TempDir::new().unwrap();
        let script = fake_ytdlp(temp.path(), "exit 0");
        let downloader = YtDlpDownloader::from_config(&DownloaderConfig {
            ytdlp_path: script,
            ..Default::default()
        });

        let result = downloader
            .download(request(temp.path().join("Band - Song.mp3")), None)
            .await;
        assert!(matches!(result, Err(DownloaderError::OutputMissing { .. })));
    }
}
