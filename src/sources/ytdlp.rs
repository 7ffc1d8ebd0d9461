use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{
    path::PathBuf,
    process::Stdio,
    sync::{
        atomic::{AtomicU64, Ordering},
        LazyLock,
    },
    time::Duration,
};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{MediaResolver, TrackInfo};
use crate::error::{PlaybackError, PlaybackResult};

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(www\.|music\.|m\.)?(youtube\.com|youtu\.be)/.+$")
        .expect("valid youtube url regex")
});

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\-.]").expect("valid filename regex"));

/// One line of `yt-dlp --dump-json` output.
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: String,
    title: String,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

impl From<YtDlpEntry> for TrackInfo {
    fn from(entry: YtDlpEntry) -> Self {
        let url = entry
            .webpage_url
            .or(entry.url)
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", entry.id));

        Self {
            id: entry.id,
            title: entry.title,
            uploader: entry.uploader,
            url,
            duration: entry
                .duration
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64),
        }
    }
}

/// Resolver backed by the `yt-dlp` command line tool.
pub struct YtDlpResolver {
    download_dir: PathBuf,
    timeout: Duration,
    next_file: AtomicU64,
}

impl YtDlpResolver {
    pub fn new(download_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            download_dir: download_dir.into(),
            timeout,
            next_file: AtomicU64::new(1),
        }
    }

    pub fn is_youtube_url(input: &str) -> bool {
        YOUTUBE_URL.is_match(input)
    }

    /// Strips playlist and tracking parameters from a `watch?v=` URL.
    pub fn normalize_url(raw: &str) -> String {
        let Ok(parsed) = url::Url::parse(raw) else {
            return raw.to_string();
        };

        match parsed.query_pairs().find(|(key, _)| key == "v") {
            Some((_, id)) if !id.is_empty() => format!("https://www.youtube.com/watch?v={}", id),
            _ => raw.to_string(),
        }
    }

    pub fn sanitize_filename(name: &str) -> String {
        UNSAFE_FILENAME_CHARS.replace_all(name, "_").into_owned()
    }

    async fn run(&self, args: &[&str]) -> PlaybackResult<Vec<u8>> {
        let mut cmd = Command::new("yt-dlp");
        cmd.args(args)
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                PlaybackError::Search(format!(
                    "yt-dlp timed out after {}",
                    humantime::format_duration(self.timeout)
                ))
            })?
            .map_err(|e| PlaybackError::Search(format!("failed to start yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PlaybackError::Search(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }
}

/// Parses JSON-lines output, skipping lines that are not entries.
fn parse_entries(stdout: &[u8]) -> Vec<TrackInfo> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<YtDlpEntry>(line) {
            Ok(entry) => Some(TrackInfo::from(entry)),
            Err(e) => {
                warn!("⚠️ Línea inválida de yt-dlp ignorada: {}", e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn search(&self, query: &str, limit: usize) -> PlaybackResult<Vec<TrackInfo>> {
        let default_search = format!("ytsearch{}", limit.max(1));
        let stdout = self
            .run(&[
                "--dump-json",
                "--no-download",
                "--flat-playlist",
                "--default-search",
                &default_search,
                query,
            ])
            .await?;

        let mut results = parse_entries(&stdout);
        results.truncate(limit);
        info!("🔍 {} resultados para '{}'", results.len(), query);
        Ok(results)
    }

    async fn lookup(&self, url: &str) -> PlaybackResult<TrackInfo> {
        let url = Self::normalize_url(url);
        let stdout = self.run(&["--dump-json", "--no-playlist", &url]).await?;

        parse_entries(&stdout)
            .into_iter()
            .next()
            .ok_or_else(|| PlaybackError::Search(format!("no video info returned for {}", url)))
    }

    async fn fetch_audio(&self, url: &str, title: &str) -> PlaybackResult<PathBuf> {
        let n = self.next_file.fetch_add(1, Ordering::Relaxed);
        let path = self
            .download_dir
            .join(format!("{}-{}.mp3", Self::sanitize_filename(title), n));
        let target = path.to_string_lossy().into_owned();

        debug!("⬇️ Descargando '{}' en {}", title, target);
        self.run(&[
            "-f",
            "bestaudio",
            "-x",
            "--audio-format",
            "mp3",
            "-o",
            &target,
            url,
        ])
        .await
        .map_err(|e| PlaybackError::resolution(title, e))?;

        match tokio::fs::try_exists(&path).await {
            Ok(true) => Ok(path),
            Ok(false) => Err(PlaybackError::resolution(
                title,
                "yt-dlp finished without producing a file",
            )),
            Err(e) => Err(PlaybackError::resolution(title, e)),
        }
    }
}
