//! yt-dlp adapter: downloads one URL into a scratch directory.
//!
//! Each download gets its own directory under the configured root, named
//! from a sha256 of the URL and a process-wide counter, so concurrent
//! downloads never collide. The child is killed when the timeout elapses.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    process::Stdio,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use digitalbot_core::{
    errors::Error,
    ports::{DownloadedMedia, MediaExtractor},
    Result,
};
use sha2::{Digest, Sha256};
use tokio::process::Command;
use tracing::{debug, info, warn};

const STDERR_TAIL_MAX_LINES: usize = 20;

static DOWNLOAD_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Debug)]
pub struct YtDlpConfig {
    pub program: PathBuf,
    pub download_dir: PathBuf,
    pub retries: u32,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct YtDlpExtractor {
    cfg: YtDlpConfig,
}

impl YtDlpExtractor {
    pub fn new(cfg: YtDlpConfig) -> Self {
        Self { cfg }
    }

    /// Command-line arguments for downloading `url` into `workdir`.
    pub fn build_args(&self, url: &str, workdir: &Path) -> Vec<String> {
        vec![
            "-f".to_string(),
            "best".to_string(),
            "-o".to_string(),
            workdir
                .join("%(title)s.%(ext)s")
                .to_string_lossy()
                .into_owned(),
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "--retries".to_string(),
            self.cfg.retries.to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            "--".to_string(),
            url.to_string(),
        ]
    }

    fn workdir_for(&self, url: &str) -> PathBuf {
        let seq = DOWNLOAD_SEQ.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update(std::process::id().to_le_bytes());
        hasher.update(seq.to_le_bytes());
        let digest = hasher.finalize();
        let name: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
        self.cfg.download_dir.join(name)
    }

    async fn run(&self, url: &str, workdir: &Path) -> Result<DownloadedMedia> {
        let args = self.build_args(url, workdir);
        debug!(program = %self.cfg.program.display(), ?args, "spawning yt-dlp");

        let child = Command::new(&self.cfg.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::External(format!(
                    "failed to start {}: {e}",
                    self.cfg.program.display()
                ))
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.cfg.timeout, child.wait_with_output()).await {
            Ok(out) => out?,
            Err(_) => {
                warn!(url, timeout_secs = self.cfg.timeout.as_secs(), "yt-dlp timed out");
                return Err(Error::External(format!(
                    "download timed out after {}s",
                    self.cfg.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = stderr_tail(&String::from_utf8_lossy(&output.stderr));
            return Err(Error::External(format!(
                "yt-dlp exited with status {}\n{stderr}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = match printed_path(&stdout) {
            Some(p) if tokio::fs::try_exists(&p).await.unwrap_or(false) => p,
            _ => largest_file(workdir)
                .await?
                .ok_or_else(|| Error::External("yt-dlp produced no file".to_string()))?,
        };

        let size_bytes = tokio::fs::metadata(&path).await?.len();
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string);

        Ok(DownloadedMedia {
            path,
            title,
            size_bytes,
            workdir: workdir.to_path_buf(),
        })
    }
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    async fn download(&self, url: &str) -> Result<DownloadedMedia> {
        let workdir = self.workdir_for(url);
        tokio::fs::create_dir_all(&workdir).await?;

        match self.run(url, &workdir).await {
            Ok(media) => {
                info!(url, bytes = media.size_bytes, "download finished");
                Ok(media)
            }
            Err(e) => {
                remove_dir(&workdir).await;
                Err(e)
            }
        }
    }

    async fn cleanup(&self, media: &DownloadedMedia) -> Result<()> {
        match tokio::fs::remove_dir_all(&media.workdir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

async fn remove_dir(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %dir.display(), error = %e, "failed to remove download dir");
        }
    }
}

/// Last non-empty stdout line, as printed by `--print after_move:filepath`.
fn printed_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .map(PathBuf::from)
}

async fn largest_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut best: Option<(u64, PathBuf)> = None;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        // Partial downloads left behind by an interrupted run.
        if entry.path().extension().and_then(|e| e.to_str()) == Some("part") {
            continue;
        }
        if best.as_ref().map_or(true, |(size, _)| meta.len() > *size) {
            best = Some((meta.len(), entry.path()));
        }
    }
    Ok(best.map(|(_, p)| p))
}

fn stderr_tail(stderr: &str) -> String {
    let mut tail: VecDeque<&str> = VecDeque::with_capacity(STDERR_TAIL_MAX_LINES);
    for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
        if tail.len() == STDERR_TAIL_MAX_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}
