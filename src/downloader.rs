//! Extraction invoker: everything that talks to yt-dlp.

use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use rust_embed::RustEmbed;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    process::Command,
};

use crate::{
    error::JobError,
    model::{Extracted, OutputMode, Resolution, VideoInfo},
    progress::{PrintedField, parse_printed_field, parse_progress_from_line},
    reporter::StatusReporter,
};

/// Optional bundled extractor binaries (`yt-dlp` / `yt-dlp.exe`)
#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Asset;

/// One extractor run
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub mode: OutputMode,
    pub resolution: Resolution,
    /// `-o` template, `.%(ext)s` included
    pub output_template: String,
}

/// Resolves a URL to metadata and to a file on disk
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn probe(&self, url: &str) -> Result<VideoInfo, JobError>;

    async fn fetch(
        &self,
        request: &FetchRequest,
        reporter: &StatusReporter,
    ) -> Result<Extracted, JobError>;
}

/// yt-dlp format selector for a mode and resolution
pub fn format_selector(mode: OutputMode, resolution: Resolution) -> String {
    match (mode, resolution.height()) {
        (OutputMode::Audio, _) => "bestaudio/best".to_string(),
        (OutputMode::Video, None) => "bestvideo+bestaudio/best".to_string(),
        (OutputMode::Video, Some(h)) => {
            format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]/bestvideo+bestaudio/best")
        }
    }
}

/// Full argument list for a download run
pub fn fetch_args(request: &FetchRequest) -> Vec<String> {
    let mut args = vec![
        "-f".to_owned(),
        format_selector(request.mode, request.resolution),
    ];
    if request.mode == OutputMode::Video {
        args.push("--merge-output-format".to_owned());
        args.push("mp4".to_owned());
    }
    args.push("--no-playlist".to_owned());
    args.push("--newline".to_owned());
    // --print implies --quiet, --progress brings the progress lines back
    args.push("--progress".to_owned());
    args.push("--progress-template".to_owned());
    args.push("download:downloaded_bytes:%(progress._percent_str)s".to_owned());
    args.push("--print".to_owned());
    args.push("after_move:path=%(filepath)s".to_owned());
    args.push("--print".to_owned());
    args.push("after_move:height=%(height)s".to_owned());

    args.push("-o".to_owned());
    args.push(request.output_template.clone());
    args.push(request.url.clone());
    args
}

/// Last non-empty stderr line, which is where yt-dlp and ffmpeg put the
/// actual error
pub fn last_error_line(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or("no error output")
        .to_string()
}

/// The real extractor
pub struct YtDlp {
    configured: Option<PathBuf>,
}

impl YtDlp {
    pub fn new(configured: Option<PathBuf>) -> Self {
        Self { configured }
    }

    /// Configured path, then the bundled copy, then `PATH`
    fn binary(&self) -> Result<PathBuf, JobError> {
        if let Some(path) = &self.configured {
            if path.is_file() {
                return Ok(path.clone());
            }
            tracing::warn!(path = %path.display(), "configured yt-dlp not found, falling back");
        }
        if let Some(path) = unpack_bundled()? {
            return Ok(path);
        }
        which::which("yt-dlp").map_err(|e| {
            JobError::Environment(format!("yt-dlp is not bundled and not on PATH ({e})"))
        })
    }
}

/// Writes the embedded yt-dlp to the temp dir once
fn unpack_bundled() -> Result<Option<PathBuf>, JobError> {
    let bin = if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" };
    let Some(data) = Asset::get(bin) else {
        return Ok(None);
    };
    let tmp = std::env::temp_dir().join(bin);
    if !tmp.exists() {
        let mut f = File::create(&tmp)?;
        f.write_all(&data.data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o755))?;
        }
        tracing::debug!(path = %tmp.display(), "unpacked bundled yt-dlp");
    }
    Ok(Some(tmp))
}

fn spawn_error(bin: &Path, e: std::io::Error) -> JobError {
    if e.kind() == std::io::ErrorKind::NotFound {
        JobError::Environment(format!("cannot run {}: {e}", bin.display()))
    } else {
        JobError::Io(e)
    }
}

#[async_trait]
impl Extractor for YtDlp {
    async fn probe(&self, url: &str) -> Result<VideoInfo, JobError> {
        let bin = self.binary()?;
        tracing::debug!(%url, "probing metadata");
        let output = Command::new(&bin)
            .args(["--dump-single-json", "--no-playlist", "--skip-download", url])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| spawn_error(&bin, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(JobError::Extraction(last_error_line(&stderr)));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|e| JobError::Extraction(format!("unreadable metadata: {e}")))
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        reporter: &StatusReporter,
    ) -> Result<Extracted, JobError> {
        let bin = self.binary()?;
        let args = fetch_args(request);
        tracing::debug!(bin = %bin.display(), ?args, "starting extractor");

        let mut child = Command::new(&bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&bin, e))?;

        // drained concurrently so a chatty stderr cannot block stdout
        let mut stderr = child.stderr.take().ok_or_else(|| {
            JobError::Extraction("extractor stderr was not captured".to_string())
        })?;
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        });

        let out = child.stdout.take().ok_or_else(|| {
            JobError::Extraction("extractor stdout was not captured".to_string())
        })?;
        let mut lines = BufReader::new(out).lines();
        let mut path = None;
        let mut height = None;
        while let Some(line) = lines.next_line().await? {
            if let Some(pct) = parse_progress_from_line(&line) {
                reporter.progress(pct);
                continue;
            }
            match parse_printed_field(&line) {
                Some(PrintedField::Path(p)) => path = Some(p),
                Some(PrintedField::Height(h)) => height = h,
                None => tracing::trace!("yt-dlp> {line}"),
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();
        if !status.success() {
            tracing::warn!(%status, "extractor failed");
            return Err(JobError::Extraction(last_error_line(&stderr)));
        }

        let path = path.ok_or_else(|| {
            JobError::Extraction("extractor did not report an output file".to_string())
        })?;
        tracing::info!(path = %path.display(), ?height, "extraction finished");
        Ok(Extracted { path, height })
    }
}
