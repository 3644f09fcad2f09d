//! Conversion invoker: ffmpeg/ffprobe and the decision whether to call them.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use tokio::process::Command;

use crate::{
    downloader::last_error_line,
    error::JobError,
    model::{ConvertTarget, OutputMode, Resolution},
    naming::unique_path,
};

/// Converts files and inspects their video stream
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Height of the first video stream, `None` when it cannot be read
    async fn probe_height(&self, path: &Path) -> Option<u32>;

    async fn convert(&self, input: &Path, target: ConvertTarget) -> Result<PathBuf, JobError>;
}

/// Result of comparing what was extracted with what was asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionPlan {
    /// Nothing to do; the reason goes to the console
    Skip(String),
    Convert(ConvertTarget),
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Decides the conversion after a download. A `source_height` of 0 means unknown.
///
/// Never upscales: the frame is only scaled when the requested height is
/// strictly below the source.
pub fn plan_download(
    mode: OutputMode,
    resolution: Resolution,
    extracted: &Path,
    source_height: u32,
) -> ConversionPlan {
    if mode == OutputMode::Audio {
        return if has_extension(extracted, "mp3") {
            ConversionPlan::Skip("Source is already MP3.".to_string())
        } else {
            ConversionPlan::Convert(ConvertTarget::Mp3)
        };
    }

    let (scale, reason) = match resolution.height() {
        None => (None, "best resolution requested".to_string()),
        Some(target) if source_height == 0 => (Some(target), String::new()),
        Some(target) if target < source_height => (Some(target), String::new()),
        Some(target) if target == source_height => (
            None,
            format!("source resolution equals target ({source_height}p)"),
        ),
        Some(target) => (
            None,
            format!("source ({source_height}p) is lower than target ({target}p), no upscaling"),
        ),
    };

    if scale.is_none() && has_extension(extracted, "mp4") {
        ConversionPlan::Skip(format!("Skipped conversion: {reason}."))
    } else {
        ConversionPlan::Convert(ConvertTarget::Mp4 { height: scale })
    }
}

/// Decides the conversion for an existing file; `Err` carries the abort
/// message when the source height is unknown
pub fn plan_video_file(target: u32, source_height: u32) -> Result<ConversionPlan, String> {
    if source_height == 0 {
        return Err("Conversion aborted: unknown source resolution.".to_string());
    }
    Ok(if target > source_height {
        ConversionPlan::Skip(format!(
            "Skipped conversion: source ({source_height}p) is lower than target ({target}p). No upscaling."
        ))
    } else if target == source_height {
        ConversionPlan::Skip(format!(
            "Skipped conversion: source resolution equals target ({source_height}p)."
        ))
    } else {
        ConversionPlan::Convert(ConvertTarget::Mp4 {
            height: Some(target),
        })
    })
}

/// Where the converted file goes, next to the input
pub fn output_path(input: &Path, target: ConvertTarget) -> PathBuf {
    let dir = input.parent().unwrap_or_else(|| Path::new("."));
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let base = match target {
        ConvertTarget::Mp4 { height: Some(h) } => format!("{stem}_{h}p"),
        _ => stem,
    };
    let ext = target.extension();
    // also covers converting a file onto itself
    unique_path(dir, &base, ext, None)
}

/// ffmpeg arguments between `-i <input>` and the output path
pub fn ffmpeg_args(target: ConvertTarget) -> Vec<String> {
    let mut args: Vec<String> = match target {
        ConvertTarget::Mp4 { height } => {
            let mut v: Vec<String> = ["-c:v", "libx264", "-preset", "slow", "-crf", "22"]
                .into_iter()
                .map(String::from)
                .collect();
            if let Some(h) = height {
                v.push("-vf".into());
                v.push(format!("scale=-2:{h}"));
            }
            v.extend(["-c:a", "aac", "-b:a", "128k"].map(String::from));
            v
        }
        ConvertTarget::Mp3 => ["-q:a", "0", "-map", "a"].map(String::from).to_vec(),
        ConvertTarget::Wav => ["-vn", "-acodec", "pcm_s16le", "-ar", "44100", "-ac", "2"]
            .map(String::from)
            .to_vec(),
    };
    args.push("-y".into());
    args
}

/// The real transcoder
pub struct Ffmpeg {
    ffmpeg: Option<PathBuf>,
    ffprobe: Option<PathBuf>,
}

impl Ffmpeg {
    pub fn new(ffmpeg: Option<PathBuf>, ffprobe: Option<PathBuf>) -> Self {
        Self { ffmpeg, ffprobe }
    }

    fn resolve(configured: &Option<PathBuf>, name: &str) -> Result<PathBuf, JobError> {
        match configured {
            Some(path) if path.is_file() => Ok(path.clone()),
            _ => which::which(name)
                .map_err(|e| JobError::Environment(format!("{name} not found on PATH ({e})"))),
        }
    }
}

#[async_trait]
impl Transcoder for Ffmpeg {
    async fn probe_height(&self, path: &Path) -> Option<u32> {
        let bin = Self::resolve(&self.ffprobe, "ffprobe").ok()?;
        let output = Command::new(bin)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=height",
                "-of",
                "csv=p=0",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        crate::progress::parse_probe_height(&String::from_utf8_lossy(&output.stdout))
    }

    async fn convert(&self, input: &Path, target: ConvertTarget) -> Result<PathBuf, JobError> {
        let bin = Self::resolve(&self.ffmpeg, "ffmpeg")?;
        let out = output_path(input, target);
        let args = ffmpeg_args(target);
        tracing::debug!(input = %input.display(), output = %out.display(), ?args, "starting transcoder");

        let output = Command::new(&bin)
            .arg("-i")
            .arg(input)
            .args(&args)
            .arg(&out)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    JobError::Environment(format!("cannot run {}: {e}", bin.display()))
                }
                _ => JobError::Io(e),
            })?;

        if !output.status.success() {
            if out.exists() {
                if let Err(e) = std::fs::remove_file(&out) {
                    tracing::warn!(path = %out.display(), "could not remove partial output: {e}");
                }
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(status = %output.status, "transcoder failed");
            return Err(JobError::Conversion(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                last_error_line(&stderr)
            )));
        }
        tracing::info!(output = %out.display(), "conversion finished");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_skips_only_for_mp3() {
        assert!(matches!(
            plan_download(OutputMode::Audio, Resolution::P1080, Path::new("a.mp3"), 0),
            ConversionPlan::Skip(_)
        ));
        assert_eq!(
            plan_download(OutputMode::Audio, Resolution::Best, Path::new("a.webm"), 1080),
            ConversionPlan::Convert(ConvertTarget::Mp3)
        );
        assert_eq!(
            plan_download(OutputMode::Audio, Resolution::Best, Path::new("a.m4a"), 0),
            ConversionPlan::Convert(ConvertTarget::Mp3)
        );
    }

    #[test]
    fn video_equal_height_is_skipped() {
        assert!(matches!(
            plan_download(OutputMode::Video, Resolution::P1080, Path::new("a.mp4"), 1080),
            ConversionPlan::Skip(_)
        ));
    }

    #[test]
    fn video_never_upscales() {
        let plan = plan_download(OutputMode::Video, Resolution::P2160, Path::new("a.mp4"), 1080);
        match plan {
            ConversionPlan::Skip(reason) => assert!(reason.contains("no upscaling")),
            other => panic!("unexpected {other:?}"),
        }
        // wrong container still gets fixed, without scaling
        assert_eq!(
            plan_download(OutputMode::Video, Resolution::P2160, Path::new("a.webm"), 1080),
            ConversionPlan::Convert(ConvertTarget::Mp4 { height: None })
        );
    }

    #[test]
    fn video_downscales() {
        assert_eq!(
            plan_download(OutputMode::Video, Resolution::P720, Path::new("a.mp4"), 1080),
            ConversionPlan::Convert(ConvertTarget::Mp4 { height: Some(720) })
        );
    }

    #[test]
    fn video_unknown_height_attempts_scale() {
        assert_eq!(
            plan_download(OutputMode::Video, Resolution::P720, Path::new("a.mp4"), 0),
            ConversionPlan::Convert(ConvertTarget::Mp4 { height: Some(720) })
        );
    }

    #[test]
    fn video_best_only_fixes_container() {
        assert!(matches!(
            plan_download(OutputMode::Video, Resolution::Best, Path::new("a.MP4"), 2160),
            ConversionPlan::Skip(_)
        ));
        assert_eq!(
            plan_download(OutputMode::Video, Resolution::Best, Path::new("a.mkv"), 2160),
            ConversionPlan::Convert(ConvertTarget::Mp4 { height: None })
        );
    }

    #[test]
    fn file_plan() {
        assert!(plan_video_file(720, 0).is_err());
        assert!(matches!(plan_video_file(1080, 720), Ok(ConversionPlan::Skip(_))));
        assert!(matches!(plan_video_file(720, 720), Ok(ConversionPlan::Skip(_))));
        assert_eq!(
            plan_video_file(720, 1080),
            Ok(ConversionPlan::Convert(ConvertTarget::Mp4 { height: Some(720) }))
        );
    }

    #[test]
    fn output_paths() {
        let input = Path::new("/tmp/out/Clip.webm");
        assert_eq!(
            output_path(input, ConvertTarget::Mp4 { height: Some(720) }),
            PathBuf::from("/tmp/out/Clip_720p.mp4")
        );
        assert_eq!(
            output_path(input, ConvertTarget::Mp4 { height: None }),
            PathBuf::from("/tmp/out/Clip.mp4")
        );
        assert_eq!(output_path(input, ConvertTarget::Mp3), PathBuf::from("/tmp/out/Clip.mp3"));
        assert_eq!(output_path(input, ConvertTarget::Wav), PathBuf::from("/tmp/out/Clip.wav"));
    }

    #[test]
    fn output_never_overwrites_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("Song.mp3");
        std::fs::write(&input, b"").unwrap();
        assert_eq!(output_path(&input, ConvertTarget::Mp3), dir.path().join("Song_1.mp3"));
    }

    #[test]
    fn output_never_overwrites_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("Song.m4a");
        std::fs::write(dir.path().join("Song.mp3"), b"old").unwrap();
        assert_eq!(output_path(&input, ConvertTarget::Mp3), dir.path().join("Song_1.mp3"));

        let clip = dir.path().join("Clip.webm");
        std::fs::write(dir.path().join("Clip_720p.mp4"), b"old").unwrap();
        assert_eq!(
            output_path(&clip, ConvertTarget::Mp4 { height: Some(720) }),
            dir.path().join("Clip_720p_1.mp4")
        );
    }

    /// Executable shell script standing in for ffmpeg
    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    // the output path is always the last argument
    #[cfg(unix)]
    const WRITE_LAST_ARG: &str = "for out; do :; done\necho partial > \"$out\"";

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_conversion_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_ffmpeg(
            dir.path(),
            &format!("{WRITE_LAST_ARG}\necho 'Invalid data found when processing input' >&2\nexit 1"),
        );
        let input = dir.path().join("clip.webm");
        std::fs::write(&input, b"x").unwrap();

        let err = Ffmpeg::new(Some(bin), None)
            .convert(&input, ConvertTarget::Mp3)
            .await
            .unwrap_err();

        match err {
            JobError::Conversion(msg) => {
                assert!(msg.ends_with("Invalid data found when processing input"), "{msg}")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!dir.path().join("clip.mp3").exists());
        assert!(input.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_conversion_returns_output() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_ffmpeg(dir.path(), WRITE_LAST_ARG);
        let input = dir.path().join("clip.webm");
        std::fs::write(&input, b"x").unwrap();

        let out = Ffmpeg::new(Some(bin), None)
            .convert(&input, ConvertTarget::Wav)
            .await
            .unwrap();

        assert_eq!(out, dir.path().join("clip.wav"));
        assert!(out.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unrunnable_ffmpeg_is_an_environment_error() {
        let dir = tempfile::tempdir().unwrap();
        // missing interpreter, so exec fails with NotFound
        let bin = fake_ffmpeg(dir.path(), "");
        std::fs::write(&bin, "#!/nonexistent/socialclip-sh\n").unwrap();
        let input = dir.path().join("clip.webm");
        std::fs::write(&input, b"x").unwrap();

        let err = Ffmpeg::new(Some(bin), None)
            .convert(&input, ConvertTarget::Mp3)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Environment(_)), "{err:?}");
    }

    #[test]
    fn tool_missing_from_path_is_an_environment_error() {
        let err = Ffmpeg::resolve(&None, "socialclip-no-such-tool").unwrap_err();
        assert!(matches!(err, JobError::Environment(msg) if msg.contains("socialclip-no-such-tool")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn height_is_read_from_stream_info() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_ffmpeg(dir.path(), "echo\necho 1080");
        let ffmpeg = Ffmpeg::new(None, Some(bin));
        assert_eq!(ffmpeg.probe_height(Path::new("clip.mp4")).await, Some(1080));

        let failing = fake_ffmpeg(dir.path(), "exit 1");
        let ffmpeg = Ffmpeg::new(None, Some(failing));
        assert_eq!(ffmpeg.probe_height(Path::new("clip.mp4")).await, None);
    }

    #[test]
    fn args_per_target() {
        let scaled = ffmpeg_args(ConvertTarget::Mp4 { height: Some(720) });
        assert!(scaled.windows(2).any(|w| w[0] == "-vf" && w[1] == "scale=-2:720"));
        assert_eq!(scaled.last().unwrap(), "-y");

        let unscaled = ffmpeg_args(ConvertTarget::Mp4 { height: None });
        assert!(!unscaled.iter().any(|a| a == "-vf"));

        assert_eq!(ffmpeg_args(ConvertTarget::Mp3), ["-q:a", "0", "-map", "a", "-y"]);
        assert!(ffmpeg_args(ConvertTarget::Wav).iter().any(|a| a == "pcm_s16le"));
    }
}
