use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

/// What the user wants to end up with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    /// MP4 video
    Video,
    /// MP3 audio track only
    Audio,
}

impl OutputMode {
    pub const ALL: [OutputMode; 2] = [OutputMode::Video, OutputMode::Audio];
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Video => f.write_str("Video (MP4)"),
            OutputMode::Audio => f.write_str("Audio (MP3)"),
        }
    }
}

/// Requested video resolution. Ignored for audio jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Best,
    P720,
    P1080,
    /// 2K
    P1440,
    /// 4K
    P2160,
}

impl Resolution {
    pub const ALL: [Resolution; 5] = [
        Resolution::Best,
        Resolution::P720,
        Resolution::P1080,
        Resolution::P1440,
        Resolution::P2160,
    ];

    /// Frame height in pixels, `None` for "whatever the source has"
    pub fn height(self) -> Option<u32> {
        match self {
            Resolution::Best => None,
            Resolution::P720 => Some(720),
            Resolution::P1080 => Some(1080),
            Resolution::P1440 => Some(1440),
            Resolution::P2160 => Some(2160),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Best => f.write_str("Best"),
            Resolution::P720 => f.write_str("720p"),
            Resolution::P1080 => f.write_str("1080p"),
            Resolution::P1440 => f.write_str("2K (1440p)"),
            Resolution::P2160 => f.write_str("4K (2160p)"),
        }
    }
}

/// Extra pieces appended to the file name derived from the title
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamingOptions {
    pub append_uploader: bool,
    pub append_timestamp: bool,
}

/// A single download job as submitted from the form.
///
/// Fields are private so a request cannot change after it has been handed
/// to the controller.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    url: String,
    mode: OutputMode,
    resolution: Resolution,
    destination: PathBuf,
    naming: NamingOptions,
}

impl TaskRequest {
    pub fn new(
        url: impl Into<String>,
        mode: OutputMode,
        resolution: Resolution,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            url: url.into().trim().to_string(),
            mode,
            resolution,
            destination: destination.into(),
            naming: NamingOptions::default(),
        }
    }

    pub fn with_naming(mut self, naming: NamingOptions) -> Self {
        self.naming = naming;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn naming(&self) -> NamingOptions {
        self.naming
    }
}

/// Output choices of the "convert existing file" form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileTarget {
    Mp4(Resolution),
    Mp3,
    Wav,
}

impl fmt::Display for FileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileTarget::Mp4(_) => f.write_str("MP4 (Video)"),
            FileTarget::Mp3 => f.write_str("MP3 (Audio)"),
            FileTarget::Wav => f.write_str("WAV (Audio)"),
        }
    }
}

/// Convert a file that is already on disk
#[derive(Debug, Clone)]
pub struct FileConvertRequest {
    pub input: PathBuf,
    pub target: FileTarget,
}

/// What the transcoder is asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertTarget {
    /// H.264/AAC MP4; `height` of `None` keeps the source frame size
    Mp4 { height: Option<u32> },
    Mp3,
    Wav,
}

impl ConvertTarget {
    pub fn extension(self) -> &'static str {
        match self {
            ConvertTarget::Mp4 { .. } => "mp4",
            ConvertTarget::Mp3 => "mp3",
            ConvertTarget::Wav => "wav",
        }
    }
}

/// Metadata returned by the extractor's probe
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub uploader_id: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

impl VideoInfo {
    /// Title, falling back to the id
    pub fn display_title(&self) -> &str {
        non_empty(&self.title)
            .or_else(|| non_empty(&self.id))
            .unwrap_or("video")
    }

    /// First non-empty of uploader, channel, creator, uploader_id
    pub fn uploader_name(&self) -> Option<&str> {
        [&self.uploader, &self.channel, &self.creator, &self.uploader_id]
            .into_iter()
            .find_map(non_empty)
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}

/// File produced by the extractor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub path: PathBuf,
    /// Frame height reported by the extractor, if it knew it
    pub height: Option<u32>,
}

/// Terminal result of one submitted job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub success: bool,
    pub output_path: Option<PathBuf>,
    pub message: String,
}

impl JobOutcome {
    pub fn succeeded(output_path: PathBuf, message: impl Into<String>) -> Self {
        Self {
            success: true,
            output_path: Some(output_path),
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output_path: None,
            message: message.into(),
        }
    }
}

/// Whether a job currently holds the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
}
