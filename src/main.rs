//! Main application for the SocialClip downloader GUI

// Persisted preferences
mod config;
// Single-job orchestration: extract, convert, report
mod controller;
// Conversion invoker (ffmpeg/ffprobe)
mod converter;
// Extraction invoker (yt-dlp)
mod downloader;
// Job error taxonomy
mod error;
// tracing subscriber setup
mod logging;
// Data models for requests and outcomes
mod model;
// Output file naming
mod naming;
// Progress and tool output parsing
mod progress;
// Status console feed
mod reporter;
// Thumbnail fetching module
mod thumbnail;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
// eframe/egui for GUI application framework
use eframe::{App, Frame, egui};
use egui::{TextureOptions, Visuals};
// OnceCell for single-time runtime initialization
use once_cell::sync::OnceCell;
// FileDialog for folder selection dialogs
use rfd::FileDialog;
use tokio::{runtime::Runtime, sync::mpsc::UnboundedReceiver};

use config::AppConfig;
use controller::FormController;
use converter::Ffmpeg;
use downloader::YtDlp;
use model::{
    FileConvertRequest, FileTarget, JobOutcome, NamingOptions, OutputMode, Resolution,
    SessionState, TaskRequest, VideoInfo,
};
use reporter::{JobEvent, StatusReporter};

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

type Controller = FormController<YtDlp, Ffmpeg>;

/// Program entry point: loads settings, initializes runtime and launches GUI
fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().unwrap_or_else(|e| {
        eprintln!("using default settings: {e:#}");
        AppConfig::default()
    });
    logging::init_tracing(&config.log_filter);

    let rt = RUNTIME
        .get_or_try_init(|| Runtime::new().map(Arc::new))
        .context("Failed to start the async runtime")?;
    let handle = rt.handle().clone();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([820.0, 680.0])
            .with_min_inner_size([820.0, 520.0]),
        ..Default::default()
    };
    eframe::run_native(
        "SocialClip Downloader",
        options,
        Box::new(move |cc| {
            let visuals = if config.dark_mode { Visuals::dark() } else { Visuals::light() };
            cc.egui_ctx.set_visuals(visuals);
            Box::new(SocialClipApp::new(config, handle))
        }),
    )
    .map_err(|e| anyhow::anyhow!("GUI failed: {e}"))
}

/// Application state for the GUI
struct SocialClipApp {
    config: AppConfig,
    runtime: tokio::runtime::Handle,
    controller: Arc<Controller>,
    /// Status lines, progress and completions from background jobs
    events: UnboundedReceiver<JobEvent>,

    /// Input field for the media URL
    url_input: String,
    /// Destination folder for downloads
    download_folder: String,
    mode: OutputMode,
    resolution: Resolution,
    naming: NamingOptions,

    /// Metadata preview of the last fetched URL
    preview: Option<VideoInfo>,
    thumbnail: Option<egui::TextureHandle>,

    /// Existing file to convert
    convert_input: String,
    convert_target: FileTarget,
    convert_resolution: Resolution,

    /// Console lines, oldest first
    console: Vec<String>,
    progress: f32,
    /// Both forms are disabled while a job is in flight
    running: bool,
    last_outcome: Option<JobOutcome>,
}

impl SocialClipApp {
    fn new(config: AppConfig, runtime: tokio::runtime::Handle) -> Self {
        let (reporter, events) = StatusReporter::channel();
        let controller = FormController::new(
            YtDlp::new(config.ytdlp_path.clone()),
            Ffmpeg::new(config.ffmpeg_path.clone(), config.ffprobe_path.clone()),
            reporter,
        );
        Self {
            url_input: String::new(),
            download_folder: config.download_folder.display().to_string(),
            mode: config.default_mode,
            resolution: config.default_resolution,
            naming: NamingOptions {
                append_uploader: config.append_uploader,
                append_timestamp: config.append_timestamp,
            },
            preview: None,
            thumbnail: None,
            convert_input: String::new(),
            convert_target: FileTarget::Mp4(Resolution::P1080),
            convert_resolution: Resolution::P1080,
            console: Vec::new(),
            progress: 0.0,
            running: false,
            last_outcome: None,
            config,
            runtime,
            controller: Arc::new(controller),
            events,
        }
    }

    /// Empty folder field means the default Downloads folder
    fn destination(&self) -> PathBuf {
        let folder = self.download_folder.trim();
        if folder.is_empty() {
            config::default_download_folder()
        } else {
            PathBuf::from(folder)
        }
    }

    fn drain_events(&mut self, ctx: &egui::Context) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                JobEvent::Status(line) => self.console.push(line),
                JobEvent::Progress(p) => {
                    // Only update if progress increased
                    if p > self.progress {
                        self.progress = p;
                    }
                }
                JobEvent::Metadata(info) => {
                    if let Some(url) = info.thumbnail.clone() {
                        self.spawn_thumbnail(url, ctx);
                    }
                    self.preview = Some(info);
                }
                JobEvent::Thumbnail(img) => {
                    self.thumbnail = Some(ctx.load_texture("thumbnail", img, TextureOptions::default()));
                }
                JobEvent::Finished(outcome) => {
                    if outcome.success {
                        self.progress = 1.0;
                    }
                    self.running = false;
                    self.last_outcome = Some(outcome);
                }
            }
        }
    }

    fn spawn_thumbnail(&self, url: String, ctx: &egui::Context) {
        let reporter = self.controller.reporter().clone();
        let ctx = ctx.clone();
        self.runtime.spawn_blocking(move || {
            if let Some(img) = thumbnail::fetch_thumbnail(&url) {
                reporter.send(JobEvent::Thumbnail(img));
                ctx.request_repaint();
            }
        });
    }

    fn fetch_metadata(&mut self, ctx: &egui::Context) {
        self.preview = None;
        self.thumbnail = None;
        let url = self.url_input.clone();
        let controller = Arc::clone(&self.controller);
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            match controller.preview(&url).await {
                Ok(info) => controller.reporter().send(JobEvent::Metadata(info)),
                Err(e) => controller.reporter().report(format!("Metadata fetch failed: {e}")),
            }
            ctx.request_repaint();
        });
    }

    fn start_download(&mut self, ctx: &egui::Context) {
        let request = TaskRequest::new(
            self.url_input.clone(),
            self.mode,
            self.resolution,
            self.destination(),
        )
        .with_naming(self.naming);
        self.remember_form();
        self.begin_job();

        let controller = Arc::clone(&self.controller);
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let outcome = controller
                .submit(request)
                .await
                .unwrap_or_else(|e| JobOutcome::failed(e.to_string()));
            controller.reporter().send(JobEvent::Finished(outcome));
            ctx.request_repaint();
        });
    }

    fn start_conversion(&mut self, ctx: &egui::Context) {
        let target = match self.convert_target {
            FileTarget::Mp4(_) => FileTarget::Mp4(self.convert_resolution),
            other => other,
        };
        let request = FileConvertRequest {
            input: PathBuf::from(self.convert_input.trim()),
            target,
        };
        self.begin_job();

        let controller = Arc::clone(&self.controller);
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let outcome = controller
                .convert_file(request)
                .await
                .unwrap_or_else(|e| JobOutcome::failed(e.to_string()));
            controller.reporter().send(JobEvent::Finished(outcome));
            ctx.request_repaint();
        });
    }

    fn begin_job(&mut self) {
        self.running = true;
        self.progress = 0.0;
        self.last_outcome = None;
    }

    /// Persists the form choices so the next launch starts from them
    fn remember_form(&mut self) {
        self.config.download_folder = self.destination();
        self.config.default_mode = self.mode;
        self.config.default_resolution = self.resolution;
        self.config.append_uploader = self.naming.append_uploader;
        self.config.append_timestamp = self.naming.append_timestamp;
        if let Err(e) = self.config.save() {
            tracing::warn!("could not save settings: {e:#}");
        }
    }

    fn download_form(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        // URL input field
        ui.label("Paste video URL:");
        ui.horizontal(|ui| {
            ui.add(egui::TextEdit::singleline(&mut self.url_input).desired_width(600.0));
            if ui.button("Fetch Metadata").clicked() {
                self.fetch_metadata(ctx);
            }
        });

        // Folder selection
        ui.horizontal(|ui| {
            ui.label("Download folder:");
            ui.add(egui::TextEdit::singleline(&mut self.download_folder).desired_width(520.0));
            if ui.button("Browse…").clicked() {
                if let Some(folder) = FileDialog::new().set_directory(self.destination()).pick_folder() {
                    self.download_folder = folder.display().to_string();
                }
            }
        });

        // Metadata preview
        ui.horizontal(|ui| {
            if let Some(tex) = &self.thumbnail {
                ui.add(egui::Image::new(tex).max_width(160.0));
            }
            ui.vertical(|ui| {
                let (title, uploader) = match &self.preview {
                    Some(info) => (
                        info.display_title().to_string(),
                        info.uploader_name().unwrap_or("—").to_string(),
                    ),
                    None => ("—".to_string(), "—".to_string()),
                };
                ui.label(format!("Title: {title}"));
                ui.label(format!("Uploader: {uploader}"));
            });
        });

        // Output type and resolution
        ui.horizontal(|ui| {
            egui::ComboBox::from_label("Output")
                .selected_text(self.mode.to_string())
                .show_ui(ui, |ui| {
                    for m in OutputMode::ALL {
                        ui.selectable_value(&mut self.mode, m, m.to_string());
                    }
                });
            ui.add_enabled_ui(self.mode == OutputMode::Video, |ui| {
                egui::ComboBox::from_label("Resolution")
                    .selected_text(self.resolution.to_string())
                    .show_ui(ui, |ui| {
                        for r in Resolution::ALL {
                            ui.selectable_value(&mut self.resolution, r, r.to_string());
                        }
                    });
            });
        });

        // Rename options
        ui.horizontal(|ui| {
            ui.checkbox(&mut self.naming.append_uploader, "Add channel/uploader to filename");
            ui.checkbox(&mut self.naming.append_timestamp, "Add timestamp to filename");
        });

        ui.horizontal(|ui| {
            if ui.button("Download").clicked() {
                self.start_download(ctx);
            }
            if let Some(outcome) = &self.last_outcome {
                if outcome.success && ui.button("Open Folder").clicked() {
                    let folder = outcome
                        .output_path
                        .as_ref()
                        .and_then(|p| p.parent())
                        .map(PathBuf::from)
                        .unwrap_or_else(|| self.destination());
                    open_folder(folder);
                }
            }
        });
    }

    fn convert_form(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.label("Convert existing file (select file below)");
        ui.horizontal(|ui| {
            ui.add(egui::TextEdit::singleline(&mut self.convert_input).desired_width(600.0));
            if ui.button("Select File...").clicked() {
                if let Some(file) = FileDialog::new().set_directory(self.destination()).pick_file() {
                    self.convert_input = file.display().to_string();
                }
            }
        });

        ui.horizontal(|ui| {
            let mp4 = FileTarget::Mp4(self.convert_resolution);
            if matches!(self.convert_target, FileTarget::Mp4(_)) {
                self.convert_target = mp4;
            }
            egui::ComboBox::from_label("Convert to")
                .selected_text(self.convert_target.to_string())
                .show_ui(ui, |ui| {
                    for t in [mp4, FileTarget::Mp3, FileTarget::Wav] {
                        ui.selectable_value(&mut self.convert_target, t, t.to_string());
                    }
                });
            ui.add_enabled_ui(matches!(self.convert_target, FileTarget::Mp4(_)), |ui| {
                egui::ComboBox::from_label("Resolution (for video)")
                    .selected_text(self.convert_resolution.to_string())
                    .show_ui(ui, |ui| {
                        for r in Resolution::ALL {
                            ui.selectable_value(&mut self.convert_resolution, r, r.to_string());
                        }
                    });
            });
        });

        if ui.button("Convert Selected File").clicked() {
            self.start_conversion(ctx);
        }
    }
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for SocialClipApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        // 1️⃣ Poll background job events
        self.drain_events(ctx);

        // 2️⃣ Bottom panel: status console
        egui::TopBottomPanel::bottom("console_panel")
            .resizable(true)
            .min_height(160.0)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("Console");
                    if ui.button("Clear").clicked() {
                        self.console.clear();
                    }
                });
                ui.add(egui::ProgressBar::new(self.progress).show_percentage());
                egui::ScrollArea::vertical()
                    .auto_shrink([false; 2])
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        for line in &self.console {
                            ui.monospace(line);
                        }
                    });
            });

        // 3️⃣ Main panel: both forms, disabled while a job runs
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("SocialClip Downloader");
            let idle = !self.running && self.controller.state() == SessionState::Idle;
            ui.add_enabled_ui(idle, |ui| self.download_form(ui, ctx));
            ui.separator();
            ui.add_enabled_ui(idle, |ui| self.convert_form(ui, ctx));
        });

        // Request periodic repaint for progress updates
        if self.running {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }
}

/// Opens the folder in the platform file manager
fn open_folder(folder: PathBuf) {
    std::thread::spawn(move || {
        #[cfg(target_os = "windows")]
        let opener = "explorer";
        #[cfg(target_os = "macos")]
        let opener = "open";
        #[cfg(all(unix, not(target_os = "macos")))]
        let opener = "xdg-open";
        if let Err(e) = std::process::Command::new(opener).arg(&folder).spawn() {
            tracing::warn!(folder = %folder.display(), "could not open folder: {e}");
        }
    });
}
