use chrono::Local;
use eframe::egui::ColorImage;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::model::{JobOutcome, VideoInfo};

/// Messages from background jobs to the UI thread
pub enum JobEvent {
    /// One console line, already timestamped
    Status(String),
    /// Extractor progress, 0.0 to 1.0
    Progress(f32),
    /// Metadata preview finished
    Metadata(VideoInfo),
    /// Preview image decoded
    Thumbnail(ColorImage),
    /// The job is over and the form may be used again
    Finished(JobOutcome),
}

/// Append-only status console feed.
///
/// Cloned into every job; the UI holds the matching receiver.
#[derive(Clone)]
pub struct StatusReporter {
    tx: UnboundedSender<JobEvent>,
}

impl StatusReporter {
    pub fn channel() -> (Self, UnboundedReceiver<JobEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn report(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(target: "socialclip::console", "{message}");
        let line = format!("[{}] {}", Local::now().format("%H:%M:%S"), message);
        // the window may already be closed
        let _ = self.tx.send(JobEvent::Status(line));
    }

    pub fn progress(&self, fraction: f32) {
        let _ = self.tx.send(JobEvent::Progress(fraction));
    }

    pub fn send(&self, event: JobEvent) {
        let _ = self.tx.send(event);
    }
}
