//! Form controller: validation, the single-job session and the
//! extract → convert → report sequence.

use std::{path::Path, sync::Arc};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{
    converter::{ConversionPlan, Transcoder, plan_download, plan_video_file},
    downloader::{Extractor, FetchRequest},
    error::JobError,
    model::{
        ConvertTarget, FileConvertRequest, FileTarget, JobOutcome, OutputMode, SessionState,
        TaskRequest, VideoInfo,
    },
    naming::{base_filename, output_template, unique_stem},
    reporter::StatusReporter,
};

/// Drives one job at a time through the external tools
pub struct FormController<E, T> {
    extractor: Arc<E>,
    transcoder: Arc<T>,
    reporter: StatusReporter,
    session: Arc<Semaphore>,
}

impl<E: Extractor, T: Transcoder> FormController<E, T> {
    pub fn new(extractor: E, transcoder: T, reporter: StatusReporter) -> Self {
        Self {
            extractor: Arc::new(extractor),
            transcoder: Arc::new(transcoder),
            reporter,
            session: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn state(&self) -> SessionState {
        if self.session.available_permits() == 0 {
            SessionState::Running
        } else {
            SessionState::Idle
        }
    }

    pub fn reporter(&self) -> &StatusReporter {
        &self.reporter
    }

    /// The permit is released on drop, so every exit path returns to Idle
    fn begin(&self) -> Result<OwnedSemaphorePermit, JobError> {
        Arc::clone(&self.session)
            .try_acquire_owned()
            .map_err(|_| JobError::Busy)
    }

    /// Runs a download job.
    ///
    /// `Err` means the job never started (bad input or another job running);
    /// tool failures come back as an unsuccessful [`JobOutcome`].
    pub async fn submit(&self, request: TaskRequest) -> Result<JobOutcome, JobError> {
        // taken first so a rejected submission never touches the destination
        let _permit = self.begin().inspect_err(|e| self.reporter.report(e.to_string()))?;
        if let Err(e) = validate(&request) {
            self.reporter.report(e.to_string());
            return Err(e);
        }
        tracing::info!(url = request.url(), mode = ?request.mode(), resolution = ?request.resolution(), "job started");

        let outcome = match self.download(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(url = request.url(), "job failed: {e}");
                JobOutcome::failed(e.to_string())
            }
        };
        self.reporter.report(&outcome.message);
        Ok(outcome)
    }

    async fn download(&self, request: &TaskRequest) -> Result<JobOutcome, JobError> {
        let destination = request.destination();

        self.reporter.report("Preparing download (fetching metadata)...");
        let info = self.extractor.probe(request.url()).await?;

        // the extractor's intermediate and the converted file share this stem,
        // so it must be free for every extension
        let stem = unique_stem(destination, &base_filename(&info, request.naming()), info.id.as_deref());
        let template = output_template(destination, &stem);

        self.reporter.report(format!("Downloading as: {stem}"));
        let fetch = FetchRequest {
            url: request.url().to_string(),
            mode: request.mode(),
            resolution: request.resolution(),
            output_template: template,
        };
        let extracted = self.extractor.fetch(&fetch, &self.reporter).await?;
        self.reporter.report(format!("Downloaded: {}", extracted.path.display()));

        let source_height = match request.mode() {
            OutputMode::Audio => 0,
            OutputMode::Video => {
                let height = match extracted.height {
                    Some(h) => Some(h),
                    None => self.transcoder.probe_height(&extracted.path).await,
                };
                let height = height.unwrap_or(0);
                self.reporter.report(format!("Detected source height: {height}p"));
                height
            }
        };

        match plan_download(request.mode(), request.resolution(), &extracted.path, source_height) {
            ConversionPlan::Skip(reason) => {
                self.reporter.report(reason);
                Ok(JobOutcome::succeeded(
                    extracted.path.clone(),
                    format!("Download finished: {}", extracted.path.display()),
                ))
            }
            ConversionPlan::Convert(target) => {
                if source_height == 0 && request.mode() == OutputMode::Video {
                    self.reporter.report(
                        "Warning: could not detect source resolution; attempting conversion.",
                    );
                }
                self.convert(&extracted.path, target).await
            }
        }
    }

    async fn convert(&self, input: &Path, target: ConvertTarget) -> Result<JobOutcome, JobError> {
        self.reporter.report(match target {
            ConvertTarget::Mp4 { height: Some(h) } => format!("Converting to {h}p..."),
            ConvertTarget::Mp4 { height: None } => "Converting to MP4...".to_string(),
            ConvertTarget::Mp3 => "Converting to MP3...".to_string(),
            ConvertTarget::Wav => "Converting to WAV...".to_string(),
        });
        let out = self.transcoder.convert(input, target).await?;
        let message = match target {
            ConvertTarget::Mp4 { .. } => format!("Conversion completed: {}", out.display()),
            ConvertTarget::Mp3 | ConvertTarget::Wav => format!("Audio saved: {}", out.display()),
        };
        Ok(JobOutcome::succeeded(out, message))
    }

    /// Converts a file that is already on disk. Shares the session with
    /// downloads.
    pub async fn convert_file(&self, request: FileConvertRequest) -> Result<JobOutcome, JobError> {
        if !request.input.is_file() {
            let e = JobError::Validation(format!(
                "input file does not exist: {}",
                request.input.display()
            ));
            self.reporter.report(e.to_string());
            return Err(e);
        }
        let _permit = self.begin().inspect_err(|e| self.reporter.report(e.to_string()))?;
        self.reporter.report(format!("Selected file: {}", request.input.display()));

        let outcome = match self.convert_existing(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(input = %request.input.display(), "conversion failed: {e}");
                JobOutcome::failed(e.to_string())
            }
        };
        self.reporter.report(&outcome.message);
        Ok(outcome)
    }

    async fn convert_existing(&self, request: &FileConvertRequest) -> Result<JobOutcome, JobError> {
        let target = match request.target {
            FileTarget::Mp3 => ConvertTarget::Mp3,
            FileTarget::Wav => ConvertTarget::Wav,
            FileTarget::Mp4(resolution) => {
                let source_height = self
                    .transcoder
                    .probe_height(&request.input)
                    .await
                    .unwrap_or(0);
                self.reporter
                    .report(format!("Source resolution detected: {source_height}p"));
                // "Best" on an existing file only re-encodes the container
                let Some(target_height) = resolution.height() else {
                    return self.convert(&request.input, ConvertTarget::Mp4 { height: None }).await;
                };
                match plan_video_file(target_height, source_height) {
                    Err(abort) => return Ok(JobOutcome::failed(abort)),
                    Ok(ConversionPlan::Skip(reason)) => {
                        return Ok(JobOutcome::succeeded(request.input.clone(), reason));
                    }
                    Ok(ConversionPlan::Convert(target)) => target,
                }
            }
        };
        self.convert(&request.input, target).await
    }

    /// Metadata only, for the preview labels. Does not take the session.
    pub async fn preview(&self, url: &str) -> Result<VideoInfo, JobError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(JobError::Validation("please paste a URL first".to_string()));
        }
        self.reporter.report("Fetching metadata...");
        let info = self.extractor.probe(url).await?;
        self.reporter.report("Metadata fetched.");
        Ok(info)
    }
}

/// Checks the form before anything external is started. Creates the
/// destination when missing and proves it is writable.
pub fn validate(request: &TaskRequest) -> Result<(), JobError> {
    if request.url().is_empty() {
        return Err(JobError::Validation("please paste a URL first".to_string()));
    }
    ensure_writable(request.destination())
}

fn ensure_writable(dir: &Path) -> Result<(), JobError> {
    if dir.as_os_str().is_empty() {
        return Err(JobError::Validation("no destination folder chosen".to_string()));
    }
    std::fs::create_dir_all(dir).map_err(|e| {
        JobError::Validation(format!("cannot create {}: {e}", dir.display()))
    })?;
    // removed again on drop
    tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| JobError::Validation(format!("{} is not writable: {e}", dir.display())))?;
    Ok(())
}
