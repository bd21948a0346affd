//! Sequential course download loop.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, instrument, warn};

use super::{Chapter, CourseCatalog, LectureUnit, RunError};
use crate::auth::Session;
use crate::download::{DEFAULT_RETRY_ATTEMPTS, DownloadTask, TransferEngine, TransferStatus};
use crate::filename::{extension_from_url, indexed_name, sanitize_filename};

const DEFAULT_MEDIA_EXTENSION: &str = ".mp4";
const DEFAULT_SUBTITLE_EXTENSION: &str = ".vtt";
const DEFAULT_ATTACHMENT_EXTENSION: &str = ".bin";

/// Knobs for one course run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Root directory; the course gets a subdirectory.
    pub output_dir: PathBuf,
    /// Sample byte cap per file; 0 downloads whole files.
    pub sample_bytes: u64,
    /// Pause between two files.
    pub request_delay: Duration,
    /// Attempts per file.
    pub max_retries: u32,
    /// Skip subtitle tracks.
    pub skip_subtitles: bool,
    /// Skip attachments.
    pub skip_attachments: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            sample_bytes: 0,
            request_delay: Duration::ZERO,
            max_retries: DEFAULT_RETRY_ATTEMPTS,
            skip_subtitles: false,
            skip_attachments: false,
        }
    }
}

/// One file that could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    /// Target path.
    pub path: PathBuf,
    /// Stable error kind.
    pub kind: String,
    /// Human-readable cause.
    pub message: String,
    /// Remediation hint.
    pub suggestion: String,
}

/// Totals for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Files transferred this run.
    pub downloaded: usize,
    /// Files that were already complete.
    pub existing: usize,
    /// Files that failed after retries.
    pub failed: usize,
    /// Details for each failed file.
    pub failures: Vec<FileFailure>,
}

impl RunReport {
    /// Files considered.
    #[must_use]
    pub fn total(&self) -> usize {
        self.downloaded + self.existing + self.failed
    }

    /// True when at least one file failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Drives a course's files through the transfer engine, one at a time.
#[derive(Debug, Clone)]
pub struct CourseRunner {
    engine: TransferEngine,
    options: RunOptions,
}

impl CourseRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(engine: TransferEngine, options: RunOptions) -> Self {
        Self { engine, options }
    }

    /// Run options.
    #[must_use]
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Downloads every planned file of `course_id`.
    ///
    /// Per-file failures are logged and counted; they never stop the run.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Unauthenticated`] before any request when the
    /// session is not verified, and [`RunError::Catalog`] when the chapter
    /// list cannot be loaded.
    #[instrument(skip(self, session, catalog))]
    pub async fn run(
        &self,
        session: &Session,
        catalog: &dyn CourseCatalog,
        course_id: &str,
    ) -> Result<RunReport, RunError> {
        if !session.is_authenticated() {
            return Err(RunError::Unauthenticated);
        }

        let chapters = catalog.chapters(course_id).await?;
        let tasks = self.plan(course_id, &chapters);
        info!(chapters = chapters.len(), files = tasks.len(), "starting course");

        let mut report = RunReport::default();
        for (index, task) in tasks.iter().enumerate() {
            if index > 0 && !self.options.request_delay.is_zero() {
                tokio::time::sleep(self.options.request_delay).await;
            }

            match self.engine.download(session, task, self.options.max_retries).await {
                Ok(TransferStatus::Downloaded) => report.downloaded += 1,
                Ok(TransferStatus::Exists) => report.existing += 1,
                Err(error) => {
                    warn!(
                        path = %task.final_path.display(),
                        kind = %error.kind(),
                        error = %error,
                        "file failed; continuing"
                    );
                    report.failed += 1;
                    report.failures.push(FileFailure {
                        path: task.final_path.clone(),
                        kind: error.kind().into_owned(),
                        message: error.to_string(),
                        suggestion: error.suggestion().to_string(),
                    });
                }
            }
        }

        info!(
            downloaded = report.downloaded,
            existing = report.existing,
            failed = report.failed,
            "course finished"
        );
        Ok(report)
    }

    /// Orders every file of the course: per unit, media, then subtitles,
    /// then attachments.
    ///
    /// Paths are `<output>/<course>/<NN - chapter>/<NN - unit><ext>`.
    #[must_use]
    pub fn plan(&self, course_id: &str, chapters: &[Chapter]) -> Vec<DownloadTask> {
        let course_dir = self.options.output_dir.join(sanitize_filename(course_id));
        let mut tasks = Vec::new();

        for (chapter_index, chapter) in chapters.iter().enumerate() {
            let chapter_dir = course_dir.join(indexed_name(chapter_index + 1, &chapter.title));
            for (unit_index, unit) in chapter.units.iter().enumerate() {
                let stem = indexed_name(unit_index + 1, &unit.title);
                self.plan_unit(&chapter_dir, &stem, unit, &mut tasks);
            }
        }
        tasks
    }

    fn plan_unit(
        &self,
        dir: &Path,
        stem: &str,
        unit: &LectureUnit,
        tasks: &mut Vec<DownloadTask>,
    ) {
        let mut push = |url: &str, name: String| {
            let mut task = DownloadTask::new(url, dir.join(name))
                .with_sample_cap(self.options.sample_bytes);
            if let Some(referer) = &unit.page_url {
                task = task.with_referer(referer.as_str());
            }
            tasks.push(task);
        };

        if let Some(media) = &unit.media {
            let ext = extension_from_url(media)
                .unwrap_or_else(|| DEFAULT_MEDIA_EXTENSION.to_string());
            push(media, format!("{stem}{ext}"));
        }

        if !self.options.skip_subtitles {
            for subtitle in &unit.subtitles {
                let ext = extension_from_url(&subtitle.url)
                    .unwrap_or_else(|| DEFAULT_SUBTITLE_EXTENSION.to_string());
                let language = sanitize_filename(&subtitle.language);
                push(&subtitle.url, format!("{stem}.{language}{ext}"));
            }
        }

        if !self.options.skip_attachments {
            for attachment in &unit.attachments {
                let ext = extension_from_url(&attachment.url)
                    .unwrap_or_else(|| DEFAULT_ATTACHMENT_EXTENSION.to_string());
                let label = attachment
                    .name
                    .as_deref()
                    .map(|name| name.strip_suffix(ext.as_str()).unwrap_or(name))
                    .map_or_else(|| attachment_label_from_url(&attachment.url), sanitize_filename);
                push(&attachment.url, format!("{stem} - {label}{ext}"));
            }
        }
    }
}

fn attachment_label_from_url(url: &str) -> String {
    let last = url
        .split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .unwrap_or_default();
    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |s| s.into_owned());
    let stem = decoded.rsplit_once('.').map_or(decoded.as_str(), |(stem, _)| stem);
    sanitize_filename(stem)
}
