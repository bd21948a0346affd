//! Per-file progress bars driven by transfer events.

use std::sync::Mutex;
use std::time::Duration;

use coursefetch_core::download::{
    DownloadError, DownloadTask, ProgressEvent, RetryEvent, TransferObserver, TransferStatus,
};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::warn;

const BAR_TEMPLATE: &str =
    "{msg:30!} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {binary_bytes_per_sec} ETA {eta}";
const SPINNER_TEMPLATE: &str = "{spinner} {msg:30!} {bytes} {binary_bytes_per_sec}";

/// Draws one bar for the file in flight; retries print above it.
pub(crate) struct ProgressObserver {
    enabled: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressObserver {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            bar: Mutex::new(None),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        if let Ok(mut guard) = self.bar.lock() {
            f(&mut guard);
        }
    }
}

fn file_label(task: &DownloadTask) -> String {
    task.final_path
        .file_name()
        .map_or_else(|| task.source_url.clone(), |name| name.to_string_lossy().into_owned())
}

fn new_bar(label: String, resume_offset: u64) -> ProgressBar {
    let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
    bar.set_style(
        ProgressStyle::with_template(SPINNER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(label);
    bar.set_position(resume_offset);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

impl TransferObserver for ProgressObserver {
    fn on_retry(&self, event: &RetryEvent) {
        warn!(
            url = %event.url,
            attempt = event.failed_attempt,
            max_attempts = event.max_attempts,
            delay_ms = event.delay.as_millis(),
            reason = %event.reason,
            "retrying"
        );
        if !self.enabled {
            return;
        }
        let line = format!(
            "retry {}/{} in {:.1}s: {}",
            event.failed_attempt,
            event.max_attempts,
            event.delay.as_secs_f64(),
            event.reason
        );
        self.with_bar(|bar| match bar {
            Some(bar) => bar.println(line),
            None => eprintln!("{line}"),
        });
    }

    fn on_transfer_start(&self, task: &DownloadTask, resume_offset: u64) {
        if !self.enabled {
            return;
        }
        let label = file_label(task);
        self.with_bar(|slot| {
            if let Some(previous) = slot.take() {
                previous.finish_and_clear();
            }
            *slot = Some(new_bar(label, resume_offset));
        });
    }

    fn on_progress(&self, event: &ProgressEvent) {
        if !self.enabled {
            return;
        }
        self.with_bar(|slot| {
            let Some(bar) = slot else { return };
            if let Some(total) = event.expected_total
                && bar.length() != Some(total)
            {
                bar.set_length(total);
                bar.set_style(
                    ProgressStyle::with_template(BAR_TEMPLATE)
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=> "),
                );
            }
            bar.set_position(event.transferred);
        });
    }

    fn on_transfer_end(
        &self,
        task: &DownloadTask,
        outcome: Result<TransferStatus, &DownloadError>,
    ) {
        if !self.enabled {
            return;
        }
        let line = match outcome {
            Ok(status) => format!("{:<10} {}", status.as_str(), task.final_path.display()),
            Err(error) => format!(
                "{:<10} {} [{}]",
                "failed",
                task.final_path.display(),
                error.kind()
            ),
        };
        self.with_bar(|slot| {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        });
        eprintln!("{line}");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn task() -> DownloadTask {
        DownloadTask::new("https://cdn.example.com/v/a.mp4", PathBuf::from("/out/01 - Intro.mp4"))
    }

    #[test]
    fn test_file_label_uses_target_name() {
        assert_eq!(file_label(&task()), "01 - Intro.mp4");
    }

    #[test]
    fn test_disabled_observer_never_creates_a_bar() {
        let observer = ProgressObserver::new(false);
        observer.on_transfer_start(&task(), 0);
        assert!(observer.bar.lock().unwrap().is_none());
    }

    #[test]
    fn test_enabled_observer_tracks_one_bar_per_file() {
        let observer = ProgressObserver::new(true);
        observer.on_transfer_start(&task(), 100);
        {
            let guard = observer.bar.lock().unwrap();
            let bar = guard.as_ref().unwrap();
            bar.set_draw_target(ProgressDrawTarget::hidden());
            assert_eq!(bar.position(), 100);
        }

        observer.on_progress(&ProgressEvent {
            url: "https://cdn.example.com/v/a.mp4".to_string(),
            transferred: 600,
            expected_total: Some(1000),
            bytes_per_sec: 50.0,
            eta: None,
        });
        {
            let guard = observer.bar.lock().unwrap();
            let bar = guard.as_ref().unwrap();
            assert_eq!(bar.length(), Some(1000));
            assert_eq!(bar.position(), 600);
        }

        observer.on_transfer_end(&task(), Ok(TransferStatus::Downloaded));
        assert!(observer.bar.lock().unwrap().is_none());
    }
}
