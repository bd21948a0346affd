//! Exit codes and operator-facing error rendering.

use coursefetch_core::RunReport;

use crate::ProcessExit;

/// Maps a finished run to the process exit outcome.
pub(crate) fn determine_exit_outcome(report: &RunReport) -> ProcessExit {
    if report.has_failures() {
        ProcessExit::Partial
    } else {
        ProcessExit::Success
    }
}

/// `[KIND] message` followed by a `Suggestion:` line.
pub(crate) fn render_error(kind: &str, message: &str, suggestion: &str) -> String {
    format!("[{kind}] {message}\n  Suggestion: {suggestion}")
}

pub(crate) fn render_summary(report: &RunReport) -> String {
    format!(
        "Done: {} downloaded, {} already present, {} failed ({} files)",
        report.downloaded,
        report.existing,
        report.failed,
        report.total()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursefetch_core::course::FileFailure;
    use std::path::PathBuf;

    #[test]
    fn test_clean_run_succeeds() {
        let report = RunReport {
            downloaded: 3,
            existing: 2,
            ..RunReport::default()
        };
        assert_eq!(determine_exit_outcome(&report), ProcessExit::Success);
    }

    #[test]
    fn test_empty_run_succeeds() {
        assert_eq!(determine_exit_outcome(&RunReport::default()), ProcessExit::Success);
    }

    #[test]
    fn test_any_failed_file_is_partial() {
        let report = RunReport {
            downloaded: 0,
            existing: 0,
            failed: 1,
            failures: vec![FileFailure {
                path: PathBuf::from("a.mp4"),
                kind: "SERVER_5xx".to_string(),
                message: "HTTP 503".to_string(),
                suggestion: "retry later".to_string(),
            }],
        };
        assert_eq!(determine_exit_outcome(&report), ProcessExit::Partial);
        assert_eq!(ProcessExit::Partial.code(), 2);
    }

    #[test]
    fn test_render_error_layout() {
        assert_eq!(
            render_error("SESSION_MISSING", "no session", "pass --cookie"),
            "[SESSION_MISSING] no session\n  Suggestion: pass --cookie"
        );
    }

    #[test]
    fn test_render_summary_counts() {
        let report = RunReport {
            downloaded: 1,
            existing: 2,
            failed: 0,
            failures: Vec::new(),
        };
        assert_eq!(
            render_summary(&report),
            "Done: 1 downloaded, 2 already present, 0 failed (3 files)"
        );
    }
}
