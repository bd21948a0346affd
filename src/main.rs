//! CLI entry point for coursefetch.

use std::process::ExitCode;

use clap::Parser;

mod app;
mod cli;

use cli::Cli;

/// Process outcome, mapped to the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Every planned file is on disk.
    Success,
    /// The run could not start: no session, bad configuration, missing course.
    Failure,
    /// The run finished but at least one file failed.
    Partial,
}

impl ProcessExit {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Partial => 2,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse first so --help works without logs.
    let cli = Cli::parse();

    match app::runtime::run_coursefetch(cli).await {
        Ok(outcome) => ExitCode::from(outcome.code()),
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::from(ProcessExit::Failure.code())
        }
    }
}
