//! CLI argument definitions using clap derive macros.

use std::fmt;
use std::path::PathBuf;

use clap::Parser;

/// Download lecture media, subtitles and attachments of one course.
///
/// Sign-in uses, in order: a cookie given on the command line or in the
/// config file, the session saved by the last run, then an email/password
/// login. Interrupted files resume on the next run.
#[derive(Parser)]
#[command(name = "coursefetch")]
#[command(author, version, about)]
pub struct Cli {
    /// Course identifier; names the manifest `<COURSE_ID>.json`
    #[arg(value_name = "COURSE_ID")]
    pub course_id: String,

    /// Config file (default: $XDG_CONFIG_HOME/coursefetch/config.json)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding course manifests (default: current directory)
    #[arg(long, value_name = "DIR")]
    pub manifest_dir: Option<PathBuf>,

    /// Root directory for downloads (default: current directory)
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Download only the first N bytes of each file (0 for whole files)
    #[arg(long, value_name = "N")]
    pub sample_bytes: Option<u64>,

    /// Ignore the saved session and sign in again
    #[arg(long)]
    pub force_login: bool,

    /// Cookie header value to use instead of signing in
    #[arg(long, value_name = "COOKIE")]
    pub cookie: Option<String>,

    /// File whose first non-comment line is a cookie header value
    #[arg(long, value_name = "PATH", conflicts_with = "cookie")]
    pub cookie_file: Option<PathBuf>,

    /// Account email for password login
    #[arg(long, value_name = "EMAIL")]
    pub email: Option<String>,

    /// Account password for password login
    #[arg(long, env = "COURSEFETCH_PASSWORD", hide_env_values = true, value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Site root for login and profile endpoints, e.g. <https://learn.example.com>
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Attempts per request or file (1-20)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..=20))]
    pub retry_attempts: Option<u32>,

    /// Ceiling on connecting and receiving response headers, in milliseconds
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
    pub request_timeout_ms: Option<u64>,

    /// Longest silence tolerated while a body streams, in milliseconds
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
    pub read_timeout_ms: Option<u64>,

    /// Pause between files, in milliseconds
    #[arg(long, value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// Skip subtitle tracks
    #[arg(long)]
    pub no_subtitles: bool,

    /// Skip attachments
    #[arg(long)]
    pub no_attachments: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl fmt::Debug for Cli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Cli")
            .field("course_id", &self.course_id)
            .field("config", &self.config)
            .field("manifest_dir", &self.manifest_dir)
            .field("output_dir", &self.output_dir)
            .field("sample_bytes", &self.sample_bytes)
            .field("force_login", &self.force_login)
            .field("cookie", &redact(&self.cookie))
            .field("cookie_file", &self.cookie_file)
            .field("email", &self.email)
            .field("password", &redact(&self.password))
            .field("base_url", &self.base_url)
            .field("retry_attempts", &self.retry_attempts)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("read_timeout_ms", &self.read_timeout_ms)
            .field("delay_ms", &self.delay_ms)
            .field("no_subtitles", &self.no_subtitles)
            .field("no_attachments", &self.no_attachments)
            .field("verbose", &self.verbose)
            .field("quiet", &self.quiet)
            .finish()
    }
}
