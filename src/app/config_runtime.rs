//! Merges command-line arguments over the config file.
//!
//! Precedence for every setting: explicit CLI value, then config file value,
//! then the built-in default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use coursefetch_core::auth::LoginIdentity;
use coursefetch_core::config::{FileConfig, default_config_path, read_cookie_file};
use coursefetch_core::{RunOptions, RuntimeConfig, SessionRequest};
use tracing::warn;

use crate::cli::Cli;

/// Everything a run needs, after merging.
#[derive(Debug)]
pub(crate) struct ResolvedSettings {
    pub(crate) runtime: RuntimeConfig,
    pub(crate) base_url: String,
    pub(crate) manifest_dir: PathBuf,
    pub(crate) run: RunOptions,
    pub(crate) session: SessionRequest,
}

/// Config file location: `--config`, else the per-user default.
pub(crate) fn resolve_config_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(path) = &cli.config {
        return Ok(path.clone());
    }
    default_config_path()
        .context("Cannot locate a config directory: set HOME or XDG_CONFIG_HOME, or pass --config")
}

/// Log level used when `RUST_LOG` is unset.
pub(crate) fn resolve_default_log_level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

pub(crate) fn resolve_settings(cli: &Cli, file: &FileConfig) -> Result<ResolvedSettings> {
    let runtime = RuntimeConfig::from_file(file).with_overrides(
        cli.retry_attempts,
        cli.request_timeout_ms,
        cli.read_timeout_ms,
    );

    let Some(base_url) = cli.base_url.clone().or_else(|| file.base_url.clone()) else {
        bail!("No site configured: pass --base-url or set \"base_url\" in the config file");
    };

    let run = RunOptions {
        output_dir: cli
            .output_dir
            .clone()
            .or_else(|| file.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from(".")),
        sample_bytes: cli.sample_bytes.or(file.sample_bytes).unwrap_or(0),
        request_delay: Duration::from_millis(cli.delay_ms.or(file.request_delay_ms).unwrap_or(0)),
        max_retries: runtime.retry_attempts,
        skip_subtitles: cli.no_subtitles,
        skip_attachments: cli.no_attachments,
    };

    let manifest_dir = cli
        .manifest_dir
        .clone()
        .or_else(|| file.manifest_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    let session = SessionRequest {
        override_cookie: resolve_override_cookie(cli, file)?,
        identity: resolve_identity(cli, file),
        force_login: cli.force_login,
    };

    Ok(ResolvedSettings {
        runtime,
        base_url,
        manifest_dir,
        run,
        session,
    })
}

fn resolve_override_cookie(cli: &Cli, file: &FileConfig) -> Result<Option<String>> {
    if let Some(cookie) = &cli.cookie {
        return Ok(Some(cookie.clone()));
    }
    if let Some(path) = &cli.cookie_file {
        return load_cookie_file(path).map(Some);
    }
    if let Some(cookie) = &file.cookie {
        return Ok(Some(cookie.clone()));
    }
    if let Some(path) = &file.cookie_file {
        return load_cookie_file(path).map(Some);
    }
    Ok(None)
}

fn load_cookie_file(path: &Path) -> Result<String> {
    read_cookie_file(path).with_context(|| format!("Cannot use cookie file {}", path.display()))
}

fn resolve_identity(cli: &Cli, file: &FileConfig) -> Option<LoginIdentity> {
    let email = cli.email.as_ref().or(file.email.as_ref());
    let password = cli.password.as_ref().or(file.password.as_ref());
    match (email, password) {
        (Some(email), Some(password)) => {
            Some(LoginIdentity::new(email.as_str(), password.as_str()))
        }
        (Some(_), None) => {
            warn!("email given without a password; password login disabled");
            None
        }
        (None, Some(_)) => {
            warn!("password given without an email; password login disabled");
            None
        }
        (None, None) => None,
    }
}
