use std::sync::Arc;

use anyhow::{Context, Result};
use coursefetch_core::auth::SessionManager;
use coursefetch_core::config::ConfigStore;
use coursefetch_core::download::TransferObserver;
use coursefetch_core::{CourseRunner, ManifestCatalog, RequestClient, SiteEndpoints, TransferEngine};
use tracing::{debug, info};

use crate::ProcessExit;
use crate::app::{config_runtime, exit_handler, progress::ProgressObserver, terminal};
use crate::cli::Cli;

pub(crate) async fn run_coursefetch(cli: Cli) -> Result<ProcessExit> {
    terminal::init_tracing(config_runtime::resolve_default_log_level(cli.verbose, cli.quiet));
    debug!(?cli, "CLI arguments parsed");

    let config_path = config_runtime::resolve_config_path(&cli)?;
    let mut store = ConfigStore::open(&config_path)
        .with_context(|| format!("Cannot load config {}", config_path.display()))?;
    let settings = config_runtime::resolve_settings(&cli, store.config())?;
    info!(course = %cli.course_id, config = %config_path.display(), "coursefetch starting");

    let observer: Arc<dyn TransferObserver> =
        Arc::new(ProgressObserver::new(terminal::progress_enabled(cli.quiet)));
    let client = RequestClient::new(settings.runtime.retry_policy()).with_observer(observer);
    let endpoints = SiteEndpoints::from_base_url(&settings.base_url)
        .with_context(|| format!("Invalid base URL '{}'", settings.base_url))?;
    let manager =
        SessionManager::new(client.clone(), endpoints, settings.runtime.request_options());

    let session = match manager.establish(settings.session, &mut store).await {
        Ok(session) => session,
        Err(error) => {
            eprintln!(
                "{}",
                exit_handler::render_error(error.kind(), &error.to_string(), error.suggestion())
            );
            return Ok(ProcessExit::Failure);
        }
    };

    let engine = TransferEngine::new(client, settings.runtime.request_options());
    let runner = CourseRunner::new(engine, settings.run);
    let catalog = ManifestCatalog::new(settings.manifest_dir);

    let report = match runner.run(&session, &catalog, &cli.course_id).await {
        Ok(report) => report,
        Err(error) => {
            eprintln!(
                "{}",
                exit_handler::render_error(error.kind(), &error.to_string(), error.suggestion())
            );
            return Ok(ProcessExit::Failure);
        }
    };

    for failure in &report.failures {
        eprintln!(
            "{}",
            exit_handler::render_error(
                &failure.kind,
                &format!("{}: {}", failure.path.display(), failure.message),
                &failure.suggestion,
            )
        );
    }
    if !cli.quiet {
        eprintln!("{}", exit_handler::render_summary(&report));
    }

    Ok(exit_handler::determine_exit_outcome(&report))
}
