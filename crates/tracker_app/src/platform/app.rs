use std::io;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracker_core::format_elapsed;
use tracker_engine::{
    PollTransport, PushTransport, ReqwestStatusFetcher, Tracker, TrackerOutcome, WsConnector,
};
use tracker_logging::{parse_level, tracker_info};

use super::config::{AppConfig, Cli};
use super::logging;
use super::presenter::TerminalPresenter;

/// Runs one observation and returns the process exit code.
pub fn run_app() -> anyhow::Result<i32> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    }
    .apply_cli(&cli);
    config.validate()?;

    logging::initialize(config.log, parse_level(&config.log_level));
    tracker_info!(
        "Tracking job {} via {} (push: {})",
        cli.job_id,
        config.server_url,
        config.push_url.as_deref().unwrap_or("disabled")
    );

    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    let outcome = runtime.block_on(observe(cli.job_id.clone(), &config))?;

    match outcome {
        TrackerOutcome::Completed { view, .. } => {
            tracker_info!(
                "Job {} completed at {:.0}% (push {:?})",
                view.job_id,
                view.overall_progress,
                view.push_health
            );
            Ok(0)
        }
        TrackerOutcome::Failed { view, .. } => {
            tracker_info!(
                "Job {} failed: {} (push {:?})",
                view.job_id,
                view.status_line,
                view.push_health
            );
            Ok(1)
        }
    }
}

async fn observe(job_id: String, config: &AppConfig) -> anyhow::Result<TrackerOutcome> {
    let poll_settings = config.poll_settings();
    let fetcher = ReqwestStatusFetcher::new(&config.server_url, &poll_settings)
        .context("building status fetcher")?;

    let results_url = fetcher.results_url(&job_id).to_string();
    let presenter = TerminalPresenter::new(io::stdout()).with_results_url(results_url);
    let mut tracker = Tracker::new(job_id, presenter, config.tracker_settings()).with_transport(
        Box::new(PollTransport::new(Arc::new(fetcher), poll_settings)),
    );
    if let Some(push_url) = &config.push_url {
        let push_settings = config.push_settings();
        let connector = WsConnector::new(push_url.clone(), &push_settings);
        tracker = tracker.with_transport(Box::new(PushTransport::new(
            Arc::new(connector),
            push_settings,
        )));
    }

    let started = std::time::Instant::now();
    let (outcome, _presenter) = tracker.run().await;
    tracker_info!("Observation ended after {}", format_elapsed(started.elapsed()));
    Ok(outcome)
}
