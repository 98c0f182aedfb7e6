use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use topicmap_core::{HttpPageFetcher, Pipeline, RunResult, VolumeList};
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::app::config_manager;
use crate::app::terminal::TerminalSettings;
use crate::app::{config_runtime, exit_handler, progress_manager};
use crate::cli::{Command, ConfigCommand};

pub(crate) async fn run_topicmap() -> Result<ProcessExit> {
    let (cli, cli_sources) = config_runtime::parse_cli_with_sources();
    let resolved = config_manager::resolve_config(&cli, &cli_sources)?;

    let default_level = config_runtime::resolve_default_log_level(&resolved.args);
    let force_cli_log_level = config_runtime::should_force_cli_log_level(&cli_sources);
    let terminal = TerminalSettings::detect(&resolved.args);
    terminal.init_tracing(default_level, force_cli_log_level);
    debug!(command = ?cli.command, "CLI arguments parsed");

    if let Command::Config {
        command: ConfigCommand::Show,
    } = &cli.command
    {
        println!("{}", config_manager::render_config(&resolved));
        return Ok(ProcessExit::Success);
    }

    let pipeline = Pipeline::new(resolved.pipeline.clone(), Arc::new(HttpPageFetcher::new()))?;
    info!(data_dir = %pipeline.config().data_dir.display(), command = ?cli.command, "topicmap starting");

    match cli.command {
        Command::Discover => {
            let list = pipeline.discover().await?;
            info!(volumes = list.urls.len(), "Discovery complete");
            Ok(ProcessExit::Success)
        }
        Command::Crawl => Ok(run_crawl(&pipeline, terminal).await?.exit()),
        Command::Merge => {
            let report = pipeline.merge()?;
            Ok(exit_handler::merge_outcome(&report))
        }
        Command::Model => {
            let result = pipeline.model_blocking().await?;
            log_run_result(&result);
            Ok(ProcessExit::Success)
        }
        Command::Run => {
            let list = pipeline.discover().await?;
            info!(volumes = list.urls.len(), "Discovery complete");
            let crawl_exit = match run_crawl(&pipeline, terminal).await? {
                CrawlOutcome::Interrupted => return Ok(ProcessExit::Failure),
                CrawlOutcome::Finished(exit) => exit,
            };
            let merge_exit = exit_handler::merge_outcome(&pipeline.merge()?);
            let result = pipeline.model_blocking().await?;
            log_run_result(&result);
            Ok(worst_of(crawl_exit, merge_exit))
        }
        Command::Config { .. } => Ok(ProcessExit::Success),
    }
}

enum CrawlOutcome {
    Finished(ProcessExit),
    Interrupted,
}

impl CrawlOutcome {
    fn exit(&self) -> ProcessExit {
        match self {
            Self::Finished(exit) => *exit,
            Self::Interrupted => ProcessExit::Failure,
        }
    }
}

async fn run_crawl(pipeline: &Pipeline, terminal: TerminalSettings) -> Result<CrawlOutcome> {
    let volumes = VolumeList::load(&pipeline.paths().volume_list)
        .map(|list| list.urls.len())
        .unwrap_or(0);
    let handle = pipeline.start_crawl()?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupted_signal.store(true, Ordering::SeqCst);
        }
    });

    let (progress_handle, progress_stop) = progress_manager::spawn_progress_ui(
        terminal.show_crawl_progress(volumes),
        handle.stats(),
        volumes,
    );

    let stats = handle.stats();
    let summary = tokio::select! {
        summary = handle.finish() => Some(summary?),
        () = wait_for_interrupt(Arc::clone(&interrupted)) => None,
    };

    progress_stop.store(true, Ordering::SeqCst);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    let Some(summary) = summary else {
        let partial = stats.summary();
        warn!(
            articles_saved = partial.articles_saved,
            "Interrupted. Run again to resume."
        );
        return Ok(CrawlOutcome::Interrupted);
    };

    info!(
        volumes_succeeded = summary.volumes_succeeded,
        volumes_failed = summary.volumes_failed,
        volumes_skipped = summary.volumes_skipped,
        articles_saved = summary.articles_saved,
        articles_failed = summary.articles_failed,
        articles_skipped = summary.articles_skipped,
        retries = summary.retries,
        "Crawl complete"
    );
    Ok(CrawlOutcome::Finished(exit_handler::crawl_outcome(&summary)))
}

async fn wait_for_interrupt(interrupted: Arc<AtomicBool>) {
    while !interrupted.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn log_run_result(result: &RunResult) {
    for (id, cluster) in &result.clusters {
        info!(
            cluster = id,
            size = cluster.size,
            topics = cluster.topics_count,
            coherence = cluster.coherence_score,
            keywords = %cluster.keywords.join(", "),
            "Cluster"
        );
    }
    info!(
        articles = result.total_articles,
        clusters = result.n_clusters,
        silhouette = result.silhouette_score,
        coherence = result.coherence_score,
        "Modelling complete"
    );
}

fn worst_of(a: ProcessExit, b: ProcessExit) -> ProcessExit {
    match (a, b) {
        (ProcessExit::Failure, _) | (_, ProcessExit::Failure) => ProcessExit::Failure,
        (ProcessExit::Partial, _) | (_, ProcessExit::Partial) => ProcessExit::Partial,
        _ => ProcessExit::Success,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worst_of_prefers_failure_then_partial() {
        assert_eq!(worst_of(ProcessExit::Success, ProcessExit::Success), ProcessExit::Success);
        assert_eq!(worst_of(ProcessExit::Partial, ProcessExit::Success), ProcessExit::Partial);
        assert_eq!(worst_of(ProcessExit::Success, ProcessExit::Failure), ProcessExit::Failure);
        assert_eq!(worst_of(ProcessExit::Partial, ProcessExit::Failure), ProcessExit::Failure);
    }
}
