mod args;

use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use prio_runner::executor::Executor;
use prio_runner::jobfile::load_jobs;
use prio_runner::launcher::ShellLauncher;
use prio_runner::queue::OrderedJobList;
use prio_runner::types::report::RunReport;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};

use crate::args::Args;

/// Returned for bad input or configuration, before any job has run.
const EXIT_CONFIG: u8 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logging goes to stderr: stdout belongs to the jobs.
    if args.debug {
        tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .init();
    }

    let jobs = match load_jobs(&args.jobs_file).await {
        Ok(jobs) => OrderedJobList::build(jobs),
        Err(error) => {
            error!(
                %error,
                path = %args.jobs_file.display(),
                "invalid job file"
            );
            return ExitCode::from(EXIT_CONFIG);
        },
    };

    if jobs.is_empty() {
        warn!("job file contains no jobs");
    }

    // On ctrl-c, stop launching new jobs but let running ones finish.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(error) = signal::ctrl_c().await {
                warn!(%error, "something strange with ctrl-c handling!");
                return;
            };
            warn!("interrupted, waiting for running jobs to finish");
            cancel.cancel();
        });
    }

    let started = Instant::now();
    let report = Executor::new(ShellLauncher::new(&args.shell), args.max_jobs)
        .with_cancel(cancel)
        .run(&jobs)
        .await;
    info!(
        elapsed_secs = started.elapsed().as_secs_f64(),
        jobs = report.len(),
        "finished"
    );

    if let Err(error) = finish(&args, &report).await {
        error!(error = ?error, "failed to write report");
        return ExitCode::from(EXIT_CONFIG);
    }

    if report.all_succeeded() || args.ignore_failures {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn finish(args: &Args, report: &RunReport) -> Result<()> {
    let Some(path) = &args.report else {
        return Ok(());
    };

    let yaml = serde_yaml::to_string(report).context("serialising report")?;
    tokio::fs::write(path, yaml)
        .await
        .with_context(|| format!("writing {}", path.display()))?;

    info!(path = %path.display(), "wrote report");

    Ok(())
}
