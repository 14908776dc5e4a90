//! Launches an ordered list of jobs with a cap on how many run at once.
use std::collections::HashMap;
use std::io;
use std::num::NonZeroUsize;
use std::process::ExitStatus;
use std::time::Instant;

use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::launcher::{JobHandle, Launcher, ShellLauncher};
use crate::queue::OrderedJobList;
use crate::types::events::JobEvent;
use crate::types::job::Job;
use crate::types::report::{JobRecord, RunReport};
use crate::types::states::JobStatus;

/// Runs every job in `jobs` through `/bin/sh` with at most
/// `max_concurrent_jobs` running at once.
pub async fn run(
    jobs: &OrderedJobList,
    max_concurrent_jobs: NonZeroUsize,
) -> RunReport {
    Executor::new(ShellLauncher::default(), max_concurrent_jobs)
        .run(jobs)
        .await
}

/// A job that has been launched and not yet seen to terminate.
struct Running {
    started: Instant,
}

/// A running job whose termination has been observed.
struct Completion {
    position: usize,
    started: Instant,
    finished: Instant,
    result: io::Result<ExitStatus>,
}

/// Jobs currently holding a slot, keyed by launch position.
///
/// Each member's handle is awaited on its own task which reports back over a
/// shared channel, so completions are observed in whatever order they happen.
/// Only the coordinator touches `members`, which keeps insert, remove and
/// size checks atomic with respect to each other.
struct RunningSet {
    members: HashMap<usize, Running>,
    done_tx: mpsc::UnboundedSender<(usize, io::Result<ExitStatus>)>,
    done_rx: mpsc::UnboundedReceiver<(usize, io::Result<ExitStatus>)>,
}

impl RunningSet {
    fn new() -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        Self {
            members: HashMap::new(),
            done_tx,
            done_rx,
        }
    }

    fn len(&self) -> usize {
        self.members.len()
    }

    fn insert(&mut self, position: usize, handle: JobHandle) {
        self.members.insert(
            position,
            Running {
                started: Instant::now(),
            },
        );

        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let result = handle.await;
            // The coordinator outlives every member, so this only fails if
            // the run itself was dropped mid-way.
            let _ = done_tx.send((position, result));
        });
    }

    /// Waits for any member to terminate and removes it. Returns `None` when
    /// the set is empty.
    async fn reap(&mut self) -> Option<Completion> {
        if self.members.is_empty() {
            return None;
        }

        let (position, result) = self.done_rx.recv().await?;
        let running = self.members.remove(&position)?;

        Some(Completion {
            position,
            started: running.started,
            finished: Instant::now(),
            result,
        })
    }
}

/// Bounded executor over a `Launcher`.
///
/// Jobs are launched strictly in list order. A job failing, or failing to
/// launch, never stops later jobs from running. There is no timeout: a job
/// that never exits keeps its slot for the rest of the run.
pub struct Executor<L> {
    launcher: L,
    max_concurrent_jobs: NonZeroUsize,
    events: Option<mpsc::UnboundedSender<JobEvent>>,
    cancel: Option<CancellationToken>,
}

impl<L: Launcher> Executor<L> {
    pub fn new(launcher: L, max_concurrent_jobs: NonZeroUsize) -> Self {
        Self {
            launcher,
            max_concurrent_jobs,
            events: None,
            cancel: None,
        }
    }

    /// Sends a `JobEvent` for every state change during `run`.
    pub fn with_events(
        mut self,
        events: mpsc::UnboundedSender<JobEvent>,
    ) -> Self {
        self.events = Some(events);
        self
    }

    /// Stops launching new jobs once `cancel` fires. Jobs already running
    /// are left alone and still waited for; the rest are reported skipped.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Launches every job once, in order, and returns after all launched
    /// jobs have terminated.
    #[instrument(
        name = "run",
        skip_all,
        fields(jobs = jobs.len(), max = self.max_concurrent_jobs.get())
    )]
    pub async fn run(&self, jobs: &OrderedJobList) -> RunReport {
        let run_start = Instant::now();
        let mut records: Vec<Option<JobRecord>> = vec![None; jobs.len()];
        let mut running = RunningSet::new();
        let mut next = 0;

        'admit: while next < jobs.len() {
            while running.len() >= self.max_concurrent_jobs.get() {
                debug!(running = running.len(), "at capacity, waiting");

                let done = select! {
                    biased;
                    done = running.reap() => done,
                    _ = self.cancelled() => None,
                };

                match done {
                    Some(done) => {
                        let job = &jobs[done.position];
                        self.complete(job, done, run_start, &mut records)
                    },
                    None => break 'admit,
                }
            }

            if self.is_cancelled() {
                break;
            }

            let job = &jobs[next];
            match self.launcher.launch(job) {
                Ok(handle) => {
                    running.insert(next, handle);
                    info!(
                        position = next,
                        priority = job.priority,
                        command = %job.command,
                        "launched job"
                    );
                    self.emit(JobEvent::Launched {
                        position: next,
                        priority: job.priority,
                        command: job.command.clone(),
                    });
                },
                Err(error) => {
                    warn!(
                        position = next,
                        priority = job.priority,
                        command = %job.command,
                        %error,
                        "failed to launch job"
                    );
                    self.emit(JobEvent::LaunchFailed {
                        position: next,
                        error: error.to_string(),
                    });
                    records[next] = Some(JobRecord::new(
                        next,
                        job,
                        JobStatus::LaunchError {
                            message: error.to_string(),
                        },
                    ));
                },
            }

            next += 1;
        }

        if next < jobs.len() {
            warn!(skipped = jobs.len() - next, "admission stopped");
        }
        for (position, job) in jobs.iter().enumerate().skip(next) {
            self.emit(JobEvent::Skipped { position });
            records[position] =
                Some(JobRecord::new(position, job, JobStatus::Skipped));
        }

        debug!(running = running.len(), "all jobs admitted, draining");
        while let Some(done) = running.reap().await {
            self.complete(&jobs[done.position], done, run_start, &mut records);
        }

        let report = RunReport {
            jobs: records.into_iter().flatten().collect(),
            elapsed_ms: run_start
                .elapsed()
                .as_millis()
                .try_into()
                .unwrap_or(u64::MAX),
        };

        info!(
            elapsed_ms = report.elapsed_ms,
            succeeded = report.count("succeeded"),
            failed = report.count("failed"),
            launch_errors = report.count("launch-error"),
            skipped = report.count("skipped"),
            "run complete"
        );

        report
    }

    fn complete(
        &self,
        job: &Job,
        done: Completion,
        run_start: Instant,
        records: &mut [Option<JobRecord>],
    ) {
        let status = match done.result {
            Ok(exit) if exit.success() => JobStatus::Succeeded,
            Ok(exit) => JobStatus::Failed { code: exit.code() },
            Err(error) => {
                warn!(position = done.position, %error, "lost track of job");
                JobStatus::Failed { code: None }
            },
        };

        let duration = done.finished - done.started;
        if status.is_success() {
            info!(
                position = done.position,
                command = %job.command,
                ?duration,
                "job succeeded"
            );
        } else {
            warn!(
                position = done.position,
                command = %job.command,
                ?duration,
                ?status,
                "job failed"
            );
        }

        self.emit(JobEvent::Finished {
            position: done.position,
            status: status.clone(),
        });

        records[done.position] = Some(
            JobRecord::new(done.position, job, status)
                .timed(done.started - run_start, duration),
        );
    }

    fn emit(&self, event: JobEvent) {
        if let Some(events) = &self.events {
            // Nobody listening is fine.
            let _ = events.send(event);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }

    async fn cancelled(&self) {
        match &self.cancel {
            Some(cancel) => cancel.cancelled().await,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::types::job::RawJob;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn jobs(raw: &[(i64, &str)]) -> OrderedJobList {
        raw.iter().map(|(p, c)| RawJob::new(*p, *c)).collect()
    }

    /// Runs `list` on the shell and returns the report with every event.
    async fn run_with_events<L: Launcher>(
        launcher: L,
        list: &OrderedJobList,
        max: usize,
    ) -> (RunReport, Vec<JobEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let report = Executor::new(launcher, nz(max))
            .with_events(tx)
            .run(list)
            .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        (report, events)
    }

    fn launched(events: &[JobEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                JobEvent::Launched { command, .. } => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// Replays the events, returning the most jobs ever running at once.
    fn peak_running(events: &[JobEvent]) -> usize {
        let mut running = 0usize;
        let mut peak = 0;
        for e in events {
            match e {
                JobEvent::Launched { .. } => running += 1,
                JobEvent::Finished { .. } => running -= 1,
                _ => {},
            }
            peak = peak.max(running);
        }
        assert_eq!(running, 0, "run returned with jobs outstanding");
        peak
    }

    fn index_of(events: &[JobEvent], wanted: &JobEvent) -> usize {
        events.iter().position(|e| e == wanted).unwrap()
    }

    /// Fails to launch one particular command, otherwise defers to the shell.
    struct RefuseCommand(&'static str);

    impl Launcher for RefuseCommand {
        fn launch(&self, job: &Job) -> io::Result<JobHandle> {
            if job.command == self.0 {
                Err(io::Error::new(io::ErrorKind::NotFound, "refused"))
            } else {
                ShellLauncher::default().launch(job)
            }
        }
    }

    #[tokio::test]
    async fn test_launches_in_priority_order() {
        let list = jobs(&[(3, "echo c"), (1, "echo a"), (2, "echo b")]);

        let (report, events) =
            run_with_events(ShellLauncher::default(), &list, 3).await;

        assert_eq!(launched(&events), ["echo a", "echo b", "echo c"]);
        assert_eq!(report.len(), 3);
        assert!(report.all_succeeded());
        assert_eq!(
            report.jobs.iter().map(|j| j.sequence_index).collect::<Vec<_>>(),
            [1, 2, 0]
        );
        for record in &report.jobs {
            assert_eq!(record.exit_code, Some(0));
            assert!(record.started_ms.is_some());
            assert!(record.duration_ms.is_some());
        }
    }

    #[tokio::test]
    async fn test_single_slot_runs_sequentially() {
        let list =
            jobs(&[(1, "sleep 0.2"), (1, "sleep 0.1"), (2, "echo x")]);

        let start = Instant::now();
        let (report, events) =
            run_with_events(ShellLauncher::default(), &list, 1).await;

        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(report.all_succeeded());
        assert_eq!(launched(&events), ["sleep 0.2", "sleep 0.1", "echo x"]);
        assert_eq!(peak_running(&events), 1);

        // With one slot, every launch is followed by its own completion.
        for (i, pair) in events.chunks(2).enumerate() {
            assert!(matches!(
                pair[0],
                JobEvent::Launched { position, .. } if position == i
            ));
            assert!(matches!(
                pair[1],
                JobEvent::Finished { position, .. } if position == i
            ));
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_run() {
        let list = jobs(&[(1, "false"), (2, "echo ok"), (3, "exit 7")]);

        let (report, events) =
            run_with_events(ShellLauncher::default(), &list, 2).await;

        // Both slots fill before anything can complete.
        assert!(matches!(events[0], JobEvent::Launched { position: 0, .. }));
        assert!(matches!(events[1], JobEvent::Launched { position: 1, .. }));

        assert_eq!(report.jobs[0].status, JobStatus::Failed { code: Some(1) });
        assert_eq!(report.jobs[1].status, JobStatus::Succeeded);
        assert_eq!(report.jobs[2].status, JobStatus::Failed { code: Some(7) });
        assert_eq!(report.jobs[2].exit_code, Some(7));
        assert!(!report.all_succeeded());
    }

    #[tokio::test]
    async fn test_empty_list() {
        let start = Instant::now();
        let report = run(&OrderedJobList::default(), nz(5)).await;

        assert!(report.is_empty());
        assert!(report.all_succeeded());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_cap_is_never_exceeded() {
        let list = jobs(&[
            (1, "sleep 0.3"),
            (2, "sleep 0.3"),
            (3, "sleep 0.3"),
            (4, "sleep 0.3"),
            (5, "sleep 0.3"),
        ]);

        let start = Instant::now();
        let (report, events) =
            run_with_events(ShellLauncher::default(), &list, 2).await;
        let elapsed = start.elapsed();

        assert_eq!(peak_running(&events), 2);
        assert!(report.all_succeeded());
        // ceil(5 / 2) rounds of 0.3s, well short of 5 sequential runs.
        assert!(elapsed >= Duration::from_millis(900));
        assert!(elapsed < Duration::from_millis(1400));
    }

    #[tokio::test]
    async fn test_cap_above_and_at_job_count() {
        for max in [3, 10] {
            let list =
                jobs(&[(1, "sleep 0.1"), (2, "sleep 0.1"), (3, "sleep 0.1")]);

            let (report, events) =
                run_with_events(ShellLauncher::default(), &list, max).await;

            // Everything launches up front.
            assert!(events[..3]
                .iter()
                .all(|e| matches!(e, JobEvent::Launched { .. })));
            assert_eq!(peak_running(&events), 3);
            assert!(report.all_succeeded());
        }
    }

    #[tokio::test]
    async fn test_out_of_order_completion_frees_slot() {
        let list = jobs(&[(1, "sleep 0.4"), (2, "sleep 0.05"), (3, "echo c")]);

        let (report, events) =
            run_with_events(ShellLauncher::default(), &list, 2).await;

        assert!(report.all_succeeded());

        let short_done = index_of(
            &events,
            &JobEvent::Finished {
                position: 1,
                status: JobStatus::Succeeded,
            },
        );
        let third_launch = events
            .iter()
            .position(|e| matches!(e, JobEvent::Launched { position: 2, .. }))
            .unwrap();
        let long_done = index_of(
            &events,
            &JobEvent::Finished {
                position: 0,
                status: JobStatus::Succeeded,
            },
        );

        assert!(short_done < third_launch);
        assert!(third_launch < long_done);
    }

    #[tokio::test]
    async fn test_launch_error_takes_no_slot() {
        let list =
            jobs(&[(1, "bad"), (2, "sleep 0.05"), (3, "bad"), (4, "echo d")]);

        let (report, events) =
            run_with_events(RefuseCommand("bad"), &list, 1).await;

        assert_eq!(launched(&events), ["sleep 0.05", "echo d"]);
        assert_eq!(peak_running(&events), 1);
        assert_eq!(report.count("launch-error"), 2);
        assert_eq!(report.count("succeeded"), 2);
        assert_eq!(report.jobs[0].error.as_deref(), Some("refused"));
        assert!(matches!(
            events[0],
            JobEvent::LaunchFailed { position: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_unlaunchable_shell() {
        let list = jobs(&[(1, "true"), (2, "true")]);

        let (report, events) =
            run_with_events(ShellLauncher::new("/nonexistent/sh"), &list, 1)
                .await;

        assert!(launched(&events).is_empty());
        assert_eq!(report.count("launch-error"), 2);
        assert!(!report.all_succeeded());
    }

    #[tokio::test]
    async fn test_cancel_before_run_skips_everything() {
        let list = jobs(&[(1, "true"), (2, "true")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = Executor::new(ShellLauncher::default(), nz(2))
            .with_cancel(cancel)
            .run(&list)
            .await;

        assert_eq!(report.count("skipped"), 2);
    }

    #[tokio::test]
    async fn test_cancel_drains_running_jobs() {
        let list = jobs(&[(1, "sleep 0.3"), (2, "echo a"), (3, "echo b")]);
        let cancel = CancellationToken::new();

        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                cancel.cancel();
            });
        }

        let report = Executor::new(ShellLauncher::default(), nz(1))
            .with_cancel(cancel)
            .run(&list)
            .await;

        // The running job is waited for, not killed.
        assert_eq!(report.jobs[0].status, JobStatus::Succeeded);
        assert_eq!(report.jobs[1].status, JobStatus::Skipped);
        assert_eq!(report.jobs[2].status, JobStatus::Skipped);
    }

    #[tokio::test]
    async fn test_same_order_every_time() {
        let list = jobs(&[
            (2, "echo b"),
            (1, "echo a1"),
            (1, "echo a2"),
            (0, "echo z"),
        ]);

        let sh = ShellLauncher::default();
        let (_, first) = run_with_events(sh.clone(), &list, 1).await;
        let (_, second) = run_with_events(sh, &list, 1).await;

        assert_eq!(first, second);
        assert_eq!(
            launched(&first),
            ["echo z", "echo a1", "echo a2", "echo b"]
        );
    }
}
