use std::time::Duration;

use serde::Serialize;

use super::job::Job;
use super::states::JobStatus;

/// Outcome of one job, as recorded in a `RunReport`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobRecord {
    /// 0-based position in launch order
    pub position: usize,
    /// 0-based position in the job file
    pub sequence_index: usize,
    pub priority: i64,
    pub command: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// milliseconds from the start of the run until launch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_ms: Option<u64>,
    /// milliseconds from launch until completion was observed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl JobRecord {
    pub(crate) fn new(position: usize, job: &Job, status: JobStatus) -> Self {
        let (exit_code, error) = match &status {
            JobStatus::Succeeded => (Some(0), None),
            JobStatus::Failed { code } => (*code, None),
            JobStatus::LaunchError { message } => (None, Some(message.clone())),
            JobStatus::Skipped => (None, None),
        };

        Self {
            position,
            sequence_index: job.sequence_index,
            priority: job.priority,
            command: job.command.clone(),
            status,
            exit_code,
            error,
            started_ms: None,
            duration_ms: None,
        }
    }

    pub(crate) fn timed(
        mut self,
        started: Duration,
        duration: Duration,
    ) -> Self {
        self.started_ms = Some(millis(started));
        self.duration_ms = Some(millis(duration));
        self
    }
}

/// Final summary of a run, one record per job in launch order.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunReport {
    pub jobs: Vec<JobRecord>,
    pub elapsed_ms: u64,
}

impl RunReport {
    /// True when every job succeeded. An empty run counts as success.
    pub fn all_succeeded(&self) -> bool {
        self.jobs.iter().all(|j| j.status.is_success())
    }

    /// Number of jobs whose status carries the given label, e.g. "failed".
    pub fn count(&self, label: &str) -> usize {
        self.jobs.iter().filter(|j| j.status.label() == label).count()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis().try_into().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(sequence_index: usize) -> Job {
        Job {
            priority: 1,
            command: "true".into(),
            sequence_index,
        }
    }

    #[test]
    fn test_report_yaml() {
        let report = RunReport {
            jobs: vec![
                JobRecord::new(0, &job(1), JobStatus::Succeeded).timed(
                    Duration::from_millis(3),
                    Duration::from_millis(1500),
                ),
                JobRecord::new(
                    1,
                    &job(0),
                    JobStatus::LaunchError {
                        message: "no such file".into(),
                    },
                ),
            ],
            elapsed_ms: 1503,
        };

        let yaml = serde_yaml::to_string(&report).unwrap();

        assert!(yaml.contains("status: succeeded"));
        assert!(yaml.contains("status: launch-error"));
        assert!(yaml.contains("error: no such file"));
        assert!(yaml.contains("started-ms: 3"));
        assert!(yaml.contains("duration-ms: 1500"));
        assert!(yaml.contains("elapsed-ms: 1503"));
    }

    #[test]
    fn test_counts() {
        let report = RunReport {
            jobs: vec![
                JobRecord::new(0, &job(0), JobStatus::Succeeded),
                JobRecord::new(1, &job(1), JobStatus::Failed { code: Some(1) }),
                JobRecord::new(2, &job(2), JobStatus::Failed { code: None }),
            ],
            elapsed_ms: 0,
        };

        assert!(!report.all_succeeded());
        assert_eq!(report.count("failed"), 2);
        assert_eq!(report.count("succeeded"), 1);
        assert_eq!(report.jobs[1].exit_code, Some(1));
        assert!(RunReport::default().all_succeeded());
    }
}
