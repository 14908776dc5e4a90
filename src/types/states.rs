use serde::Serialize;

/// Terminal outcome of a job within a run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JobStatus {
    /// The process exited successfully.
    Succeeded,
    /// The process ran and exited unsuccessfully. `code` is `None` when it
    /// was killed by a signal.
    Failed { code: Option<i32> },
    /// The process could not be started, or waiting on it failed.
    LaunchError { message: String },
    /// Admission was stopped before this job's turn came.
    Skipped,
}

impl JobStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Succeeded)
    }

    pub fn label(&self) -> &'static str {
        use JobStatus::*;

        match self {
            Succeeded => "succeeded",
            Failed { code: _ } => "failed",
            LaunchError { message: _ } => "launch-error",
            Skipped => "skipped",
        }
    }
}

// Serialised as a bare label; the exit code and error message are carried
// as separate fields of JobRecord.
impl Serialize for JobStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.label())
    }
}
