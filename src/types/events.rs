use super::states::JobStatus;

/// Lifecycle notifications emitted by the executor as they happen.
///
/// `position` is the job's place in launch order (0-based). Events for a run
/// arrive in the order the executor changed its state, so replaying
/// `Launched` and `Finished` reproduces the number of running jobs at each
/// step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JobEvent {
    Launched {
        position: usize,
        priority: i64,
        command: String,
    },
    LaunchFailed {
        position: usize,
        error: String,
    },
    Finished {
        position: usize,
        status: JobStatus,
    },
    Skipped {
        position: usize,
    },
}
