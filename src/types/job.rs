/// A `(priority, command)` pair as read from a job file, before ordering.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawJob {
    pub priority: i64,
    pub command: String,
}

impl RawJob {
    pub fn new(priority: i64, command: impl Into<String>) -> Self {
        Self {
            priority,
            command: command.into(),
        }
    }
}

/// One unit of work. Immutable once built by the queue builder.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Job {
    /// Smaller runs earlier. Not unique, may be negative.
    pub priority: i64,
    /// Passed to the launcher unparsed.
    pub command: String,
    /// 0-based position in the input, used to break priority ties.
    pub sequence_index: usize,
}
