//! Builds the launch order for a run.
use std::ops::Deref;

use itertools::Itertools;

use crate::types::job::{Job, RawJob};

/// Jobs sorted by `(priority, sequence_index)` ascending. Never mutated once
/// built.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OrderedJobList {
    jobs: Vec<Job>,
}

impl OrderedJobList {
    /// Numbers `raw` in input order, then sorts stably by priority so jobs
    /// sharing a priority launch in the order they were given.
    pub fn build(raw: impl IntoIterator<Item = RawJob>) -> Self {
        let jobs = raw
            .into_iter()
            .enumerate()
            .map(|(sequence_index, r)| Job {
                priority: r.priority,
                command: r.command,
                sequence_index,
            })
            .sorted_by_key(|j| (j.priority, j.sequence_index))
            .collect();

        Self { jobs }
    }
}

impl Deref for OrderedJobList {
    type Target = [Job];

    fn deref(&self) -> &Self::Target {
        &self.jobs
    }
}

impl FromIterator<RawJob> for OrderedJobList {
    fn from_iter<T: IntoIterator<Item = RawJob>>(iter: T) -> Self {
        Self::build(iter)
    }
}
