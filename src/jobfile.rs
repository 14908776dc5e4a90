//! Loads a job file: one `<priority> <command>` pair per line.
use std::fmt;
use std::io;
use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncRead;
use tracing::{debug, trace};

use crate::line_reader::LineReader;
use crate::parser::{is_ignorable, ParsingError};
use crate::types::job::RawJob;
use crate::util::bytes_to_human_str;

#[derive(Debug)]
pub enum JobFileError {
    Io(io::Error),
    /// A line that is neither blank, a comment, nor a valid job.
    Parse {
        /// 1-based line number
        line: usize,
        content: String,
        error: ParsingError,
    },
}

impl fmt::Display for JobFileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "reading job file: {e}"),
            Self::Parse {
                line,
                content,
                error,
            } => write!(f, "line {line}: {error}: {content:?}"),
        }
    }
}

impl std::error::Error for JobFileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse { error, .. } => Some(error),
        }
    }
}

impl From<io::Error> for JobFileError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Reads all jobs from the file at `path`, in file order.
pub async fn load_jobs(
    path: impl AsRef<Path>,
) -> Result<Vec<RawJob>, JobFileError> {
    let path = path.as_ref();
    debug!(path = %path.display(), "loading job file");

    let file = File::open(path).await?;
    read_jobs(file).await
}

/// Reads all jobs from `reader`. Blank and `#` comment lines are skipped; any
/// other malformed line fails the whole load so that no job runs from a
/// partially-understood file.
pub async fn read_jobs<T: AsyncRead + Unpin>(
    reader: T,
) -> Result<Vec<RawJob>, JobFileError> {
    let mut lr: LineReader<_> = reader.into();
    let mut jobs = Vec::new();
    let mut line_no = 0;

    while let Some(line) = lr.read_line().await? {
        line_no += 1;

        if is_ignorable(&line) {
            continue;
        }

        trace!(line = bytes_to_human_str(&line), "parsing job");

        let job = RawJob::try_from(&line as &[u8]).map_err(|error| {
            JobFileError::Parse {
                line: line_no,
                content: bytes_to_human_str(&line),
                error,
            }
        })?;

        jobs.push(job);
    }

    debug!(jobs = jobs.len(), lines = line_no, "loaded job file");

    Ok(jobs)
}
