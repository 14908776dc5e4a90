//! Turns a job into a running process.
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;
use tracing::trace;

use crate::types::job::Job;

/// Resolves once the launched process has terminated.
pub type JobHandle =
    Pin<Box<dyn Future<Output = io::Result<ExitStatus>> + Send + 'static>>;

/// Starts jobs without waiting for them.
///
/// An `Err` from `launch` is a launch error: nothing was started and the job
/// holds no concurrency slot.
pub trait Launcher {
    fn launch(&self, job: &Job) -> io::Result<JobHandle>;
}

/// Runs each command through `<shell> -c`, with the job's stdout and stderr
/// connected straight to ours so output from concurrent jobs interleaves live.
#[derive(Clone, Debug)]
pub struct ShellLauncher {
    shell: PathBuf,
}

impl Default for ShellLauncher {
    fn default() -> Self {
        Self::new("/bin/sh")
    }
}

impl ShellLauncher {
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Launcher for ShellLauncher {
    fn launch(&self, job: &Job) -> io::Result<JobHandle> {
        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(&job.command)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;

        trace!(pid = child.id(), "spawned");

        Ok(Box::pin(async move { child.wait().await }))
    }
}
