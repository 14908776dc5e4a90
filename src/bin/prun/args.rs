use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(about, long_about = None, version)]
pub(crate) struct Args {
    /// File listing one `<priority> <command>` job per line. Lower priorities
    /// run first.
    pub(crate) jobs_file: PathBuf,
    /// Maximum number of jobs running at once.
    #[arg(short = 'j', long)]
    pub(crate) max_jobs: NonZeroUsize,
    /// Shell used to run each command as `<shell> -c <command>`.
    #[arg(short, long, default_value = "/bin/sh")]
    pub(crate) shell: PathBuf,
    /// Writes a YAML report of every job's outcome to this path.
    #[arg(short, long)]
    pub(crate) report: Option<PathBuf>,
    /// Exits successfully even if some jobs failed.
    #[arg(long, default_value_t)]
    pub(crate) ignore_failures: bool,
    /// Enables human-friendly logging.
    #[arg(short, long, default_value_t)]
    pub(crate) debug: bool,
}
