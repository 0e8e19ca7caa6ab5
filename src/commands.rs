//! CLI command definitions
//!
//! Defines the clap commands for the objproxy CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch a top-level name from the worker's namespace and print it
    Get {
        /// Name to look up
        name: String,
    },

    /// Fetch a top-level name and invoke it
    Call {
        /// Name of the callable
        name: String,

        /// Positional arguments; each is parsed as JSON, falling back to a string
        args: Vec<String>,

        /// Keyword argument as KEY=JSON, can be given multiple times:
        /// --kw line=3 --kw path='"main.src"'
        #[arg(long = "kw", value_name = "KEY=JSON")]
        kwargs: Vec<String>,
    },

    /// Show the config file location and the worker that would be launched
    Config,
}

/// Worker overrides that apply to every command
#[derive(Args, Debug, Default, Clone)]
pub struct WorkerOverrides {
    /// Worker executable, overriding `[worker] program` in the config file
    #[arg(long, global = true, value_name = "PROGRAM")]
    pub worker: Option<PathBuf>,

    /// Extra argument for the worker, can be given multiple times
    #[arg(long = "worker-arg", global = true, value_name = "ARG", allow_hyphen_values = true)]
    pub worker_args: Vec<String>,
}
