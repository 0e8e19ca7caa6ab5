//! Worker process launch
//!
//! Where the worker lives and how it is started is up to the launcher; the
//! session only requires that the returned command can have its stdin and
//! stdout replaced by pipes.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use crate::common::config::{StderrMode, WorkerConfig};
use crate::common::Result;

/// Produces the command that starts a worker
pub trait WorkerLauncher: Send + Sync {
    /// Build a fresh command for one worker incarnation
    fn command(&self) -> Result<Command>;

    /// Short description for logs
    fn describe(&self) -> String {
        "worker".to_string()
    }
}

/// Launches a worker executable with fixed arguments
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: PathBuf,
    args: Vec<String>,
    stderr: StderrMode,
}

impl CommandLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stderr: StderrMode::default(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_stderr(mut self, stderr: StderrMode) -> Self {
        self.stderr = stderr;
        self
    }

    /// Build from the `[worker]` config section, resolving the program on PATH
    pub fn from_config(config: &WorkerConfig) -> Result<Self> {
        Ok(Self::new(config.resolve_program()?)
            .with_args(config.args.iter().cloned())
            .with_stderr(config.stderr))
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl WorkerLauncher for CommandLauncher {
    fn command(&self) -> Result<Command> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        // Worker diagnostics must never reach the protocol channel
        cmd.stderr(match self.stderr {
            StderrMode::Null => Stdio::null(),
            StderrMode::Inherit => Stdio::inherit(),
        });

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        Ok(cmd)
    }

    fn describe(&self) -> String {
        if self.args.is_empty() {
            self.program.display().to_string()
        } else {
            format!("{} {}", self.program.display(), self.args.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        let launcher = CommandLauncher::new("/opt/worker").with_args(["--fast", "-v"]);
        assert_eq!(launcher.describe(), "/opt/worker --fast -v");
        assert_eq!(CommandLauncher::new("w").describe(), "w");
    }

    #[test]
    fn test_from_config() {
        let config = WorkerConfig {
            program: Some(PathBuf::from("./worker")),
            args: vec!["--quiet".to_string()],
            stderr: StderrMode::Inherit,
        };
        let launcher = CommandLauncher::from_config(&config).unwrap();
        assert_eq!(launcher.program(), &PathBuf::from("./worker"));
        assert_eq!(launcher.args(), ["--quiet".to_string()]);
        assert_eq!(launcher.stderr, StderrMode::Inherit);
    }
}
