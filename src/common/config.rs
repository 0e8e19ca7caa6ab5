//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// How to launch the worker process
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Session lifecycle settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Exception kinds exported by the wrapped library
    #[serde(default)]
    pub exceptions: ExceptionsConfig,
}

/// What happens to the worker's stderr
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StderrMode {
    /// Discard worker diagnostics
    #[default]
    Null,
    /// Share the client's stderr
    Inherit,
}

/// Worker launch configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct WorkerConfig {
    /// Worker executable, either a path or a name searched on PATH
    pub program: Option<PathBuf>,

    /// Additional arguments to pass to the worker
    #[serde(default)]
    pub args: Vec<String>,

    /// Worker stderr policy
    #[serde(default)]
    pub stderr: StderrMode,
}

/// Session settings
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Spawn attempts before giving up on starting a worker
    #[serde(default = "default_start_attempts")]
    pub start_attempts: u32,

    /// Delay between spawn attempts, multiplied by the attempt number
    #[serde(default = "default_restart_backoff")]
    pub restart_backoff_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            start_attempts: default_start_attempts(),
            restart_backoff_ms: default_restart_backoff(),
        }
    }
}

fn default_start_attempts() -> u32 {
    3
}
fn default_restart_backoff() -> u64 {
    50
}

/// Exception kinds the client can reconstruct as library exceptions
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExceptionsConfig {
    #[serde(default)]
    pub library: Vec<String>,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))?;
        if config.session.start_attempts == 0 {
            return Err(Error::Config("session.start_attempts must be at least 1".to_string()));
        }
        Ok(config)
    }
}

impl WorkerConfig {
    /// Resolve the worker executable
    ///
    /// Bare names are searched on PATH; anything with a path component is used as-is
    pub fn resolve_program(&self) -> Result<PathBuf> {
        let program = self.program.as_ref().ok_or(Error::WorkerNotConfigured)?;

        if program.components().count() > 1 {
            return Ok(program.clone());
        }

        let name = program.to_string_lossy();
        which::which(name.as_ref()).map_err(|_| {
            let searched: Vec<String> = std::env::var_os("PATH")
                .map(|p| std::env::split_paths(&p).map(|d| d.display().to_string()).collect())
                .unwrap_or_default();
            Error::worker_not_found(&name, &searched)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.worker.program.is_none());
        assert_eq!(config.worker.stderr, StderrMode::Null);
        assert_eq!(config.session.start_attempts, 3);
        assert_eq!(config.session.restart_backoff_ms, 50);
        assert!(config.exceptions.library.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml_str(
            r#"
            [worker]
            program = "/opt/analyzer/worker"
            args = ["--quiet"]
            stderr = "inherit"

            [session]
            start_attempts = 5

            [exceptions]
            library = ["ParseError", "NotFoundError"]
            "#,
        )
        .unwrap();

        assert_eq!(config.worker.program, Some(PathBuf::from("/opt/analyzer/worker")));
        assert_eq!(config.worker.args, vec!["--quiet".to_string()]);
        assert_eq!(config.worker.stderr, StderrMode::Inherit);
        assert_eq!(config.session.start_attempts, 5);
        assert_eq!(config.session.restart_backoff_ms, 50);
        assert_eq!(config.exceptions.library, vec!["ParseError", "NotFoundError"]);
    }

    #[test]
    fn test_zero_start_attempts_rejected() {
        let err = Config::from_toml_str("[session]\nstart_attempts = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let err = Config::from_toml_str("[worker\nprogram = ").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[worker]\nprogram = \"./bin/worker\"").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(
            config.worker.resolve_program().unwrap(),
            PathBuf::from("./bin/worker")
        );
    }

    #[test]
    fn test_resolve_without_program() {
        let err = WorkerConfig::default().resolve_program().unwrap_err();
        assert!(matches!(err, Error::WorkerNotConfigured));
    }

    #[test]
    fn test_resolve_missing_bare_name() {
        let config = WorkerConfig {
            program: Some(PathBuf::from("objproxy-no-such-worker-binary")),
            ..Default::default()
        };
        let err = config.resolve_program().unwrap_err();
        assert!(matches!(err, Error::WorkerNotFound { .. }));
    }
}
