//! CLI command handling
//!
//! Runs each command against a fresh session and formats the output.

use serde_json::Value as Json;

use crate::client::{Kwargs, RemoteValue, Session};
use crate::commands::{Commands, WorkerOverrides};
use crate::common::config::Config;
use crate::common::{paths, Error, Result};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, overrides: WorkerOverrides) -> Result<()> {
    let mut config = Config::load()?;
    apply_overrides(&mut config, overrides);

    match command {
        Commands::Config => {
            match paths::config_path() {
                Some(path) if path.exists() => println!("Config file: {}", path.display()),
                Some(path) => println!("Config file: {} (not present, using defaults)", path.display()),
                None => println!("Config file: unavailable on this platform"),
            }

            match config.worker.resolve_program() {
                Ok(program) => {
                    println!("Worker: {}", program.display());
                    if !config.worker.args.is_empty() {
                        println!("Worker args: {}", config.worker.args.join(" "));
                    }
                }
                Err(e) => println!("Worker: {e}"),
            }
            println!(
                "Start attempts: {} (backoff {}ms)",
                config.session.start_attempts, config.session.restart_backoff_ms
            );
            if !config.exceptions.library.is_empty() {
                println!("Library exceptions: {}", config.exceptions.library.join(", "));
            }

            Ok(())
        }

        Commands::Get { name } => {
            let session = Session::from_config(&config)?;
            let value = session.namespace().get(&name).await;
            let printed = match value {
                Ok(value) => print_value(value).await,
                Err(e) => Err(e),
            };
            finish(&session, printed).await
        }

        Commands::Call { name, args, kwargs } => {
            let args: Vec<RemoteValue> = args.iter().map(|a| parse_argument(a)).collect();
            let kwargs = parse_kwargs(&kwargs)?;

            let session = Session::from_config(&config)?;
            let printed = match session.namespace().call(&name, &args, &kwargs).await {
                Ok(value) => print_value(value).await,
                Err(e) => Err(e),
            };
            finish(&session, printed).await
        }
    }
}

fn apply_overrides(config: &mut Config, overrides: WorkerOverrides) {
    if let Some(program) = overrides.worker {
        config.worker.program = Some(program);
    }
    if !overrides.worker_args.is_empty() {
        config.worker.args = overrides.worker_args;
    }
}

/// Shut the worker down whether or not the command succeeded
async fn finish(session: &Session, result: Result<()>) -> Result<()> {
    if let Err(e) = session.shutdown().await {
        tracing::debug!(error = %e, "Worker shutdown failed");
    }
    result
}

async fn print_value(value: RemoteValue) -> Result<()> {
    match value {
        RemoteValue::Proxy(proxy) => {
            let text = proxy.represent().await;
            proxy.dispose().await;
            println!("{}", text?);
        }
        RemoteValue::String(s) => println!("{s}"),
        other => println!("{}", serde_json::to_string_pretty(&other.to_json())?),
    }
    Ok(())
}

/// Parse a command-line argument as JSON, treating anything else as a string
fn parse_argument(raw: &str) -> RemoteValue {
    match serde_json::from_str::<Json>(raw) {
        Ok(json) => RemoteValue::from(json),
        Err(_) => RemoteValue::from(raw),
    }
}

fn parse_kwargs(raw: &[String]) -> Result<Kwargs> {
    let mut kwargs = Kwargs::new();
    for entry in raw {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("invalid keyword argument '{entry}', expected KEY=JSON")))?;
        if key.is_empty() {
            return Err(Error::Config(format!("missing keyword name in '{entry}'")));
        }
        kwargs.insert(key.to_string(), parse_argument(value));
    }
    Ok(kwargs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_argument() {
        assert_eq!(parse_argument("3").as_i64(), Some(3));
        assert_eq!(parse_argument("\"x\"").as_str(), Some("x"));
        assert_eq!(parse_argument("main.src").as_str(), Some("main.src"));
        assert_eq!(parse_argument("[1, 2]").as_list().map(|l| l.len()), Some(2));
    }

    #[test]
    fn test_parse_kwargs() {
        let kwargs = parse_kwargs(&["line=3".to_string(), "path=a.src".to_string()]).unwrap();
        assert_eq!(kwargs["line"].as_i64(), Some(3));
        assert_eq!(kwargs["path"].as_str(), Some("a.src"));

        assert!(parse_kwargs(&["noequals".to_string()]).is_err());
        assert!(parse_kwargs(&["=1".to_string()]).is_err());
    }

    #[test]
    fn test_overrides_replace_config() {
        let mut config = Config::default();
        config.worker.args = vec!["--old".to_string()];

        apply_overrides(
            &mut config,
            WorkerOverrides {
                worker: Some(PathBuf::from("/opt/w")),
                worker_args: vec!["--new".to_string()],
            },
        );
        assert_eq!(config.worker.program, Some(PathBuf::from("/opt/w")));
        assert_eq!(config.worker.args, ["--new".to_string()]);

        apply_overrides(&mut config, WorkerOverrides::default());
        assert_eq!(config.worker.args, ["--new".to_string()]);
    }
}
