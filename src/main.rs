//! objproxy - drive objects living in a worker process
//!
//! Command-line front end for poking at a worker's namespace without writing
//! a client program.

use clap::Parser;
use objproxy::commands::{Commands, WorkerOverrides};
use objproxy::{cli, common::logging};

#[derive(Parser)]
#[command(name = "objproxy", about = "Call into a worker process through remote object handles")]
#[command(version, long_about = None)]
struct Cli {
    #[command(flatten)]
    overrides: WorkerOverrides,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    logging::init_cli();

    let cli = Cli::parse();

    if let Err(e) = cli::dispatch(cli.command, cli.overrides).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
