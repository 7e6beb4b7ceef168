//! CLI for reconstructing Dockerfiles from saved container images.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod analyze;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "unbake",
    version,
    about = "Reconstruct a Dockerfile from a saved container image"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a `docker save` archive and print its reconstructed Dockerfile.
    Analyze(analyze::AnalyzeArgs),

    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completion {
        /// Target shell.
        shell: Shell,
    },
}

impl Cli {
    const fn verbose(&self) -> bool {
        matches!(&self.command, Command::Analyze(args) if args.verbose)
    }

    fn dispatch(self) -> Result<()> {
        match self.command {
            Command::Analyze(args) => analyze::run(&args),
            Command::Completion { shell } => {
                clap_complete::generate(
                    shell,
                    &mut Self::command(),
                    "unbake",
                    &mut std::io::stdout(),
                );
                Ok(())
            }
        }
    }
}

/// Installs the stderr log subscriber. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose());
    if let Err(e) = cli.dispatch() {
        eprintln!("unbake: {e:#}");
        std::process::exit(1);
    }
}
