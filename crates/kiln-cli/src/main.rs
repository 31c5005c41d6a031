//! kiln CLI - host a live-editable patch from the command line.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about = "Live-editable data-flow runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a patch, reloading it whenever the file changes
    Run(commands::run::RunArgs),

    /// Build a patch once and print its schedule
    Check(commands::check::CheckArgs),

    /// List available operator types and their parameters
    Operators(commands::operators::OperatorsArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Check(args) => commands::check::run(args),
        Commands::Operators(args) => commands::operators::run(args),
    }
}
