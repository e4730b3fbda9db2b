mod ble;
mod cli;
mod commands;
mod daemon;
mod error;
mod mdns;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    init_tracing(cli.global.verbose);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let ctx = commands::Context::load(&cli.global)?;
    tracing::debug!(command = ?cli.command, state = %ctx.state_path.display(), "dispatching command");

    match cli.command {
        Command::Run => daemon::run(&ctx).await,
        Command::Scan(args) => commands::scan::handle(&ctx, args).await,
        Command::Discover(args) => commands::discover::handle(&ctx, args).await,
        Command::Beacons(args) => commands::beacons::handle(&ctx, args),
        Command::Bridge(args) => commands::bridge::handle(&ctx, args).await,
        Command::Settings(args) => commands::settings::handle(&ctx, args),
    }
}
