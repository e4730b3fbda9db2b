//! Clap derive structures for the `elessar` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// elessar -- lights follow your BLE beacons
#[derive(Debug, Parser)]
#[command(
    name = "elessar",
    version,
    about = "Drive lighting bridges from BLE beacon presence",
    long_about = "Scans for iBeacon and Eddystone-UID advertisements and switches\n\
        the configured groups of every tracked lighting bridge on while a\n\
        tracked beacon is nearby, and off once it is gone.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Settings file (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// State file (overrides the settings file)
    #[arg(long, global = true)]
    pub state_file: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Plain text, one identifier per line (scripting)
    Plain,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the presence daemon until interrupted
    Run,

    /// Run one scan window and list the beacons heard
    Scan(ScanArgs),

    /// Browse for lighting bridges on the local network
    Discover(DiscoverArgs),

    /// Show or replace the tracked beacons
    #[command(alias = "b")]
    Beacons(BeaconsArgs),

    /// Manage tracked bridges
    Bridge(BridgeArgs),

    /// Show or change persisted settings
    Settings(SettingsArgs),
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Scan window in seconds (defaults to the persisted scan period)
    #[arg(long, short = 'w')]
    pub window: Option<u64>,

    /// Track these beacon ids after the scan, resolving names from it
    #[arg(long, value_name = "ID", num_args = 1..)]
    pub track: Vec<String>,
}

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Seconds to browse before probing
    #[arg(long, short = 'w', default_value = "5")]
    pub wait: u64,
}

#[derive(Debug, Args)]
pub struct BeaconsArgs {
    /// Beacon ids (`vendor:localId`); lists the tracked set if omitted
    #[arg(value_name = "ID")]
    pub ids: Vec<String>,

    /// Stop tracking every beacon
    #[arg(long, conflicts_with = "ids")]
    pub clear: bool,
}

#[derive(Debug, Args)]
pub struct BridgeArgs {
    #[command(subcommand)]
    pub command: BridgeCommand,
}

#[derive(Debug, Subcommand)]
pub enum BridgeCommand {
    /// List tracked bridges
    #[command(alias = "ls")]
    List,

    /// Track a bridge by id
    Add {
        /// Bridge id as advertised over mDNS
        id: String,

        /// Groups to switch
        #[arg(long, short = 'g', value_delimiter = ',')]
        groups: Vec<String>,
    },

    /// Stop tracking a bridge
    #[command(alias = "rm")]
    Remove { id: String },

    /// Replace the groups switched on a tracked bridge
    Groups {
        id: String,

        #[arg(required = true)]
        groups: Vec<String>,
    },

    /// Pair with a bridge (press its link button while this runs)
    Pair {
        id: String,

        /// Give up after this many seconds
        #[arg(long, short = 't', default_value = "30")]
        timeout: u64,
    },
}

#[derive(Debug, Args)]
pub struct SettingsArgs {
    /// Sweep interval in seconds
    #[arg(long)]
    pub scan_period: Option<u64>,

    /// Dispatch every sweep, ignoring the latch
    #[arg(long)]
    pub force_lights_state: Option<bool>,

    /// Write the current settings to the settings file
    #[arg(long)]
    pub init: bool,
}
