//! Command-line surface (spec §6 "CLI surface"), grounded on the `clap`
//! derive style shared by `redhat-performance-rusty-comms`,
//! `snowdamiz-mesh-lang`, and the `util` crate in `SleepingPills-bushhammer`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-process tunnel/VM fabric", long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "tunnelmesh.toml")]
    pub config: PathBuf,

    /// Process role to run as; `main` forks the others (fork/supervision is
    /// an external collaborator — see crate docs).
    #[arg(long, value_enum, default_value_t = Role::Main)]
    pub role: Role,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum Role {
    Main,
    Worker,
    Other,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the process in its configured role (default if no subcommand given).
    Run,
    /// Trigger a VM reload across every slot this process owns.
    Reload,
}
