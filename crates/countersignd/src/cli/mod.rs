//! cli subcommands for countersignd.

mod check;
mod serve;

pub use check::CheckConfigCommand;
pub use serve::ServeCommand;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// countersignd - ssh certificate authority signing daemon
#[derive(Parser, Debug)]
#[command(name = "countersignd")]
#[command(about = "SSH CA signing daemon with quorum endorsements", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// top-level commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// run the signing daemon
    Serve(ServeCommand),

    /// validate a policy file and print a summary
    CheckConfig(CheckConfigCommand),
}

/// default policy path, matching the classic sign_certd location.
pub(crate) fn default_config_path() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_else(|| "/".into());
    PathBuf::from(home).join(".ssh_ca/sign_certd_config.json")
}
