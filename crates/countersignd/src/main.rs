//! countersignd - ssh certificate authority signing daemon.
//!
//! certificate requests are accepted over http, endorsed by a quorum of
//! trusted signers, and finally signed by a ca key held in an external
//! ssh key-agent.

use clap::Parser;
use color_eyre::eyre::Result;
use countersignd::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(cmd) => cmd.run().await,
        Command::CheckConfig(cmd) => cmd.run(),
    }
}
