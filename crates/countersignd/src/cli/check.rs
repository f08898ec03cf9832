//! the `check-config` subcommand - validates a policy file.

use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::{Context, Result};
use countersign_types::load_environments;

/// validate a policy file and print a per-environment summary
#[derive(Args, Debug)]
pub struct CheckConfigCommand {
    /// path to the per-environment policy file (json)
    #[arg(long, env = "COUNTERSIGN_CONFIG_FILE")]
    config_file: Option<PathBuf>,
}

impl CheckConfigCommand {
    /// run the check-config command
    pub fn run(self) -> Result<()> {
        let config_path = self.config_file.unwrap_or_else(super::default_config_path);
        let environments = load_environments(&config_path)
            .with_context(|| format!("failed to load policy from {config_path:?}"))?;

        println!("{} environment(s) configured", environments.len());
        for (name, policy) in &environments {
            println!(
                "  {name}: quorum {}, {} authorized user(s), {} authorized signer(s), signing key {}",
                policy.signers_required,
                policy.authorized_users.len(),
                policy.authorized_signers.len(),
                policy.signing_key_fingerprint,
            );
            if policy.signers_required > policy.authorized_signers.len() {
                println!(
                    "  warning: {name} requires more signers than it authorizes; requests can never be signed"
                );
            }
        }

        Ok(())
    }
}
