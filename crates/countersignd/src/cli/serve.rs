//! the `serve` subcommand - runs the signing daemon.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use color_eyre::eyre::{Context, Result};
use countersign_agent::AgentSigner;
use countersign_types::load_environments;
use tokio::net::TcpListener;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::create_app;

/// run the countersignd signing daemon
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// path to the per-environment policy file (json)
    #[arg(long, env = "COUNTERSIGN_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// address to listen on
    #[arg(long, default_value = "0.0.0.0:8080", env = "COUNTERSIGN_LISTEN_ADDR")]
    listen_addr: String,

    /// ssh agent socket holding the ca keys
    #[arg(long, env = "SSH_AUTH_SOCK")]
    agent_socket: PathBuf,

    /// log level
    #[arg(long, default_value = "info", env = "COUNTERSIGN_LOG_LEVEL")]
    log_level: String,
}

impl ServeCommand {
    /// run the serve command
    pub async fn run(self) -> Result<()> {
        // initialize logging
        let log_level = match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };

        let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
        tracing::subscriber::set_global_default(subscriber)?;

        info!("countersignd {} starting", env!("CARGO_PKG_VERSION"));

        let config_path = self.config_file.unwrap_or_else(super::default_config_path);
        let environments = load_environments(&config_path)
            .with_context(|| format!("failed to load policy from {config_path:?}"))?;
        for (name, policy) in &environments {
            info!(
                environment = %name,
                quorum = policy.signers_required,
                users = policy.authorized_users.len(),
                signers = policy.authorized_signers.len(),
                signing_key = %policy.signing_key_fingerprint,
                "environment loaded"
            );
            if policy.signers_required > policy.authorized_signers.len() {
                warn!(
                    environment = %name,
                    "quorum exceeds the number of authorized signers; requests can never be signed"
                );
            }
        }

        info!(socket = %self.agent_socket.display(), "using ssh agent");
        let ca = AgentSigner::connect(&self.agent_socket)
            .context("failed to connect to the ssh agent")?;

        let app = create_app(environments, Arc::new(ca));

        let addr: SocketAddr = self
            .listen_addr
            .parse()
            .context("invalid listen address")?;

        info!("starting http server on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .context("server error")?;

        Ok(())
    }
}
