//! Serve command - Run one provisioning session over stdio.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use prov_core::{Provisioner, ProvisionerConfig};
use prov_runner::ProcessSupervisor;

use crate::transport;

#[derive(Args)]
pub struct ServeArgs {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Terraform binary to run
    #[arg(long, env = "TERRAFORM_BINARY")]
    binary: Option<PathBuf>,

    /// Provider plugin cache directory
    #[arg(long, env = "TF_PLUGIN_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Resource type that defines agents
    #[arg(long)]
    agent_type: Option<String>,

    /// Capacity of the engine output and session channels
    #[arg(long)]
    log_buffer: Option<usize>,
}

impl ServeArgs {
    /// Configuration file values overridden by flags and environment.
    fn resolve_config(&self) -> Result<ProvisionerConfig> {
        let mut config = match &self.config {
            Some(path) => ProvisionerConfig::from_file(path)?,
            None => ProvisionerConfig::default(),
        };
        if let Some(binary) = &self.binary {
            config = config.with_binary_path(binary);
        }
        if let Some(cache_dir) = &self.cache_dir {
            config = config.with_cache_path(cache_dir);
        }
        if let Some(agent_type) = &self.agent_type {
            config = config.with_agent_resource_type(agent_type);
        }
        if let Some(capacity) = self.log_buffer {
            config = config.with_log_buffer(capacity);
        }
        Ok(config)
    }
}

pub async fn execute(args: ServeArgs) -> Result<()> {
    let config = args.resolve_config()?;
    info!(
        "Serving session with {} (agent type {})",
        config.binary_path.display(),
        config.agent_resource_type
    );

    let capacity = config.log_buffer;
    let provisioner = Provisioner::new(config, Arc::new(ProcessSupervisor::new()));

    let stop = CancellationToken::new();
    let on_ctrl_c = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping terraform");
            on_ctrl_c.cancel();
        }
    });

    transport::serve_session(
        &provisioner,
        transport::stdin_lines(capacity),
        tokio::io::stdout(),
        stop,
    )
    .await
}
