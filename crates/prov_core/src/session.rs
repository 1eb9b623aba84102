//! The provisioning session controller.
//!
//! A session is one `Start` request driven to exactly one `Complete`
//! response, or to an error when something fatal happens first:
//!
//! 1. Write the prior state and validate parameters
//! 2. Check the engine version
//! 3. `terraform init`, relaying raw output
//! 4. `terraform plan` (dry run) or `terraform apply`, relaying JSON UI output
//! 5. Read the plan or state, render the graph, correlate agents
//!
//! A `Cancel` arriving mid-session interrupts the running engine command;
//! the engine decides how to wind down.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use prov_iac::{spawn_raw_relay, spawn_structured_relay, TerraformRunner};
use prov_proto::channel::InboundRequest;
use prov_proto::{ProvisionRequest, Request, ResponseSender, SessionStream, WorkspaceTransition};
use prov_runner::{ProcessRunner, Signals};

use crate::completion::CompletionBuilder;
use crate::config::ProvisionerConfig;
use crate::env::{compose_environment, AgentScriptEnv, StaticAgentScripts};
use crate::error::{CoreError, CoreResult};

/// Serves provisioning sessions against one Terraform installation.
pub struct Provisioner {
    config: ProvisionerConfig,
    runner: Arc<dyn ProcessRunner>,
    agent_scripts: Arc<dyn AgentScriptEnv>,
}

impl Provisioner {
    /// Agent bootstrap variables come from `config.agent_script_env`.
    pub fn new(config: ProvisionerConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        let agent_scripts = Arc::new(StaticAgentScripts::new(config.agent_script_env.clone()));
        Self {
            config,
            runner,
            agent_scripts,
        }
    }

    pub fn with_agent_scripts(mut self, agent_scripts: Arc<dyn AgentScriptEnv>) -> Self {
        self.agent_scripts = agent_scripts;
        self
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    /// Serve one session to completion.
    pub async fn provision(&self, stream: SessionStream) -> CoreResult<()> {
        let SessionStream {
            mut requests,
            responses,
            context,
        } = stream;

        let request = match requests.recv().await {
            None => return Err(CoreError::StreamClosed),
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(Request::Cancel)) => {
                debug!("Session cancelled before start");
                return Ok(());
            }
            Some(Ok(Request::Start(request))) => request,
        };

        let span = info_span!(
            "session",
            session_id = %Uuid::new_v4(),
            directory = %request.directory.display(),
            dry_run = request.dry_run,
        );
        self.run(request, requests, responses, context)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        request: ProvisionRequest,
        requests: mpsc::Receiver<InboundRequest>,
        responses: ResponseSender,
        context: CancellationToken,
    ) -> CoreResult<()> {
        let shutdown = context.child_token();
        // Cancelling on exit also stops the listener.
        let _shutdown_guard = shutdown.clone().drop_guard();
        tokio::spawn(listen_for_cancel(requests, shutdown.clone()).in_current_span());

        let terraform = TerraformRunner::new(
            self.runner.clone(),
            self.config.binary_path.clone(),
            request.directory.clone(),
        )
        .with_plugin_cache(self.config.cache_path.as_deref());

        if !request.prior_state.is_empty() {
            write_state(&terraform.state_path(), &request.prior_state)?;
        }
        let session_env = compose_environment(
            &request.metadata,
            self.agent_scripts.as_ref(),
            &request.parameter_values,
        )?;

        let setup = Signals::abort_only(shutdown.clone());
        terraform.ensure_minimum_version(&setup).await?;

        let (tx, rx) = mpsc::channel(self.config.log_buffer);
        let relay = spawn_raw_relay(rx, responses.clone());
        let init = terraform.init(tx, &setup).await;
        drain(relay, "init").await;
        init?;
        info!("Initialized terraform");

        let destroy = request.metadata.workspace_transition == WorkspaceTransition::Destroy;
        let args = TerraformRunner::provision_args(
            request.dry_run,
            destroy,
            &terraform.plan_path(),
            &session_env.vars,
        );
        let (tx, rx) = mpsc::channel(self.config.log_buffer);
        let relay = spawn_structured_relay(rx, responses.clone());
        let result = terraform
            .provision(
                args,
                session_env.env,
                tx,
                &Signals::new(shutdown.clone(), context.clone()),
            )
            .await;
        drain(relay, if request.dry_run { "plan" } else { "apply" }).await;
        let result = result?;

        let builder = CompletionBuilder::new(
            &terraform,
            &self.config.agent_resource_type,
            Signals::abort_only(context.clone()),
        );
        let complete = match (result.success(), request.dry_run) {
            (true, true) => builder.plan().await?,
            (true, false) => builder.apply().await?,
            (false, true) => builder.failed_plan(result.error_message(), shutdown.is_cancelled())?,
            (false, false) => builder.failed_apply(result.error_message())?,
        };

        let failed = complete.error.is_some();
        responses.complete(complete).await?;
        if failed {
            warn!("Session completed with an engine error");
        } else {
            info!("Session completed");
        }
        Ok(())
    }
}

/// Watch the rest of the inbound stream for a `Cancel`.
async fn listen_for_cancel(mut requests: mpsc::Receiver<InboundRequest>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            next = requests.recv() => match next {
                Some(Ok(Request::Cancel)) => {
                    info!("Cancel requested");
                    shutdown.cancel();
                    return;
                }
                Some(Ok(Request::Start(_))) => debug!("Ignoring start request in a running session"),
                Some(Err(e)) => debug!("Ignoring undecodable request: {}", e),
                None => return,
            },
        }
    }
}

/// Wait for a relay to forward everything its channel held.
async fn drain(relay: JoinHandle<usize>, phase: &str) {
    match relay.await {
        Ok(count) => debug!("Relayed {} {} log records", count, phase),
        Err(e) => warn!("{} log relay failed: {}", phase, e),
    }
}

fn write_state(path: &Path, state: &[u8]) -> CoreResult<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options
        .open(path)
        .and_then(|mut file| file.write_all(state))
        .map_err(|source| CoreError::WriteState {
            path: path.to_path_buf(),
            source,
        })
}
