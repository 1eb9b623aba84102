//! Terraform command driver.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use prov_runner::{EngineCommand, ExecutionResult, LineSender, OutputTarget, ProcessRunner, Signals};

use crate::error::{IacError, IacResult};
use crate::graph::{find_direct_dependencies, DependencyGraph};
use crate::state::{PlanOutput, StateOutput};
use crate::version::{EngineVersion, MINIMUM_TERRAFORM_VERSION};

/// State file the engine reads and writes inside the working directory.
pub const STATE_FILE_NAME: &str = "terraform.tfstate";

/// Plan file written by dry runs.
pub const PLAN_FILE_NAME: &str = "terraform.tfplan";

/// Provider plugin cache variable understood by the engine.
pub const PLUGIN_CACHE_ENV: &str = "TF_PLUGIN_CACHE_DIR";

/// Runs Terraform subcommands in one working directory.
pub struct TerraformRunner {
    runner: Arc<dyn ProcessRunner>,
    binary: PathBuf,
    working_dir: PathBuf,
    /// Applied to every invocation.
    env: Vec<(String, String)>,
}

impl TerraformRunner {
    pub fn new(runner: Arc<dyn ProcessRunner>, binary: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            binary: binary.into(),
            working_dir: working_dir.into(),
            env: Vec::new(),
        }
    }

    /// Set a variable for every invocation.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Point the engine at a shared provider plugin cache.
    pub fn with_plugin_cache(self, cache_path: Option<&Path>) -> Self {
        match cache_path {
            Some(path) => self.with_env(PLUGIN_CACHE_ENV, path.to_string_lossy()),
            None => self,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn state_path(&self) -> PathBuf {
        self.working_dir.join(STATE_FILE_NAME)
    }

    pub fn plan_path(&self) -> PathBuf {
        self.working_dir.join(PLAN_FILE_NAME)
    }

    fn command<I, S>(&self, args: I) -> EngineCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EngineCommand::new(&self.binary)
            .args(args)
            .working_dir(&self.working_dir)
            .envs(self.env.iter().cloned())
    }

    async fn capture(&self, command: &EngineCommand, signals: &Signals) -> IacResult<ExecutionResult> {
        debug!("Executing {}", command.display());
        Ok(self.runner.run(command, OutputTarget::Capture, signals).await?)
    }

    /// Run `terraform version -json`.
    pub async fn version(&self, signals: &Signals) -> IacResult<EngineVersion> {
        let result = self.capture(&self.command(["version", "-json"]), signals).await?;
        if !result.success() {
            return Err(IacError::Version(result.error_message()));
        }
        EngineVersion::from_version_output(&result.stdout)
    }

    /// Fail unless the engine is at least [`MINIMUM_TERRAFORM_VERSION`].
    pub async fn ensure_minimum_version(&self, signals: &Signals) -> IacResult<EngineVersion> {
        let version = self.version(signals).await?;
        if !version.is_at_least(&MINIMUM_TERRAFORM_VERSION) {
            return Err(IacError::VersionTooOld {
                found: version,
                required: MINIMUM_TERRAFORM_VERSION,
            });
        }
        info!("Using terraform {}", version);
        Ok(version)
    }

    /// Run `terraform init`, streaming its output into `lines`.
    pub async fn init(&self, lines: LineSender, signals: &Signals) -> IacResult<()> {
        info!("Running terraform init in {:?}", self.working_dir);
        let command = self.command(["init", "-no-color", "-input=false"]);
        debug!("Executing {}", command.display());

        let result = self.runner.run(&command, OutputTarget::Stream(lines), signals).await?;
        if !result.success() {
            return Err(IacError::InitFailed(result.error_message()));
        }
        Ok(())
    }

    /// Arguments for a plan (dry run) or apply.
    pub fn provision_args(dry_run: bool, destroy: bool, planfile: &Path, vars: &[String]) -> Vec<String> {
        let mut args: Vec<String> = if dry_run {
            vec![
                "plan".into(),
                "-no-color".into(),
                "-input=false".into(),
                "-json".into(),
                "-refresh=true".into(),
                format!("-out={}", planfile.display()),
            ]
        } else {
            vec![
                "apply".into(),
                "-no-color".into(),
                "-auto-approve".into(),
                "-input=false".into(),
                "-json".into(),
                "-refresh=true".into(),
            ]
        };
        if destroy {
            args.push("-destroy".into());
        }
        for var in vars {
            args.push("-var".into());
            args.push(var.clone());
        }
        args
    }

    /// Run plan or apply with `args`, streaming JSON UI lines into `lines`.
    ///
    /// A non-zero exit is returned in the result for the caller to judge.
    pub async fn provision(
        &self,
        args: Vec<String>,
        env: Vec<(String, String)>,
        lines: LineSender,
        signals: &Signals,
    ) -> IacResult<ExecutionResult> {
        let command = self.command(args).envs(env);
        info!(
            "Running terraform {} in {:?}",
            command.subcommand().unwrap_or_default(),
            self.working_dir
        );
        debug!("Executing {}", command.display());
        Ok(self.runner.run(&command, OutputTarget::Stream(lines), signals).await?)
    }

    async fn show(&self, file: &Path, signals: &Signals) -> IacResult<String> {
        let command = self.command([
            "show".to_string(),
            "-json".to_string(),
            "-no-color".to_string(),
            file.to_string_lossy().into_owned(),
        ]);
        let result = self.capture(&command, signals).await?;
        if !result.success() {
            return Err(IacError::ShowFailed {
                target: file.display().to_string(),
                message: result.error_message(),
            });
        }
        Ok(result.stdout)
    }

    /// Run `terraform show -json` on a plan file.
    pub async fn show_plan(&self, planfile: &Path, signals: &Signals) -> IacResult<PlanOutput> {
        PlanOutput::from_json(&self.show(planfile, signals).await?)
    }

    /// Run `terraform show -json` on a state file.
    pub async fn show_state(&self, statefile: &Path, signals: &Signals) -> IacResult<StateOutput> {
        StateOutput::from_json(&self.show(statefile, signals).await?)
    }

    /// Render the configuration graph and extract direct dependencies.
    pub async fn graph(&self, signals: &Signals) -> IacResult<DependencyGraph> {
        let result = self.capture(&self.command(["graph"]), signals).await?;
        if !result.success() {
            return Err(IacError::GraphFailed(result.error_message()));
        }
        find_direct_dependencies(&result.stdout)
    }
}
