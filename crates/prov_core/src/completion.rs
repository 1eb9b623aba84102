//! Builds the terminal `Complete` message from engine artifacts.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use prov_iac::{agents_from_plan, agents_from_state, correlate, TerraformRunner};
use prov_proto::Complete;
use prov_runner::Signals;

use crate::error::{CoreError, CoreResult};

/// Reads plan or state artifacts and correlates agents with resources.
pub struct CompletionBuilder<'a> {
    terraform: &'a TerraformRunner,
    agent_type: &'a str,
    signals: Signals,
}

impl<'a> CompletionBuilder<'a> {
    /// `signals` govern the `show` and `graph` invocations.
    pub fn new(terraform: &'a TerraformRunner, agent_type: &'a str, signals: Signals) -> Self {
        Self {
            terraform,
            agent_type,
            signals,
        }
    }

    /// Resources a successful dry run would produce. No state is returned.
    pub async fn plan(&self) -> CoreResult<Complete> {
        let plan = self
            .terraform
            .show_plan(&self.terraform.plan_path(), &self.signals)
            .await?;
        let graph = self.terraform.graph(&self.signals).await?;

        let agents = agents_from_plan(&plan, self.agent_type);
        let resources = correlate(plan.planned_resources(), self.agent_type, &agents, &graph);
        debug!("Plan yields {} resources, {} agents", resources.len(), agents.len());
        Ok(Complete::resources(resources))
    }

    /// Resources and raw state after a successful apply.
    pub async fn apply(&self) -> CoreResult<Complete> {
        let state_path = self.terraform.state_path();
        let state_bytes = read_state(&state_path)?;
        let state = self.terraform.show_state(&state_path, &self.signals).await?;

        let resources = match &state.values {
            Some(values) => {
                let graph = self.terraform.graph(&self.signals).await?;
                let agents = agents_from_state(values, self.agent_type)?;
                correlate(values.root_resources(), self.agent_type, &agents, &graph)
            }
            // Empty after a full destroy.
            None => Vec::new(),
        };
        debug!("Apply yields {} resources", resources.len());
        Ok(Complete::resources(resources).with_state(state_bytes))
    }

    /// A failed apply still reports whatever state the engine left behind.
    pub fn failed_apply(&self, message: String) -> CoreResult<Complete> {
        warn!("Terraform apply failed: {}", message);
        let state_bytes = read_state(&self.terraform.state_path())?;
        Ok(Complete {
            resources: Vec::new(),
            state: state_bytes,
            error: Some(message),
        })
    }

    /// A failed dry run completes only when the session asked for it to stop.
    pub fn failed_plan(&self, message: String, shutdown_requested: bool) -> CoreResult<Complete> {
        if shutdown_requested {
            debug!("Terraform plan stopped after cancel: {}", message);
            Ok(Complete::failed(message))
        } else {
            Err(CoreError::PlanFailed(message))
        }
    }
}

fn read_state(path: &Path) -> CoreResult<Vec<u8>> {
    fs::read(path).map_err(|source| CoreError::ReadState {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use prov_iac::DEFAULT_AGENT_RESOURCE_TYPE;
    use prov_runner::{MockResponse, MockRunner};
    use tempfile::tempdir;

    const GRAPH: &str = r#"digraph {
        "[root] coder_agent.dev (expand)" [label = "coder_agent.dev"]
        "[root] null_resource.dev (expand)" [label = "null_resource.dev"]
        "[root] null_resource.dev (expand)" -> "[root] coder_agent.dev (expand)"
    }"#;

    #[tokio::test]
    async fn test_apply_with_empty_state_skips_graph() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("terraform.tfstate"), b"{}").unwrap();
        let mock = MockRunner::new().on("show", MockResponse::success(r#"{"format_version":"1.0"}"#));
        let terraform = TerraformRunner::new(Arc::new(mock.clone()), "terraform", dir.path());

        let complete = CompletionBuilder::new(&terraform, DEFAULT_AGENT_RESOURCE_TYPE, Signals::none())
            .apply()
            .await
            .unwrap();

        assert!(complete.resources.is_empty());
        assert_eq!(complete.state, b"{}");
        assert!(!mock.was_called("graph"));
    }

    #[tokio::test]
    async fn test_apply_correlates_state() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("terraform.tfstate"), b"state").unwrap();
        let mock = MockRunner::new()
            .on(
                "show",
                MockResponse::success(
                    r#"{"values":{"root_module":{"resources":[
                        {"type":"coder_agent","name":"dev","values":{"id":"a1","token":"t"}},
                        {"type":"null_resource","name":"dev","values":{}}
                    ]}}}"#,
                ),
            )
            .on("graph", MockResponse::success(GRAPH));
        let terraform = TerraformRunner::new(Arc::new(mock), "terraform", dir.path());

        let complete = CompletionBuilder::new(&terraform, DEFAULT_AGENT_RESOURCE_TYPE, Signals::none())
            .apply()
            .await
            .unwrap();

        assert_eq!(complete.resources.len(), 1);
        assert_eq!(complete.resources[0].agent.as_ref().unwrap().id, "a1");
        assert_eq!(complete.state, b"state");
        assert!(complete.error.is_none());
    }

    #[test]
    fn test_failed_apply_requires_state() {
        let dir = tempdir().unwrap();
        let terraform = TerraformRunner::new(Arc::new(MockRunner::new()), "terraform", dir.path());
        let builder = CompletionBuilder::new(&terraform, DEFAULT_AGENT_RESOURCE_TYPE, Signals::none());

        let err = builder.failed_apply("exit status 1".to_string()).unwrap_err();
        assert!(matches!(err, CoreError::ReadState { .. }));

        fs::write(terraform.state_path(), b"partial").unwrap();
        let complete = builder.failed_apply("exit status 1".to_string()).unwrap();
        assert_eq!(complete.state, b"partial");
        assert_eq!(complete.error.as_deref(), Some("exit status 1"));
        assert!(complete.resources.is_empty());
    }

    #[test]
    fn test_failed_plan_depends_on_shutdown() {
        let dir = tempdir().unwrap();
        let terraform = TerraformRunner::new(Arc::new(MockRunner::new()), "terraform", dir.path());
        let builder = CompletionBuilder::new(&terraform, DEFAULT_AGENT_RESOURCE_TYPE, Signals::none());

        let complete = builder.failed_plan("interrupted".to_string(), true).unwrap();
        assert_eq!(complete.error.as_deref(), Some("interrupted"));

        let err = builder.failed_plan("exit status 1".to_string(), false).unwrap_err();
        assert!(matches!(err, CoreError::PlanFailed(_)));
    }
}
