//! Environment and variables handed to plan/apply.

use std::collections::BTreeMap;

use prov_proto::{Metadata, ParameterDestination, ParameterValue};

use crate::error::{CoreError, CoreResult};

pub const SERVICE_URL_ENV: &str = "SERVICE_URL";
pub const WORKSPACE_TRANSITION_ENV: &str = "WORKSPACE_TRANSITION";
pub const WORKSPACE_NAME_ENV: &str = "WORKSPACE_NAME";
pub const WORKSPACE_OWNER_ENV: &str = "WORKSPACE_OWNER";

/// Source of the variables an agent bootstrap script needs at apply time.
#[cfg_attr(test, mockall::automock)]
pub trait AgentScriptEnv: Send + Sync {
    fn agent_script_env(&self) -> Vec<(String, String)>;
}

/// Fixed set of bootstrap variables, typically from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticAgentScripts {
    vars: BTreeMap<String, String>,
}

impl StaticAgentScripts {
    pub fn new(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }
}

impl AgentScriptEnv for StaticAgentScripts {
    fn agent_script_env(&self) -> Vec<(String, String)> {
        self.vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// Environment additions and `-var` assignments for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionEnv {
    /// Added on top of the inherited process environment.
    pub env: Vec<(String, String)>,
    /// `name=value` pairs, each passed after a `-var` flag.
    pub vars: Vec<String>,
}

/// Route identity, bootstrap and parameter values to the engine.
///
/// Fails on the first parameter whose destination is not a known scheme.
pub fn compose_environment(
    metadata: &Metadata,
    agent_scripts: &dyn AgentScriptEnv,
    parameters: &[ParameterValue],
) -> CoreResult<SessionEnv> {
    let mut session = SessionEnv {
        env: vec![
            (SERVICE_URL_ENV.to_string(), metadata.service_url.clone()),
            (
                WORKSPACE_TRANSITION_ENV.to_string(),
                metadata.workspace_transition.as_str().to_string(),
            ),
            (WORKSPACE_NAME_ENV.to_string(), metadata.workspace_name.clone()),
            (WORKSPACE_OWNER_ENV.to_string(), metadata.workspace_owner.clone()),
        ],
        vars: Vec::new(),
    };
    session.env.extend(agent_scripts.agent_script_env());

    for param in parameters {
        match param.destination_scheme {
            ParameterDestination::EnvironmentVariable => {
                session.env.push((param.name.clone(), param.value.clone()))
            }
            ParameterDestination::EngineVariable => session.vars.push(param.assignment()),
            ParameterDestination::Unspecified => {
                return Err(CoreError::UnsupportedParameter {
                    name: param.name.clone(),
                    scheme: param.destination_scheme,
                })
            }
        }
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prov_proto::WorkspaceTransition;

    fn metadata() -> Metadata {
        Metadata {
            service_url: "https://dev.example.com".to_string(),
            workspace_transition: WorkspaceTransition::Destroy,
            workspace_name: "dev".to_string(),
            workspace_owner: "alice".to_string(),
        }
    }

    #[test]
    fn test_identity_and_routing() {
        let mut scripts = MockAgentScriptEnv::new();
        scripts
            .expect_agent_script_env()
            .times(1)
            .returning(|| vec![("AGENT_SCRIPT".to_string(), "echo boot".to_string())]);

        let session = compose_environment(
            &metadata(),
            &scripts,
            &[
                ParameterValue::env("TOKEN", "abc"),
                ParameterValue::var("region", "eu-west-1"),
                ParameterValue::var("size", "large"),
            ],
        )
        .unwrap();

        assert_eq!(
            session.env,
            vec![
                ("SERVICE_URL".to_string(), "https://dev.example.com".to_string()),
                ("WORKSPACE_TRANSITION".to_string(), "destroy".to_string()),
                ("WORKSPACE_NAME".to_string(), "dev".to_string()),
                ("WORKSPACE_OWNER".to_string(), "alice".to_string()),
                ("AGENT_SCRIPT".to_string(), "echo boot".to_string()),
                ("TOKEN".to_string(), "abc".to_string()),
            ]
        );
        assert_eq!(session.vars, vec!["region=eu-west-1", "size=large"]);
    }

    #[test]
    fn test_unspecified_scheme_is_rejected() {
        let mut param = ParameterValue::env("mystery", "1");
        param.destination_scheme = ParameterDestination::Unspecified;

        let err = compose_environment(&metadata(), &StaticAgentScripts::default(), &[param]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported parameter type \"UNSPECIFIED\" for \"mystery\""
        );
    }

    #[test]
    fn test_static_scripts_are_sorted() {
        let scripts = StaticAgentScripts::new(
            [("B", "2"), ("A", "1")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        assert_eq!(
            scripts.agent_script_env(),
            vec![("A".to_string(), "1".to_string()), ("B".to_string(), "2".to_string())]
        );
    }
}
