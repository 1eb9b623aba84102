//! Associates compute agents with the physical resources that host them.
//!
//! Agents are resources of a dedicated type (`coder_agent` unless
//! configured otherwise). A non-agent resource hosts an agent when the
//! agent is one of its direct dependencies in the engine graph.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use prov_proto::{Agent, AgentAuth, Resource};

use crate::error::{IacError, IacResult};
use crate::graph::DependencyGraph;
use crate::state::{PlanOutput, StateResource, StateValues};

/// Resource type of agents unless configured otherwise.
pub const DEFAULT_AGENT_RESOURCE_TYPE: &str = "coder_agent";

/// Agents keyed by `type.name`.
pub type AgentTable = HashMap<String, Arc<Agent>>;

/// Attributes of an applied agent resource.
#[derive(Debug, Default, Deserialize)]
struct AgentAttributes {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    instance_id: Option<String>,
    #[serde(default)]
    env: Option<HashMap<String, String>>,
    #[serde(default)]
    startup_script: Option<String>,
}

/// Build the agent table from plan configuration.
///
/// Only literal `env` and `startup_script` values are known at plan time.
/// An `instance_id` expression of any kind marks instance identity auth.
pub fn agents_from_plan(plan: &PlanOutput, agent_type: &str) -> AgentTable {
    plan.config_resources()
        .iter()
        .filter(|r| r.resource_type == agent_type)
        .map(|resource| {
            let mut agent = Agent::default();
            if let Some(env) = resource
                .constant_value("env")
                .and_then(|v| serde_json::from_value::<HashMap<String, String>>(v.clone()).ok())
            {
                agent.env = env;
            }
            if let Some(script) = resource.constant_value("startup_script").and_then(|v| v.as_str()) {
                agent.startup_script = script.to_string();
            }
            if resource.has_expression("instance_id") {
                agent.auth = AgentAuth::InstanceId(String::new());
            }
            (resource.key(), Arc::new(agent))
        })
        .collect()
}

/// Build the agent table from applied state values.
pub fn agents_from_state(values: &StateValues, agent_type: &str) -> IacResult<AgentTable> {
    let mut agents = AgentTable::new();
    for resource in values.root_resources().iter().filter(|r| r.resource_type == agent_type) {
        let attrs = if resource.values.is_null() {
            AgentAttributes::default()
        } else {
            AgentAttributes::deserialize(&resource.values).map_err(|source| IacError::AgentDecode {
                address: resource.key(),
                source,
            })?
        };

        let auth = match attrs.instance_id.filter(|id| !id.is_empty()) {
            Some(instance_id) => AgentAuth::InstanceId(instance_id),
            None => AgentAuth::Token(attrs.token.unwrap_or_default()),
        };
        let agent = Agent {
            id: attrs.id.unwrap_or_default(),
            env: attrs.env.unwrap_or_default(),
            startup_script: attrs.startup_script.unwrap_or_default(),
            auth,
        };
        agents.insert(resource.key(), Arc::new(agent));
    }
    Ok(agents)
}

/// Attach agents to the non-agent resources of `listing`.
///
/// Resources absent from the graph are dropped. For the rest, neighbors
/// are scanned in lexical order and the first one naming an agent wins, so
/// the result does not depend on graph edge order.
pub fn correlate(
    listing: &[StateResource],
    agent_type: &str,
    agents: &AgentTable,
    graph: &DependencyGraph,
) -> Vec<Resource> {
    let mut resources = Vec::new();
    for entry in listing.iter().filter(|r| r.resource_type != agent_type) {
        let key = entry.key();
        let Some(neighbors) = graph.dependencies(&key) else {
            debug!("Dropping {} which is not in the dependency graph", key);
            continue;
        };

        let mut candidates: Vec<&String> = neighbors.iter().collect();
        candidates.sort();
        let agent = candidates.into_iter().find_map(|label| agents.get(label)).cloned();

        resources.push(Resource {
            name: entry.name.clone(),
            resource_type: entry.resource_type.clone(),
            agent,
        });
    }
    resources
}
