//! Data models exchanged over a provisioning session.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// Lifecycle transition the workspace is going through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkspaceTransition {
    #[default]
    Start,
    Stop,
    Destroy,
}

impl WorkspaceTransition {
    /// Lowercase name exported to the engine environment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Destroy => "destroy",
        }
    }
}

impl std::fmt::Display for WorkspaceTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of the workspace being provisioned.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metadata {
    #[serde(default)]
    pub service_url: String,
    #[serde(default)]
    pub workspace_transition: WorkspaceTransition,
    #[serde(default)]
    pub workspace_name: String,
    #[serde(default)]
    pub workspace_owner: String,
}

/// Where a parameter value is delivered to the engine.
///
/// Anything that is not one of the two known schemes decodes to
/// `Unspecified`, which the session rejects before invoking the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterDestination {
    EnvironmentVariable,
    EngineVariable,
    #[serde(other)]
    Unspecified,
}

impl std::fmt::Display for ParameterDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::EnvironmentVariable => "ENVIRONMENT_VARIABLE",
            Self::EngineVariable => "ENGINE_VARIABLE",
            Self::Unspecified => "UNSPECIFIED",
        };
        write!(f, "{}", name)
    }
}

/// A single resolved parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParameterValue {
    pub name: String,
    pub value: String,
    pub destination_scheme: ParameterDestination,
}

impl ParameterValue {
    pub fn env(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            destination_scheme: ParameterDestination::EnvironmentVariable,
        }
    }

    pub fn var(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            destination_scheme: ParameterDestination::EngineVariable,
        }
    }

    /// `NAME=VALUE` form used both for the environment and `-var`.
    pub fn assignment(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

/// Payload of the `Start` message that opens a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub directory: PathBuf,
    #[serde(with = "crate::bytes", default)]
    pub prior_state: Vec<u8>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub parameter_values: Vec<ParameterValue>,
    #[serde(default)]
    pub dry_run: bool,
}

impl ProvisionRequest {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            prior_state: Vec::new(),
            metadata: Metadata::default(),
            parameter_values: Vec::new(),
            dry_run: false,
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn prior_state(mut self, state: impl Into<Vec<u8>>) -> Self {
        self.prior_state = state.into();
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn transition(mut self, transition: WorkspaceTransition) -> Self {
        self.metadata.workspace_transition = transition;
        self
    }

    pub fn parameter(mut self, parameter: ParameterValue) -> Self {
        self.parameter_values.push(parameter);
        self
    }
}

/// Inbound session message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Start(ProvisionRequest),
    Cancel,
}

/// Severity of a relayed log line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(ProtoError::InvalidLogLevel(s.to_string())),
        }
    }
}

/// Extra detail the engine attaches to warnings and errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub detail: String,
}

/// A log line forwarded to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
}

impl LogRecord {
    pub fn new(level: LogLevel, output: impl Into<String>) -> Self {
        Self {
            level,
            output: output.into(),
            diagnostic: None,
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostic = Some(diagnostic);
        self
    }
}

/// Credential an agent uses to authenticate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentAuth {
    Token(String),
    InstanceId(String),
}

impl Default for AgentAuth {
    fn default() -> Self {
        Self::Token(String::new())
    }
}

/// Logical compute agent hosted by a resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Agent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub startup_script: String,
    #[serde(default)]
    pub auth: AgentAuth,
}

impl Agent {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// A physical resource from the plan or state, with the agent it hosts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<Arc<Agent>>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            agent: None,
        }
    }

    /// Graph address of the resource, `type.name`.
    pub fn address(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }
}

/// Terminal message of a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Complete {
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(with = "crate::bytes", default)]
    pub state: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Complete {
    pub fn resources(resources: Vec<Resource>) -> Self {
        Self {
            resources,
            ..Self::default()
        }
    }

    pub fn with_state(mut self, state: Vec<u8>) -> Self {
        self.state = state;
        self
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Outbound session message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProvisionResponse {
    Log(LogRecord),
    Complete(Complete),
}

impl ProvisionResponse {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}
