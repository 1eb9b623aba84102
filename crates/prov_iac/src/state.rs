//! Models for the JSON documents printed by `terraform show -json`.
//!
//! Only the fields the provisioner reads are modelled; everything else in
//! the documents is ignored.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{IacError, IacResult};

/// `terraform show -json <planfile>`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanOutput {
    #[serde(default)]
    pub configuration: Option<Configuration>,
    #[serde(default)]
    pub planned_values: Option<StateValues>,
}

impl PlanOutput {
    pub fn from_json(json: &str) -> IacResult<Self> {
        serde_json::from_str(json).map_err(|source| IacError::Json {
            what: "plan".to_string(),
            source,
        })
    }

    /// Resources declared in the root module configuration.
    pub fn config_resources(&self) -> &[ConfigResource] {
        self.configuration
            .as_ref()
            .and_then(|c| c.root_module.as_ref())
            .map(|m| m.resources.as_slice())
            .unwrap_or_default()
    }

    /// Resources the plan would leave in the root module.
    pub fn planned_resources(&self) -> &[StateResource] {
        self.planned_values
            .as_ref()
            .map(StateValues::root_resources)
            .unwrap_or_default()
    }
}

/// `terraform show -json <statefile>`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateOutput {
    #[serde(default)]
    pub terraform_version: Option<String>,
    #[serde(default)]
    pub values: Option<StateValues>,
}

impl StateOutput {
    pub fn from_json(json: &str) -> IacResult<Self> {
        serde_json::from_str(json).map_err(|source| IacError::Json {
            what: "state".to_string(),
            source,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub root_module: Option<ConfigModule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigModule {
    #[serde(default)]
    pub resources: Vec<ConfigResource>,
}

/// A resource block as written in configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigResource {
    #[serde(default)]
    pub address: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    /// Attribute expressions; nested blocks appear as arrays.
    #[serde(default)]
    pub expressions: HashMap<String, serde_json::Value>,
}

impl ConfigResource {
    pub fn key(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }

    pub fn has_expression(&self, name: &str) -> bool {
        self.expressions.contains_key(name)
    }

    /// Value of an expression that is a literal in configuration.
    pub fn constant_value(&self, name: &str) -> Option<&serde_json::Value> {
        self.expressions
            .get(name)
            .and_then(|e| e.get("constant_value"))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateValues {
    #[serde(default)]
    pub root_module: Option<StateModule>,
}

impl StateValues {
    pub fn root_resources(&self) -> &[StateResource] {
        self.root_module
            .as_ref()
            .map(|m| m.resources.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateModule {
    #[serde(default)]
    pub resources: Vec<StateResource>,
}

/// A resource instance with its attribute values.
#[derive(Debug, Clone, Deserialize)]
pub struct StateResource {
    #[serde(default)]
    pub address: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub values: serde_json::Value,
}

impl StateResource {
    pub fn key(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }
}
