use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A registered application and the flow it currently uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Application identifier sent by clients as `applicationId`.
    pub id: String,
    /// Disabled applications are treated as unknown.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Name of the active flow definition, e.g. `auth_flow_config_google`.
    pub flow: String,
}

fn default_enabled() -> bool {
    true
}

impl Application {
    /// An enabled application bound to `flow`.
    pub fn new(id: impl Into<String>, flow: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            flow: flow.into(),
        }
    }
}

/// An ordered list of authentication steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowDefinition {
    /// Definition name.
    pub name: String,
    /// Steps executed in order.
    pub steps: Vec<StepSpec>,
}

impl FlowDefinition {
    /// Creates a definition from its steps.
    pub fn new(name: impl Into<String>, steps: Vec<StepSpec>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }
}

/// One step of a flow, bound to a registered identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Id of the identity provider that executes the step.
    pub provider: String,
    /// Provider specific parameters (client id, scopes, redirect URI, ...).
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl StepSpec {
    /// A step for `provider` with no properties.
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            properties: HashMap::new(),
        }
    }

    /// Adds a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns a property, treating blank values as absent.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}
