use flowkestra_core::{Application, AuthError, FlowDefinition, FlowRegistry};
use std::collections::HashMap;

/// A registry built once from configuration and never mutated afterwards.
///
/// Switching an application to another flow means building a new registry,
/// not editing this one.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    applications: HashMap<String, Application>,
    flows: HashMap<String, FlowDefinition>,
}

impl StaticRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an application.
    pub fn with_application(mut self, application: Application) -> Self {
        self.applications
            .insert(application.id.clone(), application);
        self
    }

    /// Registers a flow definition under its name.
    pub fn with_flow(mut self, definition: FlowDefinition) -> Self {
        self.flows.insert(definition.name.clone(), definition);
        self
    }

    /// Every registered flow definition.
    pub fn flows(&self) -> impl Iterator<Item = &FlowDefinition> {
        self.flows.values()
    }
}

impl FlowRegistry for StaticRegistry {
    fn application(&self, app_id: &str) -> Option<Application> {
        self.applications
            .get(app_id)
            .filter(|app| app.enabled)
            .cloned()
    }

    fn resolve(&self, app_id: &str) -> Result<FlowDefinition, AuthError> {
        let app = self
            .application(app_id)
            .ok_or_else(|| AuthError::InvalidAppId(app_id.to_string()))?;
        self.flows.get(&app.flow).cloned().ok_or_else(|| {
            AuthError::ProviderConfig(format!(
                "application {} references unknown flow {}",
                app.id, app.flow
            ))
        })
    }
}
