use flowkestra_core::{Application, AuthError, FlowRegistry, Inputs};

/// The only flow type this engine executes.
pub const AUTHENTICATION_FLOW: &str = "AUTHENTICATION";

/// Checks an initiation request before any flow state is created.
///
/// The application id is checked first, so an unknown application is always
/// reported as such whatever else the request contains.
pub fn validate_initiation(
    registry: &dyn FlowRegistry,
    app_id: &str,
    inputs: Option<&Inputs>,
) -> Result<Application, AuthError> {
    let app_id = app_id.trim();
    if app_id.is_empty() {
        return Err(AuthError::InvalidAppId("empty application id".into()));
    }
    let application = registry
        .application(app_id)
        .ok_or_else(|| AuthError::InvalidAppId(app_id.to_string()))?;

    if let Some(inputs) = inputs {
        validate_inputs(inputs)?;
    }
    Ok(application)
}

/// Rejects inputs with blank names.
pub fn validate_inputs(inputs: &Inputs) -> Result<(), AuthError> {
    if inputs.keys().any(|name| name.trim().is_empty()) {
        return Err(AuthError::InvalidInput("input names must not be empty".into()));
    }
    Ok(())
}

/// Accepts a missing flow type or `AUTHENTICATION`.
pub fn validate_flow_type(flow_type: Option<&str>) -> Result<(), AuthError> {
    match flow_type.map(str::trim) {
        None | Some(AUTHENTICATION_FLOW) => Ok(()),
        Some(other) => Err(AuthError::InvalidFlowType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StaticRegistry;
    use flowkestra_core::{FlowDefinition, StepSpec};

    fn registry() -> StaticRegistry {
        StaticRegistry::new()
            .with_flow(FlowDefinition::new("basic", vec![StepSpec::new("basic")]))
            .with_application(Application::new("app", "basic"))
    }

    #[test]
    fn known_app_passes() {
        let app = validate_initiation(&registry(), " app ", None).unwrap();
        assert_eq!(app.id, "app");
    }

    #[test]
    fn invalid_app_wins_over_invalid_inputs() {
        let mut inputs = Inputs::new();
        inputs.insert(" ".into(), "x".into());
        assert!(matches!(
            validate_initiation(&registry(), "invalid-google-app-id", Some(&inputs)),
            Err(AuthError::InvalidAppId(_))
        ));
        assert!(matches!(
            validate_initiation(&registry(), "app", Some(&inputs)),
            Err(AuthError::InvalidInput(_))
        ));
    }

    #[test]
    fn empty_app_id_is_invalid() {
        assert!(matches!(
            validate_initiation(&registry(), "", None),
            Err(AuthError::InvalidAppId(_))
        ));
    }

    #[test]
    fn only_authentication_flows_are_accepted() {
        assert!(validate_flow_type(None).is_ok());
        assert!(validate_flow_type(Some("AUTHENTICATION")).is_ok());
        assert!(matches!(
            validate_flow_type(Some("REGISTRATION")),
            Err(AuthError::InvalidFlowType(_))
        ));
    }
}
