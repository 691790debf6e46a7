use crate::definition::{FlowDefinition, StepSpec};
use crate::state::{FlowStatus, Identity};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// State accumulated while a flow runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowContext {
    /// Scratch values owned by the current step, e.g. the OAuth `state`.
    /// Cleared whenever the flow moves to another step.
    pub step_values: HashMap<String, String>,
    /// Identities produced by the steps satisfied so far.
    pub identities: Vec<Identity>,
}

impl FlowContext {
    /// Reads a value stored by the current step.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.step_values.get(key).map(String::as_str)
    }

    /// Stores a value for the current step.
    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.step_values.insert(key.into(), value.into());
    }

    /// The identity established by the most recent step.
    pub fn last_identity(&self) -> Option<&Identity> {
        self.identities.last()
    }
}

/// One in-progress execution of a flow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowInstance {
    /// Opaque, unguessable identifier.
    pub flow_id: String,
    /// Application the flow was started for.
    pub app_id: String,
    /// Definition snapshot taken at initiation.
    pub definition: FlowDefinition,
    /// Index of the step awaiting input.
    pub step_index: usize,
    /// Lifecycle status.
    pub status: FlowStatus,
    /// Accumulated state.
    pub context: FlowContext,
    /// Why the flow failed, once it has.
    pub failure_reason: Option<String>,
    /// Bumped by the store on every committed update.
    pub version: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// The instance disappears after this point.
    pub expires_at: DateTime<Utc>,
}

impl FlowInstance {
    /// A fresh instance positioned at the first step.
    pub fn new(
        flow_id: impl Into<String>,
        app_id: impl Into<String>,
        definition: FlowDefinition,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            flow_id: flow_id.into(),
            app_id: app_id.into(),
            definition,
            step_index: 0,
            status: FlowStatus::Incomplete,
            context: FlowContext::default(),
            failure_reason: None,
            version: 0,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// The step awaiting input, if any remain.
    pub fn current_step(&self) -> Option<&StepSpec> {
        self.definition.steps.get(self.step_index)
    }

    /// Whether the instance is past its time-to-live at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Marks the current step satisfied and moves to the next one.
    ///
    /// Returns `true` when no steps remain, in which case the instance is
    /// now `Complete`.
    pub fn advance(&mut self, identity: Identity) -> bool {
        debug_assert_eq!(self.status, FlowStatus::Incomplete);
        self.context.identities.push(identity);
        self.context.step_values.clear();
        self.step_index += 1;
        if self.step_index >= self.definition.steps.len() {
            self.status = FlowStatus::Complete;
            true
        } else {
            false
        }
    }

    /// Moves the instance to `Error`.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = FlowStatus::Error;
        self.failure_reason = Some(reason.into());
        self.context.step_values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            provider_id: "basic".into(),
            external_id: "alice".into(),
            email: None,
            username: Some("alice".into()),
            attributes: HashMap::new(),
        }
    }

    #[test]
    fn completes_only_after_last_step() {
        let def = FlowDefinition::new("two", vec![StepSpec::new("basic"), StepSpec::new("google")]);
        let mut instance = FlowInstance::new("f1", "app", def, Duration::minutes(5));
        instance.context.set_value("state", "x");

        assert!(!instance.advance(identity()));
        assert_eq!(instance.status, FlowStatus::Incomplete);
        assert_eq!(instance.current_step().map(|s| s.provider.as_str()), Some("google"));
        assert!(instance.context.value("state").is_none());

        assert!(instance.advance(identity()));
        assert_eq!(instance.status, FlowStatus::Complete);
        assert!(instance.current_step().is_none());
        assert_eq!(instance.context.identities.len(), 2);
    }

    #[test]
    fn expiry_is_inclusive() {
        let def = FlowDefinition::new("one", vec![StepSpec::new("basic")]);
        let instance = FlowInstance::new("f1", "app", def, Duration::seconds(30));
        assert!(!instance.is_expired_at(instance.created_at));
        assert!(instance.is_expired_at(instance.expires_at));
    }
}
