use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Client supplied inputs for a step, keyed by input name.
pub type Inputs = HashMap<String, String>;

/// A unified identity structure returned by all providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider that authenticated the user, e.g. `google`.
    pub provider_id: String,
    /// The user's id at the provider.
    pub external_id: String,
    /// Email, when the provider shares one.
    pub email: Option<String>,
    /// Display or login name.
    pub username: Option<String>,
    /// Extra provider claims.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Lifecycle status of a flow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowStatus {
    /// More steps remain.
    Incomplete,
    /// Every step was satisfied.
    Complete,
    /// A step was rejected.
    Error,
}

impl FlowStatus {
    /// Terminal instances can no longer be advanced.
    pub fn is_terminal(self) -> bool {
        !matches!(self, FlowStatus::Incomplete)
    }
}

/// What the client has to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    /// Navigate the browser to `data.redirectURL`.
    Redirection,
    /// Collect the fields listed in `data.inputs`.
    View,
    /// The flow finished; `assertion` carries the result.
    Complete,
}

/// A form field the client must collect for a view step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputField {
    /// Input name to send back on continuation.
    pub name: String,
    /// Field kind, e.g. `string` or `password`.
    #[serde(rename = "type")]
    pub input_type: String,
    /// Whether the step cannot be satisfied without it.
    pub required: bool,
}

impl InputField {
    /// A required field.
    pub fn required(name: impl Into<String>, input_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_type: input_type.into(),
            required: true,
        }
    }
}

/// Step payload. Redirection steps fill `redirect_url`, view steps fill `inputs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepData {
    /// Where the browser must be sent.
    #[serde(rename = "redirectURL", default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    /// Fields to collect.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputField>,
    /// Provider specific extras.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub additional_data: HashMap<String, String>,
}

impl StepData {
    /// Payload for a redirection step.
    pub fn redirect(url: impl Into<String>) -> Self {
        Self {
            redirect_url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Payload for a view step.
    pub fn view(inputs: Vec<InputField>) -> Self {
        Self {
            inputs,
            ..Default::default()
        }
    }
}

/// The response produced for every initiate or continue call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowStep {
    /// Opaque flow identifier.
    pub flow_id: String,
    /// Current status.
    pub flow_status: FlowStatus,
    /// Next action for the client; absent once the flow failed.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<StepType>,
    /// Step payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<StepData>,
    /// Signed assertion, only present on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion: Option<String>,
    /// Why the flow failed, only present on error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl FlowStep {
    /// An incomplete step asking the client to act.
    pub fn incomplete(flow_id: impl Into<String>, step_type: StepType, data: StepData) -> Self {
        Self {
            flow_id: flow_id.into(),
            flow_status: FlowStatus::Incomplete,
            step_type: Some(step_type),
            data: Some(data),
            assertion: None,
            failure_reason: None,
        }
    }

    /// The terminal step of a completed flow.
    pub fn complete(flow_id: impl Into<String>, assertion: Option<String>) -> Self {
        Self {
            flow_id: flow_id.into(),
            flow_status: FlowStatus::Complete,
            step_type: Some(StepType::Complete),
            data: None,
            assertion,
            failure_reason: None,
        }
    }

    /// The terminal step of a failed flow.
    pub fn failed(flow_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            flow_id: flow_id.into(),
            flow_status: FlowStatus::Error,
            step_type: None,
            data: None,
            assertion: None,
            failure_reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirection_step_serializes_to_wire_shape() {
        let step = FlowStep::incomplete(
            "abc",
            StepType::Redirection,
            StepData::redirect("https://accounts.google.com/o/oauth2/v2/auth?x=1"),
        );
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["flowId"], "abc");
        assert_eq!(json["flowStatus"], "INCOMPLETE");
        assert_eq!(json["type"], "REDIRECTION");
        assert_eq!(
            json["data"]["redirectURL"],
            "https://accounts.google.com/o/oauth2/v2/auth?x=1"
        );
        assert!(json.get("assertion").is_none());
        assert!(json["data"].get("inputs").is_none());
    }

    #[test]
    fn failed_step_has_no_type() {
        let json = serde_json::to_value(FlowStep::failed("abc", "Invalid credentials")).unwrap();
        assert_eq!(json["flowStatus"], "ERROR");
        assert!(json.get("type").is_none());
        assert_eq!(json["failureReason"], "Invalid credentials");
    }
}
