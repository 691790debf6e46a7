use crate::pkce::random_token;

/// Input name carrying the authorization code on an OAuth callback.
pub const CODE_INPUT: &str = "code";
/// Input name carrying the `state` value on an OAuth callback.
pub const STATE_INPUT: &str = "state";

/// Input name carrying the error code when the provider refuses the request.
pub const ERROR_INPUT: &str = "error";
/// Input name carrying the provider's human readable error detail.
pub const ERROR_DESCRIPTION_INPUT: &str = "error_description";

const STATE_SEPARATOR: char = '.';

/// Builds an OAuth `state` value bound to `flow_id`.
///
/// The value is `<flow_id>.<random token>`, so a callback can be routed back
/// to its flow while the random part still protects against CSRF.
pub fn new_state(flow_id: &str) -> String {
    format!("{flow_id}{STATE_SEPARATOR}{}", random_token(16))
}

/// Extracts the flow id from a `state` built by [`new_state`].
pub fn flow_id_from_state(state: &str) -> Option<&str> {
    let (flow_id, token) = state.split_once(STATE_SEPARATOR)?;
    if flow_id.is_empty() || token.is_empty() {
        return None;
    }
    Some(flow_id)
}
