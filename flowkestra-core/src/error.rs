use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Errors that can occur while executing an authentication flow.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request payload could not be understood.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// The application id is unknown, disabled or empty.
    #[error("Invalid app ID: {0}")]
    InvalidAppId(String),
    /// The flow id is unknown or the flow has expired.
    #[error("Flow not found: {0}")]
    FlowNotFound(String),
    /// The flow has already reached a terminal status.
    #[error("Flow {0} cannot be continued")]
    InvalidFlowState(String),
    /// The inputs are malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Another request advanced the flow first.
    #[error("Flow {0} was modified concurrently")]
    FlowConflict(String),
    /// The requested flow type is not supported.
    #[error("Invalid flow type: {0}")]
    InvalidFlowType(String),
    /// A flow definition or provider is misconfigured.
    #[error("Provider configuration error: {0}")]
    ProviderConfig(String),
    /// The identity provider could not be reached or answered unexpectedly.
    #[error("Provider error: {0}")]
    Provider(String),
    /// The flow store failed.
    #[error("Store error: {0}")]
    Store(String),
    /// The completion assertion could not be issued.
    #[error("Token error: {0}")]
    Token(String),
}

/// A stable, client-visible description of a failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorDescriptor {
    /// Stable error code, e.g. `FES-1003`.
    pub code: &'static str,
    /// Short category message.
    pub message: &'static str,
    /// Human readable detail.
    pub description: &'static str,
}

const INVALID_REQUEST: ErrorDescriptor = ErrorDescriptor {
    code: "FES-1001",
    message: "Invalid request",
    description: "Invalid request payload",
};

const INVALID_FLOW_ID: ErrorDescriptor = ErrorDescriptor {
    code: "FES-1002",
    message: "Invalid request",
    description: "Invalid flow ID provided in the request",
};

const INVALID_APP_ID: ErrorDescriptor = ErrorDescriptor {
    code: "FES-1003",
    message: "Invalid request",
    description: "Invalid app ID provided in the request",
};

const INVALID_FLOW_STATE: ErrorDescriptor = ErrorDescriptor {
    code: "FES-1004",
    message: "Invalid request",
    description: "Flow is not in a state that can be continued",
};

const INVALID_INPUT: ErrorDescriptor = ErrorDescriptor {
    code: "FES-1005",
    message: "Invalid request",
    description: "Invalid inputs provided in the request",
};

const FLOW_CONFLICT: ErrorDescriptor = ErrorDescriptor {
    code: "FES-1006",
    message: "Invalid request",
    description: "Flow was modified by a concurrent request",
};

const INVALID_FLOW_TYPE: ErrorDescriptor = ErrorDescriptor {
    code: "FES-1007",
    message: "Invalid request",
    description: "Invalid flow type provided in the request",
};

const SERVER_ERROR: ErrorDescriptor = ErrorDescriptor {
    code: "FES-5000",
    message: "Something went wrong",
    description: "Internal server error",
};

impl AuthError {
    /// Maps the error to its client-visible `(code, message, description)` triple.
    ///
    /// This is the only place client-facing error text is defined. Server-side
    /// failures all collapse to the same generic triple.
    pub fn descriptor(&self) -> ErrorDescriptor {
        match self {
            AuthError::InvalidRequest(_) => INVALID_REQUEST,
            AuthError::FlowNotFound(_) => INVALID_FLOW_ID,
            AuthError::InvalidAppId(_) => INVALID_APP_ID,
            AuthError::InvalidFlowState(_) => INVALID_FLOW_STATE,
            AuthError::InvalidInput(_) => INVALID_INPUT,
            AuthError::FlowConflict(_) => FLOW_CONFLICT,
            AuthError::InvalidFlowType(_) => INVALID_FLOW_TYPE,
            AuthError::ProviderConfig(_)
            | AuthError::Provider(_)
            | AuthError::Store(_)
            | AuthError::Token(_) => SERVER_ERROR,
        }
    }

    /// Whether the failure is caused by the server rather than the client.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            AuthError::ProviderConfig(_)
                | AuthError::Provider(_)
                | AuthError::Store(_)
                | AuthError::Token(_)
        )
    }

    /// The HTTP status this error should be reported with.
    pub fn status_code(&self) -> StatusCode {
        if self.is_server_error() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::BAD_REQUEST
        }
    }

    /// Builds the structured response body for this error.
    pub fn to_response(&self) -> ErrorResponse {
        self.descriptor().into()
    }
}

/// The JSON body returned to clients on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable error code.
    pub code: String,
    /// Short category message.
    pub message: String,
    /// Human readable detail.
    pub description: String,
}

impl From<ErrorDescriptor> for ErrorResponse {
    fn from(d: ErrorDescriptor) -> Self {
        Self {
            code: d.code.to_string(),
            message: d.message.to_string(),
            description: d.description.to_string(),
        }
    }
}
