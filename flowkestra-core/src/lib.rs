//! # Flowkestra Core
//!
//! `flowkestra-core` provides the foundational traits and types for the Flowkestra
//! authentication flow engine. It defines the flow data model, the error taxonomy
//! and the seams (identity providers, registries and instance stores) that the
//! rest of the workspace plugs into.

#![warn(missing_docs)]

use async_trait::async_trait;
use std::sync::Arc;

/// PKCE (Proof Key for Code Exchange) utilities.
pub mod pkce;

/// OAuth `state` helpers shared by redirect providers and callbacks.
pub mod oauth;

/// Errors that can occur during flow execution, and their client-visible mapping.
pub mod error;
pub use crate::error::{AuthError, ErrorDescriptor, ErrorResponse};

/// Identities, statuses and the step response model.
pub mod state;
pub use crate::state::{FlowStatus, FlowStep, Identity, InputField, Inputs, StepData, StepType};

/// Applications and flow definitions.
pub mod definition;
pub use crate::definition::{Application, FlowDefinition, StepSpec};

/// Flow instances and their accumulated context.
pub mod instance;
pub use crate::instance::{FlowContext, FlowInstance};

/// Outcome of checking a step's inputs.
#[derive(Debug, Clone, PartialEq)]
pub enum StepVerdict {
    /// The step is satisfied.
    Accepted(Identity),
    /// Required inputs are missing; the step must be shown again.
    InputRequired,
    /// The inputs were checked and refused. The flow fails.
    Rejected(String),
}

/// An authentication capability a flow step can be bound to.
///
/// Redirect based providers (OAuth/OIDC) and credential based providers both
/// implement this trait; the engine only talks to steps through it.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Id referenced by `StepSpec::provider`.
    fn provider_id(&self) -> &str;

    /// The kind of step this provider produces.
    fn step_type(&self) -> StepType;

    /// Builds the payload the client must act on for `spec`.
    ///
    /// Values needed later to verify the step (CSRF state, PKCE verifier) are
    /// written to `ctx`.
    fn prompt(
        &self,
        spec: &StepSpec,
        flow_id: &str,
        ctx: &mut FlowContext,
    ) -> Result<StepData, AuthError>;

    /// Checks the inputs submitted for `spec`.
    async fn verify(
        &self,
        spec: &StepSpec,
        ctx: &FlowContext,
        inputs: &Inputs,
    ) -> Result<StepVerdict, AuthError>;
}

/// Trait for a Credentials-based provider (e.g., Username/Password).
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Validate credentials and return an Identity, or `None` on mismatch.
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Identity>, AuthError>;
}

/// Read-only lookup of applications and their active flow definitions.
pub trait FlowRegistry: Send + Sync {
    /// Looks up an application by id.
    fn application(&self, app_id: &str) -> Option<Application>;

    /// Resolves the active flow definition of an application.
    fn resolve(&self, app_id: &str) -> Result<FlowDefinition, AuthError>;
}

/// Storage for in-progress flow instances.
#[async_trait]
pub trait FlowStore: Send + Sync + 'static {
    /// Creates an instance with a fresh, unique flow id.
    async fn create(
        &self,
        app_id: &str,
        definition: FlowDefinition,
        ttl: chrono::Duration,
    ) -> Result<FlowInstance, AuthError>;

    /// Loads a live instance. Expired instances are reported as absent.
    async fn get(&self, flow_id: &str) -> Result<Option<FlowInstance>, AuthError>;

    /// Commits `instance` if its `version` still matches the stored one.
    ///
    /// Returns the stored instance with its bumped version. Fails with
    /// `FlowConflict` when another update won, and `FlowNotFound` when the
    /// instance expired or was removed.
    async fn update(&self, instance: &FlowInstance) -> Result<FlowInstance, AuthError>;

    /// Removes an instance.
    async fn expire(&self, flow_id: &str) -> Result<(), AuthError>;

    /// Removes every expired instance and returns how many were dropped.
    async fn purge_expired(&self) -> Result<usize, AuthError>;
}

#[async_trait]
impl<T: IdentityProvider + ?Sized> IdentityProvider for Arc<T> {
    fn provider_id(&self) -> &str {
        (**self).provider_id()
    }

    fn step_type(&self) -> StepType {
        (**self).step_type()
    }

    fn prompt(
        &self,
        spec: &StepSpec,
        flow_id: &str,
        ctx: &mut FlowContext,
    ) -> Result<StepData, AuthError> {
        (**self).prompt(spec, flow_id, ctx)
    }

    async fn verify(
        &self,
        spec: &StepSpec,
        ctx: &FlowContext,
        inputs: &Inputs,
    ) -> Result<StepVerdict, AuthError> {
        (**self).verify(spec, ctx, inputs).await
    }
}

#[async_trait]
impl<T: CredentialsProvider + ?Sized> CredentialsProvider for Arc<T> {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Identity>, AuthError> {
        (**self).authenticate(username, password).await
    }
}

impl<T: FlowRegistry + ?Sized> FlowRegistry for Arc<T> {
    fn application(&self, app_id: &str) -> Option<Application> {
        (**self).application(app_id)
    }

    fn resolve(&self, app_id: &str) -> Result<FlowDefinition, AuthError> {
        (**self).resolve(app_id)
    }
}
