//! # Flowkestra Flow
//!
//! `flowkestra-flow` drives authentication flows. A flow is started for a
//! registered application, resolved to its active [`FlowDefinition`] and then
//! advanced step by step, each step being handled by the [`IdentityProvider`]
//! it is bound to.
//!
//! ## Key Components
//!
//! - **[`FlowEngine`]**: The orchestrator behind `initiate` and `continue_flow`.
//! - **[`FlowEngineBuilder`]**: A typestate builder; an engine can only be built
//!   once both a registry and a store are configured.
//! - **[`StaticRegistry`]**: Applications and flow definitions loaded from configuration.
//! - **[`MemoryFlowStore`]**: In-process flow instance storage with expiry.
//! - **[`CredentialsStep`]**: Username/password collection backed by a [`CredentialsProvider`].

#![warn(missing_docs)]

pub use flowkestra_core::{
    oauth, Application, AuthError, CredentialsProvider, FlowDefinition, FlowInstance,
    FlowRegistry, FlowStatus, FlowStep, FlowStore, IdentityProvider, Inputs, StepVerdict,
};
#[cfg(feature = "token")]
pub use flowkestra_token::TokenManager;

use std::collections::HashMap;
use std::sync::Arc;

/// Username/password steps.
pub mod credentials;
/// Static application registry.
pub mod registry;
/// Flow instance storage and expiry.
pub mod store;
/// Request validation.
pub mod validator;

pub use credentials::{CredentialsStep, StaticCredentials};
pub use registry::StaticRegistry;
pub use store::{spawn_expiry_sweeper, MemoryFlowStore};

/// How long a flow instance lives unless configured otherwise.
pub const DEFAULT_FLOW_TTL_SECS: i64 = 600;
/// Lifetime of completion assertions unless configured otherwise.
pub const DEFAULT_ASSERTION_TTL_SECS: u64 = 3600;

/// Marker for a missing component in the typestate pattern.
#[derive(Clone, Default)]
pub struct Missing;

/// Marker for a configured component in the typestate pattern.
#[derive(Clone)]
pub struct Configured<T>(pub T);

/// The flow orchestrator.
///
/// Cheap to clone; every component is shared behind an `Arc` and only the
/// store holds mutable state.
#[derive(Clone)]
pub struct FlowEngine {
    registry: Arc<dyn FlowRegistry>,
    store: Arc<dyn FlowStore>,
    providers: HashMap<String, Arc<dyn IdentityProvider>>,
    flow_ttl: chrono::Duration,
    #[cfg(feature = "token")]
    token_manager: Option<Arc<TokenManager>>,
    #[cfg(feature = "token")]
    assertion_ttl_secs: u64,
}

impl FlowEngine {
    /// Create a new [`FlowEngineBuilder`] to configure the engine.
    pub fn builder() -> FlowEngineBuilder<Missing, Missing> {
        FlowEngineBuilder::default()
    }

    /// The instance store, e.g. to run an expiry sweeper against it.
    pub fn store(&self) -> Arc<dyn FlowStore> {
        self.store.clone()
    }

    /// Whether a provider with this id is registered.
    pub fn has_provider(&self, provider_id: &str) -> bool {
        self.providers.contains_key(provider_id)
    }

    /// Looks up an enabled application, failing with `InvalidAppId` otherwise.
    pub fn check_application(&self, app_id: &str) -> Result<Application, AuthError> {
        validator::validate_initiation(self.registry.as_ref(), app_id, None)
    }

    /// Starts a flow for `app_id`.
    ///
    /// When `inputs` are supplied they are offered to the first step, which
    /// lets credential steps finish in a single call.
    pub async fn initiate(
        &self,
        app_id: &str,
        inputs: Option<Inputs>,
    ) -> Result<FlowStep, AuthError> {
        self.initiate_inner(app_id, inputs)
            .await
            .inspect_err(log_server_error)
    }

    /// Continues the flow `flow_id` with the inputs collected for its current step.
    pub async fn continue_flow(
        &self,
        flow_id: &str,
        inputs: Inputs,
    ) -> Result<FlowStep, AuthError> {
        self.continue_inner(flow_id, inputs)
            .await
            .inspect_err(log_server_error)
    }

    /// Continues the flow a provider callback belongs to, located through the
    /// OAuth `state` value it carries.
    pub async fn continue_from_callback(&self, inputs: Inputs) -> Result<FlowStep, AuthError> {
        let flow_id = inputs
            .get(oauth::STATE_INPUT)
            .and_then(|state| oauth::flow_id_from_state(state))
            .ok_or_else(|| AuthError::InvalidRequest("callback carries no usable state".into()))?
            .to_string();
        self.continue_flow(&flow_id, inputs).await
    }

    async fn initiate_inner(
        &self,
        app_id: &str,
        inputs: Option<Inputs>,
    ) -> Result<FlowStep, AuthError> {
        let application =
            validator::validate_initiation(self.registry.as_ref(), app_id, inputs.as_ref())?;
        let definition = self.registry.resolve(&application.id)?;
        self.check_definition(&definition)?;

        let mut instance = self
            .store
            .create(&application.id, definition, self.flow_ttl)
            .await?;
        log::info!(
            "Initiated flow {} ({}) for application {}",
            instance.flow_id,
            instance.definition.name,
            application.id
        );

        let outcome = match inputs.filter(|i| !i.is_empty()) {
            Some(inputs) => self.step_through(&mut instance, &inputs).await,
            None => self.prompt_current(&mut instance),
        };
        let step = match outcome {
            Ok(step) => step,
            Err(e) => {
                self.store.expire(&instance.flow_id).await?;
                return Err(e);
            }
        };
        self.store.update(&instance).await?;
        Ok(step)
    }

    async fn continue_inner(&self, flow_id: &str, inputs: Inputs) -> Result<FlowStep, AuthError> {
        validator::validate_inputs(&inputs)?;
        let flow_id = flow_id.trim();
        let mut instance = self
            .store
            .get(flow_id)
            .await?
            .ok_or_else(|| AuthError::FlowNotFound(flow_id.to_string()))?;
        if instance.status.is_terminal() {
            return Err(AuthError::InvalidFlowState(flow_id.to_string()));
        }

        let step = self.step_through(&mut instance, &inputs).await?;
        self.store.update(&instance).await?;
        Ok(step)
    }

    /// Every step must point at a registered provider, and there must be at
    /// least one step.
    fn check_definition(&self, definition: &FlowDefinition) -> Result<(), AuthError> {
        if definition.steps.is_empty() {
            return Err(AuthError::ProviderConfig(format!(
                "flow {} has no steps",
                definition.name
            )));
        }
        for spec in &definition.steps {
            if !self.providers.contains_key(&spec.provider) {
                return Err(AuthError::ProviderConfig(format!(
                    "flow {} uses unregistered provider {}",
                    definition.name, spec.provider
                )));
            }
        }
        Ok(())
    }

    fn provider_for(&self, provider_id: &str) -> Result<Arc<dyn IdentityProvider>, AuthError> {
        self.providers.get(provider_id).cloned().ok_or_else(|| {
            AuthError::ProviderConfig(format!("provider {provider_id} is not registered"))
        })
    }

    /// Asks the current step's provider what the client has to do next.
    fn prompt_current(&self, instance: &mut FlowInstance) -> Result<FlowStep, AuthError> {
        let spec = instance
            .current_step()
            .cloned()
            .ok_or_else(|| AuthError::InvalidFlowState(instance.flow_id.clone()))?;
        let provider = self.provider_for(&spec.provider)?;
        let data = provider.prompt(&spec, &instance.flow_id, &mut instance.context)?;
        Ok(FlowStep::incomplete(
            instance.flow_id.clone(),
            provider.step_type(),
            data,
        ))
    }

    /// Offers `inputs` to the current step and applies the verdict to `instance`.
    ///
    /// Nothing is persisted here; the caller commits the instance.
    async fn step_through(
        &self,
        instance: &mut FlowInstance,
        inputs: &Inputs,
    ) -> Result<FlowStep, AuthError> {
        let spec = instance
            .current_step()
            .cloned()
            .ok_or_else(|| AuthError::InvalidFlowState(instance.flow_id.clone()))?;
        let provider = self.provider_for(&spec.provider)?;

        match provider.verify(&spec, &instance.context, inputs).await? {
            StepVerdict::Accepted(identity) => {
                log::debug!(
                    "Flow {} step {} ({}) satisfied",
                    instance.flow_id,
                    instance.step_index,
                    spec.provider
                );
                if instance.advance(identity) {
                    self.finish(instance)
                } else {
                    self.prompt_current(instance)
                }
            }
            StepVerdict::InputRequired => self.prompt_current(instance),
            StepVerdict::Rejected(reason) => {
                log::warn!(
                    "Flow {} step {} ({}) rejected: {reason}",
                    instance.flow_id,
                    instance.step_index,
                    spec.provider
                );
                instance.fail(reason.clone());
                Ok(FlowStep::failed(instance.flow_id.clone(), reason))
            }
        }
    }

    fn finish(&self, instance: &mut FlowInstance) -> Result<FlowStep, AuthError> {
        let assertion = self.issue_assertion(instance)?;
        log::info!(
            "Flow {} for application {} completed",
            instance.flow_id,
            instance.app_id
        );
        instance.context = Default::default();
        Ok(FlowStep::complete(instance.flow_id.clone(), assertion))
    }

    #[cfg(feature = "token")]
    fn issue_assertion(&self, instance: &FlowInstance) -> Result<Option<String>, AuthError> {
        let (Some(manager), Some(identity)) =
            (&self.token_manager, instance.context.last_identity())
        else {
            return Ok(None);
        };
        manager
            .issue_assertion(&instance.app_id, identity, self.assertion_ttl_secs)
            .map(Some)
            .map_err(|e| AuthError::Token(e.to_string()))
    }

    #[cfg(not(feature = "token"))]
    fn issue_assertion(&self, _instance: &FlowInstance) -> Result<Option<String>, AuthError> {
        Ok(None)
    }
}

fn log_server_error(e: &AuthError) {
    if e.is_server_error() {
        log::error!("Flow execution failed: {e}");
    }
}

/// A builder for configuring and creating a [`FlowEngine`].
pub struct FlowEngineBuilder<R, S> {
    registry: R,
    store: S,
    providers: HashMap<String, Arc<dyn IdentityProvider>>,
    flow_ttl: chrono::Duration,
    #[cfg(feature = "token")]
    token_manager: Option<Arc<TokenManager>>,
    #[cfg(feature = "token")]
    assertion_ttl_secs: u64,
}

impl Default for FlowEngineBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            registry: Missing,
            store: Missing,
            providers: HashMap::new(),
            flow_ttl: chrono::Duration::seconds(DEFAULT_FLOW_TTL_SECS),
            #[cfg(feature = "token")]
            token_manager: None,
            #[cfg(feature = "token")]
            assertion_ttl_secs: DEFAULT_ASSERTION_TTL_SECS,
        }
    }
}

impl<R, S> FlowEngineBuilder<R, S> {
    /// Register an identity provider under its own id.
    pub fn provider<P>(mut self, provider: P) -> Self
    where
        P: IdentityProvider + 'static,
    {
        let id = provider.provider_id().to_string();
        self.providers.insert(id, Arc::new(provider));
        self
    }

    /// Set the registry applications and definitions are resolved from.
    pub fn registry(
        self,
        registry: Arc<dyn FlowRegistry>,
    ) -> FlowEngineBuilder<Configured<Arc<dyn FlowRegistry>>, S> {
        FlowEngineBuilder {
            registry: Configured(registry),
            store: self.store,
            providers: self.providers,
            flow_ttl: self.flow_ttl,
            #[cfg(feature = "token")]
            token_manager: self.token_manager,
            #[cfg(feature = "token")]
            assertion_ttl_secs: self.assertion_ttl_secs,
        }
    }

    /// Set the flow instance store.
    pub fn store(
        self,
        store: Arc<dyn FlowStore>,
    ) -> FlowEngineBuilder<R, Configured<Arc<dyn FlowStore>>> {
        FlowEngineBuilder {
            registry: self.registry,
            store: Configured(store),
            providers: self.providers,
            flow_ttl: self.flow_ttl,
            #[cfg(feature = "token")]
            token_manager: self.token_manager,
            #[cfg(feature = "token")]
            assertion_ttl_secs: self.assertion_ttl_secs,
        }
    }

    /// Set how long an instance lives after initiation.
    pub fn flow_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.flow_ttl = ttl;
        self
    }

    /// Sign completion assertions with this manager.
    #[cfg(feature = "token")]
    pub fn token_manager(mut self, manager: Arc<TokenManager>) -> Self {
        self.token_manager = Some(manager);
        self
    }

    /// Set the lifetime of completion assertions.
    #[cfg(feature = "token")]
    pub fn assertion_ttl_secs(mut self, secs: u64) -> Self {
        self.assertion_ttl_secs = secs;
        self
    }
}

impl FlowEngineBuilder<Configured<Arc<dyn FlowRegistry>>, Configured<Arc<dyn FlowStore>>> {
    /// Build the [`FlowEngine`].
    pub fn build(self) -> FlowEngine {
        FlowEngine {
            registry: self.registry.0,
            store: self.store.0,
            providers: self.providers,
            flow_ttl: self.flow_ttl,
            #[cfg(feature = "token")]
            token_manager: self.token_manager,
            #[cfg(feature = "token")]
            assertion_ttl_secs: self.assertion_ttl_secs,
        }
    }
}
