use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use flowkestra_core::{
    AuthError, CredentialsProvider, FlowContext, Identity, IdentityProvider, InputField, Inputs,
    StepData, StepSpec, StepType, StepVerdict,
};
use std::collections::HashMap;

/// Input name for the login name.
pub const USERNAME_INPUT: &str = "username";
/// Input name for the password.
pub const PASSWORD_INPUT: &str = "password";

/// A view step that collects a username and password and checks them with a
/// [`CredentialsProvider`].
pub struct CredentialsStep<P: CredentialsProvider> {
    id: String,
    provider: P,
}

impl<P: CredentialsProvider> CredentialsStep<P> {
    /// Create a step registered under the `basic` provider id.
    pub fn new(provider: P) -> Self {
        Self::with_id("basic", provider)
    }

    /// Create a step registered under a custom provider id.
    pub fn with_id(id: impl Into<String>, provider: P) -> Self {
        Self {
            id: id.into(),
            provider,
        }
    }
}

fn non_empty<'a>(inputs: &'a Inputs, name: &str) -> Option<&'a str> {
    inputs.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

#[async_trait]
impl<P: CredentialsProvider> IdentityProvider for CredentialsStep<P> {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn step_type(&self) -> StepType {
        StepType::View
    }

    fn prompt(
        &self,
        _spec: &StepSpec,
        _flow_id: &str,
        _ctx: &mut FlowContext,
    ) -> Result<StepData, AuthError> {
        Ok(StepData::view(vec![
            InputField::required(USERNAME_INPUT, "string"),
            InputField::required(PASSWORD_INPUT, "password"),
        ]))
    }

    async fn verify(
        &self,
        _spec: &StepSpec,
        _ctx: &FlowContext,
        inputs: &Inputs,
    ) -> Result<StepVerdict, AuthError> {
        let (Some(username), Some(password)) = (
            non_empty(inputs, USERNAME_INPUT),
            non_empty(inputs, PASSWORD_INPUT),
        ) else {
            return Ok(StepVerdict::InputRequired);
        };

        match self.provider.authenticate(username, password).await? {
            Some(identity) => Ok(StepVerdict::Accepted(identity)),
            None => Ok(StepVerdict::Rejected("Invalid credentials".into())),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredUser {
    password_hash: String,
    email: Option<String>,
}

/// An in-memory user table keyed by username, holding Argon2id PHC hashes.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    users: HashMap<String, StoredUser>,
}

/// Hashes a password with Argon2id into a PHC string.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::ProviderConfig(format!("password hashing failed: {e}")))
}

/// Checks that `hash` is a PHC string [`StaticCredentials`] can verify against.
pub fn validate_password_hash(hash: &str) -> Result<(), AuthError> {
    PasswordHash::new(hash)
        .map(|_| ())
        .map_err(|e| AuthError::ProviderConfig(format!("invalid password hash: {e}")))
}

fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AuthError::ProviderConfig(format!("invalid password hash: {e}")))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::ProviderConfig(format!(
            "password verification failed: {e}"
        ))),
    }
}

impl StaticCredentials {
    /// An empty user table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user from a plaintext password.
    pub fn with_user(
        self,
        username: impl Into<String>,
        password: &str,
    ) -> Result<Self, AuthError> {
        Ok(self.with_hashed_user(username, hash_password(password)?, None))
    }

    /// Adds a user from an Argon2 PHC hash string.
    pub fn with_hashed_user(
        mut self,
        username: impl Into<String>,
        password_hash: impl Into<String>,
        email: Option<String>,
    ) -> Self {
        self.users.insert(
            username.into(),
            StoredUser {
                password_hash: password_hash.into(),
                email,
            },
        );
        self
    }
}

#[async_trait]
impl CredentialsProvider for StaticCredentials {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Identity>, AuthError> {
        let Some(user) = self.users.get(username) else {
            return Ok(None);
        };

        let hash = user.password_hash.clone();
        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::Provider(format!("password check did not finish: {e}")))??;
        if !matches {
            return Ok(None);
        }

        Ok(Some(Identity {
            provider_id: "basic".into(),
            external_id: username.to_string(),
            email: user.email.clone(),
            username: Some(username.to_string()),
            attributes: HashMap::new(),
        }))
    }
}
