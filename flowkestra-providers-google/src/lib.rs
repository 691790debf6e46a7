//! Google identity provider.
//!
//! Produces the redirection step that sends the browser to Google's
//! authorization endpoint, and verifies the callback by exchanging the
//! authorization code.

use async_trait::async_trait;
use flowkestra_core::{
    oauth::{self, CODE_INPUT, ERROR_DESCRIPTION_INPUT, ERROR_INPUT, STATE_INPUT},
    pkce::Pkce,
    AuthError, FlowContext, Identity, IdentityProvider, Inputs, StepData, StepSpec, StepType,
    StepVerdict,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Google's OAuth 2.0 authorization endpoint.
pub const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// Google's token endpoint.
pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
/// Google's OpenID Connect userinfo endpoint.
pub const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Scopes every Google step requests, whatever the step configures.
pub const REQUIRED_SCOPES: [&str; 3] = ["openid", "email", "profile"];

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const VERIFIER_KEY: &str = "code_verifier";

/// Step properties understood by [`GoogleProvider`].
pub mod properties {
    /// Overrides the provider's client id.
    pub const CLIENT_ID: &str = "client_id";
    /// Overrides the provider's client secret.
    pub const CLIENT_SECRET: &str = "client_secret";
    /// Overrides the provider's callback URI.
    pub const REDIRECT_URI: &str = "redirect_uri";
    /// Extra scopes, space or comma separated.
    pub const SCOPES: &str = "scopes";
    /// Set to `false` to leave PKCE out of the request.
    pub const PKCE: &str = "pkce";
    /// Passed through as `prompt`.
    pub const PROMPT: &str = "prompt";
    /// Passed through as `access_type`.
    pub const ACCESS_TYPE: &str = "access_type";
}

#[derive(Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
}

/// Redirect based Google login.
///
/// The constructor arguments are defaults; a step may override them through
/// its properties.
pub struct GoogleProvider {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    authorization_url: String,
    token_url: String,
    userinfo_url: String,
    http_client: reqwest::Client,
}

impl GoogleProvider {
    /// Create a provider with default credentials and callback URI.
    ///
    /// Empty values are allowed as long as every Google step supplies them
    /// through its properties.
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("Google HTTP client without timeout, builder failed: {e}");
                reqwest::Client::new()
            });
        Self {
            client_id,
            client_secret,
            redirect_uri,
            authorization_url: AUTHORIZATION_ENDPOINT.to_string(),
            token_url: TOKEN_ENDPOINT.to_string(),
            userinfo_url: USERINFO_ENDPOINT.to_string(),
            http_client,
        }
    }

    /// Points the provider at other endpoints, e.g. a mock server.
    pub fn with_endpoints(
        mut self,
        authorization_url: impl Into<String>,
        token_url: impl Into<String>,
        userinfo_url: impl Into<String>,
    ) -> Self {
        self.authorization_url = authorization_url.into();
        self.token_url = token_url.into();
        self.userinfo_url = userinfo_url.into();
        self
    }

    fn setting<'a>(&'a self, spec: &'a StepSpec, key: &str, default: &'a str) -> Option<&'a str> {
        spec.property(key)
            .or_else(|| Some(default.trim()).filter(|v| !v.is_empty()))
    }

    fn required_setting<'a>(
        &'a self,
        spec: &'a StepSpec,
        key: &str,
        default: &'a str,
    ) -> Result<&'a str, AuthError> {
        self.setting(spec, key, default).ok_or_else(|| {
            AuthError::ProviderConfig(format!("google step is missing {key}"))
        })
    }

    /// Builds the authorization redirect for `flow_id` and records the values
    /// needed to verify the callback in `ctx`.
    ///
    /// A `state` and PKCE verifier already recorded for this flow are reused,
    /// so prompting the step again keeps an earlier redirect valid.
    pub fn build_redirect(
        &self,
        spec: &StepSpec,
        flow_id: &str,
        ctx: &mut FlowContext,
    ) -> Result<String, AuthError> {
        let client_id = self.required_setting(spec, properties::CLIENT_ID, &self.client_id)?;
        let redirect_uri =
            self.required_setting(spec, properties::REDIRECT_URI, &self.redirect_uri)?;
        let scope = scopes(spec.property(properties::SCOPES)).join(" ");
        let state = ctx
            .value(STATE_INPUT)
            .filter(|s| oauth::flow_id_from_state(s) == Some(flow_id))
            .map(str::to_string)
            .unwrap_or_else(|| oauth::new_state(flow_id));

        let mut params = vec![
            ("client_id", client_id.to_string()),
            ("redirect_uri", redirect_uri.to_string()),
            ("response_type", "code".to_string()),
            ("scope", scope),
            ("state", state.clone()),
        ];

        let pkce = (spec.property(properties::PKCE) != Some("false")).then(|| {
            ctx.value(VERIFIER_KEY)
                .map(Pkce::from_verifier)
                .unwrap_or_default()
        });
        if let Some(pkce) = &pkce {
            params.push(("code_challenge", pkce.code_challenge.clone()));
            params.push(("code_challenge_method", "S256".to_string()));
        }
        for (key, param) in [
            (properties::PROMPT, "prompt"),
            (properties::ACCESS_TYPE, "access_type"),
        ] {
            if let Some(value) = spec.property(key) {
                params.push((param, value.to_string()));
            }
        }

        let url = url::Url::parse_with_params(&self.authorization_url, &params).map_err(|e| {
            AuthError::ProviderConfig(format!("invalid google authorization endpoint: {e}"))
        })?;

        ctx.set_value(STATE_INPUT, state);
        if let Some(pkce) = pkce {
            ctx.set_value(VERIFIER_KEY, pkce.code_verifier);
        }
        Ok(url.into())
    }

    async fn exchange_code(
        &self,
        spec: &StepSpec,
        ctx: &FlowContext,
        code: &str,
    ) -> Result<Option<GoogleTokenResponse>, AuthError> {
        let client_id = self.required_setting(spec, properties::CLIENT_ID, &self.client_id)?;
        let client_secret =
            self.required_setting(spec, properties::CLIENT_SECRET, &self.client_secret)?;
        let redirect_uri =
            self.required_setting(spec, properties::REDIRECT_URI, &self.redirect_uri)?;

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", redirect_uri),
        ];
        if let Some(verifier) = ctx.value(VERIFIER_KEY) {
            form.push(("code_verifier", verifier));
        }

        let response = self
            .http_client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Provider(format!("google token request failed: {e}")))?;

        let status = response.status();
        if status.is_client_error() {
            log::warn!("Google refused the authorization code: {status}");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AuthError::Provider(format!(
                "google token endpoint answered {status}"
            )));
        }
        response
            .json::<GoogleTokenResponse>()
            .await
            .map(Some)
            .map_err(|e| AuthError::Provider(format!("invalid google token response: {e}")))
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<Identity, AuthError> {
        let user = self
            .http_client
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Provider(format!("google userinfo request failed: {e}")))?
            .error_for_status()
            .map_err(|e| AuthError::Provider(format!("google userinfo failed: {e}")))?
            .json::<GoogleUserInfo>()
            .await
            .map_err(|e| AuthError::Provider(format!("invalid google userinfo: {e}")))?;

        let mut attributes = HashMap::new();
        let extras = [
            ("given_name", user.given_name),
            ("family_name", user.family_name),
            ("picture", user.picture),
            ("email_verified", user.email_verified.map(|v| v.to_string())),
        ];
        for (key, value) in extras {
            if let Some(value) = value {
                attributes.insert(key.to_string(), value);
            }
        }

        Ok(Identity {
            provider_id: "google".into(),
            external_id: user.sub,
            email: user.email,
            username: user.name,
            attributes,
        })
    }
}

/// The required scopes followed by any extra configured ones, without duplicates.
fn scopes(extra: Option<&str>) -> Vec<&str> {
    let mut scopes: Vec<&str> = REQUIRED_SCOPES.to_vec();
    for scope in extra
        .unwrap_or_default()
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
    {
        if !scopes.contains(&scope) {
            scopes.push(scope);
        }
    }
    scopes
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn provider_id(&self) -> &str {
        "google"
    }

    fn step_type(&self) -> StepType {
        StepType::Redirection
    }

    fn prompt(
        &self,
        spec: &StepSpec,
        flow_id: &str,
        ctx: &mut FlowContext,
    ) -> Result<StepData, AuthError> {
        self.build_redirect(spec, flow_id, ctx).map(StepData::redirect)
    }

    async fn verify(
        &self,
        spec: &StepSpec,
        ctx: &FlowContext,
        inputs: &Inputs,
    ) -> Result<StepVerdict, AuthError> {
        let field = |name: &str| inputs.get(name).map(String::as_str).filter(|v| !v.is_empty());
        let Some(state) = field(STATE_INPUT) else {
            return Ok(StepVerdict::InputRequired);
        };
        if ctx.value(STATE_INPUT) != Some(state) {
            return Err(AuthError::InvalidInput("OAuth state mismatch".into()));
        }

        let code = match (field(CODE_INPUT), field(ERROR_INPUT)) {
            (_, Some(error)) => {
                let reason = match field(ERROR_DESCRIPTION_INPUT) {
                    Some(detail) => format!("Google returned {error}: {detail}"),
                    None => format!("Google returned {error}"),
                };
                return Ok(StepVerdict::Rejected(reason));
            }
            (Some(code), None) => code,
            (None, None) => return Ok(StepVerdict::InputRequired),
        };

        let Some(token) = self.exchange_code(spec, ctx, code).await? else {
            return Ok(StepVerdict::Rejected(
                "Failed to exchange the authorization code".into(),
            ));
        };
        let identity = self.fetch_identity(&token.access_token).await?;
        Ok(StepVerdict::Accepted(identity))
    }
}
