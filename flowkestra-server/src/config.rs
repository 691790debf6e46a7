use flowkestra_core::{Application, FlowDefinition};
use flowkestra_flow::{
    credentials::validate_password_hash, CredentialsStep, FlowEngine, MemoryFlowStore,
    StaticCredentials, StaticRegistry, DEFAULT_FLOW_TTL_SECS,
};
use flowkestra_providers_google::GoogleProvider;
use flowkestra_token::TokenManager;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8090";
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

const BASIC_PROVIDER: &str = "basic";
const GOOGLE_PROVIDER: &str = "google";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid applications file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("user {username} has an unusable password hash")]
    InvalidPasswordHash { username: String },
    #[error("flow {flow} uses unknown provider {provider}")]
    UnknownProvider { flow: String, provider: String },
}

/// Process settings, taken from `FLOWKESTRA_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub flow_ttl_secs: i64,
    pub sweep_interval: Duration,
    pub apps_file: Option<PathBuf>,
    pub jwt_secret: Option<String>,
    pub jwt_issuer: Option<String>,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_redirect_uri: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = parse_or(
            "FLOWKESTRA_BIND_ADDR",
            var("FLOWKESTRA_BIND_ADDR"),
            DEFAULT_BIND_ADDR.parse().ok(),
        )?;
        let flow_ttl_secs: i64 = parse_or(
            "FLOWKESTRA_FLOW_TTL_SECS",
            var("FLOWKESTRA_FLOW_TTL_SECS"),
            Some(DEFAULT_FLOW_TTL_SECS),
        )?;
        if flow_ttl_secs <= 0 {
            return Err(ConfigError::Invalid {
                var: "FLOWKESTRA_FLOW_TTL_SECS",
                value: flow_ttl_secs.to_string(),
            });
        }
        let sweep_secs: u64 = parse_or(
            "FLOWKESTRA_SWEEP_INTERVAL_SECS",
            var("FLOWKESTRA_SWEEP_INTERVAL_SECS"),
            Some(DEFAULT_SWEEP_INTERVAL_SECS),
        )?;
        if sweep_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "FLOWKESTRA_SWEEP_INTERVAL_SECS",
                value: "0".into(),
            });
        }

        Ok(Self {
            bind_addr,
            flow_ttl_secs,
            sweep_interval: Duration::from_secs(sweep_secs),
            apps_file: var("FLOWKESTRA_APPS_FILE").map(PathBuf::from),
            jwt_secret: var("FLOWKESTRA_JWT_SECRET"),
            jwt_issuer: var("FLOWKESTRA_JWT_ISSUER"),
            google_client_id: var("FLOWKESTRA_GOOGLE_CLIENT_ID").unwrap_or_default(),
            google_client_secret: var("FLOWKESTRA_GOOGLE_CLIENT_SECRET").unwrap_or_default(),
            google_redirect_uri: var("FLOWKESTRA_GOOGLE_REDIRECT_URI").unwrap_or_default(),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: Option<T>,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var: name,
            value,
        }),
        None => default.ok_or(ConfigError::Invalid {
            var: name,
            value: String::new(),
        }),
    }
}

/// A user accepted by `basic` steps.
#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
    pub username: String,
    /// Argon2 PHC string, e.g. `$argon2id$v=19$m=19456,t=2,p=1$...`.
    pub password_hash: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Contents of `FLOWKESTRA_APPS_FILE`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppsFile {
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default)]
    pub flows: Vec<FlowDefinition>,
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

impl AppsFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let apps: AppsFile = serde_json::from_str(raw)?;
        for flow in &apps.flows {
            if let Some(step) = flow
                .steps
                .iter()
                .find(|s| s.provider != BASIC_PROVIDER && s.provider != GOOGLE_PROVIDER)
            {
                return Err(ConfigError::UnknownProvider {
                    flow: flow.name.clone(),
                    provider: step.provider.clone(),
                });
            }
        }
        for user in &apps.users {
            if validate_password_hash(&user.password_hash).is_err() {
                return Err(ConfigError::InvalidPasswordHash {
                    username: user.username.clone(),
                });
            }
        }
        Ok(apps)
    }
}

/// Assembles the engine with the `basic` and `google` providers.
pub fn build_engine(config: &ServerConfig, apps: AppsFile) -> FlowEngine {
    let registry = apps
        .flows
        .into_iter()
        .fold(StaticRegistry::new(), StaticRegistry::with_flow);
    let registry = apps
        .applications
        .into_iter()
        .fold(registry, StaticRegistry::with_application);

    let credentials = apps
        .users
        .into_iter()
        .fold(StaticCredentials::new(), |creds, user| {
            creds.with_hashed_user(user.username, user.password_hash, user.email)
        });

    let google = GoogleProvider::new(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
        config.google_redirect_uri.clone(),
    );

    let mut builder = FlowEngine::builder()
        .provider(CredentialsStep::new(credentials))
        .provider(google)
        .flow_ttl(chrono::Duration::seconds(config.flow_ttl_secs));

    match &config.jwt_secret {
        Some(secret) => {
            let mut manager = TokenManager::new(secret.as_bytes());
            if let Some(issuer) = &config.jwt_issuer {
                manager = manager.with_issuer(issuer.clone());
            }
            builder = builder.token_manager(Arc::new(manager));
        }
        None => log::warn!("FLOWKESTRA_JWT_SECRET is not set; completed flows carry no assertion"),
    }

    builder
        .registry(Arc::new(registry))
        .store(Arc::new(MemoryFlowStore::new()))
        .build()
}
