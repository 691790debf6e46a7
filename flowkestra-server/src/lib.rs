//! Standalone flow execution server.
//!
//! Reads its settings from the environment (see [`config::ServerConfig`]) and
//! its applications and flows from a JSON file (see [`config::AppsFile`]).

pub mod config;

pub use config::{build_engine, AppsFile, ConfigError, ServerConfig};
