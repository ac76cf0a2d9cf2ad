//! The secret-store seam.
//!
//! Handlers fetch credentials through the context's secret fetcher;
//! backends are behind [`SecretStore`]. Fetched values are registered in
//! the invocation's log mask so they never appear in log output.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors raised by a secret backend.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret not found at '{0}'")]
    NotFound(String),

    #[error("secret backend error: {0}")]
    Backend(String),
}

/// Resolves a secret path (e.g. `firebase/SERVICE_ACCOUNT`) to a value.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Value, SecretError>;
}

/// Secret store over process environment variables.
///
/// The path `firebase/SERVICE_ACCOUNT` maps to the variable
/// `FIREBASE_SERVICE_ACCOUNT`; values that parse as JSON are returned
/// structured, anything else as a string.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    pub fn new() -> Self {
        Self
    }

    fn var_name(path: &str) -> String {
        path.replace(['/', '-', '.'], "_").to_uppercase()
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get(&self, path: &str) -> Result<Value, SecretError> {
        let raw = std::env::var(Self::var_name(path))
            .map_err(|_| SecretError::NotFound(path.to_string()))?;
        Ok(serde_json::from_str(&raw).unwrap_or(Value::String(raw)))
    }
}

/// In-memory secret store for tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySecretStore {
    secrets: HashMap<String, Value>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, path: impl Into<String>, value: Value) -> Self {
        self.secrets.insert(path.into(), value);
        self
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, path: &str) -> Result<Value, SecretError> {
        self.secrets
            .get(path)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(path.to_string()))
    }
}
