use crate::traits::SecretStore;
use crate::types::{PipelineError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::env;
use tracing::debug;

/// Secrets resolved from environment variables: `instagram_access_token` is read
/// from `{PREFIX}INSTAGRAM_ACCESS_TOKEN`.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretStore {
    prefix: String,
}

impl EnvSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn variable_for(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name.to_ascii_uppercase())
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String> {
        let variable = self.variable_for(name);
        debug!("Resolving secret {} from ${}", name, variable);

        match env::var(&variable) {
            Ok(value) if !value.trim().is_empty() => Ok(value),
            Ok(_) => Err(PipelineError::Secret {
                name: name.to_string(),
                message: format!("${} is empty", variable),
            }),
            Err(e) => Err(PipelineError::Secret {
                name: name.to_string(),
                message: format!("${}: {}", variable, e),
            }),
        }
    }
}

/// Fixed set of secrets, for local runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretStore {
    secrets: HashMap<String, String>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String> {
        self.secrets
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::Secret {
                name: name.to_string(),
                message: "not configured".to_string(),
            })
    }
}
