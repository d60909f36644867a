use std::env;

use thiserror::Error;

pub const ENV_BASE_URL: &str = "CRM_GATEWAY_BASE_URL";
pub const ENV_PROJECT_ID: &str = "CRM_PROJECT_ID";
pub const ENV_PUBLIC_KEY: &str = "CRM_PUBLIC_KEY";
pub const ENV_TIMEOUT_MS: &str = "CRM_GATEWAY_TIMEOUT_MS";

pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const MIN_TIMEOUT_MS: u64 = 250;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{ENV_BASE_URL} is required")]
    BaseUrlMissing,
    #[error("invalid {ENV_BASE_URL}: {0}")]
    InvalidBaseUrl(String),
    #[error("{ENV_PROJECT_ID} is required")]
    ProjectIdMissing,
    #[error("{ENV_PUBLIC_KEY} is required")]
    PublicKeyMissing,
    #[error("invalid {ENV_TIMEOUT_MS}: {0}")]
    InvalidTimeout(String),
}

/// Values that take precedence over the environment (CLI flags).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub project_id: Option<String>,
    pub public_key: Option<String>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub base_url: String,
    pub project_id: String,
    pub public_key: String,
    pub timeout_ms: u64,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("project_id", &self.project_id)
            .field("public_key", &"<redacted>")
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl GatewayConfig {
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        public_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            project_id: project_id.into(),
            public_key: public_key.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(&ConfigOverrides::default())
    }

    pub fn from_env_with(overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let base_url = pick(overrides.base_url.as_deref(), ENV_BASE_URL)
            .ok_or(ConfigError::BaseUrlMissing)
            .and_then(|raw| normalize_base_url(&raw))?;
        let project_id =
            pick(overrides.project_id.as_deref(), ENV_PROJECT_ID).ok_or(ConfigError::ProjectIdMissing)?;
        let public_key =
            pick(overrides.public_key.as_deref(), ENV_PUBLIC_KEY).ok_or(ConfigError::PublicKeyMissing)?;
        let timeout_ms = match env_non_empty(ENV_TIMEOUT_MS) {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|error| ConfigError::InvalidTimeout(error.to_string()))?
                .max(MIN_TIMEOUT_MS),
            None => DEFAULT_TIMEOUT_MS,
        };
        Ok(Self {
            base_url,
            project_id,
            public_key,
            timeout_ms,
        })
    }
}

/// Trims, requires an http(s) scheme, and strips trailing slashes.
pub fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::BaseUrlMissing);
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::InvalidBaseUrl(trimmed.to_string()));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

fn pick(preferred: Option<&str>, key: &str) -> Option<String> {
    preferred
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| env_non_empty(key))
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
