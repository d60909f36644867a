use std::env;

pub const ENV_PAGE_LIMIT: &str = "CRM_PAGE_LIMIT";
pub const ENV_PAGE_OFFSET: &str = "CRM_PAGE_OFFSET";
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("{ENV_PAGE_LIMIT} must be a positive integer, got `{0}`")]
    InvalidPageLimit(String),
    #[error("{ENV_PAGE_OFFSET} must be a non-negative integer, got `{0}`")]
    InvalidPageOffset(String),
}

/// Paging of bulk loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub page_limit: u32,
    pub page_offset: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_limit: DEFAULT_PAGE_LIMIT,
            page_offset: 0,
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        let mut settings = Self::default();
        if let Some(raw) = env_non_empty(ENV_PAGE_LIMIT) {
            settings.page_limit = raw
                .parse::<u32>()
                .ok()
                .filter(|limit| *limit > 0)
                .ok_or(SettingsError::InvalidPageLimit(raw))?;
        }
        if let Some(raw) = env_non_empty(ENV_PAGE_OFFSET) {
            settings.page_offset = raw
                .parse::<u32>()
                .map_err(|_| SettingsError::InvalidPageOffset(raw))?;
        }
        Ok(settings)
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
