use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{
    DEFAULT_API_BASE_URL, MIN_PHONE_DIGITS, OTP_COUNTDOWN_SECS, OTP_TICK_MS,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("config is not valid JSON: {0}")]
    Parse(String),
    #[error("invalid api_base_url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Runtime tunables handed to the core by the shell on start-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub api_base_url: String,
    pub otp_countdown_secs: u32,
    pub otp_tick_ms: u64,
    pub min_phone_digits: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            otp_countdown_secs: OTP_COUNTDOWN_SECS,
            otp_tick_ms: OTP_TICK_MS,
            min_phone_digits: MIN_PHONE_DIGITS,
        }
    }
}

impl CoreConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;

        if self.otp_countdown_secs == 0 {
            return Err(ConfigError::Zero {
                field: "otp_countdown_secs",
            });
        }
        if self.otp_tick_ms == 0 {
            return Err(ConfigError::Zero { field: "otp_tick_ms" });
        }
        if self.min_phone_digits == 0 {
            return Err(ConfigError::Zero {
                field: "min_phone_digits",
            });
        }
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidBaseUrl {
            url: self.api_base_url.clone(),
            reason: reason.to_string(),
        };

        let url = Url::parse(&self.api_base_url).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(invalid("url has no host"));
        }
        Ok(url)
    }

    /// Joins an endpoint path onto the base URL, keeping any base path prefix.
    pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
        let mut url = self.base_url()?;
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base_path}/{}", path.trim_start_matches('/')));
        Ok(url)
    }

    /// Like `endpoint`, with `id` appended as one percent-encoded segment.
    pub fn endpoint_with_id(&self, path: &str, id: &str) -> Result<Url, ConfigError> {
        let mut url = self.endpoint(path)?;
        url.path_segments_mut()
            .map_err(|()| ConfigError::InvalidBaseUrl {
                url: self.api_base_url.clone(),
                reason: "url cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }
}
