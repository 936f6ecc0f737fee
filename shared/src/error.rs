use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::capabilities::{DeviceError, KvError};
use crate::config::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed input caught before any network call.
    Validation,
    /// The server rejected the code or the credentials.
    Auth,
    /// Transport failure or timeout.
    Network,
    /// A device capability was refused.
    PermissionDenied,
    /// A 401 invalidated the current session.
    SessionExpired,
    Storage,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Auth => "AUTH_ERROR",
            Self::Network => "NETWORK_ERROR",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::Storage => "STORAGE_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// Whether repeating the same user action can succeed without changing input.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Storage)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            internal_message: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Validation => self.message.clone(),
            ErrorKind::Auth => "The code was not accepted. Please check it and try again.".into(),
            ErrorKind::Network => {
                "Unable to connect. Please check your internet connection and try again.".into()
            }
            ErrorKind::PermissionDenied => format!(
                "{} Please enable the permission in Settings.",
                self.message
            ),
            ErrorKind::SessionExpired => "Your session has expired. Please sign in again.".into(),
            ErrorKind::Storage => "Unable to save data on this device.".into(),
            ErrorKind::Internal => {
                "An unexpected error occurred. Please try again or contact support.".into()
            }
        }
    }

    /// Maps a non-success status from the login endpoint.
    #[must_use]
    pub fn from_http_status(status: u16, body: Option<&[u8]>) -> Self {
        let kind = match status {
            400..=499 => ErrorKind::Auth,
            _ => ErrorKind::Network,
        };

        let message = body
            .and_then(|b| serde_json::from_slice::<ApiErrorResponse>(b).ok())
            .map(|e| e.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("HTTP error: {status}"));

        Self::new(kind, message).with_context("http_status", status.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    message: String,
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Phone number must contain at least {min} digits (got {digits})")]
    PhoneTooShort { digits: usize, min: usize },
    #[error("Verification code must have {expected} digits")]
    IncompleteCode { expected: usize },
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Message exceeds {max} characters")]
    MessageTooLong { max: usize },
    #[error("Image message has no media reference")]
    MissingMedia,
    #[error("Coordinates out of range: lat={lat}, lon={lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },
}

impl ValidationError {
    #[must_use]
    pub fn phone_too_short(digits: usize, min: usize) -> Self {
        Self::PhoneTooShort { digits, min }
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::new(ErrorKind::Validation, e.to_string())
    }
}

impl From<crux_http::Error> for AppError {
    fn from(e: crux_http::Error) -> Self {
        let error = match &e {
            crux_http::Error::Http(http) => AppError::new(ErrorKind::Network, "Request failed")
                .with_context("http_status", u16::from(http.code).to_string()),
            crux_http::Error::Timeout => AppError::new(ErrorKind::Network, "Request timed out"),
            crux_http::Error::Json(_) => {
                AppError::new(ErrorKind::Network, "Unexpected response from the server")
            }
            crux_http::Error::Url(_) | crux_http::Error::Io(_) => {
                AppError::new(ErrorKind::Network, "Network error")
            }
        };
        error.with_internal(e.to_string())
    }
}

impl From<KvError> for AppError {
    fn from(e: KvError) -> Self {
        AppError::new(ErrorKind::Storage, "Storage error").with_internal(e.to_string())
    }
}

impl From<DeviceError> for AppError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::PermissionDenied { feature } => {
                AppError::new(ErrorKind::PermissionDenied, feature.label())
            }
            other => AppError::new(ErrorKind::Internal, "Device feature unavailable")
                .with_internal(other.to_string()),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::new(ErrorKind::Internal, "Invalid configuration").with_internal(e.to_string())
    }
}
