// lib.rs - shared core for the citizen messaging client

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod api;
pub mod app;
pub mod auth;
pub mod capabilities;
pub mod chat;
pub mod config;
pub mod error;
pub mod event;
pub mod model;
pub mod otp;
pub mod session_store;

use serde::{Deserialize, Serialize};

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use config::CoreConfig;
pub use crux_core::{render::Render, App as CruxApp};
pub use error::{AppError, AppResult, ErrorKind};
pub use event::Event;
pub use model::{Model, NavigatorRoot, ViewModel};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
pub const OTP_CODE_LENGTH: usize = 6;
pub const OTP_COUNTDOWN_SECS: u32 = 60;
pub const OTP_TICK_MS: u64 = 1000;
pub const MIN_PHONE_DIGITS: usize = 10;
pub const MAX_MESSAGE_LENGTH: usize = 4096;

#[must_use]
pub fn get_current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Explicit timestamp unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    #[must_use]
    pub fn now() -> Self {
        Self(get_current_time_ms())
    }

    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }
}

impl Default for UnixTimeMs {
    fn default() -> Self {
        Self::now()
    }
}
