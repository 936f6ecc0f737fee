use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::auth::AuthStatus;
use crate::capabilities::TimerId;
use crate::chat::{ChatId, ChatSession, DeliveryState, Message, MessageId, MessageKind, Sender};
use crate::config::CoreConfig;
use crate::error::AppError;
use crate::otp::{AttemptId, OtpChallenge, OtpStatus};
use crate::session_store::SessionStore;

/// Which navigation subtree the shell mounts.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NavigatorRoot {
    /// Blocks rendering until the persisted session has been read.
    #[default]
    Loading,
    Auth,
    User,
    Admin,
}

/// Advances whenever a session ends or begins. Chat results captured under an
/// older epoch belong to a session that no longer exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionEpoch(u64);

#[derive(Default, Debug)]
pub struct Model {
    pub config: CoreConfig,
    pub auth: AuthStatus,
    pub session_store: SessionStore,
    /// Present from phone submission until verification or abandonment.
    pub login: Option<OtpChallenge>,
    pub chats: BTreeMap<ChatId, ChatSession>,
    pub chat_init_pending: bool,
    pub active_error: Option<AppError>,
    last_timer_id: u64,
    last_attempt_id: u64,
    epoch: SessionEpoch,
}

impl Model {
    pub fn next_timer_id(&mut self) -> TimerId {
        self.last_timer_id += 1;
        TimerId(self.last_timer_id)
    }

    pub fn next_attempt_id(&mut self) -> AttemptId {
        self.last_attempt_id += 1;
        AttemptId(self.last_attempt_id)
    }

    #[must_use]
    pub const fn epoch(&self) -> SessionEpoch {
        self.epoch
    }

    pub fn advance_epoch(&mut self) {
        self.epoch = SessionEpoch(self.epoch.0 + 1);
    }

    pub fn set_error(&mut self, error: AppError) {
        self.active_error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.active_error = None;
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorView {
    pub code: String,
    pub message: String,
    pub is_retryable: bool,
}

impl From<&AppError> for ErrorView {
    fn from(e: &AppError) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.user_facing_message(),
            is_retryable: e.is_retryable(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LoginView {
    pub phone_number: String,
    pub region: String,
    pub city: String,
    pub digits: Vec<String>,
    pub focused_index: usize,
    pub seconds_remaining: u32,
    pub can_resend: bool,
    pub can_verify: bool,
    pub is_requesting: bool,
    pub status: OtpStatus,
}

impl From<&OtpChallenge> for LoginView {
    fn from(c: &OtpChallenge) -> Self {
        Self {
            phone_number: c.phone_number().to_string(),
            region: c.region().to_string(),
            city: c.city().to_string(),
            digits: c
                .digits()
                .iter()
                .map(|d| d.map(String::from).unwrap_or_default())
                .collect(),
            focused_index: c.focused(),
            seconds_remaining: c.seconds_remaining(),
            can_resend: c.can_resend(),
            can_verify: c.can_verify(),
            is_requesting: c.is_requesting(),
            status: c.status(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryView {
    Sending,
    Sent,
    Failed,
    Received,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MessageView {
    pub id: String,
    /// Server-assigned id once the message is confirmed or was received.
    pub server_id: Option<String>,
    pub content: String,
    pub kind: String,
    pub is_own: bool,
    pub created_at_ms: u64,
    pub delivery: DeliveryView,
    pub failure_reason: Option<String>,
    pub media_url: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl MessageView {
    #[must_use]
    pub fn new(m: &Message, server_id: Option<&MessageId>) -> Self {
        let (delivery, failure_reason) = match &m.delivery {
            DeliveryState::Sending => (DeliveryView::Sending, None),
            DeliveryState::Sent => (DeliveryView::Sent, None),
            DeliveryState::Failed { reason } => (DeliveryView::Failed, Some(reason.clone())),
            DeliveryState::Received => (DeliveryView::Received, None),
        };
        let coordinates = match &m.kind {
            MessageKind::Location { coordinates } => Some(*coordinates),
            _ => None,
        };

        Self {
            id: m.id.to_string(),
            server_id: server_id.map(ToString::to_string),
            content: m.content.clone(),
            kind: m.kind.label().to_string(),
            is_own: m.sender == Sender::Me,
            created_at_ms: m.created_at.as_millis(),
            delivery,
            failure_reason,
            media_url: m.media_ref().map(|r| r.as_str().to_string()),
            latitude: coordinates.map(|c| c.lat()),
            longitude: coordinates.map(|c| c.lon()),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatView {
    pub chat_id: String,
    pub messages: Vec<MessageView>,
    pub draft: String,
    pub is_loading_history: bool,
    pub last_synced_at_ms: Option<u64>,
    pub failed_count: usize,
}

impl From<&ChatSession> for ChatView {
    fn from(s: &ChatSession) -> Self {
        Self {
            chat_id: s.chat_id().to_string(),
            messages: s
                .messages()
                .iter()
                .map(|m| MessageView::new(m, s.server_id_for(&m.id)))
                .collect(),
            draft: s.draft().to_string(),
            is_loading_history: s.is_history_loading(),
            last_synced_at_ms: s.last_synced_at().map(crate::UnixTimeMs::as_millis),
            failed_count: s.failed_count(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ViewModel {
    pub root: NavigatorRoot,
    pub login: Option<LoginView>,
    pub chats: Vec<ChatView>,
    pub chat_init_pending: bool,
    pub error: Option<ErrorView>,
    pub is_authenticated: bool,
    pub phone_number: Option<String>,
}
