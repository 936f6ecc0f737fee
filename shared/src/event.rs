use serde::{Deserialize, Serialize};

use crate::api::ApiResult;
use crate::auth::Session;
use crate::capabilities::{DeviceError, KvError, TimerOutput};
use crate::chat::{ChatId, Coordinates, MediaRef, MessageId};
use crate::config::CoreConfig;
use crate::model::SessionEpoch;
use crate::otp::AttemptId;

#[derive(Serialize, Deserialize, Debug)]
pub enum Event {
    Noop,

    // --- Lifecycle ---
    AppStarted {
        config: CoreConfig,
    },
    DismissError,

    // --- Login ---
    PhoneSubmitted {
        phone_number: String,
        region: String,
        city: String,
    },
    CodeDigitChanged {
        index: usize,
        value: String,
    },
    CodeBackspace {
        index: usize,
    },
    CodeSlotFocused {
        index: usize,
    },
    VerifyCodeRequested,
    ResendCodeRequested,
    LoginAbandoned,
    LogoutRequested,

    // --- Chat ---
    StartChat,
    OpenChat {
        chat_id: ChatId,
    },
    CloseChat {
        chat_id: ChatId,
    },
    RefreshHistory {
        chat_id: ChatId,
    },
    DraftChanged {
        chat_id: ChatId,
        text: String,
    },
    SendTextRequested {
        chat_id: ChatId,
    },
    AttachImageRequested {
        chat_id: ChatId,
    },
    ShareLocationRequested {
        chat_id: ChatId,
    },
    RetryMessage {
        chat_id: ChatId,
        message_id: MessageId,
    },

    // --- Capability responses (internal) ---
    // Login results carry the attempt that sent them; chat results carry the
    // session epoch they were issued under.
    #[serde(skip)]
    SessionRestored(Result<Option<Session>, KvError>),
    #[serde(skip)]
    SessionPersisted(Result<(), KvError>),
    #[serde(skip)]
    SessionCleared(Result<(), KvError>),
    #[serde(skip)]
    CodeRequestResponse {
        attempt: AttemptId,
        resend: bool,
        result: Box<ApiResult>,
    },
    #[serde(skip)]
    VerifyResponse {
        attempt: AttemptId,
        result: Box<ApiResult>,
    },
    #[serde(skip)]
    OtpTick(TimerOutput),
    #[serde(skip)]
    ChatInitResponse {
        epoch: SessionEpoch,
        result: Box<ApiResult>,
    },
    #[serde(skip)]
    HistoryResponse {
        epoch: SessionEpoch,
        chat_id: ChatId,
        result: Box<ApiResult>,
    },
    #[serde(skip)]
    SendResponse {
        epoch: SessionEpoch,
        chat_id: ChatId,
        message_id: MessageId,
        result: Box<ApiResult>,
    },
    #[serde(skip)]
    ImagePicked {
        epoch: SessionEpoch,
        chat_id: ChatId,
        result: Result<Option<MediaRef>, DeviceError>,
    },
    #[serde(skip)]
    LocationResolved {
        epoch: SessionEpoch,
        chat_id: ChatId,
        result: Result<Coordinates, DeviceError>,
    },
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::AppStarted { .. } => "app_started",
            Self::DismissError => "dismiss_error",
            Self::PhoneSubmitted { .. } => "phone_submitted",
            Self::CodeDigitChanged { .. } => "code_digit_changed",
            Self::CodeBackspace { .. } => "code_backspace",
            Self::CodeSlotFocused { .. } => "code_slot_focused",
            Self::VerifyCodeRequested => "verify_code_requested",
            Self::ResendCodeRequested => "resend_code_requested",
            Self::LoginAbandoned => "login_abandoned",
            Self::LogoutRequested => "logout_requested",
            Self::StartChat => "start_chat",
            Self::OpenChat { .. } => "open_chat",
            Self::CloseChat { .. } => "close_chat",
            Self::RefreshHistory { .. } => "refresh_history",
            Self::DraftChanged { .. } => "draft_changed",
            Self::SendTextRequested { .. } => "send_text_requested",
            Self::AttachImageRequested { .. } => "attach_image_requested",
            Self::ShareLocationRequested { .. } => "share_location_requested",
            Self::RetryMessage { .. } => "retry_message",
            Self::SessionRestored(_) => "session_restored",
            Self::SessionPersisted(_) => "session_persisted",
            Self::SessionCleared(_) => "session_cleared",
            Self::CodeRequestResponse { .. } => "code_request_response",
            Self::VerifyResponse { .. } => "verify_response",
            Self::OtpTick(_) => "otp_tick",
            Self::ChatInitResponse { .. } => "chat_init_response",
            Self::HistoryResponse { .. } => "history_response",
            Self::SendResponse { .. } => "send_response",
            Self::ImagePicked { .. } => "image_picked",
            Self::LocationResolved { .. } => "location_resolved",
        }
    }

    /// Events the shell sends on behalf of the user, as opposed to capability results.
    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::PhoneSubmitted { .. }
                | Self::VerifyCodeRequested
                | Self::ResendCodeRequested
                | Self::LoginAbandoned
                | Self::LogoutRequested
                | Self::StartChat
                | Self::OpenChat { .. }
                | Self::CloseChat { .. }
                | Self::SendTextRequested { .. }
                | Self::AttachImageRequested { .. }
                | Self::ShareLocationRequested { .. }
                | Self::RetryMessage { .. }
        )
    }
}
