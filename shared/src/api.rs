//! Request and response bodies of the remote API.

use serde::{Deserialize, Deserializer, Serialize};

use crate::chat::{
    ChatId, Coordinates, IncomingMessage, MediaRef, Message, MessageId, MessageKind, Sender,
};
use crate::UnixTimeMs;

pub const LOGIN_PATH: &str = "/auth/login";
pub const CHAT_INIT_PATH: &str = "/chat/init";
pub const CHAT_MESSAGE_PATH: &str = "/chat/message";
pub const CHAT_HISTORY_PATH: &str = "/chat/history";

pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// What `crux_http` hands back for a request sent with `RequestBuilder::send`.
/// Statuses of 400 and above arrive as `crux_http::Error::Http`.
pub type ApiResult = crux_http::Result<crux_http::Response<Vec<u8>>>;

/// `code: None` asks for a code; `Some` verifies one. Both go to the same endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub phone_number: String,
    pub code: Option<String>,
    pub region: String,
    pub city: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatInitResponse {
    #[serde(alias = "id", deserialize_with = "string_or_number")]
    pub chat_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireMessageType {
    Text,
    Image,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub chat_id: String,
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub kind: WireMessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

impl SendMessageRequest {
    /// Location has no wire type of its own; it travels as a `geo:` text body.
    #[must_use]
    pub fn from_message(chat_id: &ChatId, message: &Message) -> Self {
        let (kind, body, media_url) = match &message.kind {
            MessageKind::Text | MessageKind::System => {
                (WireMessageType::Text, Some(message.content.clone()), None)
            }
            MessageKind::Image { media } => {
                (WireMessageType::Image, None, Some(media.as_str().to_string()))
            }
            MessageKind::Location { coordinates } => {
                (WireMessageType::Text, Some(coordinates.to_geo_uri()), None)
            }
        };

        Self {
            chat_id: chat_id.as_str().to_string(),
            message: body,
            kind,
            media_url,
        }
    }
}

/// Server echo of a sent message. Only the id is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SendMessageResponse {
    #[serde(default, alias = "_id", alias = "messageId", deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct WireLocation {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    #[serde(alias = "_id", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, alias = "message")]
    pub content: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default, alias = "createdAt")]
    pub timestamp: Option<serde_json::Value>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub location: Option<WireLocation>,
}

impl HistoryItem {
    /// `fallback_time` stands in for a missing or non-numeric timestamp.
    #[must_use]
    pub fn into_incoming(self, fallback_time: UnixTimeMs) -> IncomingMessage {
        let content = self.content.unwrap_or_default();
        let kind_tag = self.kind.as_deref().unwrap_or("text").to_ascii_lowercase();

        let kind = match kind_tag.as_str() {
            "system" => MessageKind::System,
            "image" | "video" => match self.media_url.and_then(MediaRef::new) {
                Some(media) => MessageKind::Image { media },
                None => MessageKind::Text,
            },
            "location" => self
                .location
                .and_then(|l| Coordinates::new(l.latitude, l.longitude).ok())
                .or_else(|| Coordinates::parse_geo_uri(&content))
                .map_or(MessageKind::Text, |coordinates| MessageKind::Location {
                    coordinates,
                }),
            _ => Coordinates::parse_geo_uri(&content)
                .map_or(MessageKind::Text, |coordinates| MessageKind::Location {
                    coordinates,
                }),
        };

        let sender = match self.sender.as_deref() {
            Some("user" | "self" | "me") if kind != MessageKind::System => Sender::Me,
            _ => Sender::Peer,
        };

        let created_at = self
            .timestamp
            .as_ref()
            .and_then(|v| match v {
                serde_json::Value::Number(n) => n.as_u64(),
                serde_json::Value::String(s) => s.parse().ok(),
                _ => None,
            })
            .map_or(fallback_time, UnixTimeMs);

        IncomingMessage {
            server_id: MessageId::new(self.id),
            content,
            kind,
            sender,
            created_at,
        }
    }
}

/// The history endpoint answers either a bare list or `{ "messages": [...] }`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HistoryResponse {
    List(Vec<HistoryItem>),
    Wrapped { messages: Vec<HistoryItem> },
}

impl HistoryResponse {
    #[must_use]
    pub fn into_items(self) -> Vec<HistoryItem> {
        match self {
            Self::List(items) | Self::Wrapped { messages: items } => items,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    opt_string_or_number(deserializer)?
        .ok_or_else(|| serde::de::Error::custom("expected a string or number id"))
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
