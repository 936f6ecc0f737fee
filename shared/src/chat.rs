//! Per-thread message sequence with optimistic echo and id reconciliation.
//!
//! A `ChatSession` never reorders its sequence. Own messages are appended at
//! compose time under a client id; when the server confirms one, the server id
//! is recorded in a lookup table and the message keeps its client id and its
//! position. Every later reference to a server id (history, peer echoes) goes
//! through that table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::ValidationError;
use crate::{UnixTimeMs, MAX_MESSAGE_LENGTH};

const GEO_SCHEME: &str = "geo:";

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(ChatId);
typed_id!(MessageId);

impl MessageId {
    /// Fresh client-side id for an optimistic message.
    #[must_use]
    pub fn temporary() -> Self {
        Self(format!("tmp-{}", uuid::Uuid::new_v4()))
    }
}

/// Validated, NaN-safe lat/lon pair.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct Coordinates {
    lat: f64,
    lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Result<Self, ValidationError> {
        if !lat.is_finite()
            || !lon.is_finite()
            || !(-90.0..=90.0).contains(&lat)
            || !(-180.0..=180.0).contains(&lon)
        {
            return Err(ValidationError::InvalidCoordinates { lat, lon });
        }
        Ok(Self { lat, lon })
    }

    #[must_use]
    pub const fn lat(&self) -> f64 {
        self.lat
    }

    #[must_use]
    pub const fn lon(&self) -> f64 {
        self.lon
    }

    #[must_use]
    pub fn to_geo_uri(&self) -> String {
        format!("{GEO_SCHEME}{},{}", self.lat, self.lon)
    }

    /// Parses `geo:<lat>,<lon>`; extra `;param` suffixes are ignored.
    #[must_use]
    pub fn parse_geo_uri(s: &str) -> Option<Self> {
        let rest = s.trim().strip_prefix(GEO_SCHEME)?;
        let rest = rest.split(';').next()?;
        let (lat, lon) = rest.split_once(',')?;
        Self::new(lat.trim().parse().ok()?, lon.trim().parse().ok()?).ok()
    }
}

impl PartialEq for Coordinates {
    fn eq(&self, other: &Self) -> bool {
        self.lat.to_bits() == other.lat.to_bits() && self.lon.to_bits() == other.lon.to_bits()
    }
}

impl Eq for Coordinates {}

/// Handle to a picked image. The core never holds image bytes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MediaRef(String);

impl MediaRef {
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Option<Self> {
        let uri = uri.into();
        if uri.trim().is_empty() {
            None
        } else {
            Some(Self(uri))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The attachment lives inside the variant, so a media reference or a
/// coordinate pair can only exist on the matching kind.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image { media: MediaRef },
    Location { coordinates: Coordinates },
    System,
}

impl MessageKind {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image { .. } => "image",
            Self::Location { .. } => "location",
            Self::System => "system",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    #[serde(rename = "self")]
    Me,
    Peer,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Sending,
    Sent,
    Failed { reason: String },
    /// Peer and system messages, and own messages learned from history.
    Received,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub kind: MessageKind,
    pub sender: Sender,
    pub created_at: UnixTimeMs,
    pub delivery: DeliveryState,
}

impl Message {
    #[must_use]
    pub fn media_ref(&self) -> Option<&MediaRef> {
        match &self.kind {
            MessageKind::Image { media } => Some(media),
            _ => None,
        }
    }

    #[must_use]
    pub fn coordinates(&self) -> Option<Coordinates> {
        match &self.kind {
            MessageKind::Location { coordinates } => Some(*coordinates),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.delivery, DeliveryState::Failed { .. })
    }
}

/// What the user asked to send, before validation.
#[derive(Clone, Debug, PartialEq)]
pub enum Outgoing {
    Text(String),
    Image(MediaRef),
    Location(Coordinates),
}

impl Outgoing {
    fn into_parts(self) -> Result<(String, MessageKind), ValidationError> {
        match self {
            Self::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Err(ValidationError::EmptyMessage);
                }
                if trimmed.chars().count() > MAX_MESSAGE_LENGTH {
                    return Err(ValidationError::MessageTooLong {
                        max: MAX_MESSAGE_LENGTH,
                    });
                }
                Ok((trimmed.to_string(), MessageKind::Text))
            }
            Self::Image(media) => {
                if media.as_str().trim().is_empty() {
                    return Err(ValidationError::MissingMedia);
                }
                Ok(("Image".to_string(), MessageKind::Image { media }))
            }
            Self::Location(coordinates) => Ok((
                "Location".to_string(),
                MessageKind::Location { coordinates },
            )),
        }
    }
}

/// A message that originated on the server (history item or peer echo).
#[derive(Clone, Debug, PartialEq)]
pub struct IncomingMessage {
    pub server_id: MessageId,
    pub content: String,
    pub kind: MessageKind,
    pub sender: Sender,
    pub created_at: UnixTimeMs,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatSession {
    chat_id: ChatId,
    messages: Vec<Message>,
    /// Client id -> server id, filled in on send confirmation.
    confirmed: HashMap<MessageId, MessageId>,
    /// Server id -> id of the message that displays it.
    by_server_id: HashMap<MessageId, MessageId>,
    draft: String,
    last_synced_at: Option<UnixTimeMs>,
    history_loading: bool,
}

impl ChatSession {
    #[must_use]
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            messages: Vec::new(),
            confirmed: HashMap::new(),
            by_server_id: HashMap::new(),
            draft: String::new(),
            last_synced_at: None,
            history_loading: false,
        }
    }

    #[must_use]
    pub fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    #[must_use]
    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    #[must_use]
    pub const fn last_synced_at(&self) -> Option<UnixTimeMs> {
        self.last_synced_at
    }

    #[must_use]
    pub const fn is_history_loading(&self) -> bool {
        self.history_loading
    }

    pub fn set_history_loading(&mut self, loading: bool) {
        self.history_loading = loading;
    }

    /// Server id of a displayed message: the confirmed id for own sends, the
    /// id itself for received messages, `None` while unconfirmed.
    #[must_use]
    pub fn server_id_for(&self, id: &MessageId) -> Option<&MessageId> {
        self.confirmed
            .get(id)
            .or_else(|| self.by_server_id.get_key_value(id).map(|(server, _)| server))
    }

    /// Finds the displayed message a server id refers to, through the id table.
    #[must_use]
    pub fn find_by_server_id(&self, server_id: &MessageId) -> Option<&Message> {
        self.by_server_id
            .get(server_id)
            .and_then(|id| self.message(id))
    }

    /// Validates and appends an own message in `Sending` state.
    pub fn push_outgoing(
        &mut self,
        id: MessageId,
        outgoing: Outgoing,
        now: UnixTimeMs,
    ) -> Result<&Message, ValidationError> {
        let clears_draft = matches!(outgoing, Outgoing::Text(_));
        let (content, kind) = outgoing.into_parts()?;

        if clears_draft {
            self.draft.clear();
        }

        self.messages.push(Message {
            id,
            content,
            kind,
            sender: Sender::Me,
            created_at: now,
            delivery: DeliveryState::Sending,
        });
        let idx = self.messages.len() - 1;
        Ok(&self.messages[idx])
    }

    /// Marks an own message confirmed in place. Returns false if it is gone.
    pub fn mark_sent(&mut self, client_id: &MessageId, server_id: Option<MessageId>) -> bool {
        let Some(pos) = self.messages.iter().position(|m| &m.id == client_id) else {
            return false;
        };
        self.messages[pos].delivery = DeliveryState::Sent;

        if let Some(server_id) = server_id {
            // A history fetch may have raced ahead of this ack and appended the
            // same message under its server id; the optimistic copy wins.
            if let Some(dup) = self
                .messages
                .iter()
                .position(|m| m.id == server_id && &m.id != client_id)
            {
                self.messages.remove(dup);
            }
            self.by_server_id.insert(server_id.clone(), client_id.clone());
            self.confirmed.insert(client_id.clone(), server_id);
        }
        true
    }

    pub fn mark_failed(&mut self, client_id: &MessageId, reason: impl Into<String>) -> bool {
        match self.messages.iter_mut().find(|m| &m.id == client_id) {
            Some(msg) => {
                msg.delivery = DeliveryState::Failed {
                    reason: reason.into(),
                };
                true
            }
            None => false,
        }
    }

    /// Flips a failed own message back to `Sending` and returns it for re-dispatch.
    pub fn begin_retry(&mut self, client_id: &MessageId) -> Option<&Message> {
        let msg = self
            .messages
            .iter_mut()
            .find(|m| &m.id == client_id && m.sender == Sender::Me && m.is_failed())?;
        msg.delivery = DeliveryState::Sending;
        Some(&*msg)
    }

    /// Appends a server-originated message unless it is already shown.
    pub fn receive(&mut self, incoming: IncomingMessage) -> bool {
        if self.find_by_server_id(&incoming.server_id).is_some() {
            return false;
        }
        self.by_server_id
            .insert(incoming.server_id.clone(), incoming.server_id.clone());
        self.messages.push(Message {
            id: incoming.server_id,
            content: incoming.content,
            kind: incoming.kind,
            sender: incoming.sender,
            created_at: incoming.created_at,
            delivery: DeliveryState::Received,
        });
        true
    }

    /// Merges a history page in server order. Returns how many were new.
    pub fn merge_history(&mut self, items: Vec<IncomingMessage>, now: UnixTimeMs) -> usize {
        let mut added = 0;
        for item in items {
            if self.receive(item) {
                added += 1;
            }
        }
        self.last_synced_at = Some(now);
        self.history_loading = false;
        added
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_failed()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ChatSession {
        ChatSession::new(ChatId::new("42"))
    }

    fn t(ms: u64) -> UnixTimeMs {
        UnixTimeMs(ms)
    }

    fn peer(id: &str, text: &str) -> IncomingMessage {
        IncomingMessage {
            server_id: MessageId::new(id),
            content: text.to_string(),
            kind: MessageKind::Text,
            sender: Sender::Peer,
            created_at: t(5),
        }
    }

    #[test]
    fn text_send_appends_exactly_one_sending_message() {
        let mut s = session();
        s.set_draft("hello");
        let id = MessageId::temporary();
        s.push_outgoing(id.clone(), Outgoing::Text("hello".into()), t(1))
            .unwrap();

        assert_eq!(s.messages().len(), 1);
        let msg = &s.messages()[0];
        assert_eq!(msg.id, id);
        assert_eq!(msg.sender, Sender::Me);
        assert_eq!(msg.delivery, DeliveryState::Sending);
        assert_eq!(s.draft(), "");
    }

    #[test]
    fn blank_text_is_rejected_without_touching_state() {
        let mut s = session();
        s.set_draft("   ");
        let err = s
            .push_outgoing(MessageId::temporary(), Outgoing::Text("   ".into()), t(1))
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptyMessage);
        assert!(s.messages().is_empty());
        assert_eq!(s.draft(), "   ");
    }

    #[test]
    fn image_send_keeps_draft() {
        let mut s = session();
        s.set_draft("caption in progress");
        let media = MediaRef::new("file:///tmp/a.jpg").unwrap();
        s.push_outgoing(MessageId::temporary(), Outgoing::Image(media.clone()), t(1))
            .unwrap();
        assert_eq!(s.messages()[0].media_ref(), Some(&media));
        assert_eq!(s.messages()[0].coordinates(), None);
        assert_eq!(s.draft(), "caption in progress");
    }

    #[test]
    fn acks_out_of_order_do_not_reorder() {
        let mut s = session();
        let a = MessageId::temporary();
        let b = MessageId::temporary();
        s.push_outgoing(a.clone(), Outgoing::Text("first".into()), t(1)).unwrap();
        s.push_outgoing(b.clone(), Outgoing::Text("second".into()), t(2)).unwrap();

        assert!(s.mark_sent(&b, Some(MessageId::new("srv-b"))));
        assert!(s.mark_sent(&a, Some(MessageId::new("srv-a"))));

        let ids: Vec<_> = s.messages().iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, vec![a.clone(), b.clone()]);
        assert_eq!(s.server_id_for(&a), Some(&MessageId::new("srv-a")));
        assert_eq!(
            s.find_by_server_id(&MessageId::new("srv-b")).map(|m| &m.id),
            Some(&b)
        );
    }

    #[test]
    fn failure_marks_in_place_and_retry_resets() {
        let mut s = session();
        let a = MessageId::temporary();
        s.push_outgoing(a.clone(), Outgoing::Text("x".into()), t(1)).unwrap();
        s.receive(peer("p1", "hi"));

        assert!(s.mark_failed(&a, "offline"));
        assert_eq!(s.messages()[0].id, a);
        assert!(s.messages()[0].is_failed());
        assert_eq!(s.failed_count(), 1);

        assert!(s.begin_retry(&a).is_some());
        assert_eq!(s.messages()[0].delivery, DeliveryState::Sending);
        assert!(s.begin_retry(&a).is_none(), "only failed messages are retried");
    }

    #[test]
    fn peer_messages_append_and_dedupe() {
        let mut s = session();
        assert!(s.receive(peer("p1", "hi")));
        assert!(!s.receive(peer("p1", "hi")));
        assert_eq!(s.messages().len(), 1);
        assert_eq!(s.messages()[0].delivery, DeliveryState::Received);
    }

    #[test]
    fn server_ids_resolve_through_the_table() {
        let mut s = session();
        let pending = MessageId::temporary();
        s.push_outgoing(pending.clone(), Outgoing::Text("wait".into()), t(1)).unwrap();
        s.receive(peer("p1", "hi"));

        assert_eq!(s.server_id_for(&pending), None);
        assert_eq!(s.server_id_for(&MessageId::new("p1")), Some(&MessageId::new("p1")));

        s.mark_sent(&pending, Some(MessageId::new("srv-9")));
        assert_eq!(s.server_id_for(&pending), Some(&MessageId::new("srv-9")));
        assert_eq!(
            s.find_by_server_id(&MessageId::new("srv-9")).map(|m| &m.content),
            Some(&"wait".to_string())
        );
    }

    #[test]
    fn history_skips_confirmed_own_messages() {
        let mut s = session();
        let a = MessageId::temporary();
        s.push_outgoing(a.clone(), Outgoing::Text("mine".into()), t(1)).unwrap();
        s.mark_sent(&a, Some(MessageId::new("srv-a")));

        let mine = IncomingMessage {
            server_id: MessageId::new("srv-a"),
            content: "mine".into(),
            kind: MessageKind::Text,
            sender: Sender::Me,
            created_at: t(1),
        };
        let added = s.merge_history(vec![mine, peer("p1", "reply")], t(10));

        assert_eq!(added, 1);
        assert_eq!(s.messages().len(), 2);
        assert_eq!(s.messages()[0].id, a);
        assert_eq!(s.last_synced_at(), Some(t(10)));
    }

    #[test]
    fn ack_after_racing_history_drops_the_duplicate() {
        let mut s = session();
        let a = MessageId::temporary();
        s.push_outgoing(a.clone(), Outgoing::Text("mine".into()), t(1)).unwrap();
        s.merge_history(
            vec![IncomingMessage {
                server_id: MessageId::new("srv-a"),
                content: "mine".into(),
                kind: MessageKind::Text,
                sender: Sender::Me,
                created_at: t(1),
            }],
            t(2),
        );
        assert_eq!(s.messages().len(), 2);

        s.mark_sent(&a, Some(MessageId::new("srv-a")));
        assert_eq!(s.messages().len(), 1);
        assert_eq!(s.messages()[0].id, a);
    }

    #[test]
    fn geo_uri_round_trip_and_rejects_garbage() {
        let c = Coordinates::new(43.238_949, 76.889_709).unwrap();
        assert_eq!(Coordinates::parse_geo_uri(&c.to_geo_uri()), Some(c));
        assert_eq!(Coordinates::parse_geo_uri("geo:91,0"), None);
        assert_eq!(Coordinates::parse_geo_uri("hello"), None);
        assert!(Coordinates::parse_geo_uri("geo:1.5,2.5;u=35").is_some());
    }

    #[test]
    fn coordinates_reject_nan() {
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
        assert!(Coordinates::new(0.0, 181.0).is_err());
    }

    #[test]
    fn media_ref_rejects_empty() {
        assert!(MediaRef::new("  ").is_none());
    }
}
