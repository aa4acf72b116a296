//! Message envelope types for the Huddle protocol.
//!
//! A [`Message`] is either a chat message (it carries a [`Payload`]) or a
//! system notification (it carries a [`SystemEvent`]). The numeric tags of
//! every enum are part of the wire format and must not be reordered.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Audience classifier of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Scope {
    /// Reserved for lifecycle signaling.
    Join = 0,
    /// Reserved for lifecycle signaling.
    Leave = 1,
    /// Delivered to every member of the room named by `to`.
    Room = 2,
    /// Delivered to every connection of the user named by `to`.
    User = 3,
    /// Delivered to every registered connection.
    Global = 4,
    /// Reserved.
    System = 5,
    /// Reserved for lifecycle signaling.
    JoinRoom = 6,
    /// Reserved for lifecycle signaling.
    LeaveRoom = 7,
}

impl From<Scope> for u8 {
    fn from(scope: Scope) -> u8 {
        scope as u8
    }
}

impl TryFrom<u8> for Scope {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Scope::Join),
            1 => Ok(Scope::Leave),
            2 => Ok(Scope::Room),
            3 => Ok(Scope::User),
            4 => Ok(Scope::Global),
            5 => Ok(Scope::System),
            6 => Ok(Scope::JoinRoom),
            7 => Ok(Scope::LeaveRoom),
            _ => Err("Invalid message scope"),
        }
    }
}

/// Kind of content carried by a chat payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum PayloadKind {
    Text = 0,
    Image = 1,
    File = 2,
}

impl From<PayloadKind> for u8 {
    fn from(kind: PayloadKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for PayloadKind {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PayloadKind::Text),
            1 => Ok(PayloadKind::Image),
            2 => Ok(PayloadKind::File),
            _ => Err("Invalid payload kind"),
        }
    }
}

/// Kind of a hub-generated system notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum SystemEventKind {
    /// A user came online or went offline; clients refresh the user list.
    UsersChanged = 0,
    /// Membership of one room changed; `data` holds the room id.
    RoomDetailChanged = 1,
    /// The set of rooms changed; clients refresh the room list.
    RoomsChanged = 2,
}

impl From<SystemEventKind> for u8 {
    fn from(kind: SystemEventKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for SystemEventKind {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SystemEventKind::UsersChanged),
            1 => Ok(SystemEventKind::RoomDetailChanged),
            2 => Ok(SystemEventKind::RoomsChanged),
            _ => Err("Invalid system event kind"),
        }
    }
}

/// Typed chat content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(rename = "type")]
    pub kind: PayloadKind,
    /// Arbitrary JSON content (text body, image descriptor, file reference).
    #[serde(rename = "data", default)]
    pub content: serde_json::Value,
    /// Optional inline attachment bytes.
    #[serde(
        rename = "file",
        default,
        skip_serializing_if = "Option::is_none",
        with = "attachment"
    )]
    pub attachment: Option<Vec<u8>>,
}

impl Payload {
    /// Create a payload of the given kind.
    #[must_use]
    pub fn new(kind: PayloadKind, content: serde_json::Value) -> Self {
        Self {
            kind,
            content,
            attachment: None,
        }
    }

    /// Create a text payload.
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(PayloadKind::Text, serde_json::Value::String(body.into()))
    }

    /// Attach raw bytes to the payload.
    #[must_use]
    pub fn with_attachment(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.attachment = Some(bytes.into());
        self
    }
}

/// `file` is a standard base64 string in JSON and a `bin` value in
/// MessagePack.
mod attachment {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_bytes::ByteBuf;

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let readable = serializer.is_human_readable();
        match value {
            None => serializer.serialize_none(),
            Some(bytes) if readable => serializer.serialize_some(&STANDARD.encode(bytes)),
            Some(bytes) => serializer.serialize_some(serde_bytes::Bytes::new(bytes)),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            match Option::<String>::deserialize(deserializer)? {
                Some(text) => STANDARD.decode(text).map(Some).map_err(D::Error::custom),
                None => Ok(None),
            }
        } else {
            Ok(Option::<ByteBuf>::deserialize(deserializer)?.map(ByteBuf::into_vec))
        }
    }
}

/// Hub-generated notification embedded in a global message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    #[serde(rename = "type")]
    pub kind: SystemEventKind,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl SystemEvent {
    #[must_use]
    pub fn new(kind: SystemEventKind, data: serde_json::Value) -> Self {
        Self { kind, data }
    }
}

/// A routable message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub scope: Scope,
    #[serde(default)]
    pub payload: Option<Payload>,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(rename = "messageEvent", default)]
    pub system_event: Option<SystemEvent>,
    /// Unix timestamp in seconds; zero when the sender did not set one.
    #[serde(rename = "time", default, skip_serializing_if = "is_zero")]
    pub timestamp: i64,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Current unix time in seconds.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

impl Message {
    /// Create a chat message.
    #[must_use]
    pub fn new(
        scope: Scope,
        payload: Payload,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            payload: Some(payload),
            from: from.into(),
            to: to.into(),
            system_event: None,
            timestamp: unix_now(),
        }
    }

    /// Create a system notification message.
    #[must_use]
    pub fn system(scope: Scope, event: SystemEvent) -> Self {
        Self {
            scope,
            payload: None,
            from: String::new(),
            to: String::new(),
            system_event: Some(event),
            timestamp: unix_now(),
        }
    }

    /// Create a global system notification.
    #[must_use]
    pub fn global_event(kind: SystemEventKind, data: serde_json::Value) -> Self {
        Self::system(Scope::Global, SystemEvent::new(kind, data))
    }

    /// Whether this message is a hub-generated notification.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.system_event.is_some()
    }
}
