use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::types::{
    CallbackQuery, ChatJoinRequest, ChatMemberUpdated, ChosenInlineResult, InlineQuery, Message,
    Poll, PollAnswer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Name of an update payload, as used by `allowed_updates`.
pub enum UpdateType {
    Message,
    EditedMessage,
    ChannelPost,
    EditedChannelPost,
    InlineQuery,
    ChosenInlineResult,
    CallbackQuery,
    Poll,
    PollAnswer,
    MyChatMember,
    ChatMember,
    ChatJoinRequest,
}

impl UpdateType {
    pub const ALL: [Self; 12] = [
        Self::Message,
        Self::EditedMessage,
        Self::ChannelPost,
        Self::EditedChannelPost,
        Self::InlineQuery,
        Self::ChosenInlineResult,
        Self::CallbackQuery,
        Self::Poll,
        Self::PollAnswer,
        Self::MyChatMember,
        Self::ChatMember,
        Self::ChatJoinRequest,
    ];

    /// Wire field name of the payload.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::EditedMessage => "edited_message",
            Self::ChannelPost => "channel_post",
            Self::EditedChannelPost => "edited_channel_post",
            Self::InlineQuery => "inline_query",
            Self::ChosenInlineResult => "chosen_inline_result",
            Self::CallbackQuery => "callback_query",
            Self::Poll => "poll",
            Self::PollAnswer => "poll_answer",
            Self::MyChatMember => "my_chat_member",
            Self::ChatMember => "chat_member",
            Self::ChatJoinRequest => "chat_join_request",
        }
    }

    pub fn from_field(field: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.as_str() == field)
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Payload of an [`Update`]. Exactly one kind is present per update.
pub enum UpdateKind {
    Message(Message),
    EditedMessage(Message),
    ChannelPost(Message),
    EditedChannelPost(Message),
    InlineQuery(InlineQuery),
    ChosenInlineResult(ChosenInlineResult),
    CallbackQuery(CallbackQuery),
    Poll(Poll),
    PollAnswer(PollAnswer),
    MyChatMember(ChatMemberUpdated),
    ChatMember(ChatMemberUpdated),
    ChatJoinRequest(ChatJoinRequest),
    /// A payload this crate does not model yet. `field` is `None` when the
    /// update carried nothing besides its id.
    Unknown { field: Option<String>, payload: Value },
}

impl UpdateKind {
    pub fn update_type(&self) -> Option<UpdateType> {
        Some(match self {
            Self::Message(_) => UpdateType::Message,
            Self::EditedMessage(_) => UpdateType::EditedMessage,
            Self::ChannelPost(_) => UpdateType::ChannelPost,
            Self::EditedChannelPost(_) => UpdateType::EditedChannelPost,
            Self::InlineQuery(_) => UpdateType::InlineQuery,
            Self::ChosenInlineResult(_) => UpdateType::ChosenInlineResult,
            Self::CallbackQuery(_) => UpdateType::CallbackQuery,
            Self::Poll(_) => UpdateType::Poll,
            Self::PollAnswer(_) => UpdateType::PollAnswer,
            Self::MyChatMember(_) => UpdateType::MyChatMember,
            Self::ChatMember(_) => UpdateType::ChatMember,
            Self::ChatJoinRequest(_) => UpdateType::ChatJoinRequest,
            Self::Unknown { .. } => return None,
        })
    }

    fn from_value(ty: UpdateType, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match ty {
            UpdateType::Message => Self::Message(serde_json::from_value(value)?),
            UpdateType::EditedMessage => Self::EditedMessage(serde_json::from_value(value)?),
            UpdateType::ChannelPost => Self::ChannelPost(serde_json::from_value(value)?),
            UpdateType::EditedChannelPost => {
                Self::EditedChannelPost(serde_json::from_value(value)?)
            }
            UpdateType::InlineQuery => Self::InlineQuery(serde_json::from_value(value)?),
            UpdateType::ChosenInlineResult => {
                Self::ChosenInlineResult(serde_json::from_value(value)?)
            }
            UpdateType::CallbackQuery => Self::CallbackQuery(serde_json::from_value(value)?),
            UpdateType::Poll => Self::Poll(serde_json::from_value(value)?),
            UpdateType::PollAnswer => Self::PollAnswer(serde_json::from_value(value)?),
            UpdateType::MyChatMember => Self::MyChatMember(serde_json::from_value(value)?),
            UpdateType::ChatMember => Self::ChatMember(serde_json::from_value(value)?),
            UpdateType::ChatJoinRequest => Self::ChatJoinRequest(serde_json::from_value(value)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
/// One incoming update.
///
/// `update_id` grows monotonically across the stream delivered to one bot.
pub struct Update {
    pub update_id: i64,
    pub kind: UpdateKind,
}

impl Update {
    pub fn update_type(&self) -> Option<UpdateType> {
        self.kind.update_type()
    }

    /// The message carried by any of the four message-like kinds.
    pub fn message(&self) -> Option<&Message> {
        match &self.kind {
            UpdateKind::Message(message)
            | UpdateKind::EditedMessage(message)
            | UpdateKind::ChannelPost(message)
            | UpdateKind::EditedChannelPost(message) => Some(message),
            UpdateKind::CallbackQuery(query) => query.message.as_ref(),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct RawUpdate {
    update_id: i64,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

impl TryFrom<RawUpdate> for Update {
    type Error = String;

    fn try_from(raw: RawUpdate) -> Result<Self, Self::Error> {
        let mut known = Vec::new();
        let mut unknown = None;
        for (field, value) in raw.payload {
            if value.is_null() {
                continue;
            }
            match UpdateType::from_field(&field) {
                Some(ty) => known.push((ty, value)),
                None if unknown.is_none() => unknown = Some((field, value)),
                None => {}
            }
        }

        if known.len() > 1 {
            let names = known
                .iter()
                .map(|(ty, _)| ty.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(format!(
                "update {} carries more than one payload: {names}",
                raw.update_id
            ));
        }

        let kind = match known.pop() {
            Some((ty, value)) => {
                UpdateKind::from_value(ty, value).map_err(|err| format!("invalid {ty}: {err}"))?
            }
            None => match unknown {
                Some((field, payload)) => UpdateKind::Unknown {
                    field: Some(field),
                    payload,
                },
                None => UpdateKind::Unknown {
                    field: None,
                    payload: Value::Null,
                },
            },
        };

        Ok(Self {
            update_id: raw.update_id,
            kind,
        })
    }
}

impl<'de> Deserialize<'de> for Update {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawUpdate::deserialize(deserializer)?;
        Update::try_from(raw).map_err(de::Error::custom)
    }
}

impl Serialize for Update {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("update_id", &self.update_id)?;
        match &self.kind {
            UpdateKind::Message(inner) => map.serialize_entry("message", inner)?,
            UpdateKind::EditedMessage(inner) => map.serialize_entry("edited_message", inner)?,
            UpdateKind::ChannelPost(inner) => map.serialize_entry("channel_post", inner)?,
            UpdateKind::EditedChannelPost(inner) => {
                map.serialize_entry("edited_channel_post", inner)?
            }
            UpdateKind::InlineQuery(inner) => map.serialize_entry("inline_query", inner)?,
            UpdateKind::ChosenInlineResult(inner) => {
                map.serialize_entry("chosen_inline_result", inner)?
            }
            UpdateKind::CallbackQuery(inner) => map.serialize_entry("callback_query", inner)?,
            UpdateKind::Poll(inner) => map.serialize_entry("poll", inner)?,
            UpdateKind::PollAnswer(inner) => map.serialize_entry("poll_answer", inner)?,
            UpdateKind::MyChatMember(inner) => map.serialize_entry("my_chat_member", inner)?,
            UpdateKind::ChatMember(inner) => map.serialize_entry("chat_member", inner)?,
            UpdateKind::ChatJoinRequest(inner) => {
                map.serialize_entry("chat_join_request", inner)?
            }
            UpdateKind::Unknown {
                field: Some(field),
                payload,
            } => map.serialize_entry(field, payload)?,
            UpdateKind::Unknown { field: None, .. } => {}
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE_UPDATE: &str = r#"
    {
      "update_id": 10000,
      "message": {
        "message_id": 1365,
        "date": 1441645532,
        "chat": { "id": 1111111, "type": "private", "username": "Test" },
        "from": { "id": 1111111, "is_bot": false, "first_name": "Test" },
        "text": "/start"
      }
    }
    "#;

    #[test]
    fn decodes_message_update() {
        let update: Update = serde_json::from_str(MESSAGE_UPDATE).unwrap();
        assert_eq!(update.update_id, 10000);
        assert_eq!(update.update_type(), Some(UpdateType::Message));
        let message = update.message().unwrap();
        assert_eq!(message.text.as_deref(), Some("/start"));
        assert_eq!(message.chat.id, 1111111);
    }

    #[test]
    fn serialize_then_decode_keeps_update() {
        let update: Update = serde_json::from_str(MESSAGE_UPDATE).unwrap();
        let json = serde_json::to_string(&update).unwrap();
        let again: Update = serde_json::from_str(&json).unwrap();
        assert_eq!(update, again);
    }

    #[test]
    fn decodes_callback_query() {
        let json = r#"
        {
          "update_id": 7,
          "callback_query": {
            "id": "4382bfdwdsb323b2d9",
            "from": { "id": 1, "is_bot": false, "first_name": "A" },
            "chat_instance": "42",
            "data": "Data from button callback"
          }
        }
        "#;
        let update: Update = serde_json::from_str(json).unwrap();
        match update.kind {
            UpdateKind::CallbackQuery(query) => {
                assert_eq!(query.data.as_deref(), Some("Data from button callback"));
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn unknown_payload_is_preserved() {
        let json = r#"{ "update_id": 3, "business_message": { "x": 1 } }"#;
        let update: Update = serde_json::from_str(json).unwrap();
        assert_eq!(update.update_type(), None);
        assert_eq!(
            update.kind,
            UpdateKind::Unknown {
                field: Some("business_message".to_owned()),
                payload: serde_json::json!({ "x": 1 }),
            }
        );
    }

    #[test]
    fn bare_update_id_is_unknown_without_field() {
        let update: Update = serde_json::from_str(r#"{ "update_id": 5 }"#).unwrap();
        assert!(matches!(update.kind, UpdateKind::Unknown { field: None, .. }));
    }

    #[test]
    fn rejects_two_payloads() {
        let json = r#"
        {
          "update_id": 1,
          "poll_answer": { "poll_id": "p", "option_ids": [0] },
          "poll": {
            "id": "p", "question": "q", "options": [], "total_voter_count": 0,
            "is_closed": false, "is_anonymous": true, "type": "regular",
            "allows_multiple_answers": false
          }
        }
        "#;
        let err = serde_json::from_str::<Update>(json).unwrap_err();
        assert!(err.to_string().contains("more than one payload"));
    }

    #[test]
    fn rejects_missing_update_id() {
        assert!(serde_json::from_str::<Update>(r#"{ "message": {} }"#).is_err());
    }

    #[test]
    fn update_type_names_round_trip() {
        for ty in UpdateType::ALL {
            assert_eq!(UpdateType::from_field(ty.as_str()), Some(ty));
            let json = serde_json::to_string(&ty).unwrap();
            assert_eq!(json, format!("\"{}\"", ty.as_str()));
        }
    }
}
