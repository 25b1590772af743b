use serde::{Deserialize, Deserializer, Serialize};

use crate::models::UserId;

/// Events sent from the server to a connected client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// One message handed to the recipient's connection
    NewMessage {
        text: Option<String>,
        from: UserId,
        sender_name: String,
    },

    /// Badge value for one peer: unread messages from `peer_id` to this client
    UnreadCount { peer_id: UserId, count: i64 },

    /// A command was rejected; nothing changed server-side
    Error { message: String },
}

/// Commands sent from a client to the server.
///
/// User ids are accepted either as JSON numbers or as numeric strings, since
/// browsers often read them out of the URL.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientCommand {
    /// Announce presence; triggers replay of queued messages
    UserOnline(#[serde(deserialize_with = "user_id")] UserId),

    SendMessage {
        #[serde(deserialize_with = "user_id")]
        from: UserId,
        #[serde(deserialize_with = "user_id")]
        to: UserId,
        text: String,
    },

    /// The reader (`to`) has viewed everything `from` sent them
    MarkMessagesRead {
        #[serde(deserialize_with = "user_id")]
        from: UserId,
        #[serde(deserialize_with = "user_id")]
        to: UserId,
    },

    GetUnreadCount {
        #[serde(deserialize_with = "user_id")]
        from: UserId,
        #[serde(deserialize_with = "user_id")]
        to: UserId,
    },
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserOnline(_) => "user-online",
            Self::SendMessage { .. } => "send-message",
            Self::MarkMessagesRead { .. } => "mark-messages-read",
            Self::GetUnreadCount { .. } => "get-unread-count",
        }
    }
}

fn user_id<'de, D>(deserializer: D) -> Result<UserId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(UserId),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Number(id) => Ok(id),
        Repr::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid user id '{}'", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_message_wire_shape() {
        let event = ServerEvent::NewMessage {
            text: Some("hi".into()),
            from: 1,
            sender_name: "Ann Lee".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"type": "new-message", "data": {"text": "hi", "from": 1, "senderName": "Ann Lee"}})
        );
    }

    #[test]
    fn unread_count_uses_peer_id() {
        let value = serde_json::to_value(ServerEvent::UnreadCount { peer_id: 1, count: 0 }).unwrap();
        assert_eq!(value, json!({"type": "unread-count", "data": {"peerId": 1, "count": 0}}));
    }

    #[test]
    fn user_online_accepts_number_or_string() {
        let a: ClientCommand = serde_json::from_str(r#"{"type":"user-online","data":7}"#).unwrap();
        let b: ClientCommand = serde_json::from_str(r#"{"type":"user-online","data":"7"}"#).unwrap();
        assert_eq!(a, ClientCommand::UserOnline(7));
        assert_eq!(a, b);
    }

    #[test]
    fn send_message_parses() {
        let cmd: ClientCommand = serde_json::from_str(
            r#"{"type":"send-message","data":{"from":1,"to":"2","text":"hello"}}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            ClientCommand::SendMessage { from: 1, to: 2, text: "hello".into() }
        );
        assert_eq!(cmd.name(), "send-message");
    }

    #[test]
    fn rejects_non_numeric_id() {
        let res = serde_json::from_str::<ClientCommand>(
            r#"{"type":"mark-messages-read","data":{"from":"abc","to":2}}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn rejects_unknown_event() {
        let res = serde_json::from_str::<ClientCommand>(r#"{"type":"typing","data":{}}"#);
        assert!(res.is_err());
    }
}
