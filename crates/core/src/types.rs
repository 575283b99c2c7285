use serde::{Deserialize, Deserializer, Serialize};

pub const USER_SUFFIX: &str = "@c.us";
pub const LEGACY_USER_SUFFIX: &str = "@s.whatsapp.net";
pub const GROUP_SUFFIX: &str = "@g.us";
pub const LID_SUFFIX: &str = "@lid";

pub fn is_group_id(id: &str) -> bool {
    id.ends_with(GROUP_SUFFIX)
}

pub fn is_lid(id: &str) -> bool {
    id.ends_with(LID_SUFFIX)
}

/// Phone digits of a user identifier: known suffixes stripped, non-digits dropped.
pub fn phone_digits(id: &str) -> String {
    let bare = id
        .trim()
        .trim_end_matches(USER_SUFFIX)
        .trim_end_matches(LEGACY_USER_SUFFIX);
    bare.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Ids arrive either as plain strings or as composite objects with `_serialized`.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Plain(String),
    Composite {
        #[serde(rename = "_serialized")]
        serialized: String,
    },
}

impl From<WireId> for String {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Plain(s) => s,
            WireId::Composite { serialized } => serialized,
        }
    }
}

pub fn de_wire_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    WireId::deserialize(deserializer).map(String::from)
}

pub fn de_opt_wire_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<WireId>::deserialize(deserializer).map(|id| id.map(String::from))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupParticipant {
    #[serde(deserialize_with = "de_wire_id")]
    pub id: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_super_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatInfo {
    #[serde(deserialize_with = "de_wire_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub is_read_only: bool,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub archived: bool,
    /// Only populated for groups.
    #[serde(default)]
    pub participants: Vec<GroupParticipant>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    #[serde(deserialize_with = "de_wire_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pushname: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub is_business: bool,
    #[serde(default)]
    pub is_my_contact: bool,
    #[serde(default)]
    pub is_blocked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageInfo {
    #[serde(deserialize_with = "de_wire_id")]
    pub id: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub has_media: bool,
    #[serde(default)]
    pub from_me: bool,
    #[serde(rename = "type", default = "default_message_type")]
    pub msg_type: String,
}

fn default_message_type() -> String {
    "chat".to_string()
}

impl MessageInfo {
    /// The conversation this message belongs to.
    pub fn chat_id(&self) -> &str {
        if self.from_me {
            &self.to
        } else {
            &self.from
        }
    }

    pub fn is_group(&self) -> bool {
        is_group_id(self.chat_id())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaPayload {
    pub mimetype: String,
    /// Base64-encoded content.
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    Media { media: MediaPayload },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Marking the chat as seen on send is off by default.
    #[serde(default)]
    pub send_seen: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddParticipantsOptions {
    /// Ask the platform to send a formal invite when privacy blocks a direct add.
    #[serde(rename = "autoSendInviteV4")]
    pub auto_send_invite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// One participant's raw outcome from a bulk add, as reported by the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawAddEntry {
    #[serde(deserialize_with = "de_wire_id")]
    pub participant_id: String,
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "isInviteV4Sent")]
    pub invite_sent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReactionInfo {
    #[serde(deserialize_with = "de_wire_id")]
    pub id: String,
    #[serde(deserialize_with = "de_wire_id")]
    pub msg_id: String,
    #[serde(default)]
    pub reaction: String,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupNotification {
    #[serde(deserialize_with = "de_wire_id")]
    pub id: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub recipient_ids: Vec<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallInfo {
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub is_group: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_digits_strips_suffixes() {
        assert_eq!(phone_digits("5551234@c.us"), "5551234");
        assert_eq!(phone_digits("5551234@s.whatsapp.net"), "5551234");
        assert_eq!(phone_digits("+1 555-1234"), "15551234");
    }

    #[test]
    fn test_composite_and_plain_ids_decode() {
        let raw = r#"{
            "id": { "fromMe": false, "remote": "123@c.us", "id": "ABC", "_serialized": "false_123@c.us_ABC" },
            "body": "hi", "from": "123@c.us", "to": "999@c.us", "timestamp": 1700000000
        }"#;
        let msg: MessageInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.id, "false_123@c.us_ABC");
        assert_eq!(msg.msg_type, "chat");
        assert!(!msg.is_group());

        let chat: ChatInfo = serde_json::from_str(r#"{"id":"1203@g.us","isGroup":true}"#).unwrap();
        assert_eq!(chat.id, "1203@g.us");
        assert!(chat.participants.is_empty());
    }

    #[test]
    fn test_raw_add_entry_accepts_platform_field_name() {
        let raw = r#"{"participantId":"5559999@c.us","code":403,"message":"private","isInviteV4Sent":true}"#;
        let entry: RawAddEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.code, 403);
        assert!(entry.invite_sent);
    }

    #[test]
    fn test_outgoing_message_chat_id() {
        let msg = MessageInfo {
            id: "m1".to_string(),
            body: String::new(),
            from: "me@c.us".to_string(),
            to: "1203@g.us".to_string(),
            author: None,
            timestamp: 0,
            has_media: false,
            from_me: true,
            msg_type: "chat".to_string(),
        };
        assert_eq!(msg.chat_id(), "1203@g.us");
        assert!(msg.is_group());
    }
}
