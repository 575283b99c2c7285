use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::types::{is_group_id, CallInfo, GroupNotification, MessageInfo, ReactionInfo};

/// Everything the session emits, in the order the driver reports it.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Qr { qr: String },
    Authenticated,
    AuthFailure { message: String },
    Ready,
    Disconnected { reason: String },
    ChangeState { state: String },
    Message(MessageInfo),
    /// Messages created by this session, including ones sent through the bridge.
    MessageCreate(MessageInfo),
    MessageEdit {
        message: MessageInfo,
        new_body: String,
        prev_body: String,
    },
    MessageReaction(ReactionInfo),
    MessageRevokeEveryone {
        message: MessageInfo,
        revoked: Option<MessageInfo>,
    },
    GroupJoin(GroupNotification),
    GroupLeave(GroupNotification),
    GroupAdminChanged(GroupNotification),
    GroupUpdate(GroupNotification),
    Call(CallInfo),
}

/// Body POSTed to the registered listener.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub data: Value,
}

fn field<T: serde::de::DeserializeOwned>(data: &Value, key: &str) -> Result<T> {
    let v = data
        .get(key)
        .cloned()
        .ok_or_else(|| Error::Driver(format!("event payload missing '{}'", key)))?;
    Ok(serde_json::from_value(v)?)
}

fn str_field(data: &Value, key: &str) -> String {
    data.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn message_data(msg: &MessageInfo) -> Value {
    json!({
        "id": msg.id,
        "body": msg.body,
        "from": msg.from,
        "to": msg.to,
        "author": msg.author,
        "timestamp": msg.timestamp,
        "hasMedia": msg.has_media,
        "fromMe": msg.from_me,
        "type": msg.msg_type,
        "isGroup": msg.is_group(),
    })
}

fn notification_data(n: &GroupNotification) -> Value {
    json!({
        "id": n.id,
        "chatId": n.chat_id,
        "author": n.author,
        "recipientIds": n.recipient_ids,
        "type": n.kind,
        "body": n.body,
        "timestamp": n.timestamp,
    })
}

impl SessionEvent {
    /// Decode a driver event frame. Unknown event names yield `Ok(None)`.
    pub fn from_driver(name: &str, data: &Value) -> Result<Option<Self>> {
        let event = match name {
            "qr" => SessionEvent::Qr { qr: field(data, "qr")? },
            "authenticated" => SessionEvent::Authenticated,
            "auth_failure" => SessionEvent::AuthFailure { message: str_field(data, "message") },
            "ready" => SessionEvent::Ready,
            "disconnected" => SessionEvent::Disconnected { reason: str_field(data, "reason") },
            "change_state" => SessionEvent::ChangeState { state: str_field(data, "state") },
            "message" => SessionEvent::Message(field(data, "message")?),
            "message_create" => SessionEvent::MessageCreate(field(data, "message")?),
            "message_edit" => SessionEvent::MessageEdit {
                message: field(data, "message")?,
                new_body: str_field(data, "newBody"),
                prev_body: str_field(data, "prevBody"),
            },
            "message_reaction" => SessionEvent::MessageReaction(field(data, "reaction")?),
            "message_revoke_everyone" => SessionEvent::MessageRevokeEveryone {
                message: field(data, "message")?,
                revoked: match data.get("revokedMessage") {
                    Some(Value::Null) | None => None,
                    Some(v) => Some(serde_json::from_value(v.clone())?),
                },
            },
            "group_join" => SessionEvent::GroupJoin(field(data, "notification")?),
            "group_leave" => SessionEvent::GroupLeave(field(data, "notification")?),
            "group_admin_changed" => SessionEvent::GroupAdminChanged(field(data, "notification")?),
            "group_update" => SessionEvent::GroupUpdate(field(data, "notification")?),
            "call" => SessionEvent::Call(field(data, "call")?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::Qr { .. } => "qr",
            SessionEvent::Authenticated => "authenticated",
            SessionEvent::AuthFailure { .. } => "auth_failure",
            SessionEvent::Ready => "ready",
            SessionEvent::Disconnected { .. } => "disconnected",
            SessionEvent::ChangeState { .. } => "change_state",
            SessionEvent::Message(_) => "message",
            SessionEvent::MessageCreate(_) => "message_create",
            SessionEvent::MessageEdit { .. } => "message_edit",
            SessionEvent::MessageReaction(_) => "message_reaction",
            SessionEvent::MessageRevokeEveryone { .. } => "message_revoke_everyone",
            SessionEvent::GroupJoin(_) => "group_join",
            SessionEvent::GroupLeave(_) => "group_leave",
            SessionEvent::GroupAdminChanged(_) => "group_admin_changed",
            SessionEvent::GroupUpdate(_) => "group_update",
            SessionEvent::Call(_) => "call",
        }
    }

    pub fn envelope(&self) -> EventEnvelope {
        let data = match self {
            SessionEvent::Qr { qr } => json!({ "qr": qr }),
            SessionEvent::Authenticated | SessionEvent::Ready => json!({}),
            SessionEvent::AuthFailure { message } => json!({ "message": message }),
            SessionEvent::Disconnected { reason } => json!({ "reason": reason }),
            SessionEvent::ChangeState { state } => json!({ "state": state }),
            SessionEvent::Message(msg) | SessionEvent::MessageCreate(msg) => message_data(msg),
            SessionEvent::MessageEdit { message, new_body, prev_body } => {
                let mut data = message_data(message);
                data["newBody"] = json!(new_body);
                data["prevBody"] = json!(prev_body);
                data
            }
            SessionEvent::MessageReaction(r) => json!({
                "id": r.id,
                "msgId": r.msg_id,
                "reaction": r.reaction,
                "senderId": r.sender_id,
                "timestamp": r.timestamp,
            }),
            SessionEvent::MessageRevokeEveryone { message, revoked } => json!({
                "message": message_data(message),
                "revokedMessage": revoked.as_ref().map(message_data),
            }),
            SessionEvent::GroupJoin(n)
            | SessionEvent::GroupLeave(n)
            | SessionEvent::GroupAdminChanged(n)
            | SessionEvent::GroupUpdate(n) => notification_data(n),
            SessionEvent::Call(c) => json!({
                "id": c.id,
                "from": c.from,
                "timestamp": c.timestamp,
                "isVideo": c.is_video,
                "isGroup": c.is_group || is_group_id(&c.from),
            }),
        };
        EventEnvelope {
            event_type: self.event_type(),
            data,
        }
    }
}
