use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use wabridge_core::types::{ChatInfo, ContactInfo, MessageContent, MessageInfo, SendOptions};
use wabridge_core::{Error, Result};
use wabridge_session::{SessionClient, SessionHandle};

use crate::capability::CapabilityGate;
use crate::group_add::GroupAddWorkflow;
use crate::operation::{Operation, Scope};
use crate::sanitize::sanitize;

const DEFAULT_FETCH_LIMIT: u32 = 50;

/// A generic `(scope, id, method, args)` call as received over HTTP.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub scope: String,
    #[serde(default)]
    pub id: Option<String>,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// The object an operation runs against.
#[derive(Debug, Clone)]
enum Target {
    Client,
    Chat(ChatInfo),
    Message(MessageInfo),
    Contact(ContactInfo),
}

pub struct Invoker {
    session: Arc<SessionHandle>,
    gate: Arc<CapabilityGate>,
    group_add: Arc<GroupAddWorkflow>,
}

fn arg_str<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Validation(format!("argument {} ({}) must be a string", index, name)))
}

fn arg_u32(args: &[Value], index: usize) -> Option<u32> {
    args.get(index)
        .and_then(Value::as_u64)
        .map(|n| n.min(u32::MAX as u64) as u32)
}

fn arg_bool(args: &[Value], index: usize) -> Option<bool> {
    args.get(index).and_then(Value::as_bool)
}

/// A single id or an array of ids.
fn arg_ids(args: &[Value], index: usize) -> Result<Vec<String>> {
    let ids: Vec<String> = match args.get(index) {
        Some(Value::String(id)) => vec![id.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    if ids.is_empty() {
        return Err(Error::Validation(format!(
            "argument {} (participants) must be an id or a list of ids",
            index
        )));
    }
    Ok(ids)
}

impl Invoker {
    pub fn new(
        session: Arc<SessionHandle>,
        gate: Arc<CapabilityGate>,
        group_add: Arc<GroupAddWorkflow>,
    ) -> Self {
        Self {
            session,
            gate,
            group_add,
        }
    }

    pub fn gate(&self) -> &CapabilityGate {
        &self.gate
    }

    /// Gate, resolve and run one call. The result is sanitized before it is
    /// returned.
    pub async fn call(&self, request: &CallRequest) -> Result<Value> {
        let scope: Scope = request.scope.parse()?;
        let method = request.method.as_str();

        if !self.gate.is_allowed(scope, method) {
            warn!(scope = %scope, method, "Call rejected by capability gate");
            return Err(Error::MethodNotAllowed {
                scope: scope.to_string(),
                method: method.to_string(),
            });
        }
        let op = Operation::parse(scope, method).ok_or_else(|| Error::MethodNotFound {
            scope: scope.to_string(),
            method: method.to_string(),
        })?;

        let client = self.session.client().await?;
        let target = self.resolve(client.as_ref(), scope, request.id.as_deref()).await?;

        debug!(scope = %scope, method, "Invoking operation");
        let result = self.invoke(client.as_ref(), op, target, &request.args).await?;
        Ok(sanitize(result))
    }

    async fn resolve(&self, client: &dyn SessionClient, scope: Scope, id: Option<&str>) -> Result<Target> {
        if scope == Scope::Client {
            return Ok(Target::Client);
        }
        let id = id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Validation(format!("scope '{}' requires an id", scope)))?;

        match scope {
            Scope::Client => Ok(Target::Client),
            Scope::Chat | Scope::Channel => client
                .get_chat_by_id(id)
                .await?
                .map(Target::Chat)
                .ok_or_else(|| Error::NotFound(format!("chat {}", id))),
            Scope::Group => match client.get_chat_by_id(id).await? {
                Some(chat) if chat.is_group => Ok(Target::Chat(chat)),
                Some(_) => Err(Error::NotAGroup(id.to_string())),
                None => Err(Error::NotFound(format!("group {}", id))),
            },
            Scope::Message => client
                .get_message_by_id(id)
                .await?
                .map(Target::Message)
                .ok_or_else(|| Error::NotFound(format!("message {}", id))),
            Scope::Contact => client
                .get_contact_by_id(id)
                .await?
                .map(Target::Contact)
                .ok_or_else(|| Error::NotFound(format!("contact {}", id))),
        }
    }

    async fn invoke(
        &self,
        client: &dyn SessionClient,
        op: Operation,
        target: Target,
        args: &[Value],
    ) -> Result<Value> {
        use Operation::*;

        let value = match (op, &target) {
            (GetState, Target::Client) => json!(client.get_state().await?),
            (GetChats, Target::Client) => serde_json::to_value(client.get_chats().await?)?,
            (GetContacts, Target::Client) => serde_json::to_value(client.get_contacts().await?)?,
            (GetNumberId, Target::Client) => {
                json!(client.get_number_id(arg_str(args, 0, "number")?).await?)
            }
            (IsRegisteredUser, Target::Client) => {
                json!(client.get_number_id(arg_str(args, 0, "number")?).await?.is_some())
            }
            (ClientSendMessage, Target::Client) => {
                let chat_id = arg_str(args, 0, "chatId")?;
                let text = arg_str(args, 1, "text")?;
                let sent = client
                    .send_message(chat_id, MessageContent::text(text), SendOptions::default())
                    .await?;
                serde_json::to_value(sent)?
            }

            (SendMessage, Target::Chat(chat)) => {
                let text = arg_str(args, 0, "text")?;
                let sent = client
                    .send_message(&chat.id, MessageContent::text(text), SendOptions::default())
                    .await?;
                serde_json::to_value(sent)?
            }
            (FetchMessages, Target::Chat(chat)) => {
                let limit = arg_u32(args, 0).unwrap_or(DEFAULT_FETCH_LIMIT);
                serde_json::to_value(client.fetch_messages(&chat.id, limit).await?)?
            }
            (SendSeen, Target::Chat(chat)) => json!(client.send_seen(&chat.id).await?),

            (GetInviteCode, Target::Chat(chat)) => json!(client.get_invite_code(&chat.id).await?),
            (RevokeInvite, Target::Chat(chat)) => json!(client.revoke_invite(&chat.id).await?),
            (AddParticipants, Target::Chat(chat)) => {
                let ids = arg_ids(args, 0)?;
                let report = self.group_add.run(client, &chat.id, &ids).await?;
                serde_json::to_value(report)?
            }
            (RemoveParticipants, Target::Chat(chat)) => {
                client.remove_participants(&chat.id, &arg_ids(args, 0)?).await?;
                json!(true)
            }
            (PromoteParticipants, Target::Chat(chat)) => {
                client.promote_participants(&chat.id, &arg_ids(args, 0)?).await?;
                json!(true)
            }
            (DemoteParticipants, Target::Chat(chat)) => {
                client.demote_participants(&chat.id, &arg_ids(args, 0)?).await?;
                json!(true)
            }
            (SetSubject, Target::Chat(chat)) => {
                json!(client.set_group_subject(&chat.id, arg_str(args, 0, "subject")?).await?)
            }
            (SetDescription, Target::Chat(chat)) => {
                json!(client.set_group_description(&chat.id, arg_str(args, 0, "description")?).await?)
            }
            (Leave, Target::Chat(chat)) => {
                client.leave_group(&chat.id).await?;
                Value::Null
            }

            (Reply, Target::Message(message)) => {
                let text = arg_str(args, 0, "text")?;
                let options = SendOptions {
                    quoted_message_id: Some(message.id.clone()),
                    ..SendOptions::default()
                };
                let sent = client
                    .send_message(message.chat_id(), MessageContent::text(text), options)
                    .await?;
                serde_json::to_value(sent)?
            }
            (React, Target::Message(message)) => {
                client.react_to_message(&message.id, arg_str(args, 0, "emoji")?).await?;
                Value::Null
            }
            (Delete, Target::Message(message)) => {
                let everyone = arg_bool(args, 0).unwrap_or(false);
                client.delete_message(&message.id, everyone).await?;
                Value::Null
            }
            (Forward, Target::Message(message)) => {
                client.forward_message(&message.id, arg_str(args, 0, "chatId")?).await?;
                Value::Null
            }

            (GetAbout, Target::Contact(contact)) => json!(client.get_contact_about(&contact.id).await?),
            (GetProfilePicUrl, Target::Contact(contact)) => {
                json!(client.get_profile_pic_url(&contact.id).await?)
            }
            (Block, Target::Contact(contact)) => json!(client.set_contact_blocked(&contact.id, true).await?),
            (Unblock, Target::Contact(contact)) => {
                json!(client.set_contact_blocked(&contact.id, false).await?)
            }
            (GetCommonGroups, Target::Contact(contact)) => {
                json!(client.get_common_groups(&contact.id).await?)
            }

            (op, target) => {
                return Err(Error::Other(format!("operation {:?} cannot run against {:?}", op, target)));
            }
        };
        Ok(value)
    }
}
