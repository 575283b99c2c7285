//! In-memory `SessionClient` for tests. Every call is recorded as
//! `"method:arg"` so tests can assert what reached the platform.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::broadcast;
use wabridge_core::types::{
    phone_digits, AddParticipantsOptions, ChatInfo, ContactInfo, GroupParticipant, MessageContent,
    MessageInfo, RawAddEntry, SendOptions,
};
use wabridge_core::{Error, Result, SessionEvent};

use crate::client::SessionClient;

pub struct MockSession {
    chats: Mutex<HashMap<String, ChatInfo>>,
    contacts: Mutex<HashMap<String, ContactInfo>>,
    messages: Mutex<HashMap<String, MessageInfo>>,
    /// phone digits -> canonical id
    registered: Mutex<HashMap<String, String>>,
    failing_lookups: Mutex<HashSet<String>>,
    /// canonical id -> linked identity
    linked: Mutex<HashMap<String, String>>,
    failing_linked_lookups: Mutex<HashSet<String>>,
    add_codes: Mutex<HashMap<String, (u16, bool)>>,
    add_error: Mutex<Option<String>>,
    failing_sends: Mutex<HashSet<String>>,
    invite_code: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
    sent: Mutex<Vec<(String, MessageContent, SendOptions)>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSession {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            chats: Mutex::new(HashMap::new()),
            contacts: Mutex::new(HashMap::new()),
            messages: Mutex::new(HashMap::new()),
            registered: Mutex::new(HashMap::new()),
            failing_lookups: Mutex::new(HashSet::new()),
            linked: Mutex::new(HashMap::new()),
            failing_linked_lookups: Mutex::new(HashSet::new()),
            add_codes: Mutex::new(HashMap::new()),
            add_error: Mutex::new(None),
            failing_sends: Mutex::new(HashSet::new()),
            invite_code: Mutex::new(Some("INVITE123".to_string())),
            calls: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn with_chat(self, chat: ChatInfo) -> Self {
        self.chats.lock().unwrap().insert(chat.id.clone(), chat);
        self
    }

    pub fn with_group(self, id: &str, name: &str, members: &[&str]) -> Self {
        let participants = members
            .iter()
            .map(|m| GroupParticipant {
                id: m.to_string(),
                is_admin: false,
                is_super_admin: false,
            })
            .collect();
        self.with_chat(ChatInfo {
            id: id.to_string(),
            name: name.to_string(),
            is_group: true,
            is_read_only: false,
            unread_count: 0,
            timestamp: None,
            archived: false,
            participants,
        })
    }

    pub fn with_direct_chat(self, id: &str, name: &str) -> Self {
        self.with_chat(ChatInfo {
            id: id.to_string(),
            name: name.to_string(),
            is_group: false,
            is_read_only: false,
            unread_count: 0,
            timestamp: None,
            archived: false,
            participants: Vec::new(),
        })
    }

    pub fn with_contact(self, contact: ContactInfo) -> Self {
        self.contacts.lock().unwrap().insert(contact.id.clone(), contact);
        self
    }

    pub fn with_message(self, message: MessageInfo) -> Self {
        self.messages.lock().unwrap().insert(message.id.clone(), message);
        self
    }

    /// Register `id` (e.g. `5551234@c.us`) for the number lookup.
    pub fn register(self, id: &str) -> Self {
        self.registered
            .lock()
            .unwrap()
            .insert(phone_digits(id), id.to_string());
        self
    }

    pub fn fail_lookup(self, number: &str) -> Self {
        self.failing_lookups.lock().unwrap().insert(phone_digits(number));
        self
    }

    pub fn link(self, id: &str, lid: &str) -> Self {
        self.linked.lock().unwrap().insert(id.to_string(), lid.to_string());
        self
    }

    pub fn fail_linked_lookup(self, id: &str) -> Self {
        self.failing_linked_lookups.lock().unwrap().insert(id.to_string());
        self
    }

    /// Scripted bulk-add outcome for one participant. Unscripted ones get 200.
    pub fn add_outcome(self, id: &str, code: u16, invite_sent: bool) -> Self {
        self.add_codes.lock().unwrap().insert(id.to_string(), (code, invite_sent));
        self
    }

    /// Make the bulk add fail synchronously with `message`.
    pub fn fail_add(self, message: &str) -> Self {
        *self.add_error.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn fail_send_to(self, chat_id: &str) -> Self {
        self.failing_sends.lock().unwrap().insert(chat_id.to_string());
        self
    }

    pub fn fail_invite_code(self) -> Self {
        *self.invite_code.lock().unwrap() = None;
        self
    }

    pub fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls to `method`.
    pub fn count(&self, method: &str) -> usize {
        let prefix = format!("{}:", method);
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    pub fn sent(&self) -> Vec<(String, MessageContent, SendOptions)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(to, _, _)| to.clone()).collect()
    }

    fn record(&self, method: &str, arg: &str) {
        self.calls.lock().unwrap().push(format!("{}:{}", method, arg));
    }

    fn group(&self, group_id: &str) -> Result<ChatInfo> {
        match self.chats.lock().unwrap().get(group_id) {
            Some(chat) if chat.is_group => Ok(chat.clone()),
            Some(_) => Err(Error::NotAGroup(group_id.to_string())),
            None => Err(Error::NotFound(format!("chat {}", group_id))),
        }
    }

    fn message(&self, id: &str, chat_id: &str, body: &str) -> MessageInfo {
        MessageInfo {
            id: id.to_string(),
            body: body.to_string(),
            from: "me@c.us".to_string(),
            to: chat_id.to_string(),
            author: None,
            timestamp: 1_700_000_000,
            has_media: false,
            from_me: true,
            msg_type: "chat".to_string(),
        }
    }
}

#[async_trait]
impl SessionClient for MockSession {
    async fn get_state(&self) -> Result<String> {
        self.record("get_state", "");
        Ok("CONNECTED".to_string())
    }

    async fn get_chats(&self) -> Result<Vec<ChatInfo>> {
        self.record("get_chats", "");
        let mut chats: Vec<_> = self.chats.lock().unwrap().values().cloned().collect();
        chats.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(chats)
    }

    async fn get_contacts(&self) -> Result<Vec<ContactInfo>> {
        self.record("get_contacts", "");
        let mut contacts: Vec<_> = self.contacts.lock().unwrap().values().cloned().collect();
        contacts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(contacts)
    }

    async fn get_chat_by_id(&self, chat_id: &str) -> Result<Option<ChatInfo>> {
        self.record("get_chat_by_id", chat_id);
        Ok(self.chats.lock().unwrap().get(chat_id).cloned())
    }

    async fn get_contact_by_id(&self, contact_id: &str) -> Result<Option<ContactInfo>> {
        self.record("get_contact_by_id", contact_id);
        Ok(self.contacts.lock().unwrap().get(contact_id).cloned())
    }

    async fn get_message_by_id(&self, message_id: &str) -> Result<Option<MessageInfo>> {
        self.record("get_message_by_id", message_id);
        Ok(self.messages.lock().unwrap().get(message_id).cloned())
    }

    async fn get_number_id(&self, number: &str) -> Result<Option<String>> {
        self.record("get_number_id", number);
        let digits = phone_digits(number);
        if self.failing_lookups.lock().unwrap().contains(&digits) {
            return Err(Error::Platform(format!("lookup failed for {}", number)));
        }
        Ok(self.registered.lock().unwrap().get(&digits).cloned())
    }

    async fn get_linked_identity(&self, user_id: &str) -> Result<Option<String>> {
        self.record("get_linked_identity", user_id);
        if self.failing_linked_lookups.lock().unwrap().contains(user_id) {
            return Err(Error::Platform(format!("no lid mapping for {}", user_id)));
        }
        Ok(self.linked.lock().unwrap().get(user_id).cloned())
    }

    async fn send_message(
        &self,
        chat_id: &str,
        content: MessageContent,
        options: SendOptions,
    ) -> Result<MessageInfo> {
        self.record("send_message", chat_id);
        if self.failing_sends.lock().unwrap().contains(chat_id) {
            return Err(Error::Platform(format!("send to {} failed", chat_id)));
        }
        let body = match &content {
            MessageContent::Text { text } => text.clone(),
            MessageContent::Media { .. } => options.caption.clone().unwrap_or_default(),
        };
        let mut sent = self.sent.lock().unwrap();
        let id = format!("true_{}_MSG{}", chat_id, sent.len() + 1);
        sent.push((chat_id.to_string(), content, options));
        Ok(self.message(&id, chat_id, &body))
    }

    async fn fetch_messages(&self, chat_id: &str, limit: u32) -> Result<Vec<MessageInfo>> {
        self.record("fetch_messages", chat_id);
        let messages = self.messages.lock().unwrap();
        let mut found: Vec<_> = messages
            .values()
            .filter(|m| m.chat_id() == chat_id)
            .cloned()
            .collect();
        found.sort_by_key(|m| m.timestamp);
        found.truncate(limit as usize);
        Ok(found)
    }

    async fn send_seen(&self, chat_id: &str) -> Result<bool> {
        self.record("send_seen", chat_id);
        Ok(true)
    }

    async fn delete_message(&self, message_id: &str, _for_everyone: bool) -> Result<()> {
        self.record("delete_message", message_id);
        Ok(())
    }

    async fn react_to_message(&self, message_id: &str, _emoji: &str) -> Result<()> {
        self.record("react_to_message", message_id);
        Ok(())
    }

    async fn forward_message(&self, message_id: &str, chat_id: &str) -> Result<()> {
        self.record("forward_message", &format!("{}->{}", message_id, chat_id));
        Ok(())
    }

    async fn add_participants(
        &self,
        group_id: &str,
        participant_ids: &[String],
        _options: AddParticipantsOptions,
    ) -> Result<Vec<RawAddEntry>> {
        self.record("add_participants", &participant_ids.join(","));
        self.group(group_id)?;
        if let Some(message) = self.add_error.lock().unwrap().clone() {
            return Err(Error::Platform(message));
        }
        let codes = self.add_codes.lock().unwrap();
        Ok(participant_ids
            .iter()
            .map(|id| {
                let (code, invite_sent) = codes.get(id).copied().unwrap_or((200, false));
                RawAddEntry {
                    participant_id: id.clone(),
                    code,
                    message: match code {
                        200 => "The participant was added successfully".to_string(),
                        403 => "The participant can be added by sending private invitation only".to_string(),
                        409 => "The participant is already a group member".to_string(),
                        _ => "Unknown error".to_string(),
                    },
                    invite_sent,
                }
            })
            .collect())
    }

    async fn remove_participants(&self, group_id: &str, participant_ids: &[String]) -> Result<()> {
        self.record("remove_participants", &participant_ids.join(","));
        self.group(group_id)?;
        Ok(())
    }

    async fn promote_participants(&self, group_id: &str, participant_ids: &[String]) -> Result<()> {
        self.record("promote_participants", &participant_ids.join(","));
        self.group(group_id)?;
        Ok(())
    }

    async fn demote_participants(&self, group_id: &str, participant_ids: &[String]) -> Result<()> {
        self.record("demote_participants", &participant_ids.join(","));
        self.group(group_id)?;
        Ok(())
    }

    async fn get_invite_code(&self, group_id: &str) -> Result<String> {
        self.record("get_invite_code", group_id);
        self.invite_code
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Platform("not an admin".to_string()))
    }

    async fn revoke_invite(&self, group_id: &str) -> Result<String> {
        self.record("revoke_invite", group_id);
        Ok("REVOKED456".to_string())
    }

    async fn set_group_subject(&self, group_id: &str, _subject: &str) -> Result<bool> {
        self.record("set_group_subject", group_id);
        Ok(true)
    }

    async fn set_group_description(&self, group_id: &str, _description: &str) -> Result<bool> {
        self.record("set_group_description", group_id);
        Ok(true)
    }

    async fn leave_group(&self, group_id: &str) -> Result<()> {
        self.record("leave_group", group_id);
        Ok(())
    }

    async fn get_contact_about(&self, contact_id: &str) -> Result<Option<String>> {
        self.record("get_contact_about", contact_id);
        Ok(Some("Hey there!".to_string()))
    }

    async fn get_profile_pic_url(&self, contact_id: &str) -> Result<Option<String>> {
        self.record("get_profile_pic_url", contact_id);
        Ok(None)
    }

    async fn set_contact_blocked(&self, contact_id: &str, blocked: bool) -> Result<bool> {
        self.record(if blocked { "block" } else { "unblock" }, contact_id);
        Ok(true)
    }

    async fn get_common_groups(&self, contact_id: &str) -> Result<Vec<String>> {
        self.record("get_common_groups", contact_id);
        let chats = self.chats.lock().unwrap();
        let mut groups: Vec<_> = chats
            .values()
            .filter(|c| c.is_group && c.participants.iter().any(|p| p.id == contact_id))
            .map(|c| c.id.clone())
            .collect();
        groups.sort();
        Ok(groups)
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}
