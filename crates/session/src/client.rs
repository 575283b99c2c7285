use async_trait::async_trait;
use tokio::sync::broadcast;
use wabridge_core::types::{
    AddParticipantsOptions, ChatInfo, ContactInfo, MessageContent, MessageInfo, RawAddEntry,
    SendOptions,
};
use wabridge_core::{Result, SessionEvent};

/// The authenticated messaging session. Everything the bridge does to the
/// platform goes through this seam.
///
/// Lookups return `Ok(None)` when the object does not exist; `Err` means the
/// lookup itself failed.
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Platform connection state as reported by the client (e.g. `CONNECTED`).
    async fn get_state(&self) -> Result<String>;

    async fn get_chats(&self) -> Result<Vec<ChatInfo>>;
    async fn get_contacts(&self) -> Result<Vec<ContactInfo>>;
    async fn get_chat_by_id(&self, chat_id: &str) -> Result<Option<ChatInfo>>;
    async fn get_contact_by_id(&self, contact_id: &str) -> Result<Option<ContactInfo>>;
    async fn get_message_by_id(&self, message_id: &str) -> Result<Option<MessageInfo>>;

    /// Number-registration lookup. `Ok(None)` means the number is not registered.
    async fn get_number_id(&self, number: &str) -> Result<Option<String>>;
    /// Map a phone-number identity to its linked identity, if the platform knows one.
    async fn get_linked_identity(&self, user_id: &str) -> Result<Option<String>>;

    async fn send_message(
        &self,
        chat_id: &str,
        content: MessageContent,
        options: SendOptions,
    ) -> Result<MessageInfo>;
    async fn fetch_messages(&self, chat_id: &str, limit: u32) -> Result<Vec<MessageInfo>>;
    async fn send_seen(&self, chat_id: &str) -> Result<bool>;
    async fn delete_message(&self, message_id: &str, for_everyone: bool) -> Result<()>;
    async fn react_to_message(&self, message_id: &str, emoji: &str) -> Result<()>;
    async fn forward_message(&self, message_id: &str, chat_id: &str) -> Result<()>;

    /// Bulk add. A synchronous refusal surfaces as `Err`; otherwise one entry
    /// per requested participant.
    async fn add_participants(
        &self,
        group_id: &str,
        participant_ids: &[String],
        options: AddParticipantsOptions,
    ) -> Result<Vec<RawAddEntry>>;
    async fn remove_participants(&self, group_id: &str, participant_ids: &[String]) -> Result<()>;
    async fn promote_participants(&self, group_id: &str, participant_ids: &[String]) -> Result<()>;
    async fn demote_participants(&self, group_id: &str, participant_ids: &[String]) -> Result<()>;
    async fn get_invite_code(&self, group_id: &str) -> Result<String>;
    async fn revoke_invite(&self, group_id: &str) -> Result<String>;
    async fn set_group_subject(&self, group_id: &str, subject: &str) -> Result<bool>;
    async fn set_group_description(&self, group_id: &str, description: &str) -> Result<bool>;
    async fn leave_group(&self, group_id: &str) -> Result<()>;

    async fn get_contact_about(&self, contact_id: &str) -> Result<Option<String>>;
    async fn get_profile_pic_url(&self, contact_id: &str) -> Result<Option<String>>;
    async fn set_contact_blocked(&self, contact_id: &str, blocked: bool) -> Result<bool>;
    async fn get_common_groups(&self, contact_id: &str) -> Result<Vec<String>>;

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}
