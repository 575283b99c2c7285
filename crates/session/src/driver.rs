use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage, WebSocketStream};
use tracing::{debug, error, info, warn};
use wabridge_core::config::DriverConfig;
use wabridge_core::types::{
    de_wire_id, AddParticipantsOptions, ChatInfo, ContactInfo, MessageContent, MessageInfo,
    RawAddEntry, SendOptions,
};
use wabridge_core::{Error, Result, SessionEvent};

use crate::client::SessionClient;

type WsSink = futures::stream::SplitSink<
    WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    WsMessage,
>;

type PendingMap = HashMap<u64, oneshot::Sender<Result<Value>>>;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitFrame<'a> {
    #[serde(rename = "type")]
    frame_type: &'a str,
    client_id: &'a str,
    headless: bool,
}

#[derive(Debug, Serialize)]
struct RequestFrame<'a> {
    #[serde(rename = "type")]
    frame_type: &'a str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct DriverFault {
    message: String,
}

#[derive(Debug, Deserialize)]
struct DriverFrame {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<DriverFault>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Serialized id returned by lookups (plain or composite on the wire).
#[derive(Debug, Deserialize)]
struct WireIdResult(#[serde(deserialize_with = "de_wire_id")] String);

/// `SessionClient` backed by the browser-automation driver process.
///
/// One WebSocket carries requests, their responses (matched by id), and the
/// session's event stream.
pub struct DriverClient {
    config: DriverConfig,
    sink: Arc<Mutex<Option<WsSink>>>,
    pending: Arc<Mutex<PendingMap>>,
    next_id: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
}

impl DriverClient {
    pub fn new(config: DriverConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            config,
            sink: Arc::new(Mutex::new(None)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    pub async fn run_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if self.config.url.trim().is_empty() {
            warn!("Driver URL not configured");
            return;
        }

        info!(driver_url = %self.config.url, "Session driver loop starting");
        let delay = std::time::Duration::from_secs(self.config.reconnect_delay_secs.max(1));

        loop {
            tokio::select! {
                result = self.connect_and_run() => {
                    match result {
                        Ok(_) => info!("Driver connection closed"),
                        Err(e) => error!(error = %e, "Driver connection error"),
                    }
                    info!(delay_secs = delay.as_secs(), "Reconnecting to driver");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.recv() => {
                            info!("Session driver loop shutting down");
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Session driver loop shutting down");
                    break;
                }
            }
        }

        self.drop_connection().await;
    }

    async fn connect_and_run(&self) -> Result<()> {
        let url = url::Url::parse(&self.config.url)
            .map_err(|e| Error::Config(format!("Invalid driver URL: {}", e)))?;

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::Driver(format!("WebSocket connection failed: {}", e)))?;

        info!("Connected to session driver");

        let (mut write, mut read) = ws_stream.split();
        let init = serde_json::to_string(&InitFrame {
            frame_type: "init",
            client_id: &self.config.client_id,
            headless: self.config.headless,
        })?;
        write
            .send(WsMessage::Text(init))
            .await
            .map_err(|e| Error::Driver(format!("Failed to send init frame: {}", e)))?;
        *self.sink.lock().await = Some(write);

        loop {
            match read.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Err(e) = self.handle_frame(&text).await {
                        error!(error = %e, "Failed to handle driver frame");
                    }
                }
                Some(Ok(WsMessage::Close(_))) => {
                    info!("Driver closed connection");
                    break;
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    let mut guard = self.sink.lock().await;
                    if let Some(ref mut write) = *guard {
                        if let Err(e) = write.send(WsMessage::Pong(data)).await {
                            error!(error = %e, "Failed to send pong");
                        }
                    }
                }
                Some(Err(e)) => {
                    error!(error = %e, "WebSocket error");
                    break;
                }
                None => break,
                _ => {}
            }
        }

        self.drop_connection().await;
        Ok(())
    }

    /// Clear the sink, fail every in-flight request, and report the loss.
    async fn drop_connection(&self) {
        let had_sink = self.sink.lock().await.take().is_some();

        let drained: Vec<_> = self.pending.lock().await.drain().collect();
        for (id, tx) in drained {
            debug!(request_id = id, "Failing in-flight driver request");
            let _ = tx.send(Err(Error::Driver("driver connection lost".to_string())));
        }

        if had_sink {
            let _ = self.events.send(SessionEvent::Disconnected {
                reason: "DRIVER_CONNECTION_LOST".to_string(),
            });
        }
    }

    async fn handle_frame(&self, text: &str) -> Result<()> {
        let frame: DriverFrame = serde_json::from_str(text)
            .map_err(|e| Error::Driver(format!("Failed to parse driver frame: {}", e)))?;

        match frame.frame_type.as_str() {
            "response" => {
                let Some(id) = frame.id else {
                    return Err(Error::Driver("response frame without id".to_string()));
                };
                let waiter = self.pending.lock().await.remove(&id);
                let outcome = match frame.error {
                    Some(fault) => Err(Error::Platform(fault.message)),
                    None => Ok(frame.result.unwrap_or(Value::Null)),
                };
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(outcome);
                    }
                    None => debug!(request_id = id, "Response for unknown request"),
                }
            }
            "event" => {
                let name = frame.event.as_deref().unwrap_or("");
                match SessionEvent::from_driver(name, &frame.data)? {
                    Some(event) => {
                        debug!(event = name, "Session event");
                        // No receivers is not an error.
                        let _ = self.events.send(event);
                    }
                    None => debug!(event = name, "Unknown session event"),
                }
            }
            other => {
                debug!(frame_type = %other, "Unknown frame type from driver");
            }
        }
        Ok(())
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let json = serde_json::to_string(&RequestFrame {
            frame_type: "request",
            id,
            method,
            params,
        })?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let sent = {
            let mut guard = self.sink.lock().await;
            match guard.as_mut() {
                Some(write) => write
                    .send(WsMessage::Text(json))
                    .await
                    .map_err(|e| Error::Driver(format!("Failed to send {}: {}", method, e))),
                None => Err(Error::Driver("driver not connected".to_string())),
            }
        };
        if let Err(e) = sent {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        rx.await
            .map_err(|_| Error::Driver(format!("connection closed before {} completed", method)))?
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| Error::Driver(format!("Unexpected {} result: {}", method, e)))
    }
}

/// The platform reports bulk-add outcomes as an object keyed by participant,
/// or as a bare string when the whole call was refused.
fn parse_add_result(value: Value) -> Result<Vec<RawAddEntry>> {
    match value {
        Value::String(message) => Err(Error::Platform(message)),
        Value::Array(_) => serde_json::from_value(value)
            .map_err(|e| Error::Driver(format!("Unexpected addParticipants result: {}", e))),
        Value::Object(map) => map
            .into_iter()
            .map(|(participant_id, entry)| {
                let code = entry
                    .get("code")
                    .and_then(Value::as_u64)
                    .and_then(|c| u16::try_from(c).ok())
                    .unwrap_or(0);
                let message = entry
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let invite_sent = entry
                    .get("isInviteV4Sent")
                    .or_else(|| entry.get("inviteSent"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                Ok(RawAddEntry {
                    participant_id,
                    code,
                    message,
                    invite_sent,
                })
            })
            .collect(),
        other => Err(Error::Driver(format!("Unexpected addParticipants result: {}", other))),
    }
}

#[async_trait]
impl SessionClient for DriverClient {
    async fn get_state(&self) -> Result<String> {
        let state: Option<String> = self.request("getState", json!({})).await?;
        Ok(state.unwrap_or_else(|| "UNKNOWN".to_string()))
    }

    async fn get_chats(&self) -> Result<Vec<ChatInfo>> {
        self.request("getChats", json!({})).await
    }

    async fn get_contacts(&self) -> Result<Vec<ContactInfo>> {
        self.request("getContacts", json!({})).await
    }

    async fn get_chat_by_id(&self, chat_id: &str) -> Result<Option<ChatInfo>> {
        self.request("getChatById", json!({ "chatId": chat_id })).await
    }

    async fn get_contact_by_id(&self, contact_id: &str) -> Result<Option<ContactInfo>> {
        self.request("getContactById", json!({ "contactId": contact_id })).await
    }

    async fn get_message_by_id(&self, message_id: &str) -> Result<Option<MessageInfo>> {
        self.request("getMessageById", json!({ "messageId": message_id })).await
    }

    async fn get_number_id(&self, number: &str) -> Result<Option<String>> {
        let id: Option<WireIdResult> = self.request("getNumberId", json!({ "number": number })).await?;
        Ok(id.map(|i| i.0))
    }

    async fn get_linked_identity(&self, user_id: &str) -> Result<Option<String>> {
        let id: Option<WireIdResult> = self
            .request("getLinkedIdentity", json!({ "userId": user_id }))
            .await?;
        Ok(id.map(|i| i.0))
    }

    async fn send_message(
        &self,
        chat_id: &str,
        content: MessageContent,
        options: SendOptions,
    ) -> Result<MessageInfo> {
        self.request(
            "sendMessage",
            json!({ "chatId": chat_id, "content": content, "options": options }),
        )
        .await
    }

    async fn fetch_messages(&self, chat_id: &str, limit: u32) -> Result<Vec<MessageInfo>> {
        self.request("fetchMessages", json!({ "chatId": chat_id, "limit": limit }))
            .await
    }

    async fn send_seen(&self, chat_id: &str) -> Result<bool> {
        self.request("sendSeen", json!({ "chatId": chat_id })).await
    }

    async fn delete_message(&self, message_id: &str, for_everyone: bool) -> Result<()> {
        self.call("deleteMessage", json!({ "messageId": message_id, "everyone": for_everyone }))
            .await?;
        Ok(())
    }

    async fn react_to_message(&self, message_id: &str, emoji: &str) -> Result<()> {
        self.call("react", json!({ "messageId": message_id, "reaction": emoji }))
            .await?;
        Ok(())
    }

    async fn forward_message(&self, message_id: &str, chat_id: &str) -> Result<()> {
        self.call("forwardMessage", json!({ "messageId": message_id, "chatId": chat_id }))
            .await?;
        Ok(())
    }

    async fn add_participants(
        &self,
        group_id: &str,
        participant_ids: &[String],
        options: AddParticipantsOptions,
    ) -> Result<Vec<RawAddEntry>> {
        let value = self
            .call(
                "addParticipants",
                json!({ "groupId": group_id, "participantIds": participant_ids, "options": options }),
            )
            .await?;
        parse_add_result(value)
    }

    async fn remove_participants(&self, group_id: &str, participant_ids: &[String]) -> Result<()> {
        self.call("removeParticipants", json!({ "groupId": group_id, "participantIds": participant_ids }))
            .await?;
        Ok(())
    }

    async fn promote_participants(&self, group_id: &str, participant_ids: &[String]) -> Result<()> {
        self.call("promoteParticipants", json!({ "groupId": group_id, "participantIds": participant_ids }))
            .await?;
        Ok(())
    }

    async fn demote_participants(&self, group_id: &str, participant_ids: &[String]) -> Result<()> {
        self.call("demoteParticipants", json!({ "groupId": group_id, "participantIds": participant_ids }))
            .await?;
        Ok(())
    }

    async fn get_invite_code(&self, group_id: &str) -> Result<String> {
        self.request("getInviteCode", json!({ "groupId": group_id })).await
    }

    async fn revoke_invite(&self, group_id: &str) -> Result<String> {
        self.request("revokeInvite", json!({ "groupId": group_id })).await
    }

    async fn set_group_subject(&self, group_id: &str, subject: &str) -> Result<bool> {
        self.request("setSubject", json!({ "groupId": group_id, "subject": subject }))
            .await
    }

    async fn set_group_description(&self, group_id: &str, description: &str) -> Result<bool> {
        self.request("setDescription", json!({ "groupId": group_id, "description": description }))
            .await
    }

    async fn leave_group(&self, group_id: &str) -> Result<()> {
        self.call("leaveGroup", json!({ "groupId": group_id })).await?;
        Ok(())
    }

    async fn get_contact_about(&self, contact_id: &str) -> Result<Option<String>> {
        self.request("getAbout", json!({ "contactId": contact_id })).await
    }

    async fn get_profile_pic_url(&self, contact_id: &str) -> Result<Option<String>> {
        self.request("getProfilePicUrl", json!({ "contactId": contact_id }))
            .await
    }

    async fn set_contact_blocked(&self, contact_id: &str, blocked: bool) -> Result<bool> {
        let method = if blocked { "block" } else { "unblock" };
        self.request(method, json!({ "contactId": contact_id })).await
    }

    async fn get_common_groups(&self, contact_id: &str) -> Result<Vec<String>> {
        let ids: Vec<WireIdResult> = self
            .request("getCommonGroups", json!({ "contactId": contact_id }))
            .await?;
        Ok(ids.into_iter().map(|i| i.0).collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add_result_keyed_object() {
        let value = json!({
            "5551234@c.us": { "code": 200, "message": "added", "isInviteV4Sent": false },
            "5559999@c.us": { "code": 403, "message": "private", "isInviteV4Sent": true }
        });
        let mut entries = parse_add_result(value).unwrap();
        entries.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].code, 200);
        assert_eq!(entries[1].participant_id, "5559999@c.us");
        assert!(entries[1].invite_sent);
    }

    #[test]
    fn test_parse_add_result_out_of_range_code_is_unknown() {
        // 65736 would wrap to 200 under a plain cast.
        let value = json!({ "5551234@c.us": { "code": 65736, "message": "odd" } });
        let entries = parse_add_result(value).unwrap();
        assert_eq!(entries[0].code, 0);
    }

    #[test]
    fn test_parse_add_result_string_is_refusal() {
        let err = parse_add_result(json!("Lid is missing in chat table")).unwrap_err();
        assert!(matches!(err, Error::Platform(ref m) if m.contains("Lid is missing")));
    }

    #[tokio::test]
    async fn test_response_frame_completes_pending_request() {
        let client = DriverClient::new(DriverConfig::default());
        let (tx, rx) = oneshot::channel();
        client.pending.lock().await.insert(7, tx);

        client
            .handle_frame(r#"{"type":"response","id":7,"result":{"_serialized":"5551234@c.us"}}"#)
            .await
            .unwrap();

        let value = rx.await.unwrap().unwrap();
        let id: WireIdResult = serde_json::from_value(value).unwrap();
        assert_eq!(id.0, "5551234@c.us");
    }

    #[tokio::test]
    async fn test_error_frame_maps_to_platform_error() {
        let client = DriverClient::new(DriverConfig::default());
        let (tx, rx) = oneshot::channel();
        client.pending.lock().await.insert(3, tx);

        client
            .handle_frame(r#"{"type":"response","id":3,"error":{"message":"not admin"}}"#)
            .await
            .unwrap();

        assert!(matches!(rx.await.unwrap(), Err(Error::Platform(ref m)) if m == "not admin"));
    }

    #[tokio::test]
    async fn test_event_frame_is_broadcast() {
        let client = DriverClient::new(DriverConfig::default());
        let mut events = client.subscribe();

        client
            .handle_frame(r#"{"type":"event","event":"qr","data":{"qr":"2@abc"}}"#)
            .await
            .unwrap();

        assert_eq!(events.recv().await.unwrap(), SessionEvent::Qr { qr: "2@abc".to_string() });
    }

    #[tokio::test]
    async fn test_request_without_connection_fails_fast() {
        let client = DriverClient::new(DriverConfig::default());
        let err = client.get_chats().await.unwrap_err();
        assert!(matches!(err, Error::Driver(_)));
        assert!(client.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_lost_connection_fails_in_flight_requests() {
        let client = DriverClient::new(DriverConfig::default());
        let (tx, rx) = oneshot::channel();
        client.pending.lock().await.insert(11, tx);

        client.drop_connection().await;

        assert!(matches!(rx.await.unwrap(), Err(Error::Driver(_))));
    }
}
