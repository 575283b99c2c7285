//! Best-effort group membership add.
//!
//! Each participant is driven to one terminal state: added directly, invited
//! by the platform, invited privately through a link, or failed. Individual
//! refusals never fail the batch; only an unusable group, an empty resolved
//! set, or a batch with no success at all surfaces as an error.

use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, warn};
use wabridge_core::config::GroupsConfig;
use wabridge_core::types::{
    is_lid, phone_digits, AddParticipantsOptions, ChatInfo, MessageContent, RawAddEntry,
    SendOptions, USER_SUFFIX,
};
use wabridge_core::Error;
use wabridge_session::SessionClient;

use crate::pacing::InvitePacer;

/// Substring of the platform error raised when a participant's linked
/// identity is missing from its local tables.
pub const LID_DEFECT_MARKER: &str = "lid is missing";

const CODE_ADDED: u16 = 200;
const CODE_PRIVACY: u16 = 403;
const CODE_ALREADY_MEMBER: u16 = 409;
const CODE_SYNC_FAILURE: u16 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Added,
    InvitedByPlatform,
    InvitedPrivately,
    Failed,
}

/// How the platform answered the direct add for one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectOutcome {
    /// 200, or 409 already a member.
    Added,
    /// 403 with the platform's own invite already sent.
    InvitedByPlatform,
    /// 403 without an invite; eligible for the private invite fallback.
    PrivacyBlocked,
    Failed,
}

pub fn classify(entry: &RawAddEntry) -> DirectOutcome {
    match (entry.code, entry.invite_sent) {
        (CODE_ADDED, _) | (CODE_ALREADY_MEMBER, _) => DirectOutcome::Added,
        (CODE_PRIVACY, true) => DirectOutcome::InvitedByPlatform,
        (CODE_PRIVACY, false) => DirectOutcome::PrivacyBlocked,
        _ => DirectOutcome::Failed,
    }
}

pub fn is_lid_defect(message: &str) -> bool {
    message.to_ascii_lowercase().contains(LID_DEFECT_MARKER)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResult {
    pub participant_id: String,
    pub status: ParticipantStatus,
    pub success: bool,
    pub added: bool,
    pub invite_sent: bool,
    pub code: u16,
    pub message: String,
}

impl ParticipantResult {
    fn new(participant_id: &str, status: ParticipantStatus, code: u16, message: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.to_string(),
            status,
            success: status != ParticipantStatus::Failed,
            added: status == ParticipantStatus::Added,
            invite_sent: matches!(
                status,
                ParticipantStatus::InvitedByPlatform | ParticipantStatus::InvitedPrivately
            ),
            code,
            message: message.into(),
        }
    }

    fn failed(participant_id: &str, code: u16, message: impl Into<String>) -> Self {
        Self::new(participant_id, ParticipantStatus::Failed, code, message)
    }
}

/// Result of the private invite pass.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InviteOutcome {
    pub invite_link: Option<String>,
    pub sent: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupAddReport {
    pub success: bool,
    pub message: String,
    pub result: Vec<ParticipantResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_link_sent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<Vec<String>>,
}

#[derive(Error, Debug)]
pub enum GroupAddError {
    #[error("Not a group: {0}")]
    NotAGroup(String),

    #[error("No valid participant identifiers")]
    NoValidIdentifiers,

    #[error("Failed to add participants: {message} (code {code})")]
    AllParticipantsFailed {
        code: u16,
        message: String,
        results: Vec<ParticipantResult>,
    },

    #[error(transparent)]
    Session(#[from] Error),
}

impl From<GroupAddError> for Error {
    fn from(e: GroupAddError) -> Self {
        match e {
            GroupAddError::NotAGroup(id) => Error::NotAGroup(id),
            GroupAddError::NoValidIdentifiers => {
                Error::Validation("no valid participant identifiers".to_string())
            }
            GroupAddError::AllParticipantsFailed { code, message, .. } => {
                Error::Platform(format!("{} (code {})", message, code))
            }
            GroupAddError::Session(e) => e,
        }
    }
}

pub struct GroupAddWorkflow {
    invite_base_url: String,
    invite_message: String,
    pacer: InvitePacer,
}

/// Trim, drop empties, de-duplicate preserving order.
fn normalize_inputs(participants: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    participants
        .iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty() && seen.insert(p.clone()))
        .collect()
}

/// Canonical form used when the lookup fails but the input is still usable.
fn best_effort_id(raw: &str) -> String {
    if raw.contains('@') {
        raw.to_string()
    } else {
        format!("{}{}", phone_digits(raw), USER_SUFFIX)
    }
}

impl GroupAddWorkflow {
    pub fn new(config: &GroupsConfig) -> Self {
        Self {
            invite_base_url: config.invite_base_url.clone(),
            invite_message: config.invite_message.clone(),
            pacer: InvitePacer::per_second(config.sends_per_second),
        }
    }

    pub async fn run(
        &self,
        client: &dyn SessionClient,
        group_id: &str,
        participants: &[String],
    ) -> Result<GroupAddReport, GroupAddError> {
        let group = match client.get_chat_by_id(group_id).await? {
            Some(chat) if chat.is_group => chat,
            _ => return Err(GroupAddError::NotAGroup(group_id.to_string())),
        };

        let inputs = normalize_inputs(participants);
        let mut resolved = Vec::with_capacity(inputs.len());
        for raw in &inputs {
            match self.resolve(client, raw).await {
                Some(id) if !resolved.contains(&id) => resolved.push(id),
                Some(_) => {}
                None => debug!(participant = %raw, "Dropping unregistered participant"),
            }
        }
        if resolved.is_empty() {
            return Err(GroupAddError::NoValidIdentifiers);
        }

        info!(group_id = %group.id, count = resolved.len(), "Adding participants");
        let options = AddParticipantsOptions {
            auto_send_invite: true,
            comment: None,
        };
        let entries = match client.add_participants(&group.id, &resolved, options).await {
            Ok(entries) => entries,
            Err(e) => {
                let message = e.to_string();
                if is_lid_defect(&message) {
                    warn!(group_id = %group.id, error = %message, "Direct add hit linked-identity defect, inviting privately");
                    let invite = self.private_invites(client, &group, &inputs).await;
                    return Ok(self.finish(Vec::new(), Some(invite)));
                }
                warn!(group_id = %group.id, error = %message, "Direct add refused");
                let results = resolved
                    .iter()
                    .map(|id| ParticipantResult::failed(id, CODE_SYNC_FAILURE, message.clone()))
                    .collect();
                return Err(GroupAddError::AllParticipantsFailed {
                    code: CODE_SYNC_FAILURE,
                    message,
                    results,
                });
            }
        };

        let mut results = Vec::with_capacity(resolved.len());
        let mut blocked = Vec::new();
        for entry in &entries {
            match classify(entry) {
                DirectOutcome::Added => results.push(ParticipantResult::new(
                    &entry.participant_id,
                    ParticipantStatus::Added,
                    entry.code,
                    entry.message.clone(),
                )),
                DirectOutcome::InvitedByPlatform => results.push(ParticipantResult::new(
                    &entry.participant_id,
                    ParticipantStatus::InvitedByPlatform,
                    entry.code,
                    entry.message.clone(),
                )),
                DirectOutcome::PrivacyBlocked => blocked.push(entry.participant_id.clone()),
                DirectOutcome::Failed => results.push(ParticipantResult::failed(
                    &entry.participant_id,
                    entry.code,
                    entry.message.clone(),
                )),
            }
        }
        for id in &resolved {
            if !entries.iter().any(|e| &e.participant_id == id) {
                results.push(ParticipantResult::failed(id, 0, "no result reported by platform"));
            }
        }

        if blocked.is_empty() {
            return self.finish_direct(results);
        }

        info!(group_id = %group.id, count = blocked.len(), "Privacy-blocked participants, inviting privately");
        let invite = self.private_invites(client, &group, &blocked).await;
        Ok(self.finish(results, Some(invite)))
    }

    /// Number-registration lookup. `None` means the identifier is not usable.
    async fn resolve(&self, client: &dyn SessionClient, raw: &str) -> Option<String> {
        if is_lid(raw) {
            return Some(raw.to_string());
        }
        let digits = phone_digits(raw);
        if digits.is_empty() {
            return None;
        }
        match client.get_number_id(&digits).await {
            Ok(found) => found,
            Err(e) => {
                // A failed lookup says nothing about the identity itself.
                warn!(participant = %raw, error = %e, "Number lookup failed, keeping identifier");
                Some(best_effort_id(raw))
            }
        }
    }

    fn invite_text(&self, group: &ChatInfo, link: &str) -> String {
        self.invite_message
            .replace("{link}", link)
            .replace("{group}", &group.name)
    }

    /// Send the group's invite link privately to each participant, one at a
    /// time. The invite code is fetched once for the whole pass and each
    /// canonical identity receives at most one message.
    async fn private_invites(
        &self,
        client: &dyn SessionClient,
        group: &ChatInfo,
        participants: &[String],
    ) -> InviteOutcome {
        let mut outcome = InviteOutcome::default();
        let link = match client.get_invite_code(&group.id).await {
            Ok(code) => format!("{}{}", self.invite_base_url, code),
            Err(e) => {
                warn!(group_id = %group.id, error = %e, "Cannot fetch invite code");
                let mut seen = HashSet::new();
                outcome.failed = participants
                    .iter()
                    .map(|p| best_effort_id(p))
                    .filter(|id| seen.insert(id.clone()))
                    .collect();
                return outcome;
            }
        };
        let text = self.invite_text(group, &link);

        let mut handled = HashSet::new();
        for participant in participants {
            let target = self.invite_target(client, participant).await;
            let id = target.clone().unwrap_or_else(|| best_effort_id(participant));
            if !handled.insert(id.clone()) {
                debug!(participant = %participant, id = %id, "Already invited in this pass");
                continue;
            }
            let delivered = match target {
                Some(canonical) => self.deliver_invite(client, &canonical, &text).await,
                None => false,
            };
            if delivered {
                outcome.sent.push(id);
            } else {
                outcome.failed.push(id);
            }
        }
        outcome.invite_link = Some(link);
        outcome
    }

    /// Re-resolve `participant` to its canonical id. `None` when the number
    /// is not registered.
    async fn invite_target(&self, client: &dyn SessionClient, participant: &str) -> Option<String> {
        if is_lid(participant) {
            return Some(participant.to_string());
        }
        match client.get_number_id(&phone_digits(participant)).await {
            Ok(Some(id)) => Some(id),
            Ok(None) => {
                debug!(participant = %participant, "Not registered, skipping invite");
                None
            }
            Err(e) => {
                warn!(participant = %participant, error = %e, "Re-resolve failed, using identifier as given");
                Some(best_effort_id(participant))
            }
        }
    }

    /// Linked identity first, then the canonical id. Never fails the caller.
    async fn deliver_invite(&self, client: &dyn SessionClient, canonical: &str, text: &str) -> bool {
        if !is_lid(canonical) {
            match client.get_linked_identity(canonical).await {
                Ok(Some(lid)) => {
                    self.pacer.wait_turn().await;
                    match client
                        .send_message(&lid, MessageContent::text(text), SendOptions::default())
                        .await
                    {
                        Ok(_) => return true,
                        Err(e) => debug!(participant = %canonical, error = %e, "Invite via linked identity failed"),
                    }
                }
                Ok(None) => debug!(participant = %canonical, "No linked identity"),
                Err(e) => debug!(participant = %canonical, error = %e, "Linked identity lookup failed"),
            }
        }

        self.pacer.wait_turn().await;
        match client
            .send_message(canonical, MessageContent::text(text), SendOptions::default())
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(participant = %canonical, error = %e, "Private invite delivery failed");
                false
            }
        }
    }

    fn finish_direct(&self, results: Vec<ParticipantResult>) -> Result<GroupAddReport, GroupAddError> {
        if results.iter().any(|r| r.success) {
            return Ok(self.finish(results, None));
        }
        let (code, message) = results
            .iter()
            .find(|r| r.status == ParticipantStatus::Failed)
            .map(|r| (r.code, r.message.clone()))
            .unwrap_or((CODE_SYNC_FAILURE, "no participant was added".to_string()));
        Err(GroupAddError::AllParticipantsFailed { code, message, results })
    }

    fn finish(&self, mut results: Vec<ParticipantResult>, invite: Option<InviteOutcome>) -> GroupAddReport {
        let Some(invite) = invite else {
            let added = results.iter().filter(|r| r.added).count();
            let message = if added == results.len() {
                "All participants added".to_string()
            } else {
                format!("{} of {} participants added", added, results.len())
            };
            return GroupAddReport {
                success: true,
                message,
                result: results,
                invite_link: None,
                invite_link_sent: None,
                sent: None,
                failed: None,
            };
        };

        for id in &invite.sent {
            results.push(ParticipantResult::new(
                id,
                ParticipantStatus::InvitedPrivately,
                CODE_PRIVACY,
                "Invite link sent privately",
            ));
        }
        for id in &invite.failed {
            results.push(ParticipantResult::failed(
                id,
                CODE_PRIVACY,
                "Privacy settings block direct add and the invite link could not be delivered",
            ));
        }

        let message = format!(
            "{} added, {} invited, {} failed",
            results.iter().filter(|r| r.added).count(),
            results.iter().filter(|r| r.invite_sent).count(),
            results.iter().filter(|r| !r.success).count(),
        );
        GroupAddReport {
            success: true,
            message,
            result: results,
            invite_link_sent: Some(!invite.sent.is_empty()),
            invite_link: invite.invite_link,
            sent: Some(invite.sent),
            failed: Some(invite.failed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wabridge_session::testing::MockSession;

    const GROUP: &str = "120363000000@g.us";

    fn workflow() -> GroupAddWorkflow {
        GroupAddWorkflow::new(&GroupsConfig {
            sends_per_second: 1000.0,
            ..GroupsConfig::default()
        })
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn group_mock() -> MockSession {
        MockSession::new().with_group(GROUP, "Neighbours", &["5550001@c.us"])
    }

    #[tokio::test]
    async fn test_registered_participant_is_added() {
        let mock = group_mock().register("5551234@c.us");
        let report = workflow().run(&mock, GROUP, &ids(&["5551234@c.us"])).await.unwrap();

        assert!(report.success);
        assert_eq!(report.result.len(), 1);
        let r = &report.result[0];
        assert_eq!(r.participant_id, "5551234@c.us");
        assert!(r.success && r.added);
        assert_eq!(r.code, 200);
        assert!(report.invite_link.is_none());

        let body = serde_json::to_value(&report).unwrap();
        assert_eq!(body["result"][0]["participantId"], "5551234@c.us");
        assert!(body.get("inviteLinkSent").is_none());
    }

    #[tokio::test]
    async fn test_existing_member_counts_as_added() {
        let mock = group_mock()
            .register("5550001@c.us")
            .add_outcome("5550001@c.us", 409, false);
        let report = workflow().run(&mock, GROUP, &ids(&["5550001"])).await.unwrap();

        assert!(report.success);
        assert_eq!(report.result[0].status, ParticipantStatus::Added);
        assert_eq!(report.result[0].code, 409);
    }

    #[tokio::test]
    async fn test_platform_invite_is_success() {
        let mock = group_mock()
            .register("5559999@c.us")
            .add_outcome("5559999@c.us", 403, true);
        let report = workflow().run(&mock, GROUP, &ids(&["5559999@c.us"])).await.unwrap();

        assert!(report.success);
        let r = &report.result[0];
        assert_eq!(r.status, ParticipantStatus::InvitedByPlatform);
        assert!(r.invite_sent);
        assert!(!r.added);
        assert_eq!(mock.count("get_invite_code"), 0);
    }

    #[tokio::test]
    async fn test_unregistered_only_aborts_before_add() {
        let mock = group_mock();
        let err = workflow().run(&mock, GROUP, &ids(&["5550000@c.us"])).await.unwrap_err();

        assert!(matches!(err, GroupAddError::NoValidIdentifiers));
        assert_eq!(mock.count("add_participants"), 0);
        assert_eq!(mock.count("get_invite_code"), 0);
    }

    #[tokio::test]
    async fn test_non_group_fails_before_participant_processing() {
        let mock = MockSession::new()
            .with_direct_chat("5551234@c.us", "Alice")
            .register("5551234@c.us");
        let err = workflow().run(&mock, "5551234@c.us", &ids(&["5551234"])).await.unwrap_err();

        assert!(matches!(err, GroupAddError::NotAGroup(_)));
        assert_eq!(mock.count("get_number_id"), 0);
        assert_eq!(mock.count("add_participants"), 0);
    }

    #[tokio::test]
    async fn test_lookup_error_keeps_identifier() {
        let mock = group_mock().fail_lookup("5557777");
        let report = workflow().run(&mock, GROUP, &ids(&["+555 7777"])).await.unwrap();

        assert_eq!(report.result[0].participant_id, "5557777@c.us");
        assert!(mock.calls().contains(&"add_participants:5557777@c.us".to_string()));
    }

    #[tokio::test]
    async fn test_duplicates_resolve_once() {
        let mock = group_mock().register("5551234@c.us");
        let report = workflow()
            .run(&mock, GROUP, &ids(&["5551234@c.us", "5551234", " 5551234@c.us "]))
            .await
            .unwrap();
        assert_eq!(report.result.len(), 1);
    }

    #[tokio::test]
    async fn test_privacy_blocked_get_private_invites() {
        let mock = group_mock()
            .register("5552222@c.us")
            .register("5553333@c.us")
            .add_outcome("5552222@c.us", 403, false)
            .add_outcome("5553333@c.us", 403, false)
            .link("5552222@c.us", "88001@lid")
            .fail_linked_lookup("5553333@c.us");

        let report = workflow()
            .run(&mock, GROUP, &ids(&["5552222@c.us", "5553333@c.us"]))
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.invite_link_sent, Some(true));
        assert_eq!(report.invite_link.as_deref(), Some("https://chat.whatsapp.com/INVITE123"));
        assert_eq!(report.sent.as_ref().unwrap().len(), 2);
        assert!(report.result.iter().all(|r| r.status == ParticipantStatus::InvitedPrivately));
        assert_eq!(mock.count("get_invite_code"), 1);
        assert_eq!(mock.sent_to(), vec!["88001@lid".to_string(), "5553333@c.us".to_string()]);

        let (_, content, _) = &mock.sent()[0];
        match content {
            MessageContent::Text { text } => {
                assert!(text.contains("https://chat.whatsapp.com/INVITE123"));
                assert!(text.contains("Neighbours"));
            }
            other => panic!("unexpected content {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_one_failed_invite_does_not_affect_another() {
        let mock = group_mock()
            .register("5552222@c.us")
            .register("5553333@c.us")
            .add_outcome("5552222@c.us", 403, false)
            .add_outcome("5553333@c.us", 403, false)
            .link("5552222@c.us", "88001@lid")
            .fail_send_to("88001@lid")
            .fail_send_to("5552222@c.us");

        let report = workflow()
            .run(&mock, GROUP, &ids(&["5552222@c.us", "5553333@c.us"]))
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.failed, Some(ids(&["5552222@c.us"])));
        assert_eq!(report.sent, Some(ids(&["5553333@c.us"])));
        let b = report
            .result
            .iter()
            .find(|r| r.participant_id == "5553333@c.us")
            .unwrap();
        assert_eq!(b.status, ParticipantStatus::InvitedPrivately);
    }

    #[tokio::test]
    async fn test_invite_code_failure_still_reports_success() {
        let mock = group_mock()
            .register("5552222@c.us")
            .add_outcome("5552222@c.us", 403, false)
            .fail_invite_code();

        let report = workflow().run(&mock, GROUP, &ids(&["5552222@c.us"])).await.unwrap();

        assert!(report.success);
        assert_eq!(report.invite_link_sent, Some(false));
        assert!(report.invite_link.is_none());
        assert_eq!(report.failed, Some(ids(&["5552222@c.us"])));
        assert_eq!(mock.count("send_message"), 0);
    }

    #[tokio::test]
    async fn test_lid_defect_routes_everyone_to_invites() {
        let mock = group_mock()
            .register("5552222@c.us")
            .register("5553333@c.us")
            .fail_add("Error: Lid is missing in chat table")
            .fail_send_to("5553333@c.us");

        let input = ids(&["5552222@c.us", "5553333@c.us"]);
        let report = workflow().run(&mock, GROUP, &input).await.unwrap();

        let sent = report.sent.clone().unwrap();
        let failed = report.failed.clone().unwrap();
        assert_eq!(sent.len() + failed.len(), input.len());
        assert_eq!(sent, ids(&["5552222@c.us"]));
        assert_eq!(mock.count("get_invite_code"), 1);
        assert_eq!(report.result.len(), 2);
    }

    #[tokio::test]
    async fn test_other_sync_failure_fails_batch() {
        let mock = group_mock()
            .register("5552222@c.us")
            .fail_add("not-authorized");

        let err = workflow().run(&mock, GROUP, &ids(&["5552222@c.us"])).await.unwrap_err();
        match err {
            GroupAddError::AllParticipantsFailed { code, results, .. } => {
                assert_eq!(code, 500);
                assert_eq!(results.len(), 1);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(mock.count("get_invite_code"), 0);
    }

    #[tokio::test]
    async fn test_only_failures_surface_first_code() {
        let mock = group_mock()
            .register("5552222@c.us")
            .register("5553333@c.us")
            .add_outcome("5552222@c.us", 408, false)
            .add_outcome("5553333@c.us", 500, false);

        let err = workflow()
            .run(&mock, GROUP, &ids(&["5552222@c.us", "5553333@c.us"]))
            .await
            .unwrap_err();
        match err {
            GroupAddError::AllParticipantsFailed { code, results, .. } => {
                assert_eq!(code, 408);
                assert_eq!(results.len(), 2);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_partial_success_is_reported() {
        let mock = group_mock()
            .register("5552222@c.us")
            .register("5553333@c.us")
            .add_outcome("5553333@c.us", 408, false);

        let report = workflow()
            .run(&mock, GROUP, &ids(&["5552222@c.us", "5553333@c.us"]))
            .await
            .unwrap();
        assert!(report.success);
        assert_eq!(report.message, "1 of 2 participants added");
        assert_eq!(report.result.iter().filter(|r| !r.success).count(), 1);
    }

    #[tokio::test]
    async fn test_lid_defect_invites_each_person_once() {
        let mock = group_mock()
            .register("5552222@c.us")
            .fail_add("Lid is missing");

        let report = workflow()
            .run(&mock, GROUP, &ids(&["5552222", "5552222@c.us"]))
            .await
            .unwrap();

        assert_eq!(report.sent, Some(ids(&["5552222@c.us"])));
        assert_eq!(report.failed, Some(Vec::new()));
        assert_eq!(mock.sent_to(), ids(&["5552222@c.us"]));
        assert_eq!(report.result.len(), 1);
        assert_eq!(report.result[0].participant_id, "5552222@c.us");
        assert_eq!(report.result[0].status, ParticipantStatus::InvitedPrivately);
    }

    #[tokio::test]
    async fn test_lid_defect_unregistered_is_failed_without_send() {
        let mock = group_mock()
            .register("5552222@c.us")
            .fail_add("Lid is missing in chat table");

        let input = ids(&["5552222@c.us", "5550000"]);
        let report = workflow().run(&mock, GROUP, &input).await.unwrap();

        assert!(report.success);
        assert_eq!(report.sent, Some(ids(&["5552222@c.us"])));
        assert_eq!(report.failed, Some(ids(&["5550000@c.us"])));
        assert_eq!(mock.sent_to(), ids(&["5552222@c.us"]));
        let missing = report
            .result
            .iter()
            .find(|r| r.participant_id == "5550000@c.us")
            .unwrap();
        assert_eq!(missing.status, ParticipantStatus::Failed);
    }

    #[tokio::test]
    async fn test_mixed_batch_keeps_direct_outcomes() {
        let mock = group_mock()
            .register("5551111@c.us")
            .register("5552222@c.us")
            .register("5553333@c.us")
            .add_outcome("5552222@c.us", 403, false)
            .add_outcome("5553333@c.us", 408, false);

        let report = workflow()
            .run(&mock, GROUP, &ids(&["5551111@c.us", "5552222@c.us", "5553333@c.us"]))
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.result.len(), 3);
        let by_id = |id: &str| report.result.iter().find(|r| r.participant_id == id).unwrap();
        assert_eq!(by_id("5551111@c.us").status, ParticipantStatus::Added);
        assert_eq!(by_id("5551111@c.us").code, 200);
        assert_eq!(by_id("5553333@c.us").status, ParticipantStatus::Failed);
        assert_eq!(by_id("5553333@c.us").code, 408);
        assert_eq!(by_id("5552222@c.us").status, ParticipantStatus::InvitedPrivately);
        assert_eq!(report.sent, Some(ids(&["5552222@c.us"])));
        assert_eq!(mock.sent_to(), ids(&["5552222@c.us"]));
        assert_eq!(report.message, "1 added, 1 invited, 1 failed");
    }

    #[test]
    fn test_classify() {
        let entry = |code, invite_sent| RawAddEntry {
            participant_id: "x@c.us".to_string(),
            code,
            message: String::new(),
            invite_sent,
        };
        assert_eq!(classify(&entry(200, false)), DirectOutcome::Added);
        assert_eq!(classify(&entry(409, false)), DirectOutcome::Added);
        assert_eq!(classify(&entry(403, true)), DirectOutcome::InvitedByPlatform);
        assert_eq!(classify(&entry(403, false)), DirectOutcome::PrivacyBlocked);
        assert_eq!(classify(&entry(408, false)), DirectOutcome::Failed);
        assert!(is_lid_defect("Error: Lid is missing in chat table"));
        assert!(!is_lid_defect("not-authorized"));
    }
}
