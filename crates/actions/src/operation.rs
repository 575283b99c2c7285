use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use wabridge_core::Error;

/// Category of addressable object a reflective call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Client,
    Chat,
    Group,
    Channel,
    Message,
    Contact,
}

impl Scope {
    pub const ALL: [Scope; 6] = [
        Scope::Client,
        Scope::Chat,
        Scope::Group,
        Scope::Channel,
        Scope::Message,
        Scope::Contact,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Client => "client",
            Scope::Chat => "chat",
            Scope::Group => "group",
            Scope::Channel => "channel",
            Scope::Message => "message",
            Scope::Contact => "contact",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scope::ALL
            .iter()
            .copied()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown scope '{}'", s)))
    }
}

/// Every operation the generic invoker can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetState,
    GetChats,
    GetContacts,
    GetNumberId,
    IsRegisteredUser,
    ClientSendMessage,
    SendMessage,
    FetchMessages,
    SendSeen,
    GetInviteCode,
    RevokeInvite,
    AddParticipants,
    RemoveParticipants,
    PromoteParticipants,
    DemoteParticipants,
    SetSubject,
    SetDescription,
    Leave,
    Reply,
    React,
    Delete,
    Forward,
    GetAbout,
    GetProfilePicUrl,
    Block,
    Unblock,
    GetCommonGroups,
}

use Operation::*;

const OPERATIONS: &[(Scope, &str, Operation)] = &[
    (Scope::Client, "getState", GetState),
    (Scope::Client, "getChats", GetChats),
    (Scope::Client, "getContacts", GetContacts),
    (Scope::Client, "getNumberId", GetNumberId),
    (Scope::Client, "isRegisteredUser", IsRegisteredUser),
    (Scope::Client, "sendMessage", ClientSendMessage),
    (Scope::Chat, "sendMessage", SendMessage),
    (Scope::Chat, "fetchMessages", FetchMessages),
    (Scope::Chat, "sendSeen", SendSeen),
    (Scope::Channel, "sendMessage", SendMessage),
    (Scope::Channel, "fetchMessages", FetchMessages),
    (Scope::Channel, "sendSeen", SendSeen),
    (Scope::Group, "sendMessage", SendMessage),
    (Scope::Group, "fetchMessages", FetchMessages),
    (Scope::Group, "sendSeen", SendSeen),
    (Scope::Group, "getInviteCode", GetInviteCode),
    (Scope::Group, "revokeInvite", RevokeInvite),
    (Scope::Group, "addParticipants", AddParticipants),
    (Scope::Group, "removeParticipants", RemoveParticipants),
    (Scope::Group, "promoteParticipants", PromoteParticipants),
    (Scope::Group, "demoteParticipants", DemoteParticipants),
    (Scope::Group, "setSubject", SetSubject),
    (Scope::Group, "setDescription", SetDescription),
    (Scope::Group, "leave", Leave),
    (Scope::Message, "reply", Reply),
    (Scope::Message, "react", React),
    (Scope::Message, "delete", Delete),
    (Scope::Message, "forward", Forward),
    (Scope::Contact, "getAbout", GetAbout),
    (Scope::Contact, "getProfilePicUrl", GetProfilePicUrl),
    (Scope::Contact, "block", Block),
    (Scope::Contact, "unblock", Unblock),
    (Scope::Contact, "getCommonGroups", GetCommonGroups),
];

impl Operation {
    pub fn parse(scope: Scope, method: &str) -> Option<Self> {
        OPERATIONS
            .iter()
            .find(|(s, m, _)| *s == scope && *m == method)
            .map(|(_, _, op)| *op)
    }

    /// Method names available on `scope`.
    pub fn methods(scope: Scope) -> impl Iterator<Item = &'static str> {
        OPERATIONS
            .iter()
            .filter(move |(s, _, _)| *s == scope)
            .map(|(_, m, _)| *m)
    }
}
