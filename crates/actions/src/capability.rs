use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::{info, warn};
use wabridge_core::{Error, Result};

use crate::operation::Scope;

/// Allow-list of `(scope, method)` pairs the generic invoker may call.
#[derive(Debug, Clone)]
pub struct CapabilityGate {
    allow_all: bool,
    allowed: BTreeMap<Scope, BTreeSet<String>>,
}

const MINIMAL: &[(Scope, &[&str])] = &[
    (Scope::Client, &["getState", "getChats", "getNumberId", "isRegisteredUser"]),
    (Scope::Chat, &["fetchMessages", "sendMessage", "sendSeen"]),
    (Scope::Group, &["getInviteCode"]),
    (Scope::Channel, &["fetchMessages"]),
    (Scope::Message, &["react", "reply"]),
    (Scope::Contact, &["getAbout", "getProfilePicUrl"]),
];

impl CapabilityGate {
    /// Built-in allow-list used when no usable descriptor exists.
    pub fn minimal() -> Self {
        let allowed = MINIMAL
            .iter()
            .map(|(scope, methods)| (*scope, methods.iter().map(|m| m.to_string()).collect()))
            .collect();
        Self {
            allow_all: false,
            allowed,
        }
    }

    /// Parse a descriptor: an object mapping scope names to method-name arrays.
    /// JSON5 syntax (comments, trailing commas) is accepted.
    pub fn from_descriptor(text: &str) -> Result<Self> {
        let raw: HashMap<String, Vec<String>> = json5::from_str(text)
            .map_err(|e| Error::Config(format!("malformed capability descriptor: {}", e)))?;

        let mut allowed = BTreeMap::new();
        for (scope, methods) in raw {
            let scope: Scope = scope
                .parse()
                .map_err(|_| Error::Config(format!("unknown scope '{}' in capability descriptor", scope)))?;
            let set: BTreeSet<String> = methods
                .into_iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
            allowed.insert(scope, set);
        }
        Ok(Self {
            allow_all: false,
            allowed,
        })
    }

    /// Load the descriptor at `path`. A missing or unusable file degrades to
    /// [`CapabilityGate::minimal`].
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Capability descriptor unavailable, using minimal allow-list");
                return Self::minimal();
            }
        };
        match Self::from_descriptor(&text) {
            Ok(gate) => {
                info!(path = %path.display(), methods = gate.len(), "Capability descriptor loaded");
                gate
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Capability descriptor rejected, using minimal allow-list");
                Self::minimal()
            }
        }
    }

    pub fn with_allow_all(mut self, allow_all: bool) -> Self {
        self.allow_all = allow_all;
        self
    }

    pub fn allow_all(&self) -> bool {
        self.allow_all
    }

    pub fn is_allowed(&self, scope: Scope, method: &str) -> bool {
        self.allow_all
            || self
                .allowed
                .get(&scope)
                .map(|methods| methods.contains(method))
                .unwrap_or(false)
    }

    /// Total number of allowed methods across scopes.
    pub fn len(&self) -> usize {
        self.allowed.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn scopes(&self) -> BTreeMap<String, Vec<String>> {
        self.allowed
            .iter()
            .map(|(scope, methods)| (scope.to_string(), methods.iter().cloned().collect()))
            .collect()
    }

    /// Pretty JSON for the built-in allow-list, written by `wabridge init`.
    pub fn minimal_descriptor() -> String {
        serde_json::to_string_pretty(&Self::minimal().scopes()).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_rejects_mutations() {
        let gate = CapabilityGate::minimal();
        assert!(gate.is_allowed(Scope::Client, "getState"));
        assert!(!gate.is_allowed(Scope::Group, "promoteParticipants"));
        assert!(!gate.is_allowed(Scope::Contact, "block"));
    }

    #[test]
    fn test_override_allows_everything() {
        let gate = CapabilityGate::minimal().with_allow_all(true);
        assert!(gate.is_allowed(Scope::Group, "promoteParticipants"));
    }

    #[test]
    fn test_descriptor_json5() {
        let gate = CapabilityGate::from_descriptor(
            r#"{
                // moderation bot
                group: ["removeParticipants", "promoteParticipants",],
                message: ["delete"],
            }"#,
        )
        .unwrap();
        assert!(gate.is_allowed(Scope::Group, "promoteParticipants"));
        assert!(gate.is_allowed(Scope::Message, "delete"));
        assert!(!gate.is_allowed(Scope::Client, "getState"));
        assert_eq!(gate.len(), 3);
    }

    #[test]
    fn test_descriptor_with_unknown_scope_is_rejected() {
        assert!(CapabilityGate::from_descriptor(r#"{ "browser": ["evaluate"] }"#).is_err());
    }

    #[test]
    fn test_load_degrades_to_minimal() {
        let dir = tempfile::tempdir().unwrap();

        let missing = CapabilityGate::load(&dir.path().join("absent.json"));
        assert_eq!(missing.scopes(), CapabilityGate::minimal().scopes());

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ group: [").unwrap();
        assert_eq!(CapabilityGate::load(&broken).scopes(), CapabilityGate::minimal().scopes());

        let good = dir.path().join("good.json");
        std::fs::write(&good, r#"{ "group": ["leave"] }"#).unwrap();
        assert!(CapabilityGate::load(&good).is_allowed(Scope::Group, "leave"));
    }

    #[test]
    fn test_minimal_descriptor_roundtrips() {
        let gate = CapabilityGate::from_descriptor(&CapabilityGate::minimal_descriptor()).unwrap();
        assert_eq!(gate.scopes(), CapabilityGate::minimal().scopes());
    }
}
