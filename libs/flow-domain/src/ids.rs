//! Validated identifier value objects.
//!
//! Every identifier is a thin wrapper over a trimmed, non-blank `String`
//! that additionally rejects the `:` character, since identifiers are
//! composed into colon-delimited storage keys (see [`FlowKey`]).

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when constructing an identifier from untrusted input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("{kind} must not be blank")]
    Blank { kind: &'static str },
    #[error("{kind} must not contain ':' (reserved for storage keys): {value:?}")]
    ContainsColon { kind: &'static str, value: String },
}

fn validate(kind: &'static str, raw: &str) -> Result<String, IdentifierError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IdentifierError::Blank { kind });
    }
    if trimmed.contains(':') {
        return Err(IdentifierError::ContainsColon {
            kind,
            value: trimmed.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

macro_rules! define_identifier {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            /// Validate and construct a new identifier.
            pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
                Ok(Self(validate($kind, &value.into())?))
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            #[must_use]
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdentifierError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdentifierError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::new(s).map_err(serde::de::Error::custom)
            }
        }
    };
}

// The name of a flow definition (`FlowDefinition.id`, and the first
// component of a `FlowKey`'s storage key).
define_identifier!(FlowId, "flow id");

// A node in a `FlowDefinition`'s step graph.
define_identifier!(StepId, "step id");

// The owner (user/tenant) a flow instance runs on behalf of.
define_identifier!(OwnerId, "owner id");

// The runtime instance discriminator within a (flow, owner) pair.
define_identifier!(InstanceId, "instance id");

// A logical grouping used for bulk invalidation (tenant, user, ...).
define_identifier!(PartitionKey, "partition key");

/// Storage key component standing in for an absent owner.
pub const ANONYMOUS_OWNER: &str = "anonymous";

// =============================================================================
// FlowKey
// =============================================================================

/// Composite key identifying a single running flow instance.
///
/// Serializes to the colon-delimited storage key grammar:
/// `<flowName> ":" (<ownerId> | "anonymous") ":" <instanceId>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowKey {
    flow_name: FlowId,
    owner_id: Option<OwnerId>,
    instance_id: InstanceId,
}

/// Errors parsing a storage key string back into a [`FlowKey`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowKeyParseError {
    #[error("storage key must have exactly 3 colon-delimited components, got {0:?}")]
    WrongArity(String),
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
}

impl FlowKey {
    #[must_use]
    pub fn new(flow_name: FlowId, owner_id: Option<OwnerId>, instance_id: InstanceId) -> Self {
        Self {
            flow_name,
            owner_id,
            instance_id,
        }
    }

    #[must_use]
    pub fn flow_name(&self) -> &FlowId {
        &self.flow_name
    }

    #[must_use]
    pub fn owner_id(&self) -> Option<&OwnerId> {
        self.owner_id.as_ref()
    }

    #[must_use]
    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    /// The colon-delimited storage key string for this instance.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.flow_name,
            self.owner_id
                .as_ref()
                .map_or(ANONYMOUS_OWNER, OwnerId::as_str),
            self.instance_id
        )
    }
}

impl Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

impl FromStr for FlowKey {
    type Err = FlowKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(3, ':').collect();
        let [flow_name, owner, instance] = parts.as_slice() else {
            return Err(FlowKeyParseError::WrongArity(s.to_string()));
        };
        // splitn(3, ..) can still yield fewer than 3 parts if there aren't
        // enough separators; guard against that explicitly.
        if s.matches(':').count() != 2 {
            return Err(FlowKeyParseError::WrongArity(s.to_string()));
        }
        let owner_id = if *owner == ANONYMOUS_OWNER {
            None
        } else {
            Some(OwnerId::new(*owner)?)
        };
        Ok(Self {
            flow_name: FlowId::new(*flow_name)?,
            owner_id,
            instance_id: InstanceId::new(*instance)?,
        })
    }
}

// =============================================================================
// FlowContext
// =============================================================================

/// Addressing context for a flow instance, independent of storage-key
/// layout: instance, optional owner, optional explicit partition.
///
/// The effective partition defaults to the owner when unset.
///
/// The wire shape (§6's aggregate encoding) names the instance field
/// `flowId` for historical reasons; the domain type keeps the clearer
/// `instance_id` name and renames only at the serde boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowContext {
    #[serde(rename = "flowId")]
    instance_id: InstanceId,
    owner_id: Option<OwnerId>,
    partition_key: Option<PartitionKey>,
}

impl FlowContext {
    #[must_use]
    pub fn new(
        instance_id: InstanceId,
        owner_id: Option<OwnerId>,
        partition_key: Option<PartitionKey>,
    ) -> Self {
        Self {
            instance_id,
            owner_id,
            partition_key,
        }
    }

    /// An anonymous context: no owner, no explicit partition.
    #[must_use]
    pub fn anonymous(instance_id: InstanceId) -> Self {
        Self {
            instance_id,
            owner_id: None,
            partition_key: None,
        }
    }

    #[must_use]
    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    #[must_use]
    pub fn owner_id(&self) -> Option<&OwnerId> {
        self.owner_id.as_ref()
    }

    #[must_use]
    pub fn partition_key(&self) -> Option<&PartitionKey> {
        self.partition_key.as_ref()
    }

    /// The partition this context is scoped to: the explicit partition
    /// if set, otherwise the owner, otherwise `None`.
    #[must_use]
    pub fn effective_partition(&self) -> Option<&str> {
        self.partition_key
            .as_ref()
            .map(PartitionKey::as_str)
            .or_else(|| self.owner_id.as_ref().map(OwnerId::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank() {
        assert!(matches!(
            FlowId::new(""),
            Err(IdentifierError::Blank { .. })
        ));
        assert!(matches!(
            FlowId::new("   "),
            Err(IdentifierError::Blank { .. })
        ));
    }

    #[test]
    fn rejects_colon() {
        assert!(matches!(
            StepId::new("a:b"),
            Err(IdentifierError::ContainsColon { .. })
        ));
    }

    #[test]
    fn trims_whitespace() {
        let id = FlowId::new("  onboarding  ").unwrap();
        assert_eq!(id.as_str(), "onboarding");
    }

    #[test]
    fn flow_key_storage_key_with_owner() {
        let key = FlowKey::new(
            FlowId::new("onboarding").unwrap(),
            Some(OwnerId::new("user-42").unwrap()),
            InstanceId::new("inst-1").unwrap(),
        );
        assert_eq!(key.storage_key(), "onboarding:user-42:inst-1");
    }

    #[test]
    fn flow_key_storage_key_anonymous() {
        let key = FlowKey::new(
            FlowId::new("onboarding").unwrap(),
            None,
            InstanceId::new("inst-1").unwrap(),
        );
        assert_eq!(key.storage_key(), "onboarding:anonymous:inst-1");
    }

    #[test]
    fn flow_key_roundtrip() {
        let key = FlowKey::new(
            FlowId::new("onboarding").unwrap(),
            Some(OwnerId::new("user-42").unwrap()),
            InstanceId::new("inst-1").unwrap(),
        );
        let parsed: FlowKey = key.storage_key().parse().unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn flow_key_roundtrip_anonymous() {
        let key = FlowKey::new(
            FlowId::new("onboarding").unwrap(),
            None,
            InstanceId::new("inst-1").unwrap(),
        );
        let parsed: FlowKey = key.storage_key().parse().unwrap();
        assert_eq!(key, parsed);
        assert!(parsed.owner_id().is_none());
    }

    #[test]
    fn flow_key_parse_rejects_wrong_arity() {
        assert!(matches!(
            "a:b".parse::<FlowKey>(),
            Err(FlowKeyParseError::WrongArity(_))
        ));
        assert!(matches!(
            "a:b:c:d".parse::<FlowKey>(),
            Err(FlowKeyParseError::WrongArity(_))
        ));
    }

    #[test]
    fn context_effective_partition_prefers_explicit() {
        let ctx = FlowContext::new(
            InstanceId::new("inst-1").unwrap(),
            Some(OwnerId::new("user-42").unwrap()),
            Some(PartitionKey::new("tenant-a").unwrap()),
        );
        assert_eq!(ctx.effective_partition(), Some("tenant-a"));
    }

    #[test]
    fn context_effective_partition_falls_back_to_owner() {
        let ctx = FlowContext::new(
            InstanceId::new("inst-1").unwrap(),
            Some(OwnerId::new("user-42").unwrap()),
            None,
        );
        assert_eq!(ctx.effective_partition(), Some("user-42"));
    }

    #[test]
    fn context_anonymous_has_no_partition() {
        let ctx = FlowContext::anonymous(InstanceId::new("inst-1").unwrap());
        assert_eq!(ctx.effective_partition(), None);
    }
}
