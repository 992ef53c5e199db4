//! Typed identifiers.
//!
//! Every id wraps a ULID. The display form carries a short type prefix
//! (`wf_…`); serialized ids are the bare ULID.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to generate a strongly-typed ID wrapper around ULID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a randomly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Creates an ID from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            /// Accepts both the prefixed display form and a bare ULID.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let ulid = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ulid::from_str(ulid).map(Self).map_err(|e| ParseIdError {
                    id_type: stringify!($name),
                    reason: e.to_string(),
                })
            }
        }

        impl From<Ulid> for $name {
            fn from(ulid: Ulid) -> Self {
                Self(ulid)
            }
        }

        impl From<$name> for Ulid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Unique identifier for a workflow definition.
    WorkflowId,
    "wf"
);

define_id!(
    /// Unique identifier for a single execution (run) of a workflow.
    WorkflowRunId,
    "run"
);

define_id!(
    /// Internal identifier of a node within a workflow.
    ///
    /// Unlike the display name, this id survives renames, so anything keyed
    /// by node identity (such as node-scoped deduplication) uses it.
    NodeId,
    "node"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_id_display_format() {
        let id = WorkflowId::new();
        assert!(id.to_string().starts_with("wf_"));
    }

    #[test]
    fn node_id_display_format() {
        let id = NodeId::new();
        assert!(id.to_string().starts_with("node_"));
    }

    #[test]
    fn parse_with_prefix() {
        let id = NodeId::new();
        let parsed: NodeId = id.to_string().parse().expect("should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_without_prefix() {
        let ulid = Ulid::new();
        let id: WorkflowId = ulid.to_string().parse().expect("should parse");
        assert_eq!(id.as_ulid(), ulid);
    }

    #[test]
    fn parse_invalid_ulid() {
        let err = "wf_not-a-ulid".parse::<WorkflowId>().unwrap_err();
        assert_eq!(err.id_type, "WorkflowId");
    }

    #[test]
    fn ids_order_by_creation() {
        let first = WorkflowRunId::from_ulid(Ulid::from_parts(1, 0));
        let second = WorkflowRunId::from_ulid(Ulid::from_parts(2, 0));
        assert!(first < second);
    }

    #[test]
    fn id_serde_is_transparent() {
        let id = NodeId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", id.as_ulid()));
        let parsed: NodeId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);
    }
}
