// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! 128-bit UUID identifiers for every entity in the data model.
//!
//! Every entity is addressed by a typed newtype over `uuid::Uuid` rather
//! than a bare `Uuid`, so that a `RunId` and a `StepId` cannot be swapped
//! at a call site without a compile error.

use std::fmt;
use uuid::Uuid;

/// Declares a newtype wrapper around `Uuid` with the ergonomic surface used
/// throughout the data model: `new()`, `nil()`, `parse_str`, `Display`,
/// `From<Uuid>`/`Into<Uuid>`, and the derives a persisted identifier needs.
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            /// Generates a new random (v4) identifier.
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// The nil UUID, used as a sentinel for "unset" in contexts
            /// that cannot use `Option`.
            pub fn nil() -> Self {
                Self(uuid::Uuid::nil())
            }

            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }

            pub fn parse_str(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(uuid::Uuid::parse_str(s)?))
            }

            pub fn as_uuid(&self) -> uuid::Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(id: uuid::Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse_str(s)
            }
        }
    };
}

define_id!(TenantId);
define_id!(ProjectId);
define_id!(ProjectVersionId);
define_id!(StepId);
define_id!(EdgeId);
define_id!(BlockGroupId);
define_id!(BlockDefinitionId);
define_id!(BlockVersionId);
define_id!(CredentialId);
define_id!(OAuth2ConnectionId);
define_id!(RunId);
define_id!(StepRunId);
define_id!(BlockGroupRunId);
define_id!(AgentMemoryId);
define_id!(ScheduleId);
define_id!(WebhookId);

/// A short, log-friendly rendering of a UUID: the first 8 hex characters.
pub fn short(id: &Uuid) -> String {
    let mut buf = [0u8; 36];
    let s = id.hyphenated().encode_lower(&mut buf);
    s[..8].to_string()
}

pub trait ShortId {
    fn short(&self) -> String;
}

impl<T> ShortId for T
where
    T: fmt::Display + Copy + Into<Uuid>,
{
    fn short(&self) -> String {
        short(&(*self).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_distinct() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn round_trips_through_string() {
        let id = StepId::new();
        let parsed: StepId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn nil_is_nil() {
        assert!(RunId::nil().is_nil());
        assert!(!RunId::new().is_nil());
    }

    #[test]
    fn short_id_is_eight_chars() {
        assert_eq!(RunId::new().short().len(), 8);
    }
}
