//! Value objects for the organization domain.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true when the identifier is empty or whitespace.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a user inside an organization.
    UserId
);

string_id!(
    /// Identifier of a role definition, unique within its organization.
    RoleDefinitionId
);

string_id!(
    /// Identifier of a role instance bound to a user.
    RoleInstanceId
);

impl RoleDefinitionId {
    /// Generates a fresh random role definition id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl RoleInstanceId {
    /// Derives the id of a binding from its canonical form.
    ///
    /// The same role definition bound to the same values always yields the
    /// same id, so re-assigning an identical binding is an upsert.
    pub fn derive(canonical: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, canonical.as_bytes()).to_string())
    }
}
