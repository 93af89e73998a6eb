//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example,
//! a [`ProductId`] with a [`VariantId`] even though both are strings under the
//! hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty
            /// or only whitespace.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.trim().is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: commerce catalog references
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies a product in the commerce catalog.
    ///
    /// Accepts either the bare numeric id delivered in webhooks (`"7350937321566"`)
    /// or the global id form (`"gid://shopify/Product/7350937321566"`).
    ProductId
}

string_id! {
    /// Identifies a product variant (one registration tier of a league product).
    VariantId
}

/// Returns the final path segment of a catalog reference.
///
/// `"gid://shopify/Product/42"` becomes `"42"`; a bare id is returned unchanged.
fn trailing_segment(value: &str) -> &str {
    value.rsplit('/').next().unwrap_or(value)
}

impl ProductId {
    /// Returns the short (numeric) form used in admin URLs and trigger names.
    pub fn short(&self) -> &str {
        trailing_segment(&self.0)
    }
}

impl VariantId {
    /// Returns the short (numeric) form used in trigger names.
    pub fn short(&self) -> &str {
        trailing_segment(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: trigger facility
// ---------------------------------------------------------------------------

string_id! {
    /// Unique key of a scheduled trigger within its [`TriggerGroup`].
    TriggerName
}

string_id! {
    /// Namespace grouping related triggers (e.g. `"price-changes"`).
    TriggerGroup
}

string_id! {
    /// Identifies the downstream action a trigger invokes when it fires
    /// (e.g. `"update-price"`, `"move-inventory"`).
    ActionId
}

string_id! {
    /// Identifier returned by the external facility when a trigger is committed.
    ConfirmationId
}

// ---------------------------------------------------------------------------
// Identifiers: webhook secrets
// ---------------------------------------------------------------------------

string_id! {
    /// Names one webhook secret owner (a store, a bot, an app installation).
    ///
    /// Secrets are tried in registration order when the caller does not name
    /// an identity explicitly.
    SecretIdentity
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single scheduling request.
///
/// Generated fresh for every request handled by the orchestrator; propagated
/// through spans so all facility calls made for one request can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a new random request identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`RequestId`] from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_identifiers_are_rejected() {
        assert!(ProductId::new("").is_none());
        assert!(TriggerName::new("   ").is_none());
        assert!(VariantId::new("42").is_some());
    }

    #[test]
    fn short_form_strips_global_id_prefix() {
        let gid = ProductId::new("gid://shopify/Product/7350937321566").unwrap();
        assert_eq!(gid.short(), "7350937321566");

        let bare = VariantId::new("123").unwrap();
        assert_eq!(bare.short(), "123");
    }
}
