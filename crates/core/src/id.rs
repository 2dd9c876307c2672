// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes.
//!
//! IDs minted by this crate (connections, scheduled snapshots, support
//! bundle requests) are `{prefix}{nanoid}`. IDs that originate in the store
//! (apps, clusters) are wrapped verbatim with `new`.

/// Define a newtype ID wrapper around `SmolStr` with a type prefix.
///
/// Generates `new()` for wrapping an existing string, `generate()` for a
/// random prefixed ID, `as_str()`, `short()`, `Display`, `From<&str>`,
/// `From<String>`, `Borrow<str>` and `Deref` implementations.
///
/// ```ignore
/// define_id! {
///     /// Doc comment for the ID type.
///     pub struct ConnectionId("con-");
/// }
/// ```
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident($prefix:literal);
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub smol_str::SmolStr);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Wrap an existing identifier
            pub fn new(id: impl Into<smol_str::SmolStr>) -> Self {
                Self(id.into())
            }

            /// Generate a new random ID with the type prefix
            pub fn generate() -> Self {
                Self(smol_str::SmolStr::new(format!("{}{}", Self::PREFIX, nanoid::nanoid!(19))))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns a string slice truncated to at most `n` characters.
            pub fn short(&self, n: usize) -> &str {
                $crate::id::short(&self.0, n)
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }
    };
}

/// Returns a string slice truncated to at most `n` characters.
pub fn short(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

define_id! {
    /// Application identity as stored by the API layer.
    pub struct AppId("app-");
}

define_id! {
    /// Target cluster identity, resolved from an agent's deploy token.
    pub struct ClusterId("cls-");
}

define_id! {
    /// One live agent connection. A cluster may have several at once.
    pub struct ConnectionId("con-");
}

define_id! {
    /// Row in the scheduled snapshot queue.
    pub struct ScheduledSnapshotId("sch-");
}

define_id! {
    /// Queued support bundle request.
    pub struct SupportBundleId("sb-");
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
