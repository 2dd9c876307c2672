// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative macros shared by the model types.

/// Generate a `Display` impl that maps enum variants to their wire strings.
///
/// ```ignore
/// crate::simple_display! {
///     VersionStatus {
///         Pending => "pending",
///         Deployed => "deployed",
///     }
/// }
/// ```
#[macro_export]
macro_rules! simple_display {
    ($enum:ty { $( $variant:ident => $str:expr ),+ $(,)? }) => {
        impl std::fmt::Display for $enum {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(match self {
                    $( Self::$variant => $str, )+
                })
            }
        }
    };
}
