// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Boilerplate-reduction macros shared across the data model.

/// Implements `Display` for an enum by matching each variant to a literal.
///
/// ```
/// wf_core::simple_display! {
///     enum Color {
///         Red => "red",
///         Blue => "blue",
///     }
/// }
/// ```
#[macro_export]
macro_rules! simple_display {
    (enum $name:ident { $($variant:ident => $text:literal),* $(,)? }) => {
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let s = match self {
                    $(Self::$variant => $text,)*
                };
                write!(f, "{s}")
            }
        }
    };
}
