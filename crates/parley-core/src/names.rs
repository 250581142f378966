//! Room identifiers and display names.
//!
//! Both ends sanitize with the same rules: the client derives its room key
//! from the sanitized room identifier, so a relay that resolved a different
//! string would put members with identical passwords into different rooms.
//!
//! Rules, in order:
//! 1. `\r`, `\n` and `\t` become spaces; every other control character is
//!    removed
//! 2. surrounding whitespace is trimmed
//! 3. the result is truncated to a maximum number of characters
//! 4. an empty result falls back to a default

use std::{borrow::Borrow, fmt};

/// Maximum room identifier length in characters.
pub const MAX_ROOM_CHARS: usize = 64;

/// Maximum display name length in characters.
pub const MAX_NAME_CHARS: usize = 32;

/// Room used when a join names none.
pub const DEFAULT_ROOM: &str = "lobby";

/// Display name used when a join names none.
pub const DEFAULT_NAME: &str = "anon";

/// Sanitize free-form input to at most `max_chars` characters.
///
/// May return an empty string.
pub fn sanitize(input: &str, max_chars: usize) -> String {
    let cleaned: String = input
        .chars()
        .filter_map(|c| match c {
            '\r' | '\n' | '\t' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();

    let truncated: String = cleaned.trim().chars().take(max_chars).collect();
    truncated.trim_end().to_string()
}

/// Sanitized room identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoomName(String);

impl RoomName {
    /// Sanitize `raw`, falling back to [`DEFAULT_ROOM`] when nothing is left.
    pub fn resolve(raw: &str) -> Self {
        let name = sanitize(raw, MAX_ROOM_CHARS);
        if name.is_empty() { Self(DEFAULT_ROOM.to_string()) } else { Self(name) }
    }

    /// The sanitized identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Sanitized display name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DisplayName(String);

impl DisplayName {
    /// Sanitize `raw`, falling back to [`DEFAULT_NAME`] when nothing is left.
    pub fn resolve(raw: &str) -> Self {
        let name = sanitize(raw, MAX_NAME_CHARS);
        if name.is_empty() { Self(DEFAULT_NAME.to_string()) } else { Self(name) }
    }

    /// The sanitized name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DisplayName {
    fn default() -> Self {
        Self(DEFAULT_NAME.to_string())
    }
}

macro_rules! impl_str_newtype {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $ty {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.0
            }
        }
    };
}

impl_str_newtype!(RoomName);
impl_str_newtype!(DisplayName);

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn whitespace_controls_become_spaces() {
        assert_eq!(sanitize("a\tb\nc\rd", 64), "a b c d");
    }

    #[test]
    fn other_controls_are_stripped() {
        assert_eq!(sanitize("lob\u{0}by\u{7f}\u{1b}", 64), "lobby");
    }

    #[test]
    fn input_is_trimmed() {
        assert_eq!(sanitize("  lobby \n", 64), "lobby");
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let input = "é".repeat(40);
        assert_eq!(sanitize(&input, 32).chars().count(), 32);
    }

    #[test]
    fn truncation_does_not_leave_trailing_space() {
        assert_eq!(sanitize("abc def", 4), "abc");
    }

    #[test]
    fn empty_room_resolves_to_lobby() {
        assert_eq!(RoomName::resolve(" \t ").as_str(), DEFAULT_ROOM);
    }

    #[test]
    fn empty_name_resolves_to_anon() {
        assert_eq!(DisplayName::resolve("").as_str(), DEFAULT_NAME);
        assert_eq!(DisplayName::default().as_str(), DEFAULT_NAME);
    }

    #[test]
    fn room_name_is_capped() {
        let room = RoomName::resolve(&"r".repeat(100));
        assert_eq!(room.as_str().len(), MAX_ROOM_CHARS);
    }

    proptest! {
        #[test]
        fn sanitize_output_has_no_controls(input in ".*", max in 1usize..80) {
            let out = sanitize(&input, max);
            prop_assert!(out.chars().count() <= max);
            prop_assert!(!out.chars().any(char::is_control));
            prop_assert_eq!(out.trim(), out.as_str());
        }

        #[test]
        fn sanitize_is_idempotent(input in ".*") {
            let once = sanitize(&input, MAX_ROOM_CHARS);
            prop_assert_eq!(sanitize(&once, MAX_ROOM_CHARS), once.clone());
        }
    }
}
