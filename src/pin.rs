//! Join PIN generation and parsing
//!
//! This module provides the human-facing join code for a session. PINs are
//! six uppercase alphanumeric characters, drawn from a space of 36^6
//! combinations so that two concurrently hosted sessions collide with
//! negligible probability. Uniqueness is advisory only; the store never
//! enforces it.

use std::{fmt::Display, str::FromStr};

use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

use crate::constants::pin::{PIN_ALPHABET, PIN_LENGTH};

/// A six-character join code displayed by the host and entered by players
///
/// The PIN is a sharing convenience, not a secret: anyone who knows it can
/// join the session while it is still waiting for players.
#[derive(Debug, Clone, PartialEq, Eq, Hash, DeserializeFromStr, SerializeDisplay)]
pub struct Pin(String);

/// Errors that can occur when parsing a PIN from a string
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The string is not exactly six characters long
    #[error("pin must be exactly {PIN_LENGTH} characters")]
    WrongLength,
    /// The string contains a character outside A-Z and 0-9
    #[error("pin may only contain uppercase letters and digits")]
    InvalidCharacter,
}

impl Pin {
    /// Generates a new random PIN
    pub fn new() -> Self {
        Self(
            (0..PIN_LENGTH)
                .map(|_| char::from(PIN_ALPHABET[fastrand::usize(..PIN_ALPHABET.len())]))
                .collect(),
        )
    }

    /// Returns the PIN as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Pin {
    /// Generates a new random PIN (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Pin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Pin {
    type Err = Error;

    /// Parses a PIN, uppercasing lowercase input the way players type it
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongLength`] or [`Error::InvalidCharacter`] if the
    /// string is not a valid six-character alphanumeric code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.chars().count() != PIN_LENGTH {
            return Err(Error::WrongLength);
        }

        let upper = s.to_ascii_uppercase();

        if upper.bytes().any(|b| !PIN_ALPHABET.contains(&b)) {
            return Err(Error::InvalidCharacter);
        }

        Ok(Self(upper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_new_has_valid_shape() {
        for _ in 0..100 {
            let pin = Pin::new();
            assert_eq!(pin.as_str().len(), PIN_LENGTH);
            assert!(pin.as_str().bytes().all(|b| PIN_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_pin_from_str_uppercases() {
        let pin = Pin::from_str("ab12cd").unwrap();
        assert_eq!(pin.as_str(), "AB12CD");
    }

    #[test]
    fn test_pin_from_str_rejects_wrong_length() {
        assert_eq!(Pin::from_str("AB12C"), Err(Error::WrongLength));
        assert_eq!(Pin::from_str("AB12CDE"), Err(Error::WrongLength));
        assert_eq!(Pin::from_str(""), Err(Error::WrongLength));
    }

    #[test]
    fn test_pin_from_str_rejects_invalid_characters() {
        assert_eq!(Pin::from_str("AB 2CD"), Err(Error::InvalidCharacter));
        assert_eq!(Pin::from_str("AB12C!"), Err(Error::InvalidCharacter));
    }

    #[test]
    fn test_pin_serialization_round_trip() {
        let pin = Pin::from_str("AB12CD").unwrap();
        let serialized = serde_json::to_string(&pin).unwrap();
        assert_eq!(serialized, "\"AB12CD\"");

        let deserialized: Pin = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, pin);
    }

    #[test]
    fn test_pin_deserialization_rejects_invalid() {
        let result: Result<Pin, _> = serde_json::from_str("\"nope\"");
        assert!(result.is_err());
    }
}
