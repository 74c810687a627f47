//! Host-visible error values.
//!
//! - **`XlErrorKind`** : the error codes the calculation host understands
//! - **`XlError`**     : a kind plus an optional human explanation
//!
//! The host has no notion of a thrown exception, so every failure on the
//! bridge ends up as one of these, wrapped in [`TaggedValue::Error`].

use std::{error::Error, fmt};

use crate::TaggedValue;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// All error codes the host can hold in a cell.
///
/// **Note:** names are CamelCase (idiomatic Rust) while `Display`
/// renders them exactly as the host shows them (`#DIV/0!`, …).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum XlErrorKind {
    Null,
    Div,
    Value,
    Ref,
    Name,
    Num,
    Na,
    GettingData,
}

impl fmt::Display for XlErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Null => "#NULL!",
            Self::Div => "#DIV/0!",
            Self::Value => "#VALUE!",
            Self::Ref => "#REF!",
            Self::Name => "#NAME?",
            Self::Num => "#NUM!",
            Self::Na => "#N/A",
            Self::GettingData => "#GETTING_DATA",
        })
    }
}

impl XlErrorKind {
    /// Parse the host rendering of an error code. Unknown text yields `None`.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.trim().to_ascii_lowercase().as_str() {
            "#null!" => Self::Null,
            "#div/0!" => Self::Div,
            "#value!" => Self::Value,
            "#ref!" => Self::Ref,
            "#name?" => Self::Name,
            "#num!" => Self::Num,
            "#n/a" => Self::Na,
            "#getting_data" => Self::GettingData,
            _ => return None,
        })
    }

    /// Numeric code used by the host's native value representation.
    pub fn code(self) -> u32 {
        match self {
            Self::Null => 0,
            Self::Div => 7,
            Self::Value => 15,
            Self::Ref => 23,
            Self::Name => 29,
            Self::Num => 36,
            Self::Na => 42,
            Self::GettingData => 43,
        }
    }
}

/// The error payload carried by [`TaggedValue::Error`].
///
/// Equality and hashing consider the kind and the message; the host only
/// ever sees the kind.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XlError {
    pub kind: XlErrorKind,
    pub message: Option<String>,
}

impl From<XlErrorKind> for XlError {
    fn from(kind: XlErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }
}

impl XlError {
    /// Basic constructor (no message).
    pub fn new(kind: XlErrorKind) -> Self {
        kind.into()
    }

    /// Attach a human-readable explanation.
    pub fn with_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = Some(msg.into());
        self
    }
}

impl fmt::Display for XlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ref msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl Error for XlError {}

impl From<XlError> for TaggedValue {
    fn from(error: XlError) -> Self {
        TaggedValue::Error(error)
    }
}

impl From<XlErrorKind> for TaggedValue {
    fn from(kind: XlErrorKind) -> Self {
        TaggedValue::Error(XlError::new(kind))
    }
}

impl PartialEq<str> for XlErrorKind {
    fn eq(&self, other: &str) -> bool {
        format!("{self}") == other
    }
}

impl PartialEq<&str> for XlError {
    fn eq(&self, other: &&str) -> bool {
        self.kind.to_string() == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_host_rendering() {
        assert_eq!(XlErrorKind::Div.to_string(), "#DIV/0!");
        assert_eq!(XlErrorKind::Name.to_string(), "#NAME?");
        let err = XlError::new(XlErrorKind::Ref).with_message("stale handle 42");
        assert_eq!(err.to_string(), "#REF!: stale handle 42");
        assert!(err == "#REF!");
    }

    #[test]
    fn parse_is_case_insensitive_and_total() {
        assert_eq!(XlErrorKind::parse(" #n/a "), Some(XlErrorKind::Na));
        assert_eq!(XlErrorKind::parse("#VALUE!"), Some(XlErrorKind::Value));
        assert_eq!(XlErrorKind::parse("#BOGUS"), None);
    }
}
