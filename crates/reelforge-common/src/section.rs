//! Section identifiers.
//!
//! Every raw clip starts with a two-digit ordering token (`01-intro.mov`).
//! Clips sharing a token form one section of the finished presentation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// A two-digit section number such as `"01"`.
///
/// Ordering is lexicographic, which for two ASCII digits equals numeric order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SectionId(String);

impl SectionId {
    /// Extract the section id from a file name.
    ///
    /// The name must begin with exactly two ASCII digits, followed by a
    /// non-digit or nothing at all. `01-a.mov` and `07.mov` qualify;
    /// `intro.mov`, `1-a.mov` and `001-a.mov` do not.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let bytes = name.as_bytes();
        if bytes.len() < 2 || !bytes[0].is_ascii_digit() || !bytes[1].is_ascii_digit() {
            return None;
        }
        if bytes.get(2).is_some_and(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self(name[..2].to_string()))
    }

    /// Build a section id from its numeric value (`3` -> `"03"`).
    pub fn from_number(n: u32) -> Option<Self> {
        (n < 100).then(|| Self(format!("{n:02}")))
    }

    /// The id as a two-character string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of the id.
    pub fn number(&self) -> u32 {
        // Construction guarantees two ASCII digits.
        self.0.bytes().fold(0, |acc, b| acc * 10 + u32::from(b - b'0'))
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SectionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(Self(s.to_string()));
        }
        // Accept "1" -> "01" for hand-edited documents.
        match s.parse::<u32>() {
            Ok(n) => Self::from_number(n)
                .ok_or_else(|| Error::precondition(format!("section number out of range: {s}"))),
            Err(_) => Err(Error::precondition(format!("not a section number: {s:?}"))),
        }
    }
}

impl TryFrom<String> for SectionId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SectionId> for String {
    fn from(id: SectionId) -> Self {
        id.0
    }
}
