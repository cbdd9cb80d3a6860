// src/io/codec.rs
//
// Outbound encoding for user input: text with a line ending, or hex digits.

use serde::{Deserialize, Serialize};

use super::error::SendError;

/// Terminator appended to text sends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    None,
    Lf,
    Cr,
    #[default]
    CrLf,
}

impl LineEnding {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::None => b"",
            LineEnding::Lf => b"\n",
            LineEnding::Cr => b"\r",
            LineEnding::CrLf => b"\r\n",
        }
    }
}

/// Text bytes followed by the line ending.
pub fn encode_text(text: &str, ending: LineEnding) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 2);
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(ending.as_bytes());
    out
}

/// Parse user hex input such as `41 54 0D 0A`, `0x41 0x54` or `41540d0a`.
/// Whitespace separates groups; a `0x` prefix on any group is ignored.
pub fn parse_hex_input(input: &str) -> Result<Vec<u8>, SendError> {
    let digits: String = input
        .split_whitespace()
        .map(|group| {
            group
                .strip_prefix("0x")
                .or_else(|| group.strip_prefix("0X"))
                .unwrap_or(group)
        })
        .collect();
    if digits.is_empty() {
        return Err(SendError::Empty);
    }
    hex::decode(&digits).map_err(|e| SendError::InvalidHex(e.to_string()))
}
