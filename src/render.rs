// src/render.rs
//
// Turns buffer records into display text for the terminal view.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::buffer_store::{BufferRecord, Direction};

/// How payload bytes are shown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Text,
    Hex,
}

/// View settings. Changing them invalidates every cached rendering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayOptions {
    #[serde(default)]
    pub mode: DisplayMode,
    #[serde(default)]
    pub timestamps: bool,
}

/// SGR and erase-line sequences emitted by most device shells.
static ANSI_SEQUENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("ANSI pattern is valid"));

/// Control characters dropped after escape sequences are removed.
const STRIPPED_CHARS: [char; 4] = ['\u{2190}', '\x08', '\x7f', '\x1b'];

/// Strip terminal escape sequences and stray control characters from received text.
pub fn clean_received_text(text: &str) -> String {
    let without_sequences = ANSI_SEQUENCE.replace_all(text, "");
    without_sequences
        .chars()
        .filter(|c| !STRIPPED_CHARS.contains(c))
        .collect()
}

/// Uppercase hex bytes separated by spaces, e.g. `41 54 0D 0A`.
pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render one record under the given options.
pub fn render_record(record: &BufferRecord, options: &DisplayOptions) -> String {
    let mut out = String::new();
    if options.timestamps {
        out.push_str(&format!("[{}] ", record.timestamp.format("%H:%M:%S")));
    }

    let payload = record.payload();
    match record.direction {
        Direction::Rx => match options.mode {
            DisplayMode::Text => out.push_str(&clean_received_text(&String::from_utf8_lossy(payload))),
            DisplayMode::Hex => out.push_str(&format_hex(payload)),
        },
        Direction::Tx => match options.mode {
            DisplayMode::Text => {
                let text = String::from_utf8_lossy(payload);
                out.push_str("TX: ");
                out.push_str(text.trim_end_matches(&['\r', '\n'][..]));
            }
            DisplayMode::Hex => {
                out.push_str("TX: [HEX] ");
                out.push_str(&format_hex(payload));
            }
        },
        Direction::Error => {
            out.push_str("[Error] ");
            out.push_str(&String::from_utf8_lossy(payload));
        }
        Direction::Info => {
            out.push_str("[System] ");
            out.push_str(&String::from_utf8_lossy(payload));
        }
    }
    out
}
