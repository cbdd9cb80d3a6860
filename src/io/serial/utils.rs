// src/io/serial/utils.rs
//
// Line-setting types for serial ports and their conversions to the
// serialport crate's types.

use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl as SpFlowControl, Parity as SpParity, StopBits as SpStopBits};

// ============================================================================
// Types
// ============================================================================

/// Parity setting for serial port configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl Parity {
    /// Single-letter form used in "8N1"-style summaries.
    pub fn letter(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        }
    }
}

/// Stop bits setting
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    #[default]
    #[serde(rename = "1")]
    One,
    #[serde(rename = "1.5")]
    OnePointFive,
    #[serde(rename = "2")]
    Two,
}

impl StopBits {
    pub fn label(self) -> &'static str {
        match self {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        }
    }
}

/// Flow control setting
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    #[default]
    None,
    RtsCts,
    XonXoff,
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert our Parity enum to serialport crate's Parity type.
/// Returns `None` for mark/space parity, which serialport cannot configure.
pub fn to_serialport_parity(p: Parity) -> Option<SpParity> {
    match p {
        Parity::None => Some(SpParity::None),
        Parity::Odd => Some(SpParity::Odd),
        Parity::Even => Some(SpParity::Even),
        Parity::Mark | Parity::Space => None,
    }
}

/// Convert data bits count to serialport crate's DataBits type
pub fn to_serialport_data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

/// Convert stop bits to serialport crate's StopBits type.
/// Returns `None` for 1.5 stop bits, which serialport cannot configure.
pub fn to_serialport_stop_bits(bits: StopBits) -> Option<SpStopBits> {
    match bits {
        StopBits::One => Some(SpStopBits::One),
        StopBits::Two => Some(SpStopBits::Two),
        StopBits::OnePointFive => None,
    }
}

/// Convert flow control to serialport crate's FlowControl type
pub fn to_serialport_flow_control(flow: FlowControl) -> SpFlowControl {
    match flow {
        FlowControl::None => SpFlowControl::None,
        FlowControl::RtsCts => SpFlowControl::Hardware,
        FlowControl::XonXoff => SpFlowControl::Software,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parity_default() {
        assert_eq!(Parity::default(), Parity::None);
    }

    #[test]
    fn test_to_serialport_parity() {
        assert!(matches!(to_serialport_parity(Parity::None), Some(SpParity::None)));
        assert!(matches!(to_serialport_parity(Parity::Odd), Some(SpParity::Odd)));
        assert!(matches!(to_serialport_parity(Parity::Even), Some(SpParity::Even)));
        assert!(to_serialport_parity(Parity::Mark).is_none());
        assert!(to_serialport_parity(Parity::Space).is_none());
    }

    #[test]
    fn test_to_serialport_data_bits() {
        assert!(matches!(to_serialport_data_bits(5), DataBits::Five));
        assert!(matches!(to_serialport_data_bits(6), DataBits::Six));
        assert!(matches!(to_serialport_data_bits(7), DataBits::Seven));
        assert!(matches!(to_serialport_data_bits(8), DataBits::Eight));
    }

    #[test]
    fn test_to_serialport_stop_bits() {
        assert!(matches!(to_serialport_stop_bits(StopBits::One), Some(SpStopBits::One)));
        assert!(matches!(to_serialport_stop_bits(StopBits::Two), Some(SpStopBits::Two)));
        assert!(to_serialport_stop_bits(StopBits::OnePointFive).is_none());
    }

    #[test]
    fn test_to_serialport_flow_control() {
        assert!(matches!(to_serialport_flow_control(FlowControl::None), SpFlowControl::None));
        assert!(matches!(to_serialport_flow_control(FlowControl::RtsCts), SpFlowControl::Hardware));
        assert!(matches!(to_serialport_flow_control(FlowControl::XonXoff), SpFlowControl::Software));
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&StopBits::OnePointFive).unwrap(), "\"1.5\"");
        assert_eq!(serde_json::to_string(&FlowControl::RtsCts).unwrap(), "\"rtscts\"");
        let parity: Parity = serde_json::from_str("\"mark\"").unwrap();
        assert_eq!(parity, Parity::Mark);
    }
}
