//! Radio tuner: presets, frequency, station names.

use serde::{Deserialize, Serialize};

use super::code_enum;
use crate::error::DecodeError;

pub const PRESET_CODES: [&str; 4] = ["PRS", "PRZ", "PR3", "PR4"];
pub const TUNING_CODES: [&str; 4] = ["TUN", "TUZ", "TU3", "TU4"];

code_enum! {
    /// Denon tuner band (`TMAN`).
    TunerMode {
        Fm => "FM",
        Dab => "DAB",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresetValue {
    Number(u32),
    Up,
    Down,
}

impl PresetValue {
    pub fn decode(code: &str, params: &str) -> Result<Self, DecodeError> {
        match params {
            "UP" => Ok(PresetValue::Up),
            "DOWN" => Ok(PresetValue::Down),
            p => u32::from_str_radix(p, 16)
                .map(PresetValue::Number)
                .map_err(|_| DecodeError::param(code, params)),
        }
    }

    pub fn encode(self) -> String {
        match self {
            PresetValue::Number(n) => format!("{:02X}", n),
            PresetValue::Up => "UP".to_string(),
            PresetValue::Down => "DOWN".to_string(),
        }
    }

    pub fn encode_dcp(self) -> String {
        match self {
            PresetValue::Number(n) => format!("TPAN{:02}", n),
            PresetValue::Up => "TPANUP".to_string(),
            PresetValue::Down => "TPANDOWN".to_string(),
        }
    }

    pub fn number(self) -> Option<u32> {
        match self {
            PresetValue::Number(n) => Some(n),
            _ => None,
        }
    }
}

/// Tuner frequency or tuning step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tuning {
    /// Raw frequency digits; `mode` is set for Denon receivers.
    Frequency {
        value: String,
        mode: Option<TunerMode>,
    },
    Up,
    Down,
}

impl Tuning {
    pub fn decode(params: &str) -> Self {
        match params {
            "UP" => Tuning::Up,
            "DOWN" => Tuning::Down,
            p => Tuning::Frequency {
                value: p.to_string(),
                mode: None,
            },
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Tuning::Frequency { value, .. } => value.clone(),
            Tuning::Up => "UP".to_string(),
            Tuning::Down => "DOWN".to_string(),
        }
    }

    /// A frequency the receiver could not report (DAB while scanning).
    pub fn is_invalid_frequency(&self) -> bool {
        match self {
            Tuning::Frequency { value, .. } => {
                let v = value.trim();
                v.is_empty() || v.chars().all(|c| c == '-')
            }
            _ => false,
        }
    }
}

/// Station name (`DSN`, or Denon FM/DAB name lines).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioStationName {
    pub name: String,
    pub mode: TunerMode,
}

/// Formats Denon FM digits (`010570`) as MHz (`105.70`).
pub fn format_fm_frequency(digits: &str) -> Option<String> {
    let value: u32 = digits.trim().parse().ok()?;
    Some(format!("{}.{:02}", value / 100, value % 100))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset() {
        assert_eq!(PresetValue::decode("PRS", "0A").unwrap(), PresetValue::Number(10));
        assert_eq!(PresetValue::decode("PRS", "UP").unwrap(), PresetValue::Up);
        assert!(PresetValue::decode("PRS", "N/A").is_err());
        assert_eq!(PresetValue::Number(10).encode(), "0A");
        assert_eq!(PresetValue::Number(3).encode_dcp(), "TPAN03");
    }

    #[test]
    fn test_tuning() {
        assert_eq!(Tuning::decode("UP"), Tuning::Up);
        let f = Tuning::decode("10570");
        assert_eq!(f.encode(), "10570");
        assert!(!f.is_invalid_frequency());
        assert!(Tuning::decode("-----").is_invalid_frequency());
        assert_eq!(format_fm_frequency("010570").as_deref(), Some("105.70"));
        assert_eq!(format_fm_frequency("x"), None);
    }
}
