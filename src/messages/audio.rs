//! Volume, muting, tone and listening mode.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

pub const VOLUME_CODES: [&str; 4] = ["MVL", "ZVL", "VL3", "VL4"];
pub const MUTING_CODES: [&str; 4] = ["AMT", "ZMT", "MT3", "MT4"];
pub const TONE_CODES: [&str; 3] = ["TFR", "ZTN", "TN3"];

/// Master volume parameter. Levels are in receiver steps; on Denon models one step is 0.5 dB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeLevel {
    Level(i32),
    Up,
    Down,
    Up1,
    Down1,
}

impl VolumeLevel {
    pub fn decode(code: &str, params: &str) -> Result<Self, DecodeError> {
        match params {
            "UP" => Ok(VolumeLevel::Up),
            "DOWN" => Ok(VolumeLevel::Down),
            "UP1" => Ok(VolumeLevel::Up1),
            "DOWN1" => Ok(VolumeLevel::Down1),
            p => i32::from_str_radix(p, 16)
                .map(VolumeLevel::Level)
                .map_err(|_| DecodeError::param(code, params)),
        }
    }

    pub fn encode(self) -> String {
        match self {
            VolumeLevel::Level(l) => format!("{:02X}", l.max(0)),
            VolumeLevel::Up => "UP".to_string(),
            VolumeLevel::Down => "DOWN".to_string(),
            VolumeLevel::Up1 => "UP1".to_string(),
            VolumeLevel::Down1 => "DOWN1".to_string(),
        }
    }

    /// Parses a Denon `MV` value: two digits are whole dB, a third digit `5` adds half a step.
    pub fn decode_dcp(digits: &str) -> Option<i32> {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let (whole, half) = if digits.len() > 2 {
            (&digits[..2], digits[2..].starts_with('5'))
        } else {
            (digits, false)
        };
        let whole: i32 = whole.parse().ok()?;
        Some(whole * 2 + i32::from(half))
    }

    pub fn encode_dcp(level: i32) -> String {
        let level = level.max(0);
        if level % 2 == 0 {
            format!("{:02}", level / 2)
        } else {
            format!("{:02}5", level / 2)
        }
    }
}

/// Bass and treble levels; a field is `None` when the message did not carry it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneLevels {
    pub bass: Option<i32>,
    pub treble: Option<i32>,
}

pub const BASS_MARKER: char = 'B';
pub const TREBLE_MARKER: char = 'T';
pub const TONE_LIMIT: i32 = 10;

impl ToneLevels {
    pub fn bass(level: i32) -> Self {
        Self {
            bass: Some(level),
            treble: None,
        }
    }

    pub fn treble(level: i32) -> Self {
        Self {
            bass: None,
            treble: Some(level),
        }
    }

    /// Parses `B+3T-2`, `B00` or `T+A`.
    pub fn decode(params: &str) -> Self {
        Self {
            bass: tone_value(params, BASS_MARKER),
            treble: tone_value(params, TREBLE_MARKER),
        }
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        if let Some(b) = self.bass {
            out.push_str(&encode_tone(BASS_MARKER, b));
        }
        if let Some(t) = self.treble {
            out.push_str(&encode_tone(TREBLE_MARKER, t));
        }
        out
    }
}

fn tone_value(params: &str, marker: char) -> Option<i32> {
    let idx = params.find(marker)?;
    let value = params.get(idx + 1..idx + 3)?;
    parse_signed_hex(value)
}

fn encode_tone(marker: char, level: i32) -> String {
    let level = level.clamp(-TONE_LIMIT, TONE_LIMIT);
    match level {
        0 => format!("{}00", marker),
        l if l > 0 => format!("{}+{:X}", marker, l),
        l => format!("{}-{:X}", marker, -l),
    }
}

/// Parses `+A`, `-F`, `00`, `+1A`.
pub fn parse_signed_hex(value: &str) -> Option<i32> {
    let (sign, digits) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => (1, value),
    };
    i32::from_str_radix(digits, 16).ok().map(|v| sign * v)
}

/// Subwoofer (`SWL`) or center (`CTL`) level; the receiver expects the parameter width it reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCommand {
    pub level: i32,
    pub cmd_length: usize,
}

impl LevelCommand {
    pub fn decode(code: &str, params: &str) -> Result<Self, DecodeError> {
        parse_signed_hex(params)
            .map(|level| Self {
                level,
                cmd_length: params.len(),
            })
            .ok_or_else(|| DecodeError::param(code, params))
    }

    pub fn encode(&self) -> String {
        let width = self.cmd_length.max(2);
        if self.level == 0 {
            return "0".repeat(width);
        }
        let sign = if self.level > 0 { '+' } else { '-' };
        format!("{}{:0w$X}", sign, self.level.abs(), w = width - 1)
    }
}

/// Listening mode (`LMD`), kept as its two-digit hex code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListeningMode(pub String);

impl ListeningMode {
    pub const UNKNOWN: &'static str = "FF";
    pub const UP: &'static str = "UP";
    pub const DOWN: &'static str = "DOWN";

    pub fn decode(params: &str) -> Self {
        Self(params.to_ascii_uppercase())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN || self.0 == "N/A"
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.0.as_str(), "01" | "11")
    }
}

/// Denon `MS` surround names mapped to ISCP listening-mode codes.
const DCP_LISTENING_MODES: &[(&str, &str)] = &[
    ("00", "STEREO"),
    ("01", "DIRECT"),
    ("11", "PURE DIRECT"),
    ("0C", "AUTO"),
    ("0F", "MONO"),
    ("13", "MULTI CH STEREO"),
    ("40", "DOLBY DIGITAL"),
    ("42", "DTS SURROUND"),
    ("80", "DOLBY SURROUND"),
    ("82", "NEURAL:X"),
    ("86", "VIRTUAL"),
    ("08", "ROCK ARENA"),
    ("09", "JAZZ CLUB"),
    ("0A", "MATRIX"),
    ("0E", "GAME"),
];

impl ListeningMode {
    pub fn from_dcp(name: &str) -> Self {
        DCP_LISTENING_MODES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(c, _)| Self(c.to_string()))
            .unwrap_or_else(|| Self(Self::UNKNOWN.to_string()))
    }

    pub fn to_dcp(&self) -> Option<&'static str> {
        match self.0.as_str() {
            Self::UP => Some("RIGHT"),
            Self::DOWN => Some("LEFT"),
            code => DCP_LISTENING_MODES
                .iter()
                .find(|(c, _)| *c == code)
                .map(|(_, n)| *n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume() {
        assert_eq!(VolumeLevel::decode("MVL", "2A").unwrap(), VolumeLevel::Level(42));
        assert_eq!(VolumeLevel::decode("MVL", "UP1").unwrap(), VolumeLevel::Up1);
        assert!(VolumeLevel::decode("MVL", "N/A").is_err());
        assert_eq!(VolumeLevel::Level(42).encode(), "2A");
    }

    #[test]
    fn test_dcp_half_steps() {
        assert_eq!(VolumeLevel::decode_dcp("50"), Some(100));
        assert_eq!(VolumeLevel::decode_dcp("505"), Some(101));
        assert_eq!(VolumeLevel::decode_dcp("5x"), None);
        assert_eq!(VolumeLevel::encode_dcp(101), "505");
        assert_eq!(VolumeLevel::encode_dcp(8), "04");
    }

    #[test]
    fn test_tone() {
        let t = ToneLevels::decode("B+3T-A");
        assert_eq!(t.bass, Some(3));
        assert_eq!(t.treble, Some(-10));
        let single = ToneLevels::decode("T00");
        assert_eq!(single.bass, None);
        assert_eq!(single.treble, Some(0));
        assert_eq!(ToneLevels::bass(0).encode(), "B00");
        assert_eq!(ToneLevels::treble(-2).encode(), "T-2");
        assert_eq!(ToneLevels::bass(14).encode(), "B+A");
    }

    #[test]
    fn test_level_command() {
        let swl = LevelCommand::decode("SWL", "-A").unwrap();
        assert_eq!(swl.level, -10);
        assert_eq!(swl.cmd_length, 2);
        assert_eq!(LevelCommand { level: 3, cmd_length: 3 }.encode(), "+03");
        assert_eq!(LevelCommand { level: 0, cmd_length: 2 }.encode(), "00");
        assert!(LevelCommand::decode("CTL", "N/A").is_err());
    }

    #[test]
    fn test_listening_mode() {
        assert!(ListeningMode::decode("ff").is_unknown());
        assert_eq!(ListeningMode::from_dcp("STEREO").0, "00");
        assert!(ListeningMode::from_dcp("XYZ").is_unknown());
        assert_eq!(ListeningMode("01".to_string()).to_dcp(), Some("DIRECT"));
    }
}
