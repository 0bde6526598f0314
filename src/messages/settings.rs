//! Device settings: dimmer, filters, power saving, speakers, timers.

use serde::{Deserialize, Serialize};

use super::code_enum;
use crate::error::DecodeError;

pub const SPEAKER_A_CODES: [&str; 2] = ["SPA", "ZPA"];
pub const SPEAKER_B_CODES: [&str; 2] = ["SPB", "ZPB"];

code_enum! {
    DimmerLevel {
        Bright => "00",
        Dim => "01",
        Dark => "02",
        ShutOff => "03",
        Off => "08",
        Toggle => "DIM",
    }
}

impl DimmerLevel {
    pub fn dcp_code(self) -> &'static str {
        match self {
            DimmerLevel::Bright => "BRI",
            DimmerLevel::Dim => "DIM",
            DimmerLevel::Dark => "DAR",
            DimmerLevel::ShutOff | DimmerLevel::Off => "OFF",
            DimmerLevel::Toggle => "SEL",
        }
    }

    pub fn from_dcp_code(code: &str) -> Option<Self> {
        match code {
            "BRI" => Some(DimmerLevel::Bright),
            "DIM" => Some(DimmerLevel::Dim),
            "DAR" => Some(DimmerLevel::Dark),
            "OFF" => Some(DimmerLevel::Off),
            _ => None,
        }
    }
}

code_enum! {
    DigitalFilter {
        Slow => "00",
        Sharp => "01",
        Short => "02",
        Toggle => "UP",
    }
}

code_enum! {
    /// Two-state settings toggled with `UP` (auto power, HDMI CEC, speakers).
    SwitchStatus {
        Off => "00",
        On => "01",
        Toggle => "UP",
    }
}

code_enum! {
    /// Two-state settings toggled with `TG` (muting, phase matching bass).
    ToggleStatus {
        Off => "00",
        On => "01",
        Toggle => "TG",
    }
}

code_enum! {
    LateNight {
        Disabled => "N/A",
        Off => "00",
        Low => "01",
        High => "02",
        Auto => "03",
        Toggle => "UP",
    }
}

code_enum! {
    OnOff {
        Off => "OFF",
        On => "ON",
    }
}

code_enum! {
    /// Denon eco mode (`ECO`).
    EcoMode {
        Off => "OFF",
        On => "ON",
        Auto => "AUTO",
    }
}

impl EcoMode {
    pub fn toggle(self) -> Self {
        match self {
            EcoMode::Off => EcoMode::Auto,
            EcoMode::Auto => EcoMode::On,
            EcoMode::On => EcoMode::Off,
        }
    }
}

code_enum! {
    /// Denon audio restorer (`PSRSTR`).
    AudioRestorer {
        Off => "OFF",
        Low => "LOW",
        Medium => "MED",
        High => "HI",
    }
}

impl AudioRestorer {
    pub fn toggle(self) -> Self {
        match self {
            AudioRestorer::Off => AudioRestorer::Low,
            AudioRestorer::Low => AudioRestorer::Medium,
            AudioRestorer::Medium => AudioRestorer::High,
            AudioRestorer::High => AudioRestorer::Off,
        }
    }
}

/// Sleep timer (`SLP`), minutes as hex or `OFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SleepTime {
    Off,
    Minutes(u8),
    Up,
}

impl SleepTime {
    pub fn decode(params: &str) -> Result<Self, DecodeError> {
        match params {
            "OFF" => Ok(SleepTime::Off),
            "UP" => Ok(SleepTime::Up),
            p => u8::from_str_radix(p, 16)
                .map(|m| if m == 0 { SleepTime::Off } else { SleepTime::Minutes(m) })
                .map_err(|_| DecodeError::param("SLP", params)),
        }
    }

    pub fn encode(self) -> String {
        match self {
            SleepTime::Off => "OFF".to_string(),
            SleepTime::Up => "UP".to_string(),
            SleepTime::Minutes(m) => format!("{:02X}", m),
        }
    }

    pub fn minutes(self) -> u8 {
        match self {
            SleepTime::Minutes(m) => m,
            _ => 0,
        }
    }

    /// Next step in the 30/60/90 minute cycle.
    pub fn next(self) -> Self {
        match self.minutes() {
            0..=29 => SleepTime::Minutes(30),
            30..=59 => SleepTime::Minutes(60),
            60..=89 => SleepTime::Minutes(90),
            _ => SleepTime::Off,
        }
    }
}

/// Privacy policy acceptance (`PPS`): one `0`/`1` flag per policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyPolicy {
    pub flags: String,
}

impl PrivacyPolicy {
    pub const ONKYO: usize = 0;
    pub const GOOGLE: usize = 1;
    pub const SUE: usize = 2;

    pub fn decode(params: &str) -> Self {
        Self {
            flags: params.to_string(),
        }
    }

    pub fn is_accepted(&self, policy: usize) -> bool {
        self.flags.as_bytes().get(policy) == Some(&b'1')
    }

    /// Flags string with `policy` marked accepted.
    pub fn accept(&self, policy: usize) -> String {
        let mut bytes: Vec<u8> = self.flags.bytes().collect();
        if bytes.len() < 3 {
            bytes.resize(3, b'0');
        }
        if let Some(b) = bytes.get_mut(policy) {
            *b = b'1';
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
