//! Power, input selection and device identity messages.

use serde::{Deserialize, Serialize};

use super::code_enum;
use crate::error::DecodeError;

pub const POWER_CODES: [&str; 4] = ["PWR", "ZPW", "PW3", "PW4"];
pub const INPUT_CODES: [&str; 4] = ["SLI", "SLZ", "SL3", "SL4"];

code_enum! {
    /// Power state of one zone.
    PowerStatus {
        Standby => "00",
        On => "01",
        AllStandby => "ALL",
    }
}

code_enum! {
    /// Firmware update availability (`UPD`).
    FirmwareStatus {
        Actual => "00",
        NewVersion => "01",
        NewVersionForce => "02",
        Updating => "CMP",
    }
}

impl FirmwareStatus {
    pub fn decode(params: &str) -> Self {
        FirmwareStatus::from_code(params).unwrap_or(FirmwareStatus::Actual)
    }

    pub fn is_new_firmware(self) -> bool {
        matches!(self, FirmwareStatus::NewVersion | FirmwareStatus::NewVersionForce)
    }
}

/// Input selector values. The second column is the Denon source name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputType {
    Video1,
    Video2,
    Video3,
    Video4,
    Video5,
    Video6,
    Video7,
    BdDvd,
    StrmBox,
    Tv,
    Tape1,
    Tape2,
    Phono,
    TvCd,
    Fm,
    Am,
    Tuner,
    MusicServer,
    InternetRadio,
    UsbFront,
    UsbRear,
    Net,
    UsbToggle,
    Airplay,
    Bluetooth,
    UsbDacIn,
    UniversalPort,
    Line,
    Line2,
    Optical,
    Coaxial,
    MultiCh,
    Xm,
    Sirius,
    Dab,
    Hdmi5,
    Hdmi6,
    Hdmi7,
    None,
}

const INPUT_TABLE: &[(InputType, &str, Option<&str>)] = &[
    (InputType::Video1, "00", Some("DVR")),
    (InputType::Video2, "01", Some("SAT/CBL")),
    (InputType::Video3, "02", Some("GAME")),
    (InputType::Video4, "03", Some("AUX1")),
    (InputType::Video5, "04", Some("AUX2")),
    (InputType::Video6, "05", None),
    (InputType::Video7, "06", None),
    (InputType::BdDvd, "10", Some("BD")),
    (InputType::StrmBox, "11", Some("MPLAY")),
    (InputType::Tv, "12", Some("TV")),
    (InputType::Tape1, "20", None),
    (InputType::Tape2, "21", None),
    (InputType::Phono, "22", Some("PHONO")),
    (InputType::TvCd, "23", Some("CD")),
    (InputType::Fm, "24", None),
    (InputType::Am, "25", None),
    (InputType::Tuner, "26", Some("TUNER")),
    (InputType::MusicServer, "27", Some("SERVER")),
    (InputType::InternetRadio, "28", Some("IRADIO")),
    (InputType::UsbFront, "29", Some("USB/IPOD")),
    (InputType::UsbRear, "2A", Some("USB")),
    (InputType::Net, "2B", Some("NET")),
    (InputType::UsbToggle, "2C", None),
    (InputType::Airplay, "2D", None),
    (InputType::Bluetooth, "2E", Some("BT")),
    (InputType::UsbDacIn, "2F", None),
    (InputType::UniversalPort, "40", None),
    (InputType::Line, "41", None),
    (InputType::Line2, "42", None),
    (InputType::Optical, "44", None),
    (InputType::Coaxial, "45", None),
    (InputType::MultiCh, "30", None),
    (InputType::Xm, "31", None),
    (InputType::Sirius, "32", None),
    (InputType::Dab, "33", None),
    (InputType::Hdmi5, "55", None),
    (InputType::Hdmi6, "56", None),
    (InputType::Hdmi7, "57", None),
    (InputType::None, "XX", None),
];

impl InputType {
    pub fn code(self) -> &'static str {
        INPUT_TABLE
            .iter()
            .find(|(t, _, _)| *t == self)
            .map(|(_, c, _)| *c)
            .unwrap_or("XX")
    }

    pub fn from_code(code: &str) -> Option<Self> {
        INPUT_TABLE
            .iter()
            .find(|(_, c, _)| c.eq_ignore_ascii_case(code))
            .map(|(t, _, _)| *t)
    }

    pub fn dcp_code(self) -> Option<&'static str> {
        INPUT_TABLE
            .iter()
            .find(|(t, _, _)| *t == self)
            .and_then(|(_, _, d)| *d)
    }

    pub fn from_dcp_code(name: &str) -> Option<Self> {
        if name == "DVD" {
            return Some(InputType::BdDvd);
        }
        INPUT_TABLE
            .iter()
            .find(|(_, _, d)| *d == Some(name))
            .map(|(t, _, _)| *t)
    }

    /// Inputs that deliver a navigable media list.
    pub fn is_media_list(self) -> bool {
        matches!(
            self,
            InputType::UsbFront | InputType::UsbRear | InputType::Net
        )
    }
}

/// Response to a discovery query (`ECN`): `model/port/area/identifier`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAnnouncement {
    pub category: char,
    pub model: String,
    pub port: u16,
    pub area: String,
    pub identifier: String,
}

impl DeviceAnnouncement {
    pub fn decode(category: char, params: &str) -> Result<Self, DecodeError> {
        let tokens: Vec<&str> = params.split('/').collect();
        if tokens.len() < 2 {
            return Err(DecodeError::param("ECN", params));
        }
        let port = tokens[1]
            .trim()
            .parse::<u16>()
            .map_err(|_| DecodeError::param("ECN", params))?;
        Ok(Self {
            category,
            model: tokens[0].trim().to_string(),
            port,
            area: tokens.get(2).map(|s| s.trim().to_string()).unwrap_or_default(),
            identifier: tokens
                .get(3)
                .map(|s| s.trim_end_matches(['\u{1a}', '\r', '\n']).to_string())
                .unwrap_or_default(),
        })
    }
}

/// Friendly name (`NFN`): leading dots are a padding artefact of some firmwares.
pub fn decode_friendly_name(params: &str) -> String {
    let name = params.strip_prefix('.').unwrap_or(params);
    name.trim().to_string()
}
