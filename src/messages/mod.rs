//! Typed receiver messages
//!
//! Every ISCP code and DCP line the session understands decodes into one [`Message`] variant.
//! Outbound traffic is a [`Request`]: a message to send, a status query, or a raw code/parameter
//! pair from a shortcut script. Decode never panics; unparseable parameters surface as
//! [`DecodeError`] and unknown codes as [`Message::Unknown`].

/// Declares a wire-code enum with `ALL`, `code()` and exact-match `from_code()`.
macro_rules! code_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn code(self) -> &'static str {
                match self {
                    $($name::$variant => $code),+
                }
            }

            pub fn from_code(code: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|v| v.code() == code)
            }
        }
    };
}
pub(crate) use code_enum;

pub mod audio;
pub mod common;
pub mod dcp;
pub mod multiroom;
pub mod navigation;
pub mod playback;
pub mod settings;
pub mod tuner;
pub mod xml;

use serde::Serialize;

use crate::error::DecodeError;
use crate::protocol::iscp::IscpFrame;

pub use audio::{LevelCommand, ListeningMode, ToneLevels, VolumeLevel};
pub use common::{DeviceAnnouncement, FirmwareStatus, InputType, PowerStatus};
pub use dcp::DcpReceiverUpdate;
pub use multiroom::{ChannelSetting, GroupAction, GroupCommand};
pub use navigation::{
    CustomPopup, LayerInfo, ListInfo, ListTitleInfo, MediaContainer, PlayQueueCommand,
    ServiceType, UiType, XmlListInfo, XmlListItem,
};
pub use playback::{
    AmpCommand, JacketArt, MenuStatus, OperationCommand, PlayState, PlayStatus, SetupCommand,
    TimeInfo, TrackInfo,
};
pub use settings::{
    AudioRestorer, DigitalFilter, DimmerLevel, EcoMode, LateNight, OnOff, PrivacyPolicy,
    SleepTime, SwitchStatus, ToggleStatus,
};
pub use tuner::{PresetValue, RadioStationName, TunerMode, Tuning};
pub use xml::{MultiroomInfo, ReceiverInfo};

/// A decoded receiver message or an outbound command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Message {
    PowerStatus { zone: usize, status: PowerStatus },
    FirmwareUpdate(FirmwareStatus),
    ReceiverInformation(Box<ReceiverInfo>),
    DcpReceiverInformation(DcpReceiverUpdate),
    FriendlyName(String),
    InputSelector { zone: usize, input: InputType },
    DeviceAnnouncement(DeviceAnnouncement),
    PrivacyPolicy(PrivacyPolicy),

    DimmerLevel(DimmerLevel),
    DigitalFilter(DigitalFilter),
    AutoPower(SwitchStatus),
    HdmiCec(SwitchStatus),
    SpeakerA { zone: usize, status: SwitchStatus },
    SpeakerB { zone: usize, status: SwitchStatus },
    SleepTimer(SleepTime),
    LateNight(LateNight),
    NetworkStandBy(OnOff),
    PhaseMatchingBass(ToggleStatus),
    DcpEcoMode(EcoMode),
    DcpAudioRestorer(AudioRestorer),
    DcpAllZoneStereo(OnOff),

    AudioMuting { zone: usize, status: ToggleStatus },
    MasterVolume { zone: usize, level: VolumeLevel },
    ToneCommand { zone: usize, tone: ToneLevels },
    SubwooferLevel(LevelCommand),
    CenterLevel(LevelCommand),
    ListeningMode(ListeningMode),
    AudioInformation(String),
    VideoInformation(String),

    PlayStatus(PlayState),
    TimeInfo(TimeInfo),
    TimeSeek(String),
    TrackInfo(TrackInfo),
    ArtistName(String),
    AlbumName(String),
    TitleName(String),
    FileFormat(String),
    JacketArt(JacketArt),
    MenuStatus(MenuStatus),
    OperationCommand(OperationCommand),
    AmpOperation(AmpCommand),
    SetupOperation(SetupCommand),

    ListTitleInfo(ListTitleInfo),
    ListInfo(ListInfo),
    XmlListInfo(XmlListInfo),
    XmlListRequest { sequence: u32, layer: u32, start: u32, end: u32 },
    SelectListItem { layers: u32, id: u32 },
    NetworkService(ServiceType),
    CustomPopup(CustomPopup),
    PlayQueue(PlayQueueCommand),
    DcpMediaContainer(Box<MediaContainer>),
    DcpMediaItem { mid: String, sid: i64 },
    DcpMediaEvent(String),

    PresetCommand { zone: usize, preset: PresetValue },
    PresetMemory(u32),
    TuningCommand { zone: usize, tuning: Tuning },
    RadioStationName(RadioStationName),
    DcpTunerMode(TunerMode),
    RdsInformation(String),

    MultiroomDeviceInformation(Box<MultiroomInfo>),
    MultiroomChannelSetting(ChannelSetting),
    MultiroomGroupSetting(GroupCommand),

    /// Cover bytes fetched from a URL the receiver announced.
    CoverFetched(Vec<u8>),
    /// Sentinel pushed by a channel when its connection ends.
    Disconnected,
    Unknown { code: String, params: String },
}

fn zone_of(codes: &[&str], code: &str) -> Option<usize> {
    codes.iter().position(|c| *c == code)
}

/// Decodes one ISCP frame.
pub fn decode_iscp(frame: &IscpFrame) -> Result<Message, DecodeError> {
    let code = frame.code.as_str();
    let p = frame.params.as_str();

    if let Some(zone) = zone_of(&common::POWER_CODES, code) {
        return PowerStatus::from_code(p)
            .map(|status| Message::PowerStatus { zone, status })
            .ok_or_else(|| DecodeError::param(code, p));
    }
    if let Some(zone) = zone_of(&common::INPUT_CODES, code) {
        return InputType::from_code(p)
            .map(|input| Message::InputSelector { zone, input })
            .ok_or_else(|| DecodeError::param(code, p));
    }
    if let Some(zone) = zone_of(&audio::VOLUME_CODES, code) {
        return VolumeLevel::decode(code, p).map(|level| Message::MasterVolume { zone, level });
    }
    if let Some(zone) = zone_of(&audio::MUTING_CODES, code) {
        return ToggleStatus::from_code(p)
            .map(|status| Message::AudioMuting { zone, status })
            .ok_or_else(|| DecodeError::param(code, p));
    }
    if let Some(zone) = zone_of(&audio::TONE_CODES, code) {
        return Ok(Message::ToneCommand {
            zone,
            tone: ToneLevels::decode(p),
        });
    }
    if let Some(zone) = zone_of(&settings::SPEAKER_A_CODES, code) {
        return SwitchStatus::from_code(p)
            .map(|status| Message::SpeakerA { zone, status })
            .ok_or_else(|| DecodeError::param(code, p));
    }
    if let Some(zone) = zone_of(&settings::SPEAKER_B_CODES, code) {
        return SwitchStatus::from_code(p)
            .map(|status| Message::SpeakerB { zone, status })
            .ok_or_else(|| DecodeError::param(code, p));
    }
    if let Some(zone) = zone_of(&tuner::PRESET_CODES, code) {
        return PresetValue::decode(code, p).map(|preset| Message::PresetCommand { zone, preset });
    }
    if let Some(zone) = zone_of(&tuner::TUNING_CODES, code) {
        return Ok(Message::TuningCommand {
            zone,
            tuning: Tuning::decode(p),
        });
    }

    let param_err = || DecodeError::param(code, p);
    let msg = match code {
        "UPD" => Message::FirmwareUpdate(FirmwareStatus::decode(p)),
        "NRI" => Message::ReceiverInformation(Box::new(ReceiverInfo::parse(p)?)),
        "NFN" => Message::FriendlyName(common::decode_friendly_name(p)),
        "ECN" => Message::DeviceAnnouncement(DeviceAnnouncement::decode(frame.category, p)?),
        "PPS" => Message::PrivacyPolicy(PrivacyPolicy::decode(p)),

        "DIM" => Message::DimmerLevel(DimmerLevel::from_code(p).ok_or_else(param_err)?),
        "DGF" => Message::DigitalFilter(DigitalFilter::from_code(p).ok_or_else(param_err)?),
        "APD" => Message::AutoPower(SwitchStatus::from_code(p).ok_or_else(param_err)?),
        "CEC" => Message::HdmiCec(SwitchStatus::from_code(p).ok_or_else(param_err)?),
        "SLP" => Message::SleepTimer(SleepTime::decode(p)?),
        "LTN" => Message::LateNight(LateNight::from_code(p).unwrap_or(LateNight::Disabled)),
        "NSB" => Message::NetworkStandBy(OnOff::from_code(p).ok_or_else(param_err)?),
        "PMB" => Message::PhaseMatchingBass(ToggleStatus::from_code(p).ok_or_else(param_err)?),

        "SWL" => Message::SubwooferLevel(LevelCommand::decode(code, p)?),
        "CTL" => Message::CenterLevel(LevelCommand::decode(code, p)?),
        "LMD" => Message::ListeningMode(ListeningMode::decode(p)),
        "IFA" => Message::AudioInformation(p.to_string()),
        "IFV" => Message::VideoInformation(p.to_string()),

        "NST" => Message::PlayStatus(PlayState::decode(p)?),
        "NTM" => Message::TimeInfo(TimeInfo::decode(p)),
        "NTS" => Message::TimeSeek(p.to_string()),
        "NTR" => Message::TrackInfo(TrackInfo::decode(p)),
        "NAT" => Message::ArtistName(p.to_string()),
        "NAL" => Message::AlbumName(p.to_string()),
        "NTI" => Message::TitleName(p.to_string()),
        "NFI" => Message::FileFormat(p.to_string()),
        "NJA" => Message::JacketArt(JacketArt::decode(p)?),
        "NMS" => Message::MenuStatus(MenuStatus::decode(p)?),
        "NTC" => Message::OperationCommand(OperationCommand::from_code(p).ok_or_else(param_err)?),
        "CAP" => Message::AmpOperation(AmpCommand::from_code(p).ok_or_else(param_err)?),
        "OSD" => Message::SetupOperation(SetupCommand::from_code(p).ok_or_else(param_err)?),

        "NLT" => Message::ListTitleInfo(ListTitleInfo::decode(p)?),
        "NLS" => Message::ListInfo(ListInfo::decode(p)?),
        "NLA" => Message::XmlListInfo(XmlListInfo::decode(p)?),
        "NCP" => Message::CustomPopup(CustomPopup::decode(p)?),

        "PRM" => Message::PresetMemory(u32::from_str_radix(p, 16).map_err(|_| param_err())?),
        "DSN" => Message::RadioStationName(RadioStationName {
            name: p.trim().to_string(),
            mode: TunerMode::Dab,
        }),
        "RDS" => Message::RdsInformation(p.to_string()),

        "MDI" => Message::MultiroomDeviceInformation(Box::new(MultiroomInfo::parse(p)?)),

        _ => Message::Unknown {
            code: code.to_string(),
            params: p.to_string(),
        },
    };
    Ok(msg)
}

impl Message {
    /// ISCP code of this message, zone-specific where the protocol has zone codes.
    pub fn code(&self) -> &str {
        fn zoned(codes: &'static [&'static str], zone: usize) -> &'static str {
            codes.get(zone).or(codes.first()).copied().unwrap_or("")
        }
        match self {
            Message::PowerStatus { zone, .. } => zoned(&common::POWER_CODES, *zone),
            Message::FirmwareUpdate(_) => "UPD",
            Message::ReceiverInformation(_) => "NRI",
            Message::DcpReceiverInformation(_) => "D01",
            Message::FriendlyName(_) => "NFN",
            Message::InputSelector { zone, .. } => zoned(&common::INPUT_CODES, *zone),
            Message::DeviceAnnouncement(_) => "ECN",
            Message::PrivacyPolicy(_) => "PPS",
            Message::DimmerLevel(_) => "DIM",
            Message::DigitalFilter(_) => "DGF",
            Message::AutoPower(_) => "APD",
            Message::HdmiCec(_) => "CEC",
            Message::SpeakerA { zone, .. } => zoned(&settings::SPEAKER_A_CODES, *zone),
            Message::SpeakerB { zone, .. } => zoned(&settings::SPEAKER_B_CODES, *zone),
            Message::SleepTimer(_) => "SLP",
            Message::LateNight(_) => "LTN",
            Message::NetworkStandBy(_) => "NSB",
            Message::PhaseMatchingBass(_) => "PMB",
            Message::DcpEcoMode(_) => "D03",
            Message::DcpAudioRestorer(_) => "D04",
            Message::DcpAllZoneStereo(_) => "D10",
            Message::AudioMuting { zone, .. } => zoned(&audio::MUTING_CODES, *zone),
            Message::MasterVolume { zone, .. } => zoned(&audio::VOLUME_CODES, *zone),
            Message::ToneCommand { zone, .. } => zoned(&audio::TONE_CODES, *zone),
            Message::SubwooferLevel(_) => "SWL",
            Message::CenterLevel(_) => "CTL",
            Message::ListeningMode(_) => "LMD",
            Message::AudioInformation(_) => "IFA",
            Message::VideoInformation(_) => "IFV",
            Message::PlayStatus(_) => "NST",
            Message::TimeInfo(_) => "NTM",
            Message::TimeSeek(_) => "NTS",
            Message::TrackInfo(_) => "NTR",
            Message::ArtistName(_) => "NAT",
            Message::AlbumName(_) => "NAL",
            Message::TitleName(_) => "NTI",
            Message::FileFormat(_) => "NFI",
            Message::JacketArt(_) => "NJA",
            Message::MenuStatus(_) => "NMS",
            Message::OperationCommand(_) => "NTC",
            Message::AmpOperation(_) => "CAP",
            Message::SetupOperation(_) => "OSD",
            Message::ListTitleInfo(_) => "NLT",
            Message::ListInfo(_) => "NLS",
            Message::XmlListInfo(_)
            | Message::XmlListRequest { .. }
            | Message::SelectListItem { .. } => "NLA",
            Message::NetworkService(_) => "NSV",
            Message::CustomPopup(_) => "NCP",
            Message::PlayQueue(cmd) => cmd.code(),
            Message::DcpMediaContainer(_) => "D05",
            Message::DcpMediaItem { .. } => "D06",
            Message::DcpMediaEvent(_) => "D07",
            Message::PresetCommand { zone, .. } => zoned(&tuner::PRESET_CODES, *zone),
            Message::PresetMemory(_) => "PRM",
            Message::TuningCommand { zone, .. } => zoned(&tuner::TUNING_CODES, *zone),
            Message::RadioStationName(_) => "DSN",
            Message::DcpTunerMode(_) => "D02",
            Message::RdsInformation(_) => "RDS",
            Message::MultiroomDeviceInformation(_) => "MDI",
            Message::MultiroomChannelSetting(_) => "MSS",
            Message::MultiroomGroupSetting(_) => "MGS",
            Message::CoverFetched(_) => "NJA",
            Message::Disconnected => "",
            Message::Unknown { code, .. } => code.as_str(),
        }
    }

    /// Outbound ISCP frame for a command; `None` for messages that are only ever received.
    pub fn to_iscp(&self) -> Option<IscpFrame> {
        let params = match self {
            Message::PowerStatus { status, .. } => status.code().to_string(),
            Message::InputSelector { input, .. } => input.code().to_string(),
            Message::PrivacyPolicy(p) => p.flags.clone(),
            Message::DimmerLevel(v) => v.code().to_string(),
            Message::DigitalFilter(v) => v.code().to_string(),
            Message::AutoPower(v) | Message::HdmiCec(v) => v.code().to_string(),
            Message::SpeakerA { status, .. } | Message::SpeakerB { status, .. } => {
                status.code().to_string()
            }
            Message::SleepTimer(v) => v.encode(),
            Message::LateNight(v) => v.code().to_string(),
            Message::NetworkStandBy(v) => v.code().to_string(),
            Message::PhaseMatchingBass(v) => v.code().to_string(),
            Message::AudioMuting { status, .. } => status.code().to_string(),
            Message::MasterVolume { level, .. } => level.encode(),
            Message::ToneCommand { tone, .. } => tone.encode(),
            Message::SubwooferLevel(l) | Message::CenterLevel(l) => l.encode(),
            Message::ListeningMode(m) => m.0.clone(),
            Message::TimeSeek(t) => t.clone(),
            Message::OperationCommand(c) => c.code().to_string(),
            Message::AmpOperation(c) => c.code().to_string(),
            Message::SetupOperation(c) => c.code().to_string(),
            Message::ListInfo(l) => l.encode(),
            Message::XmlListRequest {
                sequence,
                layer,
                start,
                end,
            } => XmlListInfo::request(*sequence, *layer, *start, *end),
            Message::SelectListItem { layers, id } => XmlListInfo::select_item(*layers, *id),
            Message::NetworkService(s) => format!("{}0", s.code()),
            Message::CustomPopup(p) => p.encode(),
            Message::PlayQueue(cmd) => cmd.encode(),
            Message::PresetCommand { preset, .. } => preset.encode(),
            Message::PresetMemory(n) => format!("{:02X}", n),
            Message::TuningCommand { tuning, .. } => tuning.encode(),
            Message::MultiroomChannelSetting(s) => s.encode(),
            Message::MultiroomGroupSetting(g) => match g.encode() {
                Ok(xml) => xml,
                Err(e) => {
                    tracing::warn!("Failed to build group command: {}", e);
                    return None;
                }
            },
            Message::JacketArt(_) => JacketArt::REQUEST_COVER.to_string(),
            _ => return None,
        };
        Some(IscpFrame::new(self.code(), params))
    }

    /// Sending this command changes what the navigable list shows.
    pub fn has_media_impact(&self) -> bool {
        match self {
            Message::OperationCommand(c) => c.affects_media_list(),
            Message::InputSelector { .. }
            | Message::NetworkService(_)
            | Message::ListInfo(_)
            | Message::XmlListRequest { .. }
            | Message::SelectListItem { .. }
            | Message::PlayQueue(_)
            | Message::CustomPopup(_)
            | Message::DcpMediaContainer(_) => true,
            _ => false,
        }
    }
}

/// Status values that can be requested from a receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Query {
    PowerStatus,
    FirmwareUpdate,
    ReceiverInformation,
    FriendlyName,
    InputSelector,
    PrivacyPolicy,
    DimmerLevel,
    DigitalFilter,
    AutoPower,
    HdmiCec,
    SpeakerA,
    SpeakerB,
    SleepTimer,
    LateNight,
    NetworkStandBy,
    PhaseMatchingBass,
    AudioMuting,
    MasterVolume,
    ToneCommand,
    SubwooferLevel,
    CenterLevel,
    ListeningMode,
    AudioInformation,
    VideoInformation,
    PlayStatus,
    TimeInfo,
    TrackInfo,
    ArtistName,
    AlbumName,
    TitleName,
    FileFormat,
    MenuStatus,
    ListTitleInfo,
    PresetCommand,
    TuningCommand,
    RadioStationName,
    MultiroomDeviceInformation,
    DcpReceiverInformation,
    DcpTunerMode,
    DcpEcoMode,
    DcpAudioRestorer,
    DcpAllZoneStereo,
    DcpMediaItem,
}

impl Query {
    /// ISCP code answering this query for `zone`; `None` where ISCP has no equivalent.
    pub fn iscp_code(self, zone: usize) -> Option<&'static str> {
        let zoned = |codes: &[&'static str]| codes.get(zone).copied();
        match self {
            Query::PowerStatus => zoned(&common::POWER_CODES),
            Query::FirmwareUpdate => Some("UPD"),
            Query::ReceiverInformation => Some("NRI"),
            Query::FriendlyName => Some("NFN"),
            Query::InputSelector => zoned(&common::INPUT_CODES),
            Query::PrivacyPolicy => Some("PPS"),
            Query::DimmerLevel => Some("DIM"),
            Query::DigitalFilter => Some("DGF"),
            Query::AutoPower => Some("APD"),
            Query::HdmiCec => Some("CEC"),
            Query::SpeakerA => zoned(&settings::SPEAKER_A_CODES),
            Query::SpeakerB => zoned(&settings::SPEAKER_B_CODES),
            Query::SleepTimer => Some("SLP"),
            Query::LateNight => zoned(&["LTN"]),
            Query::NetworkStandBy => Some("NSB"),
            Query::PhaseMatchingBass => Some("PMB"),
            Query::AudioMuting => zoned(&audio::MUTING_CODES),
            Query::MasterVolume => zoned(&audio::VOLUME_CODES),
            Query::ToneCommand => zoned(&audio::TONE_CODES),
            Query::SubwooferLevel => zoned(&["SWL"]),
            Query::CenterLevel => zoned(&["CTL"]),
            Query::ListeningMode => Some("LMD"),
            Query::AudioInformation => Some("IFA"),
            Query::VideoInformation => Some("IFV"),
            Query::PlayStatus => Some("NST"),
            Query::TimeInfo => Some("NTM"),
            Query::TrackInfo => Some("NTR"),
            Query::ArtistName => Some("NAT"),
            Query::AlbumName => Some("NAL"),
            Query::TitleName => Some("NTI"),
            Query::FileFormat => Some("NFI"),
            Query::MenuStatus => Some("NMS"),
            Query::ListTitleInfo => Some("NLT"),
            Query::PresetCommand => zoned(&tuner::PRESET_CODES),
            Query::TuningCommand => zoned(&tuner::TUNING_CODES),
            Query::RadioStationName => Some("DSN"),
            Query::MultiroomDeviceInformation => Some("MDI"),
            Query::DcpReceiverInformation
            | Query::DcpTunerMode
            | Query::DcpEcoMode
            | Query::DcpAudioRestorer
            | Query::DcpAllZoneStereo
            | Query::DcpMediaItem => None,
        }
    }
}

/// One unit of outbound traffic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Request {
    Send(Message),
    Query { query: Query, zone: usize },
    /// Code and parameter taken verbatim from a shortcut script.
    Raw { code: String, params: String },
}

impl Request {
    pub fn query(query: Query, zone: usize) -> Self {
        Request::Query { query, zone }
    }

    pub fn raw(code: &str, params: &str) -> Self {
        Request::Raw {
            code: code.to_string(),
            params: params.to_string(),
        }
    }

    pub fn to_iscp(&self) -> Option<IscpFrame> {
        match self {
            Request::Send(msg) => msg.to_iscp(),
            Request::Query { query, zone } => query.iscp_code(*zone).map(IscpFrame::query),
            Request::Raw { code, params } => Some(IscpFrame::new(code, params.clone())),
        }
    }

    /// DCP payloads for this request, already split at the command separator.
    pub fn to_dcp(&self) -> Vec<String> {
        dcp::encode_request(self)
    }

    pub fn has_media_impact(&self) -> bool {
        match self {
            Request::Send(msg) => msg.has_media_impact(),
            Request::Query { .. } => false,
            Request::Raw { code, .. } => matches!(
                code.as_str(),
                "NTC" | "NSV" | "NLS" | "NLA" | "SLI" | "SLZ" | "SL3" | "SL4" | "PQA" | "PQR"
            ),
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> String {
        match self {
            Request::Send(msg) => format!("{}[{:?}]", msg.code(), msg),
            Request::Query { query, zone } => format!("{:?}?zone={}", query, zone),
            Request::Raw { code, params } => format!("{}{}", code, params),
        }
    }
}

/// A decoded message tagged with the connection it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub host: String,
    pub port: u16,
    /// ISCP code, or the equivalent code of a decoded DCP line.
    pub code: String,
    /// ISCP parameters, or the raw DCP line.
    pub params: String,
    pub message: Message,
}

impl Inbound {
    pub fn new(host: &str, port: u16, message: Message, params: impl Into<String>) -> Self {
        Self {
            host: host.to_string(),
            port,
            code: message.code().to_string(),
            params: params.into(),
            message,
        }
    }

    pub fn disconnected(host: &str, port: u16) -> Self {
        Self::new(host, port, Message::Disconnected, "")
    }

    pub fn is_from(&self, host: &str, port: u16) -> bool {
        self.host == host && self.port == port
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(code: &str, params: &str) -> Result<Message, DecodeError> {
        decode_iscp(&IscpFrame::new(code, params))
    }

    #[test]
    fn test_zone_codes() {
        assert_eq!(
            decode("ZPW", "01").unwrap(),
            Message::PowerStatus {
                zone: 1,
                status: PowerStatus::On
            }
        );
        assert_eq!(
            decode("SL3", "2B").unwrap(),
            Message::InputSelector {
                zone: 2,
                input: InputType::Net
            }
        );
        assert_eq!(
            decode("VL4", "1A").unwrap(),
            Message::MasterVolume {
                zone: 3,
                level: VolumeLevel::Level(26)
            }
        );
    }

    #[test]
    fn test_decode_errors_and_unknown() {
        assert!(decode("PWR", "N/A").is_err());
        assert!(decode("NLT", "F3").is_err());
        assert_eq!(
            decode("XYZ", "abc").unwrap(),
            Message::Unknown {
                code: "XYZ".to_string(),
                params: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_encode_commands() {
        let frame = Message::MasterVolume {
            zone: 1,
            level: VolumeLevel::Level(40),
        }
        .to_iscp()
        .unwrap();
        assert_eq!(frame.code, "ZVL");
        assert_eq!(frame.params, "28");

        let frame = Message::NetworkService(ServiceType::TuneIn).to_iscp().unwrap();
        assert_eq!((frame.code.as_str(), frame.params.as_str()), ("NSV", "0E0"));

        assert!(Message::TitleName("x".to_string()).to_iscp().is_none());
    }

    #[test]
    fn test_query_frames() {
        let frame = Request::query(Query::PowerStatus, 2).to_iscp().unwrap();
        assert_eq!(frame.code, "PW3");
        assert_eq!(frame.params, "QSTN");
        assert!(Request::query(Query::ToneCommand, 3).to_iscp().is_none());
        assert!(Request::query(Query::DcpEcoMode, 0).to_iscp().is_none());

        let frame = Request::query(Query::SpeakerB, 1).to_iscp().unwrap();
        assert_eq!(frame.code, "ZPB");
        assert_eq!(Request::query(Query::SubwooferLevel, 0).to_iscp().unwrap().code, "SWL");
        // Channel levels and late night exist for the main zone only
        assert!(Request::query(Query::CenterLevel, 1).to_iscp().is_none());
        assert!(Request::query(Query::LateNight, 1).to_iscp().is_none());
    }

    #[test]
    fn test_media_impact() {
        assert!(Request::Send(Message::OperationCommand(OperationCommand::Top)).has_media_impact());
        assert!(!Request::Send(Message::OperationCommand(OperationCommand::Play)).has_media_impact());
        assert!(!Request::query(Query::ListTitleInfo, 0).has_media_impact());
        assert!(Request::raw("NTC", "TOP").has_media_impact());
    }
}
