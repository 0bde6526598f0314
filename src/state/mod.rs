//! Session state
//!
//! [`SessionState`] is what the receiver is doing right now, rebuilt from the stream of decoded
//! messages. The session controller owns the only mutable copy and feeds it one [`Inbound`] at a
//! time; each update reports a coarse [`ChangeType`] that drives follow-up requests and listener
//! notifications.

pub mod cover;

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::messages::navigation::{ListIcon, ListInfoType, PLAYQUEUE_SID};
use crate::messages::playback::{
    ImageType, PacketFlag, RepeatStatus, ShuffleStatus, TimeSeekMode, TrackMenu, INVALID_TIME,
};
use crate::messages::xml::{
    default_zones, parse_media_list, MultiroomChannel, MultiroomRole, NetworkService, Selector,
    NO_GROUP,
};
use crate::messages::{
    AudioRestorer, CustomPopup, DcpReceiverUpdate, DigitalFilter, DimmerLevel, EcoMode,
    FirmwareStatus, Inbound, InputType, JacketArt, LateNight, LayerInfo, ListTitleInfo,
    ListeningMode, MediaContainer, Message, MultiroomInfo, OnOff, PlayStatus, PowerStatus,
    PrivacyPolicy, ReceiverInfo, ServiceType, SleepTime, SwitchStatus, ToggleStatus, TunerMode,
    Tuning, UiType, VolumeLevel, XmlListInfo, XmlListItem,
};
use crate::protocol::ProtocolType;

pub use cover::{Cover, CoverBuffer};

/// What an update changed, from the listener's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    None,
    Common,
    TimeSeek,
    MediaItems,
    ReceiverInfo,
    AudioControl,
    MultiroomInfo,
}

/// Inputs without a navigable list or seekable playback.
const SIMPLE_INPUTS: &[InputType] = &[
    InputType::Tape1,
    InputType::Tv,
    InputType::Video4,
    InputType::Video5,
    InputType::Fm,
    InputType::Am,
    InputType::Tuner,
    InputType::Dab,
];

/// Assigns `value` when it differs; reports whether it did.
fn set<T: PartialEq>(field: &mut T, value: T) -> bool {
    if *field == value {
        return false;
    }
    *field = value;
    true
}

fn changed(flag: bool, change: ChangeType) -> ChangeType {
    if flag {
        change
    } else {
        ChangeType::None
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    // Connection
    pub protocol: ProtocolType,
    pub host: String,
    pub port: u16,
    pub active_zone: usize,

    // Receiver information
    pub info: ReceiverInfo,
    pub friendly_name: Option<String>,

    // Common
    pub power: PowerStatus,
    pub firmware: Option<FirmwareStatus>,
    pub input: InputType,
    pub privacy_policy: Option<PrivacyPolicy>,

    // Settings
    pub dimmer: Option<DimmerLevel>,
    pub digital_filter: Option<DigitalFilter>,
    pub auto_power: Option<SwitchStatus>,
    pub hdmi_cec: Option<SwitchStatus>,
    pub speaker_a: Option<SwitchStatus>,
    pub speaker_b: Option<SwitchStatus>,
    pub sleep: Option<SleepTime>,
    pub late_night: Option<LateNight>,
    pub network_standby: Option<OnOff>,
    pub phase_matching_bass: Option<ToggleStatus>,
    pub eco_mode: Option<EcoMode>,
    pub audio_restorer: Option<AudioRestorer>,
    pub all_zone_stereo: Option<OnOff>,

    // Sound
    pub listening_mode: Option<ListeningMode>,
    pub volume: Option<i32>,
    pub muting: Option<ToggleStatus>,
    pub bass: Option<i32>,
    pub treble: Option<i32>,
    pub subwoofer: Option<i32>,
    pub center: Option<i32>,
    pub audio_info: String,
    pub video_info: String,

    // Now playing
    pub cover: Option<Cover>,
    pub cover_url: Option<String>,
    #[serde(skip)]
    pending_cover_url: Option<String>,
    #[serde(skip)]
    cover_buffer: CoverBuffer,
    pub album: String,
    pub artist: String,
    pub title: String,
    pub current_time: String,
    pub max_time: String,
    pub current_track: Option<u32>,
    pub max_track: Option<u32>,
    pub file_format: String,
    pub play_status: PlayStatus,
    pub repeat: RepeatStatus,
    pub shuffle: ShuffleStatus,
    pub track_menu: TrackMenu,
    pub time_seek: TimeSeekMode,
    pub service_icon: ServiceType,

    // Navigation
    pub service_type: Option<ServiceType>,
    pub layer: Option<LayerInfo>,
    pub ui_type: Option<UiType>,
    pub list_title: Option<ListTitleInfo>,
    pub number_of_layers: u32,
    pub number_of_items: u32,
    pub title_bar: String,
    pub media_items: Vec<XmlListItem>,
    pub service_items: Vec<NetworkService>,
    pub list_info_items: Vec<String>,
    /// Breadcrumb titles keyed by depth.
    pub path: BTreeMap<u32, String>,
    pub popup: Option<CustomPopup>,
    pub track_menu_received: bool,
    pub dcp_container: Option<MediaContainer>,
    pub dcp_media_item: Option<String>,

    // Multiroom
    pub device_id: Option<String>,
    /// Multiroom information of every known device, keyed by device id.
    pub multiroom_layout: HashMap<String, MultiroomInfo>,
    /// Device id of each companion host.
    pub multiroom_hosts: HashMap<String, String>,

    // Tuner
    pub tuner_mode: Option<TunerMode>,
    pub frequency: String,
    pub station_name: String,
    pub preset: Option<u32>,
    pub rds: String,
}

impl SessionState {
    pub fn new(protocol: ProtocolType, host: &str, port: u16, zone: usize) -> Self {
        Self {
            protocol,
            host: host.to_string(),
            port,
            active_zone: zone,
            info: ReceiverInfo::default(),
            friendly_name: None,
            power: PowerStatus::Standby,
            firmware: None,
            input: InputType::None,
            privacy_policy: None,
            dimmer: None,
            digital_filter: None,
            auto_power: None,
            hdmi_cec: None,
            speaker_a: None,
            speaker_b: None,
            sleep: None,
            late_night: None,
            network_standby: None,
            phase_matching_bass: None,
            eco_mode: None,
            audio_restorer: None,
            all_zone_stereo: None,
            listening_mode: None,
            volume: None,
            muting: None,
            bass: None,
            treble: None,
            subwoofer: None,
            center: None,
            audio_info: String::new(),
            video_info: String::new(),
            cover: None,
            cover_url: None,
            pending_cover_url: None,
            cover_buffer: CoverBuffer::default(),
            album: String::new(),
            artist: String::new(),
            title: String::new(),
            current_time: INVALID_TIME.to_string(),
            max_time: INVALID_TIME.to_string(),
            current_track: None,
            max_track: None,
            file_format: String::new(),
            play_status: PlayStatus::Stop,
            repeat: RepeatStatus::Off,
            shuffle: ShuffleStatus::Off,
            track_menu: TrackMenu::Disabled,
            time_seek: TimeSeekMode::Enabled,
            service_icon: ServiceType::Unknown,
            service_type: None,
            layer: None,
            ui_type: None,
            list_title: None,
            number_of_layers: 0,
            number_of_items: 0,
            title_bar: String::new(),
            media_items: Vec::new(),
            service_items: Vec::new(),
            list_info_items: Vec::new(),
            path: BTreeMap::new(),
            popup: None,
            track_menu_received: false,
            dcp_container: None,
            dcp_media_item: None,
            device_id: None,
            multiroom_layout: HashMap::new(),
            multiroom_hosts: HashMap::new(),
            tuner_mode: None,
            frequency: String::new(),
            station_name: String::new(),
            preset: None,
            rds: String::new(),
        }
    }

    /// Seeds receiver information from a cached snapshot before any network traffic.
    pub fn bootstrap(&mut self, receiver_xml: &str) -> Result<ChangeType, DecodeError> {
        let info = ReceiverInfo::parse(receiver_xml)?;
        Ok(self.update_receiver_info(info))
    }

    /// Applies one inbound message.
    pub fn update(&mut self, inbound: &Inbound) -> ChangeType {
        if !inbound.is_from(&self.host, self.port) {
            // Companions only contribute to the multiroom layout.
            return match &inbound.message {
                Message::MultiroomDeviceInformation(info) => {
                    self.update_multiroom(&inbound.host, info, false)
                }
                _ => ChangeType::None,
            };
        }

        let zone = self.active_zone;
        match &inbound.message {
            Message::PowerStatus { zone: z, status } if *z == zone => self.update_power(*status),
            Message::FirmwareUpdate(s) => changed(set(&mut self.firmware, Some(*s)), ChangeType::Common),
            Message::ReceiverInformation(info) => self.update_receiver_info((**info).clone()),
            Message::DcpReceiverInformation(update) => self.update_dcp_receiver(update),
            Message::FriendlyName(name) => {
                changed(set(&mut self.friendly_name, Some(name.clone())), ChangeType::Common)
            }
            Message::InputSelector { zone: z, input } if *z == zone => self.update_input(*input),
            Message::PrivacyPolicy(p) => {
                changed(set(&mut self.privacy_policy, Some(p.clone())), ChangeType::Common)
            }

            Message::DimmerLevel(v) => changed(set(&mut self.dimmer, Some(*v)), ChangeType::Common),
            Message::DigitalFilter(v) => {
                changed(set(&mut self.digital_filter, Some(*v)), ChangeType::Common)
            }
            Message::AutoPower(v) => changed(set(&mut self.auto_power, Some(*v)), ChangeType::Common),
            Message::HdmiCec(v) => changed(set(&mut self.hdmi_cec, Some(*v)), ChangeType::Common),
            Message::SpeakerA { zone: z, status } if *z == zone => {
                changed(set(&mut self.speaker_a, Some(*status)), ChangeType::Common)
            }
            Message::SpeakerB { zone: z, status } if *z == zone => {
                changed(set(&mut self.speaker_b, Some(*status)), ChangeType::Common)
            }
            Message::SleepTimer(v) => changed(set(&mut self.sleep, Some(*v)), ChangeType::Common),
            Message::LateNight(v) => changed(set(&mut self.late_night, Some(*v)), ChangeType::Common),
            Message::NetworkStandBy(v) => {
                changed(set(&mut self.network_standby, Some(*v)), ChangeType::Common)
            }
            Message::PhaseMatchingBass(v) => {
                changed(set(&mut self.phase_matching_bass, Some(*v)), ChangeType::Common)
            }
            Message::DcpEcoMode(v) => changed(set(&mut self.eco_mode, Some(*v)), ChangeType::Common),
            Message::DcpAudioRestorer(v) => {
                changed(set(&mut self.audio_restorer, Some(*v)), ChangeType::Common)
            }
            Message::DcpAllZoneStereo(v) => {
                changed(set(&mut self.all_zone_stereo, Some(*v)), ChangeType::Common)
            }

            Message::AudioMuting { zone: z, status } if *z == zone => {
                changed(set(&mut self.muting, Some(*status)), ChangeType::AudioControl)
            }
            Message::MasterVolume { zone: z, level } if *z == zone => match level {
                VolumeLevel::Level(v) => {
                    changed(set(&mut self.volume, Some(*v)), ChangeType::AudioControl)
                }
                _ => ChangeType::None,
            },
            Message::ToneCommand { zone: z, tone } if *z == zone => {
                let mut c = false;
                if let Some(b) = tone.bass {
                    c |= set(&mut self.bass, Some(b));
                }
                if let Some(t) = tone.treble {
                    c |= set(&mut self.treble, Some(t));
                }
                changed(c, ChangeType::AudioControl)
            }
            Message::SubwooferLevel(l) => {
                changed(set(&mut self.subwoofer, Some(l.level)), ChangeType::AudioControl)
            }
            Message::CenterLevel(l) => {
                changed(set(&mut self.center, Some(l.level)), ChangeType::AudioControl)
            }
            Message::ListeningMode(m) => {
                changed(set(&mut self.listening_mode, Some(m.clone())), ChangeType::AudioControl)
            }
            Message::AudioInformation(s) => changed(set(&mut self.audio_info, s.clone()), ChangeType::Common),
            Message::VideoInformation(s) => changed(set(&mut self.video_info, s.clone()), ChangeType::Common),

            Message::PlayStatus(ps) => {
                let mut c = set(&mut self.play_status, ps.play);
                c |= set(&mut self.repeat, ps.repeat);
                c |= set(&mut self.shuffle, ps.shuffle);
                changed(c, ChangeType::Common)
            }
            Message::TimeInfo(t) => {
                let mut c = set(&mut self.current_time, t.current.clone());
                c |= set(&mut self.max_time, t.maximum.clone());
                changed(c, ChangeType::TimeSeek)
            }
            Message::TrackInfo(t) => {
                let mut c = set(&mut self.current_track, t.current);
                c |= set(&mut self.max_track, t.maximum);
                changed(c, ChangeType::Common)
            }
            Message::ArtistName(s) => changed(set(&mut self.artist, s.clone()), ChangeType::Common),
            Message::AlbumName(s) => changed(set(&mut self.album, s.clone()), ChangeType::Common),
            Message::TitleName(s) => changed(set(&mut self.title, s.clone()), ChangeType::Common),
            Message::FileFormat(s) => changed(set(&mut self.file_format, s.clone()), ChangeType::Common),
            Message::JacketArt(art) => self.update_cover(art),
            Message::CoverFetched(bytes) => self.decode_cover(bytes.clone()),
            Message::MenuStatus(m) => {
                let icon = ServiceType::from_code(&m.service_icon).unwrap_or(ServiceType::Unknown);
                let mut c = set(&mut self.track_menu, m.track_menu);
                c |= set(&mut self.time_seek, m.time_seek);
                c |= set(&mut self.service_icon, icon);
                changed(c, ChangeType::Common)
            }

            Message::ListTitleInfo(info) => self.update_list_title(info),
            Message::XmlListInfo(xml) => self.update_xml_list(xml),
            Message::ListInfo(info) => self.update_list_info(info),
            Message::CustomPopup(popup) => {
                changed(set(&mut self.popup, Some(popup.clone())), ChangeType::Common)
            }
            Message::DcpMediaContainer(c) => self.update_media_container(c),
            Message::DcpMediaItem { mid, .. } => {
                changed(set(&mut self.dcp_media_item, Some(mid.clone())), ChangeType::Common)
            }

            Message::PresetCommand { zone: z, preset } if *z == zone => match preset.number() {
                Some(n) => changed(set(&mut self.preset, Some(n)), ChangeType::Common),
                None => ChangeType::None,
            },
            Message::TuningCommand { zone: z, tuning } if *z == zone => self.update_tuning(tuning),
            Message::RadioStationName(name) => {
                let mut c = set(&mut self.station_name, name.name.clone());
                if self.protocol == ProtocolType::Dcp {
                    c |= set(&mut self.tuner_mode, Some(name.mode));
                }
                changed(c, ChangeType::Common)
            }
            Message::DcpTunerMode(m) => changed(set(&mut self.tuner_mode, Some(*m)), ChangeType::Common),
            Message::RdsInformation(s) => changed(set(&mut self.rds, s.clone()), ChangeType::Common),

            Message::MultiroomDeviceInformation(info) => {
                let host = inbound.host.clone();
                self.update_multiroom(&host, info, true)
            }

            // Other zones, outbound-only commands and events the controller handles itself
            Message::PowerStatus { .. }
            | Message::InputSelector { .. }
            | Message::SpeakerA { .. }
            | Message::SpeakerB { .. }
            | Message::AudioMuting { .. }
            | Message::MasterVolume { .. }
            | Message::ToneCommand { .. }
            | Message::PresetCommand { .. }
            | Message::TuningCommand { .. }
            | Message::DeviceAnnouncement(_)
            | Message::TimeSeek(_)
            | Message::OperationCommand(_)
            | Message::AmpOperation(_)
            | Message::SetupOperation(_)
            | Message::XmlListRequest { .. }
            | Message::SelectListItem { .. }
            | Message::NetworkService(_)
            | Message::PlayQueue(_)
            | Message::DcpMediaEvent(_)
            | Message::PresetMemory(_)
            | Message::MultiroomChannelSetting(_)
            | Message::MultiroomGroupSetting(_)
            | Message::Disconnected
            | Message::Unknown { .. } => ChangeType::None,
        }
    }

    fn update_power(&mut self, status: PowerStatus) -> ChangeType {
        if !set(&mut self.power, status) {
            return ChangeType::None;
        }
        if !self.is_on() {
            self.clear_items();
            self.clear_track_info();
        }
        ChangeType::Common
    }

    fn update_receiver_info(&mut self, info: ReceiverInfo) -> ChangeType {
        if let Some(name) = info.friendly_name() {
            self.friendly_name = Some(name.to_string());
        }
        if !info.device_id.is_empty() && self.device_id.is_none() {
            self.device_id = Some(info.device_id.clone());
        }
        changed(set(&mut self.info, info), ChangeType::ReceiverInfo)
    }

    fn update_dcp_receiver(&mut self, update: &DcpReceiverUpdate) -> ChangeType {
        let info = &mut self.info;
        match update {
            DcpReceiverUpdate::Selector(s) => {
                match info.selectors.iter_mut().find(|old| old.id == s.id) {
                    Some(old) => *old = s.clone(),
                    None => info.selectors.push(s.clone()),
                }
                ChangeType::ReceiverInfo
            }
            DcpReceiverUpdate::MaxVolume(v) => {
                if info.zones.is_empty() {
                    info.zones = default_zones();
                }
                match info.zones.get_mut(self.active_zone) {
                    Some(z) => changed(set(&mut z.vol_max, *v), ChangeType::ReceiverInfo),
                    None => ChangeType::None,
                }
            }
            DcpReceiverUpdate::ToneControl(t) => {
                info.tone_controls.insert(t.id.clone(), t.clone());
                ChangeType::ReceiverInfo
            }
            DcpReceiverUpdate::Preset(p) => {
                match info.presets.iter_mut().find(|old| old.id == p.id) {
                    Some(old) => *old = p.clone(),
                    None => info.presets.push(p.clone()),
                }
                info.presets.sort_by_key(|p| p.id);
                ChangeType::MediaItems
            }
            DcpReceiverUpdate::NetworkServices(services) => {
                info.network_services = services.clone();
                ChangeType::ReceiverInfo
            }
            DcpReceiverUpdate::FirmwareVersion(v) => {
                info.properties.insert("firmwareversion".to_string(), v.clone());
                ChangeType::ReceiverInfo
            }
            DcpReceiverUpdate::ZoneNames(names) => {
                if info.zones.is_empty() {
                    info.zones = default_zones();
                }
                for (zone, name) in info.zones.iter_mut().zip(names) {
                    zone.name = name.clone();
                }
                ChangeType::ReceiverInfo
            }
        }
    }

    fn update_input(&mut self, input: InputType) -> ChangeType {
        if !set(&mut self.input, input) {
            return ChangeType::None;
        }
        if !input.is_media_list() {
            self.clear_track_info();
            self.service_type = None;
            self.clear_items();
        }
        if self.is_simple_input() {
            self.time_seek = TimeSeekMode::Disabled;
            self.service_icon = ServiceType::Unknown;
        }
        ChangeType::MediaItems
    }

    fn update_list_title(&mut self, info: &ListTitleInfo) -> ChangeType {
        if self.list_title.as_ref() == Some(info) {
            return ChangeType::None;
        }
        if self.service_type != Some(info.service) || self.ui_type != Some(info.ui_type) {
            self.clear_items();
        }
        self.service_type = Some(info.service);
        self.layer = Some(info.layer);
        self.ui_type = Some(info.ui_type);
        self.number_of_layers = info.layers;
        self.number_of_items = info.items;
        self.title_bar = info.title.clone();
        if info.ui_type != UiType::Playback {
            self.update_path(info);
        }
        self.list_title = Some(info.clone());
        ChangeType::MediaItems
    }

    fn update_path(&mut self, info: &ListTitleInfo) {
        if info.layer == LayerInfo::NetTop {
            self.path.clear();
            return;
        }
        // Some receivers report zero layers at the service top.
        let depth = if info.layer == LayerInfo::ServiceTop && info.layers == 0 {
            1
        } else {
            info.layers
        };
        self.path.retain(|d, _| *d < depth);
        let title = if info.layer == LayerInfo::ServiceTop && info.title.is_empty() {
            info.service.name().to_string()
        } else {
            info.title.clone()
        };
        self.path.insert(depth, title);
    }

    fn update_xml_list(&mut self, xml: &XmlListInfo) -> ChangeType {
        if self.is_simple_input() {
            self.clear_items();
            return ChangeType::MediaItems;
        }
        if self.is_popup_mode() {
            self.media_items.clear();
            return ChangeType::MediaItems;
        }
        let items = match parse_media_list(&xml.xml, self.number_of_layers) {
            Ok(items) => items,
            Err(e) => {
                warn!("Ignoring media list: {}", e);
                return ChangeType::None;
            }
        };
        self.media_items = items;
        self.number_of_items = self.number_of_items.max(self.media_items.len() as u32);
        if self.service_type == Some(ServiceType::PlayQueue) && self.current_track.is_none() {
            self.current_track = self
                .media_items
                .iter()
                .find(|item| item.icon == ListIcon::Play)
                .map(|item| item.id + 1);
        }
        if xml.ui_type == UiType::MenuList {
            self.track_menu_received = true;
        }
        ChangeType::MediaItems
    }

    fn update_list_info(&mut self, info: &crate::messages::ListInfo) -> ChangeType {
        if info.info_type == ListInfoType::Cursor {
            self.list_info_items.clear();
            return ChangeType::None;
        }
        if self.service_type == Some(ServiceType::Net) || self.layer == Some(LayerInfo::NetTop) {
            let zone = self.active_zone;
            self.service_items = self
                .info
                .network_services
                .iter()
                .filter(|s| s.zones & (1 << zone) != 0)
                .cloned()
                .collect();
            return ChangeType::MediaItems;
        }
        if self.is_usb() {
            if !info.data.is_empty() && !self.list_info_items.contains(&info.data) {
                self.list_info_items.push(info.data.clone());
            }
            return ChangeType::None;
        }
        if self.is_menu_mode() {
            if let Some(line) = info.line {
                if !self.media_items.iter().any(|i| i.id == line) {
                    self.media_items.push(XmlListItem::new(
                        line,
                        self.number_of_layers,
                        &info.data,
                        ListIcon::Unknown,
                    ));
                }
                return ChangeType::MediaItems;
            }
        }
        ChangeType::None
    }

    fn update_media_container(&mut self, container: &MediaContainer) -> ChangeType {
        let mut merged = container.clone();
        if let Some(old) = &self.dcp_container {
            if old.same_node(container) && container.start > 0 {
                let mut items = old.items.clone();
                items.extend(container.items.iter().cloned());
                merged.items = items;
            }
        }
        self.service_type = ServiceType::from_code(&format!("HS{}", merged.sid));
        self.layer = Some(merged.layer.unwrap_or(LayerInfo::Under2ndLayer));
        self.ui_type = Some(UiType::List);
        self.number_of_items = merged.count.max(merged.items.len() as u32);
        self.media_items = merged.items.clone();
        debug!(
            "Media container sid={} cid={} with {} of {} items",
            merged.sid,
            merged.cid,
            self.media_items.len(),
            self.number_of_items
        );
        self.dcp_container = Some(merged);
        ChangeType::MediaItems
    }

    fn update_tuning(&mut self, tuning: &Tuning) -> ChangeType {
        match tuning {
            Tuning::Frequency { value, mode } => {
                let mut c = set(&mut self.frequency, value.clone());
                if let Some(m) = mode {
                    c |= set(&mut self.tuner_mode, Some(*m));
                }
                changed(c, ChangeType::Common)
            }
            Tuning::Up | Tuning::Down => ChangeType::None,
        }
    }

    fn update_cover(&mut self, art: &JacketArt) -> ChangeType {
        match art.image_type {
            ImageType::Url => {
                let Some(url) = art.url.as_ref().filter(|u| !u.is_empty()) else {
                    return ChangeType::None;
                };
                if self.cover_url.as_ref() == Some(url) {
                    return ChangeType::None;
                }
                self.cover_url = Some(url.clone());
                self.pending_cover_url = Some(url.clone());
                ChangeType::None
            }
            ImageType::NoImage => {
                self.cover_url = None;
                self.cover_buffer.clear();
                changed(set(&mut self.cover, None), ChangeType::Common)
            }
            ImageType::Bmp | ImageType::Jpeg => match art.packet {
                PacketFlag::Start => {
                    self.cover_buffer.start(&art.data);
                    ChangeType::None
                }
                PacketFlag::Next => {
                    self.cover_buffer.append(&art.data);
                    ChangeType::None
                }
                PacketFlag::End => match self.cover_buffer.finish(&art.data) {
                    Some(bytes) => self.decode_cover(bytes),
                    None => ChangeType::None,
                },
                PacketFlag::NotUsed => self.decode_cover(art.data.clone()),
            },
        }
    }

    fn decode_cover(&mut self, bytes: Vec<u8>) -> ChangeType {
        match Cover::decode(bytes) {
            Ok(cover) => {
                debug!("Cover {}x{} ({})", cover.width, cover.height, cover.format);
                self.cover = Some(cover);
                ChangeType::Common
            }
            Err(e) => {
                warn!("Failed to decode cover: {}", e);
                ChangeType::None
            }
        }
    }

    fn update_multiroom(&mut self, host: &str, info: &MultiroomInfo, own: bool) -> ChangeType {
        let Some(id) = info.device_id() else {
            return ChangeType::None;
        };
        if own {
            self.device_id = Some(id.to_string());
        }
        self.multiroom_hosts.insert(host.to_string(), id.to_string());
        let c = self.multiroom_layout.get(id) != Some(info);
        self.multiroom_layout.insert(id.to_string(), info.clone());
        changed(c, ChangeType::MultiroomInfo)
    }

    fn clear_items(&mut self) {
        self.media_items.clear();
        self.service_items.clear();
        self.list_info_items.clear();
        self.dcp_container = None;
        self.popup = None;
    }

    fn clear_track_info(&mut self) {
        self.cover = None;
        self.cover_url = None;
        self.pending_cover_url = None;
        self.cover_buffer.clear();
        self.album.clear();
        self.artist.clear();
        self.title.clear();
        self.current_time = INVALID_TIME.to_string();
        self.max_time = INVALID_TIME.to_string();
        self.current_track = None;
        self.max_track = None;
        self.file_format.clear();
        self.dcp_media_item = None;
    }

    /// Cover URL announced since the last call; the controller fetches it.
    pub fn take_pending_cover_url(&mut self) -> Option<String> {
        self.pending_cover_url.take()
    }

    pub fn is_on(&self) -> bool {
        self.power == PowerStatus::On
    }

    pub fn is_playing(&self) -> bool {
        self.play_status.is_playing()
    }

    pub fn is_simple_input(&self) -> bool {
        self.input != InputType::None && !self.input.is_media_list()
    }

    /// Inputs that show playback without a list or seek support.
    pub fn is_plain_input(&self) -> bool {
        SIMPLE_INPUTS.contains(&self.input)
    }

    pub fn is_radio_input(&self) -> bool {
        matches!(
            self.input,
            InputType::Fm | InputType::Am | InputType::Tuner | InputType::Dab
        )
    }

    pub fn is_usb(&self) -> bool {
        matches!(
            self.service_type,
            Some(ServiceType::UsbFront) | Some(ServiceType::UsbRear)
        )
    }

    pub fn is_playback_mode(&self) -> bool {
        self.ui_type == Some(UiType::Playback)
    }

    pub fn is_popup_mode(&self) -> bool {
        self.ui_type == Some(UiType::Popup) || self.ui_type == Some(UiType::Keyboard)
    }

    pub fn is_menu_mode(&self) -> bool {
        matches!(self.ui_type, Some(UiType::Menu) | Some(UiType::MenuList))
    }

    pub fn is_top_layer(&self) -> bool {
        match self.protocol {
            ProtocolType::Dcp => self.layer == Some(LayerInfo::ServiceTop),
            ProtocolType::Iscp => self.layer == Some(LayerInfo::NetTop),
        }
    }

    pub fn is_play_queue(&self) -> bool {
        match self.service_type {
            Some(ServiceType::PlayQueue) | Some(ServiceType::DcpPlayQueue) => true,
            _ => self
                .dcp_container
                .as_ref()
                .is_some_and(|c| c.sid == PLAYQUEUE_SID),
        }
    }

    pub fn is_media_empty(&self) -> bool {
        self.media_items.is_empty() && self.service_items.is_empty()
    }

    /// The USB list lines received so far all appear in the XML list.
    pub fn is_list_info_consistent(&self) -> bool {
        if self.list_info_items.is_empty() || self.media_items.is_empty() {
            return true;
        }
        self.list_info_items
            .iter()
            .all(|line| self.media_items.iter().any(|item| &item.title == line))
    }

    /// Selectors usable in the active zone.
    pub fn selectors(&self) -> impl Iterator<Item = &Selector> {
        let zone = self.active_zone;
        self.info.selectors.iter().filter(move |s| s.is_active_for_zone(zone))
    }

    /// Display name: friendly name, then model, then host.
    pub fn device_name(&self) -> String {
        self.friendly_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.info.model())
            .unwrap_or(&self.host)
            .to_string()
    }

    pub fn multiroom_info(&self) -> Option<&MultiroomInfo> {
        self.device_id
            .as_ref()
            .and_then(|id| self.multiroom_layout.get(id))
    }

    pub fn multiroom_role(&self) -> MultiroomRole {
        self.multiroom_info()
            .map(|i| i.role(self.active_zone))
            .unwrap_or(MultiroomRole::None)
    }

    pub fn multiroom_group(&self) -> u32 {
        self.multiroom_info()
            .map(|i| i.group_id(self.active_zone))
            .unwrap_or(NO_GROUP)
    }

    pub fn multiroom_channel(&self) -> MultiroomChannel {
        self.multiroom_info()
            .map(|i| i.channel(self.active_zone))
            .unwrap_or(MultiroomChannel::None)
    }

    pub fn is_master_device(&self) -> bool {
        self.multiroom_role() == MultiroomRole::Src
    }

    /// Hosts of companion devices sharing this device's group.
    pub fn group_members(&self) -> Vec<String> {
        let group = self.multiroom_group();
        if group == NO_GROUP {
            return Vec::new();
        }
        let own = self.device_id.as_deref();
        self.multiroom_hosts
            .iter()
            .filter(|(_, id)| Some(id.as_str()) != own)
            .filter(|(_, id)| {
                self.multiroom_layout
                    .get(id.as_str())
                    .is_some_and(|info| info.zones.iter().any(|z| z.group_id == group))
            })
            .map(|(host, _)| host.clone())
            .collect()
    }

    pub fn volume_max(&self) -> Option<u32> {
        self.info
            .zones
            .get(self.active_zone)
            .map(|z| z.vol_max)
            .filter(|v| *v > 0)
    }
}
