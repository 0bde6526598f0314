//! Media list navigation: services, list titles, XML lists, popups, play queue.

use serde::{Deserialize, Serialize};

use super::code_enum;
use crate::error::DecodeError;

/// Network services and media sources. `HS*` codes are HEOS source ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    Unknown,
    MusicServer,
    Favorite,
    Vtuner,
    SiriusXm,
    Pandora,
    Rhapsody,
    LastFm,
    Napster,
    Slacker,
    Mediafly,
    Spotify,
    Aupeo,
    Radiko,
    EOnkyo,
    TuneIn,
    Mp3Tunes,
    Simfy,
    HomeMedia,
    Deezer,
    IHeartRadio,
    Airplay,
    OnkyoMusic,
    Tidal,
    PlayQueue,
    Chromecast,
    FireConnect,
    PlayFi,
    FlareConnect,
    UsbFront,
    UsbRear,
    InternetRadio,
    Net,
    Bluetooth,
    DcpPandora,
    DcpRhapsody,
    DcpTuneIn,
    DcpSpotify,
    DcpDeezer,
    DcpNapster,
    DcpIHeartRadio,
    DcpSiriusXm,
    DcpSoundCloud,
    DcpTidal,
    DcpAmazon,
    DcpLocal,
    DcpPlaylist,
    DcpHistory,
    DcpAux,
    DcpFavorite,
    DcpPlayQueue,
}

const SERVICE_TABLE: &[(ServiceType, &str, &str)] = &[
    (ServiceType::Unknown, "XX", ""),
    (ServiceType::MusicServer, "00", "Music Server"),
    (ServiceType::Favorite, "01", "Favorite"),
    (ServiceType::Vtuner, "02", "vTuner"),
    (ServiceType::SiriusXm, "03", "SiriusXM"),
    (ServiceType::Pandora, "04", "Pandora"),
    (ServiceType::Rhapsody, "05", "Rhapsody"),
    (ServiceType::LastFm, "06", "Last.fm"),
    (ServiceType::Napster, "07", "Napster"),
    (ServiceType::Slacker, "08", "Slacker"),
    (ServiceType::Mediafly, "09", "Mediafly"),
    (ServiceType::Spotify, "0A", "Spotify"),
    (ServiceType::Aupeo, "0B", "AUPEO!"),
    (ServiceType::Radiko, "0C", "Radiko"),
    (ServiceType::EOnkyo, "0D", "e-onkyo"),
    (ServiceType::TuneIn, "0E", "TuneIn"),
    (ServiceType::Mp3Tunes, "0F", "mp3tunes"),
    (ServiceType::Simfy, "10", "Simfy"),
    (ServiceType::HomeMedia, "11", "Home Media"),
    (ServiceType::Deezer, "12", "Deezer"),
    (ServiceType::IHeartRadio, "13", "iHeartRadio"),
    (ServiceType::Airplay, "18", "AirPlay"),
    (ServiceType::OnkyoMusic, "1A", "Onkyo Music"),
    (ServiceType::Tidal, "1B", "Tidal"),
    (ServiceType::PlayQueue, "1D", "Play Queue"),
    (ServiceType::Chromecast, "40", "Chromecast built-in"),
    (ServiceType::FireConnect, "41", "FireConnect"),
    (ServiceType::PlayFi, "42", "Play-Fi"),
    (ServiceType::FlareConnect, "43", "FlareConnect"),
    (ServiceType::UsbFront, "F0", "USB Front"),
    (ServiceType::UsbRear, "F1", "USB Rear"),
    (ServiceType::InternetRadio, "F2", "Internet Radio"),
    (ServiceType::Net, "F3", "NET"),
    (ServiceType::Bluetooth, "F4", "Bluetooth"),
    (ServiceType::DcpPandora, "HS1", "Pandora"),
    (ServiceType::DcpRhapsody, "HS2", "Rhapsody"),
    (ServiceType::DcpTuneIn, "HS3", "TuneIn"),
    (ServiceType::DcpSpotify, "HS4", "Spotify"),
    (ServiceType::DcpDeezer, "HS5", "Deezer"),
    (ServiceType::DcpNapster, "HS6", "Napster"),
    (ServiceType::DcpIHeartRadio, "HS7", "iHeartRadio"),
    (ServiceType::DcpSiriusXm, "HS8", "SiriusXM"),
    (ServiceType::DcpSoundCloud, "HS9", "SoundCloud"),
    (ServiceType::DcpTidal, "HS10", "Tidal"),
    (ServiceType::DcpAmazon, "HS13", "Amazon Music"),
    (ServiceType::DcpLocal, "HS1024", "Local Music"),
    (ServiceType::DcpPlaylist, "HS1025", "Playlists"),
    (ServiceType::DcpHistory, "HS1026", "History"),
    (ServiceType::DcpAux, "HS1027", "AUX Input"),
    (ServiceType::DcpFavorite, "HS1028", "Favorites"),
    (ServiceType::DcpPlayQueue, "HS9999", "Play Queue"),
];

impl ServiceType {
    pub fn code(self) -> &'static str {
        SERVICE_TABLE
            .iter()
            .find(|(t, _, _)| *t == self)
            .map(|(_, c, _)| *c)
            .unwrap_or("XX")
    }

    pub fn name(self) -> &'static str {
        SERVICE_TABLE
            .iter()
            .find(|(t, _, _)| *t == self)
            .map(|(_, _, n)| *n)
            .unwrap_or("")
    }

    pub fn from_code(code: &str) -> Option<Self> {
        SERVICE_TABLE
            .iter()
            .find(|(_, c, _)| c.eq_ignore_ascii_case(code))
            .map(|(t, _, _)| *t)
    }

    /// HEOS source id of a `HS*` service.
    pub fn heos_sid(self) -> Option<&'static str> {
        self.code().strip_prefix("HS")
    }
}

code_enum! {
    UiType {
        List => "0",
        Menu => "1",
        Playback => "2",
        Popup => "3",
        Keyboard => "4",
        MenuList => "5",
    }
}

code_enum! {
    LayerInfo {
        NetTop => "0",
        ServiceTop => "1",
        Under2ndLayer => "2",
    }
}

fn char_code<T>(params: &str, idx: usize, parse: fn(&str) -> Option<T>) -> Option<T> {
    params.get(idx..idx + 1).and_then(parse)
}

fn hex_field(code: &str, params: &str, range: std::ops::Range<usize>) -> Result<u32, DecodeError> {
    params
        .get(range)
        .and_then(|s| u32::from_str_radix(s, 16).ok())
        .ok_or_else(|| DecodeError::param(code, params))
}

/// List title and position (`NLT`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListTitleInfo {
    pub service: ServiceType,
    pub ui_type: UiType,
    pub layer: LayerInfo,
    pub cursor: u32,
    pub items: u32,
    pub layers: u32,
    pub first: bool,
    pub left_icon: String,
    pub right_icon: String,
    pub status: String,
    pub title: String,
}

impl ListTitleInfo {
    const MIN_LEN: usize = 22;

    pub fn decode(params: &str) -> Result<Self, DecodeError> {
        if !params.get(..Self::MIN_LEN).is_some_and(str::is_ascii) {
            return Err(DecodeError::param("NLT", params));
        }
        Ok(Self {
            service: ServiceType::from_code(&params[0..2]).unwrap_or(ServiceType::Unknown),
            ui_type: char_code(params, 2, UiType::from_code).unwrap_or(UiType::List),
            layer: char_code(params, 3, LayerInfo::from_code).unwrap_or(LayerInfo::NetTop),
            cursor: hex_field("NLT", params, 4..8)?,
            items: hex_field("NLT", params, 8..12)?,
            layers: hex_field("NLT", params, 12..14)?,
            first: &params[14..15] == "1",
            left_icon: params[16..18].to_string(),
            right_icon: params[18..20].to_string(),
            status: params[20..22].to_string(),
            title: params[22..].to_string(),
        })
    }
}

code_enum! {
    ListInfoType {
        Ascii => "A",
        Cursor => "C",
        Unicode => "U",
    }
}

code_enum! {
    CursorUpdate {
        None => "-",
        Page => "P",
        Cursor => "C",
    }
}

/// One line of the on-screen list (`NLS`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListInfo {
    pub info_type: ListInfoType,
    pub line: Option<u32>,
    pub property: char,
    pub update: CursorUpdate,
    pub data: String,
}

impl ListInfo {
    pub fn decode(params: &str) -> Result<Self, DecodeError> {
        let info_type = char_code(params, 0, ListInfoType::from_code)
            .ok_or_else(|| DecodeError::param("NLS", params))?;
        let line = params
            .get(1..2)
            .and_then(|c| c.parse::<u32>().ok());
        let mut info = Self {
            info_type,
            line,
            property: '-',
            update: CursorUpdate::None,
            data: String::new(),
        };
        match info_type {
            ListInfoType::Cursor => {
                info.update = char_code(params, 2, CursorUpdate::from_code).unwrap_or(CursorUpdate::None);
            }
            ListInfoType::Ascii | ListInfoType::Unicode => {
                info.property = params.get(2..3).and_then(|p| p.chars().next()).unwrap_or('-');
                info.data = params.get(3..).unwrap_or("").to_string();
            }
        }
        Ok(info)
    }

    /// Selecting a line of the on-screen list.
    pub fn select(line: u32) -> Self {
        Self {
            info_type: ListInfoType::Unicode,
            line: Some(line),
            property: '-',
            update: CursorUpdate::None,
            data: String::new(),
        }
    }

    pub fn encode(&self) -> String {
        format!("L{}", self.line.unwrap_or(0))
    }
}

/// XML list response (`NLA`); the XML itself is parsed against the current layer count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlListInfo {
    pub response_type: char,
    pub sequence: u32,
    pub status: char,
    pub ui_type: UiType,
    pub xml: String,
}

impl XmlListInfo {
    pub fn decode(params: &str) -> Result<Self, DecodeError> {
        if !params.get(..9).is_some_and(str::is_ascii) {
            return Err(DecodeError::param("NLA", params));
        }
        let mut chars = params.chars();
        let response_type = chars.next().unwrap_or('-');
        Ok(Self {
            response_type,
            sequence: hex_field("NLA", params, 1..5)?,
            status: params[5..6].chars().next().unwrap_or('-'),
            ui_type: char_code(params, 6, UiType::from_code).unwrap_or(UiType::List),
            xml: params[9..].to_string(),
        })
    }

    /// Request for list items `start..end` of `layer`.
    pub fn request(sequence: u32, layer: u32, start: u32, end: u32) -> String {
        format!(
            "L{:04x}{:02x}{:04x}{:04x}",
            sequence & 0xFFFF,
            layer & 0xFF,
            start & 0xFFFF,
            end & 0xFFFF
        )
    }

    /// Selection of an item by its list id.
    pub fn select_item(layers: u32, id: u32) -> String {
        format!("I{:02x}{:04x}----", layers & 0xFF, id & 0xFFFF)
    }
}

code_enum! {
    ListIcon {
        Unknown => "--",
        Usb => "31",
        Folder => "29",
        Music => "2d",
        Search => "2F",
        Play => "36",
        FolderPlay => "FP",
    }
}

/// One navigable list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlListItem {
    pub id: u32,
    pub layers: u32,
    pub title: String,
    pub icon_type: String,
    pub icon: ListIcon,
    pub selectable: bool,
    /// Denon browse target behind this entry.
    pub media: Option<Box<MediaContainer>>,
}

impl XmlListItem {
    pub fn new(id: u32, layers: u32, title: &str, icon: ListIcon) -> Self {
        Self {
            id,
            layers,
            title: title.to_string(),
            icon_type: String::new(),
            icon,
            selectable: true,
            media: None,
        }
    }
}

code_enum! {
    PopupUiType {
        Xml => "X",
        List => "0",
        Menu => "1",
        Playback => "2",
        Popup => "3",
        Keyboard => "4",
        MenuList => "5",
    }
}

/// Custom popup (`NCP`): UI type followed by the popup XML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomPopup {
    pub ui_type: PopupUiType,
    pub xml: String,
}

impl CustomPopup {
    pub fn decode(params: &str) -> Result<Self, DecodeError> {
        let ui_type = char_code(params, 0, PopupUiType::from_code).unwrap_or(PopupUiType::Xml);
        let xml = params
            .get(1..)
            .ok_or_else(|| DecodeError::param("NCP", params))?;
        Ok(Self {
            ui_type,
            xml: xml.to_string(),
        })
    }

    pub fn encode(&self) -> String {
        format!("{}000{}", self.ui_type.code(), self.xml)
    }
}

/// Play queue edits (`PQA`, `PQR`, `PQO`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayQueueCommand {
    /// `kind` 0: play now, 1: play next, 2: add last.
    Add { item: u32, kind: u8, target: u32 },
    /// `kind` 0: one line, 1: all.
    Remove { kind: u8, item: u32 },
    Reorder { item: u32, target: u32 },
}

impl PlayQueueCommand {
    pub fn code(&self) -> &'static str {
        match self {
            PlayQueueCommand::Add { .. } => "PQA",
            PlayQueueCommand::Remove { .. } => "PQR",
            PlayQueueCommand::Reorder { .. } => "PQO",
        }
    }

    pub fn encode(&self) -> String {
        match *self {
            PlayQueueCommand::Add { item, kind, target } => {
                format!("{:04x}{}{:04x}", item, kind, target)
            }
            PlayQueueCommand::Remove { kind, item } => format!("{}{:04x}", kind, item),
            PlayQueueCommand::Reorder { item, target } => format!("{:04x}{:04x}", item, target),
        }
    }
}

pub const PLAYQUEUE_SID: &str = "9999";

/// A Denon browse node: a HEOS source, container or media item with its page of children.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaContainer {
    pub sid: String,
    pub parent_sid: String,
    pub cid: String,
    pub parent_cid: String,
    pub mid: String,
    pub kind: String,
    pub container: bool,
    pub playable: bool,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub image_url: String,
    pub start: u32,
    pub count: u32,
    pub aid: String,
    pub qid: String,
    pub layer: Option<LayerInfo>,
    pub items: Vec<XmlListItem>,
}

impl MediaContainer {
    pub fn same_node(&self, other: &MediaContainer) -> bool {
        self.sid == other.sid && self.cid == other.cid
    }

    pub fn is_song(&self) -> bool {
        self.kind == "song"
    }

    /// Top level of a HEOS source.
    pub fn source(sid: &str) -> Self {
        Self {
            sid: sid.to_string(),
            parent_sid: sid.to_string(),
            layer: Some(LayerInfo::ServiceTop),
            ..Default::default()
        }
    }

    /// HEOS request that opens, plays or queues this node.
    pub fn heos_request(&self) -> Option<String> {
        const PID: &str = super::dcp::HEOS_PID_PLACEHOLDER;
        if self.container {
            if self.playable
                && !self.parent_sid.is_empty()
                && !self.parent_cid.is_empty()
                && !self.aid.is_empty()
            {
                return Some(format!(
                    "heos://browse/add_to_queue?pid={}&sid={}&cid={}&aid={}",
                    PID, self.parent_sid, self.cid, self.aid
                ));
            }
            if !self.parent_sid.is_empty() && !self.cid.is_empty() {
                return Some(format!(
                    "heos://browse/browse?sid={}&cid={}&range={},9999",
                    self.parent_sid, self.cid, self.start
                ));
            }
            return None;
        }
        if !self.playable && !self.sid.is_empty() {
            return Some(if self.sid == PLAYQUEUE_SID {
                format!("heos://player/get_queue?pid={}&range={},9999", PID, self.start)
            } else {
                format!("heos://browse/browse?sid={}", self.sid)
            });
        }
        if self.playable && !self.mid.is_empty() {
            if self.kind == "station" && !self.parent_sid.is_empty() {
                return Some(if self.parent_cid.is_empty() {
                    format!(
                        "heos://browse/play_stream?pid={}&sid={}&mid={}",
                        PID, self.parent_sid, self.mid
                    )
                } else {
                    format!(
                        "heos://browse/play_stream?pid={}&sid={}&cid={}&mid={}",
                        PID, self.parent_sid, self.parent_cid, self.mid
                    )
                });
            }
            if self.is_song() && !self.parent_sid.is_empty() && !self.parent_cid.is_empty() {
                return Some(format!(
                    "heos://browse/add_to_queue?pid={}&sid={}&cid={}&mid={}&aid={}",
                    PID, self.parent_sid, self.parent_cid, self.mid, self.aid
                ));
            }
        }
        if self.playable && self.parent_sid == PLAYQUEUE_SID && !self.qid.is_empty() {
            return Some(format!(
                "heos://player/play_queue?pid={}&qid={}",
                PID, self.qid
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_type() {
        assert_eq!(ServiceType::from_code("0e"), Some(ServiceType::TuneIn));
        assert_eq!(ServiceType::from_code("HS9999"), Some(ServiceType::DcpPlayQueue));
        assert_eq!(ServiceType::DcpSpotify.heos_sid(), Some("4"));
        assert_eq!(ServiceType::Spotify.heos_sid(), None);
        assert_eq!(ServiceType::TuneIn.name(), "TuneIn");
    }

    #[test]
    fn test_list_title_info() {
        let t = ListTitleInfo::decode("F3120000000302100000FFMusic").unwrap();
        assert_eq!(t.service, ServiceType::Net);
        assert_eq!(t.ui_type, UiType::Menu);
        assert_eq!(t.layer, LayerInfo::Under2ndLayer);
        assert_eq!(t.items, 3);
        assert_eq!(t.layers, 2);
        assert!(t.first);
        assert_eq!(t.title, "Music");
        assert!(ListTitleInfo::decode("F312").is_err());
    }

    #[test]
    fn test_list_info() {
        let l = ListInfo::decode("U0-Folder A").unwrap();
        assert_eq!(l.info_type, ListInfoType::Unicode);
        assert_eq!(l.line, Some(0));
        assert_eq!(l.data, "Folder A");
        let c = ListInfo::decode("C-P").unwrap();
        assert_eq!(c.update, CursorUpdate::Page);
        assert_eq!(c.line, None);
        assert!(ListInfo::decode("").is_err());
        assert_eq!(ListInfo::select(3).encode(), "L3");
    }

    #[test]
    fn test_xml_list_info() {
        let x = XmlListInfo::decode("X002AS0000<response/>").unwrap();
        assert_eq!(x.sequence, 0x2A);
        assert_eq!(x.status, 'S');
        assert_eq!(x.ui_type, UiType::List);
        assert_eq!(x.xml, "<response/>");
        assert_eq!(XmlListInfo::request(5, 2, 0, 12), "L0005020000000c");
        assert_eq!(XmlListInfo::select_item(2, 10), "I02000a----");
    }

    #[test]
    fn test_custom_popup() {
        let p = CustomPopup::decode("3<popup/>").unwrap();
        assert_eq!(p.ui_type, PopupUiType::Popup);
        assert_eq!(p.encode(), "3000<popup/>");
    }

    #[test]
    fn test_play_queue() {
        let add = PlayQueueCommand::Add { item: 10, kind: 2, target: 0 };
        assert_eq!(add.encode(), "000a20000");
        assert_eq!(PlayQueueCommand::Remove { kind: 0, item: 1 }.encode(), "00001");
        assert_eq!(PlayQueueCommand::Reorder { item: 1, target: 2 }.code(), "PQO");
    }

    #[test]
    fn test_media_container_requests() {
        let top = MediaContainer::source("4");
        assert_eq!(top.heos_request().as_deref(), Some("heos://browse/browse?sid=4"));

        let folder = MediaContainer {
            parent_sid: "1024".to_string(),
            cid: "abc".to_string(),
            container: true,
            start: 50,
            ..Default::default()
        };
        assert_eq!(
            folder.heos_request().as_deref(),
            Some("heos://browse/browse?sid=1024&cid=abc&range=50,9999")
        );

        let queued = MediaContainer {
            parent_sid: PLAYQUEUE_SID.to_string(),
            qid: "3".to_string(),
            playable: true,
            ..Default::default()
        };
        assert_eq!(
            queued.heos_request().as_deref(),
            Some("heos://player/play_queue?pid={$PLAYER_PID}&qid=3")
        );
    }
}
