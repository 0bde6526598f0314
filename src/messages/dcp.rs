//! Denon control protocol mapping.
//!
//! DCP lines and HEOS JSON responses are translated into the same [`Message`] values ISCP
//! produces, so the session state never sees which protocol a receiver speaks. Outbound requests
//! become one or more DCP payloads: plain commands for the AVR socket, `heos://` commands for the
//! HEOS socket and `formiPhoneApp` paths for the HTTP endpoint.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::audio::{ToneLevels, VolumeLevel};
use super::common::{InputType, PowerStatus};
use super::navigation::{
    LayerInfo, ListIcon, MediaContainer, ServiceType, XmlListItem, PLAYQUEUE_SID,
};
use super::playback::{JacketArt, PlayState, TimeInfo};
use super::settings::{AudioRestorer, DimmerLevel, EcoMode, OnOff, SleepTime, SwitchStatus, ToggleStatus};
use super::tuner::{format_fm_frequency, PresetValue, RadioStationName, TunerMode, Tuning};
use super::xml::{
    NetworkService, Preset, Selector, ToneControl, ALL_ZONES, BASS_CONTROL, TREBLE_CONTROL,
};
use super::{decode_iscp, ListeningMode, Message, Query, Request};
use crate::protocol::dcp::{unescape_heos, HeosMessage, HEOS_PREFIX, HEOS_SCHEME, MSG_SEP, REQ};
use crate::protocol::iscp::IscpFrame;

/// Replaced by the HEOS player id before a command leaves the channel.
pub const HEOS_PID_PLACEHOLDER: &str = "{$PLAYER_PID}";

/// Prefix of commands routed to the HTTP `goform` endpoint.
pub const GOFORM_REQUEST: &str = "formiPhoneApp";

const INPUT_SEL: &str = "SSFUN";
const END: &str = "END";
const MAX_VOLUME: &str = "MVMAX";
const VOLUME_LIMIT: &str = "SSVCTZMALIM";
const PRESET_LIST: &str = "OPTPN";
const FIRMWARE_VER: &str = "SSINFFRM";
const BASS: [&str; 3] = ["PSBAS", "Z2PSBAS", "Z3PSBAS"];
const TREBLE: [&str; 3] = ["PSTRE", "Z2PSTRE", "Z3PSTRE"];
const TONE_MAX: [i32; 3] = [6, 10, 10];
const TONE_SHIFT: i32 = 50;
const FM_NAME: &str = "TFANNAME";
const FM_FREQ: &str = "TFAN";
const DAB_NAME: &str = "DASTN";
const DAB_FREQ: &str = "DAFRQ";
const TUNER_MODE: &str = "TMAN";
const TUNER_PRESET: &str = "TPAN";
const DIMMER: &str = "DIM";
const SLEEP: &str = "SLP";
const ECO: &str = "ECO";
const AUDIO_RESTORER: &str = "PSRSTR";
const ALL_ZONE_STEREO: &str = "MNZST";
const HDMI_CEC: &str = "SSHOSCEC";
const LISTENING_MODE: &str = "MS";

/// Codes that may start a response glued to the end of an `OPTPN` line.
const ACCEPTED_CODES: &[&str] = &[
    INPUT_SEL, MAX_VOLUME, VOLUME_LIMIT, PRESET_LIST, FIRMWARE_VER, "PSBAS", "Z2PSBAS", "Z3PSBAS",
    "PSTRE", "Z2PSTRE", "Z3PSTRE", "PW", "ZM", "Z2", "Z3", "SI", "MV", "MU", LISTENING_MODE,
    TUNER_MODE, FM_FREQ, FM_NAME, DAB_NAME, DAB_FREQ, TUNER_PRESET, DIMMER, SLEEP, ECO,
    AUDIO_RESTORER, HDMI_CEC,
];

const HEOS_MUSIC_SOURCES: &str = "browse/get_music_sources";
const HEOS_NOW_PLAYING: &str = "player/get_now_playing_media";
const HEOS_PLAY_STATE: &str = "player/get_play_state";
const HEOS_STATE_CHANGED: &str = "event/player_state_changed";
const HEOS_PROGRESS: &str = "event/player_now_playing_progress";
const HEOS_BROWSE_SERVICE: &str = "heos/browse";
const HEOS_BROWSE_CONTAINER: &str = "browse/browse";
const HEOS_QUEUE: &str = "player/get_queue";
/// HEOS commands and events forwarded as [`Message::DcpMediaEvent`].
const HEOS_MEDIA_EVENTS: &[&str] = &[
    "event/player_now_playing_changed",
    "event/player_queue_changed",
    "browse/set_service_option",
    "player/save_queue",
    "browse/rename_playlist",
    "browse/delete_playlist",
];

/// Receiver configuration pieces a Denon reports one line at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DcpReceiverUpdate {
    Selector(Selector),
    MaxVolume(u32),
    ToneControl(ToneControl),
    Preset(Preset),
    NetworkServices(Vec<NetworkService>),
    FirmwareVersion(String),
    ZoneNames(Vec<String>),
}

/// Decodes one line from the AVR or HEOS socket. `zone` is the active zone, applied to tuner
/// messages which carry none.
pub fn decode_dcp_line(line: &str, zone: usize, heos_pid: Option<i64>) -> Vec<Message> {
    if line.starts_with(HEOS_PREFIX) {
        return decode_heos(line, heos_pid);
    }
    if line.starts_with(PRESET_LIST) {
        return decode_joined(line, zone);
    }
    decode_command(line, zone)
}

/// `OPTPN` lines sometimes arrive without a terminator, with the next response glued on.
fn decode_joined(line: &str, zone: usize) -> Vec<Message> {
    let mut rest = line;
    let mut search_end = rest.len();
    let mut tail = Vec::new();
    loop {
        let idx = ACCEPTED_CODES
            .iter()
            .filter_map(|code| {
                rest.match_indices(code)
                    .map(|(i, _)| i)
                    .filter(|i| *i <= search_end)
                    .last()
            })
            .max()
            .unwrap_or(0);
        if idx == 0 {
            break;
        }
        let msgs = decode_command(&rest[idx..], zone);
        if msgs.is_empty() {
            search_end = idx - 1;
            continue;
        }
        debug!("Split joined DCP message: {} / {}", &rest[..idx], &rest[idx..]);
        tail.splice(0..0, msgs);
        rest = &rest[..idx];
        search_end = rest.len();
    }
    let mut out = decode_command(rest, zone);
    out.extend(tail);
    out
}

fn param<'a>(line: &'a str, code: &str) -> Option<&'a str> {
    line.strip_prefix(code).map(str::trim)
}

fn decode_command(line: &str, zone: usize) -> Vec<Message> {
    let mut out = Vec::new();
    if let Some(update) = decode_receiver_info(line) {
        out.push(Message::DcpReceiverInformation(update));
    }
    out.extend(decode_zone_command(line));
    out.extend(decode_tuner(line, zone));
    out.extend(decode_settings(line));
    if let Some(name) = param(line, LISTENING_MODE) {
        out.push(Message::ListeningMode(ListeningMode::from_dcp(name)));
    }
    if out.is_empty() {
        debug!("DCP line not handled: {}", line);
    }
    out
}

fn decode_receiver_info(line: &str) -> Option<DcpReceiverUpdate> {
    if let Some(par) = param(line, INPUT_SEL) {
        if par.eq_ignore_ascii_case(END) {
            return None;
        }
        let Some((code, name)) = par.split_once(' ') else {
            info!("DCP selector {}: separator not found", par);
            return None;
        };
        let Some(input) = InputType::from_dcp_code(code.trim()) else {
            info!("DCP input selector not known: {}", par);
            return None;
        };
        return Some(DcpReceiverUpdate::Selector(Selector {
            id: input.code().to_string(),
            name: name.trim().to_string(),
            zones: ALL_ZONES,
            icon_id: String::new(),
            add_to_queue: false,
        }));
    }
    if let Some(par) = param(line, MAX_VOLUME) {
        return max_volume(par, true);
    }
    if let Some(par) = param(line, VOLUME_LIMIT) {
        return max_volume(par, false);
    }
    for (i, code) in BASS.iter().enumerate() {
        if line.starts_with(code) {
            return Some(tone_control(BASS_CONTROL, TONE_MAX[i]));
        }
    }
    for (i, code) in TREBLE.iter().enumerate() {
        if line.starts_with(code) {
            return Some(tone_control(TREBLE_CONTROL, TONE_MAX[i]));
        }
    }
    if let Some(par) = param(line, PRESET_LIST) {
        let preset = par
            .get(..2)
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|_| par.len() > 2)
            .map(|id| {
                let name = par[2..].trim();
                match format_fm_frequency(name) {
                    Some(freq) if name.bytes().all(|b| b.is_ascii_digit()) => Preset {
                        id,
                        band: 1,
                        frequency: freq,
                        name: String::new(),
                    },
                    _ => Preset {
                        id,
                        band: 2,
                        frequency: "0".to_string(),
                        name: name.to_string(),
                    },
                }
            });
        if preset.is_none() {
            info!("DCP preset invalid: {}", par);
        }
        return preset.map(DcpReceiverUpdate::Preset);
    }
    if let Some(par) = param(line, FIRMWARE_VER) {
        if !par.eq_ignore_ascii_case(END) {
            return Some(DcpReceiverUpdate::FirmwareVersion(par.to_string()));
        }
    }
    None
}

fn max_volume(par: &str, scale: bool) -> Option<DcpReceiverUpdate> {
    match par.parse::<u32>() {
        Ok(v) if scale && par.len() > 2 => Some(DcpReceiverUpdate::MaxVolume(v / 10)),
        Ok(v) => Some(DcpReceiverUpdate::MaxVolume(v)),
        Err(_) => {
            info!("Unable to parse max. volume level {}", par);
            None
        }
    }
}

fn tone_control(id: &str, max: i32) -> DcpReceiverUpdate {
    DcpReceiverUpdate::ToneControl(ToneControl {
        id: id.to_string(),
        min: -max,
        max,
        step: 1,
    })
}

/// Prefix of zone-scoped commands; the main zone uses per-command prefixes instead.
fn zone_prefix(zone: usize) -> Option<&'static str> {
    match zone {
        1 => Some("Z2"),
        2 => Some("Z3"),
        _ => None,
    }
}

fn decode_zone_command(line: &str) -> Option<Message> {
    // Main zone: PW / ZM power, SI input, MV volume, MU mute, PSBAS/PSTRE tone
    match line {
        "PWON" | "ZMON" => return Some(power(0, PowerStatus::On)),
        "PWSTANDBY" | "ZMOFF" => return Some(power(0, PowerStatus::Standby)),
        "MUON" => return Some(mute(0, ToggleStatus::On)),
        "MUOFF" => return Some(mute(0, ToggleStatus::Off)),
        _ => {}
    }
    if let Some(name) = line.strip_prefix("SI") {
        return input(0, name);
    }
    if !line.starts_with(MAX_VOLUME) {
        if let Some(digits) = line.strip_prefix("MV") {
            return volume(0, digits);
        }
    }
    if let Some(tone) = decode_tone(0, line) {
        return Some(tone);
    }

    for zone in 1..=2 {
        let Some(rest) = zone_prefix(zone).and_then(|p| line.strip_prefix(p)) else {
            continue;
        };
        return match rest {
            "ON" => Some(power(zone, PowerStatus::On)),
            "OFF" => Some(power(zone, PowerStatus::Standby)),
            "MUON" => Some(mute(zone, ToggleStatus::On)),
            "MUOFF" => Some(mute(zone, ToggleStatus::Off)),
            r if r.starts_with("PS") => decode_tone(zone, line),
            r if r.bytes().next().is_some_and(|b| b.is_ascii_digit()) => volume(zone, r),
            r => input(zone, r),
        };
    }
    None
}

fn power(zone: usize, status: PowerStatus) -> Message {
    Message::PowerStatus { zone, status }
}

fn mute(zone: usize, status: ToggleStatus) -> Message {
    Message::AudioMuting { zone, status }
}

fn input(zone: usize, name: &str) -> Option<Message> {
    InputType::from_dcp_code(name.trim()).map(|input| Message::InputSelector { zone, input })
}

fn volume(zone: usize, digits: &str) -> Option<Message> {
    VolumeLevel::decode_dcp(digits.trim()).map(|level| Message::MasterVolume {
        zone,
        level: VolumeLevel::Level(level),
    })
}

fn decode_tone(zone: usize, line: &str) -> Option<Message> {
    let value = |code: &str| -> Option<i32> {
        param(line, code)?.parse::<i32>().ok().map(|v| v - TONE_SHIFT)
    };
    if let Some(b) = BASS.get(zone).and_then(|code| value(code)) {
        return Some(Message::ToneCommand {
            zone,
            tone: ToneLevels::bass(b),
        });
    }
    if let Some(t) = TREBLE.get(zone).and_then(|code| value(code)) {
        return Some(Message::ToneCommand {
            zone,
            tone: ToneLevels::treble(t),
        });
    }
    None
}

fn decode_tuner(line: &str, zone: usize) -> Option<Message> {
    if let Some(par) = param(line, TUNER_MODE) {
        return TunerMode::from_code(par).map(Message::DcpTunerMode);
    }
    if let Some(name) = param(line, FM_NAME) {
        return Some(Message::RadioStationName(RadioStationName {
            name: name.to_string(),
            mode: TunerMode::Fm,
        }));
    }
    if let Some(name) = param(line, DAB_NAME) {
        return Some(Message::RadioStationName(RadioStationName {
            name: name.to_string(),
            mode: TunerMode::Dab,
        }));
    }
    if let Some(freq) = param(line, FM_FREQ) {
        if freq.bytes().all(|b| b.is_ascii_digit()) && !freq.is_empty() {
            return Some(Message::TuningCommand {
                zone,
                tuning: Tuning::Frequency {
                    value: freq.to_string(),
                    mode: Some(TunerMode::Fm),
                },
            });
        }
        return None;
    }
    if let Some(freq) = param(line, DAB_FREQ) {
        return Some(Message::TuningCommand {
            zone,
            tuning: Tuning::Frequency {
                value: freq.trim_end_matches("MHz").trim().to_string(),
                mode: Some(TunerMode::Dab),
            },
        });
    }
    if let Some(par) = param(line, TUNER_PRESET) {
        return par.parse::<u32>().ok().map(|n| Message::PresetCommand {
            zone,
            preset: PresetValue::Number(n),
        });
    }
    None
}

fn decode_settings(line: &str) -> Option<Message> {
    if let Some(par) = param(line, DIMMER) {
        return DimmerLevel::from_dcp_code(par).map(Message::DimmerLevel);
    }
    if let Some(par) = param(line, SLEEP) {
        if par == "OFF" {
            return Some(Message::SleepTimer(SleepTime::Off));
        }
        return par
            .parse::<u8>()
            .ok()
            .map(|m| Message::SleepTimer(SleepTime::Minutes(m)));
    }
    if let Some(par) = param(line, ECO) {
        return EcoMode::from_code(par).map(Message::DcpEcoMode);
    }
    if let Some(par) = param(line, AUDIO_RESTORER) {
        return AudioRestorer::from_code(par).map(Message::DcpAudioRestorer);
    }
    if let Some(par) = param(line, ALL_ZONE_STEREO) {
        return OnOff::from_code(par).map(Message::DcpAllZoneStereo);
    }
    if let Some(par) = param(line, HDMI_CEC) {
        return match par {
            "ON" => Some(Message::HdmiCec(SwitchStatus::On)),
            "OFF" => Some(Message::HdmiCec(SwitchStatus::Off)),
            _ => None,
        };
    }
    None
}

// ============================================================================
// HEOS
// ============================================================================

/// Payload fields are strings or numbers depending on firmware.
fn element(v: &Value, key: &str) -> String {
    match v.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn decode_heos(line: &str, heos_pid: Option<i64>) -> Vec<Message> {
    let msg = match HeosMessage::parse(line) {
        Ok(m) => m,
        Err(e) => {
            info!("DCP HEOS error: {}, message={}", e, line);
            return Vec::new();
        }
    };
    if !msg.is_success() {
        info!("DCP HEOS message ignored due to wrong result: {}", line);
        return Vec::new();
    }
    if let (Some(pid), Some(own)) = (msg.message.get("pid"), heos_pid) {
        if pid.parse::<i64>().ok() != Some(own) {
            debug!("HEOS message for another player ignored: {}", msg.command);
            return Vec::new();
        }
    }

    let command = msg.command.as_str();
    match command {
        HEOS_MUSIC_SOURCES => music_sources(&msg.payload)
            .map(|s| vec![Message::DcpReceiverInformation(DcpReceiverUpdate::NetworkServices(s))])
            .unwrap_or_default(),
        HEOS_NOW_PLAYING => now_playing(&msg.payload),
        HEOS_PLAY_STATE | HEOS_STATE_CHANGED => msg
            .message
            .get("state")
            .and_then(PlayState::from_heos)
            .map(|s| vec![Message::PlayStatus(s)])
            .unwrap_or_default(),
        HEOS_PROGRESS => {
            let ms = |k: &str| msg.message.get(k).and_then(|v| v.parse::<u64>().ok());
            match (ms("cur_pos"), ms("duration")) {
                (Some(cur), Some(dur)) => vec![Message::TimeInfo(TimeInfo::from_millis(cur, dur))],
                _ => Vec::new(),
            }
        }
        HEOS_BROWSE_SERVICE | HEOS_BROWSE_CONTAINER => {
            vec![Message::DcpMediaContainer(Box::new(browse_result(&msg)))]
        }
        HEOS_QUEUE => vec![Message::DcpMediaContainer(Box::new(queue_result(&msg)))],
        c if HEOS_MEDIA_EVENTS.contains(&c) => vec![Message::DcpMediaEvent(c.to_string())],
        _ => {
            debug!("HEOS message not handled: {}", command);
            Vec::new()
        }
    }
}

fn music_sources(payload: &Value) -> Option<Vec<NetworkService>> {
    let mut services: Vec<NetworkService> = payload
        .as_array()?
        .iter()
        .filter_map(|src| {
            let id = format!("HS{}", element(src, "sid"));
            let name = element(src, "name");
            if ServiceType::from_code(&id).is_none() {
                info!("Service {} is not supported", name);
                return None;
            }
            Some(NetworkService {
                id,
                name,
                zones: ALL_ZONES,
                add_to_queue: false,
            })
        })
        .collect();
    if services.is_empty() {
        return None;
    }
    let queue = ServiceType::DcpPlayQueue;
    services.push(NetworkService {
        id: queue.code().to_string(),
        name: queue.name().to_string(),
        zones: ALL_ZONES,
        add_to_queue: false,
    });
    Some(services)
}

fn now_playing(payload: &Value) -> Vec<Message> {
    let mut out = vec![
        Message::TitleName(unescape_heos(&element(payload, "song"))),
        Message::AlbumName(unescape_heos(&element(payload, "album"))),
        Message::ArtistName(unescape_heos(&element(payload, "artist"))),
    ];
    let url = element(payload, "image_url");
    if !url.is_empty() {
        out.push(Message::JacketArt(JacketArt::from_url(&url)));
    }
    let sid = payload.get("sid").and_then(Value::as_i64);
    if let Some(sid) = sid {
        out.push(Message::DcpMediaItem {
            mid: element(payload, "mid"),
            sid,
        });
    }
    out
}

/// Browse node described by the request tokens echoed in `heos.message`.
fn parent_container(msg: &HeosMessage) -> MediaContainer {
    let token = |k: &str| msg.message.get(k).unwrap_or("").to_string();
    let sid = token("sid");
    let cid = token("cid");
    let start = msg
        .message
        .get("range")
        .and_then(|r| r.split_once(','))
        .and_then(|(s, _)| s.parse().ok())
        .unwrap_or(0);
    let count = msg
        .message
        .get("count")
        .and_then(|c| c.parse().ok())
        .unwrap_or(0);
    MediaContainer {
        parent_sid: sid.clone(),
        sid,
        parent_cid: cid.clone(),
        container: !cid.is_empty(),
        layer: Some(if cid.is_empty() {
            LayerInfo::ServiceTop
        } else {
            LayerInfo::Under2ndLayer
        }),
        cid,
        start,
        count,
        ..Default::default()
    }
}

fn browse_result(msg: &HeosMessage) -> MediaContainer {
    let mut parent = parent_container(msg);
    let layers = if parent.layer == Some(LayerInfo::ServiceTop) { 0 } else { 1 };
    let entries = msg.payload.as_array().cloned().unwrap_or_default();
    for (i, entry) in entries.iter().enumerate() {
        let mut item = MediaContainer {
            sid: element(entry, "sid"),
            parent_sid: parent.sid.clone(),
            cid: element(entry, "cid"),
            parent_cid: parent.cid.clone(),
            mid: element(entry, "mid"),
            kind: element(entry, "type"),
            container: element(entry, "container").eq_ignore_ascii_case("yes"),
            playable: element(entry, "playable").eq_ignore_ascii_case("yes"),
            name: unescape_heos(&element(entry, "name")),
            artist: unescape_heos(&element(entry, "artist")),
            album: unescape_heos(&element(entry, "album")),
            image_url: element(entry, "image_url"),
            ..Default::default()
        };
        if item.is_song() {
            item.aid = "1".to_string();
        }
        let (icon, icon_type) = if item.container {
            let icon_type = match item.name.as_str() {
                "All" => "01",
                "Browse Folders" => "99",
                _ => "50",
            };
            let icon = if item.playable { ListIcon::FolderPlay } else { ListIcon::Folder };
            (icon, icon_type)
        } else {
            let icon = if item.playable { ListIcon::Music } else { ListIcon::Unknown };
            (icon, "75")
        };
        let mut list_item = XmlListItem::new(parent.start + i as u32, layers, &item.name, icon);
        list_item.icon_type = icon_type.to_string();
        list_item.media = Some(Box::new(item));
        parent.items.push(list_item);
    }
    parent
}

fn queue_result(msg: &HeosMessage) -> MediaContainer {
    let mut parent = parent_container(msg);
    if parent.sid.is_empty() {
        parent.sid = PLAYQUEUE_SID.to_string();
        parent.parent_sid = PLAYQUEUE_SID.to_string();
    }
    let entries = msg.payload.as_array().cloned().unwrap_or_default();
    for entry in &entries {
        let artist = unescape_heos(&element(entry, "artist"));
        let item = MediaContainer {
            parent_sid: PLAYQUEUE_SID.to_string(),
            mid: element(entry, "mid"),
            kind: "song".to_string(),
            playable: true,
            name: format!("{} - {}", artist, unescape_heos(&element(entry, "song"))),
            artist,
            album: unescape_heos(&element(entry, "album")),
            image_url: element(entry, "image_url"),
            qid: element(entry, "qid"),
            ..Default::default()
        };
        let Ok(qid) = item.qid.parse::<u32>() else {
            continue;
        };
        let mut list_item = XmlListItem::new(qid, 0, &item.name, ListIcon::Music);
        list_item.icon_type = "75".to_string();
        list_item.media = Some(Box::new(item));
        parent.items.push(list_item);
    }
    parent
}

// ============================================================================
// Encoding
// ============================================================================

/// Commands sent once after connecting: event registration, sources, inputs, presets, firmware.
pub fn receiver_info_request() -> String {
    [
        format!("{}system/register_for_change_events?enable=on", HEOS_SCHEME),
        format!("{}{}", HEOS_SCHEME, HEOS_MUSIC_SOURCES),
        format!("{} {}", INPUT_SEL, REQ),
        format!("{} {}", PRESET_LIST, REQ),
        format!("{} {}", FIRMWARE_VER, REQ),
    ]
    .join(MSG_SEP)
}

fn heos(cmd: &str) -> String {
    format!("{}{}", HEOS_SCHEME, cmd)
}

fn zoned(zone: usize, main: &str, suffix: &str) -> Option<String> {
    match zone {
        0 => Some(format!("{}{}", main, suffix)),
        z => zone_prefix(z).map(|p| format!("{}{}", p, suffix)),
    }
}

/// DCP request for a status query; `None` where DCP has no equivalent.
pub fn query_dcp(query: Query, zone: usize) -> Option<String> {
    let q = |cmd: &str| format!("{}{}", cmd, REQ);
    match query {
        Query::PowerStatus => zoned(zone, "ZM", REQ),
        Query::InputSelector => zoned(zone, "SI", REQ),
        Query::MasterVolume => zoned(zone, "MV", REQ),
        Query::AudioMuting => match zone {
            0 => Some(q("MU")),
            z => zone_prefix(z).map(|p| format!("{}MU{}", p, REQ)),
        },
        Query::ToneCommand => {
            let bass = BASS.get(zone)?;
            let treble = TREBLE.get(zone)?;
            Some(format!("{} {}{}{} {}", bass, REQ, MSG_SEP, treble, REQ))
        }
        Query::ListeningMode => Some(q(LISTENING_MODE)),
        Query::DimmerLevel => Some(format!("{} {}", DIMMER, REQ)),
        Query::SleepTimer => Some(q(SLEEP)),
        Query::HdmiCec => Some(format!("{} {}", HDMI_CEC, REQ)),
        Query::DcpEcoMode => Some(q(ECO)),
        Query::DcpAudioRestorer => Some(format!("{} {}", AUDIO_RESTORER, REQ)),
        Query::DcpAllZoneStereo => Some(format!("{} {}", ALL_ZONE_STEREO, REQ)),
        Query::DcpTunerMode => Some(q(TUNER_MODE)),
        Query::TuningCommand => Some(format!("{}{}DA {}", q(FM_FREQ), MSG_SEP, REQ)),
        Query::RadioStationName => Some(format!("{}{}DA {}", q(FM_NAME), MSG_SEP, REQ)),
        Query::PresetCommand => Some(q(TUNER_PRESET)),
        Query::DcpReceiverInformation => Some(receiver_info_request()),
        Query::PlayStatus => Some(heos(&format!(
            "{}?pid={}",
            HEOS_PLAY_STATE, HEOS_PID_PLACEHOLDER
        ))),
        Query::DcpMediaItem => Some(heos(&format!(
            "{}?pid={}",
            HEOS_NOW_PLAYING, HEOS_PID_PLACEHOLDER
        ))),
        _ => None,
    }
}

/// DCP command for an outbound message; `None` where DCP has no equivalent.
pub fn encode_dcp(msg: &Message) -> Option<String> {
    match msg {
        Message::PowerStatus { zone, status } => match status {
            PowerStatus::AllStandby => Some("PWSTANDBY".to_string()),
            PowerStatus::On => zoned(*zone, "ZM", "ON"),
            PowerStatus::Standby => zoned(*zone, "ZM", "OFF"),
        },
        Message::InputSelector { zone, input } => zoned(*zone, "SI", input.dcp_code()?),
        Message::MasterVolume { zone, level } => {
            let value = match level {
                VolumeLevel::Level(l) => VolumeLevel::encode_dcp(*l),
                VolumeLevel::Up | VolumeLevel::Up1 => "UP".to_string(),
                VolumeLevel::Down | VolumeLevel::Down1 => "DOWN".to_string(),
            };
            zoned(*zone, "MV", &value)
        }
        Message::AudioMuting { zone, status } => {
            let value = match status {
                ToggleStatus::On => "MUON",
                ToggleStatus::Off => "MUOFF",
                ToggleStatus::Toggle => return None,
            };
            match zone {
                0 => Some(value.to_string()),
                z => zone_prefix(*z).map(|p| format!("{}{}", p, value)),
            }
        }
        Message::ToneCommand { zone, tone } => {
            let mut cmds = Vec::new();
            if let Some(b) = tone.bass {
                cmds.push(format!("{} {:02}", BASS.get(*zone)?, b + TONE_SHIFT));
            }
            if let Some(t) = tone.treble {
                cmds.push(format!("{} {:02}", TREBLE.get(*zone)?, t + TONE_SHIFT));
            }
            (!cmds.is_empty()).then(|| cmds.join(MSG_SEP))
        }
        Message::ListeningMode(mode) => mode.to_dcp().map(|n| format!("{}{}", LISTENING_MODE, n)),
        Message::DimmerLevel(level) => Some(format!("{} {}", DIMMER, level.dcp_code())),
        Message::SleepTimer(time) => match time {
            SleepTime::Off => Some(format!("{}OFF", SLEEP)),
            SleepTime::Minutes(m) => Some(format!("{}{:03}", SLEEP, m)),
            SleepTime::Up => None,
        },
        Message::HdmiCec(status) => match status {
            SwitchStatus::On => Some(format!("{} ON", HDMI_CEC)),
            SwitchStatus::Off => Some(format!("{} OFF", HDMI_CEC)),
            _ => None,
        },
        Message::DcpEcoMode(mode) => Some(format!("{}{}", ECO, mode.code())),
        Message::DcpAudioRestorer(r) => Some(format!("{} {}", AUDIO_RESTORER, r.code())),
        Message::DcpAllZoneStereo(s) => Some(format!("{} {}", ALL_ZONE_STEREO, s.code())),
        Message::DcpTunerMode(mode) => Some(format!("{}{}", TUNER_MODE, mode.code())),
        Message::TuningCommand { tuning, .. } => Some(match tuning {
            Tuning::Up => format!("{}UP", FM_FREQ),
            Tuning::Down => format!("{}DOWN", FM_FREQ),
            Tuning::Frequency { value, .. } => format!("{}{}", FM_FREQ, value),
        }),
        Message::PresetCommand { preset, .. } => Some(preset.encode_dcp()),
        Message::OperationCommand(cmd) => cmd.heos_command().map(heos),
        Message::SetupOperation(cmd) => cmd
            .dcp_code()
            .map(|c| format!("{}Direct.xml?{}", GOFORM_REQUEST, c)),
        Message::NetworkService(service) => {
            let sid = service.heos_sid()?;
            MediaContainer::source(sid).heos_request()
        }
        Message::DcpMediaContainer(container) => container.heos_request(),
        _ => None,
    }
}

/// Splits an encoded request into the payloads sent one by one.
pub fn encode_request(req: &Request) -> Vec<String> {
    let encoded = match req {
        Request::Send(msg) => encode_dcp(msg),
        Request::Query { query, zone } => query_dcp(*query, *zone),
        Request::Raw { code, params } => decode_iscp(&IscpFrame::new(code, params.clone()))
            .ok()
            .and_then(|msg| encode_dcp(&msg)),
    };
    encoded
        .map(|s| {
            s.split(MSG_SEP)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
