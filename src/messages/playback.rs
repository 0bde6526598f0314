//! Now-playing information and transport commands.

use serde::{Deserialize, Serialize};

use super::code_enum;
use crate::error::DecodeError;

code_enum! {
    PlayStatus {
        Stop => "S",
        Play => "P",
        Pause => "p",
        FastForward => "F",
        FastRewind => "R",
        Eof => "E",
    }
}

code_enum! {
    RepeatStatus {
        Off => "-",
        All => "R",
        Folder => "F",
        Repeat1 => "1",
        Disabled => "x",
    }
}

code_enum! {
    ShuffleStatus {
        Off => "-",
        All => "S",
        Album => "A",
        Folder => "F",
        Disabled => "x",
    }
}

impl PlayStatus {
    /// Codes are case-sensitive: `P` is play, `p` is pause.
    pub fn from_char(c: char) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.code().starts_with(c))
    }

    pub fn is_playing(self) -> bool {
        !matches!(self, PlayStatus::Stop | PlayStatus::Eof)
    }
}

/// Play, repeat and shuffle status (`NST`: `prs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayState {
    pub play: PlayStatus,
    pub repeat: RepeatStatus,
    pub shuffle: ShuffleStatus,
}

impl PlayState {
    pub fn decode(params: &str) -> Result<Self, DecodeError> {
        let mut chars = params.chars();
        let play = chars
            .next()
            .and_then(PlayStatus::from_char)
            .ok_or_else(|| DecodeError::param("NST", params))?;
        let repeat = chars
            .next()
            .and_then(|c| RepeatStatus::from_code(&c.to_string()))
            .unwrap_or(RepeatStatus::Disabled);
        let shuffle = chars
            .next()
            .and_then(|c| ShuffleStatus::from_code(&c.to_string()))
            .unwrap_or(ShuffleStatus::Disabled);
        Ok(Self {
            play,
            repeat,
            shuffle,
        })
    }

    /// Play state from a HEOS `state=play|pause|stop` token.
    pub fn from_heos(state: &str) -> Option<Self> {
        let play = match state {
            "play" => PlayStatus::Play,
            "pause" => PlayStatus::Pause,
            "stop" => PlayStatus::Stop,
            _ => return None,
        };
        Some(Self {
            play,
            repeat: RepeatStatus::Disabled,
            shuffle: ShuffleStatus::Disabled,
        })
    }
}

pub const INVALID_TIME: &str = "--:--:--";

/// Elapsed and total time (`NTM`: `cur/max`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInfo {
    pub current: String,
    pub maximum: String,
}

impl TimeInfo {
    pub fn decode(params: &str) -> Self {
        let (current, maximum) = params.split_once('/').unwrap_or((params, INVALID_TIME));
        Self {
            current: current.trim().to_string(),
            maximum: maximum.trim().to_string(),
        }
    }

    /// Builds time strings from HEOS millisecond positions.
    pub fn from_millis(current: u64, duration: u64) -> Self {
        Self {
            current: format_millis(current),
            maximum: format_millis(duration),
        }
    }
}

fn format_millis(ms: u64) -> String {
    let s = ms / 1000;
    format!("{:02}:{:02}:{:02}", s / 3600, (s / 60) % 60, s % 60)
}

/// Seconds in an `hh:mm:ss` or `mm:ss` string.
pub fn time_to_seconds(time: &str) -> Option<u32> {
    let mut total = 0u32;
    for part in time.split(':') {
        total = total.checked_mul(60)?.checked_add(part.trim().parse().ok()?)?;
    }
    Some(total)
}

pub fn seconds_to_time(seconds: u32) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60
    )
}

/// Track position (`NTR`: `cur/max`); `-` fields stay unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub current: Option<u32>,
    pub maximum: Option<u32>,
}

impl TrackInfo {
    pub fn decode(params: &str) -> Self {
        let (cur, max) = params.split_once('/').unwrap_or((params, ""));
        Self {
            current: cur.trim().parse().ok(),
            maximum: max.trim().parse().ok(),
        }
    }
}

code_enum! {
    TrackMenu {
        Enabled => "M",
        Disabled => "x",
    }
}

code_enum! {
    FeedType {
        None => "--",
        Like => "01",
        DontLike => "02",
        Love => "03",
        Ban => "04",
        Episode => "05",
        Ratings => "06",
        Ban2 => "07",
        Like2 => "08",
        DontLike2 => "09",
        Love2 => "0A",
        Ban3 => "0B",
    }
}

code_enum! {
    TimeSeekMode {
        Enabled => "S",
        Disabled => "x",
    }
}

code_enum! {
    TimeDisplay {
        Elapsed => "1",
        Remaining => "2",
        Disabled => "x",
    }
}

/// Menu, feed and seek capabilities of the current service (`NMS`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuStatus {
    pub track_menu: TrackMenu,
    pub positive_feed: FeedType,
    pub negative_feed: FeedType,
    pub time_seek: TimeSeekMode,
    pub time_display: TimeDisplay,
    pub service_icon: String,
}

impl MenuStatus {
    pub fn decode(params: &str) -> Result<Self, DecodeError> {
        if params.len() < 9 || !params.is_ascii() {
            return Err(DecodeError::param("NMS", params));
        }
        Ok(Self {
            track_menu: TrackMenu::from_code(&params[0..1]).unwrap_or(TrackMenu::Disabled),
            positive_feed: FeedType::from_code(&params[1..3]).unwrap_or(FeedType::None),
            negative_feed: FeedType::from_code(&params[3..5]).unwrap_or(FeedType::None),
            time_seek: TimeSeekMode::from_code(&params[5..6]).unwrap_or(TimeSeekMode::Disabled),
            time_display: TimeDisplay::from_code(&params[6..7]).unwrap_or(TimeDisplay::Disabled),
            service_icon: params[7..9].to_string(),
        })
    }
}

code_enum! {
    ImageType {
        Bmp => "0",
        Jpeg => "1",
        Url => "2",
        NoImage => "n",
    }
}

code_enum! {
    PacketFlag {
        Start => "0",
        Next => "1",
        End => "2",
        NotUsed => "-",
    }
}

/// One chunk of cover art (`NJA`): image type, packet flag, then hex data or a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JacketArt {
    pub image_type: ImageType,
    pub packet: PacketFlag,
    pub url: Option<String>,
    pub data: Vec<u8>,
}

impl JacketArt {
    /// Asks the receiver to send covers as URLs.
    pub const REQUEST_LINK: &'static str = "LINK";
    pub const REQUEST_BMP: &'static str = "BMP";
    /// Requests the cover of the current track.
    pub const REQUEST_COVER: &'static str = "REQ";

    pub fn decode(params: &str) -> Result<Self, DecodeError> {
        let mut chars = params.chars();
        let image_type = chars
            .next()
            .and_then(|c| ImageType::from_code(&c.to_string()))
            .ok_or_else(|| DecodeError::param("NJA", params))?;
        let packet = chars
            .next()
            .and_then(|c| PacketFlag::from_code(&c.to_string()))
            .unwrap_or(PacketFlag::NotUsed);
        let payload = params.get(2..).unwrap_or("");
        match image_type {
            ImageType::Url => Ok(Self {
                image_type,
                packet,
                url: Some(payload.to_string()),
                data: Vec::new(),
            }),
            ImageType::NoImage => Ok(Self {
                image_type,
                packet,
                url: None,
                data: Vec::new(),
            }),
            _ => Ok(Self {
                image_type,
                packet,
                url: None,
                data: decode_hex(payload).ok_or_else(|| DecodeError::param("NJA", params))?,
            }),
        }
    }

    pub fn from_url(url: &str) -> Self {
        Self {
            image_type: ImageType::Url,
            packet: PacketFlag::NotUsed,
            url: Some(url.to_string()),
            data: Vec::new(),
        }
    }
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.is_ascii() {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

code_enum! {
    /// Network/USB transport keys (`NTC`).
    OperationCommand {
        Play => "PLAY",
        Stop => "STOP",
        Pause => "PAUSE",
        PlayPause => "P/P",
        TrackUp => "TRUP",
        TrackDown => "TRDN",
        FastForward => "FF",
        Rewind => "REW",
        Repeat => "REPEAT",
        Random => "RANDOM",
        RepeatShuffle => "REP/SHF",
        Display => "DISPLAY",
        Album => "ALBUM",
        Artist => "ARTIST",
        Genre => "GENRE",
        Playlist => "PLAYLIST",
        Right => "RIGHT",
        Left => "LEFT",
        Up => "UP",
        Down => "DOWN",
        Select => "SELECT",
        Key0 => "0",
        Key1 => "1",
        Key2 => "2",
        Key3 => "3",
        Key4 => "4",
        Key5 => "5",
        Key6 => "6",
        Key7 => "7",
        Key8 => "8",
        Key9 => "9",
        Delete => "DELETE",
        Caps => "CAPS",
        Location => "LOCATION",
        Language => "LANGUAGE",
        Setup => "SETUP",
        Return => "RETURN",
        ChannelUp => "CHUP",
        ChannelDown => "CHDN",
        Menu => "MENU",
        Top => "TOP",
        Mode => "MODE",
        List => "LIST",
        Memory => "MEMORY",
        F1 => "F1",
        F2 => "F2",
    }
}

impl OperationCommand {
    /// HEOS request for the transport keys a Denon player understands.
    pub fn heos_command(self) -> Option<&'static str> {
        match self {
            OperationCommand::Play => Some("player/set_play_state?pid={$PLAYER_PID}&state=play"),
            OperationCommand::Pause => Some("player/set_play_state?pid={$PLAYER_PID}&state=pause"),
            OperationCommand::Stop => Some("player/set_play_state?pid={$PLAYER_PID}&state=stop"),
            OperationCommand::TrackUp => Some("player/play_next?pid={$PLAYER_PID}"),
            OperationCommand::TrackDown => Some("player/play_previous?pid={$PLAYER_PID}"),
            _ => None,
        }
    }

    /// Commands that change the navigable list.
    pub fn affects_media_list(self) -> bool {
        !matches!(
            self,
            OperationCommand::Play
                | OperationCommand::Stop
                | OperationCommand::Pause
                | OperationCommand::PlayPause
                | OperationCommand::TrackUp
                | OperationCommand::TrackDown
                | OperationCommand::FastForward
                | OperationCommand::Rewind
                | OperationCommand::Repeat
                | OperationCommand::Random
                | OperationCommand::RepeatShuffle
        )
    }
}

code_enum! {
    /// Amplifier keys (`CAP`).
    AmpCommand {
        VolumeUp => "MVLUP",
        VolumeDown => "MVLDOWN",
        InputUp => "SLIUP",
        InputDown => "SLIDOWN",
        MutingOn => "AMTON",
        MutingOff => "AMTOFF",
        MutingToggle => "AMTTG",
        PowerOn => "PWRON",
        PowerOff => "PWROFF",
        PowerToggle => "PWRTG",
    }
}

code_enum! {
    /// On-screen setup keys (`OSD`).
    SetupCommand {
        Menu => "MENU",
        Up => "UP",
        Down => "DOWN",
        Right => "RIGHT",
        Left => "LEFT",
        Enter => "ENTER",
        Exit => "EXIT",
        Home => "HOME",
        Quick => "QUICK",
    }
}

impl SetupCommand {
    /// Denon equivalent, sent through the `formiPhoneApp` HTTP endpoint.
    pub fn dcp_code(self) -> Option<&'static str> {
        match self {
            SetupCommand::Menu => Some("MNMEN ON"),
            SetupCommand::Up => Some("MNCUP"),
            SetupCommand::Down => Some("MNCDN"),
            SetupCommand::Left => Some("MNCLT"),
            SetupCommand::Right => Some("MNCRT"),
            SetupCommand::Enter => Some("MNENT"),
            SetupCommand::Exit => Some("MNRTN"),
            SetupCommand::Quick => Some("MNOPT"),
            SetupCommand::Home => None,
        }
    }
}
