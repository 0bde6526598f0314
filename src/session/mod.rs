//! Session controller
//!
//! A [`Session`] owns the channel to one receiver and the only mutable [`SessionState`]. Its
//! background task pulls decoded messages off the inbound queue, applies them, sends the
//! follow-up queries each transition calls for, runs the session scripts and hands coalesced
//! change batches to the [`SessionListener`] together with an immutable snapshot.

pub mod scripts;

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::bus::SessionListener;
use crate::channel::http::DcpHttpClient;
use crate::channel::{
    inbound_queue, Channel, ChannelOptions, CodeFilter, InboundReceiver, InboundSender,
    QUEUE_SIZE,
};
use crate::config::ReceiverCache;
use crate::discovery::DeviceDescriptor;
use crate::messages::navigation::PLAYQUEUE_SID;
use crate::messages::{
    DcpReceiverUpdate, Inbound, JacketArt, LayerInfo, ListTitleInfo, MediaContainer, Message,
    OperationCommand, PlayStatus, PrivacyPolicy, Query, Request, ServiceType, TunerMode, UiType,
};
use crate::protocol::ProtocolType;
use crate::state::{ChangeType, SessionState};

use scripts::{AllStandby, AutoPower, ListeningModeRetry, ScriptAction, SessionScript, ShortcutScript};

/// Delay between the first change and its notification.
pub const COALESCE_DELAY: Duration = Duration::from_millis(500);
/// Time given to the writer to flush exit commands before the channel closes.
const STOP_FLUSH_DELAY: Duration = Duration::from_millis(300);
const COMMAND_QUEUE_SIZE: usize = 64;

/// Codes forwarded from multiroom companions.
const COMPANION_CODES: &[&str] = &["MDI", "NFN"];

const ISCP_POWER_QUERIES: &[Query] = &[
    Query::PowerStatus,
    Query::FirmwareUpdate,
    Query::ReceiverInformation,
    Query::FriendlyName,
    Query::InputSelector,
    Query::AudioMuting,
    Query::PrivacyPolicy,
];
const ISCP_SETTINGS_QUERIES: &[Query] = &[
    Query::DimmerLevel,
    Query::DigitalFilter,
    Query::AutoPower,
    Query::HdmiCec,
    Query::NetworkStandBy,
    Query::PhaseMatchingBass,
];
/// Zone-scoped amplifier state, asked for once the zone is on.
const ISCP_AUDIO_QUERIES: &[Query] = &[
    Query::MasterVolume,
    Query::ToneCommand,
    Query::SpeakerA,
    Query::SpeakerB,
    Query::SubwooferLevel,
    Query::CenterLevel,
    Query::LateNight,
];
const ISCP_PLAY_QUERIES: &[Query] = &[
    Query::PlayStatus,
    Query::ListeningMode,
    Query::AudioInformation,
    Query::VideoInformation,
];
const ISCP_TRACK_QUERIES: &[Query] = &[
    Query::ArtistName,
    Query::AlbumName,
    Query::TitleName,
    Query::FileFormat,
    Query::TrackInfo,
    Query::TimeInfo,
    Query::MenuStatus,
];

const DCP_POWER_QUERIES: &[Query] = &[
    Query::DcpReceiverInformation,
    Query::PowerStatus,
    Query::InputSelector,
    Query::AudioMuting,
];
const DCP_AUDIO_QUERIES: &[Query] = &[Query::MasterVolume, Query::ToneCommand];
const DCP_SETTINGS_QUERIES: &[Query] = &[
    Query::DimmerLevel,
    Query::SleepTimer,
    Query::HdmiCec,
    Query::DcpEcoMode,
    Query::DcpAudioRestorer,
    Query::DcpAllZoneStereo,
];
const DCP_PLAY_QUERIES: &[Query] = &[Query::PlayStatus, Query::ListeningMode, Query::DcpTunerMode];
const DCP_TRACK_QUERIES: &[Query] = &[Query::DcpMediaItem];
const DCP_TUNER_QUERIES: &[Query] = &[
    Query::PresetCommand,
    Query::TuningCommand,
    Query::RadioStationName,
];

#[derive(Debug, Clone, Copy)]
enum QueryGroup {
    Power,
    Settings,
    Audio,
    Play,
    Track,
}

fn query_group(protocol: ProtocolType, group: QueryGroup) -> &'static [Query] {
    match (protocol, group) {
        (ProtocolType::Iscp, QueryGroup::Power) => ISCP_POWER_QUERIES,
        (ProtocolType::Iscp, QueryGroup::Settings) => ISCP_SETTINGS_QUERIES,
        (ProtocolType::Iscp, QueryGroup::Audio) => ISCP_AUDIO_QUERIES,
        (ProtocolType::Iscp, QueryGroup::Play) => ISCP_PLAY_QUERIES,
        (ProtocolType::Iscp, QueryGroup::Track) => ISCP_TRACK_QUERIES,
        (ProtocolType::Dcp, QueryGroup::Power) => DCP_POWER_QUERIES,
        (ProtocolType::Dcp, QueryGroup::Settings) => DCP_SETTINGS_QUERIES,
        (ProtocolType::Dcp, QueryGroup::Audio) => DCP_AUDIO_QUERIES,
        (ProtocolType::Dcp, QueryGroup::Play) => DCP_PLAY_QUERIES,
        (ProtocolType::Dcp, QueryGroup::Track) => DCP_TRACK_QUERIES,
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Connecting,
    Active,
    Stopping,
    Stopped,
}

/// How a session behaves beyond plain state tracking.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub zone: usize,
    pub auto_power: bool,
    pub standby_on_exit: bool,
    pub listening_mode_retry: bool,
    pub multiroom: bool,
    pub script: Option<ShortcutScript>,
    /// Receiver-information cache read before connecting and refreshed on new information.
    pub cache: Option<ReceiverCache>,
    /// Transport settings; the zone is taken from `zone`.
    pub channel: ChannelOptions,
    pub coalesce_delay: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            zone: 0,
            auto_power: false,
            standby_on_exit: false,
            listening_mode_retry: true,
            multiroom: true,
            script: None,
            cache: None,
            channel: ChannelOptions::default(),
            coalesce_delay: COALESCE_DELAY,
        }
    }
}

impl SessionOptions {
    fn scripts(&self, protocol: ProtocolType) -> Vec<Box<dyn SessionScript>> {
        let mut scripts: Vec<Box<dyn SessionScript>> = Vec::new();
        if self.auto_power {
            scripts.push(Box::new(AutoPower::default()));
        }
        if self.standby_on_exit {
            scripts.push(Box::new(AllStandby));
        }
        if self.listening_mode_retry {
            scripts.push(Box::new(ListeningModeRetry::default()));
        }
        if let Some(script) = &self.script {
            scripts.push(Box::new(script.clone()));
        }
        scripts.retain(|s| {
            let supported = s.supports(protocol);
            if !supported {
                debug!("Script {} not used with {:?}", s.name(), protocol);
            }
            supported
        });
        scripts
    }
}

enum Command {
    Send(Request),
    SendGroup(Request),
    PlayQueue { request: Request, repeat: bool },
    TrackCommand { command: OperationCommand, back_to_list: bool },
    SkipTimeMessages(u32),
    AddCompanion(DeviceDescriptor),
    CompanionReady(Channel),
}

/// Handle to a running session.
pub struct Session {
    host: String,
    port: u16,
    protocol: ProtocolType,
    commands: mpsc::Sender<Command>,
    shutdown: CancellationToken,
    status: watch::Receiver<SessionStatus>,
    state: watch::Receiver<Arc<SessionState>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Connects to the receiver and starts the session task.
    pub async fn connect(
        protocol: ProtocolType,
        host: &str,
        port: u16,
        options: SessionOptions,
        listener: Arc<dyn SessionListener>,
    ) -> Result<Self> {
        let (status_tx, status_rx) = watch::channel(SessionStatus::Connecting);
        let (inbound_tx, inbound_rx) = inbound_queue();
        let channel_options = ChannelOptions {
            zone: options.zone,
            ..options.channel.clone()
        };
        let channel = Channel::connect(protocol, host, port, inbound_tx.clone(), channel_options)
            .await
            .map_err(|e| {
                status_tx.send_replace(SessionStatus::Stopped);
                e
            })?;

        let mut state = SessionState::new(protocol, host, port, options.zone);
        if let Some(xml) = options.cache.as_ref().and_then(|c| c.load(host)) {
            match state.bootstrap(&xml) {
                Ok(_) => info!("Loaded cached receiver information for {}", host),
                Err(e) => warn!("Ignoring cached receiver information for {}: {}", host, e),
            }
        }

        let (state_tx, state_rx) = watch::channel(Arc::new(state.clone()));
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let (timers_tx, timers_rx) = mpsc::channel(QUEUE_SIZE);
        let shutdown = CancellationToken::new();
        let http = channel.http();
        let cover_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        let controller = Controller {
            scripts: options.scripts(protocol),
            state,
            channel,
            companions: HashMap::new(),
            inbound_tx,
            inbound_rx,
            commands_tx: commands_tx.clone(),
            commands_rx,
            timers_tx,
            timers_rx,
            shutdown: shutdown.clone(),
            listener,
            status_tx,
            state_tx,
            http,
            cover_client,
            pending: Vec::new(),
            deadline: None,
            skip_time_messages: 0,
            xml_req_id: 0,
            request_xml_list: false,
            circle_play_queue: None,
            last_continuation: None,
            options,
        };
        let span = info_span!("session", host = %host, port = port);
        let task = tokio::spawn(controller.run().instrument(span));

        Ok(Self {
            host: host.to_string(),
            port,
            protocol,
            commands: commands_tx,
            shutdown,
            status: status_rx,
            state: state_rx,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn protocol(&self) -> ProtocolType {
        self.protocol
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.status() == SessionStatus::Active
    }

    /// Snapshot published with the last notification.
    pub fn state(&self) -> Arc<SessionState> {
        self.state.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    pub fn watch_state(&self) -> watch::Receiver<Arc<SessionState>> {
        self.state.clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    async fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("Session {}:{} is stopped", self.host, self.port))
    }

    /// Sends a request to the receiver.
    pub async fn send(&self, request: Request) -> Result<()> {
        self.command(Command::Send(request)).await
    }

    pub async fn send_message(&self, message: Message) -> Result<()> {
        self.send(Request::Send(message)).await
    }

    pub async fn query(&self, query: Query) -> Result<()> {
        let zone = self.state().active_zone;
        self.send(Request::query(query, zone)).await
    }

    /// Sends a request to this receiver and every companion in its multiroom group.
    pub async fn send_group(&self, request: Request) -> Result<()> {
        self.command(Command::SendGroup(request)).await
    }

    /// Sends a play queue command; with `repeat` it is resent whenever the list reappears.
    pub async fn send_play_queue(&self, request: Request, repeat: bool) -> Result<()> {
        self.command(Command::PlayQueue { request, repeat }).await
    }

    /// Sends a track menu command, opening the list first when in playback view.
    pub async fn send_track_command(
        &self,
        command: OperationCommand,
        back_to_list: bool,
    ) -> Result<()> {
        self.command(Command::TrackCommand {
            command,
            back_to_list,
        })
        .await
    }

    /// Ignores the next `count` time reports, e.g. right after a seek.
    pub async fn skip_time_messages(&self, count: u32) -> Result<()> {
        self.command(Command::SkipTimeMessages(count)).await
    }

    /// Follows a multiroom companion found by discovery.
    pub async fn add_companion(&self, device: DeviceDescriptor) -> Result<()> {
        self.command(Command::AddCompanion(device)).await
    }

    /// Ends the session. Idempotent.
    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Stopping session {}:{}", self.host, self.port);
            self.shutdown.cancel();
        }
    }

    /// Waits until the session task has finished.
    pub async fn wait(&self) {
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Session task failed: {}", e);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct Controller {
    options: SessionOptions,
    scripts: Vec<Box<dyn SessionScript>>,
    state: SessionState,
    channel: Channel,
    companions: HashMap<String, Channel>,
    inbound_tx: InboundSender,
    inbound_rx: InboundReceiver,
    commands_tx: mpsc::Sender<Command>,
    commands_rx: mpsc::Receiver<Command>,
    timers_tx: mpsc::Sender<(usize, usize)>,
    timers_rx: mpsc::Receiver<(usize, usize)>,
    shutdown: CancellationToken,
    listener: Arc<dyn SessionListener>,
    status_tx: watch::Sender<SessionStatus>,
    state_tx: watch::Sender<Arc<SessionState>>,
    http: Option<Arc<DcpHttpClient>>,
    cover_client: reqwest::Client,

    pending: Vec<ChangeType>,
    deadline: Option<Instant>,
    skip_time_messages: u32,
    xml_req_id: u32,
    request_xml_list: bool,
    circle_play_queue: Option<Request>,
    /// Last partial container continued, as (sid, cid, start).
    last_continuation: Option<(String, String, u32)>,
}

impl Controller {
    async fn run(mut self) {
        self.status_tx.send_replace(SessionStatus::Active);
        info!("Session started");
        self.channel.start().await;
        self.request_initial_state().await;

        for index in 0..self.scripts.len() {
            let actions = self.scripts[index].start(&self.state);
            self.apply_script_actions(index, actions).await;
        }

        let channel_closed = self.channel.shutdown_token();
        loop {
            let deadline = self.deadline;
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                Some(inbound) = self.inbound_rx.recv() => {
                    if !self.handle_inbound(inbound).await {
                        break;
                    }
                }
                Some(command) = self.commands_rx.recv() => self.handle_command(command).await,
                Some((script, token)) = self.timers_rx.recv() => {
                    if let Some(s) = self.scripts.get_mut(script) {
                        let actions = s.timer_expired(token, &self.state);
                        self.apply_script_actions(script, actions).await;
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.deliver().await;
                }
                _ = channel_closed.cancelled(), if self.inbound_rx.is_empty() => {
                    // The reader reports the disconnect through the inbound queue; this only
                    // catches a writer failure.
                    if !self.drain_disconnect().await {
                        break;
                    }
                }
            }
        }

        self.finish().await;
    }

    /// Handles a channel that closed without queuing a disconnect.
    async fn drain_disconnect(&mut self) -> bool {
        tokio::select! {
            Some(inbound) = self.inbound_rx.recv() => self.handle_inbound(inbound).await,
            _ = sleep(Duration::from_millis(100)) => {
                warn!("Channel closed");
                self.listener
                    .on_device_disconnected(&self.state.host, self.state.port)
                    .await;
                false
            }
        }
    }

    async fn finish(&mut self) {
        self.status_tx.send_replace(SessionStatus::Stopping);
        if !self.pending.is_empty() {
            self.deliver().await;
        }

        if self.channel.is_active() {
            let mut sent = false;
            for index in 0..self.scripts.len() {
                for request in self.scripts[index].finish(&self.state) {
                    self.send(request).await;
                    sent = true;
                }
            }
            if sent {
                sleep(STOP_FLUSH_DELAY).await;
            }
        }

        self.channel.stop();
        for (host, companion) in self.companions.drain() {
            debug!("Closing companion {}", host);
            companion.stop();
        }
        self.status_tx.send_replace(SessionStatus::Stopped);
        info!("Session stopped");
        self.listener
            .on_manager_stopped(&self.state.host, self.state.port)
            .await;
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    async fn send(&self, request: Request) {
        debug!("Sending {}", request.label());
        if let Err(e) = self.channel.send(request).await {
            warn!("{}", e);
        }
    }

    async fn send_queries(&self, group: QueryGroup) {
        debug!("Requesting {:?} state", group);
        let zone = self.state.active_zone;
        for query in query_group(self.state.protocol, group) {
            self.send(Request::query(*query, zone)).await;
        }
    }

    async fn request_initial_state(&mut self) {
        let zone = self.state.active_zone;
        match self.state.protocol {
            ProtocolType::Iscp => {
                self.send(Request::raw("NJA", JacketArt::REQUEST_LINK)).await;
                self.send_queries(QueryGroup::Power).await;
                self.send_queries(QueryGroup::Settings).await;
                self.send(Request::query(Query::ListeningMode, zone)).await;
            }
            ProtocolType::Dcp => {
                self.send_queries(QueryGroup::Power).await;
                self.send_queries(QueryGroup::Settings).await;
                self.send(Request::query(Query::ListeningMode, zone)).await;
                self.fetch_dcp_receiver_info();
            }
        }
    }

    /// Loads `Deviceinfo.xml` and zone names over HTTP and feeds them back as messages.
    fn fetch_dcp_receiver_info(&self) {
        let Some(http) = self.http.clone() else {
            return;
        };
        let host = self.state.host.clone();
        let port = self.state.port;
        let inbound = self.inbound_tx.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let fetch = async {
                match http.fetch_device_info().await {
                    Ok(info) => {
                        let msg = Message::ReceiverInformation(Box::new(info));
                        let _ = inbound.send(Inbound::new(&host, port, msg, "")).await;
                    }
                    Err(e) => warn!("DCP receiver information not available: {}", e),
                }
                match http.fetch_zone_names().await {
                    Ok(names) if !names.is_empty() => {
                        let msg =
                            Message::DcpReceiverInformation(DcpReceiverUpdate::ZoneNames(names));
                        let _ = inbound.send(Inbound::new(&host, port, msg, "")).await;
                    }
                    Ok(_) => {}
                    Err(e) => debug!("DCP zone names not available: {}", e),
                }
            };
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = fetch => {}
            }
        });
    }

    /// Starts a list title request and asks for the XML list once it arrives.
    async fn request_list_state(&mut self) {
        self.request_xml_list = true;
        if self.state.protocol == ProtocolType::Iscp {
            self.send(Request::query(Query::ListTitleInfo, self.state.active_zone))
                .await;
        }
    }

    async fn request_xml_list_state(&mut self, title: &ListTitleInfo) {
        self.request_xml_list = false;
        if title.service == ServiceType::Net && title.layer == LayerInfo::NetTop {
            debug!("XML list request skipped at network top");
        } else if matches!(
            title.ui_type,
            UiType::Playback | UiType::Menu | UiType::Popup | UiType::Keyboard
        ) {
            debug!("XML list request skipped in {:?} view", title.ui_type);
        } else if title.layers > 0 {
            self.send_xml_list_request(title.layers, title.items).await;
        }
    }

    async fn send_xml_list_request(&mut self, layer: u32, items: u32) {
        let sequence = self.xml_req_id;
        self.xml_req_id = self.xml_req_id.wrapping_add(1);
        debug!("Requesting XML list #{} layer {} items {}", sequence, layer, items);
        self.send(Request::Send(Message::XmlListRequest {
            sequence,
            layer,
            start: 0,
            end: items,
        }))
        .await;
    }

    fn fetch_cover(&self, url: String) {
        let client = self.cover_client.clone();
        let host = self.state.host.clone();
        let port = self.state.port;
        let inbound = self.inbound_tx.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let fetch = async {
                let resp = client.get(&url).send().await?;
                if !resp.status().is_success() {
                    return Err(anyhow!("HTTP {}", resp.status()));
                }
                Ok::<_, anyhow::Error>(resp.bytes().await?.to_vec())
            };
            let result = tokio::select! {
                _ = shutdown.cancelled() => return,
                r = fetch => r,
            };
            match result {
                Ok(bytes) => {
                    debug!("Fetched cover {} ({} bytes)", url, bytes.len());
                    let msg = Message::CoverFetched(bytes);
                    let _ = inbound.send(Inbound::new(&host, port, msg, url)).await;
                }
                Err(e) => warn!("Cover download from {} failed: {}", url, e),
            }
        });
    }

    // ========================================================================
    // Commands
    // ========================================================================

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send(request) => {
                self.circle_play_queue = None;
                if request.has_media_impact() {
                    self.request_xml_list = true;
                }
                self.send(request).await;
            }
            Command::SendGroup(request) => {
                let members = self.state.group_members();
                for host in &members {
                    match self.companions.get(host) {
                        Some(companion) => {
                            if let Err(e) = companion.send(request.clone()).await {
                                warn!("Group command to {} failed: {}", host, e);
                            }
                        }
                        None => debug!("Group member {} has no channel", host),
                    }
                }
                self.send(request).await;
            }
            Command::PlayQueue { request, repeat } => {
                if repeat {
                    info!("Starting repeat mode: {}", request.label());
                    self.circle_play_queue = Some(request.clone());
                }
                self.request_xml_list = true;
                self.send(request).await;
            }
            Command::TrackCommand {
                command,
                back_to_list,
            } => {
                let list = || Request::Send(Message::OperationCommand(OperationCommand::List));
                if !self.state.is_playback_mode() {
                    self.send(list()).await;
                }
                self.send(Request::Send(Message::OperationCommand(command)))
                    .await;
                if back_to_list {
                    self.send(list()).await;
                }
            }
            Command::SkipTimeMessages(count) => self.skip_time_messages = count,
            Command::AddCompanion(device) => self.add_companion(device),
            Command::CompanionReady(channel) => {
                let host = channel.host().to_string();
                if self.companions.contains_key(&host) || self.shutdown.is_cancelled() {
                    channel.stop();
                    return;
                }
                channel.start().await;
                if let Err(e) = channel
                    .send(Request::query(Query::MultiroomDeviceInformation, 0))
                    .await
                {
                    warn!("Companion {} query failed: {}", host, e);
                }
                info!("Following multiroom companion {}", host);
                self.companions.insert(host, channel);
            }
        }
    }

    fn add_companion(&self, device: DeviceDescriptor) {
        if !self.options.multiroom
            || device.protocol != ProtocolType::Iscp
            || self.state.protocol != ProtocolType::Iscp
            || device.host == self.state.host
            || self.companions.contains_key(&device.host)
        {
            return;
        }
        let inbound = self.inbound_tx.clone();
        let commands = self.commands_tx.clone();
        let shutdown = self.shutdown.clone();
        let options = ChannelOptions {
            zone: 0,
            filter: CodeFilter::only(COMPANION_CODES),
            ..self.options.channel.clone()
        };
        tokio::spawn(async move {
            let connect = Channel::connect(
                ProtocolType::Iscp,
                &device.host,
                device.port,
                inbound,
                options,
            );
            let channel = tokio::select! {
                _ = shutdown.cancelled() => return,
                c = connect => c,
            };
            match channel {
                Ok(channel) => {
                    let _ = commands.send(Command::CompanionReady(channel)).await;
                }
                Err(e) => warn!("Companion {} not reachable: {}", device.host, e),
            }
        });
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Returns false when the session has to end.
    async fn handle_inbound(&mut self, inbound: Inbound) -> bool {
        let primary = inbound.is_from(&self.state.host, self.state.port);

        if inbound.message == Message::Disconnected {
            if primary {
                warn!("Receiver disconnected");
                self.listener
                    .on_device_disconnected(&self.state.host, self.state.port)
                    .await;
                return false;
            }
            if let Some(companion) = self.companions.remove(&inbound.host) {
                info!("Companion {} disconnected", inbound.host);
                companion.stop();
            }
            return true;
        }

        if matches!(inbound.message, Message::TimeInfo(_)) && self.skip_time_messages > 0 {
            self.skip_time_messages -= 1;
            return true;
        }

        let play_status = self.state.play_status;
        let tuner_mode = self.state.tuner_mode;
        let change = self.state.update(&inbound);
        if change != ChangeType::None {
            self.record_change(change);
        }

        if let Some(url) = self.state.take_pending_cover_url() {
            self.fetch_cover(url);
        }

        if primary {
            if change == ChangeType::ReceiverInfo
                && matches!(inbound.message, Message::ReceiverInformation(_))
            {
                self.store_receiver_info();
            }
            self.follow_up(&inbound, change, play_status, tuner_mode)
                .await;
        }

        for index in 0..self.scripts.len() {
            let actions = self.scripts[index].process(&inbound, &self.state);
            self.apply_script_actions(index, actions).await;
        }
        true
    }

    fn record_change(&mut self, change: ChangeType) {
        if !self.pending.contains(&change) {
            self.pending.push(change);
        }
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.options.coalesce_delay);
        }
    }

    async fn deliver(&mut self) {
        self.deadline = None;
        if self.pending.is_empty() {
            return;
        }
        let changes = std::mem::take(&mut self.pending);
        let snapshot = Arc::new(self.state.clone());
        self.state_tx.send_replace(snapshot.clone());
        debug!("State changed: {:?}", changes);
        self.listener.on_state_changed(snapshot, changes).await;
    }

    fn store_receiver_info(&self) {
        let Some(cache) = &self.options.cache else {
            return;
        };
        match self.state.info.to_xml() {
            Ok(xml) => {
                if let Err(e) = cache.store(&self.state.host, &xml) {
                    warn!("Failed to cache receiver information: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize receiver information: {}", e),
        }
    }

    async fn follow_up(
        &mut self,
        inbound: &Inbound,
        change: ChangeType,
        previous_play: PlayStatus,
        previous_tuner: Option<TunerMode>,
    ) {
        if !self.state.is_on() {
            return;
        }

        match &inbound.message {
            Message::TrackInfo(_) => {
                // The next list title brings the matching XML list.
                self.request_xml_list = true;
                return;
            }
            Message::ListInfo(_) => {
                if self.state.is_usb()
                    && self.state.is_top_layer()
                    && !self.state.is_list_info_consistent()
                {
                    debug!("USB list incomplete, requesting XML list");
                    let (layers, items) = (self.state.number_of_layers, self.state.number_of_items);
                    self.send_xml_list_request(layers, items).await;
                }
            }
            Message::PlayStatus(_)
                if self.state.protocol == ProtocolType::Iscp
                    && self.state.is_playback_mode()
                    && self.state.is_playing() =>
            {
                self.send(Request::Send(Message::OperationCommand(OperationCommand::List)))
                    .await;
            }
            Message::DcpMediaContainer(_) => self.continue_media_container().await,
            _ => {}
        }

        if change == ChangeType::None {
            if let Message::ListTitleInfo(title) = &inbound.message {
                if self.request_xml_list {
                    self.request_xml_list_state(title).await;
                }
            }
            return;
        }

        match &inbound.message {
            Message::PowerStatus { .. } => {
                self.send_queries(QueryGroup::Audio).await;
                self.send_queries(QueryGroup::Settings).await;
                self.send_queries(QueryGroup::Play).await;
                self.request_list_state().await;
            }
            Message::PlayStatus(_) if previous_play != self.state.play_status => {
                if self.state.is_playing() {
                    self.send_queries(QueryGroup::Track).await;
                    if self.state.protocol == ProtocolType::Iscp
                        && self.state.cover.is_none()
                        && self.state.cover_url.is_none()
                    {
                        self.send(Request::raw("NJA", JacketArt::REQUEST_COVER)).await;
                    }
                    if self.state.is_media_empty() {
                        self.request_list_state().await;
                    }
                } else {
                    self.request_list_state().await;
                }
            }
            Message::ListTitleInfo(title) => {
                match self.circle_play_queue.clone() {
                    Some(request) if title.items > 0 => {
                        debug!("Repeating play queue command");
                        self.request_xml_list = true;
                        self.send(request).await;
                    }
                    _ => {
                        self.circle_play_queue = None;
                        self.request_xml_list_state(title).await;
                    }
                }
            }
            Message::PrivacyPolicy(policy) if self.state.protocol == ProtocolType::Iscp => {
                let mut flags = policy.clone();
                for p in [PrivacyPolicy::GOOGLE, PrivacyPolicy::SUE] {
                    if !flags.is_accepted(p) {
                        flags = PrivacyPolicy::decode(&flags.accept(p));
                    }
                }
                if flags != *policy {
                    info!("Accepting privacy policies {}", flags.flags);
                    self.send(Request::Send(Message::PrivacyPolicy(flags))).await;
                }
            }
            _ => {}
        }

        if self.state.protocol == ProtocolType::Dcp
            && self.state.tuner_mode.is_some()
            && self.state.tuner_mode != previous_tuner
        {
            debug!("Tuner mode {:?}, requesting tuner state", self.state.tuner_mode);
            let zone = self.state.active_zone;
            for query in DCP_TUNER_QUERIES {
                self.send(Request::query(*query, zone)).await;
            }
        }
    }

    /// Requests the rest of a browse result that arrived in parts.
    async fn continue_media_container(&mut self) {
        let Some(container) = &self.state.dcp_container else {
            return;
        };
        let received = container.items.len() as u32;
        if received == 0 || received >= container.count {
            self.last_continuation = None;
            return;
        }
        if !container.container && container.sid != PLAYQUEUE_SID {
            return;
        }
        let key = (container.sid.clone(), container.cid.clone(), received);
        if self.last_continuation.as_ref() == Some(&key) {
            return;
        }
        debug!(
            "Container sid={} cid={} has {} of {} items, requesting the rest",
            container.sid, container.cid, received, container.count
        );
        let next = MediaContainer {
            items: Vec::new(),
            start: received,
            playable: false,
            ..container.clone()
        };
        self.last_continuation = Some(key);
        self.send(Request::Send(Message::DcpMediaContainer(Box::new(next))))
            .await;
    }

    async fn apply_script_actions(&mut self, script: usize, actions: Vec<ScriptAction>) {
        for action in actions {
            match action {
                ScriptAction::Send(request) => {
                    if request.has_media_impact() {
                        self.request_xml_list = true;
                    }
                    self.send(request).await;
                }
                ScriptAction::Schedule { token, delay } => {
                    let timers = self.timers_tx.clone();
                    let shutdown = self.shutdown.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = shutdown.cancelled() => {}
                            _ = sleep(delay) => {
                                let _ = timers.send((script, token)).await;
                            }
                        }
                    });
                }
            }
        }
    }
}
