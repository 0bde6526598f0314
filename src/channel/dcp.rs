//! DCP channel: the AVR telnet socket, an optional HEOS socket and the HTTP endpoint.
//!
//! Outbound payloads are paced to one every 75 ms and routed by prefix: `heos://` commands go to
//! the HEOS socket with the player id filled in, `formiPhoneApp` commands are HTTP GETs, XML
//! documents are AppCommand POSTs and everything else is a CR-terminated AVR line.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, RwLock};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::http::DcpHttpClient;
use super::{connect_tcp, read_buffer, read_failed, ChannelContext, Sink, QUEUE_SIZE};
use crate::messages::dcp::{decode_dcp_line, GOFORM_REQUEST, HEOS_PID_PLACEHOLDER};
use crate::messages::xml::parse_zone_names;
use crate::messages::{DcpReceiverUpdate, Message, Request};
use crate::protocol::dcp::{encode_heos, encode_line, DcpDecoder, HeosMessage, HEOS_PREFIX, HEOS_SCHEME};

/// Minimum gap between two outbound payloads.
pub const DCP_SEND_DELAY: Duration = Duration::from_millis(75);

const HEOS_GET_PLAYERS: &str = "player/get_players";

type PlayerId = Arc<RwLock<Option<i64>>>;

pub(crate) struct DcpConnection {
    avr_reader: OwnedReadHalf,
    avr_writer: OwnedWriteHalf,
    heos: Option<(OwnedReadHalf, OwnedWriteHalf)>,
    http: Arc<DcpHttpClient>,
}

impl DcpConnection {
    /// Opens the AVR socket on `port`; a HEOS socket that fails to open is skipped.
    pub(crate) async fn open(
        host: &str,
        port: u16,
        heos_port: u16,
        http: Arc<DcpHttpClient>,
    ) -> Result<Self> {
        let (avr_reader, avr_writer) = connect_tcp(host, port).await?.into_split();
        let heos = match connect_tcp(host, heos_port).await {
            Ok(stream) => {
                info!("HEOS socket connected on {}:{}", host, heos_port);
                Some(stream.into_split())
            }
            Err(e) => {
                warn!("HEOS socket not available: {}", e);
                None
            }
        };
        Ok(Self {
            avr_reader,
            avr_writer,
            heos,
            http,
        })
    }

    pub(crate) fn spawn(self, ctx: ChannelContext) {
        let DcpConnection {
            avr_reader,
            avr_writer,
            heos,
            http,
        } = self;
        let ChannelContext {
            sink,
            zone,
            outbound,
            shutdown,
        } = ctx;
        let pid: PlayerId = Arc::new(RwLock::new(None));

        let (heos_reader, heos_writer) = match heos {
            Some((r, w)) => (Some(r), Some(w)),
            None => (None, None),
        };

        if let Some(reader) = heos_reader {
            let reader_ctx = ReaderContext {
                sink: sink.clone(),
                zone,
                pid: pid.clone(),
                shutdown: shutdown.clone(),
            };
            tokio::spawn(async move {
                reader_ctx.run(reader, true).await;
                info!("HEOS socket closed");
            });
        }

        let reader_ctx = ReaderContext {
            sink: sink.clone(),
            zone,
            pid: pid.clone(),
            shutdown: shutdown.clone(),
        };
        tokio::spawn(async move {
            reader_ctx.run(avr_reader, false).await;
            reader_ctx.shutdown.cancel();
            reader_ctx.sink.disconnected().await;
        });

        // HTTP commands get their own task so a slow endpoint never holds up the AVR socket.
        let (http_tx, http_rx) = mpsc::channel(QUEUE_SIZE);
        let http_sender = HttpSender {
            http,
            sink: sink.clone(),
        };
        tokio::spawn(http_sender.run(http_rx, shutdown.clone()));

        let writer = DcpWriter {
            avr: avr_writer,
            heos: heos_writer,
            http: http_tx,
            pid,
            sink,
            next_send: Instant::now(),
        };
        tokio::spawn(writer.run(outbound, shutdown));
    }
}

struct ReaderContext {
    sink: Sink,
    zone: usize,
    pid: PlayerId,
    shutdown: CancellationToken,
}

impl ReaderContext {
    async fn run(&self, mut reader: OwnedReadHalf, heos: bool) {
        let mut decoder = DcpDecoder::new();
        let mut buf = read_buffer();
        loop {
            let result = tokio::select! {
                _ = self.shutdown.cancelled() => return,
                r = reader.read(&mut buf) => r,
            };
            if read_failed(&self.sink.host, self.sink.port, &result) {
                return;
            }
            decoder.push(&buf[..result.unwrap_or(0)]);
            while let Some(line) = decoder.next_line() {
                if !self.process(line, heos).await {
                    return;
                }
            }
        }
    }

    async fn process(&self, line: String, heos: bool) -> bool {
        if line.trim().is_empty() {
            return true;
        }
        if heos && line.starts_with(HEOS_PREFIX) && self.capture_player_id(&line).await {
            return true;
        }
        let pid = *self.pid.read().await;
        let messages = decode_dcp_line(&line, self.zone, pid);
        if messages.is_empty() {
            debug!("DCP line not processed: {}", line);
            return true;
        }
        debug!("<< {}", line);
        for message in messages {
            if !self.sink.push(message, line.clone()).await {
                return false;
            }
        }
        true
    }

    /// Takes the player id from a `get_players` answer, preferring the entry for this host.
    async fn capture_player_id(&self, line: &str) -> bool {
        let Ok(msg) = HeosMessage::parse(line) else {
            return false;
        };
        if msg.command != HEOS_GET_PLAYERS {
            return false;
        }
        let Some(players) = msg.payload.as_array() else {
            warn!("HEOS players response without payload");
            return true;
        };
        let player = players
            .iter()
            .find(|p| p.get("ip").and_then(|ip| ip.as_str()) == Some(self.sink.host.as_str()))
            .or(players.first());
        match player.and_then(|p| p.get("pid")).and_then(|pid| pid.as_i64()) {
            Some(pid) => {
                info!("HEOS player id: {}", pid);
                *self.pid.write().await = Some(pid);
            }
            None => warn!("HEOS players response without pid"),
        }
        true
    }
}

struct DcpWriter {
    avr: OwnedWriteHalf,
    heos: Option<OwnedWriteHalf>,
    http: mpsc::Sender<String>,
    pid: PlayerId,
    sink: Sink,
    next_send: Instant,
}

impl DcpWriter {
    async fn run(mut self, mut outbound: mpsc::Receiver<Request>, shutdown: CancellationToken) {
        if self.heos.is_some() {
            let get_players = format!("{}{}", HEOS_SCHEME, HEOS_GET_PLAYERS);
            if let Err(e) = self.dispatch(&get_players).await {
                warn!("HEOS player request failed: {}", e);
            }
        }

        loop {
            let request = tokio::select! {
                _ = shutdown.cancelled() => break,
                r = outbound.recv() => match r {
                    Some(r) => r,
                    None => break,
                },
            };
            let payloads = request.to_dcp();
            if payloads.is_empty() {
                debug!("No DCP form for {}", request.label());
                continue;
            }
            for payload in payloads {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = sleep_until(self.next_send) => {}
                }
                if let Err(e) = self.dispatch(&payload).await {
                    warn!("DCP send failed: {}", e);
                    shutdown.cancel();
                    return;
                }
                self.next_send = Instant::now() + DCP_SEND_DELAY;
            }
        }
        let _ = self.avr.shutdown().await;
    }

    /// Routes one payload. Only AVR socket failures are fatal.
    async fn dispatch(&mut self, payload: &str) -> Result<()> {
        if payload.starts_with(HEOS_SCHEME) {
            self.send_heos(payload).await;
            return Ok(());
        }
        if payload.starts_with(GOFORM_REQUEST) || payload.starts_with('<') {
            if self.http.send(payload.to_string()).await.is_err() {
                debug!("HTTP sender gone, dropping {}", payload);
            }
            return Ok(());
        }
        debug!(">> {}", payload);
        self.avr
            .write_all(&encode_line(payload))
            .await
            .map_err(|e| anyhow!("AVR socket write failed: {}", e))
    }

    async fn send_heos(&mut self, payload: &str) {
        let Some(heos) = self.heos.as_mut() else {
            debug!("No HEOS socket, dropping {}", payload);
            return;
        };
        let cmd = if payload.contains(HEOS_PID_PLACEHOLDER) {
            match *self.pid.read().await {
                Some(pid) => payload.replace(HEOS_PID_PLACEHOLDER, &pid.to_string()),
                None => {
                    debug!("HEOS player id unknown, dropping {}", payload);
                    return;
                }
            }
        } else {
            payload.to_string()
        };
        debug!(">> {}", cmd);
        if let Err(e) = heos.write_all(&encode_heos(&cmd)).await {
            warn!("HEOS write failed: {}", e);
            self.heos = None;
        }
    }

}

/// Sends `goform` GETs and AppCommand POSTs in queue order.
struct HttpSender {
    http: Arc<DcpHttpClient>,
    sink: Sink,
}

impl HttpSender {
    async fn run(self, mut requests: mpsc::Receiver<String>, shutdown: CancellationToken) {
        loop {
            let payload = tokio::select! {
                _ = shutdown.cancelled() => break,
                r = requests.recv() => match r {
                    Some(p) => p,
                    None => break,
                },
            };
            if payload.starts_with('<') {
                self.send_app_command(payload).await;
            } else if let Err(e) = self.http.goform(&payload).await {
                warn!("DCP HTTP command {} failed: {}", payload, e);
            }
        }
    }

    async fn send_app_command(&self, xml: String) {
        let body = match self.http.app_command(xml).await {
            Ok(body) => body,
            Err(e) => {
                warn!("DCP AppCommand failed: {}", e);
                return;
            }
        };
        match parse_zone_names(&body) {
            Ok(names) if !names.is_empty() => {
                let msg = Message::DcpReceiverInformation(DcpReceiverUpdate::ZoneNames(names));
                self.sink.push(msg, body).await;
            }
            Ok(_) => {}
            Err(e) => debug!("AppCommand response not handled: {}", e),
        }
    }
}
