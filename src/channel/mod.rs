//! Transport channels
//!
//! A [`Channel`] owns the sockets to one receiver. Its tasks read bytes, reassemble frames, decode
//! them into [`Inbound`] messages for the session's single inbound queue, and drain a bounded
//! outbound queue of [`Request`]s. A closed connection ends the channel; there is no reconnect.

pub mod dcp;
pub mod http;
pub mod iscp;

use anyhow::{anyhow, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::messages::{Inbound, Message, Request};
use crate::protocol::{ProtocolType, DCP_HEOS_PORT, DCP_HTTP_FALLBACK_PORT, DCP_HTTP_PORT};

/// Capacity of the inbound and outbound queues.
pub const QUEUE_SIZE: usize = 4096;
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_BUFFER_SIZE: usize = 4096;

pub type InboundSender = mpsc::Sender<Inbound>;
pub type InboundReceiver = mpsc::Receiver<Inbound>;

/// Creates the session's inbound queue.
pub fn inbound_queue() -> (InboundSender, InboundReceiver) {
    mpsc::channel(QUEUE_SIZE)
}

pub(crate) async fn connect_tcp(host: &str, port: u16) -> Result<TcpStream> {
    let addr = format!("{}:{}", host, port);
    timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
        .await
        .map_err(|_| anyhow!("Connection timeout"))?
        .map_err(|e| anyhow!("Connection to {} failed: {}", addr, e))
}

/// Inbound codes a channel forwards.
#[derive(Debug, Clone, Default)]
pub enum CodeFilter {
    #[default]
    All,
    Only(HashSet<String>),
}

impl CodeFilter {
    pub fn only(codes: &[&str]) -> Self {
        CodeFilter::Only(codes.iter().map(|c| c.to_string()).collect())
    }

    pub fn allows(&self, message: &Message) -> bool {
        match self {
            CodeFilter::All => true,
            CodeFilter::Only(codes) => {
                matches!(message, Message::Disconnected) || codes.contains(message.code())
            }
        }
    }
}

/// Connection settings beyond host and port.
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Zone used for DCP lines that carry none.
    pub zone: usize,
    pub filter: CodeFilter,
    pub heos_port: u16,
    /// DCP HTTP ports, tried in order.
    pub http_ports: Vec<u16>,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            zone: 0,
            filter: CodeFilter::All,
            heos_port: DCP_HEOS_PORT,
            http_ports: vec![DCP_HTTP_PORT, DCP_HTTP_FALLBACK_PORT],
        }
    }
}

/// Where a channel's tasks deliver decoded messages.
#[derive(Clone)]
pub(crate) struct Sink {
    host: String,
    port: u16,
    inbound: InboundSender,
    filter: CodeFilter,
}

impl Sink {
    /// Returns false once the session stopped listening.
    pub(crate) async fn push(&self, message: Message, params: String) -> bool {
        if !self.filter.allows(&message) {
            debug!("{}:{} filtered {}", self.host, self.port, message.code());
            return true;
        }
        self.inbound
            .send(Inbound::new(&self.host, self.port, message, params))
            .await
            .is_ok()
    }

    pub(crate) async fn disconnected(&self) {
        let _ = self
            .inbound
            .send(Inbound::disconnected(&self.host, self.port))
            .await;
    }
}

/// Everything a connection needs once its tasks start.
pub(crate) struct ChannelContext {
    pub sink: Sink,
    pub zone: usize,
    pub outbound: mpsc::Receiver<Request>,
    pub shutdown: CancellationToken,
}

enum Connection {
    Iscp(iscp::IscpConnection),
    Dcp(dcp::DcpConnection),
}

/// One connected receiver.
pub struct Channel {
    host: String,
    port: u16,
    protocol: ProtocolType,
    outbound: mpsc::Sender<Request>,
    shutdown: CancellationToken,
    http: Option<Arc<http::DcpHttpClient>>,
    pending: Mutex<Option<(Connection, ChannelContext)>>,
    started: AtomicBool,
}

impl Channel {
    /// Opens the sockets. Nothing is read or written before [`Channel::start`].
    pub async fn connect(
        protocol: ProtocolType,
        host: &str,
        port: u16,
        inbound: InboundSender,
        options: ChannelOptions,
    ) -> Result<Self> {
        let (connection, http) = match protocol {
            ProtocolType::Iscp => (
                Connection::Iscp(iscp::IscpConnection::open(host, port).await?),
                None,
            ),
            ProtocolType::Dcp => {
                let http = Arc::new(http::DcpHttpClient::with_ports(host, &options.http_ports)?);
                let connection =
                    dcp::DcpConnection::open(host, port, options.heos_port, http.clone()).await?;
                (Connection::Dcp(connection), Some(http))
            }
        };
        info!("Connected to {} receiver at {}:{}", protocol_name(protocol), host, port);

        let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_SIZE);
        let shutdown = CancellationToken::new();
        let ctx = ChannelContext {
            sink: Sink {
                host: host.to_string(),
                port,
                inbound,
                filter: options.filter,
            },
            zone: options.zone,
            outbound: outbound_rx,
            shutdown: shutdown.clone(),
        };
        Ok(Self {
            host: host.to_string(),
            port,
            protocol,
            outbound: outbound_tx,
            shutdown,
            http,
            pending: Mutex::new(Some((connection, ctx))),
            started: AtomicBool::new(false),
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

    /// HTTP endpoint of a DCP receiver. Its writer sends through the same client, so a port
    /// found by [`http::DcpHttpClient::fetch_device_info`] applies to every later command.
    pub fn http(&self) -> Option<Arc<http::DcpHttpClient>> {
        self.http.clone()
    }

    pub fn is_from(&self, host: &str, port: u16) -> bool {
        self.host == host && self.port == port
    }

    /// Spawns the read and write tasks. Calling it again does nothing.
    pub async fn start(&self) {
        let Some((connection, ctx)) = self.pending.lock().await.take() else {
            return;
        };
        self.started.store(true, Ordering::SeqCst);
        match connection {
            Connection::Iscp(c) => c.spawn(ctx),
            Connection::Dcp(c) => c.spawn(ctx),
        }
    }

    /// Cancels the channel tasks. Idempotent and callable from anywhere.
    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            debug!("Stopping channel {}:{}", self.host, self.port);
            self.shutdown.cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.shutdown.is_cancelled()
    }

    /// Queues a request, waiting while the outbound queue is full.
    pub async fn send(&self, request: Request) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(anyhow!("Channel {}:{} is stopped", self.host, self.port));
        }
        self.outbound
            .send(request)
            .await
            .map_err(|_| anyhow!("Channel {}:{} is closed", self.host, self.port))
    }

    /// Token cancelled when the channel ends for any reason.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn protocol_name(protocol: ProtocolType) -> &'static str {
    match protocol {
        ProtocolType::Iscp => "ISCP",
        ProtocolType::Dcp => "DCP",
    }
}

/// Logs a socket read failure and reports whether the loop should end.
pub(crate) fn read_failed(host: &str, port: u16, result: &std::io::Result<usize>) -> bool {
    match result {
        Ok(0) => {
            info!("{}:{} closed the connection", host, port);
            true
        }
        Ok(_) => false,
        Err(e) => {
            warn!("{}:{} read error: {}", host, port, e);
            true
        }
    }
}

pub(crate) fn read_buffer() -> Vec<u8> {
    vec![0u8; READ_BUFFER_SIZE]
}
