//! Receiver discovery on the local network
//!
//! Onkyo/Pioneer receivers answer an ISCP `ECN` `QSTN` UDP broadcast on port 60128 with
//! `model/port/area/identifier`. Denon/Marantz receivers are found with an SSDP `M-SEARCH` for
//! the ACT-Denon device type and are then reached over DCP on port 23.
//!
//! Example query with socat:
//! ```bash
//! printf 'ISCP\x00\x00\x00\x10\x00\x00\x00\x0a\x01\x00\x00\x00!xECNQSTN\n' \
//!   | socat -t3 - udp-datagram:255.255.255.255:60128,broadcast | od -c
//! ```

use anyhow::Result;
use futures::StreamExt;
use serde::Serialize;
use ssdp_client::{SearchTarget, URN};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

use crate::bus::{BusEvent, SharedBus};
use crate::config::{DiscoveryConfig, FavoriteConfig};
use crate::error::DiscoveryFailure;
use crate::messages::DeviceAnnouncement;
use crate::protocol::iscp::{self, MAGIC, QUERY};
use crate::protocol::ProtocolType;

pub const ISCP_DISCOVERY_PORT: u16 = 60128;
pub const DENON_SEARCH_TARGET: &str = "urn:schemas-denon-com:device:ACT-Denon:1";

/// Duration of one search round.
pub const ROUND_TIMEOUT: Duration = Duration::from_secs(3);

/// A non-favorite device counts as settled after this many answers.
const RESPONSES_TO_FINISH: u32 = 5;

/// Model categories queried; answers carrying one of them are our own echoes.
const QUERY_CATEGORIES: [char; 2] = ['x', 'p'];

/// A receiver seen on the network or listed as favorite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    pub host: String,
    pub port: u16,
    pub protocol: ProtocolType,
    pub model: String,
    pub identifier: String,
    pub alias: Option<String>,
    /// Answers received during this search.
    pub responses: u32,
    pub favorite: bool,
}

impl DeviceDescriptor {
    pub fn new(host: &str, port: u16, protocol: ProtocolType) -> Self {
        Self {
            host: host.to_string(),
            port,
            protocol,
            model: String::new(),
            identifier: String::new(),
            alias: None,
            responses: 0,
            favorite: false,
        }
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Alias, then model, then host.
    pub fn display_name(&self) -> &str {
        match &self.alias {
            Some(alias) if !alias.is_empty() => alias,
            _ if !self.model.is_empty() => &self.model,
            _ => &self.host,
        }
    }
}

impl From<&FavoriteConfig> for DeviceDescriptor {
    fn from(f: &FavoriteConfig) -> Self {
        let protocol = f.protocol.unwrap_or_else(|| ProtocolType::from_port(f.port));
        Self {
            alias: f.alias.clone(),
            favorite: true,
            ..Self::new(&f.host, f.port, protocol)
        }
    }
}

/// Parses a UDP answer to the ECN query.
///
/// Answers not starting with the ISCP magic, other codes and echoes of our own query
/// categories are ignored.
pub fn parse_iscp_response(data: &[u8], source: &SocketAddr) -> Option<DeviceDescriptor> {
    if !data.starts_with(MAGIC) {
        tracing::debug!("Discovery: answer from {} without leading magic", source);
        return None;
    }
    let frame = match iscp::try_extract_frame(data) {
        (Some(Ok(frame)), _) => frame,
        (Some(Err(e)), _) => {
            tracing::debug!("Discovery: bad frame from {}: {}", source, e);
            return None;
        }
        (None, _) => return None,
    };
    if frame.code != "ECN" || QUERY_CATEGORIES.contains(&frame.category) {
        return None;
    }
    match DeviceAnnouncement::decode(frame.category, &frame.params) {
        Ok(a) => Some(DeviceDescriptor {
            model: a.model,
            identifier: a.identifier,
            ..DeviceDescriptor::new(&source.ip().to_string(), a.port, ProtocolType::Iscp)
        }),
        Err(e) => {
            tracing::debug!("Discovery: {}", e);
            None
        }
    }
}

/// Builds a DCP descriptor from the location URL of an SSDP answer.
pub fn parse_ssdp_location(location: &str) -> Option<DeviceDescriptor> {
    let url = url::Url::parse(location).ok()?;
    let host = url.host_str()?;
    let protocol = ProtocolType::Dcp;
    Some(DeviceDescriptor::new(host, protocol.default_port(), protocol))
}

/// Devices found so far, deduplicated by host and port.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceDescriptor>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_favorites(favorites: &[FavoriteConfig]) -> Self {
        let mut registry = Self::new();
        for f in favorites {
            let device = DeviceDescriptor::from(f);
            registry.devices.insert(device.key(), device);
        }
        registry
    }

    /// Counts an answer; returns the descriptor when the device was not known before.
    pub fn record(&mut self, found: DeviceDescriptor) -> Option<DeviceDescriptor> {
        match self.devices.get_mut(&found.key()) {
            Some(known) => {
                known.responses += 1;
                if known.model.is_empty() {
                    known.model = found.model;
                }
                if known.identifier.is_empty() {
                    known.identifier = found.identifier;
                }
                None
            }
            None => {
                let device = DeviceDescriptor {
                    responses: 1,
                    ..found
                };
                self.devices.insert(device.key(), device.clone());
                Some(device)
            }
        }
    }

    /// True once at least one device answered and every non-favorite answered enough times.
    pub fn is_complete(&self) -> bool {
        let mut found = self.devices.values().filter(|d| !d.favorite).peekable();
        found.peek().is_some() && found.all(|d| d.responses >= RESPONSES_TO_FINISH)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Devices sorted by host and port, favorites first.
    pub fn devices(&self) -> Vec<DeviceDescriptor> {
        let mut list: Vec<DeviceDescriptor> = self.devices.values().cloned().collect();
        list.sort_by(|a, b| {
            b.favorite
                .cmp(&a.favorite)
                .then_with(|| a.host.cmp(&b.host))
                .then_with(|| a.port.cmp(&b.port))
        });
        list
    }
}

/// Network conditions checked before each search round.
pub trait NetworkMonitor: Send + Sync {
    fn is_network(&self) -> bool;
    fn is_wifi(&self) -> bool;
}

/// Treats any routable local address as a usable network. Wired networks count as wifi.
pub struct HostNetwork;

impl NetworkMonitor for HostNetwork {
    fn is_network(&self) -> bool {
        // Connecting a UDP socket sends nothing but selects a local route.
        std::net::UdpSocket::bind("0.0.0.0:0")
            .and_then(|s| {
                s.set_broadcast(true)?;
                s.connect("255.255.255.255:9")?;
                s.local_addr()
            })
            .map(|a| !a.ip().is_unspecified())
            .unwrap_or(false)
    }

    fn is_wifi(&self) -> bool {
        true
    }
}

/// Where and how long to search.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub rounds: u32,
    pub round_timeout: Duration,
    /// ISCP broadcast destination.
    pub broadcast: SocketAddr,
    pub ssdp: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            rounds: 3,
            round_timeout: ROUND_TIMEOUT,
            broadcast: SocketAddr::new(IpAddr::from([255, 255, 255, 255]), ISCP_DISCOVERY_PORT),
            ssdp: true,
        }
    }
}

impl From<&DiscoveryConfig> for DiscoveryOptions {
    fn from(c: &DiscoveryConfig) -> Self {
        Self {
            rounds: c.rounds.max(1),
            ssdp: !c.iscp_only,
            ..Self::default()
        }
    }
}

/// One search over the LAN.
pub struct DiscoverySearch {
    options: DiscoveryOptions,
    favorites: Vec<FavoriteConfig>,
    monitor: Arc<dyn NetworkMonitor>,
    bus: Option<SharedBus>,
}

impl DiscoverySearch {
    pub fn new(options: DiscoveryOptions) -> Self {
        Self {
            options,
            favorites: Vec::new(),
            monitor: Arc::new(HostNetwork),
            bus: None,
        }
    }

    pub fn with_favorites(mut self, favorites: Vec<FavoriteConfig>) -> Self {
        self.favorites = favorites;
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Publishes a [`BusEvent::DeviceFound`] for every new device.
    pub fn with_bus(mut self, bus: SharedBus) -> Self {
        self.bus = Some(bus);
        self
    }

    fn check_network(&self) -> Result<(), DiscoveryFailure> {
        if !self.monitor.is_network() {
            return Err(DiscoveryFailure::NoNetwork);
        }
        if !self.monitor.is_wifi() {
            return Err(DiscoveryFailure::NoWifi);
        }
        Ok(())
    }

    fn found(&self, registry: &mut DeviceRegistry, device: DeviceDescriptor) {
        if let Some(new) = registry.record(device) {
            tracing::info!(
                "Discovered {} at {} ({:?})",
                new.display_name(),
                new.key(),
                new.protocol
            );
            if let Some(bus) = &self.bus {
                bus.publish(BusEvent::DeviceFound(new));
            }
        }
    }

    /// Searches until every device settled, the rounds are used up or `shutdown` fires.
    ///
    /// Returns every known device, favorites included. Fails only when nothing was found.
    pub async fn run(
        &self,
        shutdown: CancellationToken,
    ) -> Result<Vec<DeviceDescriptor>, DiscoveryFailure> {
        let mut registry = DeviceRegistry::with_favorites(&self.favorites);
        if let Some(bus) = &self.bus {
            for favorite in registry.devices() {
                bus.publish(BusEvent::DeviceFound(favorite));
            }
        }

        if let Err(reason) = self.check_network() {
            return self.finish(&registry, reason);
        }
        let socket = match open_socket().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Discovery socket not available: {}", e);
                return self.finish(&registry, DiscoveryFailure::NoNetwork);
            }
        };

        let (ssdp_tx, mut ssdp_rx) = tokio::sync::mpsc::channel::<DeviceDescriptor>(64);

        for round in 0..self.options.rounds {
            if let Err(reason) = self.check_network() {
                return self.finish(&registry, reason);
            }
            tracing::debug!("Discovery round {} of {}", round + 1, self.options.rounds);

            for category in QUERY_CATEGORIES {
                if let Err(e) = send_query(&socket, category, self.options.broadcast).await {
                    tracing::warn!("Discovery query to {} failed: {}", self.options.broadcast, e);
                }
            }
            if self.options.ssdp {
                spawn_ssdp_search(self.options.round_timeout, ssdp_tx.clone(), shutdown.clone());
            }

            let deadline = Instant::now() + self.options.round_timeout;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Discovery cancelled");
                        return self.finish(&registry, DiscoveryFailure::NoDevice);
                    }
                    _ = tokio::time::sleep_until(deadline) => break,
                    Some(device) = ssdp_rx.recv() => self.found(&mut registry, device),
                    received = recv_answer(&socket) => match received {
                        Ok((data, addr)) => {
                            if let Some(device) = parse_iscp_response(&data, &addr) {
                                self.found(&mut registry, device);
                            }
                        }
                        Err(e) => tracing::debug!("Discovery recv error: {}", e),
                    },
                }
                if registry.is_complete() {
                    tracing::info!("Discovery complete: {} device(s)", registry.len());
                    return Ok(registry.devices());
                }
            }
        }

        self.finish(&registry, DiscoveryFailure::NoDevice)
    }

    fn finish(
        &self,
        registry: &DeviceRegistry,
        reason: DiscoveryFailure,
    ) -> Result<Vec<DeviceDescriptor>, DiscoveryFailure> {
        if registry.is_empty() {
            tracing::info!("Discovery failed: {}", reason);
            Err(reason)
        } else {
            tracing::info!("Discovery found {} device(s)", registry.len());
            Ok(registry.devices())
        }
    }
}

async fn open_socket() -> Result<UdpSocket> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.set_broadcast(true)?;
    Ok(socket)
}

async fn recv_answer(socket: &UdpSocket) -> std::io::Result<(Vec<u8>, SocketAddr)> {
    let mut buf = [0u8; 512];
    let (len, addr) = socket.recv_from(&mut buf).await?;
    Ok((buf[..len].to_vec(), addr))
}

async fn send_query(socket: &UdpSocket, category: char, target: SocketAddr) -> Result<()> {
    let frame = iscp::encode(category, "ECN", QUERY)
        .ok_or_else(|| anyhow::anyhow!("ECN query does not encode"))?;
    socket.send_to(&frame, target).await?;
    tracing::debug!("Sent ECN query '{}' to {}", category, target);
    Ok(())
}

fn spawn_ssdp_search(
    wait: Duration,
    found: tokio::sync::mpsc::Sender<DeviceDescriptor>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            result = timeout(wait, ssdp_search(wait, &found)) => match result {
                Ok(Err(e)) => tracing::debug!("SSDP search failed: {}", e),
                Ok(Ok(())) | Err(_) => {}
            },
        }
    });
}

async fn ssdp_search(
    wait: Duration,
    found: &tokio::sync::mpsc::Sender<DeviceDescriptor>,
) -> Result<()> {
    let urn: URN = DENON_SEARCH_TARGET.parse()?;
    let target = SearchTarget::URN(urn);
    let responses = ssdp_client::search(&target, wait, 2, None).await?;
    futures::pin_mut!(responses);

    while let Some(response) = responses.next().await {
        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("SSDP response error: {}", e);
                continue;
            }
        };
        if let Some(device) = parse_ssdp_location(response.location()) {
            if found.send(device).await.is_err() {
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_receiver_answer() {
        let frame = iscp::encode('1', "ECN", "TX-NR676E/60128/DX/0009B0E2F5DE\u{1a}").unwrap();
        let d = parse_iscp_response(&frame, &addr("192.168.1.80:60128")).unwrap();
        assert_eq!(d.host, "192.168.1.80");
        assert_eq!(d.port, 60128);
        assert_eq!(d.protocol, ProtocolType::Iscp);
        assert_eq!(d.model, "TX-NR676E");
        assert_eq!(d.identifier, "0009B0E2F5DE");
    }

    #[test]
    fn test_ignore_own_query_and_offset_frames() {
        let src = addr("192.168.1.80:60128");
        let echo = iscp::encode('x', "ECN", QUERY).unwrap();
        assert!(parse_iscp_response(&echo, &src).is_none());

        let mut shifted = vec![0u8, 0u8];
        shifted.extend_from_slice(&iscp::encode('1', "ECN", "TX/60128/DX/ID").unwrap());
        assert!(parse_iscp_response(&shifted, &src).is_none());

        let other = iscp::encode('1', "PWR", "01").unwrap();
        assert!(parse_iscp_response(&other, &src).is_none());
    }

    #[test]
    fn test_ssdp_location() {
        let d = parse_ssdp_location("http://192.168.1.90:60006/upnp/desc/aios_device/aios_device.xml")
            .unwrap();
        assert_eq!(d.host, "192.168.1.90");
        assert_eq!(d.port, 23);
        assert_eq!(d.protocol, ProtocolType::Dcp);
        assert!(parse_ssdp_location("not a url").is_none());
    }

    #[test]
    fn test_registry_dedup_and_completion() {
        let mut registry = DeviceRegistry::new();
        let d = DeviceDescriptor::new("10.0.0.5", 60128, ProtocolType::Iscp);

        assert!(registry.record(d.clone()).is_some());
        for _ in 0..3 {
            assert!(registry.record(d.clone()).is_none());
        }
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_complete());

        registry.record(d);
        assert!(registry.is_complete());
        assert_eq!(registry.devices()[0].responses, 5);
    }

    #[test]
    fn test_favorites_do_not_complete() {
        let favorites = vec![FavoriteConfig {
            host: "10.0.0.9".to_string(),
            port: 23,
            protocol: None,
            alias: Some("Kitchen".to_string()),
        }];
        let registry = DeviceRegistry::with_favorites(&favorites);
        assert!(!registry.is_complete());

        let devices = registry.devices();
        assert_eq!(devices[0].protocol, ProtocolType::Dcp);
        assert_eq!(devices[0].display_name(), "Kitchen");
        assert!(devices[0].favorite);
    }
}
