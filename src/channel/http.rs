//! Denon HTTP endpoints: device information, `goform` commands and AppCommand XML.

use anyhow::{anyhow, Result};
use reqwest::Client;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::messages::xml::{parse_zone_names, zone_name_request, DcpDeviceInfo};
use crate::messages::ReceiverInfo;
use crate::protocol::{DCP_HTTP_FALLBACK_PORT, DCP_HTTP_PORT};

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEVICE_INFO_PATH: &str = "/goform/Deviceinfo.xml";
const APP_COMMAND_PATH: &str = "/goform/AppCommand.xml";
const GOFORM_PATH: &str = "/goform/";

/// HTTP client bound to one receiver. The port is picked on first use and remembered.
pub struct DcpHttpClient {
    client: Client,
    host: String,
    candidates: Vec<u16>,
    port: RwLock<u16>,
}

impl DcpHttpClient {
    pub fn new(host: &str) -> Result<Self> {
        Self::with_ports(host, &[DCP_HTTP_PORT, DCP_HTTP_FALLBACK_PORT])
    }

    /// Client probing `ports` in order.
    pub fn with_ports(host: &str, ports: &[u16]) -> Result<Self> {
        let first = *ports.first().ok_or_else(|| anyhow!("No HTTP port given"))?;
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self {
            client,
            host: host.to_string(),
            candidates: ports.to_vec(),
            port: RwLock::new(first),
        })
    }

    fn url(&self, port: u16, path: &str) -> String {
        format!("http://{}:{}{}", self.host, port, path)
    }

    pub async fn port(&self) -> u16 {
        *self.port.read().await
    }

    /// Fetches `Deviceinfo.xml`, falling back to port 80 for older models.
    pub async fn fetch_device_info(&self) -> Result<ReceiverInfo> {
        let mut last_err = anyhow!("No HTTP port answered");
        for &port in &self.candidates {
            let url = self.url(port, DEVICE_INFO_PATH);
            match self.get_text(&url).await {
                Ok(body) => {
                    let device = DcpDeviceInfo::parse(&body)?;
                    info!(
                        "DCP device info from port {}: {} {} ({} zones)",
                        port, device.brand, device.model, device.zones
                    );
                    *self.port.write().await = port;
                    return Ok(device.to_receiver_info());
                }
                Err(e) => {
                    debug!("Device info on port {} failed: {}", port, e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    /// Zone names reported by the `GetZoneName` application command.
    pub async fn fetch_zone_names(&self) -> Result<Vec<String>> {
        let body = self.app_command(zone_name_request()?).await?;
        Ok(parse_zone_names(&body)?)
    }

    /// Sends a `formiPhoneApp...` command.
    pub async fn goform(&self, cmd: &str) -> Result<()> {
        let url = self.url(self.port().await, &format!("{}{}", GOFORM_PATH, cmd.replace(' ', "%20")));
        debug!("DCP HTTP GET {}", url);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            warn!("DCP HTTP GET {} returned {}", url, resp.status());
        }
        Ok(())
    }

    /// Posts an AppCommand XML document and returns the response body.
    pub async fn app_command(&self, xml: String) -> Result<String> {
        let url = self.url(self.port().await, APP_COMMAND_PATH);
        debug!("DCP HTTP POST {}", url);
        let resp = self
            .client
            .post(&url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .body(xml)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow!("AppCommand returned {}", resp.status()));
        }
        Ok(resp.text().await?)
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(anyhow!("HTTP {}", resp.status()));
        }
        Ok(resp.text().await?)
    }
}
