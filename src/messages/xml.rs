//! XML payloads carried inside messages: receiver information, media lists, multiroom layout
//! and the Denon HTTP documents.

use std::collections::BTreeMap;

use anyhow::Result;
use quick_xml::de::from_str as xml_from_str;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};

use super::navigation::{ListIcon, XmlListItem};
use crate::error::DecodeError;

/// Zone flags in `zone` attributes are a bitmask: main zone is bit 0.
pub const ALL_ZONES: u32 = 0x0F;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkService {
    pub id: String,
    pub name: String,
    pub zones: u32,
    pub add_to_queue: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub vol_step: u32,
    pub vol_max: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub id: String,
    pub name: String,
    pub zones: u32,
    pub icon_id: String,
    pub add_to_queue: bool,
}

impl Selector {
    pub fn is_active_for_zone(&self, zone: usize) -> bool {
        self.zones & (1 << zone) != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub id: u32,
    pub band: u32,
    pub frequency: String,
    pub name: String,
}

impl Preset {
    pub fn is_fm(&self) -> bool {
        self.band == 1
    }

    pub fn is_dab(&self) -> bool {
        self.band == 2
    }

    pub fn display_name(&self) -> String {
        if self.name.trim().is_empty() {
            self.frequency.clone()
        } else {
            self.name.trim().to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneControl {
    pub id: String,
    pub min: i32,
    pub max: i32,
    pub step: i32,
}

pub const BASS_CONTROL: &str = "Bass";
pub const TREBLE_CONTROL: &str = "Treble";

/// Parsed receiver information (`NRI`, or assembled from Denon HTTP documents).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverInfo {
    pub device_id: String,
    pub properties: BTreeMap<String, String>,
    pub network_services: Vec<NetworkService>,
    pub zones: Vec<Zone>,
    pub selectors: Vec<Selector>,
    pub presets: Vec<Preset>,
    pub controls: Vec<String>,
    pub tone_controls: BTreeMap<String, ToneControl>,
}

#[derive(Debug, Deserialize)]
struct NriResponse {
    #[serde(rename = "@status", default)]
    status: String,
    device: Option<NriDevice>,
}

#[derive(Debug, Deserialize)]
struct NriDevice {
    #[serde(rename = "@id", default)]
    id: String,
    brand: Option<String>,
    category: Option<String>,
    year: Option<String>,
    model: Option<String>,
    destination: Option<String>,
    productid: Option<String>,
    deviceserial: Option<String>,
    macaddress: Option<String>,
    modeliconurl: Option<String>,
    friendlyname: Option<String>,
    firmwareversion: Option<String>,
    ecosystemversion: Option<String>,
    netservicelist: Option<NriServiceList>,
    zonelist: Option<NriZoneList>,
    selectorlist: Option<NriSelectorList>,
    presetlist: Option<NriPresetList>,
    controllist: Option<NriControlList>,
}

#[derive(Debug, Deserialize)]
struct NriServiceList {
    #[serde(rename = "netservice", default)]
    items: Vec<NriItem>,
}

#[derive(Debug, Deserialize)]
struct NriZoneList {
    #[serde(rename = "zone", default)]
    items: Vec<NriItem>,
}

#[derive(Debug, Deserialize)]
struct NriSelectorList {
    #[serde(rename = "selector", default)]
    items: Vec<NriItem>,
}

#[derive(Debug, Deserialize)]
struct NriPresetList {
    #[serde(rename = "preset", default)]
    items: Vec<NriItem>,
}

#[derive(Debug, Deserialize)]
struct NriControlList {
    #[serde(rename = "control", default)]
    items: Vec<NriItem>,
}

/// Attribute bag shared by all NRI list entries; attributes stay strings and are parsed below.
#[derive(Debug, Default, Deserialize)]
struct NriItem {
    #[serde(rename = "@id", default)]
    id: String,
    #[serde(rename = "@value")]
    value: Option<String>,
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@zone")]
    zone: Option<String>,
    #[serde(rename = "@iconid", default)]
    iconid: String,
    #[serde(rename = "@addqueue")]
    addqueue: Option<String>,
    #[serde(rename = "@volstep")]
    volstep: Option<String>,
    #[serde(rename = "@volmax")]
    volmax: Option<String>,
    #[serde(rename = "@band")]
    band: Option<String>,
    #[serde(rename = "@freq", default)]
    freq: String,
    #[serde(rename = "@min")]
    min: Option<String>,
    #[serde(rename = "@max")]
    max: Option<String>,
    #[serde(rename = "@step")]
    step: Option<String>,
}

impl NriItem {
    fn enabled(&self) -> bool {
        self.value.as_deref().map_or(true, |v| v.trim() == "1")
    }

    fn zones(&self) -> u32 {
        self.zone
            .as_deref()
            .and_then(|z| u32::from_str_radix(z.trim(), 16).ok())
            .unwrap_or(ALL_ZONES)
    }

    fn add_to_queue(&self) -> bool {
        self.addqueue.as_deref().map(str::trim) == Some("1")
    }
}

fn parse_num<T: std::str::FromStr>(v: &Option<String>, default: T) -> T {
    v.as_deref()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl ReceiverInfo {
    pub fn parse(xml: &str) -> Result<Self, DecodeError> {
        let response: NriResponse = xml_from_str(xml).map_err(|e| DecodeError::xml("NRI", e))?;
        if response.status != "ok" {
            return Err(DecodeError::xml("NRI", format!("status {}", response.status)));
        }
        let device = response
            .device
            .ok_or_else(|| DecodeError::xml("NRI", "device element not found"))?;

        let mut info = ReceiverInfo {
            device_id: device.id.clone(),
            ..Default::default()
        };
        for (key, value) in [
            ("brand", device.brand),
            ("category", device.category),
            ("year", device.year),
            ("model", device.model),
            ("destination", device.destination),
            ("productid", device.productid),
            ("deviceserial", device.deviceserial),
            ("macaddress", device.macaddress),
            ("modeliconurl", device.modeliconurl),
            ("friendlyname", device.friendlyname),
            ("firmwareversion", device.firmwareversion),
            ("ecosystemversion", device.ecosystemversion),
        ] {
            if let Some(v) = value {
                info.properties.insert(key.to_string(), v.trim().to_string());
            }
        }

        if let Some(list) = device.netservicelist {
            info.network_services = list
                .items
                .iter()
                .filter(|s| s.enabled())
                .map(|s| NetworkService {
                    id: s.id.to_ascii_uppercase(),
                    name: s.name.clone(),
                    zones: s.zones(),
                    add_to_queue: s.add_to_queue(),
                })
                .collect();
        }

        if let Some(list) = device.zonelist {
            info.zones = list
                .items
                .iter()
                .filter(|z| z.enabled())
                .map(|z| Zone {
                    id: z.id.clone(),
                    name: z.name.clone(),
                    vol_step: parse_num(&z.volstep, 0),
                    vol_max: parse_num(&z.volmax, 0),
                })
                .collect();
        }

        if let Some(list) = device.selectorlist {
            info.selectors = list
                .items
                .iter()
                .filter(|s| s.enabled())
                .map(|s| Selector {
                    id: s.id.to_ascii_uppercase(),
                    name: s.name.clone(),
                    zones: s.zones(),
                    icon_id: s.iconid.clone(),
                    add_to_queue: s.add_to_queue(),
                })
                .collect();
        }

        if let Some(list) = device.presetlist {
            info.presets = list
                .items
                .iter()
                .filter(|p| parse_num(&p.band, 0u32) != 0)
                .filter_map(|p| {
                    Some(Preset {
                        id: u32::from_str_radix(p.id.trim(), 16).ok()?,
                        band: parse_num(&p.band, 0),
                        frequency: p.freq.clone(),
                        name: p.name.clone(),
                    })
                })
                .collect();
        }

        if let Some(list) = device.controllist {
            for c in list.items.iter().filter(|c| c.enabled()) {
                info.controls.push(c.id.clone());
                if c.min.is_some() && c.max.is_some() {
                    info.tone_controls.insert(
                        c.id.clone(),
                        ToneControl {
                            id: c.id.clone(),
                            min: parse_num(&c.min, 0),
                            max: parse_num(&c.max, 0),
                            step: parse_num(&c.step, 1),
                        },
                    );
                }
            }
        }

        Ok(info)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn model(&self) -> Option<&str> {
        self.property("model")
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.property("friendlyname")
    }

    /// Serializes back to the `NRI` document layout, for the snapshot cache.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        let mut response = BytesStart::new("response");
        response.push_attribute(("status", "ok"));
        writer.write_event(Event::Start(response))?;

        let mut device = BytesStart::new("device");
        device.push_attribute(("id", self.device_id.as_str()));
        writer.write_event(Event::Start(device))?;

        for (key, value) in &self.properties {
            writer.write_event(Event::Start(BytesStart::new(key.as_str())))?;
            writer.write_event(Event::Text(BytesText::new(value)))?;
            writer.write_event(Event::End(BytesEnd::new(key.as_str())))?;
        }

        writer.write_event(Event::Start(BytesStart::new("netservicelist")))?;
        for s in &self.network_services {
            let mut e = BytesStart::new("netservice");
            e.push_attribute(("id", s.id.as_str()));
            e.push_attribute(("value", "1"));
            e.push_attribute(("name", s.name.as_str()));
            e.push_attribute(("zone", format!("{:02x}", s.zones).as_str()));
            e.push_attribute(("addqueue", if s.add_to_queue { "1" } else { "0" }));
            writer.write_event(Event::Empty(e))?;
        }
        writer.write_event(Event::End(BytesEnd::new("netservicelist")))?;

        writer.write_event(Event::Start(BytesStart::new("zonelist")))?;
        for z in &self.zones {
            let mut e = BytesStart::new("zone");
            e.push_attribute(("id", z.id.as_str()));
            e.push_attribute(("value", "1"));
            e.push_attribute(("name", z.name.as_str()));
            e.push_attribute(("volstep", z.vol_step.to_string().as_str()));
            e.push_attribute(("volmax", z.vol_max.to_string().as_str()));
            writer.write_event(Event::Empty(e))?;
        }
        writer.write_event(Event::End(BytesEnd::new("zonelist")))?;

        writer.write_event(Event::Start(BytesStart::new("selectorlist")))?;
        for s in &self.selectors {
            let mut e = BytesStart::new("selector");
            e.push_attribute(("id", s.id.as_str()));
            e.push_attribute(("value", "1"));
            e.push_attribute(("name", s.name.as_str()));
            e.push_attribute(("zone", format!("{:02x}", s.zones).as_str()));
            e.push_attribute(("iconid", s.icon_id.as_str()));
            e.push_attribute(("addqueue", if s.add_to_queue { "1" } else { "0" }));
            writer.write_event(Event::Empty(e))?;
        }
        writer.write_event(Event::End(BytesEnd::new("selectorlist")))?;

        writer.write_event(Event::Start(BytesStart::new("presetlist")))?;
        for p in &self.presets {
            let mut e = BytesStart::new("preset");
            e.push_attribute(("id", format!("{:02x}", p.id).as_str()));
            e.push_attribute(("band", p.band.to_string().as_str()));
            e.push_attribute(("freq", p.frequency.as_str()));
            e.push_attribute(("name", p.name.as_str()));
            writer.write_event(Event::Empty(e))?;
        }
        writer.write_event(Event::End(BytesEnd::new("presetlist")))?;

        writer.write_event(Event::Start(BytesStart::new("controllist")))?;
        for id in &self.controls {
            let mut e = BytesStart::new("control");
            e.push_attribute(("id", id.as_str()));
            e.push_attribute(("value", "1"));
            if let Some(t) = self.tone_controls.get(id) {
                e.push_attribute(("min", t.min.to_string().as_str()));
                e.push_attribute(("max", t.max.to_string().as_str()));
                e.push_attribute(("step", t.step.to_string().as_str()));
            }
            writer.write_event(Event::Empty(e))?;
        }
        writer.write_event(Event::End(BytesEnd::new("controllist")))?;

        writer.write_event(Event::End(BytesEnd::new("device")))?;
        writer.write_event(Event::End(BytesEnd::new("response")))?;

        Ok(format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>{}",
            String::from_utf8(writer.into_inner())?
        ))
    }
}

/// Zones reported when the device document carries no zone list.
pub fn default_zones() -> Vec<Zone> {
    ["Main", "Zone2", "Zone3", "Zone4"]
        .iter()
        .enumerate()
        .map(|(i, name)| Zone {
            id: (i + 1).to_string(),
            name: name.to_string(),
            vol_step: 0,
            vol_max: 0,
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(rename = "@status", default)]
    status: String,
    items: Option<ListItems>,
}

#[derive(Debug, Deserialize)]
struct ListItems {
    #[serde(rename = "@offset")]
    offset: Option<String>,
    #[serde(rename = "@totalitems")]
    total: Option<String>,
    #[serde(rename = "item", default)]
    item: Vec<ListItemNode>,
}

#[derive(Debug, Deserialize)]
struct ListItemNode {
    #[serde(rename = "@title", default)]
    title: String,
    #[serde(rename = "@icontype", default)]
    icon_type: String,
    #[serde(rename = "@iconid")]
    icon_id: Option<String>,
    #[serde(rename = "@selectable")]
    selectable: Option<String>,
}

/// Parses the XML of an `NLA` response; item ids are the offset plus the item index.
pub fn parse_media_list(xml: &str, layers: u32) -> Result<Vec<XmlListItem>, DecodeError> {
    let response: ListResponse = xml_from_str(xml).map_err(|e| DecodeError::xml("NLA", e))?;
    if response.status != "ok" {
        return Err(DecodeError::xml("NLA", format!("status {}", response.status)));
    }
    let Some(items) = response.items else {
        return Ok(Vec::new());
    };
    if items.total.is_none() {
        return Err(DecodeError::xml("NLA", "totalitems missing"));
    }
    let offset: u32 = items
        .offset
        .as_deref()
        .and_then(|o| o.trim().parse().ok())
        .ok_or_else(|| DecodeError::xml("NLA", "offset missing"))?;

    Ok(items
        .item
        .into_iter()
        .enumerate()
        .map(|(idx, node)| {
            let icon_id = node.icon_id.unwrap_or_else(|| ListIcon::Unknown.code().to_string());
            XmlListItem {
                id: offset + idx as u32,
                layers,
                title: node.title,
                icon_type: node.icon_type,
                icon: ListIcon::from_code(&icon_id).unwrap_or(ListIcon::Unknown),
                selectable: node.selectable.as_deref() == Some("1"),
                media: None,
            }
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultiroomRole {
    Src,
    Dst,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultiroomChannel {
    St,
    Fl,
    Fr,
    None,
}

impl MultiroomChannel {
    pub fn code(self) -> &'static str {
        match self {
            MultiroomChannel::St => "ST",
            MultiroomChannel::Fl => "FL",
            MultiroomChannel::Fr => "FR",
            MultiroomChannel::None => "NONE",
        }
    }
}

pub const NO_GROUP: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiroomZone {
    pub id: u32,
    pub group_id: u32,
    pub channel: MultiroomChannel,
    pub role: MultiroomRole,
    pub room_name: String,
    pub group_name: String,
    pub power_state: Option<i32>,
    pub icon_id: Option<i32>,
    pub color: Option<i32>,
    pub delay: Option<i32>,
}

/// Multiroom device information (`MDI`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiroomInfo {
    pub properties: BTreeMap<String, String>,
    pub zones: Vec<MultiroomZone>,
}

#[derive(Debug, Deserialize)]
struct MdiNode {
    deviceid: Option<String>,
    netstandby: Option<String>,
    zonelist: Option<MdiZoneList>,
}

#[derive(Debug, Deserialize)]
struct MdiZoneList {
    #[serde(rename = "zone", default)]
    zone: Vec<MdiZoneNode>,
}

#[derive(Debug, Deserialize)]
struct MdiZoneNode {
    #[serde(rename = "@id")]
    id: Option<String>,
    #[serde(rename = "@groupid")]
    groupid: Option<String>,
    #[serde(rename = "@ch")]
    ch: Option<String>,
    #[serde(rename = "@role")]
    role: Option<String>,
    #[serde(rename = "@roomname", default)]
    roomname: String,
    #[serde(rename = "@groupname", default)]
    groupname: String,
    #[serde(rename = "@powerstate")]
    powerstate: Option<String>,
    #[serde(rename = "@iconid")]
    iconid: Option<String>,
    #[serde(rename = "@color")]
    color: Option<String>,
    #[serde(rename = "@delay")]
    delay: Option<String>,
}

fn opt_int(v: &Option<String>) -> Option<i32> {
    v.as_deref().and_then(|s| s.trim().parse().ok())
}

impl MultiroomInfo {
    pub const DEVICE_ID: &'static str = "deviceid";

    pub fn parse(xml: &str) -> Result<Self, DecodeError> {
        let mdi: MdiNode = xml_from_str(xml).map_err(|e| DecodeError::xml("MDI", e))?;
        let mut info = MultiroomInfo::default();
        if let Some(id) = mdi.deviceid {
            info.properties.insert(Self::DEVICE_ID.to_string(), id.trim().to_string());
        }
        if let Some(ns) = mdi.netstandby {
            info.properties.insert("netstandby".to_string(), ns.trim().to_string());
        }
        for z in mdi.zonelist.map(|l| l.zone).unwrap_or_default() {
            let Some(id) = opt_int(&z.id) else {
                continue;
            };
            info.zones.push(MultiroomZone {
                id: id.max(0) as u32,
                group_id: opt_int(&z.groupid).map_or(NO_GROUP, |g| g.max(0) as u32),
                channel: match z.ch.as_deref().map(str::to_ascii_uppercase).as_deref() {
                    Some("ST") => MultiroomChannel::St,
                    Some("FL") => MultiroomChannel::Fl,
                    Some("FR") => MultiroomChannel::Fr,
                    _ => MultiroomChannel::None,
                },
                role: match z.role.as_deref().map(str::to_ascii_uppercase).as_deref() {
                    Some("SRC") => MultiroomRole::Src,
                    Some("DST") => MultiroomRole::Dst,
                    _ => MultiroomRole::None,
                },
                room_name: z.roomname,
                group_name: z.groupname,
                power_state: opt_int(&z.powerstate),
                icon_id: opt_int(&z.iconid),
                color: opt_int(&z.color),
                delay: opt_int(&z.delay),
            });
        }
        Ok(info)
    }

    pub fn device_id(&self) -> Option<&str> {
        self.properties.get(Self::DEVICE_ID).map(String::as_str)
    }

    /// Zone ids in `MDI` are 1-based.
    pub fn zone(&self, zone: usize) -> Option<&MultiroomZone> {
        self.zones.iter().find(|z| z.id as usize == zone + 1)
    }

    pub fn role(&self, zone: usize) -> MultiroomRole {
        self.zone(zone).map_or(MultiroomRole::None, |z| z.role)
    }

    pub fn channel(&self, zone: usize) -> MultiroomChannel {
        self.zone(zone).map_or(MultiroomChannel::None, |z| z.channel)
    }

    pub fn group_id(&self, zone: usize) -> u32 {
        self.zone(zone).map_or(NO_GROUP, |z| z.group_id)
    }
}

/// Denon `Deviceinfo.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcpDeviceInfo {
    pub model: String,
    pub brand: String,
    pub zones: u32,
    pub mac_address: String,
}

#[derive(Debug, Deserialize)]
struct DeviceInfoNode {
    #[serde(rename = "ModelName", default)]
    model_name: String,
    #[serde(rename = "BrandCode")]
    brand_code: Option<String>,
    #[serde(rename = "DeviceZones")]
    device_zones: Option<String>,
    #[serde(rename = "MacAddress", default)]
    mac_address: String,
}

impl DcpDeviceInfo {
    pub fn parse(xml: &str) -> Result<Self, DecodeError> {
        let node: DeviceInfoNode =
            xml_from_str(xml).map_err(|e| DecodeError::xml("Deviceinfo", e))?;
        let brand = match node.brand_code.as_deref().map(str::trim) {
            Some("0") => "Denon",
            Some("1") => "Marantz",
            _ => "Denon",
        };
        Ok(Self {
            model: node.model_name.trim().to_string(),
            brand: brand.to_string(),
            zones: parse_num(&node.device_zones, 1u32).clamp(1, 4),
            mac_address: node.mac_address.trim().to_string(),
        })
    }

    /// Receiver information with the zones this model reports.
    pub fn to_receiver_info(&self) -> ReceiverInfo {
        let mut info = ReceiverInfo {
            device_id: self.model.clone(),
            ..Default::default()
        };
        info.properties.insert("brand".to_string(), self.brand.clone());
        info.properties.insert("model".to_string(), self.model.clone());
        info.properties
            .insert("friendlyname".to_string(), self.model.clone());
        info.properties
            .insert("macaddress".to_string(), self.mac_address.clone());
        info.zones = default_zones()
            .into_iter()
            .take(self.zones as usize)
            .map(|mut z| {
                // Denon volume runs 0..98 dB in half-dB steps
                z.vol_step = 1;
                z.vol_max = 98;
                z
            })
            .collect();
        info.controls = vec![
            "Master Volume".to_string(),
            BASS_CONTROL.to_string(),
            TREBLE_CONTROL.to_string(),
        ];
        info
    }
}

/// Request body for the Denon `GetZoneName` application command.
pub fn zone_name_request() -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Start(BytesStart::new("tx")))?;
    let mut cmd = BytesStart::new("cmd");
    cmd.push_attribute(("id", "1"));
    writer.write_event(Event::Start(cmd))?;
    writer.write_event(Event::Text(BytesText::new("GetZoneName")))?;
    writer.write_event(Event::End(BytesEnd::new("cmd")))?;
    writer.write_event(Event::End(BytesEnd::new("tx")))?;
    Ok(format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>{}",
        String::from_utf8(writer.into_inner())?
    ))
}

#[derive(Debug, Deserialize)]
struct ZoneNameRx {
    cmd: Option<ZoneNameCmd>,
}

#[derive(Debug, Deserialize)]
struct ZoneNameCmd {
    zone1: Option<String>,
    zone2: Option<String>,
    zone3: Option<String>,
    zone4: Option<String>,
}

/// Zone names from a `GetZoneName` response, in zone order.
pub fn parse_zone_names(xml: &str) -> Result<Vec<String>, DecodeError> {
    let rx: ZoneNameRx = xml_from_str(xml).map_err(|e| DecodeError::xml("GetZoneName", e))?;
    let cmd = rx
        .cmd
        .ok_or_else(|| DecodeError::xml("GetZoneName", "cmd element not found"))?;
    Ok([cmd.zone1, cmd.zone2, cmd.zone3, cmd.zone4]
        .into_iter()
        .flatten()
        .map(|n| n.trim().to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    pub const NRI: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<response status="ok">
  <device id="TX-NR676E">
    <brand>ONKYO</brand>
    <model>TX-NR676E</model>
    <friendlyname>Living Room</friendlyname>
    <firmwareversion>1110-1000</firmwareversion>
    <netservicelist count="2">
      <netservice id="0e" value="1" name="TuneIn" zone="01"/>
      <netservice id="0a" value="0" name="Spotify" zone="01"/>
    </netservicelist>
    <zonelist count="2">
      <zone id="1" value="1" name="Main" volmax="80" volstep="0"/>
      <zone id="2" value="1" name="Zone2" volmax="80" volstep="0"/>
    </zonelist>
    <selectorlist count="2">
      <selector id="2b" value="1" name="NET" zone="03" iconid="2B" addqueue="1"/>
      <selector id="24" value="1" name="FM" zone="01" iconid="24"/>
    </selectorlist>
    <presetlist count="2">
      <preset id="01" band="1" freq="87.50" name=""/>
      <preset id="02" band="0" freq="0" name=""/>
    </presetlist>
    <controllist count="2">
      <control id="Bass" value="1" zone="1" min="-10" max="10" step="2"/>
      <control id="TUNER Control" value="1" zone="1"/>
    </controllist>
  </device>
</response>"#;

    #[test]
    fn test_receiver_info() {
        let info = ReceiverInfo::parse(NRI).unwrap();
        assert_eq!(info.device_id, "TX-NR676E");
        assert_eq!(info.model(), Some("TX-NR676E"));
        assert_eq!(info.friendly_name(), Some("Living Room"));
        assert_eq!(info.network_services.len(), 1);
        assert_eq!(info.network_services[0].id, "0E");
        assert_eq!(info.zones.len(), 2);
        assert_eq!(info.zones[0].vol_max, 80);
        assert_eq!(info.selectors[0].id, "2B");
        assert!(info.selectors[0].add_to_queue);
        assert!(info.selectors[1].is_active_for_zone(0));
        assert!(!info.selectors[1].is_active_for_zone(1));
        assert_eq!(info.presets.len(), 1);
        assert_eq!(info.presets[0].display_name(), "87.50");
        assert_eq!(info.controls, vec!["Bass", "TUNER Control"]);
        assert_eq!(info.tone_controls[BASS_CONTROL].step, 2);
    }

    #[test]
    fn test_receiver_info_snapshot_reparses() {
        let info = ReceiverInfo::parse(NRI).unwrap();
        let xml = info.to_xml().unwrap();
        assert_eq!(ReceiverInfo::parse(&xml).unwrap(), info);
    }

    #[test]
    fn test_receiver_info_errors() {
        assert!(ReceiverInfo::parse("<response status=\"fail\"/>").is_err());
        assert!(ReceiverInfo::parse("not xml <").is_err());
    }

    #[test]
    fn test_media_list() {
        let xml = r#"<response status="ok"><items offset="10" totalitems="12">
            <item iconid="29" title="Folder" selectable="1"/>
            <item iconid="36" title="Track" selectable="1"/>
            <item title="Info" selectable="0"/>
        </items></response>"#;
        let items = parse_media_list(xml, 2).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].id, 10);
        assert_eq!(items[0].icon, ListIcon::Folder);
        assert_eq!(items[1].icon, ListIcon::Play);
        assert_eq!(items[2].icon, ListIcon::Unknown);
        assert!(!items[2].selectable);
        assert_eq!(items[2].layers, 2);
    }

    #[test]
    fn test_multiroom() {
        let xml = r#"<mdi><deviceid>0009B0E2F5DE</deviceid><netstandby>1</netstandby><zonelist>
            <zone id="1" groupid="3" ch="ST" role="src" roomname="Kitchen" powerstate="1"/>
            <zone id="2" groupid="0" ch="fl" role="none"/>
        </zonelist></mdi>"#;
        let info = MultiroomInfo::parse(xml).unwrap();
        assert_eq!(info.device_id(), Some("0009B0E2F5DE"));
        assert_eq!(info.role(0), MultiroomRole::Src);
        assert_eq!(info.group_id(0), 3);
        assert_eq!(info.channel(1), MultiroomChannel::Fl);
        assert_eq!(info.role(3), MultiroomRole::None);
    }

    #[test]
    fn test_dcp_device_info() {
        let xml = "<Device_Info><ModelName>AVR-X1600H</ModelName><BrandCode>1</BrandCode>\
                   <DeviceZones>2</DeviceZones><MacAddress>0005CD123456</MacAddress></Device_Info>";
        let info = DcpDeviceInfo::parse(xml).unwrap();
        assert_eq!(info.brand, "Marantz");
        assert_eq!(info.zones, 2);
        let ri = info.to_receiver_info();
        assert_eq!(ri.zones.len(), 2);
        assert_eq!(ri.model(), Some("AVR-X1600H"));
    }

    #[test]
    fn test_zone_names() {
        let body = zone_name_request().unwrap();
        assert!(body.contains("<cmd id=\"1\">GetZoneName</cmd>"));
        let names = parse_zone_names(
            "<rx><cmd><zone1>Living </zone1><zone2>Patio</zone2></cmd></rx>",
        )
        .unwrap();
        assert_eq!(names, vec!["Living", "Patio"]);
    }
}
