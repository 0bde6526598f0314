//! Multiroom group and channel commands (`MGS`, `MSS`).

use anyhow::Result;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};

use super::xml::MultiroomChannel;

/// Zone id of a member added to a group.
pub const TARGET_ZONE_ID: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupAction {
    AddMembers,
    RemoveMembers,
    Dissolve,
}

/// Multiroom group change sent by the group source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCommand {
    pub action: GroupAction,
    /// 1-based zone of the source.
    pub zone: u32,
    pub group_id: u32,
    pub max_delay: u32,
    pub devices: Vec<String>,
}

impl GroupCommand {
    pub fn encode(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        let mut mgs = BytesStart::new("mgs");
        mgs.push_attribute(("zone", self.zone.to_string().as_str()));
        writer.write_event(Event::Start(mgs))?;

        text_element(&mut writer, "groupid", &self.group_id.to_string())?;
        if self.action != GroupAction::Dissolve {
            text_element(&mut writer, "maxdelay", &self.max_delay.to_string())?;
            writer.write_event(Event::Start(BytesStart::new("devices")))?;
            for d in &self.devices {
                let mut device = BytesStart::new("device");
                device.push_attribute(("id", d.as_str()));
                device.push_attribute(("zoneid", TARGET_ZONE_ID.to_string().as_str()));
                writer.write_event(Event::Empty(device))?;
            }
            writer.write_event(Event::End(BytesEnd::new("devices")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("mgs")))?;
        Ok(String::from_utf8(writer.into_inner())?)
    }
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Speaker channel of one zone in a group (`MSS`: zone digit plus channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSetting {
    pub zone: u32,
    pub channel: MultiroomChannel,
}

impl ChannelSetting {
    pub fn encode(&self) -> String {
        format!("{}{}", self.zone, self.channel.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_members() {
        let cmd = GroupCommand {
            action: GroupAction::AddMembers,
            zone: 1,
            group_id: 3,
            max_delay: 500,
            devices: vec!["0009B0E2F5DE".to_string()],
        };
        assert_eq!(
            cmd.encode().unwrap(),
            "<mgs zone=\"1\"><groupid>3</groupid><maxdelay>500</maxdelay><devices>\
             <device id=\"0009B0E2F5DE\" zoneid=\"1\"/></devices></mgs>"
        );
    }

    #[test]
    fn test_dissolve() {
        let cmd = GroupCommand {
            action: GroupAction::Dissolve,
            zone: 1,
            group_id: 3,
            max_delay: 0,
            devices: Vec::new(),
        };
        assert_eq!(cmd.encode().unwrap(), "<mgs zone=\"1\"><groupid>3</groupid></mgs>");
    }

    #[test]
    fn test_channel_setting() {
        let s = ChannelSetting {
            zone: 1,
            channel: MultiroomChannel::Fl,
        };
        assert_eq!(s.encode(), "1FL");
    }
}
