//! Wire framing for the two receiver protocol families.

pub mod dcp;
pub mod iscp;

use serde::{Deserialize, Serialize};

/// Protocol family spoken by a receiver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    #[default]
    Iscp,
    Dcp,
}

/// ISCP control and discovery port.
pub const ISCP_PORT: u16 = 60128;
/// DCP telnet control port.
pub const DCP_PORT: u16 = 23;
/// HEOS control port.
pub const DCP_HEOS_PORT: u16 = 1255;
/// DCP HTTP port; old models answer on port 80 instead.
pub const DCP_HTTP_PORT: u16 = 8080;
pub const DCP_HTTP_FALLBACK_PORT: u16 = 80;

impl ProtocolType {
    /// Protocol implied by a control port.
    pub fn from_port(port: u16) -> Self {
        if port == DCP_PORT {
            ProtocolType::Dcp
        } else {
            ProtocolType::Iscp
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            ProtocolType::Iscp => ISCP_PORT,
            ProtocolType::Dcp => DCP_PORT,
        }
    }
}
