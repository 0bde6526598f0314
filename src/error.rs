//! Error types for the receiver protocols and session core.

use thiserror::Error;

/// Framing errors raised by the ISCP and DCP codecs.
///
/// These never escape the channel: a bad frame is logged and skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Frame body does not start with the `!` start character.
    #[error("Missing start character in frame body: {0:?}")]
    MissingStartChar(String),

    /// Frame body is shorter than category plus code.
    #[error("Frame body too short: {0} bytes")]
    BodyTooShort(usize),

    /// Header size field is smaller than the fixed header.
    #[error("Invalid header size: {0}")]
    InvalidHeaderSize(u32),

    /// Header or data size field exceeds what a receiver ever sends.
    #[error("Frame too large: header {header} bytes, data {data} bytes")]
    FrameTooLarge { header: u32, data: u32 },

    /// HEOS envelope is not valid JSON or lacks `heos.command`.
    #[error("Invalid HEOS envelope: {0}")]
    InvalidHeos(String),
}

/// Parameter decode errors for a recognized message code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Parameter string could not be parsed for this code.
    #[error("Invalid parameter for {code}: {params:?}")]
    InvalidParameter { code: String, params: String },

    /// Embedded XML payload could not be parsed.
    #[error("Invalid XML in {code}: {reason}")]
    InvalidXml { code: String, reason: String },
}

impl DecodeError {
    pub fn param(code: &str, params: &str) -> Self {
        DecodeError::InvalidParameter {
            code: code.to_string(),
            params: params.to_string(),
        }
    }

    pub fn xml(code: &str, reason: impl ToString) -> Self {
        DecodeError::InvalidXml {
            code: code.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Errors while loading a shortcut script.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Invalid script XML: {0}")]
    InvalidXml(String),

    /// A `send` action has neither a delay nor a response code to wait for.
    #[error("Action {0} has no wait condition")]
    MissingWait(String),

    #[error("Script contains no actions")]
    Empty,
}

/// Reason a discovery session found nothing.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryFailure {
    #[error("No network connection")]
    NoNetwork,

    #[error("No wireless network")]
    NoWifi,

    #[error("No receiver found")]
    NoDevice,
}
