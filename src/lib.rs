//! onpc-core - network AV receiver control
//!
//! Session core for Onkyo/Pioneer (ISCP) and Denon/Marantz (DCP/HEOS) receivers.
//!
//! This library provides:
//! - ISCP frame codec and DCP/HEOS line codec
//! - Typed message registry for both protocols
//! - TCP/HTTP/HEOS transport channels
//! - Session state model and the session controller with pluggable scripts
//! - LAN discovery (ISCP broadcast, SSDP)
//! - Configuration and an event bus for session notifications

pub mod bus;
pub mod channel;
pub mod config;
pub mod discovery;
pub mod error;
pub mod messages;
pub mod protocol;
pub mod session;
pub mod state;
