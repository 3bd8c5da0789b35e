//! ThermoLink Library
//!
//! Serial link manager for temperature controllers that speak
//! newline-delimited JSON: a bounded outbound queue drained by a writer
//! thread, a reader thread that decodes telemetry and runs the liveness
//! watchdog, a heartbeat thread, and a dispatcher fanning payloads out to
//! subscribers.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use domain::error::{LinkError, LinkResult};
pub use domain::config::{LinkConfig, ThermoLinkConfig};
pub use self::core::link::{
    Command, ConnectionState, FailsafeNotice, FailsafeStatus, LinkManager, LinkStats, Payload,
    PortOpener, SubscriptionId,
};
