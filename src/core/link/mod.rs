// Link module - Serial JSON link to the temperature controller
pub mod command;
pub mod context;
pub mod decoder;
pub mod dispatch;
pub mod heartbeat;
pub mod manager;
pub mod queue;
pub mod reader;
pub mod stats;
pub mod transport;
pub mod watchdog;
pub mod writer;

pub use command::Command;
pub use decoder::{DecodeFailure, Payload};
pub use dispatch::SubscriptionId;
pub use manager::{ConnectionState, LinkManager};
pub use stats::LinkStats;
pub use transport::{Link, PortDescriptor, PortOpener, PortSettings};
pub use watchdog::{FailsafeNotice, FailsafeStatus, FAILSAFE_EVENT, WATCHDOG_REASON};
