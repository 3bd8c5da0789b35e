// Serial module - serialport-backed transport
pub mod port;

pub use port::SerialPortOpener;
