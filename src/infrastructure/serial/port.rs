use crate::core::link::transport::{Link, PortDescriptor, PortOpener, PortSettings};
use crate::domain::error::{LinkError, LinkResult};
use serialport::{SerialPortInfo, SerialPortType};
use std::time::Duration;
use tracing::{debug, info};

/// Write timeout used when none is configured, standing in for "wait as
/// long as the OS lets the write block".
pub const UNBOUNDED_WRITE_TIMEOUT: Duration = Duration::from_secs(3600);

/// Opens real serial ports through the `serialport` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortOpener;

impl PortOpener for SerialPortOpener {
    fn open(&self, port: &str, settings: &PortSettings) -> LinkResult<Link> {
        let open_error = |e: serialport::Error| LinkError::PortOpen {
            port: port.to_string(),
            message: e.to_string(),
        };

        let reader = serialport::new(port, settings.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .timeout(settings.read_timeout)
            .open()
            .map_err(open_error)?;

        // Separate handle so writes never wait behind a blocked read.
        let mut writer = reader.try_clone().map_err(open_error)?;
        writer
            .set_timeout(settings.write_timeout.unwrap_or(UNBOUNDED_WRITE_TIMEOUT))
            .map_err(open_error)?;

        info!("Serial port '{}' opened at {} baud", port, settings.baud_rate);
        debug!(
            "Read timeout {:?}, write timeout {:?}",
            settings.read_timeout, settings.write_timeout
        );

        Ok(Link {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }

    fn available_ports(&self) -> LinkResult<Vec<PortDescriptor>> {
        let ports = serialport::available_ports()?;
        Ok(ports.iter().map(describe).collect())
    }
}

fn describe(info: &SerialPortInfo) -> PortDescriptor {
    let kind = match &info.port_type {
        SerialPortType::UsbPort(usb) => {
            let mut kind = format!("USB {:04x}:{:04x}", usb.vid, usb.pid);
            if let Some(product) = &usb.product {
                kind.push(' ');
                kind.push_str(product);
            }
            kind
        }
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        SerialPortType::Unknown => "Unknown".to_string(),
    };

    PortDescriptor {
        name: info.port_name.clone(),
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> PortSettings {
        PortSettings {
            baud_rate: 115_200,
            read_timeout: Duration::from_millis(100),
            write_timeout: None,
        }
    }

    #[test]
    fn test_open_missing_port_fails_gracefully() {
        let result = SerialPortOpener.open("/dev/thermolink-does-not-exist", &settings());
        match result {
            Err(LinkError::PortOpen { port, .. }) => assert_eq!(port, "/dev/thermolink-does-not-exist"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("opening a missing port should fail"),
        }
    }

    #[test]
    fn test_describe_pci_port() {
        let info = SerialPortInfo {
            port_name: "/dev/ttyS0".to_string(),
            port_type: SerialPortType::PciPort,
        };
        assert_eq!(
            describe(&info),
            PortDescriptor {
                name: "/dev/ttyS0".to_string(),
                kind: "PCI".to_string(),
            }
        );
    }
}
