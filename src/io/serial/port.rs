// src/io/serial/port.rs
//
// Device access for the link engine.
//
// `SerialLink` is one open device descriptor; `PortOpener` knows how to
// produce one from a `LinkConfig`. The system backend uses the serialport
// crate, and tests substitute the loopback device. `PortHandle` is the
// engine's exclusive owner of an open link.

use serde::Serialize;
use std::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;

use super::config::LinkConfig;
use super::utils::{
    to_serialport_data_bits, to_serialport_flow_control, to_serialport_parity,
    to_serialport_stop_bits,
};
use crate::io::error::ConnectError;

/// Largest slice handed to the device in a single write call.
pub const WRITE_CHUNK_SIZE: usize = 1024;

// ============================================================================
// Traits
// ============================================================================

/// One open serial device.
///
/// Reads block for at most the configured read timeout and report an idle
/// line as `ErrorKind::TimedOut`.
pub trait SerialLink: Send {
    fn name(&self) -> &str;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

/// Opens serial devices. Shared by the engine and the reconnect supervisor.
pub trait PortOpener: Send + Sync {
    fn open(&self, config: &LinkConfig) -> Result<Box<dyn SerialLink>, ConnectError>;

    /// Whether the named port is still enumerable.
    /// Backends that cannot tell report `true`.
    fn is_present(&self, _port_name: &str) -> bool {
        true
    }
}

// ============================================================================
// System backend
// ============================================================================

/// Opens real devices through the serialport crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortOpener;

struct SystemLink {
    name: String,
    port: Box<dyn serialport::SerialPort>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl SerialLink for SystemLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        // serialport has one timeout for both directions
        self.port.set_timeout(self.write_timeout)?;
        let result = Write::write_all(&mut self.port, data);
        self.port.set_timeout(self.read_timeout)?;
        result
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(&mut self.port)
    }
}

impl PortOpener for SystemPortOpener {
    fn open(&self, config: &LinkConfig) -> Result<Box<dyn SerialLink>, ConnectError> {
        config.validate()?;

        let parity = to_serialport_parity(config.parity).ok_or_else(|| ConnectError::Unsupported {
            port: config.port_name.clone(),
            what: "mark/space parity",
        })?;
        let stop_bits =
            to_serialport_stop_bits(config.stop_bits).ok_or_else(|| ConnectError::Unsupported {
                port: config.port_name.clone(),
                what: "1.5 stop bits",
            })?;

        let port = serialport::new(&config.port_name, config.baud_rate)
            .data_bits(to_serialport_data_bits(config.data_bits))
            .parity(parity)
            .stop_bits(stop_bits)
            .flow_control(to_serialport_flow_control(config.flow_control))
            .timeout(config.read_timeout())
            .open()
            .map_err(|e| ConnectError::from_serialport(&config.port_name, e))?;

        Ok(Box::new(SystemLink {
            name: config.port_name.clone(),
            port,
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
        }))
    }

    fn is_present(&self, port_name: &str) -> bool {
        match serialport::available_ports() {
            Ok(ports) => ports.iter().any(|p| p.port_name == port_name),
            // Enumeration itself failing says nothing about this device
            Err(_) => true,
        }
    }
}

// ============================================================================
// Port handle
// ============================================================================

/// Exclusive owner of one open device. Closing is idempotent.
pub struct PortHandle {
    name: String,
    link: Option<Box<dyn SerialLink>>,
}

impl PortHandle {
    pub fn open(opener: &dyn PortOpener, config: &LinkConfig) -> Result<Self, ConnectError> {
        let link = opener.open(config)?;
        tracing::debug!(port = %config.port_name, "port opened");
        Ok(Self {
            name: config.port_name.clone(),
            link: Some(link),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.link.as_mut() {
            Some(link) => link.read(buf),
            None => Err(closed_error()),
        }
    }

    /// Write `data` in chunks of at most `WRITE_CHUNK_SIZE`, flushing after each.
    pub fn write_chunked(&mut self, data: &[u8]) -> io::Result<()> {
        let link = self.link.as_mut().ok_or_else(closed_error)?;
        for chunk in data.chunks(WRITE_CHUNK_SIZE) {
            link.write_all(chunk)?;
            link.flush()?;
        }
        Ok(())
    }

    /// Release the device. Returns `true` if this call closed it.
    pub fn close(&mut self) -> bool {
        match self.link.take() {
            Some(link) => {
                tracing::debug!(port = %link.name(), "port closed");
                true
            }
            None => false,
        }
    }
}

impl Drop for PortHandle {
    fn drop(&mut self) {
        self.close();
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "port is closed")
}

// ============================================================================
// Enumeration
// ============================================================================

/// Bus a port is attached through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    Usb,
    Bluetooth,
    Pci,
    Unknown,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PortKind::Usb => "USB",
            PortKind::Bluetooth => "Bluetooth",
            PortKind::Pci => "PCI",
            PortKind::Unknown => "unknown",
        })
    }
}

/// Descriptor strings of a USB serial adapter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UsbIdentity {
    pub vid: u16,
    pub pid: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl UsbIdentity {
    /// Best human-readable name: product, else manufacturer.
    pub fn label(&self) -> Option<&str> {
        self.product.as_deref().or(self.manufacturer.as_deref())
    }
}

/// A port the system reports, as offered to `connect`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub port_name: String,
    pub kind: PortKind,
    pub usb: Option<UsbIdentity>,
}

impl From<serialport::SerialPortInfo> for PortInfo {
    fn from(info: serialport::SerialPortInfo) -> Self {
        let (kind, usb) = match info.port_type {
            serialport::SerialPortType::UsbPort(usb) => (
                PortKind::Usb,
                Some(UsbIdentity {
                    vid: usb.vid,
                    pid: usb.pid,
                    manufacturer: usb.manufacturer,
                    product: usb.product,
                    serial_number: usb.serial_number,
                }),
            ),
            serialport::SerialPortType::BluetoothPort => (PortKind::Bluetooth, None),
            serialport::SerialPortType::PciPort => (PortKind::Pci, None),
            serialport::SerialPortType::Unknown => (PortKind::Unknown, None),
        };
        Self {
            port_name: info.port_name,
            kind,
            usb,
        }
    }
}

/// Darwin exposes each device twice. Opening the callin node (`/dev/tty.*`)
/// waits for carrier detect, so only the callout node (`/dev/cu.*`) is offered.
fn is_listed(port_name: &str, darwin: bool) -> bool {
    !(darwin && port_name.starts_with("/dev/tty."))
}

/// Ports that can be handed to `connect`, sorted by name.
pub fn list_ports() -> io::Result<Vec<PortInfo>> {
    let darwin = cfg!(target_os = "macos");
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .map_err(io::Error::from)?
        .into_iter()
        .filter(|info| is_listed(&info.port_name, darwin))
        .map(PortInfo::from)
        .collect();
    ports.sort_by(|a, b| a.port_name.cmp(&b.port_name));
    Ok(ports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::serial::loopback::LoopbackDevice;
    use crate::io::serial::utils::{Parity, StopBits};

    fn config(name: &str) -> LinkConfig {
        let mut config = LinkConfig::new(name, 9600);
        config.read_timeout_ms = 10;
        config
    }

    #[test]
    fn test_close_is_idempotent() {
        let device = LoopbackDevice::new("loop0");
        let mut handle = PortHandle::open(&device.opener(), &config("loop0")).unwrap();
        assert!(handle.is_open());
        assert!(handle.close());
        assert!(!handle.close());
        assert!(!handle.is_open());
        assert_eq!(
            handle.read(&mut [0u8; 4]).unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
    }

    #[test]
    fn test_write_chunked_delivers_everything_in_order() {
        let device = LoopbackDevice::new("loop0");
        let mut handle = PortHandle::open(&device.opener(), &config("loop0")).unwrap();
        let payload: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        handle.write_chunked(&payload).unwrap();
        assert_eq!(device.written(), payload);
        // 3000 bytes -> 3 chunks of at most 1024
        assert_eq!(device.write_calls(), 3);
    }

    #[test]
    fn test_system_opener_rejects_unsupported_settings() {
        let mut cfg = config("/dev/does-not-exist");
        cfg.parity = Parity::Mark;
        let err = SystemPortOpener.open(&cfg).err().unwrap();
        assert!(matches!(err, ConnectError::Unsupported { .. }));

        let mut cfg = config("/dev/does-not-exist");
        cfg.data_bits = 5;
        cfg.stop_bits = StopBits::OnePointFive;
        let err = SystemPortOpener.open(&cfg).err().unwrap();
        assert!(matches!(err, ConnectError::Unsupported { .. }));
    }

    #[test]
    fn test_system_opener_validates_first() {
        let mut cfg = config("COM1");
        cfg.baud_rate = 10;
        let err = SystemPortOpener.open(&cfg).err().unwrap();
        assert!(matches!(err, ConnectError::Config(_)));
    }

    #[test]
    fn test_callin_nodes_hidden_only_on_darwin() {
        assert!(!is_listed("/dev/tty.usbserial-A10", true));
        assert!(is_listed("/dev/cu.usbserial-A10", true));
        assert!(is_listed("/dev/ttyUSB0", true));
        assert!(is_listed("/dev/tty.usbserial-A10", false));
        assert!(is_listed("COM3", false));
    }

    #[test]
    fn test_port_info_from_system_listing() {
        let info = PortInfo::from(serialport::SerialPortInfo {
            port_name: "/dev/ttyS0".into(),
            port_type: serialport::SerialPortType::PciPort,
        });
        assert_eq!(info.port_name, "/dev/ttyS0");
        assert_eq!(info.kind, PortKind::Pci);
        assert!(info.usb.is_none());
        assert_eq!(info.kind.to_string(), "PCI");

        let info = PortInfo::from(serialport::SerialPortInfo {
            port_name: "/dev/rfcomm0".into(),
            port_type: serialport::SerialPortType::BluetoothPort,
        });
        assert_eq!(info.kind, PortKind::Bluetooth);
        assert_eq!(serde_json::to_value(&info).unwrap()["kind"], "bluetooth");
    }

    #[test]
    fn test_usb_label_prefers_product() {
        let mut usb = UsbIdentity {
            vid: 0x0403,
            pid: 0x6001,
            manufacturer: Some("FTDI".into()),
            product: Some("FT232R USB UART".into()),
            serial_number: None,
        };
        assert_eq!(usb.label(), Some("FT232R USB UART"));
        usb.product = None;
        assert_eq!(usb.label(), Some("FTDI"));
    }
}
