//! Serial port transport
//!
//! Wraps the `serialport` crate behind the [`Transport`] trait the engine
//! writes to and reads from. Physical writes are serialized by one write
//! lock, so queued traffic and priority bytes never interleave mid-frame.
//! Reads go through a cloned handle with a short timeout so the reader
//! thread notices shutdown promptly.

use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::time::Duration;
use tinygkit_core::{ConnectionError, Error, Result};

/// Byte transport to the controller
pub trait Transport: Send + Sync {
    /// Write all of `data`; implementations serialize concurrent callers
    fn write_bytes(&self, data: &[u8]) -> io::Result<()>;

    /// Read available bytes; `Ok(0)` means nothing arrived before the timeout
    fn read_bytes(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Port name for logging
    fn name(&self) -> String;

    /// Release the device handle; later reads and writes fail
    fn close(&self) -> io::Result<()>;
}

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB FTDI Serial Port")
    pub description: String,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

/// List ports a TinyG could be attached to
///
/// - Windows: COM*
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        Error::other(format!("Failed to enumerate ports: {}", e))
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_candidate_port(&port.port_name))
        .map(|port| {
            let (vid, pid) = match &port.port_type {
                serialport::SerialPortType::UsbPort(usb) => (Some(usb.vid), Some(usb.pid)),
                _ => (None, None),
            };
            SerialPortInfo {
                port_name: port.port_name.clone(),
                description: port_description(port),
                vid,
                pid,
            }
        })
        .collect())
}

fn is_candidate_port(port_name: &str) -> bool {
    if let Some(rest) = port_name.strip_prefix("COM") {
        return !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit());
    }
    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

fn port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb) => format!(
            "USB {} {}",
            usb.manufacturer.as_deref().unwrap_or("Device"),
            usb.product.as_deref().unwrap_or("Serial Port")
        ),
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Serial transport backed by the `serialport` crate
pub struct SerialTransport {
    name: String,
    writer: Mutex<Option<Box<dyn serialport::SerialPort>>>,
    reader: Mutex<Option<Box<dyn serialport::SerialPort>>>,
}

impl SerialTransport {
    /// Open `port` at `baud`, 8N1, no hardware flow control
    pub fn open(port: &str, baud: u32, read_timeout: Duration) -> Result<Self> {
        if baud == 0 {
            return Err(ConnectionError::InvalidParameters {
                reason: "baud rate must be non-zero".to_string(),
            }
            .into());
        }

        let writer = serialport::new(port, baud)
            .timeout(read_timeout)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", port, e);
                ConnectionError::FailedToOpen {
                    port: port.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let reader = writer.try_clone().map_err(|e| ConnectionError::FailedToOpen {
            port: port.to_string(),
            reason: format!("cannot clone handle for reading: {}", e),
        })?;

        Ok(Self {
            name: port.to_string(),
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(reader)),
        })
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "serial port closed")
}

impl Transport for SerialTransport {
    fn write_bytes(&self, data: &[u8]) -> io::Result<()> {
        let mut guard = self.writer.lock();
        let port = guard.as_mut().ok_or_else(closed_error)?;
        port.write_all(data)?;
        port.flush()
    }

    fn read_bytes(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut guard = self.reader.lock();
        let port = guard.as_mut().ok_or_else(closed_error)?;
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn close(&self) -> io::Result<()> {
        self.writer.lock().take();
        self.reader.lock().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_ports() {
        assert!(is_candidate_port("COM3"));
        assert!(is_candidate_port("/dev/ttyUSB0"));
        assert!(is_candidate_port("/dev/ttyACM1"));
        assert!(is_candidate_port("/dev/cu.usbserial-DA00"));
        assert!(!is_candidate_port("COM"));
        assert!(!is_candidate_port("COMX"));
        assert!(!is_candidate_port("/dev/ttyS0"));
    }

    #[test]
    fn test_open_rejects_zero_baud() {
        let result = SerialTransport::open("/dev/ttyUSB0", 0, Duration::from_millis(10));
        assert!(result.is_err());
    }
}
