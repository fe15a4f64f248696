//! Serial port handling
//!
//! Opens and configures the port the modem hangs off of, and enumerates
//! candidate devices for host applications that let the user pick one.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::time::Duration;

use super::{DriverError, DEFAULT_BAUD_RATE};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product) = match info.port_type {
            SerialPortType::UsbPort(usb) => (Some(usb.vid), Some(usb.pid), usb.product),
            _ => (None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            product,
        }
    }
}

/// List available serial ports, USB adapters first, in a stable order.
/// RockBLOCK boards show up as FTDI USB serial devices.
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortInfo::from)
        .collect();
    ports.sort_by_key(|p| (p.vid.is_none(), p.name.clone()));
    ports
}

/// Open a serial port with the given baud rate (19200 is the modem default)
pub fn open_port(
    name: &str,
    baud_rate: Option<u32>,
) -> Result<Box<dyn SerialPort>, DriverError> {
    let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);

    // Short read timeout keeps the pump loop responsive
    serialport::new(name, baud)
        .timeout(Duration::from_millis(100))
        .open()
        .map_err(|e| DriverError::TransportError(e.to_string()))
}

/// Configure a serial port for the 9602/9603 transceiver: 8N1, optional
/// hardware flow control (the only flow-control knob the modem family has)
pub fn configure_port(
    port: &mut dyn SerialPort,
    flow_control: bool,
) -> Result<(), DriverError> {
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| DriverError::TransportError(e.to_string()))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| DriverError::TransportError(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| DriverError::TransportError(e.to_string()))?;

    let fc = if flow_control {
        serialport::FlowControl::Hardware
    } else {
        serialport::FlowControl::None
    };
    port.set_flow_control(fc)
        .map_err(|e| DriverError::TransportError(e.to_string()))?;

    Ok(())
}

/// Clear the serial port buffers
pub fn clear_buffers(port: &mut dyn SerialPort) -> Result<(), DriverError> {
    port.clear(serialport::ClearBuffer::All)
        .map_err(|e| DriverError::TransportError(e.to_string()))
}
