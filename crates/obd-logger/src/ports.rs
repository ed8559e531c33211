//! Serial port discovery

use anyhow::{bail, Context};
use tokio_serial::{SerialPortInfo, SerialPortType};
use tracing::{info, warn};

/// Every serial port the OS reports
pub fn available() -> anyhow::Result<Vec<SerialPortInfo>> {
    tokio_serial::available_ports().context("Failed to enumerate serial ports")
}

/// Prefer the first USB adapter, otherwise the first port
pub fn select_port(ports: &[SerialPortInfo]) -> Option<&SerialPortInfo> {
    ports.iter().find(|p| is_usb(p)).or_else(|| ports.first())
}

/// Pick a port for `auto`
pub fn discover() -> anyhow::Result<String> {
    let ports = available()?;
    info!("Found {} serial ports", ports.len());

    let Some(port) = select_port(&ports) else {
        bail!("No serial ports found");
    };
    if is_usb(port) {
        info!("Using {}", port.port_name);
    } else {
        warn!(
            "No USB serial ports found. Using first port found: {}",
            port.port_name
        );
    }
    Ok(port.port_name.clone())
}

/// One line per port for `obd-logger ports`
pub fn describe(port: &SerialPortInfo) -> String {
    let kind = match &port.port_type {
        SerialPortType::UsbPort(usb) => format!(
            "USB {:04x}:{:04x} {}",
            usb.vid,
            usb.pid,
            usb.product.as_deref().unwrap_or("")
        ),
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        SerialPortType::Unknown => "unknown".to_string(),
    };
    format!("{}\t{}", port.port_name, kind.trim_end())
}

fn is_usb(port: &SerialPortInfo) -> bool {
    matches!(port.port_type, SerialPortType::UsbPort(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, port_type: SerialPortType) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_string(),
            port_type,
        }
    }

    #[test]
    fn test_falls_back_to_first_port() {
        let ports = vec![
            port("/dev/ttyS0", SerialPortType::Unknown),
            port("/dev/ttyS1", SerialPortType::PciPort),
        ];
        assert_eq!(select_port(&ports).unwrap().port_name, "/dev/ttyS0");
        assert!(select_port(&[]).is_none());
    }

    #[test]
    fn test_describes_non_usb_ports() {
        assert_eq!(
            describe(&port("/dev/rfcomm0", SerialPortType::BluetoothPort)),
            "/dev/rfcomm0\tBluetooth"
        );
    }
}
