//! Native serial link using the `serialport` crate.
//!
//! This module provides the link implementation for native platforms
//! (Linux, macOS, Windows, FreeBSD, etc.).

use {
    crate::{
        error::{Error, Result},
        link::{DataBits, Link, LinkConfig, Parity, PortInfo, StopBits},
    },
    log::{debug, trace},
    serialport::ClearBuffer,
    std::io::{self, Read, Write},
};

/// Native serial link.
pub struct NativeLink {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
    config: LinkConfig,
}

impl NativeLink {
    /// Open a serial port with the given configuration.
    pub fn open(port_name: &str, config: &LinkConfig) -> Result<Self> {
        let port = Self::open_port(port_name, config)?;
        debug!(
            "Opened {port_name} at {} baud ({:?} parity)",
            config.baud_rate, config.parity
        );

        Ok(Self {
            port: Some(port),
            name: port_name.to_string(),
            config: config.clone(),
        })
    }

    fn open_port(port_name: &str, config: &LinkConfig) -> Result<Box<dyn serialport::SerialPort>> {
        if config.inter_byte_timeout.is_some() {
            trace!("Inter-byte timeout not supported by serialport, using read timeout only");
        }
        Ok(serialport::new(port_name, config.baud_rate)
            .timeout(config.timeout)
            .data_bits(config.data_bits.into())
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .flow_control(serialport::FlowControl::None)
            .open()?)
    }

    fn port_mut(&mut self) -> io::Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port closed"))
    }
}

impl Link for NativeLink {
    fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn reconfigure(&mut self, config: &LinkConfig) -> Result<()> {
        if let Some(ref mut p) = self.port {
            p.set_baud_rate(config.baud_rate)?;
            p.set_timeout(config.timeout)?;
            p.set_data_bits(config.data_bits.into())?;
            p.set_parity(config.parity.into())?;
            p.set_stop_bits(config.stop_bits.into())?;
        }
        trace!(
            "Reconfigured {} to {} baud, timeout {:?}",
            self.name, config.baud_rate, config.timeout
        );
        self.config = config.clone();
        Ok(())
    }

    fn clear_input(&mut self) -> Result<()> {
        if let Some(ref mut p) = self.port {
            p.clear(ClearBuffer::Input)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the handle closes the port
        self.port.take();
        Ok(())
    }

    fn reopen(&mut self) -> Result<()> {
        self.port.take();
        let port = Self::open_port(&self.name, &self.config)?;
        self.port = Some(port);
        debug!("Reopened {}", self.name);
        Ok(())
    }
}

impl Read for NativeLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port_mut()?.read(buf)
    }
}

impl Write for NativeLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port_mut()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port_mut()?.flush()
    }
}

/// List the serial ports present on this host.
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().map_err(Error::Serial)?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let (vid, pid, manufacturer, product) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    Some(info.vid),
                    Some(info.pid),
                    info.manufacturer,
                    info.product,
                ),
                _ => (None, None, None, None),
            };

            PortInfo {
                name: p.port_name,
                vid,
                pid,
                manufacturer,
                product,
            }
        })
        .collect())
}

// Type conversions from our types to serialport types

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => Self::Seven,
            DataBits::Eight => Self::Eight,
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => Self::None,
            Parity::Odd => Self::Odd,
            Parity::Even => Self::Even,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => Self::One,
            StopBits::Two => Self::Two,
        }
    }
}
