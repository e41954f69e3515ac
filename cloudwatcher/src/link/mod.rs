//! Link abstraction for the station's byte stream.
//!
//! The protocol engine never talks to a serial port directly. It drives a
//! [`Link`]: an ordered, possibly lossy duplex byte stream with blocking reads
//! bounded by a per-read timeout. A read that times out comes back short (or
//! empty) instead of failing, and the engine decides what a short read means:
//!
//! - in normal command mode it is a transient fault handed to the
//!   [`ConnectionGuard`](crate::guard::ConnectionGuard);
//! - during a firmware upgrade it is either fatal or, while draining, the
//!   success signal.
//!
//! ```text
//! +-------------------+   +---------------------+
//! |  Command engine   |   |  Upgrade machine    |
//! +---------+---------+   +----------+----------+
//!           |                        |
//!           v                        v
//! +---------+------------------------+----------+
//! |                 Link trait                  |
//! +---------+------------------------+----------+
//!           |                        |
//!           v                        v
//! +---------+---------+   +----------+----------+
//! |  NativeLink       |   |  any other stream   |
//! |  (serialport)     |   |  (tests, TCP, ...)  |
//! +-------------------+   +---------------------+
//! ```

#[cfg(test)]
pub(crate) mod mock;
#[cfg(feature = "native")]
pub mod native;

use {
    crate::error::Result,
    std::{
        io::{ErrorKind, Read, Write},
        time::Duration,
    },
};

/// Number of data bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataBits {
    /// 7 data bits.
    Seven,
    /// 8 data bits.
    #[default]
    Eight,
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity.
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    /// 1 stop bit.
    #[default]
    One,
    /// 2 stop bits.
    Two,
}

/// Line settings of a link.
///
/// The engine owns one of these per link. Only the firmware upgrade swaps it,
/// and it restores the saved value on every exit path but one (see
/// [`Error::StuckInUpgradeMode`](crate::Error::StuckInUpgradeMode)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Baud rate.
    pub baud_rate: u32,
    /// Data bits.
    pub data_bits: DataBits,
    /// Parity.
    pub parity: Parity,
    /// Stop bits.
    pub stop_bits: StopBits,
    /// Per-read timeout.
    pub timeout: Duration,
    /// Maximum gap between two bytes of one read, if the link supports it.
    pub inter_byte_timeout: Option<Duration>,
}

impl LinkConfig {
    /// Baud rate of normal command mode.
    pub const NORMAL_BAUD: u32 = 9600;

    /// Baud rate of firmware upgrade mode.
    pub const UPGRADE_BAUD: u32 = 57600;

    /// Per-read timeout of normal command mode.
    pub const NORMAL_TIMEOUT: Duration = Duration::from_secs(2);

    /// Normal command mode: 9600 8N1, 2 s read timeout.
    pub fn normal() -> Self {
        Self {
            baud_rate: Self::NORMAL_BAUD,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: Self::NORMAL_TIMEOUT,
            inter_byte_timeout: None,
        }
    }

    /// Normal mode of older firmware: 9600 8O1 with a 2 s inter-byte timeout.
    pub fn legacy() -> Self {
        Self {
            parity: Parity::Odd,
            inter_byte_timeout: Some(Self::NORMAL_TIMEOUT),
            ..Self::normal()
        }
    }

    /// Firmware upgrade mode: 57600 8N1 with the given read timeout.
    pub fn upgrade(timeout: Duration) -> Self {
        Self {
            baud_rate: Self::UPGRADE_BAUD,
            timeout,
            ..Self::normal()
        }
    }

    /// Set the per-read timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the baud rate.
    #[must_use]
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::normal()
    }
}

/// Serial port information.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
}

/// Duplex byte stream the engine drives.
///
/// `read` must block for at most the configured timeout and then return
/// `Ok(0)` or an [`ErrorKind::TimedOut`] error; both are treated as a
/// timeout by [`read_up_to`] and [`read_byte`].
pub trait Link: Read + Write + Send {
    /// Current line settings.
    fn config(&self) -> &LinkConfig;

    /// Apply new line settings to the open link.
    fn reconfigure(&mut self, config: &LinkConfig) -> Result<()>;

    /// Discard bytes received but not yet read.
    fn clear_input(&mut self) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Close the link. Further I/O fails until [`Link::reopen`] succeeds.
    fn close(&mut self) -> Result<()>;

    /// Re-acquire the link with its current settings.
    fn reopen(&mut self) -> Result<()>;

    /// Change only the per-read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        let config = self
            .config()
            .clone()
            .with_timeout(timeout);
        self.reconfigure(&config)
    }

    /// Write all bytes, blocking until complete.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        Write::write_all(self, buf)?;
        Write::flush(self)?;
        Ok(())
    }
}

/// Read until `buf` is full or the link times out.
///
/// Returns the number of bytes read; anything less than `buf.len()` means
/// the link timed out first.
pub fn read_up_to<R: Read + ?Sized>(link: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match link.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {},
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Read a single byte, or `None` on timeout.
pub fn read_byte<R: Read + ?Sized>(link: &mut R) -> Result<Option<u8>> {
    let mut buf = [0u8; 1];
    match read_up_to(link, &mut buf)? {
        0 => Ok(None),
        _ => Ok(Some(buf[0])),
    }
}

#[cfg(feature = "native")]
pub use native::{NativeLink, list_ports};
