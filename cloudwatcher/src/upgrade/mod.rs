//! Firmware upgrade over the station link.
//!
//! The upgrade repurposes the link as a raw byte channel driven by the
//! station's bootloader. It runs in three phases:
//!
//! ```text
//!  AWAITING_SYNC ──(10 sync bytes)──> SYNCHRONIZED ──ack──> TRANSFER
//!        │                                                    │
//!    timeout: SyncTimeout                        both halves sent / timeout:
//!                                                TransferTimeout
//!                                                             │
//!                                                             v
//!                        DRAIN ── timeout before cap ──> restore link, done
//!                          └──── cap reached ─────────> StuckInUpgradeMode
//! ```
//!
//! 1. **Preamble.** The bootloader emits sync bytes (`'c'`, or `0xE3` when
//!    a reboot glitch sets the top bit). Once ten have been counted, not
//!    necessarily in a row, the host acknowledges with `'d'`.
//! 2. **Transfer.** The bootloader requests bytes one at a time with `'0'`
//!    (low half) or `'1'` (high half). Each half starts with its length byte.
//! 3. **Drain.** After the last byte the station reboots and sends a short
//!    burst of trailing bytes. Silence before [`UpgradeSettings::drain_cap`]
//!    bytes means it left the bootloader.
//!
//! Any timeout before the drain phase aborts the upgrade. Faults are never
//! retried here: a half-written image must not be reported as success.
//!
//! The link settings are swapped for the upgrade and restored on every exit
//! path except [`Error::StuckInUpgradeMode`], where the station is still
//! talking at upgrade speed.

pub mod image;
pub mod progress;

pub use {
    image::{FirmwareImage, Half, MAX_FIRMWARE_LEN, TransferCursor},
    progress::{FnProgress, NoProgress, ProgressObserver, ProgressSnapshot},
};

use {
    crate::{
        error::{Error, Result},
        link::{Link, LinkConfig, read_byte},
    },
    log::{debug, info, trace, warn},
    std::time::Duration,
};

/// Sync byte emitted by the bootloader.
pub const SYNC_BYTE: u8 = b'c';

/// Sync byte as seen when the reboot glitch sets its top bit.
pub const SYNC_BYTE_GLITCHED: u8 = SYNC_BYTE | 0x80;

/// Host acknowledgement after the preamble.
pub const ACK_BYTE: u8 = b'd';

/// Token requesting the next low-half byte.
pub const TOKEN_LOW: u8 = b'0';

/// Token requesting the next high-half byte.
pub const TOKEN_HIGH: u8 = b'1';

/// Upgrade tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeSettings {
    /// Baud rate of the bootloader.
    pub baud_rate: u32,
    /// Read timeout while waiting for the preamble.
    pub sync_timeout: Duration,
    /// Read timeout between transfer tokens.
    pub transfer_timeout: Duration,
    /// Read timeout while draining trailing bytes.
    pub drain_timeout: Duration,
    /// Sync bytes required before acknowledging.
    pub sync_threshold: u32,
    /// Trailing bytes tolerated before declaring the station stuck.
    pub drain_cap: usize,
    /// Bytes counted as sync, during the preamble and as transfer noise.
    pub sync_bytes: [u8; 2],
    /// Byte written once the preamble completes.
    pub ack_byte: u8,
}

impl Default for UpgradeSettings {
    fn default() -> Self {
        Self {
            baud_rate: LinkConfig::UPGRADE_BAUD,
            sync_timeout: Duration::from_secs(5),
            transfer_timeout: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(1),
            sync_threshold: 10,
            drain_cap: 1000,
            sync_bytes: [SYNC_BYTE, SYNC_BYTE_GLITCHED],
            ack_byte: ACK_BYTE,
        }
    }
}

impl UpgradeSettings {
    /// Set the preamble read timeout.
    #[must_use]
    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Set the per-token read timeout.
    #[must_use]
    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    /// Set the drain read timeout.
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Set the bootloader baud rate.
    #[must_use]
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    fn is_sync(&self, byte: u8) -> bool {
        self.sync_bytes.contains(&byte)
    }
}

/// Summary of a successful upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeReport {
    /// Sync bytes seen during preamble and transfer.
    pub sync_count: u32,
    /// Unrecognized bytes seen during preamble and transfer.
    pub unknown_count: u32,
    /// Trailing bytes read before the station went quiet.
    pub drained: usize,
    /// Image length.
    pub total_length: usize,
}

/// Run a complete firmware upgrade over `link`.
///
/// The station must already be in its bootloader (see
/// [`CloudWatcher::reboot_into_bootloader`](crate::CloudWatcher::reboot_into_bootloader)).
pub fn run<L: Link + ?Sized>(
    link: &mut L,
    image: &FirmwareImage,
    settings: &UpgradeSettings,
    observer: &mut dyn ProgressObserver,
) -> Result<UpgradeReport> {
    let saved = link.config().clone();
    let upgrade_config =
        LinkConfig::upgrade(settings.sync_timeout).with_baud_rate(settings.baud_rate);

    info!(
        "Starting firmware upgrade on {} ({} bytes)",
        link.name(),
        image.len()
    );

    let mut session = Session::new(image, settings, observer);
    let result = link
        .reconfigure(&upgrade_config)
        .and_then(|()| session.run(link));

    match result {
        Err(Error::StuckInUpgradeMode(n)) => {
            warn!("Station did not leave upgrade mode; link left at upgrade settings");
            Err(Error::StuckInUpgradeMode(n))
        },
        Err(e) => {
            if let Err(restore) = link.reconfigure(&saved) {
                warn!("Failed to restore link settings after upgrade error: {restore}");
            }
            Err(e)
        },
        Ok(report) => {
            link.reconfigure(&saved)?;
            session.notify(true, false);
            info!("Firmware upgrade complete");
            Ok(report)
        },
    }
}

struct Session<'a> {
    image: &'a FirmwareImage,
    settings: &'a UpgradeSettings,
    observer: &'a mut dyn ProgressObserver,
    sync_count: u32,
    unknown_count: u32,
    low: TransferCursor,
    high: TransferCursor,
}

impl<'a> Session<'a> {
    fn new(
        image: &'a FirmwareImage,
        settings: &'a UpgradeSettings,
        observer: &'a mut dyn ProgressObserver,
    ) -> Self {
        Self {
            image,
            settings,
            observer,
            sync_count: 0,
            unknown_count: 0,
            low: TransferCursor::new(image.half(Half::Low).len()),
            high: TransferCursor::new(image.half(Half::High).len()),
        }
    }

    fn run<L: Link + ?Sized>(&mut self, link: &mut L) -> Result<UpgradeReport> {
        self.synchronize(link)?;
        self.transfer(link)?;
        let drained = self.drain(link)?;

        Ok(UpgradeReport {
            sync_count: self.sync_count,
            unknown_count: self.unknown_count,
            drained,
            total_length: self.image.len(),
        })
    }

    fn snapshot(&self, done: bool, transferring: bool) -> ProgressSnapshot {
        ProgressSnapshot {
            sync_count: self.sync_count,
            low_cursor: self.low.position(),
            high_cursor: self.high.position(),
            total_length: self.image.len(),
            unknown_count: self.unknown_count,
            done,
            transferring,
        }
    }

    fn notify(&mut self, done: bool, transferring: bool) {
        let snapshot = self.snapshot(done, transferring);
        self.observer.on_progress(&snapshot);
    }

    fn synchronize<L: Link + ?Sized>(&mut self, link: &mut L) -> Result<()> {
        debug!(
            "Waiting for {} sync bytes",
            self.settings.sync_threshold
        );

        while self.sync_count < self.settings.sync_threshold {
            let Some(byte) = read_byte(link)? else {
                return Err(Error::SyncTimeout {
                    sync_count: self.sync_count,
                });
            };
            if self.settings.is_sync(byte) {
                self.sync_count += 1;
            } else {
                trace!("Unknown preamble byte 0x{byte:02X}");
                self.unknown_count += 1;
            }
            self.notify(false, false);
        }

        link.write_all_bytes(&[self.settings.ack_byte])?;
        link.set_timeout(self.settings.transfer_timeout)?;
        info!(
            "Bootloader synchronized ({} sync, {} unknown)",
            self.sync_count, self.unknown_count
        );
        Ok(())
    }

    fn transfer<L: Link + ?Sized>(&mut self, link: &mut L) -> Result<()> {
        while !(self.low.is_complete() && self.high.is_complete()) {
            let Some(token) = read_byte(link)? else {
                return Err(Error::TransferTimeout {
                    low: self.low.position(),
                    low_len: self.low.len(),
                    high: self.high.position(),
                    high_len: self.high.len(),
                });
            };

            match token {
                TOKEN_LOW => self.send_next(link, Half::Low)?,
                TOKEN_HIGH => self.send_next(link, Half::High)?,
                byte if self.settings.is_sync(byte) => self.sync_count += 1,
                byte => {
                    trace!("Unknown transfer token 0x{byte:02X}");
                    self.unknown_count += 1;
                },
            }
            self.notify(false, true);
        }

        info!("Firmware image sent ({} bytes)", self.image.len());
        Ok(())
    }

    fn send_next<L: Link + ?Sized>(&mut self, link: &mut L, half: Half) -> Result<()> {
        let cursor = match half {
            Half::Low => &mut self.low,
            Half::High => &mut self.high,
        };

        match cursor.next_byte(self.image.length_prefix(half), self.image.half(half)) {
            Some(byte) => {
                link.write_all_bytes(&[byte])?;
                cursor.advance();
            },
            None => {
                // Request for a half that is already complete
                debug!("Ignoring request for completed {half:?} half");
                self.unknown_count += 1;
            },
        }
        Ok(())
    }

    fn drain<L: Link + ?Sized>(&mut self, link: &mut L) -> Result<usize> {
        link.set_timeout(self.settings.drain_timeout)?;

        for drained in 0..self.settings.drain_cap {
            match read_byte(link)? {
                None => {
                    debug!("Station quiet after {drained} trailing bytes");
                    return Ok(drained);
                },
                Some(byte) => trace!("Trailing byte 0x{byte:02X}"),
            }
        }

        Err(Error::StuckInUpgradeMode(self.settings.drain_cap))
    }
}
