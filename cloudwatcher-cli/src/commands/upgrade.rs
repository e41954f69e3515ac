//! Firmware upgrade command implementation.

use {
    crate::{Cli, attach_station, config::Config, open_station, use_fancy_output},
    anyhow::{Context, Result},
    cloudwatcher::{
        Error, FirmwareImage, ProgressObserver, ProgressSnapshot, UpgradeSettings,
    },
    console::style,
    indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle},
    std::path::Path,
};

/// Progress bar fed by the upgrade state machine.
struct BarProgress {
    bar: ProgressBar,
    sync_threshold: u32,
    transferring: bool,
}

impl BarProgress {
    fn new(quiet: bool, total: usize, sync_threshold: u32) -> Self {
        let bar = if quiet || !use_fancy_output() {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(total as u64);
            bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
            );
            bar.set_draw_target(ProgressDrawTarget::stderr());
            bar
        };

        Self {
            bar,
            sync_threshold,
            transferring: false,
        }
    }
}

impl ProgressObserver for BarProgress {
    fn on_progress(&mut self, snapshot: &ProgressSnapshot) {
        if snapshot.done {
            self.bar.finish_with_message("complete");
            return;
        }

        if snapshot.transferring {
            if !self.transferring {
                self.transferring = true;
                self.bar.set_message("transferring");
            }
            self.bar.set_position(snapshot.bytes_sent() as u64);
        } else {
            self.bar.set_message(format!(
                "waiting for bootloader ({}/{} sync)",
                snapshot.sync_count, self.sync_threshold
            ));
        }
    }
}

/// Upgrade command implementation.
pub(crate) fn cmd_upgrade(
    cli: &Cli,
    config: &Config,
    firmware: &Path,
    reboot_first: bool,
) -> Result<()> {
    if !cli.quiet {
        eprintln!(
            "{} Loading firmware from {}",
            style("📦").cyan(),
            firmware.display()
        );
    }

    let image = FirmwareImage::from_file(firmware)
        .with_context(|| format!("cannot load firmware {}", firmware.display()))?;

    // A station in its bootloader answers commands with sync bytes
    let mut station = if reboot_first {
        open_station(cli, config)?
    } else {
        attach_station(cli, config)?
    };

    if reboot_first {
        let version = station
            .reboot_into_bootloader()
            .context("bootloader reboot failed")?;
        if !cli.quiet {
            eprintln!(
                "{} Rebooted station (firmware {version}) into its bootloader",
                style("🔄").cyan()
            );
        }
    }

    if !cli.quiet {
        eprintln!(
            "{} Uploading {} bytes, do not disconnect the station",
            style("⏳").yellow(),
            image.len()
        );
    }

    let settings = UpgradeSettings::default();
    let mut progress = BarProgress::new(cli.quiet, image.len(), settings.sync_threshold);

    let report = match station.upgrade(&image, &settings, &mut progress) {
        Ok(report) => report,
        Err(e @ Error::StuckInUpgradeMode(_)) => {
            progress.bar.abandon_with_message("stuck");
            return Err(e).context(
                "the station is still in upgrade mode; power-cycle it and retry the upgrade",
            );
        },
        Err(e) => {
            progress.bar.abandon_with_message("failed");
            return Err(e).context("firmware upgrade failed");
        },
    };

    if !cli.quiet {
        eprintln!(
            "\n{} Firmware upgrade completed ({} bytes, {} sync, {} unknown, {} trailing)",
            style("🎉").green().bold(),
            report.total_length,
            report.sync_count,
            report.unknown_count,
            report.drained
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_progress_tracks_phases() {
        let mut progress = BarProgress::new(true, 100, 10);

        progress.on_progress(&ProgressSnapshot {
            sync_count: 3,
            ..Default::default()
        });
        assert!(!progress.transferring);

        progress.on_progress(&ProgressSnapshot {
            sync_count: 10,
            low_cursor: 4,
            high_cursor: -1,
            total_length: 100,
            transferring: true,
            ..Default::default()
        });
        assert!(progress.transferring);
        assert_eq!(progress.bar.position(), 4);

        progress.on_progress(&ProgressSnapshot {
            done: true,
            ..Default::default()
        });
        assert!(progress.bar.is_finished());
    }
}
