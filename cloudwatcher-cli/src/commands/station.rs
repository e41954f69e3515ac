//! Station query command implementations.

use {
    crate::{
        Cli, CliError, config::Config, get_anemometer, install_interrupt_handler, open_station,
        was_interrupted,
    },
    anyhow::{Context, Result},
    cloudwatcher::{
        CloudWatcher, Error, InternalErrors, Link,
        convert::{self, Anemometer},
    },
    console::style,
    log::debug,
    serde::Serialize,
    std::{
        thread,
        time::{Duration, Instant, SystemTime, UNIX_EPOCH},
    },
};

/// One reading of every sensor, converted to physical units.
#[derive(Debug, Serialize)]
pub(crate) struct Sweep {
    /// Unix time of the reading.
    pub timestamp: u64,
    /// Sky infrared temperature in °C.
    pub sky_temperature: f64,
    /// Infrared sensor temperature in °C.
    pub ir_sensor_temperature: f64,
    /// Rain sensor frequency.
    pub rain_frequency: i64,
    /// Rain sensor temperature in °C.
    pub rain_sensor_temperature: f64,
    /// Relative ambient light in `[0, 1]`.
    pub ambient_light: f64,
    /// Relay switch open.
    pub switch_open: bool,
    /// Rain sensor heater PWM.
    pub heater_pwm: i64,
    /// Wind speed in km/h, if an anemometer is connected.
    pub wind_speed: Option<f64>,
    /// Relative humidity in percent, if the sensor is connected.
    pub humidity: Option<f64>,
    /// Ambient temperature in °C, if the sensor is connected.
    pub temperature: Option<f64>,
    /// Internal error counters.
    pub internal_errors: InternalErrors,
}

/// Treat a disconnected sensor as a missing value.
fn optional<T>(result: cloudwatcher::Result<T>) -> cloudwatcher::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(Error::SensorNotConnected(sensor)) => {
            debug!("{sensor} sensor not connected");
            Ok(None)
        },
        Err(e) => Err(e),
    }
}

/// Read every sensor once.
pub(crate) fn sweep<L: Link>(
    station: &mut CloudWatcher<L>,
    anemometer: Anemometer,
) -> cloudwatcher::Result<Sweep> {
    let constants = match station.cached_constants().copied() {
        Some(constants) => constants,
        None => station.electrical_constants()?,
    };

    let analog = station.analog_values()?;
    let wind_speed = if station.wind_sensor_present()? {
        Some(convert::wind_speed(station.wind_sensor_raw()?, anemometer))
    } else {
        None
    };

    Ok(Sweep {
        timestamp: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs()),
        sky_temperature: convert::ir_temperature(station.sky_ir_raw()?),
        ir_sensor_temperature: convert::ir_temperature(station.ir_sensor_raw()?),
        rain_frequency: station.rain_frequency()?,
        rain_sensor_temperature: convert::rain_sensor_temperature(analog.rain_sensor_temp),
        ambient_light: convert::relative_ambient_light(analog.ldr_voltage, &constants),
        switch_open: station.switch_status()?,
        heater_pwm: station.heater_pwm()?,
        wind_speed,
        humidity: optional(station.humidity_raw())?.map(convert::relative_humidity),
        temperature: optional(station.temperature_raw())?.map(convert::temperature),
        internal_errors: station.internal_errors()?,
    })
}

fn format_optional(value: Option<f64>, unit: &str) -> String {
    value.map_or_else(
        || style("not connected").dim().to_string(),
        |v| format!("{v:.1}{unit}"),
    )
}

fn print_sweep(sweep: &Sweep) {
    let rows = [
        ("Sky temperature", format!("{:.2} °C", sweep.sky_temperature)),
        ("IR sensor temperature", format!("{:.2} °C", sweep.ir_sensor_temperature)),
        ("Rain frequency", sweep.rain_frequency.to_string()),
        ("Rain sensor temperature", format!("{:.1} °C", sweep.rain_sensor_temperature)),
        ("Ambient light", format!("{:.0}%", sweep.ambient_light * 100.0)),
        ("Relay switch", if sweep.switch_open { "open" } else { "closed" }.to_string()),
        ("Heater PWM", sweep.heater_pwm.to_string()),
        ("Wind speed", format_optional(sweep.wind_speed, " km/h")),
        ("Humidity", format_optional(sweep.humidity, "%")),
        ("Temperature", format_optional(sweep.temperature, " °C")),
    ];

    for (label, value) in rows {
        eprintln!("  {:<24} {value}", format!("{label}:"));
    }

    let errors = &sweep.internal_errors;
    let total = errors.first_address_byte
        + errors.command_byte
        + errors.second_address_byte
        + errors.pec_byte;
    if total > 0 {
        eprintln!(
            "  {:<24} {}",
            "Internal errors:",
            style(format!(
                "{} / {} / {} / {}",
                errors.first_address_byte,
                errors.command_byte,
                errors.second_address_byte,
                errors.pec_byte
            ))
            .yellow()
        );
    }
}

/// Info command implementation.
pub(crate) fn cmd_info(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let mut station = open_station(cli, config)?;

    let name = station.internal_name().context("cannot read station name")?;
    let version = station.version().context("cannot read firmware version")?;
    let serial = station.serial_number().context("cannot read serial number")?;

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "name": name,
                "version": version,
                "serial_number": serial,
                "variant": station.variant().to_string(),
                "electrical_constants": station.cached_constants(),
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!("\n{}", style("Station").bold().underlined());
    eprintln!("  Name:          {}", style(&name).cyan());
    eprintln!("  Firmware:      {version}");
    eprintln!("  Serial number: {serial}");
    if let Some(constants) = station.cached_constants() {
        eprintln!("  Zener voltage: {:.2} V", constants.zener_voltage);
    }

    Ok(())
}

/// Read command implementation.
pub(crate) fn cmd_read(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let anemometer = get_anemometer(cli, config)?;
    let mut station = open_station(cli, config)?;
    let reading = sweep(&mut station, anemometer).context("sensor read failed")?;

    if json {
        let output = serde_json::json!({ "ok": true, "data": reading });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        eprintln!("\n{}", style("Readings").bold().underlined());
        print_sweep(&reading);
    }

    Ok(())
}

/// Watch command implementation.
pub(crate) fn cmd_watch(cli: &Cli, config: &Config, interval: u64, json: bool) -> Result<()> {
    if interval == 0 {
        return Err(CliError::Usage("interval must be at least 1 second".to_string()).into());
    }

    let anemometer = get_anemometer(cli, config)?;
    let mut station = open_station(cli, config)?;
    install_interrupt_handler();

    if !cli.quiet {
        eprintln!(
            "{}",
            style(format!("Reading every {interval} s, Ctrl-C to stop")).dim()
        );
    }

    let period = Duration::from_secs(interval);
    loop {
        let started = Instant::now();
        let reading = sweep(&mut station, anemometer).context("sensor read failed")?;

        if json {
            println!("{}", serde_json::to_string(&reading)?);
        } else {
            eprintln!();
            print_sweep(&reading);
        }

        while started.elapsed() < period {
            if was_interrupted() {
                return Err(CliError::Cancelled("interrupted".to_string()).into());
            }
            thread::sleep(Duration::from_millis(100));
        }
    }
}

/// PWM command implementation.
pub(crate) fn cmd_pwm(cli: &Cli, config: &Config, value: Option<u16>) -> Result<()> {
    let mut station = open_station(cli, config)?;

    let pwm = match value {
        Some(value) => station
            .set_heater_pwm(value)
            .with_context(|| format!("cannot set heater PWM to {value}"))?,
        None => station.heater_pwm().context("cannot read heater PWM")?,
    };

    println!("{pwm}");
    Ok(())
}

/// Reset command implementation.
pub(crate) fn cmd_reset(cli: &Cli, config: &Config) -> Result<()> {
    let mut station = open_station(cli, config)?;
    station.reset_buffers().context("cannot reset station buffers")?;

    if !cli.quiet {
        eprintln!("{} Station buffers reset", style("✓").green());
    }
    Ok(())
}

/// Reboot command implementation.
pub(crate) fn cmd_reboot(cli: &Cli, config: &Config) -> Result<()> {
    let mut station = open_station(cli, config)?;
    let version = station
        .reboot_into_bootloader()
        .context("bootloader reboot failed")?;

    if !cli.quiet {
        eprintln!(
            "{} Station (firmware {version}) rebooted into its bootloader",
            style("✓").green()
        );
        eprintln!(
            "  Run {} within a few seconds to upload new firmware.",
            style("cloudwatcher upgrade <FIRMWARE>").cyan()
        );
    }
    Ok(())
}
