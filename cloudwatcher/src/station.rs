//! Command engine and typed station getters.
//!
//! [`CloudWatcher`] owns one link and serializes all traffic on it. Every
//! getter is a single [`CloudWatcher::issue`] followed by tag extraction on
//! the returned frames.
//!
//! Transient link faults (short reads, I/O errors) go through the
//! [`ConnectionGuard`]: absorbed faults retry the command, the fault that
//! crosses the threshold reopens the link and is returned to the caller.
//! A bad handshake frame is counted by the guard but never retried.

use {
    crate::{
        error::{Error, Result},
        guard::{ConnectionGuard, GuardAction},
        link::Link,
        protocol::{
            Command, Frame, ProtocolVariant,
            command::{
                BOOTLOADER_RITUAL, RITUAL_DELAY, SWITCH_CLOSED_TEXT, SWITCH_OPEN_TEXT, tags,
            },
            extract_bytes, extract_int, extract_string, read_frames,
        },
        upgrade::{self, FirmwareImage, ProgressObserver, UpgradeReport, UpgradeSettings},
    },
    byteorder::{BigEndian, ByteOrder},
    log::{debug, info},
    std::{thread, time::Duration},
};

#[cfg(feature = "native")]
use crate::link::NativeLink;

/// "Not connected" value of the high precision humidity/temperature sensor.
pub const HIGH_PRECISION_SENTINEL: i64 = 65535;

/// "Not connected" value of the low precision humidity/temperature sensor.
pub const LOW_PRECISION_SENTINEL: i64 = 100;

/// Raw ADC readings of `C!`, each in `0..=1023`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AnalogValues {
    /// Zener voltage.
    pub zener_voltage: i64,
    /// Light detector (LDR) voltage.
    pub ldr_voltage: i64,
    /// Rain sensor temperature.
    pub rain_sensor_temp: i64,
}

/// Internal error counters of `D!`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct InternalErrors {
    /// First address byte errors.
    pub first_address_byte: i64,
    /// Command byte errors.
    pub command_byte: i64,
    /// Second address byte errors.
    pub second_address_byte: i64,
    /// PEC byte errors.
    pub pec_byte: i64,
}

/// Calibration constants reported by `M!`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ElectricalConstants {
    /// Zener voltage in volts.
    pub zener_voltage: f64,
    /// Maximum LDR resistance.
    pub ldr_max_resistance: f64,
    /// LDR pull-up resistance.
    pub ldr_pull_up_resistance: f64,
    /// Rain sensor thermistor beta.
    pub rain_beta: f64,
    /// Rain sensor thermistor resistance at 25 °C.
    pub rain_res_at_25: f64,
    /// Rain sensor pull-up resistance.
    pub rain_pull_up_resistance: f64,
}

impl ElectricalConstants {
    /// Decode the `!M` payload: six big-endian 16-bit words after one pad byte.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let payload = extract_bytes(frame, tags::ELECTRICAL_CONSTANTS)?;
        let word = |offset: usize| -> Result<f64> {
            payload
                .get(offset..offset + 2)
                .map(|bytes| f64::from(BigEndian::read_u16(bytes)))
                .ok_or_else(|| Error::MalformedInteger(format!("{payload:02X?}")))
        };

        Ok(Self {
            zener_voltage: word(1)? / 100.0,
            ldr_max_resistance: word(3)?,
            ldr_pull_up_resistance: word(5)? / 10.0,
            rain_beta: word(7)?,
            rain_res_at_25: word(9)? / 10.0,
            rain_pull_up_resistance: word(11)? / 10.0,
        })
    }
}

/// Which of the two humidity/temperature sensor models answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Precision {
    /// 16-bit sensor (`!hh` / `!th`).
    High,
    /// Older sensor (`!h` / `!t`).
    Low,
}

/// Raw humidity or temperature reading with its sensor model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SensorReading {
    /// Sensor model.
    pub precision: Precision,
    /// Raw value.
    pub raw: i64,
}

/// A CloudWatcher station on one link.
pub struct CloudWatcher<L: Link> {
    link: L,
    guard: ConnectionGuard,
    variant: ProtocolVariant,
    constants: Option<ElectricalConstants>,
    ritual_delay: Duration,
}

#[cfg(feature = "native")]
impl CloudWatcher<NativeLink> {
    /// Open a serial port with the variant's normal settings and connect.
    pub fn open(port_name: &str, variant: ProtocolVariant) -> Result<Self> {
        let link = NativeLink::open(port_name, &variant.link_config())?;
        Self::connect(link, variant)
    }

    /// Open a serial port without sending anything.
    ///
    /// For a station that may already sit in its bootloader, where any
    /// command would be answered with sync bytes instead of frames.
    pub fn attach(port_name: &str, variant: ProtocolVariant) -> Result<Self> {
        let link = NativeLink::open(port_name, &variant.link_config())?;
        Ok(Self::new(link, variant))
    }
}

impl<L: Link> CloudWatcher<L> {
    /// Wrap an open link without talking to the station.
    pub fn new(link: L, variant: ProtocolVariant) -> Self {
        Self {
            link,
            guard: ConnectionGuard::new(),
            variant,
            constants: None,
            ritual_delay: RITUAL_DELAY,
        }
    }

    /// Wrap an open link and run the variant's connection bootstrap.
    pub fn connect(link: L, variant: ProtocolVariant) -> Result<Self> {
        let mut station = Self::new(link, variant);
        if variant.probes_constants_on_open() {
            let constants = station.electrical_constants()?;
            debug!("Electrical constants: {constants:?}");
            station.constants = Some(constants);
        }
        Ok(station)
    }

    /// Set the pause after each bootloader ritual token.
    #[must_use]
    pub fn with_ritual_delay(mut self, delay: Duration) -> Self {
        self.ritual_delay = delay;
        self
    }

    /// Protocol variant.
    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Constants cached by [`CloudWatcher::connect`] or the last
    /// [`CloudWatcher::electrical_constants`] call.
    pub fn cached_constants(&self) -> Option<&ElectricalConstants> {
        self.constants.as_ref()
    }

    /// Consecutive link faults recorded by the guard.
    pub fn failures(&self) -> u32 {
        self.guard.failures()
    }

    /// The underlying link.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Release the link.
    pub fn into_link(self) -> L {
        self.link
    }

    /// Send a command and return its data frames.
    pub fn issue(&mut self, command: Command) -> Result<Vec<Frame>> {
        let token = command.token();
        let count = command.expected_frames();

        loop {
            match self.exchange(&token, count) {
                Ok(frames) => {
                    self.guard.record_success();
                    return Ok(frames);
                },
                Err(e @ Error::Framing { .. }) => {
                    self.guard.record_fault(&mut self.link, &e)?;
                    return Err(e);
                },
                Err(e) if e.is_transient() => {
                    match self.guard.record_fault(&mut self.link, &e)? {
                        GuardAction::Absorbed => {
                            debug!("Retrying {command:?} after: {e}");
                            let _ = self.link.clear_input();
                        },
                        GuardAction::Reconnected => return Err(e),
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn exchange(&mut self, token: &[u8], count: usize) -> Result<Vec<Frame>> {
        self.link.write_all_bytes(token)?;
        read_frames(&mut self.link, count)
    }

    fn single(&mut self, command: Command) -> Result<Frame> {
        let frames = self.issue(command)?;
        frames
            .into_iter()
            .next()
            .ok_or_else(|| Error::ShortRead {
                expected: 1,
                actual: 0,
            })
    }

    fn read_int(&mut self, command: Command, tag: &[u8]) -> Result<i64> {
        let frame = self.single(command)?;
        extract_int(&frame, tag)
    }

    fn read_string(&mut self, command: Command, tag: &[u8]) -> Result<String> {
        let frame = self.single(command)?;
        extract_string(&frame, tag)
    }

    /// Internal name, normally `"CloudWatcher"`.
    pub fn internal_name(&mut self) -> Result<String> {
        self.read_string(Command::InternalName, tags::INTERNAL_NAME)
    }

    /// Firmware version.
    pub fn version(&mut self) -> Result<String> {
        self.read_string(Command::Version, tags::VERSION)
    }

    /// Serial number.
    pub fn serial_number(&mut self) -> Result<String> {
        self.read_string(Command::SerialNumber, tags::SERIAL_NUMBER)
    }

    /// Reset the station's rx/tx buffers.
    pub fn reset_buffers(&mut self) -> Result<()> {
        self.issue(Command::ResetBuffers).map(|_| ())
    }

    /// Zener, LDR and rain sensor temperature ADC values.
    pub fn analog_values(&mut self) -> Result<AnalogValues> {
        let frames = self.issue(Command::AnalogValues)?;
        let [zener, ldr, rain] = frames.as_slice() else {
            return Err(Error::ShortRead {
                expected: 3,
                actual: frames.len(),
            });
        };
        Ok(AnalogValues {
            zener_voltage: extract_int(zener, tags::ZENER_VOLTAGE)?,
            ldr_voltage: extract_int(ldr, tags::LDR_VOLTAGE)?,
            rain_sensor_temp: extract_int(rain, tags::RAIN_SENSOR_TEMP)?,
        })
    }

    /// Internal error counters.
    pub fn internal_errors(&mut self) -> Result<InternalErrors> {
        let frames = self.issue(Command::InternalErrors)?;
        let [e1, e2, e3, e4] = frames.as_slice() else {
            return Err(Error::ShortRead {
                expected: 4,
                actual: frames.len(),
            });
        };
        let [t1, t2, t3, t4] = tags::INTERNAL_ERRORS;
        Ok(InternalErrors {
            first_address_byte: extract_int(e1, t1)?,
            command_byte: extract_int(e2, t2)?,
            second_address_byte: extract_int(e3, t3)?,
            pec_byte: extract_int(e4, t4)?,
        })
    }

    /// Rain sensor frequency, roughly `0..=6000`.
    pub fn rain_frequency(&mut self) -> Result<i64> {
        self.read_int(Command::RainFrequency, tags::RAIN_FREQUENCY)
    }

    /// Relay switch status, `true` when open.
    pub fn switch_status(&mut self) -> Result<bool> {
        let frame = self.single(Command::SwitchStatus)?;

        let (open, text) = match extract_string(&frame, tags::SWITCH_OPEN) {
            Ok(text) => (true, text),
            Err(Error::PrefixMismatch { .. }) => {
                (false, extract_string(&frame, tags::SWITCH_CLOSED)?)
            },
            Err(e) => return Err(e),
        };

        let expected = if open {
            SWITCH_OPEN_TEXT
        } else {
            SWITCH_CLOSED_TEXT
        };
        if text != expected {
            return Err(Error::UnexpectedStatus(text));
        }
        Ok(open)
    }

    /// Whether the relay switch reports open.
    pub fn switch_open(&mut self) -> Result<bool> {
        let text = self.read_string(Command::SwitchOpen, tags::SWITCH_OPEN)?;
        Ok(text == SWITCH_OPEN_TEXT)
    }

    /// Whether the relay switch reports closed.
    pub fn switch_closed(&mut self) -> Result<bool> {
        let text = self.read_string(Command::SwitchClosed, tags::SWITCH_CLOSED)?;
        Ok(text == SWITCH_CLOSED_TEXT)
    }

    /// Rain sensor heater PWM.
    pub fn heater_pwm(&mut self) -> Result<i64> {
        self.read_int(Command::HeaterPwm, tags::HEATER_PWM)
    }

    /// Set the rain sensor heater PWM (`1..=1023`) and return the value echoed.
    pub fn set_heater_pwm(&mut self, value: u16) -> Result<i64> {
        let command = Command::set_heater_pwm(value)?;
        self.read_int(command, tags::HEATER_PWM)
    }

    /// Raw sky infrared temperature, in hundredths of a degree.
    pub fn sky_ir_raw(&mut self) -> Result<i64> {
        self.read_int(Command::SkyIrTemperature, tags::SKY_IR_TEMP)
    }

    /// Raw infrared sensor temperature, in hundredths of a degree.
    pub fn ir_sensor_raw(&mut self) -> Result<i64> {
        self.read_int(Command::IrSensorTemperature, tags::IR_SENSOR_TEMP)
    }

    /// Read and cache the electrical constants.
    pub fn electrical_constants(&mut self) -> Result<ElectricalConstants> {
        let frame = self.single(Command::ElectricalConstants)?;
        let constants = ElectricalConstants::from_frame(&frame)?;
        self.constants = Some(constants);
        Ok(constants)
    }

    /// Whether an anemometer is connected.
    pub fn wind_sensor_present(&mut self) -> Result<bool> {
        Ok(self.read_int(Command::WindSensorPresence, tags::WIND_PRESENCE)? == 1)
    }

    /// Raw anemometer reading.
    pub fn wind_sensor_raw(&mut self) -> Result<i64> {
        self.read_int(Command::WindSensor, tags::WIND_SENSOR)
    }

    /// Raw relative humidity.
    pub fn humidity_raw(&mut self) -> Result<SensorReading> {
        let frame = self.single(Command::Humidity)?;
        precision_reading(
            &frame,
            (tags::HUMIDITY_HIGH, "High precision humidity"),
            (tags::HUMIDITY_LOW, "Low precision humidity"),
        )
    }

    /// Raw ambient temperature.
    pub fn temperature_raw(&mut self) -> Result<SensorReading> {
        let frame = self.single(Command::Temperature)?;
        precision_reading(
            &frame,
            (tags::TEMPERATURE_HIGH, "High precision temperature"),
            (tags::TEMPERATURE_LOW, "Low precision temperature"),
        )
    }

    /// Reboot the station into its bootloader and return the version it
    /// reports on the way down.
    ///
    /// The ritual is sent once; faults are not retried.
    pub fn reboot_into_bootloader(&mut self) -> Result<String> {
        info!("Rebooting station on {} into bootloader", self.link.name());
        for token in BOOTLOADER_RITUAL {
            self.link.write_all_bytes(token)?;
            thread::sleep(self.ritual_delay);
        }

        let frames = read_frames(&mut self.link, 1)?;
        let version = frames
            .first()
            .ok_or(Error::ShortRead {
                expected: 1,
                actual: 0,
            })
            .and_then(|frame| extract_string(frame, tags::VERSION))?;
        debug!("Station version before reboot: {version}");
        Ok(version)
    }

    /// Upload a firmware image. See [`upgrade::run`].
    pub fn upgrade(
        &mut self,
        image: &FirmwareImage,
        settings: &UpgradeSettings,
        observer: &mut dyn ProgressObserver,
    ) -> Result<UpgradeReport> {
        upgrade::run(&mut self.link, image, settings, observer)
    }
}

fn precision_reading(
    frame: &Frame,
    high: (&[u8], &'static str),
    low: (&[u8], &'static str),
) -> Result<SensorReading> {
    let (precision, (tag, sensor), sentinel) = if frame.has_prefix(high.0) {
        (Precision::High, high, HIGH_PRECISION_SENTINEL)
    } else {
        (Precision::Low, low, LOW_PRECISION_SENTINEL)
    };

    let raw = extract_int(frame, tag)?;
    if raw == sentinel {
        return Err(Error::SensorNotConnected(sensor));
    }
    Ok(SensorReading { precision, raw })
}
