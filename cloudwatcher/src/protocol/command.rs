//! Command vocabulary.
//!
//! Each command is a short ASCII token terminated by `!`. The station answers
//! with a command-specific number of data frames plus the handshake frame.

use {
    crate::error::{Error, Result},
    std::time::Duration,
};

/// Response tags of the data frames.
pub mod tags {
    /// Internal name (`A!`).
    pub const INTERNAL_NAME: &[u8] = b"!N";
    /// Firmware version (`B!`, bootloader ritual).
    pub const VERSION: &[u8] = b"!V";
    /// Zener voltage (`C!`, frame 1).
    pub const ZENER_VOLTAGE: &[u8] = b"!6";
    /// Light detector voltage (`C!`, frame 2).
    pub const LDR_VOLTAGE: &[u8] = b"!4";
    /// Rain sensor temperature (`C!`, frame 3).
    pub const RAIN_SENSOR_TEMP: &[u8] = b"!5";
    /// Internal error counters (`D!`, frames 1-4).
    pub const INTERNAL_ERRORS: [&[u8]; 4] = [b"!E1", b"!E2", b"!E3", b"!E4"];
    /// Rain frequency (`E!`).
    pub const RAIN_FREQUENCY: &[u8] = b"!R";
    /// Relay switch open (`F!`, `G!`).
    pub const SWITCH_OPEN: &[u8] = b"!X";
    /// Relay switch closed (`F!`, `H!`).
    pub const SWITCH_CLOSED: &[u8] = b"!Y";
    /// Serial number (`K!`).
    pub const SERIAL_NUMBER: &[u8] = b"!K";
    /// Electrical constants (`M!`).
    pub const ELECTRICAL_CONSTANTS: &[u8] = b"!M";
    /// Rain sensor heater PWM (`Q!`, `Pnnnn!`).
    pub const HEATER_PWM: &[u8] = b"!Q";
    /// Sky infrared temperature (`S!`).
    pub const SKY_IR_TEMP: &[u8] = b"!1";
    /// Infrared sensor temperature (`T!`).
    pub const IR_SENSOR_TEMP: &[u8] = b"!2";
    /// Wind sensor reading (`V!`).
    pub const WIND_SENSOR: &[u8] = b"!w";
    /// Wind sensor presence (`v!`).
    pub const WIND_PRESENCE: &[u8] = b"!v";
    /// High precision relative humidity (`h!`).
    pub const HUMIDITY_HIGH: &[u8] = b"!hh";
    /// Low precision relative humidity (`h!`).
    pub const HUMIDITY_LOW: &[u8] = b"!h";
    /// High precision temperature (`t!`).
    pub const TEMPERATURE_HIGH: &[u8] = b"!th";
    /// Low precision temperature (`t!`).
    pub const TEMPERATURE_LOW: &[u8] = b"!t";
}

/// Status literal paired with [`tags::SWITCH_OPEN`].
pub const SWITCH_OPEN_TEXT: &str = "Switch Open";

/// Status literal paired with [`tags::SWITCH_CLOSED`].
pub const SWITCH_CLOSED_TEXT: &str = "Switch Close";

/// Tokens that reboot the station into its bootloader, in order.
pub const BOOTLOADER_RITUAL: [&[u8]; 4] = [b"B!", b"O!", b"O!", b"T!"];

/// Pause after each ritual token.
pub const RITUAL_DELAY: Duration = Duration::from_millis(200);

/// Valid heater PWM range for `Pnnnn!`.
pub const HEATER_PWM_RANGE: std::ops::RangeInclusive<u16> = 1..=1023;

/// Heater PWM value the station accepts, in [`HEATER_PWM_RANGE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaterPwm(u16);

impl HeaterPwm {
    /// Validate a PWM value.
    pub fn new(value: u16) -> Result<Self> {
        if !HEATER_PWM_RANGE.contains(&value) {
            return Err(Error::InvalidArgument(format!(
                "heater PWM {value} outside {}..={}",
                HEATER_PWM_RANGE.start(),
                HEATER_PWM_RANGE.end()
            )));
        }
        Ok(Self(value))
    }

    /// The PWM value.
    pub fn value(self) -> u16 {
        self.0
    }
}

/// Station commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Internal name (`A!`).
    InternalName,
    /// Firmware version (`B!`).
    Version,
    /// Zener, LDR and rain sensor temperature ADC values (`C!`).
    AnalogValues,
    /// Internal error counters (`D!`).
    InternalErrors,
    /// Rain sensor frequency (`E!`).
    RainFrequency,
    /// Relay switch status (`F!`).
    SwitchStatus,
    /// Relay switch open check (`G!`).
    SwitchOpen,
    /// Relay switch closed check (`H!`).
    SwitchClosed,
    /// Serial number (`K!`).
    SerialNumber,
    /// Electrical constants (`M!`).
    ElectricalConstants,
    /// Read the rain sensor heater PWM (`Q!`).
    HeaterPwm,
    /// Set the rain sensor heater PWM (`Pnnnn!`).
    SetHeaterPwm(HeaterPwm),
    /// Sky infrared temperature (`S!`).
    SkyIrTemperature,
    /// Infrared sensor temperature (`T!`).
    IrSensorTemperature,
    /// Wind sensor reading (`V!`).
    WindSensor,
    /// Relative humidity sensor (`h!`).
    Humidity,
    /// Temperature sensor (`t!`).
    Temperature,
    /// Wind sensor presence (`v!`).
    WindSensorPresence,
    /// Reset the station's rx/tx buffers (`z!`).
    ResetBuffers,
}

impl Command {
    /// Build a `Pnnnn!` command, rejecting values the station refuses.
    pub fn set_heater_pwm(value: u16) -> Result<Self> {
        HeaterPwm::new(value).map(Self::SetHeaterPwm)
    }

    /// Wire token.
    pub fn token(self) -> Vec<u8> {
        let fixed: &[u8] = match self {
            Self::InternalName => b"A!",
            Self::Version => b"B!",
            Self::AnalogValues => b"C!",
            Self::InternalErrors => b"D!",
            Self::RainFrequency => b"E!",
            Self::SwitchStatus => b"F!",
            Self::SwitchOpen => b"G!",
            Self::SwitchClosed => b"H!",
            Self::SerialNumber => b"K!",
            Self::ElectricalConstants => b"M!",
            Self::HeaterPwm => b"Q!",
            Self::SetHeaterPwm(pwm) => return format!("P{:04}!", pwm.value()).into_bytes(),
            Self::SkyIrTemperature => b"S!",
            Self::IrSensorTemperature => b"T!",
            Self::WindSensor => b"V!",
            Self::Humidity => b"h!",
            Self::Temperature => b"t!",
            Self::WindSensorPresence => b"v!",
            Self::ResetBuffers => b"z!",
        };
        fixed.to_vec()
    }

    /// Number of data frames before the handshake frame.
    pub fn expected_frames(self) -> usize {
        match self {
            Self::ResetBuffers => 0,
            Self::AnalogValues => 3,
            Self::InternalErrors => 4,
            _ => 1,
        }
    }
}
