//! Raw reading to physical unit conversions.
//!
//! Pure functions with no link access: read the raw value with a
//! [`CloudWatcher`](crate::CloudWatcher) getter, then convert it here.

use crate::station::{ElectricalConstants, Precision, SensorReading};

/// Full scale of the station's 10-bit ADC.
pub const ADC_FULL_SCALE: f64 = 1023.0;

const ABSOLUTE_ZERO: f64 = 273.15;
const RAIN_BETA: f64 = 3450.0;
const RAIN_PULL_UP_RESISTANCE: f64 = 1.0;
const RAIN_RESISTANCE_AT_25: f64 = 1.0;

/// Anemometer model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Anemometer {
    /// Current black model.
    #[default]
    Black,
    /// Older grey model.
    Grey,
}

impl Anemometer {
    /// Get the model from a string name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "black" => Some(Self::Black),
            "grey" | "gray" => Some(Self::Grey),
            _ => None,
        }
    }
}

fn clamp_adc(raw: i64) -> f64 {
    // 0 and 1023 divide by zero in the divider formulas
    raw.clamp(1, 1022) as f64
}

/// Rain sensor temperature in °C from its ADC reading.
pub fn rain_sensor_temperature(raw: i64) -> f64 {
    let r = RAIN_PULL_UP_RESISTANCE / (ADC_FULL_SCALE / clamp_adc(raw) - 1.0);
    let r = (r / RAIN_RESISTANCE_AT_25).ln();
    1.0 / (r / RAIN_BETA + 1.0 / (ABSOLUTE_ZERO + 25.0)) - ABSOLUTE_ZERO
}

/// LDR resistance from its ADC reading. Lower means brighter.
pub fn ambient_light(ldr_voltage: i64, constants: &ElectricalConstants) -> f64 {
    constants.ldr_pull_up_resistance / (ADC_FULL_SCALE / clamp_adc(ldr_voltage) - 1.0)
}

/// Ambient light as a ratio in `[0, 1]`: 0 is very dark, 1 very bright.
pub fn relative_ambient_light(ldr_voltage: i64, constants: &ElectricalConstants) -> f64 {
    1.0 - ambient_light(ldr_voltage, constants) / constants.ldr_max_resistance
}

/// Wind speed in km/h.
pub fn wind_speed(raw: i64, model: Anemometer) -> f64 {
    match model {
        Anemometer::Black if raw > 0 => raw as f64 * 0.84 + 3.0,
        Anemometer::Black => 0.0,
        Anemometer::Grey => raw as f64,
    }
}

/// Relative humidity in percent.
pub fn relative_humidity(reading: SensorReading) -> f64 {
    let raw = reading.raw as f64;
    match reading.precision {
        Precision::High => raw * 125.0 / 65536.0 - 6.0,
        Precision::Low => raw * 125.0 / 100.0 - 6.0,
    }
}

/// Ambient temperature in °C.
pub fn temperature(reading: SensorReading) -> f64 {
    let raw = reading.raw as f64;
    match reading.precision {
        Precision::High => raw * 175.72 / 65536.0 - 46.85,
        Precision::Low => raw * 1.7572 - 46.85,
    }
}

/// Infrared temperature in °C from a sky or sensor reading.
pub fn ir_temperature(raw: i64) -> f64 {
    raw as f64 / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn constants() -> ElectricalConstants {
        ElectricalConstants {
            zener_voltage: 3.0,
            ldr_max_resistance: 1744.0,
            ldr_pull_up_resistance: 56.0,
            rain_beta: 3450.0,
            rain_res_at_25: 1.0,
            rain_pull_up_resistance: 1.0,
        }
    }

    #[test]
    fn test_rain_sensor_temperature_midpoint_is_25c() {
        // r == r25 when the divider is balanced
        let t = rain_sensor_temperature(1023 / 2 + 1);
        assert!((t - 25.0).abs() < 0.2, "{t}");
    }

    #[test]
    fn test_rain_sensor_temperature_clamps() {
        assert!(close(rain_sensor_temperature(0), rain_sensor_temperature(1)));
        assert!(close(
            rain_sensor_temperature(5000),
            rain_sensor_temperature(1022)
        ));
        assert!(rain_sensor_temperature(1).is_finite());
        assert!(rain_sensor_temperature(1022).is_finite());
    }

    #[test]
    fn test_ambient_light() {
        let c = constants();
        // 1023 / 341 - 1 == 2
        assert!(close(ambient_light(341, &c), 28.0));
        assert!(close(relative_ambient_light(341, &c), 1.0 - 28.0 / 1744.0));
        assert!(ambient_light(-3, &c).is_finite());
    }

    #[test]
    fn test_wind_speed() {
        assert!(close(wind_speed(10, Anemometer::Black), 11.4));
        assert!(close(wind_speed(0, Anemometer::Black), 0.0));
        assert!(close(wind_speed(10, Anemometer::Grey), 10.0));
        assert_eq!(Anemometer::from_name("Gray"), Some(Anemometer::Grey));
        assert_eq!(Anemometer::from_name("white"), None);
    }

    #[test]
    fn test_humidity_and_temperature() {
        let high = |raw| SensorReading {
            precision: Precision::High,
            raw,
        };
        let low = |raw| SensorReading {
            precision: Precision::Low,
            raw,
        };

        assert!(close(relative_humidity(high(32768)), 56.5));
        assert!(close(relative_humidity(low(40)), 44.0));
        assert!(close(temperature(high(32768)), 41.01));
        assert!(close(temperature(low(50)), 41.01));
    }

    #[test]
    fn test_ir_temperature() {
        assert!(close(ir_temperature(-1250), -12.5));
        assert!(close(ir_temperature(2150), 21.5));
    }
}
