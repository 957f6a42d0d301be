//! # Sample Transformer
//!
//! Converts one raw reading into the value stored for its channel.
//!
//! ## Voltage to resistance
//!
//! Resistive sensors sit in a divider fed from the board's 3.3 V rail. With the
//! channel's display limit `R` as the baseline resistance and `v` the measured
//! divider voltage:
//!
//! ```text
//! resistance = (v * R) / (3.3 - v)
//! ```
//!
//! The inversion is undefined at the rail itself, which is reported as
//! [`TransformError::Singularity`] instead of producing an infinite sample.
//! Readings above the rail pass through as negative resistances.
//!
//! ## Usage
//!
//! ```
//! use sensor_datalogger::channel::{Channel, TransformKind};
//! use sensor_datalogger::channel::transform::transform;
//!
//! let channel = Channel::new("R1", 100.0, TransformKind::VoltageToResistance)?;
//! let value = transform(&channel, "1.65").unwrap();
//! assert!((value - 100.0).abs() < 1e-9);
//! # Ok::<(), sensor_datalogger::error::ChannelError>(())
//! ```

use super::{Channel, TransformKind};
use crate::error::TransformError;

/// Divider reference rail in volts
pub const REFERENCE_VOLTAGE: f64 = 3.3;

/// Distance from the rail treated as the rail itself
const SINGULARITY_EPSILON: f64 = 1e-9;

/// Transform `raw` for `channel`.
///
/// # Errors
///
/// Returns error if:
/// - `raw` is not a finite number
/// - A resistance channel reads the reference rail
pub fn transform(channel: &Channel, raw: &str) -> Result<f64, TransformError> {
    let value = parse_reading(raw)?;

    match channel.transform() {
        TransformKind::VoltageToResistance => {
            voltage_to_resistance(value, channel.display_limit())
        }
        TransformKind::Identity
        | TransformKind::Voltage
        | TransformKind::RawAdc
        | TransformKind::Temperature
        | TransformKind::Humidity => Ok(value),
    }
}

/// Invert the divider: resistance seen for `voltage` against `baseline` ohms.
///
/// # Errors
///
/// Returns [`TransformError::Singularity`] when `voltage` is at the reference rail.
pub fn voltage_to_resistance(voltage: f64, baseline: f64) -> Result<f64, TransformError> {
    let headroom = REFERENCE_VOLTAGE - voltage;
    let singular = || TransformError::Singularity {
        voltage,
        reference: REFERENCE_VOLTAGE,
    };

    if headroom.abs() < SINGULARITY_EPSILON {
        return Err(singular());
    }

    let resistance = (voltage * baseline) / headroom;
    if resistance.is_finite() {
        Ok(resistance)
    } else {
        Err(singular())
    }
}

/// `nan` and the infinities parse as `f64` but are refused like any other bad number.
fn parse_reading(raw: &str) -> Result<f64, TransformError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| TransformError::InvalidNumber(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(kind: TransformKind, limit: f64) -> Channel {
        Channel::new("test", limit, kind).unwrap()
    }

    #[test]
    fn test_identity_parses_float() {
        let ch = channel(TransformKind::Identity, 10.0);
        assert_eq!(transform(&ch, "2.5"), Ok(2.5));
        assert_eq!(transform(&ch, " 7 "), Ok(7.0));
    }

    #[test]
    fn test_passthrough_kinds_do_not_scale() {
        for kind in [
            TransformKind::Voltage,
            TransformKind::RawAdc,
            TransformKind::Temperature,
            TransformKind::Humidity,
        ] {
            assert_eq!(transform(&channel(kind, 50.0), "12.25"), Ok(12.25));
        }
    }

    #[test]
    fn test_invalid_number() {
        let ch = channel(TransformKind::Voltage, 4.0);
        assert_eq!(
            transform(&ch, "abc"),
            Err(TransformError::InvalidNumber("abc".to_string()))
        );
        assert!(transform(&ch, "").is_err());
        assert!(transform(&ch, "NaN").is_err());
        assert!(transform(&ch, "inf").is_err());
    }

    #[test]
    fn test_non_finite_readings_are_invalid_numbers() {
        for kind in [TransformKind::Identity, TransformKind::VoltageToResistance] {
            let ch = channel(kind, 100.0);
            for raw in ["nan", "inf", "-inf", "infinity"] {
                assert_eq!(
                    transform(&ch, raw),
                    Err(TransformError::InvalidNumber(raw.to_string()))
                );
            }
        }
    }

    #[test]
    fn test_resistance_at_half_rail_equals_baseline() {
        let ch = channel(TransformKind::VoltageToResistance, 100.0);
        let r = transform(&ch, "1.65").unwrap();
        assert!((r - 100.0).abs() < 1e-9, "got {}", r);
    }

    #[test]
    fn test_resistance_at_zero_volts() {
        let ch = channel(TransformKind::VoltageToResistance, 1000.0);
        assert_eq!(transform(&ch, "0"), Ok(0.0));
    }

    #[test]
    fn test_resistance_at_rail_is_singular() {
        let ch = channel(TransformKind::VoltageToResistance, 100.0);
        assert!(matches!(
            transform(&ch, "3.3"),
            Err(TransformError::Singularity { .. })
        ));
    }

    #[test]
    fn test_resistance_above_rail_is_negative() {
        let r = voltage_to_resistance(4.3, 100.0).unwrap();
        assert!((r - (-430.0)).abs() < 1e-9, "got {}", r);
    }

    #[test]
    fn test_resistance_bad_number_is_invalid_not_singular() {
        let ch = channel(TransformKind::VoltageToResistance, 100.0);
        assert!(matches!(
            transform(&ch, "x"),
            Err(TransformError::InvalidNumber(_))
        ));
    }
}
