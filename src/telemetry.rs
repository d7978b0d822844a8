//! Telemetry normalization.
//!
//! The host exposes voltage through an ambient light level characteristic and
//! power through a battery level characteristic. Both carry fixed numeric
//! ranges that have nothing to do with volts or watts, so every value pushed to
//! the host passes through here first.

/// Smallest value an ambient light level characteristic accepts (lux).
pub const LIGHT_LEVEL_MIN: f64 = 0.0001;

/// Largest value an ambient light level characteristic accepts (lux).
pub const LIGHT_LEVEL_MAX: f64 = 100_000.0;

pub const BATTERY_LEVEL_MIN: f64 = 0.0;
pub const BATTERY_LEVEL_MAX: f64 = 100.0;

/// Map a voltage reading (V) onto the light level range.
///
/// Volts map 1:1 to lux. Zero, negative and non-finite readings collapse to
/// [`LIGHT_LEVEL_MIN`] since the characteristic rejects values below it.
pub fn normalize_voltage_data(raw: f64) -> f64 {
    if raw.is_nan() {
        return LIGHT_LEVEL_MIN;
    }
    raw.clamp(LIGHT_LEVEL_MIN, LIGHT_LEVEL_MAX)
}

/// Map a power reading (W) onto the battery level percentage.
///
/// Watts map 1:1 inside `[0, 100]` and saturate outside it.
pub fn normalize_power_data(raw: f64) -> f64 {
    if raw.is_nan() {
        return BATTERY_LEVEL_MIN;
    }
    raw.clamp(BATTERY_LEVEL_MIN, BATTERY_LEVEL_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voltage_zero_gets_floor() {
        let v = normalize_voltage_data(0.0);
        assert!(v > 0.0);
        assert_eq!(v, LIGHT_LEVEL_MIN);
    }

    #[test]
    fn test_voltage_negative_gets_floor() {
        assert_eq!(normalize_voltage_data(-230.0), LIGHT_LEVEL_MIN);
        assert_eq!(normalize_voltage_data(f64::NEG_INFINITY), LIGHT_LEVEL_MIN);
    }

    #[test]
    fn test_voltage_nan_gets_floor() {
        assert_eq!(normalize_voltage_data(f64::NAN), LIGHT_LEVEL_MIN);
    }

    #[test]
    fn test_voltage_passthrough() {
        assert_eq!(normalize_voltage_data(120.0), 120.0);
        assert_eq!(normalize_voltage_data(230.4), 230.4);
        assert_eq!(normalize_voltage_data(LIGHT_LEVEL_MIN), LIGHT_LEVEL_MIN);
    }

    #[test]
    fn test_voltage_over_range() {
        assert_eq!(normalize_voltage_data(250_000.0), LIGHT_LEVEL_MAX);
        assert_eq!(normalize_voltage_data(f64::INFINITY), LIGHT_LEVEL_MAX);
    }

    #[test]
    fn test_voltage_always_positive_for_non_negative_inputs() {
        for raw in [0.0, 1e-9, 0.00005, 0.5, 1.0, 110.0, 240.0, 1e6] {
            assert!(normalize_voltage_data(raw) > 0.0, "raw = {raw}");
        }
    }

    #[test]
    fn test_power_clamped_low() {
        assert_eq!(normalize_power_data(-1.0), 0.0);
        assert_eq!(normalize_power_data(-0.001), 0.0);
        assert_eq!(normalize_power_data(f64::NAN), 0.0);
    }

    #[test]
    fn test_power_clamped_high() {
        assert_eq!(normalize_power_data(100.5), 100.0);
        assert_eq!(normalize_power_data(2300.0), 100.0);
    }

    #[test]
    fn test_power_identity_in_range() {
        for raw in [0.0, 0.5, 1.0, 50.0, 99.9, 100.0] {
            assert_eq!(normalize_power_data(raw), raw);
        }
    }
}
