//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;

/// Round a f64 and clamp it to the u32 range, returning 0 for NaN values.
#[must_use]
pub fn round_f64_to_u32(value: f64) -> u32 {
    if value.is_nan() {
        return 0;
    }
    let max = f64::from(u32::MAX);
    let clamped = value.clamp(0.0, max).round();
    cast::<f64, u32>(clamped).unwrap_or(0)
}

/// Convert a similarity in `[-1, 1]` into a 0-100 percentage score.
#[must_use]
pub fn similarity_to_percent(similarity: f32) -> u8 {
    if !similarity.is_finite() {
        return 0;
    }
    let scaled = (f64::from(similarity) * 100.0).clamp(0.0, 100.0).round();
    cast::<f64, u8>(scaled).unwrap_or(0)
}

/// Convert usize to f64 while allowing precision loss in a single location.
#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    cast::<usize, f64>(value).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_clamps_to_u32() {
        assert_eq!(round_f64_to_u32(1.6), 2);
        assert_eq!(round_f64_to_u32(-4.0), 0);
        assert_eq!(round_f64_to_u32(f64::NAN), 0);
        assert_eq!(round_f64_to_u32(f64::from(u32::MAX) * 2.0), u32::MAX);
    }

    #[test]
    fn percent_clamps_negative_and_non_finite() {
        assert_eq!(similarity_to_percent(0.734), 73);
        assert_eq!(similarity_to_percent(-0.4), 0);
        assert_eq!(similarity_to_percent(1.2), 100);
        assert_eq!(similarity_to_percent(f32::NAN), 0);
    }

    #[test]
    fn usize_conversion_is_exact_for_small_values() {
        assert!((usize_to_f64(42) - 42.0).abs() < f64::EPSILON);
    }
}
