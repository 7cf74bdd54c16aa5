//! Pixel-to-data coordinate mapping.
//!
//! Converts pixel positions inside the plot rectangle into the graph's
//! real-world units under a linear or logarithmic axis:
//!
//! ```text
//! t      = (pixel - pixel_min) / (pixel_max - pixel_min)
//! linear = (min + t × (max - min)) × scale
//! log    = 10^(log10(min') + t × (log10(max) - log10(min'))) × scale
//! ```
//!
//! where `min'` is the guarded minimum: `min` itself when positive,
//! otherwise [`LOG_EPSILON`]. The guard only exists so `log10` is
//! defined; a positive `min` is never altered, so valid data is never
//! shifted or clipped.
//!
//! The y axis is flipped by passing the plot's bottom edge as
//! `pixel_min` and its top edge as `pixel_max`.

use serde::{Deserialize, Serialize};

use crate::types::{AxisName, ExtractionError};

/// Substitute for a non-positive log-axis minimum.
pub const LOG_EPSILON: f64 = 1e-9;

/// Axis scale type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleType {
    #[default]
    Linear,
    Log,
}

/// Configured data range of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisConfig {
    /// Data value at the low pixel edge.
    pub min: f64,
    /// Data value at the high pixel edge.
    pub max: f64,
    /// Multiplicative factor applied after interpolation (e.g. `1e-3`
    /// for an axis labelled in milli-units).
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Linear or logarithmic interpolation.
    #[serde(default)]
    pub scale_type: ScaleType,
}

const fn default_scale() -> f64 {
    1.0
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self::linear(0.0, 1.0)
    }
}

impl AxisConfig {
    /// Linear axis with unit scale.
    #[must_use]
    pub const fn linear(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            scale: 1.0,
            scale_type: ScaleType::Linear,
        }
    }

    /// Logarithmic axis with unit scale.
    #[must_use]
    pub const fn log(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            scale: 1.0,
            scale_type: ScaleType::Log,
        }
    }

    /// Replace the scale factor.
    #[must_use]
    pub const fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Minimum used for the log transform.
    #[must_use]
    pub fn guarded_min(&self) -> f64 {
        if self.min > 0.0 { self.min } else { LOG_EPSILON }
    }

    /// Whether the log-axis epsilon guard is in effect.
    #[must_use]
    pub fn is_guarded(&self) -> bool {
        self.scale_type == ScaleType::Log && self.min <= 0.0
    }

    /// Check that the axis can be mapped.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::InvalidAxis`] for non-finite values, a
    /// non-positive scale, or `max` not above the (guarded) minimum.
    pub fn validate(&self, axis: AxisName) -> Result<(), ExtractionError> {
        self.check()
            .map_err(|reason| ExtractionError::InvalidAxis { axis, reason })
    }

    fn check(&self) -> Result<(), String> {
        if !(self.min.is_finite() && self.max.is_finite()) {
            return Err(format!("range {}..{} is not finite", self.min, self.max));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(format!("scale must be positive and finite, got {}", self.scale));
        }
        let low = match self.scale_type {
            ScaleType::Linear => self.min,
            ScaleType::Log => self.guarded_min(),
        };
        if self.max <= low {
            return Err(format!("max {} must exceed min {low}", self.max));
        }
        Ok(())
    }
}

/// Precomputed mapping from one pixel range to one axis.
#[derive(Debug, Clone, Copy)]
pub struct AxisMapper {
    pixel_min: f64,
    pixel_span: f64,
    low: f64,
    span: f64,
    scale: f64,
    scale_type: ScaleType,
}

impl AxisMapper {
    /// Build a mapper for `axis` over `pixel_min..pixel_max`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::InvalidAxis`] if the axis is invalid
    /// or the pixel range is empty.
    pub fn new(
        name: AxisName,
        axis: &AxisConfig,
        pixel_min: f64,
        pixel_max: f64,
    ) -> Result<Self, ExtractionError> {
        axis.validate(name)?;
        let pixel_span = pixel_max - pixel_min;
        if pixel_span == 0.0 || !pixel_span.is_finite() {
            return Err(ExtractionError::InvalidAxis {
                axis: name,
                reason: format!("empty pixel range {pixel_min}..{pixel_max}"),
            });
        }
        let (low, high) = match axis.scale_type {
            ScaleType::Linear => (axis.min, axis.max),
            ScaleType::Log => (axis.guarded_min().log10(), axis.max.log10()),
        };
        Ok(Self {
            pixel_min,
            pixel_span,
            low,
            span: high - low,
            scale: axis.scale,
            scale_type: axis.scale_type,
        })
    }

    /// Map a pixel coordinate to a data value.
    #[must_use]
    pub fn map(&self, pixel: f64) -> f64 {
        let t = (pixel - self.pixel_min) / self.pixel_span;
        let v = t.mul_add(self.span, self.low);
        match self.scale_type {
            ScaleType::Linear => v * self.scale,
            ScaleType::Log => 10f64.powf(v) * self.scale,
        }
    }
}

/// Map one pixel coordinate to a data value.
///
/// Convenience wrapper over [`AxisMapper`] for one-off conversions;
/// errors name the x axis.
///
/// # Errors
///
/// Returns [`ExtractionError::InvalidAxis`] when `max` does not exceed
/// the guarded minimum or the pixel range is empty.
pub fn map_pixel_to_data(
    pixel: f64,
    pixel_min: f64,
    pixel_max: f64,
    axis: &AxisConfig,
) -> Result<f64, ExtractionError> {
    AxisMapper::new(AxisName::X, axis, pixel_min, pixel_max).map(|m| m.map(pixel))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn linear_endpoints_and_midpoint() {
        let axis = AxisConfig::linear(0.0, 10.0);
        assert!((map_pixel_to_data(0.0, 0.0, 100.0, &axis).unwrap()).abs() < 1e-12);
        assert!((map_pixel_to_data(100.0, 0.0, 100.0, &axis).unwrap() - 10.0).abs() < 1e-12);
        assert!((map_pixel_to_data(50.0, 0.0, 100.0, &axis).unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn linear_scale_applies_after_interpolation() {
        let axis = AxisConfig::linear(0.0, 10.0).with_scale(1e-3);
        let v = map_pixel_to_data(50.0, 0.0, 100.0, &axis).unwrap();
        assert!((v - 5e-3).abs() < 1e-15);
    }

    #[test]
    fn reversed_pixel_range_flips_direction() {
        // Image rows grow downwards; y data grows upwards.
        let axis = AxisConfig::linear(0.0, 4.0);
        let bottom = map_pixel_to_data(100.0, 100.0, 0.0, &axis).unwrap();
        let top = map_pixel_to_data(0.0, 100.0, 0.0, &axis).unwrap();
        assert!(bottom.abs() < 1e-12);
        assert!((top - 4.0).abs() < 1e-12);
    }

    #[test]
    fn log_decades_are_evenly_spaced() {
        let axis = AxisConfig::log(1.0, 1000.0);
        let quarter = map_pixel_to_data(100.0, 0.0, 300.0, &axis).unwrap();
        let half = map_pixel_to_data(200.0, 0.0, 300.0, &axis).unwrap();
        assert!((quarter - 10.0).abs() < 1e-9);
        assert!((half - 100.0).abs() < 1e-7);
    }

    #[test]
    fn log_zero_min_matches_epsilon_min() {
        let guarded = AxisConfig::log(0.0, 10.0);
        let explicit = AxisConfig::log(LOG_EPSILON, 10.0);
        for pixel in [0.0, 12.5, 50.0, 99.0, 100.0] {
            let a = map_pixel_to_data(pixel, 100.0, 0.0, &guarded).unwrap();
            let b = map_pixel_to_data(pixel, 100.0, 0.0, &explicit).unwrap();
            assert_eq!(a.to_bits(), b.to_bits(), "pixel {pixel}");
        }
    }

    #[test]
    fn log_negative_min_is_guarded_not_rejected() {
        let axis = AxisConfig::log(-5.0, 10.0);
        assert!(axis.is_guarded());
        let top = map_pixel_to_data(0.0, 100.0, 0.0, &axis).unwrap();
        let bottom = map_pixel_to_data(100.0, 100.0, 0.0, &axis).unwrap();
        assert!((top - 10.0).abs() < 1e-12);
        assert!(bottom > 0.0);
    }

    #[test]
    fn positive_log_min_is_untouched() {
        let axis = AxisConfig::log(0.5, 50.0);
        assert!(!axis.is_guarded());
        assert!((axis.guarded_min() - 0.5).abs() < f64::EPSILON);
        let bottom = map_pixel_to_data(0.0, 0.0, 10.0, &axis).unwrap();
        assert!((bottom - 0.5).abs() < 1e-12);
    }

    #[test]
    fn max_not_above_min_is_an_error() {
        let linear = AxisConfig::linear(5.0, 5.0);
        assert!(matches!(
            linear.validate(AxisName::X),
            Err(ExtractionError::InvalidAxis { axis: AxisName::X, .. })
        ));
        let log = AxisConfig::log(0.0, 1e-12);
        assert!(log.validate(AxisName::Y).is_err());
    }

    #[test]
    fn non_positive_scale_is_an_error() {
        let axis = AxisConfig::linear(0.0, 1.0).with_scale(0.0);
        assert!(axis.validate(AxisName::Y).is_err());
        let axis = AxisConfig::linear(0.0, 1.0).with_scale(f64::NAN);
        assert!(axis.validate(AxisName::Y).is_err());
    }

    #[test]
    fn empty_pixel_range_is_an_error() {
        let axis = AxisConfig::linear(0.0, 1.0);
        assert!(AxisMapper::new(AxisName::X, &axis, 3.0, 3.0).is_err());
    }

    #[test]
    fn axis_config_deserializes_with_defaults() {
        let axis: AxisConfig =
            serde_json::from_str(r#"{"min":0,"max":10,"scaleType":"log"}"#).unwrap();
        assert_eq!(axis.scale_type, ScaleType::Log);
        assert!((axis.scale - 1.0).abs() < f64::EPSILON);
    }
}
