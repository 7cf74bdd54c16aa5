//! Wire-format extraction request.
//!
//! Callers outside Rust (HTTP clients, the web worker) send a flat JSON
//! object with a string `mode` and boolean feature flags. It converts
//! into the typed [`ExtractionConfig`] with [`TryFrom`], which is where
//! flags that make no sense for the chosen mode are rejected.

use serde::{Deserialize, Serialize};

use crate::axis::AxisConfig;
use crate::color::{ColorBand, default_palette};
use crate::config::{
    AutoColorOptions, DEFAULT_BIN_SIZE, DEFAULT_MIN_SIZE, DEFAULT_SIMPLIFY_TOLERANCE,
    EnhancedOptions, ExtractionConfig, ExtractionMode,
};
use crate::types::{ExtractionError, Point};

/// Flat request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct ExtractionRequest {
    /// `"legacy"`, `"enhanced"`, or `"auto_color"`.
    pub mode: String,
    pub selected_colors: Vec<String>,
    pub x_axis: AxisConfig,
    pub y_axis: AxisConfig,
    /// Signed so a negative value is reported as such rather than as a
    /// parse failure.
    pub min_size: i64,
    pub bin_size: i64,
    pub use_plot_area: bool,
    pub use_annotation_mask: bool,
    pub use_edge_denoise: bool,
    pub use_adaptive_binning: bool,
    pub simplify_curve: bool,
    pub simplify_tolerance: Option<f64>,
    pub max_clusters: Option<usize>,
    pub sample_size: Option<usize>,
    pub calibration: Option<[Point; 4]>,
    /// Replaces the default palette when present.
    pub palette: Option<Vec<ColorBand>>,
    pub render_preview: bool,
}

impl Default for ExtractionRequest {
    fn default() -> Self {
        Self {
            mode: "legacy".to_string(),
            selected_colors: Vec::new(),
            x_axis: AxisConfig::default(),
            y_axis: AxisConfig::default(),
            min_size: i64::from(DEFAULT_MIN_SIZE),
            bin_size: i64::from(DEFAULT_BIN_SIZE),
            use_plot_area: false,
            use_annotation_mask: false,
            use_edge_denoise: false,
            use_adaptive_binning: false,
            simplify_curve: false,
            simplify_tolerance: None,
            max_clusters: None,
            sample_size: None,
            calibration: None,
            palette: None,
            render_preview: false,
        }
    }
}

impl ExtractionRequest {
    fn stages(&self) -> EnhancedOptions {
        EnhancedOptions {
            use_plot_area: self.use_plot_area,
            use_annotation_mask: self.use_annotation_mask,
            use_edge_denoise: self.use_edge_denoise,
            use_adaptive_binning: self.use_adaptive_binning,
            simplify_curve: self.simplify_curve,
            simplify_tolerance: self
                .simplify_tolerance
                .unwrap_or(DEFAULT_SIMPLIFY_TOLERANCE),
        }
    }

    /// Names of the stage flags that are set.
    fn stage_flags(&self) -> Vec<&'static str> {
        [
            (self.use_plot_area, "usePlotArea"),
            (self.use_annotation_mask, "useAnnotationMask"),
            (self.use_edge_denoise, "useEdgeDenoise"),
            (self.use_adaptive_binning, "useAdaptiveBinning"),
            (self.simplify_curve, "simplifyCurve"),
            (self.simplify_tolerance.is_some(), "simplifyTolerance"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect()
    }

    fn cluster_flags(&self) -> Vec<&'static str> {
        [
            (self.max_clusters.is_some(), "maxClusters"),
            (self.sample_size.is_some(), "sampleSize"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect()
    }

    fn mode(&self) -> Result<ExtractionMode, ExtractionError> {
        let incompatible = |mode: &str, flags: &[&str]| {
            ExtractionError::IncompatibleFlags(format!(
                "{} not supported in {mode} mode",
                flags.join(", ")
            ))
        };
        match self.mode.trim().to_ascii_lowercase().as_str() {
            "legacy" => {
                let mut flags = self.stage_flags();
                flags.extend(self.cluster_flags());
                if flags.is_empty() {
                    Ok(ExtractionMode::Legacy)
                } else {
                    Err(incompatible("legacy", &flags))
                }
            }
            "enhanced" => {
                let flags = self.cluster_flags();
                if flags.is_empty() {
                    Ok(ExtractionMode::Enhanced(self.stages()))
                } else {
                    Err(incompatible("enhanced", &flags))
                }
            }
            "auto_color" => {
                let defaults = AutoColorOptions::default();
                Ok(ExtractionMode::AutoColor(AutoColorOptions {
                    max_clusters: self.max_clusters.unwrap_or(defaults.max_clusters),
                    sample_size: self.sample_size.unwrap_or(defaults.sample_size),
                    stages: self.stages(),
                    ..defaults
                }))
            }
            other => Err(ExtractionError::InvalidConfig(format!(
                "unknown mode {other:?}; expected legacy, enhanced, or auto_color"
            ))),
        }
    }
}

impl TryFrom<ExtractionRequest> for ExtractionConfig {
    type Error = ExtractionError;

    /// Convert and check the mode/flag combination. Value ranges (axes,
    /// colors) are checked later by [`ExtractionConfig::validate`].
    fn try_from(request: ExtractionRequest) -> Result<Self, Self::Error> {
        let min_size = u32::try_from(request.min_size)
            .ok()
            .filter(|&n| n > 0)
            .ok_or(ExtractionError::InvalidMinSize)?;
        let bin_size = u32::try_from(request.bin_size)
            .ok()
            .filter(|&n| n > 0)
            .ok_or(ExtractionError::InvalidBinSize)?;
        let mode = request.mode()?;
        Ok(Self {
            mode,
            min_size,
            bin_size,
            selected_colors: request.selected_colors,
            palette: request.palette.unwrap_or_else(default_palette),
            x_axis: request.x_axis,
            y_axis: request.y_axis,
            calibration: request.calibration,
            render_preview: request.render_preview,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::axis::ScaleType;

    fn parse(json: &str) -> Result<ExtractionConfig, ExtractionError> {
        let request: ExtractionRequest = serde_json::from_str(json).unwrap();
        ExtractionConfig::try_from(request)
    }

    #[test]
    fn minimal_request_is_legacy_default() {
        let config = parse(r#"{"selectedColors": ["red", "blue"]}"#).unwrap();
        assert_eq!(config.mode, ExtractionMode::Legacy);
        assert_eq!(config.min_size, 1000);
        assert_eq!(config.bin_size, 5);
        assert_eq!(config.selected_colors, ["red", "blue"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn enhanced_flags_are_carried() {
        let config = parse(
            r#"{
                "mode": "enhanced",
                "selectedColors": ["red"],
                "useAnnotationMask": true,
                "simplifyCurve": true,
                "simplifyTolerance": 0.5,
                "yAxis": {"min": 0, "max": 10, "scaleType": "log"}
            }"#,
        )
        .unwrap();
        let stages = config.mode.stages();
        assert!(stages.use_annotation_mask);
        assert!(stages.simplify_curve);
        assert!(!stages.use_plot_area);
        assert!((stages.simplify_tolerance - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.y_axis.scale_type, ScaleType::Log);
    }

    #[test]
    fn flags_under_legacy_are_rejected() {
        let err = parse(r#"{"selectedColors": ["red"], "useEdgeDenoise": true}"#).unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::IncompatibleFlags(ref m) if m.contains("useEdgeDenoise")
        ));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn cluster_caps_need_auto_color() {
        let err = parse(r#"{"mode": "enhanced", "selectedColors": ["red"], "maxClusters": 3}"#)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::IncompatibleFlags(_)));

        let config = parse(r#"{"mode": "auto_color", "maxClusters": 3}"#).unwrap();
        assert!(matches!(
            config.mode,
            ExtractionMode::AutoColor(AutoColorOptions { max_clusters: 3, .. })
        ));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = parse(r#"{"mode": "turbo", "selectedColors": ["red"]}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidConfig(ref m) if m.contains("turbo")));
    }

    #[test]
    fn non_positive_min_size_is_rejected() {
        assert!(matches!(
            parse(r#"{"selectedColors": ["red"], "minSize": 0}"#),
            Err(ExtractionError::InvalidMinSize)
        ));
        assert!(matches!(
            parse(r#"{"selectedColors": ["red"], "minSize": -5}"#),
            Err(ExtractionError::InvalidMinSize)
        ));
        assert!(matches!(
            parse(r#"{"selectedColors": ["red"], "binSize": 0}"#),
            Err(ExtractionError::InvalidBinSize)
        ));
    }
}
