//! Request-level rasters shared by every color chain.
//!
//! A [`Scene`] is built once per request and then only read: the
//! (rectified) RGB image, its HSV and grayscale conversions, the plot
//! rectangle used for scale mapping, and the optional annotation and
//! edge-support maps of the enhanced stages. Color chains borrow it
//! concurrently.

use crate::annotation::{AnnotationMap, detect_annotations};
use crate::color::{HsvImage, to_hsv_image};
use crate::components::count_set;
use crate::config::EnhancedOptions;
use crate::diagnostics::{StageDiagnostics, StageMetrics, timed};
use crate::edge::{EDGE_THRESHOLD, edge_support};
use crate::plot_area::{detect_plot_area, frame_mask};
use crate::types::{
    Dimensions, ExtractionError, ExtractionWarning, GrayImage, PlotRect, Point, RgbImage,
};

/// Read-only rasters and geometry for one request.
#[derive(Debug, Clone)]
pub struct Scene {
    rgb: RgbImage,
    hsv: HsvImage,
    gray: GrayImage,
    plot: PlotRect,
    annotations: Option<AnnotationMap>,
    edges: Option<GrayImage>,
}

/// A built scene with the diagnostics and warnings of its stages.
#[derive(Debug)]
pub struct SceneBuild {
    pub scene: Scene,
    pub diagnostics: Vec<StageDiagnostics>,
    pub warnings: Vec<ExtractionWarning>,
}

impl Scene {
    /// Build the scene for a decoded image.
    ///
    /// Stages run in order: rectification (when `calibration` is
    /// given), color conversion, plot-area detection, annotation
    /// detection, and the edge-support map. The last three only run
    /// when enabled in `stages`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::InvalidConfig`] if the calibration
    /// anchors are degenerate or lie outside the image.
    pub fn build(
        rgb: RgbImage,
        calibration: Option<&[Point; 4]>,
        stages: &EnhancedOptions,
    ) -> Result<SceneBuild, ExtractionError> {
        let mut diagnostics = Vec::new();
        let mut warnings = Vec::new();

        let (rgb, mut plot) = match calibration {
            Some(anchors) => {
                let (rectified, duration) = timed(|| crate::warp::rectify(&rgb, anchors));
                let (rectified, rect) = rectified?;
                let warped = !crate::warp::is_axis_aligned(anchors);
                diagnostics.push(StageDiagnostics::new(
                    duration,
                    StageMetrics::Rectify {
                        warped,
                        plot_width: rect.width(),
                        plot_height: rect.height(),
                    },
                ));
                tracing::debug!(warped, ?rect, "rectified");
                (rectified, rect)
            }
            None => {
                let full = PlotRect::full(Dimensions {
                    width: rgb.width(),
                    height: rgb.height(),
                });
                (rgb, full)
            }
        };

        let ((hsv, gray), duration) =
            timed(|| (to_hsv_image(&rgb), crate::decode::to_gray(&rgb)));
        diagnostics.push(StageDiagnostics::new(
            duration,
            StageMetrics::HsvConversion {
                pixel_count: u64::from(rgb.width()) * u64::from(rgb.height()),
            },
        ));

        let frame = (stages.use_plot_area || stages.use_annotation_mask)
            .then(|| frame_mask(&hsv));

        if let Some(frame) = frame.as_ref().filter(|_| stages.use_plot_area) {
            let (detected, duration) = timed(|| detect_plot_area(frame));
            let found = detected.is_some();
            match detected {
                Some(rect) => plot = rect,
                None => {
                    tracing::warn!("plot area not detected");
                    warnings.push(ExtractionWarning::PlotAreaNotFound);
                }
            }
            diagnostics.push(StageDiagnostics::new(
                duration,
                StageMetrics::PlotArea {
                    found,
                    plot_width: plot.width(),
                    plot_height: plot.height(),
                },
            ));
            tracing::debug!(found, ?plot, "plot area");
        }

        let annotations = if let Some(frame) =
            frame.as_ref().filter(|_| stages.use_annotation_mask)
        {
            let (map, duration) = timed(|| detect_annotations(frame, plot));
            diagnostics.push(StageDiagnostics::new(
                duration,
                StageMetrics::AnnotationDetection {
                    regions: map.regions().len(),
                    suppressed_pixels: map.suppressed_pixels(),
                },
            ));
            Some(map)
        } else {
            None
        };

        let edges = if stages.use_edge_denoise {
            let (support, duration) = timed(|| edge_support(&gray));
            let support_pixels = count_set(&support);
            diagnostics.push(StageDiagnostics::new(
                duration,
                StageMetrics::EdgeMap {
                    threshold: EDGE_THRESHOLD,
                    support_pixels,
                },
            ));
            tracing::debug!(support_pixels, "edge support map");
            Some(support)
        } else {
            None
        };

        Ok(SceneBuild {
            scene: Self {
                rgb,
                hsv,
                gray,
                plot,
                annotations,
                edges,
            },
            diagnostics,
            warnings,
        })
    }

    /// The (rectified) RGB image.
    #[must_use]
    pub const fn rgb(&self) -> &RgbImage {
        &self.rgb
    }

    /// Per-pixel HSV (OpenCV scale).
    #[must_use]
    pub const fn hsv(&self) -> &HsvImage {
        &self.hsv
    }

    /// Grayscale luminance.
    #[must_use]
    pub const fn gray(&self) -> &GrayImage {
        &self.gray
    }

    /// Plot rectangle used for masking and scale mapping.
    #[must_use]
    pub const fn plot(&self) -> PlotRect {
        self.plot
    }

    /// Legend suppression map, when annotation masking is enabled.
    #[must_use]
    pub const fn annotations(&self) -> Option<&AnnotationMap> {
        self.annotations.as_ref()
    }

    /// Edge-support map, when edge denoising is enabled.
    #[must_use]
    pub const fn edges(&self) -> Option<&GrayImage> {
        self.edges.as_ref()
    }

    /// Image dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.rgb.width(),
            height: self.rgb.height(),
        }
    }
}
