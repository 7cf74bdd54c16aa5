//! graphdigit-export: Pure serializers for extracted curves (sans-IO)
//!
//! Converts [`Curve`](graphdigit_pipeline::Curve)s into CSV tables and
//! an SVG plot in data space. Every function returns a `String`; writing
//! it anywhere is the caller's business.

pub mod csv;
pub mod svg;

pub use csv::{to_csv, to_long_csv};
pub use svg::{SvgMetadata, SvgOptions, to_svg};

/// Errors raised while serializing curves.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// A point cannot be written because it (or its log transform) is
    /// not a finite number.
    #[error("point {index} of curve {color:?} is not finite ({x}, {y})")]
    NonFinite {
        color: String,
        index: usize,
        x: f64,
        y: f64,
    },

    /// The CSV writer failed.
    #[error("CSV write failed: {0}")]
    Csv(#[from] ::csv::Error),

    /// A serialized table was not valid UTF-8.
    #[error("CSV output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Result alias for export operations.
pub type Result<T> = std::result::Result<T, ExportError>;
