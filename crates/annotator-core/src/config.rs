//! Annotator configuration
//!
//! Every field has a default, so an empty JSON object (or TOML file) is a
//! valid configuration. Front ends override only what they need.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Upload ceiling: 50 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Top-level configuration shared by the session, the interaction state
/// machine and the export compositor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,
    /// Declared MIME type an upload must carry
    pub accepted_mime: String,
    /// Ceiling for the fit-to-container scale
    pub max_scale: f64,
    /// Minimum width and height, in screen pixels, of a drawn box
    pub min_box_px: f64,
    /// Font size given to newly placed text annotations
    pub default_font_size: f64,
    /// Font size of box labels drawn above exported boxes
    pub label_font_size: f64,
    /// Stroke used for exported bounding boxes
    pub box_border: StrokeStyle,
    /// Prefix for the exported file name
    pub output_prefix: String,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            accepted_mime: PDF_MIME_TYPE.to_string(),
            max_scale: 1.5,
            min_box_px: 5.0,
            default_font_size: 14.0,
            label_font_size: 10.0,
            box_border: StrokeStyle::default(),
            output_prefix: "annotated_".to_string(),
        }
    }
}

/// Border color, opacity and line width of an exported rectangle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrokeStyle {
    /// Hex color, e.g. "#FF0000"
    pub color: String,
    pub opacity: f64,
    pub width: f64,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: "#FF0000".to_string(),
            opacity: 0.5,
            width: 2.0,
        }
    }
}

impl AnnotatorConfig {
    /// Parse configuration from a JSON string and validate it
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Reject values the rest of the crate cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_upload_bytes must be positive".to_string(),
            ));
        }
        if !(self.max_scale > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "max_scale must be positive, got {}",
                self.max_scale
            )));
        }
        if self.min_box_px < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "min_box_px must not be negative, got {}",
                self.min_box_px
            )));
        }
        if !(self.default_font_size > 0.0) || !(self.label_font_size > 0.0) {
            return Err(ConfigError::Invalid(
                "font sizes must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.box_border.opacity) {
            return Err(ConfigError::Invalid(format!(
                "box_border.opacity must be within [0, 1], got {}",
                self.box_border.opacity
            )));
        }
        if self.box_border.width < 0.0 {
            return Err(ConfigError::Invalid(
                "box_border.width must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}
