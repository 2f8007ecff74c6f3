//! Exporter configuration.
//!
//! Stream names, tracked field names, the filename template, and the
//! trailing-trim policy. The defaults match the originating instrument's
//! conventions; deployments with different device names load their own
//! values from TOML.

use serde::{Deserialize, Serialize};

/// Baseline snapshot field names (spatial position components).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineFields {
    /// Sample x position.
    pub x: String,
    /// Sample y position.
    pub y: String,
    /// Sample z position.
    pub z: String,
    /// Rotation stage position.
    pub r: String,
}

impl Default for BaselineFields {
    fn default() -> Self {
        Self {
            x: "zps_sx".to_string(),
            y: "zps_sy".to_string(),
            z: "zps_sz".to_string(),
            r: "zps_pi_r".to_string(),
        }
    }
}

/// Configuration for one exporter instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Stream name classified as the primary image stream.
    pub primary_stream: String,
    /// Stream name classified as the one-shot baseline snapshot.
    pub baseline_stream: String,
    /// Stream name classified as the rotation monitor.
    pub monitor_stream: String,
    /// Image field within the primary stream.
    pub image_field: String,
    /// Position field within the monitor stream.
    pub monitor_field: String,
    /// Baseline snapshot field names.
    pub baseline_fields: BaselineFields,
    /// Filename template rendered against start-document fields.
    pub file_template: String,
    /// Frames dropped from the main array's tail at stop (white reference
    /// plus settling frames). Instrument convention, hence configurable.
    pub trailing_trim_frames: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            primary_stream: "primary".to_string(),
            baseline_stream: "baseline".to_string(),
            monitor_stream: "zps_pi_r_monitor".to_string(),
            image_field: "Andor_image".to_string(),
            monitor_field: "zps_pi_r".to_string(),
            baseline_fields: BaselineFields::default(),
            file_template: "{uid}-".to_string(),
            trailing_trim_frames: 2,
        }
    }
}

impl ExportConfig {
    /// Builder: override the filename template.
    pub fn with_template(mut self, template: &str) -> Self {
        self.file_template = template.to_string();
        self
    }

    /// Builder: override the trailing-trim policy.
    pub fn with_trailing_trim(mut self, frames: usize) -> Self {
        self.trailing_trim_frames = frames;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_instrument_conventions() {
        let config = ExportConfig::default();
        assert_eq!(config.primary_stream, "primary");
        assert_eq!(config.monitor_stream, "zps_pi_r_monitor");
        assert_eq!(config.image_field, "Andor_image");
        assert_eq!(config.baseline_fields.r, "zps_pi_r");
        assert_eq!(config.trailing_trim_frames, 2);
    }

    #[test]
    fn partial_toml_overrides_keep_defaults() {
        let config: ExportConfig = toml::from_str(
            r#"
            image_field = "Manta_image"
            trailing_trim_frames = 1

            [baseline_fields]
            x = "sx"
            "#,
        )
        .unwrap();
        assert_eq!(config.image_field, "Manta_image");
        assert_eq!(config.trailing_trim_frames, 1);
        assert_eq!(config.baseline_fields.x, "sx");
        // untouched fields fall back to defaults
        assert_eq!(config.primary_stream, "primary");
        assert_eq!(config.baseline_fields.y, "zps_sy");
    }
}
