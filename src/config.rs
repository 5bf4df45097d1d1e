//! Start-up configuration: view defaults and interaction constants.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{camera, error::ConfigError, palette::Palette};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Point radius in pixels.
    pub point_size: f32,
    pub opacity: f32,
    pub palette: Palette,
    pub use_percentile: bool,
    pub percentile_low: f64,
    pub percentile_high: f64,
    pub expression_scale: f64,
    pub show_clusters: bool,
    pub show_labels: bool,

    /// Inset between canvas edge and the fitted data bounds, in pixels.
    pub canvas_padding: f64,
    pub zoom_step: f64,
    pub min_scale: f64,
    pub max_scale: f64,
    /// Hover radius in screen pixels at scale 1.
    pub hover_radius: f64,
    /// Background grid spacing in data units.
    pub grid_spacing: f64,
    /// Points further than this outside the canvas are not drawn.
    pub cull_margin: f64,
    pub default_point_color: String,
    pub synthetic_seed: u64,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            point_size: 3.0,
            opacity: 0.8,
            palette: Palette::Viridis,
            use_percentile: false,
            percentile_low: 5.0,
            percentile_high: 95.0,
            expression_scale: 1.0,
            show_clusters: true,
            show_labels: true,
            canvas_padding: 50.0,
            zoom_step: camera::ZOOM_STEP,
            min_scale: camera::MIN_SCALE,
            max_scale: camera::MAX_SCALE,
            hover_radius: 2.0,
            grid_spacing: 1.0,
            cull_margin: 10.0,
            default_point_color: "rgb(100, 100, 100)".to_string(),
            synthetic_seed: 42,
        }
    }
}

impl ExplorerConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Config from `path`, or defaults when no path is given or it fails to load.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match Self::from_json_file(path) {
            Ok(cfg) => {
                info!("loaded config from {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("{e}; using default config");
                Self::default()
            }
        }
    }
}
