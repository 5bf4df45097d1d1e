use log::warn;

use crate::{config::ExplorerConfig, filter::CellFilter, palette::Palette};

/// What the expression coloring is computed from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExpressionSource {
    Gene(String),
    /// Per-cell mean over several genes.
    Averaged(Vec<String>),
}

/// Which rule colors the points in a frame, highest priority first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorRule {
    Expression,
    Annotation,
    Cluster,
    Flat,
}

/// View state edited by the user. Fields with ordering or range constraints are
/// private and only change through setters that reject invalid updates.
#[derive(Clone, Debug, PartialEq)]
pub struct VisualizationSettings {
    pub point_size: f32,
    opacity: f32,
    pub show_clusters: bool,
    pub show_labels: bool,
    pub show_averaged: bool,
    pub use_percentile: bool,
    pub palette: Palette,
    pub selected_gene: Option<String>,
    pub selected_genes: Vec<String>,
    percentile_low: f64,
    percentile_high: f64,
    expression_scale: f64,
    /// Metadata key used for categorical annotation coloring.
    pub annotation_key: Option<String>,
    pub filter: CellFilter,
}

impl Default for VisualizationSettings {
    fn default() -> Self {
        Self::from_config(&ExplorerConfig::default())
    }
}

impl VisualizationSettings {
    pub fn from_config(cfg: &ExplorerConfig) -> Self {
        let mut s = Self {
            point_size: 3.0,
            opacity: 0.8,
            show_clusters: cfg.show_clusters,
            show_labels: cfg.show_labels,
            show_averaged: false,
            use_percentile: cfg.use_percentile,
            palette: cfg.palette,
            selected_gene: None,
            selected_genes: Vec::new(),
            percentile_low: 5.0,
            percentile_high: 95.0,
            expression_scale: 1.0,
            annotation_key: None,
            filter: CellFilter::default(),
        };
        s.set_point_size(cfg.point_size);
        s.set_opacity(cfg.opacity);
        s.set_percentiles(cfg.percentile_low, cfg.percentile_high);
        s.set_expression_scale(cfg.expression_scale);
        s
    }

    pub fn percentiles(&self) -> (f64, f64) {
        (self.percentile_low, self.percentile_high)
    }

    /// Accepts only `0 <= low < high <= 100`; anything else leaves the settings untouched.
    pub fn set_percentiles(&mut self, low: f64, high: f64) -> bool {
        let valid = (0.0..=100.0).contains(&low) && (0.0..=100.0).contains(&high) && low < high;
        if !valid {
            warn!("ignoring percentile update low={low} high={high}");
            return false;
        }
        self.percentile_low = low;
        self.percentile_high = high;
        true
    }

    pub fn set_percentile_low(&mut self, low: f64) -> bool {
        self.set_percentiles(low, self.percentile_high)
    }

    pub fn set_percentile_high(&mut self, high: f64) -> bool {
        self.set_percentiles(self.percentile_low, high)
    }

    /// Percentile pair to clip with, when clipping is on.
    pub fn percentile_clip(&self) -> Option<(f64, f64)> {
        self.use_percentile
            .then_some((self.percentile_low, self.percentile_high))
    }

    pub fn expression_scale(&self) -> f64 {
        self.expression_scale
    }

    pub fn set_expression_scale(&mut self, scale: f64) -> bool {
        if !(scale > 0.0 && scale.is_finite()) {
            warn!("ignoring expression scale {scale}");
            return false;
        }
        self.expression_scale = scale;
        true
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        if opacity.is_finite() {
            self.opacity = opacity.clamp(0.0, 1.0);
        }
    }

    pub fn set_point_size(&mut self, size: f32) {
        if size.is_finite() && size > 0.0 {
            self.point_size = size;
        }
    }

    /// Toggle a gene in the averaged gene set.
    pub fn toggle_gene_in_set(&mut self, gene: &str) {
        if let Some(pos) = self.selected_genes.iter().position(|g| g == gene) {
            self.selected_genes.remove(pos);
        } else {
            self.selected_genes.push(gene.to_string());
        }
    }

    /// Clears per-dataset choices when a new dataset is loaded.
    pub fn reset_for_new_dataset(&mut self) {
        self.selected_gene = None;
        self.selected_genes.clear();
        self.annotation_key = None;
        self.filter = CellFilter::default();
    }

    /// A selected single gene always wins over the averaged gene set.
    pub fn expression_source(&self) -> Option<ExpressionSource> {
        if let Some(g) = &self.selected_gene {
            return Some(ExpressionSource::Gene(g.clone()));
        }
        if self.show_averaged && !self.selected_genes.is_empty() {
            return Some(ExpressionSource::Averaged(self.selected_genes.clone()));
        }
        None
    }

    /// Point coloring precedence: expression, then annotation, then cluster, then flat.
    pub fn color_rule(&self, has_expression: bool) -> ColorRule {
        if has_expression && self.expression_source().is_some() {
            ColorRule::Expression
        } else if self.annotation_key.is_some() {
            ColorRule::Annotation
        } else if self.show_clusters {
            ColorRule::Cluster
        } else {
            ColorRule::Flat
        }
    }
}
