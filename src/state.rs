//! The application-state controller. Owns the dataset, view settings, camera
//! and selection; every change goes through a method here, and derived values
//! are memoized against explicit dependency keys.

use log::{debug, info};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::Path,
    sync::Arc,
};

use crate::{
    annotate::{AnnotationHistory, ClusterEdit},
    camera::{Camera, DataBounds, PanDrag, ViewTransform, Viewport},
    color::{annotation_colors, parse_css_color, Rgb},
    config::ExplorerConfig,
    data::{Cell, ClusterId, Dataset, DeRecord, ExpressionMap},
    error::{AnnotationError, LoadError, ValidationWarning},
    expr::ExpressionResolver,
    filter::CellFilter,
    ingest::{load_dataset_file, LoadedDataset},
    memo::Memo,
    palette::{compute_bounds, ColorBounds},
    render::{render_with, ApproxTextMeasure, FrameCommands, PointColoring, Scene, TextMeasure},
    selection::{hit_test, SelectionEngine, SelectionMode},
    settings::{ColorRule, ExpressionSource, VisualizationSettings},
    stats::{centroids, cluster_summaries, ClusterSummary},
};

const FALLBACK_POINT_COLOR: Rgb = Rgb::new(100, 100, 100);

type Centroids = Vec<(ClusterId, [f64; 2])>;

/// What the tooltip shows for the cell under the cursor.
#[derive(Clone, Debug, PartialEq)]
pub struct HoverInfo {
    pub cell_id: String,
    pub cluster: ClusterId,
    pub cluster_name: String,
    pub expression: Option<f64>,
}

pub struct Explorer {
    config: ExplorerConfig,
    dataset: Option<Dataset>,
    history: Option<AnnotationHistory>,
    /// Bumped on every dataset load or edit; the root of every memo key.
    revision: u64,
    settings: VisualizationSettings,
    camera: Camera,
    viewport: Viewport,
    selection: SelectionEngine,
    pan: Option<PanDrag>,
    hovered: Option<usize>,
    resolver: ExpressionResolver,
    default_color: Rgb,

    bounds_memo: Memo<u64, DataBounds>,
    visible_memo: Memo<(u64, CellFilter), Vec<usize>>,
    expression_memo: Memo<(u64, ExpressionSource), ExpressionMap>,
    color_bounds_memo: Memo<(u64, ExpressionSource, Option<(f64, f64)>), ColorBounds>,
    centroid_memo: Memo<(u64, CellFilter), Centroids>,
    cluster_color_memo: Memo<u64, HashMap<ClusterId, Rgb>>,
    annotation_color_memo: Memo<(u64, String), BTreeMap<String, Rgb>>,
}

impl Explorer {
    pub fn new(config: ExplorerConfig) -> Self {
        let default_color = parse_css_color(&config.default_point_color).unwrap_or(FALLBACK_POINT_COLOR);
        Self {
            settings: VisualizationSettings::from_config(&config),
            camera: Camera::with_limits(config.min_scale, config.max_scale),
            viewport: Viewport {
                padding: config.canvas_padding,
                ..Viewport::default()
            },
            resolver: ExpressionResolver::new(config.synthetic_seed, Default::default()),
            default_color,
            config,
            dataset: None,
            history: None,
            revision: 0,
            selection: SelectionEngine::default(),
            pan: None,
            hovered: None,
            bounds_memo: Memo::new("data bounds"),
            visible_memo: Memo::new("filtered cells"),
            expression_memo: Memo::new("expression map"),
            color_bounds_memo: Memo::new("color bounds"),
            centroid_memo: Memo::new("cluster centroids"),
            cluster_color_memo: Memo::new("cluster colors"),
            annotation_color_memo: Memo::new("annotation colors"),
        }
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn settings(&self) -> &VisualizationSettings {
        &self.settings
    }

    /// Apply a settings change. Hover state is dropped since the visible set
    /// may have changed.
    pub fn update_settings(&mut self, f: impl FnOnce(&mut VisualizationSettings)) {
        f(&mut self.settings);
        self.hovered = None;
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Load from disk. On failure the active dataset is left untouched.
    pub fn load_file(&mut self, path: &Path) -> Result<Vec<ValidationWarning>, LoadError> {
        let loaded = load_dataset_file(path)?;
        Ok(self.load(loaded))
    }

    pub fn load(&mut self, loaded: LoadedDataset) -> Vec<ValidationWarning> {
        self.set_dataset(loaded.dataset);
        loaded.warnings
    }

    /// Make `ds` the active dataset and the annotation reset point.
    pub fn set_dataset(&mut self, ds: Dataset) {
        info!(
            "activating dataset {:?}: {} cells, {} clusters",
            ds.metadata.name,
            ds.cells.len(),
            ds.clusters.len()
        );
        self.resolver = ExpressionResolver::for_dataset(&ds, self.config.synthetic_seed);
        self.history = Some(AnnotationHistory::new(ds.clone()));
        self.dataset = Some(ds);
        self.revision += 1;
        self.settings.reset_for_new_dataset();
        self.camera.reset();
        self.selection.clear();
        self.pan = None;
        self.hovered = None;
    }

    // ---- camera / viewport ----

    pub fn set_viewport_size(&mut self, width: f64, height: f64) {
        if width > 0.0 && height > 0.0 && (width, height) != (self.viewport.width, self.viewport.height) {
            self.viewport.width = width;
            self.viewport.height = height;
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn wheel(&mut self, cursor: [f64; 2], notches: f64) {
        self.camera.wheel(cursor, &self.viewport, notches, self.config.zoom_step);
    }

    pub fn zoom_in(&mut self) {
        self.camera.zoom_by(self.config.zoom_step);
    }

    pub fn zoom_out(&mut self) {
        self.camera.zoom_by(1.0 / self.config.zoom_step);
    }

    pub fn reset_view(&mut self) {
        self.camera.reset();
    }

    pub fn transform(&mut self) -> ViewTransform {
        let bounds = *self.bounds();
        ViewTransform::new(bounds, self.viewport, self.camera)
    }

    // ---- pointer state machine ----

    /// Mouse down on the canvas: starts a selection gesture in lasso/rectangle
    /// mode, a pan otherwise.
    pub fn pointer_down(&mut self, pos: [f64; 2]) {
        self.hovered = None;
        if !self.selection.begin(pos) {
            self.pan = Some(PanDrag::begin(&self.camera, pos));
        }
    }

    pub fn pointer_move(&mut self, pos: [f64; 2]) {
        if self.selection.is_active() {
            self.selection.extend(pos);
        } else if let Some(drag) = self.pan {
            drag.update(&mut self.camera, pos);
        } else if self.selection.mode() == SelectionMode::None {
            self.hovered = self.hit(pos);
        }
    }

    /// Mouse up. Returns the newly committed selection when a gesture ended.
    pub fn pointer_up(&mut self, pos: [f64; 2]) -> Option<Vec<Cell>> {
        self.pan = None;
        if !self.selection.is_active() {
            return None;
        }
        self.selection.extend(pos);
        let visible = self.visible();
        let transform = self.transform();
        let ds = self.dataset.as_ref();
        let cells = ds.map(|d| d.cells.as_slice()).unwrap_or(&[]);
        let hits = self.selection.finish(cells, &visible, &transform)?;
        Some(hits.into_iter().map(|i| cells[i].clone()).collect())
    }

    /// Abandons an in-progress gesture or pan. Returns whether one was active.
    pub fn cancel_gesture(&mut self) -> bool {
        let active = self.selection.is_active() || self.pan.is_some();
        self.selection.cancel();
        self.pan = None;
        active
    }

    /// Pointer left the canvas: hover ends, drags stay alive.
    pub fn pointer_leave(&mut self) {
        self.hovered = None;
    }

    pub fn selection_mode(&self) -> SelectionMode {
        self.selection.mode()
    }

    pub fn set_selection_mode(&mut self, mode: SelectionMode) {
        self.selection.set_mode(mode);
        self.pan = None;
        self.hovered = None;
    }

    /// Empties the selection; the empty list is the change notification.
    pub fn clear_selection(&mut self) -> Vec<Cell> {
        self.selection.clear();
        Vec::new()
    }

    /// Selected cells that pass the current filter, in dataset order.
    pub fn selected_cells(&mut self) -> Vec<Cell> {
        let visible = self.visible();
        let Some(ds) = self.dataset.as_ref() else {
            return Vec::new();
        };
        visible
            .iter()
            .map(|&i| &ds.cells[i])
            .filter(|c| self.selection.is_selected(&c.id))
            .cloned()
            .collect()
    }

    pub fn selection_len(&self) -> usize {
        self.selection.selected().len()
    }

    pub fn hovered_cell(&self) -> Option<&Cell> {
        self.dataset.as_ref()?.cells.get(self.hovered?)
    }

    pub fn hover_info(&mut self) -> Option<HoverInfo> {
        let idx = self.hovered?;
        let expr = self.active_expression();
        let ds = self.dataset.as_ref()?;
        let cell = ds.cells.get(idx)?;
        Some(HoverInfo {
            cell_id: cell.id.clone(),
            cluster: cell.cluster,
            cluster_name: ds
                .cluster(cell.cluster)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| format!("Cluster {}", cell.cluster)),
            expression: expr.map(|m| m.get(&cell.id).copied().unwrap_or(0.0)),
        })
    }

    fn hit(&mut self, pos: [f64; 2]) -> Option<usize> {
        let visible = self.visible();
        let transform = self.transform();
        let ds = self.dataset.as_ref()?;
        hit_test(&ds.cells, &visible, &transform, pos, self.config.hover_radius)
    }

    // ---- annotation ----

    pub fn apply_edit(&mut self, edit: ClusterEdit) -> Result<(), AnnotationError> {
        let (Some(ds), Some(history)) = (self.dataset.as_ref(), self.history.as_mut()) else {
            return Ok(());
        };
        let next = history.apply(ds, edit)?;
        let existing: BTreeSet<ClusterId> = next.clusters.iter().map(|c| c.id).collect();
        self.settings.filter.retain_clusters(&existing);
        self.dataset = Some(next);
        self.revision += 1;
        self.hovered = None;
        Ok(())
    }

    pub fn rename_cluster(&mut self, cluster: ClusterId, name: &str) -> Result<(), AnnotationError> {
        self.apply_edit(ClusterEdit::Rename {
            cluster,
            name: name.to_string(),
        })
    }

    pub fn merge_clusters(&mut self, sources: &[ClusterId], target: ClusterId, name: &str) -> Result<(), AnnotationError> {
        self.apply_edit(ClusterEdit::Merge {
            sources: sources.to_vec(),
            target,
            name: name.to_string(),
        })
    }

    pub fn recolor_cluster(&mut self, cluster: ClusterId, color: &str) -> Result<(), AnnotationError> {
        self.apply_edit(ClusterEdit::Recolor {
            cluster,
            color: color.to_string(),
        })
    }

    pub fn edit_count(&self) -> usize {
        self.history.as_ref().map_or(0, |h| h.edits().len())
    }

    /// Restore the dataset exactly as loaded.
    pub fn reset_annotations(&mut self) {
        let Some(history) = self.history.as_mut() else {
            return;
        };
        self.dataset = Some(history.reset());
        self.revision += 1;
        self.hovered = None;
    }

    /// DE rows for a cluster, most significant first. Rows are matched against
    /// the cluster as loaded, so renamed clusters keep their results.
    pub fn de_for_cluster(&self, cluster: ClusterId) -> Vec<DeRecord> {
        let Some(ds) = self.dataset.as_ref() else {
            return Vec::new();
        };
        let info = self
            .history
            .as_ref()
            .and_then(|h| h.original().cluster(cluster))
            .or_else(|| ds.cluster(cluster));
        let Some(info) = info else {
            return Vec::new();
        };
        let mut rows: Vec<DeRecord> = ds.de_for_cluster(info).cloned().collect();
        rows.sort_by(|a, b| a.p_adj.total_cmp(&b.p_adj));
        rows
    }

    // ---- derived values ----

    fn bounds(&mut self) -> Arc<DataBounds> {
        let ds = self.dataset.as_ref();
        self.bounds_memo.get_or_compute(self.revision, || match ds {
            Some(ds) => DataBounds::from_points(ds.cells.iter().map(|c| [c.x, c.y])),
            None => DataBounds::default(),
        })
    }

    /// Indices of cells passing the filter.
    pub fn visible(&mut self) -> Arc<Vec<usize>> {
        let ds = self.dataset.as_ref();
        let filter = &self.settings.filter;
        self.visible_memo
            .get_or_compute((self.revision, filter.clone()), || {
                ds.map(|d| filter.apply(&d.cells)).unwrap_or_default()
            })
    }

    pub fn color_rule(&self) -> ColorRule {
        self.settings.color_rule(self.dataset.is_some())
    }

    /// The expression map driving the current coloring, if any.
    pub fn active_expression(&mut self) -> Option<Arc<ExpressionMap>> {
        if self.color_rule() != ColorRule::Expression {
            return None;
        }
        let source = self.settings.expression_source()?;
        let ds = self.dataset.as_ref()?;
        let resolver = &self.resolver;
        Some(
            self.expression_memo
                .get_or_compute((self.revision, source.clone()), || match &source {
                    ExpressionSource::Gene(g) => resolver.resolve(ds, g),
                    ExpressionSource::Averaged(genes) => resolver.resolve_averaged(ds, genes),
                }),
        )
    }

    pub fn color_bounds(&mut self) -> Option<ColorBounds> {
        let values = self.active_expression()?;
        let source = self.settings.expression_source()?;
        let clip = self.settings.percentile_clip();
        let b = self
            .color_bounds_memo
            .get_or_compute((self.revision, source, clip), || {
                compute_bounds(values.values().copied(), clip)
            });
        Some(*b)
    }

    fn cluster_colors(&mut self) -> Arc<HashMap<ClusterId, Rgb>> {
        let ds = self.dataset.as_ref();
        let default = self.default_color;
        self.cluster_color_memo.get_or_compute(self.revision, || {
            ds.map(|d| {
                d.clusters
                    .iter()
                    .map(|c| (c.id, parse_css_color(&c.color).unwrap_or(default)))
                    .collect()
            })
            .unwrap_or_default()
        })
    }

    /// Category colors for the active annotation key.
    pub fn annotation_colors(&mut self) -> Option<Arc<BTreeMap<String, Rgb>>> {
        let key = self.settings.annotation_key.clone()?;
        let ds = self.dataset.as_ref()?;
        let values = || annotation_colors(ds.metadata_values(&key));
        Some(self.annotation_color_memo.get_or_compute((self.revision, key.clone()), values))
    }

    pub fn centroids(&mut self) -> Arc<Centroids> {
        let visible = self.visible();
        let ds = self.dataset.as_ref();
        self.centroid_memo
            .get_or_compute((self.revision, self.settings.filter.clone()), || {
                ds.map(|d| centroids(&d.cells, &visible)).unwrap_or_default()
            })
    }

    /// Summaries over the filtered cells, with expression stats for the active map.
    pub fn cluster_summaries(&mut self) -> Vec<ClusterSummary> {
        let visible = self.visible();
        let expr = self.active_expression();
        match self.dataset.as_ref() {
            Some(ds) => cluster_summaries(&ds.cells, &visible, expr.as_deref()),
            None => Vec::new(),
        }
    }

    /// Build the draw list for the current state.
    pub fn render(&mut self) -> FrameCommands {
        self.render_with(&ApproxTextMeasure)
    }

    /// As [`Explorer::render`], sizing label boxes with `measure`.
    pub fn render_with(&mut self, measure: &dyn TextMeasure) -> FrameCommands {
        let visible = self.visible();
        let transform = self.transform();
        let rule = self.color_rule();
        let expression = self.active_expression();
        let color_bounds = self.color_bounds();
        let cluster_colors = self.cluster_colors();
        let annotation_colors = self.annotation_colors();
        let labels = self.settings.show_labels.then(|| self.centroids());

        let title = match self.settings.expression_source() {
            Some(ExpressionSource::Gene(g)) => g,
            Some(ExpressionSource::Averaged(genes)) => format!("mean of {} genes", genes.len()),
            None => String::new(),
        };
        let coloring = match (rule, &expression, &annotation_colors, &self.settings.annotation_key) {
            (ColorRule::Expression, Some(values), _, _) => PointColoring::Expression {
                title: title.as_str(),
                values: &**values,
                bounds: color_bounds.unwrap_or(ColorBounds::new(0.0, 0.0)),
                scale: self.settings.expression_scale(),
                palette: self.settings.palette,
            },
            (ColorRule::Annotation, _, Some(colors), Some(key)) => PointColoring::Annotation {
                key: key.as_str(),
                colors: &**colors,
            },
            (ColorRule::Cluster, ..) => PointColoring::Cluster(&*cluster_colors),
            _ => PointColoring::Flat,
        };

        let cells = self.dataset.as_ref().map(|d| d.cells.as_slice()).unwrap_or(&[]);
        let scene = Scene {
            cells,
            visible: &visible,
            transform,
            coloring,
            default_color: self.default_color,
            opacity: self.settings.opacity(),
            point_size: self.settings.point_size,
            selected: self.selection.selected(),
            hovered: self.hovered,
            labels: labels.as_deref().map(|l| l.as_slice()),
            gesture: self.selection.gesture(),
            grid_spacing: self.config.grid_spacing,
            cull_margin: self.config.cull_margin,
        };
        let frame = render_with(&scene, measure);
        debug!(
            "frame: {} points drawn, {} culled, {} commands",
            frame.points_drawn,
            frame.points_culled,
            frame.commands.len()
        );
        frame
    }
}
