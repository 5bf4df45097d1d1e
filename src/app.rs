use crate::{
    color::{parse_css_color, Rgb, Rgba},
    config::ExplorerConfig,
    data::{ClusterId, ClusterInfo},
    palette::Palette,
    render::{DrawCommand, FrameCommands, Legend, TextMeasure},
    selection::SelectionMode,
    state::Explorer,
};
use anyhow::Context as _;
use eframe::egui;
use log::{error, info};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

const MAX_GENE_MATCHES: usize = 120;
const MAX_DE_ROWS: usize = 200;
/// Scroll distance in points counted as one wheel notch.
const SCROLL_PER_NOTCH: f32 = 50.0;
const SWATCH_SIZE: f32 = 12.0;

enum ClusterAction {
    Rename(ClusterId, String),
    Recolor(ClusterId, String),
    Merge(Vec<ClusterId>, ClusterId, String),
    Reset,
}

pub struct ExplorerApp {
    explorer: Explorer,
    dataset_path: Option<PathBuf>,
    open_path: String,
    last_error: Option<String>,
    warnings: Vec<String>,
    notice: Option<String>,

    gene_query: String,
    de_cluster: Option<ClusterId>,

    edit_cluster: Option<ClusterId>,
    rename_text: String,
    merge_sources: BTreeSet<ClusterId>,
    merge_target: Option<ClusterId>,
    merge_name: String,

    dragging: bool,
    last_selection: usize,
    last_legend: Option<Legend>,
}

impl ExplorerApp {
    pub fn new(config: ExplorerConfig, dataset: Option<PathBuf>) -> Self {
        let mut app = Self {
            explorer: Explorer::new(config),
            dataset_path: None,
            open_path: String::new(),
            last_error: None,
            warnings: Vec::new(),
            notice: None,
            gene_query: String::new(),
            de_cluster: None,
            edit_cluster: None,
            rename_text: String::new(),
            merge_sources: BTreeSet::new(),
            merge_target: None,
            merge_name: String::new(),
            dragging: false,
            last_selection: 0,
            last_legend: None,
        };
        if let Some(path) = dataset {
            app.open_path = path.display().to_string();
            if let Err(e) = app.load_dataset(&path) {
                app.report_error(format!("Load failed: {e:#}"));
            }
        }
        app
    }

    fn report_error(&mut self, msg: String) {
        error!("{msg}");
        self.last_error = Some(msg);
    }

    fn open_dataset_dialog(&mut self) -> anyhow::Result<()> {
        let mut dialog = rfd::FileDialog::new()
            .add_filter("Dataset JSON", &["json"])
            .set_title("Open dataset");
        if let Some(dir) = self.dataset_path.as_ref().and_then(|p| p.parent()) {
            dialog = dialog.set_directory(dir);
        }
        let Some(path) = dialog.pick_file() else {
            return Ok(());
        };
        self.load_dataset(&path)
    }

    fn load_dataset(&mut self, path: &Path) -> anyhow::Result<()> {
        let warnings = self
            .explorer
            .load_file(path)
            .with_context(|| format!("load dataset {}", path.display()))?;
        self.warnings = warnings.iter().map(|w| w.to_string()).collect();
        self.dataset_path = Some(path.to_path_buf());
        self.open_path = path.display().to_string();
        self.last_error = None;
        self.notice = None;
        self.de_cluster = None;
        self.edit_cluster = None;
        self.merge_sources.clear();
        self.merge_target = None;
        self.last_selection = 0;
        self.last_legend = None;
        Ok(())
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        let Some(path) = dropped.into_iter().find_map(|f| f.path) else {
            return;
        };
        if let Err(e) = self.load_dataset(&path) {
            self.report_error(format!("Load failed: {e:#}"));
        }
    }

    fn handle_hotkeys(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() {
            return;
        }
        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            if self.explorer.cancel_gesture() {
                self.dragging = false;
            } else {
                self.explorer.clear_selection();
                self.last_selection = 0;
            }
        }
        if ctx.input(|i| i.key_pressed(egui::Key::L)) {
            self.explorer.set_selection_mode(SelectionMode::Lasso);
        }
        if ctx.input(|i| i.key_pressed(egui::Key::R)) {
            self.explorer.set_selection_mode(SelectionMode::Rectangle);
        }
        if ctx.input(|i| i.key_pressed(egui::Key::N)) {
            self.explorer.set_selection_mode(SelectionMode::None);
        }
        if ctx.input(|i| i.key_pressed(egui::Key::Num0)) {
            self.explorer.reset_view();
        }
    }

    fn ui_top_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            match self.explorer.dataset() {
                Some(ds) => ui.strong(&ds.metadata.name),
                None => ui.label("No dataset"),
            };
            ui.separator();
            let visible = self.explorer.visible().len();
            let total = self.explorer.dataset().map_or(0, |d| d.cells.len());
            ui.label(format!("{visible} / {total} cells shown"));
            ui.separator();
            ui.label(format!("{} selected", self.explorer.selection_len()));
            ui.separator();
            ui.label(format!("zoom {:.2}x", self.explorer.camera().scale()));
            if ui.small_button("+").clicked() {
                self.explorer.zoom_in();
            }
            if ui.small_button("-").clicked() {
                self.explorer.zoom_out();
            }
            if ui
                .small_button("Reset view")
                .on_hover_text("Reset pan and zoom (double-click the canvas or press 0).")
                .clicked()
            {
                self.explorer.reset_view();
            }
            if let Some(msg) = self.last_error.as_ref() {
                ui.separator();
                ui.colored_label(egui::Color32::RED, msg);
            }
        });
    }

    fn ui_left_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("scviz-explore");
        ui.separator();

        if ui
            .button("Open dataset")
            .on_hover_text("Open a dataset JSON file.")
            .clicked()
        {
            if let Err(e) = self.open_dataset_dialog() {
                self.report_error(format!("Open failed: {e:#}"));
            }
        }
        ui.horizontal(|ui| {
            let edit = egui::TextEdit::singleline(&mut self.open_path)
                .desired_width(200.0)
                .hint_text("Path to dataset .json");
            ui.add(edit);
            if ui.button("Load path").clicked() {
                if self.open_path.trim().is_empty() {
                    self.last_error = Some("Path is empty.".to_string());
                } else {
                    let path = PathBuf::from(self.open_path.trim());
                    if let Err(e) = self.load_dataset(&path) {
                        self.report_error(format!("Load failed: {e:#}"));
                    }
                }
            }
        });

        if !self.warnings.is_empty() {
            egui::CollapsingHeader::new(format!("Warnings ({})", self.warnings.len()))
                .default_open(false)
                .show(ui, |ui| {
                    for w in &self.warnings {
                        ui.colored_label(egui::Color32::from_rgb(240, 200, 90), w);
                    }
                });
        }

        ui.separator();
        let Some(ds) = self.explorer.dataset() else {
            ui.label("No dataset loaded.");
            return;
        };
        let md = &ds.metadata;
        if !md.description.is_empty() {
            ui.label(&md.description);
        }
        let origin: Vec<&str> = [md.organism.as_deref(), md.tissue.as_deref(), md.source.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if !origin.is_empty() {
            ui.label(origin.join(" / "));
        }
        ui.label(format!(
            "{} cells, {} genes, {} clusters",
            md.cell_count, md.gene_count, md.cluster_count
        ));
        if let Some(p) = self.dataset_path.as_ref() {
            ui.small(p.display().to_string());
        }

        ui.separator();
        egui::CollapsingHeader::new("Coloring")
            .default_open(true)
            .show(ui, |ui| self.ui_coloring(ui));
        egui::CollapsingHeader::new("Filters")
            .default_open(false)
            .show(ui, |ui| self.ui_filters(ui));
        egui::CollapsingHeader::new("Selection")
            .default_open(true)
            .show(ui, |ui| self.ui_selection(ui));
        egui::CollapsingHeader::new("Clusters")
            .default_open(false)
            .show(ui, |ui| self.ui_clusters(ui));
        egui::CollapsingHeader::new("Differential expression")
            .default_open(false)
            .show(ui, |ui| self.ui_de(ui));
    }

    fn ui_coloring(&mut self, ui: &mut egui::Ui) {
        let before = self.explorer.settings().clone();
        let mut s = before.clone();
        let Some(ds) = self.explorer.dataset() else {
            return;
        };

        ui.horizontal(|ui| {
            ui.label("Gene");
            ui.text_edit_singleline(&mut self.gene_query);
        });
        if let Some(g) = s.selected_gene.clone() {
            ui.horizontal(|ui| {
                ui.label(format!("Selected: {g}"));
                if ui.small_button("clear").clicked() {
                    s.selected_gene = None;
                }
            });
        }
        let needle = self.gene_query.trim().to_ascii_lowercase();
        let mut shown = 0usize;
        let mut total = 0usize;
        let row_height = ui.spacing().interact_size.y.max(20.0);
        egui::ScrollArea::vertical()
            .id_salt("gene_list")
            .max_height(row_height * 8.0 + 8.0)
            .show(ui, |ui| {
                for name in &ds.genes {
                    if !needle.is_empty() && !name.to_ascii_lowercase().contains(&needle) {
                        continue;
                    }
                    total += 1;
                    if shown >= MAX_GENE_MATCHES {
                        continue;
                    }
                    shown += 1;
                    ui.horizontal(|ui| {
                        let in_set = s.selected_genes.contains(name);
                        if ui
                            .small_button(if in_set { "-" } else { "+" })
                            .on_hover_text("Add to / remove from the gene set")
                            .clicked()
                        {
                            s.toggle_gene_in_set(name);
                        }
                        let selected = s.selected_gene.as_deref() == Some(name.as_str());
                        if ui.selectable_label(selected, name).clicked() {
                            s.selected_gene = Some(name.clone());
                        }
                    });
                }
            });
        if total == 0 {
            ui.label("No matches.");
        } else if total > MAX_GENE_MATCHES {
            ui.label(format!("Showing {MAX_GENE_MATCHES} of {total} matches."));
        }

        if !s.selected_genes.is_empty() {
            ui.label(format!("Gene set: {}", s.selected_genes.join(", ")));
            ui.horizontal(|ui| {
                ui.checkbox(&mut s.show_averaged, "Color by gene-set average");
                if ui.small_button("clear set").clicked() {
                    s.selected_genes.clear();
                }
            });
            if s.show_averaged && s.selected_gene.is_some() {
                ui.small("A selected single gene takes precedence.");
            }
        }

        ui.separator();
        egui::ComboBox::from_label("Palette")
            .selected_text(s.palette.name())
            .show_ui(ui, |ui| {
                for p in Palette::ALL {
                    ui.selectable_value(&mut s.palette, p, p.name());
                }
            });
        ui.checkbox(&mut s.use_percentile, "Percentile clipping");
        let (mut low, mut high) = s.percentiles();
        ui.add_enabled_ui(s.use_percentile, |ui| {
            if ui
                .add(egui::Slider::new(&mut low, 0.0..=100.0).text("low %"))
                .changed()
            {
                s.set_percentile_low(low);
            }
            if ui
                .add(egui::Slider::new(&mut high, 0.0..=100.0).text("high %"))
                .changed()
            {
                s.set_percentile_high(high);
            }
        });
        let mut scale = s.expression_scale();
        if ui
            .add(
                egui::Slider::new(&mut scale, 0.1..=5.0)
                    .logarithmic(true)
                    .text("contrast"),
            )
            .changed()
        {
            s.set_expression_scale(scale);
        }

        ui.separator();
        let current = s.annotation_key.clone().unwrap_or_else(|| "none".to_string());
        egui::ComboBox::from_label("Annotation")
            .selected_text(current)
            .show_ui(ui, |ui| {
                ui.selectable_value(&mut s.annotation_key, None, "none");
                for key in &ds.annotation_options {
                    ui.selectable_value(&mut s.annotation_key, Some(key.clone()), key);
                }
            });
        ui.checkbox(&mut s.show_clusters, "Color by cluster");
        ui.checkbox(&mut s.show_labels, "Cluster labels");
        ui.add(egui::Slider::new(&mut s.point_size, 1.0..=12.0).text("point size"));
        let mut opacity = s.opacity();
        if ui
            .add(egui::Slider::new(&mut opacity, 0.05..=1.0).text("opacity"))
            .changed()
        {
            s.set_opacity(opacity);
        }

        if s != before {
            self.explorer.update_settings(|t| *t = s);
        }

        if let Some(legend) = self.last_legend.as_ref() {
            ui.separator();
            draw_gradient_legend(ui, legend);
        } else if let Some(colors) = self.explorer.annotation_colors() {
            ui.separator();
            for (value, c) in colors.iter().take(MAX_GENE_MATCHES) {
                ui.horizontal(|ui| {
                    swatch(ui, rgb32(*c));
                    ui.label(value);
                });
            }
        }
    }

    fn ui_filters(&mut self, ui: &mut egui::Ui) {
        let Some(ds) = self.explorer.dataset() else {
            return;
        };
        let mut filter = self.explorer.settings().filter.clone();
        let before = filter.clone();

        ui.label("Samples");
        for sample in ds.samples() {
            let mut on = filter.samples.contains(&sample);
            if ui.checkbox(&mut on, &sample).changed() {
                if on {
                    filter.samples.insert(sample);
                } else {
                    filter.samples.remove(&sample);
                }
            }
        }
        ui.label("Clusters");
        for c in &ds.clusters {
            ui.horizontal(|ui| {
                let mut on = filter.clusters.contains(&c.id);
                if ui.checkbox(&mut on, "").changed() {
                    if on {
                        filter.clusters.insert(c.id);
                    } else {
                        filter.clusters.remove(&c.id);
                    }
                }
                swatch(ui, cluster_color32(c));
                ui.label(format!("{} {} ({})", c.id, c.name, c.cell_count));
            });
        }
        if ui
            .add_enabled(!filter.is_empty(), egui::Button::new("Clear filters"))
            .clicked()
        {
            filter = Default::default();
        }

        if filter != before {
            self.explorer.update_settings(|s| s.filter = filter);
        }
    }

    fn ui_selection(&mut self, ui: &mut egui::Ui) {
        let mut mode = self.explorer.selection_mode();
        ui.horizontal(|ui| {
            ui.selectable_value(&mut mode, SelectionMode::None, "Pan")
                .on_hover_text("Drag to pan, hover for details (N)");
            ui.selectable_value(&mut mode, SelectionMode::Lasso, "Lasso")
                .on_hover_text("Free-form selection (L)");
            ui.selectable_value(&mut mode, SelectionMode::Rectangle, "Rectangle")
                .on_hover_text("Box selection (R)");
        });
        if mode != self.explorer.selection_mode() {
            self.explorer.set_selection_mode(mode);
        }

        let selected = self.explorer.selected_cells();
        ui.label(format!(
            "{} cells selected ({} in last gesture)",
            selected.len(),
            self.last_selection
        ));
        if !selected.is_empty() {
            let preview: Vec<&str> = selected.iter().take(5).map(|c| c.id.as_str()).collect();
            let more = selected.len().saturating_sub(preview.len());
            let mut text = preview.join(", ");
            if more > 0 {
                text.push_str(&format!(" and {more} more"));
            }
            ui.small(text);
        }
        if ui
            .add_enabled(!selected.is_empty(), egui::Button::new("Clear selection"))
            .clicked()
        {
            self.last_selection = self.explorer.clear_selection().len();
        }
    }

    fn ui_clusters(&mut self, ui: &mut egui::Ui) {
        let summaries = self.explorer.cluster_summaries();
        let Some(ds) = self.explorer.dataset() else {
            return;
        };
        let clusters: Vec<ClusterInfo> = ds.clusters.clone();
        let mut action = None;

        egui::Grid::new("cluster_summary")
            .striped(true)
            .num_columns(5)
            .show(ui, |ui| {
                ui.strong("");
                ui.strong("cluster");
                ui.strong("shown");
                ui.strong("mean");
                ui.strong("% expr");
                ui.end_row();
                for c in &clusters {
                    let summary = summaries.iter().find(|s| s.cluster == c.id);
                    let mut rgb = parse_css_color(&c.color).unwrap_or(Rgb::new(200, 200, 200));
                    let mut arr = [rgb.r, rgb.g, rgb.b];
                    if ui.color_edit_button_srgb(&mut arr).changed() {
                        rgb = Rgb::new(arr[0], arr[1], arr[2]);
                        action = Some(ClusterAction::Recolor(c.id, rgb.to_css()));
                    }
                    let editing = self.edit_cluster == Some(c.id);
                    if ui
                        .selectable_label(editing, format!("{} {}", c.id, c.name))
                        .clicked()
                    {
                        self.edit_cluster = Some(c.id);
                        self.rename_text = c.name.clone();
                    }
                    ui.label(summary.map_or(0, |s| s.n_cells).to_string());
                    match summary.and_then(|s| s.mean_expression.zip(s.frac_expressing)) {
                        Some((mean, frac)) => {
                            ui.label(format!("{mean:.2}"));
                            ui.label(format!("{:.0}", frac * 100.0));
                        }
                        None => {
                            ui.label("-");
                            ui.label("-");
                        }
                    }
                    ui.end_row();
                }
            });

        if let Some(id) = self.edit_cluster {
            ui.separator();
            ui.horizontal(|ui| {
                ui.label(format!("Rename {id}"));
                ui.text_edit_singleline(&mut self.rename_text);
                let ok = !self.rename_text.trim().is_empty();
                if ui.add_enabled(ok, egui::Button::new("Apply")).clicked() {
                    action = Some(ClusterAction::Rename(id, self.rename_text.trim().to_string()));
                }
            });
        }

        ui.separator();
        ui.label("Merge clusters");
        ui.horizontal_wrapped(|ui| {
            for c in &clusters {
                let mut on = self.merge_sources.contains(&c.id);
                if ui.checkbox(&mut on, c.id.to_string()).changed() {
                    if on {
                        self.merge_sources.insert(c.id);
                    } else {
                        self.merge_sources.remove(&c.id);
                    }
                }
            }
        });
        let target_text = self
            .merge_target
            .map_or_else(|| "choose".to_string(), |t| t.to_string());
        egui::ComboBox::from_label("into")
            .selected_text(target_text)
            .show_ui(ui, |ui| {
                for c in &clusters {
                    ui.selectable_value(&mut self.merge_target, Some(c.id), format!("{} {}", c.id, c.name));
                }
            });
        ui.horizontal(|ui| {
            ui.label("Name");
            ui.text_edit_singleline(&mut self.merge_name);
        });
        let can_merge = !self.merge_sources.is_empty() && self.merge_target.is_some();
        if ui.add_enabled(can_merge, egui::Button::new("Merge")).clicked() {
            if let Some(target) = self.merge_target {
                let name = match self.merge_name.trim() {
                    "" => clusters
                        .iter()
                        .find(|c| c.id == target)
                        .map_or_else(|| target.to_string(), |c| c.name.clone()),
                    n => n.to_string(),
                };
                let sources = self.merge_sources.iter().copied().collect();
                action = Some(ClusterAction::Merge(sources, target, name));
            }
        }

        ui.separator();
        let edits = self.explorer.edit_count();
        if ui
            .add_enabled(edits > 0, egui::Button::new(format!("Reset annotations ({edits} edits)")))
            .clicked()
        {
            action = Some(ClusterAction::Reset);
        }
        if let Some(msg) = self.notice.as_ref() {
            ui.colored_label(egui::Color32::from_rgb(240, 200, 90), msg);
        }

        if let Some(action) = action {
            self.apply_cluster_action(action);
        }
    }

    fn apply_cluster_action(&mut self, action: ClusterAction) {
        let result = match action {
            ClusterAction::Rename(id, name) => self.explorer.rename_cluster(id, &name),
            ClusterAction::Recolor(id, color) => self.explorer.recolor_cluster(id, &color),
            ClusterAction::Merge(sources, target, name) => {
                let r = self.explorer.merge_clusters(&sources, target, &name);
                if r.is_ok() {
                    self.merge_sources.clear();
                    self.merge_name.clear();
                }
                r
            }
            ClusterAction::Reset => {
                self.explorer.reset_annotations();
                self.edit_cluster = None;
                Ok(())
            }
        };
        match result {
            Ok(()) => self.notice = None,
            Err(e) => {
                info!("cluster edit rejected: {e}");
                self.notice = Some(e.to_string());
            }
        }
    }

    fn ui_de(&mut self, ui: &mut egui::Ui) {
        let Some(ds) = self.explorer.dataset() else {
            return;
        };
        let label = self
            .de_cluster
            .and_then(|id| ds.cluster(id))
            .map_or_else(|| "choose".to_string(), |c| format!("{} {}", c.id, c.name));
        egui::ComboBox::from_label("Cluster")
            .selected_text(label)
            .show_ui(ui, |ui| {
                for c in &ds.clusters {
                    ui.selectable_value(&mut self.de_cluster, Some(c.id), format!("{} {}", c.id, c.name));
                }
            });
        let Some(cluster) = self.de_cluster else {
            return;
        };
        let rows = self.explorer.de_for_cluster(cluster);
        if rows.is_empty() {
            ui.label("No differential expression results for this cluster.");
            return;
        }
        let current = self.explorer.settings().selected_gene.clone();
        let mut pick = None;
        egui::ScrollArea::vertical()
            .id_salt("de_rows")
            .max_height(260.0)
            .show(ui, |ui| {
                egui::Grid::new("de_grid").striped(true).num_columns(3).show(ui, |ui| {
                    ui.strong("gene");
                    ui.strong("logFC");
                    ui.strong("p adj");
                    ui.end_row();
                    for r in rows.iter().take(MAX_DE_ROWS) {
                        let selected = current.as_deref() == Some(r.gene.as_str());
                        if ui.selectable_label(selected, &r.gene).clicked() {
                            pick = Some(r.gene.clone());
                        }
                        ui.label(format!("{:.2}", r.log_fc));
                        ui.label(format_scale_value(r.p_adj));
                        ui.end_row();
                    }
                });
            });
        if let Some(gene) = pick {
            self.explorer.update_settings(|s| s.selected_gene = Some(gene));
        }
    }

    fn ui_viewport(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), egui::Sense::click_and_drag());
        self.explorer
            .set_viewport_size(rect.width() as f64, rect.height() as f64);
        let local = |p: egui::Pos2| [(p.x - rect.min.x) as f64, (p.y - rect.min.y) as f64];

        if response.drag_started_by(egui::PointerButton::Primary) {
            let origin = ctx
                .input(|i| i.pointer.press_origin())
                .or(response.interact_pointer_pos());
            if let Some(p) = origin {
                self.explorer.pointer_down(local(p));
                self.dragging = true;
            }
        }
        let latest = ctx.input(|i| i.pointer.latest_pos());
        if self.dragging {
            if let Some(p) = latest {
                self.explorer.pointer_move(local(p));
            }
            if response.drag_stopped() || !ctx.input(|i| i.pointer.primary_down()) {
                self.dragging = false;
                let p = latest.unwrap_or(rect.center());
                if let Some(cells) = self.explorer.pointer_up(local(p)) {
                    info!("{} cells selected", cells.len());
                    self.last_selection = cells.len();
                }
            }
        } else if let Some(p) = response.hover_pos() {
            self.explorer.pointer_move(local(p));
        } else {
            self.explorer.pointer_leave();
        }

        if response.double_clicked() {
            self.explorer.reset_view();
        }
        if response.hovered() {
            let scroll = ctx.input(|i| i.smooth_scroll_delta.y);
            if scroll.abs() > 0.0 {
                let mouse = response.hover_pos().unwrap_or(rect.center());
                self.explorer
                    .wheel(local(mouse), (scroll / SCROLL_PER_NOTCH) as f64);
            }
        }

        let frame = self.explorer.render_with(&EguiTextMeasure { ctx });
        paint_frame(&ui.painter_at(rect), rect, &frame);
        self.last_legend = frame.legend;

        if self.dragging {
            ctx.request_repaint();
        }
        if let Some(info) = self.explorer.hover_info() {
            response.on_hover_ui_at_pointer(|ui| {
                ui.strong(&info.cell_id);
                ui.label(format!("cluster {} ({})", info.cluster, info.cluster_name));
                if let Some(v) = info.expression {
                    ui.label(format!("expression {}", format_scale_value(v)));
                }
            });
        }
    }
}

impl eframe::App for ExplorerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_dropped_files(ctx);
        self.handle_hotkeys(ctx);

        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            self.ui_top_bar(ui);
        });

        egui::SidePanel::left("left_panel")
            .resizable(true)
            .default_width(320.0)
            .max_width(480.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().auto_shrink([false; 2]).show(ui, |ui| {
                    self.ui_left_panel(ui);
                });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.ui_viewport(ui, ctx);
        });
    }
}

/// Label widths from the actual UI font.
struct EguiTextMeasure<'a> {
    ctx: &'a egui::Context,
}

impl TextMeasure for EguiTextMeasure<'_> {
    fn text_width(&self, text: &str, font_size: f32) -> f64 {
        let galley = self.ctx.fonts(|f| {
            f.layout_no_wrap(
                text.to_string(),
                egui::FontId::proportional(font_size),
                egui::Color32::BLACK,
            )
        });
        galley.size().x as f64
    }
}

fn paint_frame(painter: &egui::Painter, rect: egui::Rect, frame: &FrameCommands) {
    let to_screen = |p: [f64; 2]| rect.min + egui::vec2(p[0] as f32, p[1] as f32);
    for cmd in &frame.commands {
        match cmd {
            DrawCommand::Clear(c) => {
                painter.rect_filled(rect, 0.0, rgb32(*c));
            }
            DrawCommand::Line { from, to, width, color } => {
                painter.line_segment([to_screen(*from), to_screen(*to)], (*width, color32(*color)));
            }
            DrawCommand::Circle { center, radius, fill } => {
                painter.circle_filled(to_screen(*center), *radius, color32(*fill));
            }
            DrawCommand::Ring {
                center,
                radius,
                width,
                color,
            } => {
                painter.circle_stroke(to_screen(*center), *radius, (*width, color32(*color)));
            }
            DrawCommand::Label {
                center,
                size,
                text,
                font_size,
                background,
                text_color,
            } => {
                let r = egui::Rect::from_center_size(to_screen(*center), egui::vec2(size[0] as f32, size[1] as f32));
                painter.rect_filled(r, 3.0, color32(*background));
                painter.text(
                    r.center(),
                    egui::Align2::CENTER_CENTER,
                    text,
                    egui::FontId::proportional(*font_size),
                    rgb32(*text_color),
                );
            }
            DrawCommand::Polygon {
                points,
                closed,
                fill,
                stroke,
            } => {
                let pts: Vec<egui::Pos2> = points.iter().map(|p| to_screen(*p)).collect();
                let stroke = egui::Stroke::new(1.5, color32(*stroke));
                match (*closed, fill) {
                    (true, Some(fill)) => painter.add(egui::Shape::convex_polygon(pts, color32(*fill), stroke)),
                    (true, None) => painter.add(egui::Shape::closed_line(pts, stroke)),
                    (false, _) => painter.add(egui::Shape::line(pts, stroke)),
                };
            }
        }
    }
}

fn draw_gradient_legend(ui: &mut egui::Ui, legend: &Legend) {
    ui.label(&legend.title);
    let (rect, _) = ui.allocate_exact_size(egui::vec2(180.0, 14.0), egui::Sense::hover());
    let steps = 32;
    let seg_w = rect.width() / steps as f32;
    for i in 0..steps {
        let t = i as f64 / (steps - 1) as f64;
        let color = rgb32(legend.palette.sample(t));
        let x0 = rect.left() + seg_w * i as f32;
        let seg = egui::Rect::from_min_size(egui::pos2(x0, rect.top()), egui::vec2(seg_w + 1.0, rect.height()));
        ui.painter().rect_filled(seg, 0.0, color);
    }
    ui.label(format!(
        "Range: {} .. {}  (contrast {})",
        format_scale_value(legend.bounds.min),
        format_scale_value(legend.bounds.max),
        format_scale_value(legend.scale)
    ));
}

fn swatch(ui: &mut egui::Ui, color: egui::Color32) {
    let (rect, _) = ui.allocate_exact_size(egui::vec2(SWATCH_SIZE, SWATCH_SIZE), egui::Sense::hover());
    ui.painter().rect_filled(rect, 2.0, color);
}

fn cluster_color32(c: &ClusterInfo) -> egui::Color32 {
    rgb32(parse_css_color(&c.color).unwrap_or(Rgb::new(200, 200, 200)))
}

fn rgb32(c: Rgb) -> egui::Color32 {
    egui::Color32::from_rgb(c.r, c.g, c.b)
}

fn color32(c: Rgba) -> egui::Color32 {
    egui::Color32::from_rgba_unmultiplied(c.rgb.r, c.rgb.g, c.rgb.b, c.a)
}

fn format_scale_value(v: f64) -> String {
    let av = v.abs();
    if av > 0.0 && (av < 0.01 || av >= 1000.0) {
        format!("{v:.2e}")
    } else {
        format!("{v:.3}")
    }
}
