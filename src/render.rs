//! Scatter renderer. `render` turns a [`Scene`] into a flat list of draw
//! commands in canvas pixels; nothing here touches a drawing surface.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{
    camera::ViewTransform,
    color::{Rgb, Rgba},
    data::{Cell, ClusterId, ExpressionMap},
    palette::{map_color, ColorBounds, Palette},
    selection::Gesture,
};

pub const BACKGROUND: Rgb = Rgb::WHITE;
pub const GRID_COLOR: Rgb = Rgb::new(235, 235, 235);
pub const SELECTION_RING: Rgb = Rgb::new(255, 140, 0);
pub const HOVER_RING: Rgb = Rgb::BLACK;
pub const GESTURE_COLOR: Rgb = Rgb::new(59, 130, 246);
/// Above this many lines per axis the grid step doubles.
pub const MAX_GRID_LINES: usize = 120;
pub const LABEL_FONT_SIZE: f32 = 12.0;
pub const LABEL_PADDING: [f64; 2] = [4.0, 2.0];
/// Label boxes never get narrower than this, even for one-digit labels.
pub const MIN_LABEL_BOX_WIDTH: f64 = 20.0;

#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    Clear(Rgb),
    Line {
        from: [f64; 2],
        to: [f64; 2],
        width: f32,
        color: Rgba,
    },
    Circle {
        center: [f64; 2],
        radius: f32,
        fill: Rgba,
    },
    Ring {
        center: [f64; 2],
        radius: f32,
        width: f32,
        color: Rgba,
    },
    /// Text centered in a filled box of `size`.
    Label {
        center: [f64; 2],
        size: [f64; 2],
        text: String,
        font_size: f32,
        background: Rgba,
        text_color: Rgb,
    },
    /// Open polyline when `closed` is false. `fill` is only set for convex
    /// shapes; lassos are outlined.
    Polygon {
        points: Vec<[f64; 2]>,
        closed: bool,
        fill: Option<Rgba>,
        stroke: Rgba,
    },
}

/// Color scale shown next to the canvas while coloring by expression.
#[derive(Clone, Debug, PartialEq)]
pub struct Legend {
    pub title: String,
    pub palette: Palette,
    pub bounds: ColorBounds,
    pub scale: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameCommands {
    pub commands: Vec<DrawCommand>,
    pub legend: Option<Legend>,
    pub points_drawn: usize,
    pub points_culled: usize,
}

/// How each visible point gets its fill color.
#[derive(Clone, Copy, Debug)]
pub enum PointColoring<'a> {
    Expression {
        title: &'a str,
        values: &'a ExpressionMap,
        bounds: ColorBounds,
        scale: f64,
        palette: Palette,
    },
    Annotation {
        key: &'a str,
        colors: &'a BTreeMap<String, Rgb>,
    },
    Cluster(&'a HashMap<ClusterId, Rgb>),
    Flat,
}

#[derive(Clone, Copy, Debug)]
pub struct Scene<'a> {
    pub cells: &'a [Cell],
    /// Indices into `cells` that pass the active filter, in draw order.
    pub visible: &'a [usize],
    pub transform: ViewTransform,
    pub coloring: PointColoring<'a>,
    pub default_color: Rgb,
    pub opacity: f32,
    pub point_size: f32,
    pub selected: &'a HashSet<String>,
    pub hovered: Option<usize>,
    /// Cluster centroids to label, in data space.
    pub labels: Option<&'a [(ClusterId, [f64; 2])]>,
    pub gesture: Option<&'a Gesture>,
    pub grid_spacing: f64,
    pub cull_margin: f64,
}

/// Text width estimate used for label boxes.
pub trait TextMeasure {
    fn text_width(&self, text: &str, font_size: f32) -> f64;
}

/// Fixed-advance approximation: 0.6 em per character.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApproxTextMeasure;

impl TextMeasure for ApproxTextMeasure {
    fn text_width(&self, text: &str, font_size: f32) -> f64 {
        text.chars().count() as f64 * 0.6 * font_size as f64
    }
}

pub fn render(scene: &Scene<'_>) -> FrameCommands {
    render_with(scene, &ApproxTextMeasure)
}

pub fn render_with(scene: &Scene<'_>, measure: &dyn TextMeasure) -> FrameCommands {
    let mut out = FrameCommands::default();
    out.commands.push(DrawCommand::Clear(BACKGROUND));
    push_grid(&mut out.commands, &scene.transform, scene.grid_spacing);

    let t = &scene.transform;
    let radius = scene.point_size;
    for &i in scene.visible {
        let Some(cell) = scene.cells.get(i) else {
            continue;
        };
        let p = t.data_to_canvas(cell.x, cell.y);
        if !t.in_view(p, scene.cull_margin) {
            out.points_culled += 1;
            continue;
        }
        if scene.selected.contains(&cell.id) {
            out.commands.push(DrawCommand::Ring {
                center: p,
                radius: radius + 2.0,
                width: 2.0,
                color: SELECTION_RING.with_alpha(1.0),
            });
        }
        out.commands.push(DrawCommand::Circle {
            center: p,
            radius,
            fill: point_color(cell, &scene.coloring, scene.default_color).with_alpha(scene.opacity),
        });
        out.points_drawn += 1;
    }

    if let Some(cell) = scene.hovered.and_then(|i| scene.cells.get(i)) {
        out.commands.push(DrawCommand::Ring {
            center: t.data_to_canvas(cell.x, cell.y),
            radius: radius + 3.0,
            width: 1.5,
            color: HOVER_RING.with_alpha(1.0),
        });
    }

    if let Some(labels) = scene.labels {
        for (cluster, centroid) in labels {
            let center = t.data_to_canvas(centroid[0], centroid[1]);
            if !t.in_view(center, scene.cull_margin) {
                continue;
            }
            out.commands.push(label_command(center, cluster.to_string(), measure));
        }
    }

    if let Some(g) = scene.gesture {
        out.commands.push(gesture_overlay(g));
    }

    if let PointColoring::Expression {
        title,
        bounds,
        scale,
        palette,
        ..
    } = scene.coloring
    {
        out.legend = Some(Legend {
            title: title.to_string(),
            palette,
            bounds,
            scale,
        });
    }
    out
}

/// Fill color for one cell under `coloring`, before opacity.
pub fn point_color(cell: &Cell, coloring: &PointColoring<'_>, default: Rgb) -> Rgb {
    match coloring {
        // an empty map means the gene has no signal; keep the points neutral
        PointColoring::Expression { values, .. } if values.is_empty() => default,
        PointColoring::Expression {
            values,
            bounds,
            scale,
            palette,
            ..
        } => {
            let v = values.get(&cell.id).copied().unwrap_or(0.0);
            map_color(v, *bounds, *scale, *palette)
        }
        PointColoring::Annotation { key, colors } => cell
            .meta(key)
            .and_then(|v| colors.get(&*v.as_text()))
            .copied()
            .unwrap_or(default),
        PointColoring::Cluster(colors) => colors.get(&cell.cluster).copied().unwrap_or(default),
        PointColoring::Flat => default,
    }
}

/// Grid step actually drawn: `spacing` doubled until each axis has at most
/// [`MAX_GRID_LINES`] lines across `extent`.
pub fn grid_step(spacing: f64, extent: f64) -> Option<f64> {
    if !(spacing > 0.0 && spacing.is_finite() && extent.is_finite()) {
        return None;
    }
    let mut step = spacing;
    while extent / step > MAX_GRID_LINES as f64 {
        step *= 2.0;
    }
    Some(step)
}

fn push_grid(out: &mut Vec<DrawCommand>, t: &ViewTransform, spacing: f64) {
    let (min, max) = t.visible_data_rect();
    let extent = (max[0] - min[0]).max(max[1] - min[1]);
    let Some(step) = grid_step(spacing, extent) else {
        return;
    };
    let color = GRID_COLOR.with_alpha(1.0);
    for x in grid_lines(min[0], max[0], step) {
        out.push(DrawCommand::Line {
            from: t.data_to_canvas(x, min[1]),
            to: t.data_to_canvas(x, max[1]),
            width: 1.0,
            color,
        });
    }
    for y in grid_lines(min[1], max[1], step) {
        out.push(DrawCommand::Line {
            from: t.data_to_canvas(min[0], y),
            to: t.data_to_canvas(max[0], y),
            width: 1.0,
            color,
        });
    }
}

/// Multiples of `step` covering `[lo, hi]`, at most `MAX_GRID_LINES + 1` of
/// them. Empty when `step` does not exceed the float spacing at either end,
/// where neighbouring lines would collapse onto the same value.
fn grid_lines(lo: f64, hi: f64, step: f64) -> impl Iterator<Item = f64> {
    let ulp = |v: f64| {
        let a = v.abs();
        f64::from_bits(a.to_bits() + 1) - a
    };
    let usable = lo.is_finite() && hi.is_finite() && lo <= hi && step > ulp(lo).max(ulp(hi));
    let (first, count) = if usable {
        let first = (lo / step).floor();
        let last = (hi / step).ceil();
        let count = ((last - first) as i64 + 1).clamp(0, MAX_GRID_LINES as i64 + 1);
        (first, count)
    } else {
        (0.0, 0)
    };
    (0..count).map(move |k| (first + k as f64) * step)
}

fn label_command(center: [f64; 2], text: String, measure: &dyn TextMeasure) -> DrawCommand {
    let w = measure.text_width(&text, LABEL_FONT_SIZE) + 2.0 * LABEL_PADDING[0];
    let h = LABEL_FONT_SIZE as f64 + 2.0 * LABEL_PADDING[1];
    DrawCommand::Label {
        center,
        size: [w.max(MIN_LABEL_BOX_WIDTH), h],
        text,
        font_size: LABEL_FONT_SIZE,
        background: Rgb::WHITE.with_alpha(0.85),
        text_color: Rgb::BLACK,
    }
}

fn gesture_overlay(g: &Gesture) -> DrawCommand {
    let fill = GESTURE_COLOR.with_alpha(0.15);
    let stroke = GESTURE_COLOR.with_alpha(0.9);
    match g {
        Gesture::Lasso(points) => DrawCommand::Polygon {
            points: points.clone(),
            closed: points.len() >= 3,
            fill: None,
            stroke,
        },
        Gesture::Rectangle { start, end } => DrawCommand::Polygon {
            points: vec![*start, [end[0], start[1]], *end, [start[0], end[1]]],
            closed: true,
            fill: Some(fill),
            stroke,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        camera::{Camera, DataBounds, Viewport},
        data::tests::small_dataset,
    };

    fn scene<'a>(
        cells: &'a [Cell],
        visible: &'a [usize],
        selected: &'a HashSet<String>,
        coloring: PointColoring<'a>,
    ) -> Scene<'a> {
        Scene {
            cells,
            visible,
            transform: ViewTransform::new(
                DataBounds::from_points(cells.iter().map(|c| [c.x, c.y])),
                Viewport::default(),
                Camera::default(),
            ),
            coloring,
            default_color: Rgb::new(100, 100, 100),
            opacity: 0.8,
            point_size: 3.0,
            selected,
            hovered: None,
            labels: None,
            gesture: None,
            grid_spacing: 1.0,
            cull_margin: 10.0,
        }
    }

    fn circles(f: &FrameCommands) -> Vec<(&[f64; 2], &Rgba)> {
        f.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Circle { center, fill, .. } => Some((center, fill)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn frame_starts_with_white_clear_and_grid() {
        let ds = small_dataset();
        let sel = HashSet::new();
        let f = render(&scene(&ds.cells, &[0, 1, 2, 3, 4], &sel, PointColoring::Flat));
        assert_eq!(f.commands[0], DrawCommand::Clear(Rgb::WHITE));
        assert!(matches!(f.commands[1], DrawCommand::Line { .. }));
        assert_eq!(f.points_drawn, 5);
        assert!(f.legend.is_none());
        assert!(circles(&f)
            .iter()
            .all(|(_, c)| c.rgb == Rgb::new(100, 100, 100) && c.a == 204));
    }

    #[test]
    fn grid_is_skipped_when_steps_vanish_at_far_offsets() {
        let cells = vec![
            crate::data::tests::cell("a", 1e18, 1e18, 0, "s1"),
            crate::data::tests::cell("b", 1e18 + 1000.0, 1e18 + 1000.0, 0, "s1"),
        ];
        let sel = HashSet::new();
        let mut s = scene(&cells, &[0, 1], &sel, PointColoring::Flat);
        s.grid_spacing = 16.0;
        let f = render(&s);
        assert!(!f.commands.iter().any(|c| matches!(c, DrawCommand::Line { .. })));
        assert_eq!(f.points_drawn, 2);
    }

    #[test]
    fn grid_lines_are_bounded() {
        assert_eq!(grid_lines(0.0, 3.0, 1.0).collect::<Vec<_>>(), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(grid_lines(-0.5, 0.5, 1.0).collect::<Vec<_>>(), vec![-1.0, 0.0, 1.0]);
        assert_eq!(grid_lines(0.0, 1e9, 1.0).count(), MAX_GRID_LINES + 1);
        assert_eq!(grid_lines(1e18, 1e18 + 1000.0, 16.0).count(), 0);
        assert_eq!(grid_lines(f64::NAN, 1.0, 1.0).count(), 0);
    }

    #[test]
    fn only_visible_cells_are_drawn() {
        let ds = small_dataset();
        let sel = HashSet::new();
        let f = render(&scene(&ds.cells, &[4, 0], &sel, PointColoring::Flat));
        let c = circles(&f);
        assert_eq!(c.len(), 2);
        let t = scene(&ds.cells, &[], &sel, PointColoring::Flat).transform;
        assert_eq!(*c[0].0, t.data_to_canvas(-3.0, 2.0));
    }

    #[test]
    fn points_far_off_canvas_are_culled() {
        let ds = small_dataset();
        let sel = HashSet::new();
        let mut s = scene(&ds.cells, &[0, 1, 2, 3, 4], &sel, PointColoring::Flat);
        s.transform.camera.pan = [2000.0, 0.0];
        let f = render(&s);
        assert_eq!(f.points_drawn, 0);
        assert_eq!(f.points_culled, 5);
    }

    #[test]
    fn selected_ring_is_drawn_under_fill() {
        let ds = small_dataset();
        let sel: HashSet<String> = ["c1".to_string()].into();
        let f = render(&scene(&ds.cells, &[0, 1], &sel, PointColoring::Flat));
        let pos = f
            .commands
            .iter()
            .position(|c| matches!(c, DrawCommand::Ring { .. }))
            .unwrap();
        match (&f.commands[pos], &f.commands[pos + 1]) {
            (DrawCommand::Ring { center: a, .. }, DrawCommand::Circle { center: b, .. }) => assert_eq!(a, b),
            other => panic!("unexpected order {other:?}"),
        }
    }

    #[test]
    fn expression_coloring_uses_palette_and_exports_legend() {
        let ds = small_dataset();
        let sel = HashSet::new();
        let values: ExpressionMap = [("c0".to_string(), 4.0)].into_iter().collect();
        let coloring = PointColoring::Expression {
            title: "CD3E",
            values: &values,
            bounds: ColorBounds::new(0.0, 4.0),
            scale: 1.0,
            palette: Palette::Viridis,
        };
        let f = render(&scene(&ds.cells, &[0, 1], &sel, coloring));
        let c = circles(&f);
        assert_eq!(c[0].1.rgb, Palette::Viridis.sample(1.0));
        assert_eq!(c[1].1.rgb, Palette::Viridis.sample(0.0));
        let legend = f.legend.unwrap();
        assert_eq!((legend.title.as_str(), legend.bounds), ("CD3E", ColorBounds::new(0.0, 4.0)));
    }

    #[test]
    fn empty_expression_map_renders_default_color() {
        let ds = small_dataset();
        let values = ExpressionMap::new();
        let coloring = PointColoring::Expression {
            title: "none",
            values: &values,
            bounds: ColorBounds::new(0.0, 0.0),
            scale: 1.0,
            palette: Palette::Magma,
        };
        assert_eq!(point_color(&ds.cells[0], &coloring, Rgb::new(1, 2, 3)), Rgb::new(1, 2, 3));
    }

    #[test]
    fn annotation_and_cluster_colors_fall_back_to_default() {
        let ds = small_dataset();
        let colors: BTreeMap<String, Rgb> = [("s1".to_string(), Rgb::new(9, 9, 9))].into();
        let ann = PointColoring::Annotation { key: "sample", colors: &colors };
        let grey = Rgb::new(100, 100, 100);
        assert_eq!(point_color(&ds.cells[0], &ann, grey), Rgb::new(9, 9, 9));
        assert_eq!(point_color(&ds.cells[2], &ann, grey), grey);
        let cl: HashMap<ClusterId, Rgb> = [(1, Rgb::new(0, 0, 255))].into();
        assert_eq!(point_color(&ds.cells[2], &PointColoring::Cluster(&cl), grey), Rgb::new(0, 0, 255));
        assert_eq!(point_color(&ds.cells[0], &PointColoring::Cluster(&cl), grey), grey);
    }

    #[test]
    fn single_digit_labels_keep_a_minimum_box() {
        let ds = small_dataset();
        let sel = HashSet::new();
        let labels = [(3, [0.0, 0.0]), (12345678, [1.0, 1.0])];
        let mut s = scene(&ds.cells, &[], &sel, PointColoring::Flat);
        s.labels = Some(&labels);
        let f = render(&s);
        let sizes: Vec<[f64; 2]> = f
            .commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Label { size, .. } => Some(*size),
                _ => None,
            })
            .collect();
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0][0], MIN_LABEL_BOX_WIDTH);
        assert!(sizes[1][0] > MIN_LABEL_BOX_WIDTH);
        assert!(sizes[0][1] > 0.0);
    }

    #[test]
    fn gesture_is_drawn_last() {
        let ds = small_dataset();
        let sel = HashSet::new();
        let g = Gesture::Rectangle { start: [10.0, 10.0], end: [50.0, 40.0] };
        let mut s = scene(&ds.cells, &[0], &sel, PointColoring::Flat);
        s.gesture = Some(&g);
        let f = render(&s);
        match f.commands.last() {
            Some(DrawCommand::Polygon { points, closed, fill, .. }) => {
                assert!(*closed);
                assert_eq!(points.len(), 4);
                assert!(fill.is_some_and(|c| c.a < 128));
            }
            other => panic!("expected overlay, got {other:?}"),
        }
    }

    #[test]
    fn lasso_overlay_is_outline_only() {
        let ds = small_dataset();
        let sel = HashSet::new();
        let g = Gesture::Lasso(vec![[0.0, 0.0], [100.0, 0.0], [20.0, 20.0], [0.0, 100.0]]);
        let mut s = scene(&ds.cells, &[0], &sel, PointColoring::Flat);
        s.gesture = Some(&g);
        let f = render(&s);
        match f.commands.last() {
            Some(DrawCommand::Polygon { closed, fill, .. }) => {
                assert!(*closed);
                assert_eq!(*fill, None);
            }
            other => panic!("expected overlay, got {other:?}"),
        }
    }

    #[test]
    fn grid_step_doubles_when_dense() {
        assert_eq!(grid_step(1.0, 10.0), Some(1.0));
        assert_eq!(grid_step(1.0, 1000.0), Some(16.0));
        assert_eq!(grid_step(0.0, 10.0), None);
    }
}
