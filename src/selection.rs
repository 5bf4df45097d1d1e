//! Spatial selection: lasso / rectangle gestures in canvas space, committed to
//! a set of cell ids, plus hover hit-testing.

use log::debug;
use std::collections::HashSet;

use crate::{camera::ViewTransform, data::Cell};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// Dragging pans the camera; hover hit-testing is active.
    #[default]
    None,
    Lasso,
    Rectangle,
}

/// An in-progress gesture, in canvas pixels.
#[derive(Clone, Debug, PartialEq)]
pub enum Gesture {
    Lasso(Vec<[f64; 2]>),
    Rectangle { start: [f64; 2], end: [f64; 2] },
}

impl Gesture {
    pub fn contains(&self, p: [f64; 2]) -> bool {
        match self {
            Gesture::Lasso(poly) => point_in_polygon(p, poly),
            Gesture::Rectangle { start, end } => point_in_rect(p, *start, *end),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SelectionEngine {
    mode: SelectionMode,
    gesture: Option<Gesture>,
    selected: HashSet<String>,
}

impl SelectionEngine {
    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// Switching mode discards any in-progress gesture and the committed selection.
    pub fn set_mode(&mut self, mode: SelectionMode) {
        if mode != self.mode {
            self.mode = mode;
            self.gesture = None;
            self.selected.clear();
        }
    }

    pub fn gesture(&self) -> Option<&Gesture> {
        self.gesture.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.gesture.is_some()
    }

    /// Start a gesture. Returns false in `None` mode, where drags pan instead.
    pub fn begin(&mut self, pos: [f64; 2]) -> bool {
        self.gesture = match self.mode {
            SelectionMode::None => return false,
            SelectionMode::Lasso => Some(Gesture::Lasso(vec![pos])),
            SelectionMode::Rectangle => Some(Gesture::Rectangle { start: pos, end: pos }),
        };
        true
    }

    pub fn extend(&mut self, pos: [f64; 2]) {
        match &mut self.gesture {
            Some(Gesture::Lasso(points)) => {
                if points.last() != Some(&pos) {
                    points.push(pos);
                }
            }
            Some(Gesture::Rectangle { end, .. }) => *end = pos,
            None => {}
        }
    }

    pub fn cancel(&mut self) {
        self.gesture = None;
    }

    /// End the gesture and replace the committed selection with the cells of
    /// `visible` (indices into `cells`) it contains. Returns the selected
    /// indices in `visible` order, or `None` if no gesture was in progress.
    pub fn finish(&mut self, cells: &[Cell], visible: &[usize], transform: &ViewTransform) -> Option<Vec<usize>> {
        let gesture = self.gesture.take()?;
        let hits: Vec<usize> = visible
            .iter()
            .copied()
            .filter(|&i| {
                let c = &cells[i];
                gesture.contains(transform.data_to_canvas(c.x, c.y))
            })
            .collect();
        self.selected = hits.iter().map(|&i| cells[i].id.clone()).collect();
        debug!("selection committed: {} cells", hits.len());
        Some(hits)
    }

    pub fn clear(&mut self) {
        self.gesture = None;
        self.selected.clear();
    }

    pub fn selected(&self) -> &HashSet<String> {
        &self.selected
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }
}

/// Inclusive axis-aligned containment for a rectangle given by any two corners.
pub fn point_in_rect(p: [f64; 2], a: [f64; 2], b: [f64; 2]) -> bool {
    p[0] >= a[0].min(b[0]) && p[0] <= a[0].max(b[0]) && p[1] >= a[1].min(b[1]) && p[1] <= a[1].max(b[1])
}

/// Even-odd ray casting. Fewer than three vertices contain nothing.
pub fn point_in_polygon(p: [f64; 2], poly: &[[f64; 2]]) -> bool {
    if poly.len() < 3 {
        return false;
    }
    let (x, y) = (p[0], p[1]);
    let mut inside = false;
    let mut j = poly.len() - 1;
    for i in 0..poly.len() {
        let (xi, yi) = (poly[i][0], poly[i][1]);
        let (xj, yj) = (poly[j][0], poly[j][1]);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Nearest visible cell to the cursor within `radius_px / scale` data units.
/// Ties go to the first cell in `visible` order.
pub fn hit_test(
    cells: &[Cell],
    visible: &[usize],
    transform: &ViewTransform,
    cursor: [f64; 2],
    radius_px: f64,
) -> Option<usize> {
    let d = transform.canvas_to_data(cursor[0], cursor[1]);
    let threshold = radius_px / transform.scale();
    let mut best: Option<(usize, f64)> = None;
    for &i in visible {
        let c = &cells[i];
        let dist = ((c.x - d[0]).powi(2) + (c.y - d[1]).powi(2)).sqrt();
        if dist < threshold && best.map_or(true, |(_, b)| dist < b) {
            best = Some((i, dist));
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        camera::{Camera, DataBounds, Viewport},
        data::tests::cell,
    };

    fn identity_transform(cells: &[Cell]) -> ViewTransform {
        let bounds = DataBounds::from_points(cells.iter().map(|c| [c.x, c.y]));
        ViewTransform::new(bounds, Viewport::default(), Camera::default())
    }

    #[test]
    fn rectangle_is_inclusive_and_corner_agnostic() {
        assert!(point_in_rect([1.0, 1.0], [1.0, 3.0], [4.0, 1.0]));
        assert!(point_in_rect([4.0, 3.0], [4.0, 3.0], [1.0, 1.0]));
        assert!(!point_in_rect([4.01, 2.0], [1.0, 1.0], [4.0, 3.0]));
    }

    #[test]
    fn ray_casting() {
        let square = [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];
        assert!(point_in_polygon([5.0, 5.0], &square));
        assert!(!point_in_polygon([15.0, 5.0], &square));
        // concave "C" shape
        let c = [[0.0, 0.0], [10.0, 0.0], [10.0, 3.0], [3.0, 3.0], [3.0, 7.0], [10.0, 7.0], [10.0, 10.0], [0.0, 10.0]];
        assert!(point_in_polygon([1.0, 5.0], &c));
        assert!(!point_in_polygon([6.0, 5.0], &c));
    }

    #[test]
    fn degenerate_lasso_selects_nothing() {
        assert!(!point_in_polygon([0.0, 0.0], &[]));
        assert!(!point_in_polygon([0.5, 0.0], &[[0.0, 0.0], [1.0, 0.0]]));
        let cells = vec![cell("a", 0.0, 0.0, 0, "s"), cell("b", 1.0, 1.0, 0, "s")];
        let t = identity_transform(&cells);
        let mut sel = SelectionEngine::default();
        sel.set_mode(SelectionMode::Lasso);
        assert!(sel.begin([0.0, 0.0]));
        sel.extend([800.0, 600.0]);
        assert_eq!(sel.finish(&cells, &[0, 1], &t), Some(vec![]));
        assert!(sel.selected().is_empty());
    }

    #[test]
    fn lasso_commit_keeps_visible_order() {
        let cells = vec![
            cell("a", 0.0, 0.0, 0, "s"),
            cell("b", 5.0, 5.0, 0, "s"),
            cell("c", 10.0, 10.0, 0, "s"),
        ];
        let t = identity_transform(&cells);
        let mut sel = SelectionEngine::default();
        sel.set_mode(SelectionMode::Lasso);
        sel.begin([0.0, 0.0]);
        sel.extend([800.0, 0.0]);
        sel.extend([800.0, 600.0]);
        sel.extend([0.0, 600.0]);
        // only a and c are visible, visited c first
        assert_eq!(sel.finish(&cells, &[2, 0], &t), Some(vec![2, 0]));
        assert!(sel.is_selected("a") && sel.is_selected("c") && !sel.is_selected("b"));
    }

    #[test]
    fn mode_switch_discards_gesture_and_selection() {
        let cells = vec![cell("a", 0.0, 0.0, 0, "s")];
        let t = identity_transform(&cells);
        let mut sel = SelectionEngine::default();
        assert!(!sel.begin([1.0, 1.0]));
        sel.set_mode(SelectionMode::Rectangle);
        sel.begin([0.0, 0.0]);
        sel.extend([800.0, 600.0]);
        sel.finish(&cells, &[0], &t);
        assert_eq!(sel.selected().len(), 1);
        sel.begin([0.0, 0.0]);
        sel.set_mode(SelectionMode::Lasso);
        assert!(sel.gesture().is_none());
        assert!(sel.selected().is_empty());
        assert_eq!(sel.finish(&cells, &[0], &t), None);
    }

    #[test]
    fn hover_picks_nearest_within_radius() {
        let cells = vec![
            cell("a", 0.0, 0.0, 0, "s"),
            cell("b", 0.5, 0.0, 0, "s"),
            cell("c", 100.0, 100.0, 0, "s"),
        ];
        let t = identity_transform(&cells);
        let near_b = t.data_to_canvas(0.45, 0.0);
        assert_eq!(hit_test(&cells, &[0, 1, 2], &t, near_b, 2.0), Some(1));
        // b filtered out: a is 0.45 away, inside the 2.0 radius
        assert_eq!(hit_test(&cells, &[0, 2], &t, near_b, 2.0), Some(0));
        let far = t.data_to_canvas(50.0, 50.0);
        assert_eq!(hit_test(&cells, &[0, 1, 2], &t, far, 2.0), None);
    }

    #[test]
    fn hover_radius_shrinks_with_zoom() {
        let cells = vec![cell("a", 0.0, 0.0, 0, "s"), cell("z", 100.0, 100.0, 0, "s")];
        let bounds = DataBounds::from_points(cells.iter().map(|c| [c.x, c.y]));
        let mut cam = Camera::default();
        cam.set_scale(4.0);
        let t = ViewTransform::new(bounds, Viewport::default(), cam);
        let p = t.data_to_canvas(1.0, 0.0);
        // threshold is 2 / 4 = 0.5 data units
        assert_eq!(hit_test(&cells, &[0, 1], &t, p, 2.0), None);
        let p = t.data_to_canvas(0.4, 0.0);
        assert_eq!(hit_test(&cells, &[0, 1], &t, p, 2.0), Some(0));
    }

    #[test]
    fn hover_ties_go_to_first_visible() {
        let cells = vec![cell("a", -1.0, 0.0, 0, "s"), cell("b", 1.0, 0.0, 0, "s")];
        let t = identity_transform(&cells);
        let mid = t.data_to_canvas(0.0, 0.0);
        assert_eq!(hit_test(&cells, &[1, 0], &t, mid, 2.0), Some(1));
    }
}
