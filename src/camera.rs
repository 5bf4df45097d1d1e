/// Lower zoom clamp.
pub const MIN_SCALE: f64 = 0.5;
/// Upper zoom clamp.
pub const MAX_SCALE: f64 = 10.0;
/// Scale multiplier per wheel notch.
pub const ZOOM_STEP: f64 = 1.1;
/// Fraction of each axis range added on both sides of the data extent.
pub const BOUNDS_PADDING_FRAC: f64 = 0.1;

/// Padded data-space extent of all cells. Computed once per dataset from the
/// unfiltered cells so that filtering never rescales the view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DataBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Default for DataBounds {
    fn default() -> Self {
        Self {
            min_x: -10.0,
            max_x: 10.0,
            min_y: -10.0,
            max_y: 10.0,
        }
    }
}

impl DataBounds {
    /// Extent of `points` padded by 10% of each axis range. An axis with zero
    /// range is padded by one unit; no points gives the default square.
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = [f64; 2]>,
    {
        let mut min = [f64::INFINITY; 2];
        let mut max = [f64::NEG_INFINITY; 2];
        for p in points {
            if !p[0].is_finite() || !p[1].is_finite() {
                continue;
            }
            for k in 0..2 {
                min[k] = min[k].min(p[k]);
                max[k] = max[k].max(p[k]);
            }
        }
        if !min[0].is_finite() {
            return Self::default();
        }
        let pad = |lo: f64, hi: f64| {
            let range = hi - lo;
            if range > 0.0 {
                range * BOUNDS_PADDING_FRAC
            } else {
                1.0
            }
        };
        let px = pad(min[0], max[0]);
        let py = pad(min[1], max[1]);
        Self {
            min_x: min[0] - px,
            max_x: max[0] + px,
            min_y: min[1] - py,
            max_y: max[1] + py,
        }
    }

    fn span_x(&self) -> f64 {
        (self.max_x - self.min_x).max(1e-12)
    }

    fn span_y(&self) -> f64 {
        (self.max_y - self.min_y).max(1e-12)
    }
}

/// Canvas size in pixels and the inset the data bounds are fitted into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub padding: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            padding: 50.0,
        }
    }
}

impl Viewport {
    pub fn center(&self) -> [f64; 2] {
        [0.5 * self.width, 0.5 * self.height]
    }

    fn inner(&self) -> [f64; 2] {
        [
            (self.width - 2.0 * self.padding).max(1.0),
            (self.height - 2.0 * self.padding).max(1.0),
        ]
    }
}

/// Pan offset and zoom about the canvas center.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub pan: [f64; 2],
    /// Always within `[min_scale, max_scale]`.
    scale: f64,
    min_scale: f64,
    max_scale: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self::with_limits(MIN_SCALE, MAX_SCALE)
    }
}

impl Camera {
    pub fn with_limits(min_scale: f64, max_scale: f64) -> Self {
        let (min_scale, max_scale) = if min_scale > 0.0 && min_scale <= max_scale {
            (min_scale, max_scale)
        } else {
            (MIN_SCALE, MAX_SCALE)
        };
        Self {
            pan: [0.0, 0.0],
            scale: 1.0_f64.clamp(min_scale, max_scale),
            min_scale,
            max_scale,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f64) {
        if scale.is_finite() {
            self.scale = scale.clamp(self.min_scale, self.max_scale);
        }
    }

    pub fn reset(&mut self) {
        self.pan = [0.0, 0.0];
        self.scale = 1.0_f64.clamp(self.min_scale, self.max_scale);
    }

    /// Zoom about the canvas center.
    pub fn zoom_by(&mut self, factor: f64) {
        self.set_scale(self.scale * factor);
    }

    /// Zoom keeping the point under `anchor_px` fixed on screen.
    pub fn zoom_at(&mut self, anchor_px: [f64; 2], viewport: &Viewport, factor: f64) {
        let old = self.scale;
        self.set_scale(old * factor);
        let new = self.scale;
        if new == old {
            return;
        }
        let c = viewport.center();
        for k in 0..2 {
            // untransformed position currently under the anchor
            let u = (anchor_px[k] - c[k] - self.pan[k]) / old + c[k];
            self.pan[k] = anchor_px[k] - c[k] - (u - c[k]) * new;
        }
    }

    /// One wheel notch: positive `notches` zoom in.
    pub fn wheel(&mut self, anchor_px: [f64; 2], viewport: &Viewport, notches: f64, step: f64) {
        self.zoom_at(anchor_px, viewport, step.powf(notches));
    }
}

/// Drag-to-pan gesture. Pan is recomputed from the drag origin on every move.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PanDrag {
    start_cursor: [f64; 2],
    start_pan: [f64; 2],
}

impl PanDrag {
    pub fn begin(camera: &Camera, cursor: [f64; 2]) -> Self {
        Self {
            start_cursor: cursor,
            start_pan: camera.pan,
        }
    }

    pub fn update(&self, camera: &mut Camera, cursor: [f64; 2]) {
        camera.pan = [
            self.start_pan[0] + (cursor[0] - self.start_cursor[0]),
            self.start_pan[1] + (cursor[1] - self.start_cursor[1]),
        ];
    }
}

/// Data <-> canvas mapping for one frame.
///
/// `canvas = (untransformed - center) * scale + center + pan`, where
/// `untransformed` fits the data bounds into the padded viewport with y up.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    pub bounds: DataBounds,
    pub viewport: Viewport,
    pub camera: Camera,
}

impl ViewTransform {
    pub fn new(bounds: DataBounds, viewport: Viewport, camera: Camera) -> Self {
        Self {
            bounds,
            viewport,
            camera,
        }
    }

    pub fn scale(&self) -> f64 {
        self.camera.scale()
    }

    pub fn data_to_canvas(&self, x: f64, y: f64) -> [f64; 2] {
        let b = &self.bounds;
        let vp = &self.viewport;
        let inner = vp.inner();
        let ux = vp.padding + (x - b.min_x) / b.span_x() * inner[0];
        let uy = vp.height - vp.padding - (y - b.min_y) / b.span_y() * inner[1];
        let c = vp.center();
        let s = self.camera.scale();
        [
            (ux - c[0]) * s + c[0] + self.camera.pan[0],
            (uy - c[1]) * s + c[1] + self.camera.pan[1],
        ]
    }

    pub fn canvas_to_data(&self, cx: f64, cy: f64) -> [f64; 2] {
        let b = &self.bounds;
        let vp = &self.viewport;
        let inner = vp.inner();
        let c = vp.center();
        let s = self.camera.scale();
        let ux = (cx - c[0] - self.camera.pan[0]) / s + c[0];
        let uy = (cy - c[1] - self.camera.pan[1]) / s + c[1];
        [
            b.min_x + (ux - vp.padding) / inner[0] * b.span_x(),
            b.min_y + (vp.height - vp.padding - uy) / inner[1] * b.span_y(),
        ]
    }

    /// Whether a canvas point lies within the viewport grown by `margin` px.
    pub fn in_view(&self, p: [f64; 2], margin: f64) -> bool {
        p[0] >= -margin
            && p[0] <= self.viewport.width + margin
            && p[1] >= -margin
            && p[1] <= self.viewport.height + margin
    }

    /// Data-space rectangle currently visible: `(min, max)` corners.
    pub fn visible_data_rect(&self) -> ([f64; 2], [f64; 2]) {
        let a = self.canvas_to_data(0.0, 0.0);
        let b = self.canvas_to_data(self.viewport.width, self.viewport.height);
        ([a[0].min(b[0]), a[1].min(b[1])], [a[0].max(b[0]), a[1].max(b[1])])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f64; 2], b: [f64; 2], tol: f64) -> bool {
        (a[0] - b[0]).abs() < tol && (a[1] - b[1]).abs() < tol
    }

    #[test]
    fn bounds_are_padded_by_ten_percent() {
        let b = DataBounds::from_points(vec![[0.0, -5.0], [10.0, 5.0]]);
        assert!((b.min_x + 1.0).abs() < 1e-12);
        assert!((b.max_x - 11.0).abs() < 1e-12);
        assert!((b.min_y + 6.0).abs() < 1e-12);
        assert!((b.max_y - 6.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_bounds() {
        assert_eq!(DataBounds::from_points(Vec::new()), DataBounds::default());
        let b = DataBounds::from_points(vec![[3.0, 3.0]]);
        assert_eq!((b.min_x, b.max_x, b.min_y, b.max_y), (2.0, 4.0, 2.0, 4.0));
    }

    #[test]
    fn round_trip_for_many_camera_states() {
        let bounds = DataBounds::from_points(vec![[-12.5, -8.0], [17.0, 21.5]]);
        let viewport = Viewport {
            width: 913.0,
            height: 577.0,
            padding: 50.0,
        };
        for &scale in &[0.5, 0.73, 1.0, 2.4, 10.0] {
            for &pan in &[[0.0, 0.0], [-340.5, 12.25], [1e4, -7e3]] {
                let mut camera = Camera::default();
                camera.set_scale(scale);
                camera.pan = pan;
                let t = ViewTransform::new(bounds, viewport, camera);
                for &p in &[[0.0, 0.0], [-12.5, 21.5], [3.3, -7.9], [1e3, -1e3]] {
                    let c = t.data_to_canvas(p[0], p[1]);
                    let back = t.canvas_to_data(c[0], c[1]);
                    assert!(close(back, p, 1e-6), "{p:?} -> {c:?} -> {back:?}");
                }
            }
        }
    }

    #[test]
    fn bounds_fill_the_padded_inset_with_y_up() {
        let bounds = DataBounds {
            min_x: 0.0,
            max_x: 10.0,
            min_y: 0.0,
            max_y: 10.0,
        };
        let t = ViewTransform::new(bounds, Viewport::default(), Camera::default());
        assert!(close(t.data_to_canvas(0.0, 0.0), [50.0, 550.0], 1e-9));
        assert!(close(t.data_to_canvas(10.0, 10.0), [750.0, 50.0], 1e-9));
    }

    #[test]
    fn zoom_clamps() {
        let mut cam = Camera::default();
        for _ in 0..100 {
            cam.zoom_by(ZOOM_STEP);
        }
        assert_eq!(cam.scale(), MAX_SCALE);
        for _ in 0..100 {
            cam.zoom_by(1.0 / ZOOM_STEP);
        }
        assert_eq!(cam.scale(), MIN_SCALE);
        cam.reset();
        assert_eq!((cam.pan, cam.scale()), ([0.0, 0.0], 1.0));
    }

    #[test]
    fn zoom_at_keeps_anchor_fixed() {
        let bounds = DataBounds::from_points(vec![[0.0, 0.0], [100.0, 50.0]]);
        let vp = Viewport::default();
        let mut cam = Camera::default();
        let anchor = [612.0, 143.0];
        let before = ViewTransform::new(bounds, vp, cam).canvas_to_data(anchor[0], anchor[1]);
        cam.wheel(anchor, &vp, 3.0, ZOOM_STEP);
        let after = ViewTransform::new(bounds, vp, cam).canvas_to_data(anchor[0], anchor[1]);
        assert!((cam.scale() - 1.1f64.powi(3)).abs() < 1e-12);
        assert!(close(before, after, 1e-9));
    }

    #[test]
    fn pan_uses_drag_origin() {
        let mut cam = Camera::default();
        cam.pan = [5.0, 5.0];
        let drag = PanDrag::begin(&cam, [100.0, 100.0]);
        drag.update(&mut cam, [110.0, 90.0]);
        drag.update(&mut cam, [120.0, 80.0]);
        assert_eq!(cam.pan, [25.0, -15.0]);
    }
}
