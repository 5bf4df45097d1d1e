//! Expression-to-color mapping: palette stop tables, contrast curve and
//! normalization bounds.
//!
//! The stop tables are fixed reference data. Exports made with earlier
//! versions must keep rendering identically, so they are spelled out here
//! rather than sampled from a colormap library.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::color::Rgb;

/// (position, r, g, b)
type Stop = (f64, u8, u8, u8);

const VIRIDIS: [Stop; 11] = [
    (0.0, 68, 1, 84),
    (0.1, 72, 36, 117),
    (0.2, 65, 68, 135),
    (0.3, 53, 95, 141),
    (0.4, 42, 120, 142),
    (0.5, 33, 145, 140),
    (0.6, 34, 168, 132),
    (0.7, 68, 191, 112),
    (0.8, 122, 209, 81),
    (0.9, 189, 223, 38),
    (1.0, 253, 231, 37),
];

const MAGMA: [Stop; 11] = [
    (0.0, 0, 0, 4),
    (0.1, 20, 14, 54),
    (0.2, 59, 15, 112),
    (0.3, 100, 26, 128),
    (0.4, 140, 41, 129),
    (0.5, 183, 55, 121),
    (0.6, 222, 73, 104),
    (0.7, 247, 112, 92),
    (0.8, 254, 159, 109),
    (0.9, 254, 207, 146),
    (1.0, 252, 253, 191),
];

const PLASMA: [Stop; 11] = [
    (0.0, 13, 8, 135),
    (0.1, 65, 4, 157),
    (0.2, 106, 0, 168),
    (0.3, 143, 13, 164),
    (0.4, 177, 42, 144),
    (0.5, 204, 71, 120),
    (0.6, 225, 100, 98),
    (0.7, 242, 132, 75),
    (0.8, 252, 166, 54),
    (0.9, 252, 206, 37),
    (1.0, 240, 249, 33),
];

const INFERNO: [Stop; 11] = [
    (0.0, 0, 0, 4),
    (0.1, 22, 11, 57),
    (0.2, 66, 10, 104),
    (0.3, 106, 23, 110),
    (0.4, 147, 38, 103),
    (0.5, 188, 55, 84),
    (0.6, 221, 81, 58),
    (0.7, 243, 120, 25),
    (0.8, 252, 165, 10),
    (0.9, 246, 215, 70),
    (1.0, 252, 255, 164),
];

/// Light gray through to saturated red.
const GRRD: [Stop; 5] = [
    (0.0, 220, 220, 220),
    (0.25, 235, 190, 180),
    (0.5, 240, 140, 120),
    (0.75, 220, 70, 50),
    (1.0, 180, 0, 0),
];

const BLUES: [Stop; 9] = [
    (0.0, 247, 251, 255),
    (0.125, 222, 235, 247),
    (0.25, 198, 219, 239),
    (0.375, 158, 202, 225),
    (0.5, 107, 174, 214),
    (0.625, 66, 146, 198),
    (0.75, 33, 113, 181),
    (0.875, 8, 81, 156),
    (1.0, 8, 48, 107),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Palette {
    #[default]
    Viridis,
    Magma,
    Plasma,
    Inferno,
    Grrd,
    Blues,
}

impl Palette {
    pub const ALL: [Palette; 6] = [
        Palette::Viridis,
        Palette::Magma,
        Palette::Plasma,
        Palette::Inferno,
        Palette::Grrd,
        Palette::Blues,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Palette::Viridis => "viridis",
            Palette::Magma => "magma",
            Palette::Plasma => "plasma",
            Palette::Inferno => "inferno",
            Palette::Grrd => "grrd",
            Palette::Blues => "blues",
        }
    }

    fn stops(self) -> &'static [Stop] {
        match self {
            Palette::Viridis => &VIRIDIS,
            Palette::Magma => &MAGMA,
            Palette::Plasma => &PLASMA,
            Palette::Inferno => &INFERNO,
            Palette::Grrd => &GRRD,
            Palette::Blues => &BLUES,
        }
    }

    /// Interpolated color at `t`; positions outside the table clamp to the end stops.
    pub fn sample(self, t: f64) -> Rgb {
        let stops = self.stops();
        let first = stops[0];
        let last = stops[stops.len() - 1];
        if !(t > first.0) {
            return Rgb::new(first.1, first.2, first.3);
        }
        if t >= last.0 {
            return Rgb::new(last.1, last.2, last.3);
        }
        for w in stops.windows(2) {
            let (p0, r0, g0, b0) = w[0];
            let (p1, r1, g1, b1) = w[1];
            if t <= p1 {
                let f = (t - p0) / (p1 - p0);
                return Rgb::new(r0, g0, b0).lerp(Rgb::new(r1, g1, b1), f);
            }
        }
        Rgb::new(last.1, last.2, last.3)
    }
}

impl fmt::Display for Palette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Palette {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Palette::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown palette `{s}`"))
    }
}

/// Normalization bounds for a color scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorBounds {
    pub min: f64,
    pub max: f64,
}

impl ColorBounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Value -> color: normalize, clamp, apply `t^(1/scale)`, look up in the palette.
pub fn map_color(value: f64, bounds: ColorBounds, scale: f64, palette: Palette) -> Rgb {
    let t = normalize(value, bounds);
    palette.sample(contrast(t, scale))
}

/// `(value - min) / (max - min)` clamped to [0, 1]; 0.5 when the range is empty.
pub fn normalize(value: f64, bounds: ColorBounds) -> f64 {
    let span = bounds.max - bounds.min;
    if span == 0.0 || !span.is_finite() {
        return 0.5;
    }
    let t = (value - bounds.min) / span;
    if t.is_nan() {
        return 0.0;
    }
    t.clamp(0.0, 1.0)
}

/// Power-law contrast curve. Scale > 1 pushes low values toward 0.
pub fn contrast(t: f64, scale: f64) -> f64 {
    if !(scale > 0.0) || !scale.is_finite() {
        return t;
    }
    t.powf(1.0 / scale)
}

/// Percentile clipping is only applied above this many values.
pub const MIN_VALUES_FOR_PERCENTILE: usize = 10;

/// Color-scale bounds over `values`.
///
/// With clipping enabled and more than ten values, the bounds are the sorted
/// values at `floor(n * low / 100)` and `ceil(n * high / 100) - 1`. Otherwise the
/// true min/max. No values yields `(0, 0)`.
pub fn compute_bounds<I>(values: I, percentile: Option<(f64, f64)>) -> ColorBounds
where
    I: IntoIterator<Item = f64>,
{
    let mut v: Vec<f64> = values.into_iter().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return ColorBounds::new(0.0, 0.0);
    }
    match percentile {
        Some((low, high)) if v.len() > MIN_VALUES_FOR_PERCENTILE => {
            v.sort_by(|a, b| a.total_cmp(b));
            let n = v.len();
            let last = n - 1;
            let lo_idx = ((n as f64 * low / 100.0).floor().max(0.0) as usize).min(last);
            let hi_idx = ((n as f64 * high / 100.0).ceil() as usize)
                .saturating_sub(1)
                .clamp(lo_idx, last);
            ColorBounds::new(v[lo_idx], v[hi_idx])
        }
        _ => {
            let (min, max) = v
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
            ColorBounds::new(min, max)
        }
    }
}
