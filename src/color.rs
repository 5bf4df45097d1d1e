use colorous::Color;
use std::collections::BTreeMap;

/// An opaque 8-bit RGB color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn lerp(self, other: Rgb, t: f64) -> Rgb {
        let mix = |a: u8, b: u8| -> u8 {
            let v = a as f64 + (b as f64 - a as f64) * t;
            v.round().clamp(0.0, 255.0) as u8
        };
        Rgb::new(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }

    pub fn with_alpha(self, alpha: f32) -> Rgba {
        Rgba {
            rgb: self,
            a: (alpha.clamp(0.0, 1.0) * 255.0).round() as u8,
        }
    }

    pub fn to_css(self) -> String {
        format!("rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

impl From<Color> for Rgb {
    fn from(c: Color) -> Self {
        Rgb::new(c.r, c.g, c.b)
    }
}

/// Color plus straight (non-premultiplied) alpha.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub rgb: Rgb,
    pub a: u8,
}

const TAB20: [Color; 20] = [
    Color { r: 31, g: 119, b: 180 },
    Color { r: 174, g: 199, b: 232 },
    Color { r: 255, g: 127, b: 14 },
    Color { r: 255, g: 187, b: 120 },
    Color { r: 44, g: 160, b: 44 },
    Color { r: 152, g: 223, b: 138 },
    Color { r: 214, g: 39, b: 40 },
    Color { r: 255, g: 152, b: 150 },
    Color { r: 148, g: 103, b: 189 },
    Color { r: 197, g: 176, b: 213 },
    Color { r: 140, g: 86, b: 75 },
    Color { r: 196, g: 156, b: 148 },
    Color { r: 227, g: 119, b: 194 },
    Color { r: 247, g: 182, b: 210 },
    Color { r: 127, g: 127, b: 127 },
    Color { r: 199, g: 199, b: 199 },
    Color { r: 188, g: 189, b: 34 },
    Color { r: 219, g: 219, b: 141 },
    Color { r: 23, g: 190, b: 207 },
    Color { r: 158, g: 218, b: 229 },
];

fn palette_from_colors(colors: &[Color], n: usize) -> Vec<Rgb> {
    if colors.is_empty() {
        return Vec::new();
    }
    (0..n).map(|i| colors[i % colors.len()].into()).collect()
}

/// `n` distinct-ish colors for categorical data; Tableau10 up to 10 categories,
/// Tab20 up to 20, evenly sampled Turbo beyond that.
pub fn categorical_palette(n: usize) -> Vec<Rgb> {
    if n <= colorous::TABLEAU10.len() {
        return palette_from_colors(&colorous::TABLEAU10, n);
    }
    if n <= TAB20.len() {
        return palette_from_colors(&TAB20, n);
    }
    (0..n)
        .map(|i| {
            let t = i as f64 / (n as f64 - 1.0);
            colorous::TURBO.eval_continuous(t).into()
        })
        .collect()
}

/// Default CSS color for the `index`-th of `n` clusters.
pub fn default_cluster_color(index: usize, n: usize) -> String {
    let pal = categorical_palette(n.max(index + 1));
    pal[index].to_css()
}

/// Maps each distinct value (already sorted) to a categorical color.
pub fn annotation_colors<I>(values: I) -> BTreeMap<String, Rgb>
where
    I: IntoIterator<Item = String>,
{
    let values: Vec<String> = values.into_iter().collect();
    let pal = categorical_palette(values.len());
    values.into_iter().zip(pal).collect()
}

/// Parse the CSS color forms used by exported datasets:
/// `#rgb`, `#rrggbb`, `rgb(r, g, b)`, `rgba(r, g, b, a)`, `hsl(h, s%, l%)`, `hsla(..)`.
pub fn parse_css_color(s: &str) -> Option<Rgb> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }
    let lower = s.to_ascii_lowercase();
    let (func, rest) = lower.split_once('(')?;
    let body = rest.strip_suffix(')')?;
    let parts: Vec<&str> = body
        .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    match func.trim() {
        "rgb" | "rgba" if parts.len() >= 3 => {
            let r = parse_channel(parts[0])?;
            let g = parse_channel(parts[1])?;
            let b = parse_channel(parts[2])?;
            Some(Rgb::new(r, g, b))
        }
        "hsl" | "hsla" if parts.len() >= 3 => {
            let h: f64 = parts[0].trim_end_matches("deg").parse().ok()?;
            let sat = parse_percent(parts[1])?;
            let light = parse_percent(parts[2])?;
            Some(hsl_to_rgb(h, sat, light))
        }
        _ => None,
    }
}

fn parse_hex(hex: &str) -> Option<Rgb> {
    let digit = |i: usize, len: usize| u8::from_str_radix(hex.get(i..i + len)?, 16).ok();
    match hex.len() {
        6 => Some(Rgb::new(digit(0, 2)?, digit(2, 2)?, digit(4, 2)?)),
        3 => {
            let (r, g, b) = (digit(0, 1)?, digit(1, 1)?, digit(2, 1)?);
            Some(Rgb::new(r * 17, g * 17, b * 17))
        }
        _ => None,
    }
}

fn parse_channel(p: &str) -> Option<u8> {
    if let Some(pct) = p.strip_suffix('%') {
        let v: f64 = pct.parse().ok()?;
        return Some((v / 100.0 * 255.0).round().clamp(0.0, 255.0) as u8);
    }
    let v: f64 = p.parse().ok()?;
    Some(v.round().clamp(0.0, 255.0) as u8)
}

fn parse_percent(p: &str) -> Option<f64> {
    let v: f64 = p.trim_end_matches('%').parse().ok()?;
    Some((v / 100.0).clamp(0.0, 1.0))
}

/// `h` in degrees, `s` and `l` in [0, 1].
pub fn hsl_to_rgb(h: f64, s: f64, l: f64) -> Rgb {
    let h = h.rem_euclid(360.0);
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = l - c / 2.0;
    let (r, g, b) = match h {
        h if h < 60.0 => (c, x, 0.0),
        h if h < 120.0 => (x, c, 0.0),
        h if h < 180.0 => (0.0, c, x),
        h if h < 240.0 => (0.0, x, c),
        h if h < 300.0 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let to_u8 = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgb::new(to_u8(r), to_u8(g), to_u8(b))
}
