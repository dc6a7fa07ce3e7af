// Color conversions for the bridge's color model
//
// Lights take CIE xy chromaticity (clamped to gamut C) and color
// temperature in mirek (1,000,000 / kelvin, 153..=500).

use crate::state::XyColor;

pub const MIREK_MIN: u16 = 153;
pub const MIREK_MAX: u16 = 500;

/// xy of the D65 white point, used for black.
const WHITE_POINT: XyColor = XyColor {
    x: 0.3127,
    y: 0.3290,
};

/// Gamut C triangle (red, green, blue)
const GAMUT_C: [XyColor; 3] = [
    XyColor { x: 0.6915, y: 0.3083 },
    XyColor { x: 0.17, y: 0.7 },
    XyColor { x: 0.1532, y: 0.0475 },
];

fn gamma(channel: u8) -> f64 {
    let c = channel as f64 / 255.0;
    if c > 0.04045 {
        ((c + 0.055) / 1.055).powf(2.4)
    } else {
        c / 12.92
    }
}

/// sRGB → xy, clamped into gamut C.
pub fn rgb_to_xy(r: u8, g: u8, b: u8) -> XyColor {
    let (r, g, b) = (gamma(r), gamma(g), gamma(b));

    // Wide RGB D65
    let x = r * 0.664511 + g * 0.154324 + b * 0.162028;
    let y = r * 0.283881 + g * 0.668433 + b * 0.047685;
    let z = r * 0.000088 + g * 0.072310 + b * 0.986039;

    let sum = x + y + z;
    if sum <= f64::EPSILON {
        return WHITE_POINT;
    }

    let point = XyColor {
        x: x / sum,
        y: y / sum,
    };
    let clamped = clamp_to_gamut(point);
    XyColor {
        x: round4(clamped.x),
        y: round4(clamped.y),
    }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn cross(o: XyColor, a: XyColor, b: XyColor) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn in_gamut(p: XyColor) -> bool {
    let [r, g, b] = GAMUT_C;
    let d1 = cross(r, g, p);
    let d2 = cross(g, b, p);
    let d3 = cross(b, r, p);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

fn closest_on_segment(a: XyColor, b: XyColor, p: XyColor) -> XyColor {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    let t = if len2 <= f64::EPSILON {
        0.0
    } else {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0)
    };
    XyColor {
        x: a.x + t * dx,
        y: a.y + t * dy,
    }
}

/// Move a point outside the gamut triangle to the nearest point on its edge.
pub fn clamp_to_gamut(p: XyColor) -> XyColor {
    if in_gamut(p) {
        return p;
    }
    let [r, g, b] = GAMUT_C;
    [(r, g), (g, b), (b, r)]
        .into_iter()
        .map(|(a, b)| closest_on_segment(a, b, p))
        .min_by(|a, b| {
            let da = (a.x - p.x).powi(2) + (a.y - p.y).powi(2);
            let db = (b.x - p.x).powi(2) + (b.y - p.y).powi(2);
            da.total_cmp(&db)
        })
        .unwrap_or(WHITE_POINT)
}

/// Parse `#RGB`, `#RRGGBB` or `RRGGBB`.
pub fn hex_to_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.trim().trim_start_matches('#');
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match digits.len() {
        6 => Some((
            u8::from_str_radix(&digits[0..2], 16).ok()?,
            u8::from_str_radix(&digits[2..4], 16).ok()?,
            u8::from_str_radix(&digits[4..6], 16).ok()?,
        )),
        3 => {
            let expand = |i: usize| u8::from_str_radix(&digits[i..i + 1], 16).ok().map(|v| v * 17);
            Some((expand(0)?, expand(1)?, expand(2)?))
        }
        _ => None,
    }
}

/// Kelvin → mirek, clamped to the supported range.
pub fn kelvin_to_mirek(kelvin: u32) -> u16 {
    if kelvin == 0 {
        return MIREK_MAX;
    }
    let mirek = (1_000_000.0 / kelvin as f64).round();
    mirek.clamp(MIREK_MIN as f64, MIREK_MAX as f64) as u16
}

pub fn mirek_to_kelvin(mirek: u16) -> u32 {
    if mirek == 0 {
        return 0;
    }
    (1_000_000.0 / mirek as f64).round() as u32
}
