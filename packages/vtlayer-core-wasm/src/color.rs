use serde::{Deserialize, Serialize};

/// RGBA color with 0..=255 channels. Serializes as `[r, g, b, a]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ColorRepr", into = "[u8; 4]")]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    /// Parse `#RRGGBB` or `#RRGGBBAA` (leading `#` optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            6 => Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Some(Self::new(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }

    /// Channel-wise linear interpolation, `t` clamped to [0, 1].
    pub fn lerp(self, other: Rgba, t: f64) -> Rgba {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Rgba::new(
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
            mix(self.a, other.a),
        )
    }
}

impl From<Rgba> for [u8; 4] {
    fn from(c: Rgba) -> Self {
        [c.r, c.g, c.b, c.a]
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColorRepr {
    Hex(String),
    Rgb([u8; 3]),
    Rgba([u8; 4]),
}

impl TryFrom<ColorRepr> for Rgba {
    type Error = String;

    fn try_from(repr: ColorRepr) -> Result<Self, Self::Error> {
        match repr {
            ColorRepr::Hex(hex) => {
                Rgba::from_hex(&hex).ok_or_else(|| format!("invalid hex color '{}'", hex))
            }
            ColorRepr::Rgb([r, g, b]) => Ok(Rgba::rgb(r, g, b)),
            ColorRepr::Rgba([r, g, b, a]) => Ok(Rgba::new(r, g, b, a)),
        }
    }
}

pub const DEFAULT_COLOR_RANGE: [Rgba; 5] = [
    Rgba::rgb(0x12, 0x93, 0x9A),
    Rgba::rgb(0xDD, 0xB2, 0x7C),
    Rgba::rgb(0x88, 0x57, 0x2C),
    Rgba::rgb(0xFF, 0x99, 0x1F),
    Rgba::rgb(0xF1, 0x5C, 0x17),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex() {
        assert_eq!(Rgba::from_hex("#12939A"), Some(DEFAULT_COLOR_RANGE[0]));
        assert_eq!(Rgba::from_hex("f15c17"), Some(DEFAULT_COLOR_RANGE[4]));
        assert_eq!(Rgba::from_hex("#00000080"), Some(Rgba::new(0, 0, 0, 128)));
        assert_eq!(Rgba::from_hex("#123"), None);
        assert_eq!(Rgba::from_hex("#zzzzzz"), None);
    }

    #[test]
    fn lerp_endpoints_and_midpoint() {
        let black = Rgba::rgb(0, 0, 0);
        let white = Rgba::rgb(255, 255, 255);
        assert_eq!(black.lerp(white, 0.0), black);
        assert_eq!(black.lerp(white, 1.0), white);
        assert_eq!(black.lerp(white, 0.5), Rgba::rgb(128, 128, 128));
        assert_eq!(black.lerp(white, 7.0), white);
    }

    #[test]
    fn serde_accepts_hex_and_arrays() {
        let colors: Vec<Rgba> =
            serde_json::from_str(r##"["#DDB27C", [1, 2, 3], [1, 2, 3, 4]]"##).unwrap();
        assert_eq!(colors[0], DEFAULT_COLOR_RANGE[1]);
        assert_eq!(colors[1], Rgba::rgb(1, 2, 3));
        assert_eq!(colors[2], Rgba::new(1, 2, 3, 4));

        let json = serde_json::to_string(&Rgba::new(1, 2, 3, 4)).unwrap();
        assert_eq!(json, "[1,2,3,4]");
    }
}
