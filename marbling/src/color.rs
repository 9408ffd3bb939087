use crate::rng;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Mul;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseColorError {
    #[error("Expected a color of the form #RRGGBB, got {0:?}")]
    InvalidFormat(String),
}

/// A normalised RGB triple. Components are usually in [0, 1], but splat
/// inks may be scaled beyond that.
///
/// Serialized as a `#RRGGBB` string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0.0, 0.0, 0.0);
    pub const WHITE: Rgb = Rgb::new(1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn from_u8(r: u8, g: u8, b: u8) -> Self {
        Self::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
    }

    pub fn from_hex(hex: &str) -> Result<Self, ParseColorError> {
        let invalid = || ParseColorError::InvalidFormat(hex.to_string());

        let digits = hex.trim().strip_prefix('#').ok_or_else(invalid)?;
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(invalid());
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16).map_err(|_| invalid())
        };

        Ok(Self::from_u8(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    pub fn to_hex(&self) -> String {
        let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!(
            "#{:02X}{:02X}{:02X}",
            channel(self.r),
            channel(self.g),
            channel(self.b)
        )
    }

    pub fn max_component(&self) -> f32 {
        self.r.max(self.g).max(self.b)
    }

    pub fn to_array(&self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    pub fn to_rgba(&self, alpha: f32) -> [f32; 4] {
        [self.r, self.g, self.b, alpha]
    }
}

impl Mul<f32> for Rgb {
    type Output = Rgb;

    fn mul(self, scale: f32) -> Rgb {
        Rgb::new(self.r * scale, self.g * scale, self.b * scale)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for Rgb {
    type Error = ParseColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rgb::from_hex(&value)
    }
}

impl From<Rgb> for String {
    fn from(color: Rgb) -> Self {
        color.to_hex()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Palette {
    #[default]
    Basic,
    Pastel,
    Warm,
    Cool,
}

impl Palette {
    pub const ALL: [Palette; 4] = [Palette::Basic, Palette::Pastel, Palette::Warm, Palette::Cool];

    pub fn swatches(&self) -> &'static [&'static str] {
        match self {
            Palette::Basic => &PALETTE_BASIC,
            Palette::Pastel => &PALETTE_PASTEL,
            Palette::Warm => &PALETTE_WARM,
            Palette::Cool => &PALETTE_COOL,
        }
    }

    pub fn colors(&self) -> Vec<Rgb> {
        self.swatches()
            .iter()
            .filter_map(|hex| Rgb::from_hex(hex).ok())
            .collect()
    }

    pub fn contains(&self, color: &Rgb) -> bool {
        let hex = color.to_hex();
        self.swatches().iter().any(|swatch| swatch.eq_ignore_ascii_case(&hex))
    }

    // The ink to use after switching to this palette: the current one if the
    // palette offers it, otherwise the palette's first swatch.
    pub fn select(&self, current: &Rgb) -> Rgb {
        if self.contains(current) {
            return *current;
        }

        self.colors().first().copied().unwrap_or(*current)
    }
}

pub static PALETTE_BASIC: [&str; 7] = [
    "#FF3B30", "#FF9500", "#FFCC00", "#34C759", "#007AFF", "#5856D6", "#FF2D55",
];
pub static PALETTE_PASTEL: [&str; 9] = [
    "#FFD1DC", "#B5EAD7", "#C7CEEA", "#FFDAC1", "#E2F0CB", "#B5B9FF", "#FFB7B2", "#FF9CEE",
    "#B28DFF",
];
pub static PALETTE_WARM: [&str; 9] = [
    "#FF3B30", "#FF9500", "#FFCC00", "#FFB7B2", "#FFD1DC", "#FF9CEE", "#FFDAC1", "#FF2D55",
    "#FF5E3A",
];
pub static PALETTE_COOL: [&str; 9] = [
    "#007AFF", "#34C759", "#5856D6", "#B5EAD7", "#B5B9FF", "#C7CEEA", "#E2F0CB", "#A0CED9",
    "#5AC8FA",
];

pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb {
    let i = (h * 6.0).floor();
    let f = h * 6.0 - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);

    match (i as i32).rem_euclid(6) {
        0 => Rgb::new(v, t, p),
        1 => Rgb::new(q, v, p),
        2 => Rgb::new(p, v, t),
        3 => Rgb::new(p, q, v),
        4 => Rgb::new(t, p, v),
        _ => Rgb::new(v, p, q),
    }
}

// A dim, fully saturated ink with a random hue.
pub fn generate_color() -> Rgb {
    hsv_to_rgb(rng::gen::<f32>(), 1.0, 1.0) * 0.15
}

// Below this, a color carries no ink and no alpha.
const INK_EPSILON: f32 = 0.01;

/// Subtractive decomposition of an RGB color into a key (black) and the
/// chromatic remainder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cmyk {
    pub c: f32,
    pub m: f32,
    pub y: f32,
    pub k: f32,
}

impl Cmyk {
    pub fn decompose(color: &Rgb) -> Self {
        let k = 1.0 - color.max_component();
        let inv_k = 1.0 - k;

        if inv_k > INK_EPSILON {
            Self {
                c: (1.0 - color.r - k) / inv_k,
                m: (1.0 - color.g - k) / inv_k,
                y: (1.0 - color.b - k) / inv_k,
                k,
            }
        } else {
            Self {
                c: 1.0,
                m: 1.0,
                y: 1.0,
                k,
            }
        }
    }

    pub fn compose(&self) -> Rgb {
        let channel = |ink: f32| ((1.0 - ink) * (1.0 - self.k)).clamp(0.0, 1.0);
        Rgb::new(channel(self.c), channel(self.m), channel(self.y))
    }
}

/// Mirrors the paint program for a single texel of the dye field.
///
/// `base` is the current RGBA dye texel; `covered` tells whether the texel
/// lies inside the brush disk. Ink under the brush replaces whatever was
/// there; elsewhere existing ink is kept.
pub fn cmyk_composite(base: [f32; 4], ink: &Rgb, covered: bool) -> [f32; 4] {
    let splat_alpha = if covered { 1.0 } else { 0.0 };
    let splat = if splat_alpha > INK_EPSILON {
        *ink
    } else {
        Rgb::BLACK
    };
    let base_alpha = base[3];
    let base_color = Rgb::new(base[0], base[1], base[2]);

    let (cmyk, alpha) = if base_alpha > INK_EPSILON && splat_alpha < INK_EPSILON {
        (Cmyk::decompose(&base_color), base_alpha)
    } else {
        (Cmyk::decompose(&splat), splat_alpha)
    };

    cmyk.compose().to_rgba(alpha)
}
