use std::fmt;
use std::str::FromStr;

use crate::error::WallpaperError;

/// A straight-alpha RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    pub const WHITE: Self = Self::new(255, 255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Unpacks `0xRRGGBBAA`.
    pub const fn from_packed(value: u32) -> Self {
        Self::new(
            (value >> 24) as u8,
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        )
    }

    pub const fn to_packed(self) -> u32 {
        ((self.r as u32) << 24) | ((self.g as u32) << 16) | ((self.b as u32) << 8) | self.a as u32
    }

    pub const fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::BLACK
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)?;
        if self.a != 255 {
            write!(f, "{:02x}", self.a)?;
        }
        Ok(())
    }
}

impl FromStr for Rgba {
    type Err = WallpaperError;

    /// Parses `#RRGGBB` or `#RRGGBBAA`; the leading `#` is optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if !hex.is_ascii() || !matches!(hex.len(), 6 | 8) {
            return Err(WallpaperError::invalid(format!(
                "color '{s}' must be #RRGGBB or #RRGGBBAA"
            )));
        }

        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| WallpaperError::invalid(format!("color '{s}' is not hexadecimal")))
        };

        let a = if hex.len() == 8 { channel(6)? } else { 255 };
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?, a))
    }
}
