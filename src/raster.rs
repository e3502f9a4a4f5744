use crate::color::Rgba;
use crate::error::{WallpaperError, WallpaperResult};

/// Bytes per RGBA / ARGB8888 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// A decoded RGBA8 pixel buffer, row-major with no row padding.
///
/// Once built a raster is only ever read; transitions and outputs write into
/// rasters they own.
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl Raster {
    /// A fully transparent black raster.
    pub fn new(width: u32, height: u32) -> WallpaperResult<Self> {
        let len = byte_len(width, height)?;
        Ok(Self {
            pixels: vec![0; len],
            width,
            height,
        })
    }

    pub fn filled(width: u32, height: u32, color: Rgba) -> WallpaperResult<Self> {
        let len = byte_len(width, height)?;
        let pixels = color
            .to_array()
            .iter()
            .copied()
            .cycle()
            .take(len)
            .collect();
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> WallpaperResult<Self> {
        let len = byte_len(width, height)?;
        if pixels.len() != len {
            return Err(WallpaperError::invalid(format!(
                "{width}x{height} raster needs {len} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    /// Builds a raster by evaluating `f` for every pixel.
    pub fn from_fn(
        width: u32,
        height: u32,
        mut f: impl FnMut(u32, u32) -> [u8; 4],
    ) -> WallpaperResult<Self> {
        let mut raster = Self::new(width, height)?;
        for (i, px) in raster.pixels.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let x = (i % width as usize) as u32;
            let y = (i / width as usize) as u32;
            px.copy_from_slice(&f(x, y));
        }
        Ok(raster)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    pub fn same_size(&self, other: &Self) -> bool {
        self.size() == other.size()
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    pub(crate) fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Overwrites this raster with `other`, which must have the same size.
    pub(crate) fn copy_from(&mut self, other: &Self) {
        debug_assert!(self.same_size(other));
        self.pixels.copy_from_slice(&other.pixels);
    }
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

fn byte_len(width: u32, height: u32) -> WallpaperResult<usize> {
    if width == 0 || height == 0 {
        return Err(WallpaperError::invalid(format!(
            "raster dimensions must be positive, got {width}x{height}"
        )));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
        .ok_or_else(|| WallpaperError::resource(format!("{width}x{height} raster is too large")))
}

/// Writes `raster` into a compositor buffer as `ARGB8888`.
///
/// `ARGB8888` is a little-endian packed format, so each pixel lands in memory
/// as B, G, R, A.
pub fn write_argb8888(raster: &Raster, dst: &mut [u8]) -> WallpaperResult<()> {
    if dst.len() != raster.pixels.len() {
        return Err(WallpaperError::DimensionMismatch {
            expected_width: raster.width,
            expected_height: raster.height,
            actual_width: raster.width,
            actual_height: (dst.len() / raster.stride().max(1)) as u32,
        });
    }
    for (d, s) in dst
        .chunks_exact_mut(BYTES_PER_PIXEL)
        .zip(raster.pixels.chunks_exact(BYTES_PER_PIXEL))
    {
        d[0] = s[2];
        d[1] = s[1];
        d[2] = s[0];
        d[3] = s[3];
    }
    Ok(())
}
