use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageReader, RgbaImage};
use tracing::debug;

use super::ImageDecoder;
use crate::color::Rgba;
use crate::error::{WallpaperError, WallpaperResult};
use crate::raster::Raster;
use crate::request::ScaleMode;

/// Still images through the `image` crate's format detection.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageFileDecoder;

impl ImageDecoder for ImageFileDecoder {
    fn decode(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        mode: ScaleMode,
        background: Rgba,
    ) -> WallpaperResult<Raster> {
        let reader = ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|err| {
                WallpaperError::decode(format!("failed to open {}: {err}", path.display()))
            })?;
        let image = reader.decode().map_err(|err| {
            WallpaperError::decode(format!("failed to decode {}: {err}", path.display()))
        })?;

        debug!(
            path = %path.display(),
            source = ?(image.width(), image.height()),
            target = ?(width, height),
            %mode,
            "Decoded image"
        );
        scale_to_output(image.to_rgba8(), width, height, mode, background)
    }
}

/// Fits a decoded image to an output of `width`x`height`.
pub fn scale_to_output(
    image: RgbaImage,
    width: u32,
    height: u32,
    mode: ScaleMode,
    background: Rgba,
) -> WallpaperResult<Raster> {
    if width == 0 || height == 0 {
        return Err(WallpaperError::invalid(format!(
            "cannot scale to a {width}x{height} output"
        )));
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(WallpaperError::decode("image has no pixels"));
    }

    let (src_w, src_h) = image.dimensions();
    let src_aspect = src_w as f32 / src_h as f32;
    let out_aspect = width as f32 / height as f32;

    match mode {
        ScaleMode::Fit if (src_w, src_h) == (width, height) => into_raster(image),
        ScaleMode::Fit => {
            let (w, h) = if src_aspect > out_aspect {
                (width, (width as f32 / src_aspect) as u32)
            } else {
                ((height as f32 * src_aspect) as u32, height)
            };
            let scaled = resize(&image, w, h);
            centered(&scaled, width, height, background)
        }
        ScaleMode::Fill => {
            let (w, h) = if src_aspect > out_aspect {
                ((height as f32 * src_aspect) as u32, height)
            } else {
                (width, (width as f32 / src_aspect) as u32)
            };
            let scaled = resize(&image, w, h);
            centered(&scaled, width, height, background)
        }
        ScaleMode::Stretch => into_raster(resize(&image, width, height)),
        ScaleMode::Center => centered(&image, width, height, background),
        ScaleMode::Tile => Raster::from_fn(width, height, |x, y| {
            image.get_pixel(x % src_w, y % src_h).0
        }),
    }
}

/// Resamples with Catmull-Rom, or bilinear when the horizontal factor is
/// beyond 4x either way.
pub(super) fn resize(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let width = width.max(1);
    let height = height.max(1);
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    let factor = image.width() as f32 / width as f32;
    let filter = if !(0.25..=4.0).contains(&factor) {
        FilterType::Triangle
    } else {
        FilterType::CatmullRom
    };
    imageops::resize(image, width, height, filter)
}

/// Places `image` centered on a `width`x`height` canvas of `background`,
/// cropping whatever overflows.
fn centered(image: &RgbaImage, width: u32, height: u32, background: Rgba) -> WallpaperResult<Raster> {
    let offset_x = (i64::from(width) - i64::from(image.width())) / 2;
    let offset_y = (i64::from(height) - i64::from(image.height())) / 2;
    let background = background.to_array();

    Raster::from_fn(width, height, |x, y| {
        let sx = i64::from(x) - offset_x;
        let sy = i64::from(y) - offset_y;
        if sx >= 0 && sy >= 0 && sx < i64::from(image.width()) && sy < i64::from(image.height()) {
            image.get_pixel(sx as u32, sy as u32).0
        } else {
            background
        }
    })
}

pub(super) fn into_raster(image: RgbaImage) -> WallpaperResult<Raster> {
    let (width, height) = image.dimensions();
    Raster::from_rgba(width, height, image.into_raw())
}
