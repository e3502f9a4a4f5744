//! Per-kind compositing kernels.
//!
//! Every kernel reads `old` and `new`, writes every pixel of `out`, and depends on
//! nothing but its arguments. All three rasters share one size.

use crate::raster::{BYTES_PER_PIXEL, Raster};

use super::TransitionKind;

const PX: usize = BYTES_PER_PIXEL;

/// Parameters fixed when a transition starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KernelParams {
    pub center: (i32, i32),
}

/// Renders one frame of `kind` at eased progress `t`.
pub fn render(
    kind: TransitionKind,
    old: &Raster,
    new: &Raster,
    t: f32,
    params: &KernelParams,
    out: &mut Raster,
) {
    debug_assert!(old.same_size(new) && old.same_size(out));
    let t = t.clamp(0.0, 1.0);
    match kind {
        TransitionKind::None => out.copy_from(new),
        TransitionKind::Fade => fade(old, new, t, out),
        TransitionKind::SlideLeft => slide_left(old, new, t, out),
        TransitionKind::SlideRight => slide_right(old, new, t, out),
        TransitionKind::SlideUp => slide_up(old, new, t, out),
        TransitionKind::SlideDown => slide_down(old, new, t, out),
        TransitionKind::ZoomIn => zoom(old, new, t, 1.0 + 0.5 * t, out),
        TransitionKind::ZoomOut => zoom(old, new, t, 1.0 - 0.3 * t, out),
        TransitionKind::CircleOpen => circle_open(old, new, t, params.center, out),
        TransitionKind::CircleClose => circle_close(old, new, t, params.center, out),
        TransitionKind::WipeLeft => wipe_left(old, new, t, out),
        TransitionKind::WipeRight => wipe_right(old, new, t, out),
        TransitionKind::WipeUp => wipe_up(old, new, t, out),
        TransitionKind::WipeDown => wipe_down(old, new, t, out),
        TransitionKind::Dissolve => dissolve(old, new, t, out),
        TransitionKind::Pixelate => pixelate(old, new, t, out),
    }
}

#[inline]
fn lerp_u8(a: u8, b: u8, t: f32) -> u8 {
    (f32::from(a) + (f32::from(b) - f32::from(a)) * t) as u8
}

#[inline]
fn blend_px(dst: &mut [u8], a: &[u8], b: &[u8], t: f32) {
    for c in 0..PX {
        dst[c] = lerp_u8(a[c], b[c], t);
    }
}

/// `ceil(t * len)`, clamped to `len`.
#[inline]
fn boundary(len: usize, t: f32) -> usize {
    ((len as f32 * t).ceil() as usize).min(len)
}

#[inline]
fn offset(len: usize, t: f32) -> usize {
    ((len as f32 * t) as usize).min(len)
}

fn rows<'a>(
    old: &'a Raster,
    new: &'a Raster,
    out: &'a mut Raster,
) -> impl Iterator<Item = (&'a [u8], &'a [u8], &'a mut [u8])> {
    let stride = out.stride();
    old.pixels()
        .chunks_exact(stride)
        .zip(new.pixels().chunks_exact(stride))
        .zip(out.pixels_mut().chunks_exact_mut(stride))
        .map(|((o, n), d)| (o, n, d))
}

pub fn fade(old: &Raster, new: &Raster, t: f32, out: &mut Raster) {
    for ((d, o), n) in out
        .pixels_mut()
        .iter_mut()
        .zip(old.pixels())
        .zip(new.pixels())
    {
        *d = lerp_u8(*o, *n, t);
    }
}

/// Old exits to the left while new follows it in from the right.
pub fn slide_left(old: &Raster, new: &Raster, t: f32, out: &mut Raster) {
    let w = out.width() as usize;
    let split = (w - offset(w, t)) * PX;
    let off = offset(w, t) * PX;
    for (o, n, d) in rows(old, new, out) {
        d[..split].copy_from_slice(&o[off..]);
        d[split..].copy_from_slice(&n[..off]);
    }
}

pub fn slide_right(old: &Raster, new: &Raster, t: f32, out: &mut Raster) {
    let w = out.width() as usize;
    let off = offset(w, t) * PX;
    let rest = w * PX - off;
    for (o, n, d) in rows(old, new, out) {
        d[..off].copy_from_slice(&n[rest..]);
        d[off..].copy_from_slice(&o[..rest]);
    }
}

pub fn slide_up(old: &Raster, new: &Raster, t: f32, out: &mut Raster) {
    let stride = out.stride();
    let off = offset(out.height() as usize, t) * stride;
    let rest = out.pixels().len() - off;
    let dst = out.pixels_mut();
    dst[..rest].copy_from_slice(&old.pixels()[off..]);
    dst[rest..].copy_from_slice(&new.pixels()[..off]);
}

pub fn slide_down(old: &Raster, new: &Raster, t: f32, out: &mut Raster) {
    let stride = out.stride();
    let off = offset(out.height() as usize, t) * stride;
    let rest = out.pixels().len() - off;
    let dst = out.pixels_mut();
    dst[..off].copy_from_slice(&new.pixels()[rest..]);
    dst[off..].copy_from_slice(&old.pixels()[..rest]);
}

/// Samples old through a radial scale about the image center and blends it
/// toward new; samples falling outside old show new directly.
pub fn zoom(old: &Raster, new: &Raster, t: f32, scale: f32, out: &mut Raster) {
    let w = out.width() as i32;
    let h = out.height() as i32;
    let (cx, cy) = (w / 2, h / 2);
    let src = old.pixels();
    let target = new.pixels();
    let dst = out.pixels_mut();

    for y in 0..h {
        let sy = cy + ((y - cy) as f32 / scale) as i32;
        for x in 0..w {
            let sx = cx + ((x - cx) as f32 / scale) as i32;
            let di = (y * w + x) as usize * PX;
            if (0..w).contains(&sx) && (0..h).contains(&sy) {
                let si = (sy * w + sx) as usize * PX;
                blend_px(
                    &mut dst[di..di + PX],
                    &src[si..si + PX],
                    &target[di..di + PX],
                    t,
                );
            } else {
                dst[di..di + PX].copy_from_slice(&target[di..di + PX]);
            }
        }
    }
}

/// Distance from `center` to the farthest corner of a `width`x`height` frame.
pub fn farthest_corner(width: u32, height: u32, center: (i32, i32)) -> f32 {
    let (cx, cy) = (center.0 as f32, center.1 as f32);
    let (w, h) = (width as f32, height as f32);
    [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)]
        .into_iter()
        .map(|(x, y)| ((x - cx).powi(2) + (y - cy).powi(2)).sqrt())
        .fold(0.0, f32::max)
}

fn circle(
    old: &Raster,
    new: &Raster,
    center: (i32, i32),
    out: &mut Raster,
    show_new: impl Fn(f32) -> bool,
) {
    let w = out.width() as usize;
    let (cx, cy) = (center.0 as f32, center.1 as f32);
    for (y, (o, n, d)) in rows(old, new, out).enumerate() {
        let dy = y as f32 - cy;
        for x in 0..w {
            let dx = x as f32 - cx;
            let i = x * PX;
            let src = if show_new((dx * dx + dy * dy).sqrt()) {
                n
            } else {
                o
            };
            d[i..i + PX].copy_from_slice(&src[i..i + PX]);
        }
    }
}

pub fn circle_open(old: &Raster, new: &Raster, t: f32, center: (i32, i32), out: &mut Raster) {
    let radius = t * farthest_corner(out.width(), out.height(), center);
    circle(old, new, center, out, |dist| dist < radius);
}

pub fn circle_close(old: &Raster, new: &Raster, t: f32, center: (i32, i32), out: &mut Raster) {
    let radius = (1.0 - t) * farthest_corner(out.width(), out.height(), center);
    circle(old, new, center, out, |dist| dist > radius);
}

/// New covers every column `x < t * width`.
pub fn wipe_left(old: &Raster, new: &Raster, t: f32, out: &mut Raster) {
    let b = boundary(out.width() as usize, t) * PX;
    for (o, n, d) in rows(old, new, out) {
        d[..b].copy_from_slice(&n[..b]);
        d[b..].copy_from_slice(&o[b..]);
    }
}

/// New covers every column `x >= (1 - t) * width`.
pub fn wipe_right(old: &Raster, new: &Raster, t: f32, out: &mut Raster) {
    let b = boundary(out.width() as usize, 1.0 - t) * PX;
    for (o, n, d) in rows(old, new, out) {
        d[..b].copy_from_slice(&o[..b]);
        d[b..].copy_from_slice(&n[b..]);
    }
}

/// New rises from the bottom: rows `y >= (1 - t) * height`.
pub fn wipe_up(old: &Raster, new: &Raster, t: f32, out: &mut Raster) {
    let b = boundary(out.height() as usize, 1.0 - t) * out.stride();
    let dst = out.pixels_mut();
    dst[..b].copy_from_slice(&old.pixels()[..b]);
    dst[b..].copy_from_slice(&new.pixels()[b..]);
}

/// New descends from the top: rows `y < t * height`.
pub fn wipe_down(old: &Raster, new: &Raster, t: f32, out: &mut Raster) {
    let b = boundary(out.height() as usize, t) * out.stride();
    let dst = out.pixels_mut();
    dst[..b].copy_from_slice(&new.pixels()[..b]);
    dst[b..].copy_from_slice(&old.pixels()[b..]);
}

/// Reveal threshold of pixel `(x, y)` in `[0, 1)`.
///
/// A fixed spatial hash, so a given frame size always dissolves in the same order.
pub fn dissolve_threshold(x: u32, y: u32) -> f32 {
    let hash = x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663);
    (hash & 0xFFFF) as f32 / 65_536.0
}

pub fn dissolve(old: &Raster, new: &Raster, t: f32, out: &mut Raster) {
    let w = out.width() as usize;
    for (y, (o, n, d)) in rows(old, new, out).enumerate() {
        for x in 0..w {
            let i = x * PX;
            let src = if t > dissolve_threshold(x as u32, y as u32) {
                n
            } else {
                o
            };
            d[i..i + PX].copy_from_slice(&src[i..i + PX]);
        }
    }
}

/// Mosaic block edge in pixels, from 1 at the endpoints up to 33 at `t = 0.5`.
pub fn pixelate_block_size(t: f32) -> usize {
    let peak = 1.0 - (t - 0.5).abs() * 2.0;
    1 + (peak.clamp(0.0, 1.0) * 32.0) as usize
}

pub fn pixelate(old: &Raster, new: &Raster, t: f32, out: &mut Raster) {
    let w = out.width() as usize;
    let h = out.height() as usize;
    let stride = out.stride();
    let block = pixelate_block_size(t);
    let dst = out.pixels_mut();

    for by in (0..h).step_by(block) {
        let sy = (by + block / 2).min(h - 1);
        let rows_in_block = block.min(h - by);
        for bx in (0..w).step_by(block) {
            let sx = (bx + block / 2).min(w - 1);
            let si = sy * stride + sx * PX;
            let mut color = [0u8; PX];
            blend_px(
                &mut color,
                &old.pixels()[si..si + PX],
                &new.pixels()[si..si + PX],
                t,
            );

            let cols_in_block = block.min(w - bx);
            for row in by..by + rows_in_block {
                let start = row * stride + bx * PX;
                for px in dst[start..start + cols_in_block * PX].chunks_exact_mut(PX) {
                    px.copy_from_slice(&color);
                }
            }
        }
    }
}
