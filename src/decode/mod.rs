//! Image and animation decoding.
//!
//! Outputs only see these traits; the bundled implementations sit on the
//! `image` crate.

mod animation;
mod image_file;

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::color::Rgba;
use crate::error::WallpaperResult;
use crate::raster::Raster;
use crate::request::ScaleMode;

pub use animation::{GifAnimationDecoder, GifSource};
pub use image_file::{ImageFileDecoder, scale_to_output};

/// Decodes a still image already fitted to an output.
pub trait ImageDecoder {
    fn decode(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        mode: ScaleMode,
        background: Rgba,
    ) -> WallpaperResult<Raster>;
}

/// A stream of frames sized for one output.
pub trait AnimatedSource: Send {
    /// The next frame, or `None` once a non-looping source is exhausted.
    fn next_frame(&mut self) -> WallpaperResult<Option<Raster>>;

    /// How long the frame last returned by [`Self::next_frame`] stays on screen.
    fn frame_duration(&self) -> Duration;

    fn is_eof(&self) -> bool;

    fn seek_start(&mut self) -> WallpaperResult<()>;
}

pub trait AnimationDecoder {
    fn open(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        looping: bool,
    ) -> WallpaperResult<Box<dyn AnimatedSource>>;
}

/// The decoders a session uses for file wallpapers.
pub struct Decoders {
    pub image: Box<dyn ImageDecoder>,
    pub animation: Box<dyn AnimationDecoder>,
}

impl Default for Decoders {
    fn default() -> Self {
        Self {
            image: Box::new(ImageFileDecoder),
            animation: Box::new(GifAnimationDecoder),
        }
    }
}

impl fmt::Debug for Decoders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoders").finish_non_exhaustive()
    }
}

/// An animated source shared between its output and whoever drives it.
#[derive(Clone)]
pub struct SharedAnimation(Arc<Mutex<Box<dyn AnimatedSource>>>);

impl SharedAnimation {
    pub fn new(source: Box<dyn AnimatedSource>) -> Self {
        Self(Arc::new(Mutex::new(source)))
    }

    /// A panic while decoding leaves the source usable; the frame state is
    /// at worst one frame stale.
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn AnimatedSource>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SharedAnimation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = self.lock();
        f.debug_struct("SharedAnimation")
            .field("eof", &source.is_eof())
            .field("frame_duration", &source.frame_duration())
            .finish()
    }
}
