use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder as _, RgbaImage};
use tracing::debug;

use super::image_file::{into_raster, resize};
use super::{AnimatedSource, AnimationDecoder};
use crate::error::{WallpaperError, WallpaperResult};
use crate::media::MediaKind;
use crate::raster::Raster;

/// GIFs with a zero delay play at this rate, as browsers do.
const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, Default)]
pub struct GifAnimationDecoder;

impl AnimationDecoder for GifAnimationDecoder {
    fn open(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        looping: bool,
    ) -> WallpaperResult<Box<dyn AnimatedSource>> {
        match MediaKind::from_extension(path) {
            Some(MediaKind::AnimatedImage) => {}
            Some(MediaKind::Video) => {
                return Err(WallpaperError::decode(format!(
                    "no video decoder available for {}",
                    path.display()
                )));
            }
            _ => {
                return Err(WallpaperError::decode(format!(
                    "{} is not an animated image",
                    path.display()
                )));
            }
        }

        let file = File::open(path).map_err(|err| {
            WallpaperError::decode(format!("failed to open {}: {err}", path.display()))
        })?;
        let decoder = GifDecoder::new(BufReader::new(file)).map_err(|err| {
            WallpaperError::decode(format!("failed to read {}: {err}", path.display()))
        })?;
        let frames = decoder.into_frames().collect_frames().map_err(|err| {
            WallpaperError::decode(format!("failed to decode {}: {err}", path.display()))
        })?;

        let frames = frames
            .into_iter()
            .map(|frame| {
                let (numer, denom) = frame.delay().numer_denom_ms();
                let delay = if numer == 0 || denom == 0 {
                    DEFAULT_FRAME_DELAY
                } else {
                    Duration::from_micros(u64::from(numer) * 1000 / u64::from(denom))
                };
                (frame.into_buffer(), delay)
            })
            .collect::<Vec<_>>();

        debug!(path = %path.display(), frames = frames.len(), looping, "Opened animation");
        Ok(Box::new(GifSource::new(frames, width, height, looping)?))
    }
}

/// Pre-decoded GIF frames, resized to the output as they are pulled.
pub struct GifSource {
    frames: Vec<(RgbaImage, Duration)>,
    width: u32,
    height: u32,
    looping: bool,
    next: usize,
    current_delay: Duration,
    eof: bool,
}

impl GifSource {
    pub fn new(
        frames: Vec<(RgbaImage, Duration)>,
        width: u32,
        height: u32,
        looping: bool,
    ) -> WallpaperResult<Self> {
        if frames.is_empty() {
            return Err(WallpaperError::decode("animation has no frames"));
        }
        if width == 0 || height == 0 {
            return Err(WallpaperError::invalid(format!(
                "cannot play an animation on a {width}x{height} output"
            )));
        }
        Ok(Self {
            frames,
            width,
            height,
            looping,
            next: 0,
            current_delay: DEFAULT_FRAME_DELAY,
            eof: false,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl AnimatedSource for GifSource {
    fn next_frame(&mut self) -> WallpaperResult<Option<Raster>> {
        if self.next == self.frames.len() {
            if self.looping {
                self.next = 0;
            } else {
                self.eof = true;
                return Ok(None);
            }
        }

        let (image, delay) = &self.frames[self.next];
        self.current_delay = *delay;
        self.next += 1;
        into_raster(resize(image, self.width, self.height)).map(Some)
    }

    fn frame_duration(&self) -> Duration {
        self.current_delay
    }

    fn is_eof(&self) -> bool {
        self.eof
    }

    fn seek_start(&mut self) -> WallpaperResult<()> {
        self.next = 0;
        self.eof = false;
        Ok(())
    }
}
