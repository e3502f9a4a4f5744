//! Frame-stepped transitions between two rasters.
//!
//! A [`TransitionSession`] owns copies of the outgoing and incoming rasters and
//! one output raster. Each [`TransitionSession::update`] advances the clock and
//! renders the output with the kernel selected by [`TransitionKind`].

pub mod kernels;

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::error::{WallpaperError, WallpaperResult};
use crate::raster::Raster;

use self::kernels::KernelParams;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    #[default]
    None,
    Fade,
    SlideLeft,
    SlideRight,
    SlideUp,
    SlideDown,
    ZoomIn,
    ZoomOut,
    CircleOpen,
    CircleClose,
    WipeLeft,
    WipeRight,
    WipeUp,
    WipeDown,
    Dissolve,
    Pixelate,
}

impl TransitionKind {
    pub const ALL: [Self; 16] = [
        Self::None,
        Self::Fade,
        Self::SlideLeft,
        Self::SlideRight,
        Self::SlideUp,
        Self::SlideDown,
        Self::ZoomIn,
        Self::ZoomOut,
        Self::CircleOpen,
        Self::CircleClose,
        Self::WipeLeft,
        Self::WipeRight,
        Self::WipeUp,
        Self::WipeDown,
        Self::Dissolve,
        Self::Pixelate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Fade => "fade",
            Self::SlideLeft => "slide-left",
            Self::SlideRight => "slide-right",
            Self::SlideUp => "slide-up",
            Self::SlideDown => "slide-down",
            Self::ZoomIn => "zoom-in",
            Self::ZoomOut => "zoom-out",
            Self::CircleOpen => "circle-open",
            Self::CircleClose => "circle-close",
            Self::WipeLeft => "wipe-left",
            Self::WipeRight => "wipe-right",
            Self::WipeUp => "wipe-up",
            Self::WipeDown => "wipe-down",
            Self::Dissolve => "dissolve",
            Self::Pixelate => "pixelate",
        }
    }

    /// Circle kinds pick a random center at every start.
    pub fn is_circle(self) -> bool {
        matches!(self, Self::CircleOpen | Self::CircleClose)
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransitionKind {
    type Err = WallpaperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_'))
            .map(|c| c.to_ascii_lowercase())
            .collect();

        Self::ALL
            .into_iter()
            .find(|kind| kind.name().replace('-', "") == wanted)
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|k| k.name()).collect();
                WallpaperError::invalid(format!(
                    "unknown transition '{s}' (expected one of: {})",
                    known.join(", ")
                ))
            })
    }
}

/// How a wallpaper change should be animated.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransitionSpec {
    pub kind: TransitionKind,
    /// Seconds.
    pub duration: f32,
    /// Upper bound on stepping rate; `0` follows the compositor's frame pace.
    pub fps: u32,
}

impl TransitionSpec {
    pub const NONE: Self = Self {
        kind: TransitionKind::None,
        duration: 0.0,
        fps: 0,
    };

    pub fn new(kind: TransitionKind, duration: f32) -> Self {
        Self {
            kind,
            duration,
            fps: 0,
        }
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.kind != TransitionKind::None && self.duration.is_finite() && self.duration > 0.0
    }
}

impl Default for TransitionSpec {
    fn default() -> Self {
        Self::NONE
    }
}

/// Smooth ease-in-out: quadratic in on the first half, out on the second.
pub fn ease_in_out(t: f32) -> f32 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - 2.0 * (1.0 - t) * (1.0 - t)
    }
}

/// Result of one [`TransitionSession::update`].
#[derive(Debug)]
pub struct TransitionStep<'a> {
    /// Whether more frames follow.
    pub active: bool,
    /// The frame to present, absent when the session was already finished.
    pub frame: Option<&'a Raster>,
}

pub struct TransitionSession {
    kind: TransitionKind,
    duration: f32,
    elapsed: f32,
    active: bool,
    old: Raster,
    new: Raster,
    output: Raster,
    center: (i32, i32),
}

impl TransitionSession {
    pub fn new(
        kind: TransitionKind,
        duration: f32,
        width: u32,
        height: u32,
    ) -> WallpaperResult<Self> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(WallpaperError::invalid(format!(
                "transition duration must be positive, got {duration}"
            )));
        }
        if width == 0 || height == 0 {
            return Err(WallpaperError::invalid(format!(
                "transition size must be positive, got {width}x{height}"
            )));
        }

        Ok(Self {
            kind,
            duration,
            elapsed: 0.0,
            active: false,
            old: Raster::new(width, height)?,
            new: Raster::new(width, height)?,
            output: Raster::new(width, height)?,
            center: ((width / 2) as i32, (height / 2) as i32),
        })
    }

    /// Loads both endpoints and rewinds the clock.
    ///
    /// Circle kinds draw a fresh center from `rng`; other kinds never touch it.
    pub fn start<R: Rng>(
        &mut self,
        old: &Raster,
        new: &Raster,
        rng: &mut R,
    ) -> WallpaperResult<()> {
        for raster in [old, new] {
            if !raster.same_size(&self.output) {
                return Err(WallpaperError::invalid(format!(
                    "{}x{} raster does not fit a {}x{} transition",
                    raster.width(),
                    raster.height(),
                    self.output.width(),
                    self.output.height()
                )));
            }
        }

        self.old.copy_from(old);
        self.new.copy_from(new);
        self.output.copy_from(old);
        self.elapsed = 0.0;
        self.active = true;

        if self.kind.is_circle() {
            self.center = (
                rng.random_range(0..self.output.width()) as i32,
                rng.random_range(0..self.output.height()) as i32,
            );
        }
        Ok(())
    }

    pub fn update(&mut self, delta_seconds: f32) -> TransitionStep<'_> {
        if !self.active {
            return TransitionStep {
                active: false,
                frame: None,
            };
        }

        self.elapsed += delta_seconds.max(0.0);

        if self.elapsed >= self.duration || self.kind == TransitionKind::None {
            self.output.copy_from(&self.new);
            self.active = false;
            return TransitionStep {
                active: false,
                frame: Some(&self.output),
            };
        }

        let t = ease_in_out(self.raw_progress());
        let params = KernelParams {
            center: self.center,
        };
        kernels::render(self.kind, &self.old, &self.new, t, &params, &mut self.output);

        TransitionStep {
            active: true,
            frame: Some(&self.output),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Linear progress in `[0, 1]`; `1.0` once the session is inactive.
    pub fn progress(&self) -> f32 {
        if self.active {
            self.raw_progress()
        } else {
            1.0
        }
    }

    pub fn kind(&self) -> TransitionKind {
        self.kind
    }

    pub fn center(&self) -> (i32, i32) {
        self.center
    }

    /// The most recently rendered frame.
    pub fn output(&self) -> &Raster {
        &self.output
    }

    pub fn size(&self) -> (u32, u32) {
        self.output.size()
    }

    fn raw_progress(&self) -> f32 {
        (self.elapsed / self.duration).clamp(0.0, 1.0)
    }
}

impl fmt::Debug for TransitionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionSession")
            .field("kind", &self.kind)
            .field("duration", &self.duration)
            .field("elapsed", &self.elapsed)
            .field("active", &self.active)
            .field("size", &self.output.size())
            .finish()
    }
}
