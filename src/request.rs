use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::color::Rgba;
use crate::error::WallpaperError;
use crate::target_monitor::WallpaperTargetMonitor;
use crate::transition::TransitionSpec;

/// How an image is fitted to an output whose size differs from it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ScaleMode {
    /// Keep aspect ratio, fit inside and letterbox on the background color.
    #[default]
    Fit,
    /// Keep aspect ratio, cover the output and crop the overflow.
    Fill,
    Stretch,
    /// Unscaled, centered.
    Center,
    /// Unscaled, repeated from the top-left corner.
    Tile,
}

impl ScaleMode {
    pub fn name(self) -> &'static str {
        match self {
            Self::Fit => "fit",
            Self::Fill => "fill",
            Self::Stretch => "stretch",
            Self::Center => "center",
            Self::Tile => "tile",
        }
    }
}

impl fmt::Display for ScaleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScaleMode {
    type Err = WallpaperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fit" => Ok(Self::Fit),
            "fill" => Ok(Self::Fill),
            "stretch" => Ok(Self::Stretch),
            "center" | "centre" => Ok(Self::Center),
            "tile" => Ok(Self::Tile),
            other => Err(WallpaperError::invalid(format!(
                "unknown scale mode '{other}' (expected fit, fill, stretch, center or tile)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum WallpaperSource {
    File(PathBuf),
    SolidColor(Rgba),
}

/// One wallpaper change, applied to every output selected by `target`.
#[derive(Clone, Debug, PartialEq)]
pub struct WallpaperRequest {
    pub source: WallpaperSource,
    pub scale_mode: ScaleMode,
    /// Letterbox and centering background.
    pub background: Rgba,
    pub target: WallpaperTargetMonitor,
    /// Restart animations when they reach their last frame.
    pub looping: bool,
    pub transition: TransitionSpec,
}

impl WallpaperRequest {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::with_source(WallpaperSource::File(path.into()))
    }

    pub fn solid_color(color: Rgba) -> Self {
        Self::with_source(WallpaperSource::SolidColor(color))
    }

    fn with_source(source: WallpaperSource) -> Self {
        Self {
            source,
            scale_mode: ScaleMode::default(),
            background: Rgba::BLACK,
            target: WallpaperTargetMonitor::All,
            looping: true,
            transition: TransitionSpec::NONE,
        }
    }

    pub fn scale_mode(mut self, mode: ScaleMode) -> Self {
        self.scale_mode = mode;
        self
    }

    pub fn background(mut self, color: Rgba) -> Self {
        self.background = color;
        self
    }

    pub fn target(mut self, target: WallpaperTargetMonitor) -> Self {
        self.target = target;
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn transition(mut self, transition: TransitionSpec) -> Self {
        self.transition = transition;
        self
    }

    /// The same settings pointed at another file.
    pub fn with_file(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            source: WallpaperSource::File(path.into()),
            ..self.clone()
        }
    }
}
