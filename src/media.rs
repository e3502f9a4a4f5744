use std::path::Path;

use crate::error::{WallpaperError, WallpaperResult};

const STATIC_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "webp", "bmp", "tga", "pnm", "pbm", "pgm", "ppm", "tiff", "tif", "ff",
];
const ANIMATED_EXTENSIONS: &[&str] = &["gif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm"];

/// What kind of wallpaper source a file is, judged by its extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    StaticImage,
    AnimatedImage,
    Video,
}

impl MediaKind {
    /// Classifies an existing file.
    pub fn detect(path: &Path) -> WallpaperResult<Self> {
        if !path.exists() {
            return Err(WallpaperError::decode(format!(
                "{} does not exist",
                path.display()
            )));
        }
        Self::from_extension(path).ok_or_else(|| {
            WallpaperError::decode(format!(
                "unsupported file extension: {}",
                path.display()
            ))
        })
    }

    /// Classifies by extension alone, case-insensitively.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let ext = ext.as_str();
        if STATIC_EXTENSIONS.contains(&ext) {
            Some(Self::StaticImage)
        } else if ANIMATED_EXTENSIONS.contains(&ext) {
            Some(Self::AnimatedImage)
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            Some(Self::Video)
        } else {
            None
        }
    }

    /// Animated sources bypass transitions and play frame by frame.
    pub fn is_animated(self) -> bool {
        !matches!(self, Self::StaticImage)
    }
}

pub fn is_supported(path: &Path) -> bool {
    MediaKind::from_extension(path).is_some()
}
