//! Wallswitch
//!
//! Sets wallpapers on Wayland compositors through the wlr-layer-shell
//! background layer: still images, looping GIFs, solid colors and
//! slideshows, with animated transitions between changes.
//!
//! The compositor is reached through the [`protocol::Compositor`] trait;
//! enable the `wayland` feature (on by default) for the live backend.

pub mod color;
pub mod decode;
pub mod error;
pub mod media;
pub mod output;
pub mod output_info;
pub mod protocol;
pub mod raster;
pub mod request;
pub mod session;
pub mod slideshow;
pub mod target_monitor;
pub mod transition;

#[cfg(feature = "wayland")]
pub mod wayland;

pub use color::Rgba;
pub use decode::Decoders;
pub use error::{WallpaperError, WallpaperResult};
pub use media::MediaKind;
pub use output_info::OutputInfo;
pub use raster::Raster;
pub use request::{ScaleMode, WallpaperRequest, WallpaperSource};
pub use session::SessionController;
pub use target_monitor::WallpaperTargetMonitor;
pub use transition::{TransitionKind, TransitionSession, TransitionSpec};

#[cfg(feature = "wayland")]
pub use wayland::WaylandCompositor;
