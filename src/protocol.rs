//! The narrow slice of a display server the controllers depend on.
//!
//! [`crate::wayland::WaylandCompositor`] implements it over a live
//! connection; tests drive the controllers through an in-memory one.

use std::time::Duration;

use crate::error::WallpaperResult;
use crate::output_info::OutputInfo;

/// Stable identifier of an output for the lifetime of the connection.
pub type OutputId = u32;

/// What the compositor has told us about one output so far.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutputDescriptor {
    pub id: OutputId,
    pub name: Option<String>,
    pub model: Option<String>,
    /// Current mode, in physical pixels.
    pub width: u32,
    pub height: u32,
    /// Refresh rate in mHz.
    pub refresh_mhz: i32,
    pub scale: i32,
    /// The compositor finished describing the output.
    pub done: bool,
}

impl OutputDescriptor {
    pub fn is_usable(&self) -> bool {
        self.done && self.width > 0 && self.height > 0
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.model.clone())
            .unwrap_or_else(|| format!("output-{}", self.id))
    }

    pub fn info(&self) -> OutputInfo {
        OutputInfo {
            name: self.display_name(),
            width: self.width,
            height: self.height,
            refresh_rate_hz: u32::try_from((self.refresh_mhz + 500) / 1000).unwrap_or(0),
            scale: self.scale,
        }
    }
}

/// Protocol extensions a wallpaper needs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub compositing: bool,
    pub shared_memory: bool,
    pub background_layer: bool,
}

impl Capabilities {
    pub const ALL: Self = Self {
        compositing: true,
        shared_memory: true,
        background_layer: true,
    };

    /// Interface names of whatever is missing.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.compositing {
            missing.push("wl_compositor");
        }
        if !self.shared_memory {
            missing.push("wl_shm");
        }
        if !self.background_layer {
            missing.push("zwlr_layer_shell_v1");
        }
        missing
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// The frame callback requested with the last present fired.
    FrameDone(OutputId),
    /// The compositor no longer reads from this buffer slot.
    BufferReleased { output: OutputId, slot: usize },
    OutputRemoved(OutputId),
    /// The compositor closed the output's background surface.
    SurfaceClosed(OutputId),
    /// Output geometry, mode or naming changed, or an output appeared.
    OutputsChanged,
}

/// A mapped ARGB8888 buffer that can be attached to an output's surface.
pub trait PresentBuffer {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn slot(&self) -> usize;
    fn data_mut(&mut self) -> &mut [u8];
}

pub trait Compositor {
    type Buffer: PresentBuffer;

    fn capabilities(&self) -> Capabilities;

    /// Every output currently advertised, in advertisement order.
    fn outputs(&self) -> Vec<OutputDescriptor>;

    /// Creates the output's background surface if it has none and waits for
    /// it to be configured.
    fn ensure_surface(&mut self, output: OutputId) -> WallpaperResult<()>;

    fn destroy_surface(&mut self, output: OutputId);

    fn allocate_buffer(
        &mut self,
        output: OutputId,
        slot: usize,
        width: u32,
        height: u32,
    ) -> WallpaperResult<Self::Buffer>;

    /// Attaches `buffer`, damages all of it and commits. With
    /// `request_frame` a frame callback is armed before the commit.
    fn present(
        &mut self,
        output: OutputId,
        buffer: &Self::Buffer,
        request_frame: bool,
    ) -> WallpaperResult<()>;

    /// Arms a frame callback without new content.
    fn request_frame(&mut self, output: OutputId) -> WallpaperResult<()>;

    fn flush(&mut self) -> WallpaperResult<()>;

    /// Waits until the compositor has processed every request sent so far.
    fn roundtrip(&mut self) -> WallpaperResult<Vec<ProtocolEvent>>;

    /// Processes whatever is already readable, without waiting.
    fn dispatch_pending(&mut self) -> WallpaperResult<Vec<ProtocolEvent>> {
        self.blocking_dispatch(Some(Duration::ZERO))
    }

    /// Waits for events up to `timeout` (forever with `None`) and
    /// processes them.
    fn blocking_dispatch(
        &mut self,
        timeout: Option<Duration>,
    ) -> WallpaperResult<Vec<ProtocolEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_capabilities_are_named() {
        let caps = Capabilities {
            compositing: true,
            shared_memory: false,
            background_layer: false,
        };
        assert_eq!(caps.missing(), vec!["wl_shm", "zwlr_layer_shell_v1"]);
        assert!(Capabilities::ALL.missing().is_empty());
    }

    #[test]
    fn info_rounds_refresh_and_falls_back_to_model() {
        let descriptor = OutputDescriptor {
            id: 7,
            name: None,
            model: Some("U2720Q".into()),
            width: 3840,
            height: 2160,
            refresh_mhz: 59_940,
            scale: 2,
            done: true,
        };
        let info = descriptor.info();
        assert_eq!(info.name, "U2720Q");
        assert_eq!(info.refresh_rate_hz, 60);
        assert!(descriptor.is_usable());
        assert_eq!(
            OutputDescriptor {
                id: 3,
                ..Default::default()
            }
            .display_name(),
            "output-3"
        );
    }
}
