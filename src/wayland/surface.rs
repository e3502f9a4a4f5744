use wayland_client::protocol::wl_surface::WlSurface;
use wayland_protocols_wlr::layer_shell::v1::client::zwlr_layer_surface_v1::ZwlrLayerSurfaceV1;

/// The background-layer surface covering one output.
pub(crate) struct OutputSurface {
    pub surface: WlSurface,
    pub layer_surface: ZwlrLayerSurfaceV1,
    /// The first configure was acknowledged; buffers may be attached.
    pub configured: bool,
    pub width: u32,
    pub height: u32,
}

impl OutputSurface {
    pub(crate) fn new(surface: WlSurface, layer_surface: ZwlrLayerSurfaceV1) -> Self {
        Self {
            surface,
            layer_surface,
            configured: false,
            width: 0,
            height: 0,
        }
    }
}

impl Drop for OutputSurface {
    fn drop(&mut self) {
        // Explicitly destroy to stop showing on that output.
        self.layer_surface.destroy();
        self.surface.destroy();
    }
}
