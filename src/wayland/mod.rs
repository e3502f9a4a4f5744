mod backend;
mod shm;
mod surface;

pub use self::backend::WaylandCompositor;
pub use self::shm::ShmBuffer;

use std::collections::HashMap;

use tracing::{debug, info, trace, trace_span, warn};
use wayland_client::{
    Connection, Dispatch, Proxy, QueueHandle, WEnum,
    protocol::{
        wl_buffer, wl_callback, wl_compositor, wl_output, wl_registry, wl_shm, wl_shm_pool,
        wl_surface,
    },
};
use wayland_protocols::xdg::xdg_output::zv1::client::{zxdg_output_manager_v1, zxdg_output_v1};
use wayland_protocols_wlr::layer_shell::v1::client::{zwlr_layer_shell_v1, zwlr_layer_surface_v1};

use self::surface::OutputSurface;
use crate::protocol::{OutputDescriptor, OutputId, ProtocolEvent};

/// Highest interface versions this client speaks.
const COMPOSITOR_VERSION: u32 = 4;
const OUTPUT_VERSION: u32 = 4;
const LAYER_SHELL_VERSION: u32 = 4;
const XDG_OUTPUT_VERSION: u32 = 3;

pub(crate) struct TrackedOutput {
    pub wl_output: wl_output::WlOutput,
    pub xdg_output: Option<zxdg_output_v1::ZxdgOutputV1>,
    pub descriptor: OutputDescriptor,
}

pub(crate) struct WaylandAppState {
    /// Events for the session, drained by every dispatch.
    pub events: Vec<ProtocolEvent>,
    // Wayland objects
    pub compositor: Option<(wl_compositor::WlCompositor, u32)>,
    pub shm: Option<(wl_shm::WlShm, u32)>,
    pub layer_shell: Option<(zwlr_layer_shell_v1::ZwlrLayerShellV1, u32)>,
    pub xdg_output_manager: Option<zxdg_output_manager_v1::ZxdgOutputManagerV1>,
    pub outputs: HashMap<OutputId, TrackedOutput>,
    pub output_order: Vec<OutputId>,
    pub surfaces: HashMap<OutputId, OutputSurface>,
}

impl WaylandAppState {
    pub(crate) fn new() -> Self {
        Self {
            events: Vec::new(),
            compositor: None,
            shm: None,
            layer_shell: None,
            xdg_output_manager: None,
            outputs: HashMap::new(),
            output_order: Vec::new(),
            surfaces: HashMap::new(),
        }
    }

    pub(crate) fn take_events(&mut self) -> Vec<ProtocolEvent> {
        std::mem::take(&mut self.events)
    }

    fn bind_xdg_output(&mut self, id: OutputId, qh: &QueueHandle<Self>) {
        let Some(manager) = self.xdg_output_manager.as_ref() else {
            return;
        };
        if let Some(output) = self.outputs.get_mut(&id)
            && output.xdg_output.is_none()
        {
            output.xdg_output = Some(manager.get_xdg_output(&output.wl_output, qh, id));
        }
    }

    fn descriptor_mut(&mut self, id: OutputId) -> Option<&mut OutputDescriptor> {
        self.outputs.get_mut(&id).map(|output| &mut output.descriptor)
    }
}

impl Dispatch<wl_registry::WlRegistry, ()> for WaylandAppState {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _data: &(),
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => {
                let _span_guard =
                    trace_span!("wl_registry::Event::Global", name, interface, version).entered();
                match interface.as_str() {
                    "wl_compositor" => {
                        info!("Compositor found: {} (version {})", name, version);
                        let version = version.min(COMPOSITOR_VERSION);
                        state.compositor = Some((registry.bind(name, version, qh, ()), name));
                    }
                    "wl_shm" => {
                        info!("Shm found: {} (version {})", name, version);
                        state.shm = Some((registry.bind(name, 1, qh, ()), name));
                    }
                    "wl_output" => {
                        info!("Output found: {} (version {})", name, version);
                        let wl_output = registry.bind::<wl_output::WlOutput, _, _>(
                            name,
                            version.min(OUTPUT_VERSION),
                            qh,
                            name,
                        );
                        state.outputs.insert(
                            name,
                            TrackedOutput {
                                wl_output,
                                xdg_output: None,
                                descriptor: OutputDescriptor {
                                    id: name,
                                    scale: 1,
                                    ..Default::default()
                                },
                            },
                        );
                        state.output_order.push(name);
                        state.bind_xdg_output(name, qh);
                    }
                    "zwlr_layer_shell_v1" => {
                        info!("LayerShell found: {} (version {})", name, version);
                        let version = version.min(LAYER_SHELL_VERSION);
                        state.layer_shell = Some((registry.bind(name, version, qh, ()), name));
                    }
                    "zxdg_output_manager_v1" => {
                        info!("xdg_output_manager found: {} (version {})", name, version);
                        let version = version.min(XDG_OUTPUT_VERSION);
                        state.xdg_output_manager = Some(registry.bind(name, version, qh, ()));
                        for id in state.output_order.clone() {
                            state.bind_xdg_output(id, qh);
                        }
                    }
                    _ => {}
                }
            }
            wl_registry::Event::GlobalRemove { name } => {
                let _span_guard = trace_span!("wl_registry::Event::GlobalRemove", name).entered();
                if let Some((_, compositor_name)) = &state.compositor
                    && *compositor_name == name
                {
                    warn!("Compositor {} removed", name);
                    state.compositor = None;
                }
                if let Some((_, shm_name)) = &state.shm
                    && *shm_name == name
                {
                    warn!("Shm {} removed", name);
                    state.shm = None;
                }
                if let Some(output) = state.outputs.remove(&name) {
                    warn!("Output {} removed", name);
                    state.surfaces.remove(&name);
                    state.output_order.retain(|n| *n != name);
                    if let Some(xdg) = output.xdg_output {
                        xdg.destroy();
                    }
                    if output.wl_output.version() >= 3 {
                        output.wl_output.release();
                    }
                    state.events.push(ProtocolEvent::OutputRemoved(name));
                }
                if let Some((_, layer_shell_name)) = &state.layer_shell
                    && *layer_shell_name == name
                {
                    warn!("LayerShell {} removed", name);
                    state.layer_shell = None;
                }
            }
            _ => {}
        };
    }
}

impl Dispatch<wl_output::WlOutput, OutputId> for WaylandAppState {
    fn event(
        state: &mut Self,
        _output: &wl_output::WlOutput,
        event: wl_output::Event,
        id: &OutputId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let Some(descriptor) = state.descriptor_mut(*id) else {
            return;
        };
        match event {
            wl_output::Event::Geometry { make, model, .. } => {
                descriptor.model = Some(if make.is_empty() {
                    model
                } else {
                    format!("{make} {model}")
                });
            }
            wl_output::Event::Mode {
                flags,
                width,
                height,
                refresh,
            } => {
                if let WEnum::Value(flags) = flags
                    && flags.contains(wl_output::Mode::Current)
                {
                    descriptor.width = width.max(0) as u32;
                    descriptor.height = height.max(0) as u32;
                    descriptor.refresh_mhz = refresh;
                }
            }
            wl_output::Event::Scale { factor } => {
                descriptor.scale = factor;
            }
            wl_output::Event::Name { name } => {
                descriptor.name = Some(name);
            }
            wl_output::Event::Done => {
                let _span_guard = trace_span!("wl_output::Event::Done", id = *id).entered();
                descriptor.done = true;
                debug!("Output described: {}", descriptor.info());
                state.events.push(ProtocolEvent::OutputsChanged);
            }
            _ => {}
        }
    }
}

impl Dispatch<zxdg_output_manager_v1::ZxdgOutputManagerV1, ()> for WaylandAppState {
    fn event(
        _state: &mut Self,
        _object: &zxdg_output_manager_v1::ZxdgOutputManagerV1,
        _event: zxdg_output_manager_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // manager has no events
    }
}

impl Dispatch<zxdg_output_v1::ZxdgOutputV1, OutputId> for WaylandAppState {
    fn event(
        state: &mut Self,
        _output: &zxdg_output_v1::ZxdgOutputV1,
        event: zxdg_output_v1::Event,
        id: &OutputId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // Older wl_output versions carry no connector name.
        if let zxdg_output_v1::Event::Name { name } = event
            && let Some(descriptor) = state.descriptor_mut(*id)
            && descriptor.name.is_none()
        {
            descriptor.name = Some(name);
            if descriptor.done {
                state.events.push(ProtocolEvent::OutputsChanged);
            }
        }
    }
}

impl Dispatch<zwlr_layer_shell_v1::ZwlrLayerShellV1, ()> for WaylandAppState {
    fn event(
        _state: &mut Self,
        _layer_shell: &zwlr_layer_shell_v1::ZwlrLayerShellV1,
        _event: zwlr_layer_shell_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // Do nothing: LayerShell never dispatches events.
    }
}

impl Dispatch<zwlr_layer_surface_v1::ZwlrLayerSurfaceV1, OutputId> for WaylandAppState {
    fn event(
        state: &mut Self,
        layer_surface: &zwlr_layer_surface_v1::ZwlrLayerSurfaceV1,
        event: zwlr_layer_surface_v1::Event,
        id: &OutputId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            zwlr_layer_surface_v1::Event::Configure {
                serial,
                width,
                height,
            } => {
                let _span_guard = trace_span!(
                    "zwlr_layer_surface_v1::Event::Configure",
                    serial,
                    width,
                    height
                )
                .entered();
                layer_surface.ack_configure(serial);
                if let Some(surface) = state.surfaces.get_mut(id) {
                    info!(
                        "Layer surface configured (output {}): {}x{}",
                        id, width, height
                    );
                    surface.configured = true;
                    surface.width = width;
                    surface.height = height;
                } else {
                    warn!("Configure for unknown layer_surface");
                }
            }
            zwlr_layer_surface_v1::Event::Closed => {
                let _span_guard = trace_span!("zwlr_layer_surface_v1::Event::Closed").entered();
                info!("Layer surface closed (output {})", id);
                state.surfaces.remove(id);
                state.events.push(ProtocolEvent::SurfaceClosed(*id));
            }
            _ => (),
        }
    }
}

impl Dispatch<wl_callback::WlCallback, OutputId> for WaylandAppState {
    fn event(
        state: &mut Self,
        _callback: &wl_callback::WlCallback,
        event: wl_callback::Event,
        id: &OutputId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_callback::Event::Done { .. } = event {
            let _span_guard = trace_span!("wl_callback::Event::Done", output = *id).entered();
            trace!("Frame callback received");
            state.events.push(ProtocolEvent::FrameDone(*id));
        }
    }
}

impl Dispatch<wl_buffer::WlBuffer, (OutputId, usize)> for WaylandAppState {
    fn event(
        state: &mut Self,
        _buffer: &wl_buffer::WlBuffer,
        event: wl_buffer::Event,
        &(output, slot): &(OutputId, usize),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            state
                .events
                .push(ProtocolEvent::BufferReleased { output, slot });
        }
    }
}

impl Dispatch<wl_surface::WlSurface, ()> for WaylandAppState {
    fn event(
        _state: &mut Self,
        _surface: &wl_surface::WlSurface,
        event: wl_surface::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_surface::Event::PreferredBufferScale { factor } => {
                debug!("Preferred buffer scale factor: {}", factor);
            }
            wl_surface::Event::PreferredBufferTransform { transform } => {
                debug!("Ignoring preferred buffer transform: {:?}", transform);
            }
            _ => {
                // Enter/leave are irrelevant for a background.
            }
        }
    }
}

impl Dispatch<wl_shm::WlShm, ()> for WaylandAppState {
    fn event(
        _state: &mut Self,
        _shm: &wl_shm::WlShm,
        _event: wl_shm::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // ARGB8888 support is mandatory, so the format list is not needed.
    }
}

impl Dispatch<wl_shm_pool::WlShmPool, ()> for WaylandAppState {
    fn event(
        _state: &mut Self,
        _pool: &wl_shm_pool::WlShmPool,
        _event: wl_shm_pool::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // Pools have no events.
    }
}

impl Dispatch<wl_compositor::WlCompositor, ()> for WaylandAppState {
    fn event(
        _state: &mut Self,
        _compositor: &wl_compositor::WlCompositor,
        _event: wl_compositor::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // Do nothing: Compositor never dispatches events.
    }
}
