use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::Duration;

use tracing::{debug, info, trace};
use wayland_backend::client::WaylandError;
use wayland_client::protocol::wl_surface::WlSurface;
use wayland_client::{Connection, DispatchError, EventQueue, Proxy, QueueHandle};
use wayland_protocols_wlr::layer_shell::v1::client::{zwlr_layer_shell_v1, zwlr_layer_surface_v1};

use super::WaylandAppState;
use super::shm::ShmBuffer;
use super::surface::OutputSurface;
use crate::error::{WallpaperError, WallpaperResult};
use crate::protocol::{Capabilities, Compositor, OutputDescriptor, OutputId, PresentBuffer, ProtocolEvent};

/// Roundtrips to wait for a fresh layer surface's first configure.
const CONFIGURE_ROUNDTRIPS: usize = 4;
const LAYER_NAMESPACE: &str = "wallpaper";

/// A live Wayland connection drawing through wlr-layer-shell and `wl_shm`.
pub struct WaylandCompositor {
    // Surfaces and buffers live in `state` and go before the connection.
    state: WaylandAppState,
    conn: Connection,
    event_queue: EventQueue<WaylandAppState>,
    qh: QueueHandle<WaylandAppState>,
}

impl WaylandCompositor {
    /// Connects to `$WAYLAND_DISPLAY` and collects the globals.
    pub fn connect() -> WallpaperResult<Self> {
        let conn = Connection::connect_to_env().map_err(|err| {
            WallpaperError::configuration(format!("cannot connect to a Wayland compositor: {err}"))
        })?;
        let mut event_queue = conn.new_event_queue();
        let qh = event_queue.handle();
        conn.display().get_registry(&qh, ());

        let mut state = WaylandAppState::new();
        info!("Waiting for globals...");
        event_queue
            .roundtrip(&mut state)
            .map_err(dispatch_error)?;
        info!("Globals received.");

        Ok(Self {
            state,
            conn,
            event_queue,
            qh,
        })
    }

    fn create_surface(&mut self, id: OutputId) -> WallpaperResult<()> {
        let Some((compositor, _)) = self.state.compositor.as_ref() else {
            return Err(WallpaperError::configuration("wl_compositor went away"));
        };
        let Some((layer_shell, _)) = self.state.layer_shell.as_ref() else {
            return Err(WallpaperError::configuration("zwlr_layer_shell_v1 went away"));
        };
        let Some(output) = self.state.outputs.get(&id) else {
            return Err(WallpaperError::resource(format!("output {id} is gone")));
        };

        let surface = compositor.create_surface(&self.qh, ());
        let layer_surface = layer_shell.get_layer_surface(
            &surface,
            Some(&output.wl_output),
            zwlr_layer_shell_v1::Layer::Background,
            LAYER_NAMESPACE.to_string(),
            &self.qh,
            id,
        );
        layer_surface.set_exclusive_zone(-1);
        layer_surface.set_anchor(
            zwlr_layer_surface_v1::Anchor::Top
                | zwlr_layer_surface_v1::Anchor::Bottom
                | zwlr_layer_surface_v1::Anchor::Left
                | zwlr_layer_surface_v1::Anchor::Right,
        );
        layer_surface.set_size(0, 0);
        // Buffers are sized in physical pixels.
        surface.set_buffer_scale(output.descriptor.scale.max(1));
        surface.commit();

        debug!(output = id, "Created background surface");
        self.state
            .surfaces
            .insert(id, OutputSurface::new(surface, layer_surface));
        Ok(())
    }

    fn configured_surface(&self, id: OutputId) -> WallpaperResult<&OutputSurface> {
        self.state
            .surfaces
            .get(&id)
            .filter(|surface| surface.configured)
            .ok_or_else(|| {
                WallpaperError::resource(format!("output {id} has no configured surface"))
            })
    }
}

impl Compositor for WaylandCompositor {
    type Buffer = ShmBuffer;

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            compositing: self.state.compositor.is_some(),
            shared_memory: self.state.shm.is_some(),
            background_layer: self.state.layer_shell.is_some(),
        }
    }

    fn outputs(&self) -> Vec<OutputDescriptor> {
        self.state
            .output_order
            .iter()
            .filter_map(|id| self.state.outputs.get(id))
            .map(|output| output.descriptor.clone())
            .collect()
    }

    fn ensure_surface(&mut self, output: OutputId) -> WallpaperResult<()> {
        if !self.state.surfaces.contains_key(&output) {
            self.create_surface(output)?;
        }
        for _ in 0..CONFIGURE_ROUNDTRIPS {
            match self.state.surfaces.get(&output) {
                Some(surface) if surface.configured => {
                    trace!(
                        output,
                        width = surface.width,
                        height = surface.height,
                        "Surface ready"
                    );
                    return Ok(());
                }
                Some(_) => {}
                None => {
                    return Err(WallpaperError::resource(format!(
                        "background surface for output {output} was closed"
                    )));
                }
            }
            self.event_queue
                .roundtrip(&mut self.state)
                .map_err(dispatch_error)?;
        }
        self.configured_surface(output).map(|_| ())
    }

    fn destroy_surface(&mut self, output: OutputId) {
        if self.state.surfaces.remove(&output).is_some() {
            debug!(output, "Destroyed background surface");
        }
    }

    fn allocate_buffer(
        &mut self,
        output: OutputId,
        slot: usize,
        width: u32,
        height: u32,
    ) -> WallpaperResult<ShmBuffer> {
        let Some((shm, _)) = self.state.shm.as_ref() else {
            return Err(WallpaperError::configuration("wl_shm went away"));
        };
        ShmBuffer::new(shm, &self.qh, output, slot, width, height)
    }

    fn present(
        &mut self,
        output: OutputId,
        buffer: &ShmBuffer,
        request_frame: bool,
    ) -> WallpaperResult<()> {
        let surface = &self.configured_surface(output)?.surface;
        surface.attach(Some(buffer.wl_buffer()), 0, 0);
        damage(surface, buffer.width(), buffer.height());
        if request_frame {
            surface.frame(&self.qh, output);
        }
        surface.commit();
        Ok(())
    }

    fn request_frame(&mut self, output: OutputId) -> WallpaperResult<()> {
        let surface = &self.configured_surface(output)?.surface;
        surface.frame(&self.qh, output);
        // A commit without damage may never be repainted, and the callback
        // would not fire.
        damage(surface, 1, 1);
        surface.commit();
        Ok(())
    }

    fn flush(&mut self) -> WallpaperResult<()> {
        match self.conn.flush() {
            Ok(()) => Ok(()),
            Err(WaylandError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(err) => Err(wayland_error(err)),
        }
    }

    fn roundtrip(&mut self) -> WallpaperResult<Vec<ProtocolEvent>> {
        self.event_queue
            .roundtrip(&mut self.state)
            .map_err(dispatch_error)?;
        Ok(self.state.take_events())
    }

    fn blocking_dispatch(
        &mut self,
        timeout: Option<Duration>,
    ) -> WallpaperResult<Vec<ProtocolEvent>> {
        self.event_queue
            .dispatch_pending(&mut self.state)
            .map_err(dispatch_error)?;
        self.flush()?;

        // `None` means events are already queued; they were dispatched above.
        if let Some(guard) = self.event_queue.prepare_read() {
            if poll_readable(guard.connection_fd(), timeout)? {
                match guard.read() {
                    Ok(count) => trace!(count, "Read Wayland events"),
                    Err(WaylandError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => {}
                    Err(err) => return Err(wayland_error(err)),
                }
            }
            // Dropping an unused guard cancels the read.
        }

        self.event_queue
            .dispatch_pending(&mut self.state)
            .map_err(dispatch_error)?;
        self.flush()?;
        Ok(self.state.take_events())
    }
}

/// Waits for the display fd to become readable. Interrupted waits count as
/// "nothing to read".
fn poll_readable(fd: BorrowedFd<'_>, timeout: Option<Duration>) -> WallpaperResult<bool> {
    let timeout_ms = timeout.map_or(-1, |t| i32::try_from(t.as_millis()).unwrap_or(i32::MAX));
    let mut pfd = libc::pollfd {
        fd: fd.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if ret < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err.into());
    }
    if pfd.revents & (libc::POLLERR | libc::POLLHUP) != 0 && pfd.revents & libc::POLLIN == 0 {
        return Err(WallpaperError::protocol("compositor hung up"));
    }
    Ok(ret > 0 && pfd.revents & libc::POLLIN != 0)
}

fn damage(surface: &WlSurface, width: u32, height: u32) {
    let width = i32::try_from(width).unwrap_or(i32::MAX);
    let height = i32::try_from(height).unwrap_or(i32::MAX);
    if surface.version() >= 4 {
        surface.damage_buffer(0, 0, width, height);
    } else {
        surface.damage(0, 0, width, height);
    }
}

fn dispatch_error(err: DispatchError) -> WallpaperError {
    WallpaperError::protocol(format!("Wayland dispatch failed: {err}"))
}

fn wayland_error(err: WaylandError) -> WallpaperError {
    WallpaperError::protocol(format!("Wayland connection failed: {err}"))
}
