//! Owns the compositor connection and one [`OutputController`] per output.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, info_span, warn};

use crate::decode::{Decoders, SharedAnimation};
use crate::error::{WallpaperError, WallpaperResult};
use crate::media::MediaKind;
use crate::output::OutputController;
use crate::output_info::OutputInfo;
use crate::protocol::{Compositor, OutputId, ProtocolEvent};
use crate::raster::Raster;
use crate::request::{WallpaperRequest, WallpaperSource};
use crate::transition::TransitionSpec;

/// How long a blocking wait may run before the stop flag is checked again.
const BLOCKING_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A connected wallpaper session.
///
/// Dropping the session destroys every surface before the connection goes.
pub struct SessionController<C: Compositor> {
    compositor: C,
    decoders: Decoders,
    outputs: BTreeMap<OutputId, OutputController<C::Buffer>>,
    rng: StdRng,
    current: Option<WallpaperRequest>,
    last_error: Option<String>,
}

impl<C: Compositor> SessionController<C> {
    /// Checks the compositor offers everything a wallpaper needs and learns
    /// its outputs.
    pub fn initialize(mut compositor: C, decoders: Decoders) -> WallpaperResult<Self> {
        let missing = compositor.capabilities().missing();
        if !missing.is_empty() {
            return Err(WallpaperError::configuration(format!(
                "compositor does not support {}",
                missing.join(", ")
            )));
        }

        let events = compositor.roundtrip()?;
        let mut session = Self {
            compositor,
            decoders,
            outputs: BTreeMap::new(),
            rng: StdRng::from_rng(&mut rand::rng()),
            current: None,
            last_error: None,
        };
        session.sync_outputs();
        session.handle_events(events, Instant::now());

        info!(outputs = session.outputs.len(), "Session initialized");
        for info in session.list_outputs() {
            info!("Output: {info}");
        }
        Ok(session)
    }

    /// Seeds the generator behind random transition centers.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Configured outputs in the compositor's advertisement order.
    pub fn list_outputs(&self) -> Vec<OutputInfo> {
        self.configured_outputs()
            .into_iter()
            .map(OutputController::info)
            .collect()
    }

    pub fn output(&self, id: OutputId) -> Option<&OutputController<C::Buffer>> {
        self.outputs.get(&id)
    }

    /// Any output still transitioning or animating.
    pub fn is_busy(&self) -> bool {
        self.outputs.values().any(OutputController::is_busy)
    }

    /// The most recent per-output failure, kept until the next change.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Applies `request` to every targeted output and returns without
    /// waiting for transitions or animations.
    ///
    /// A failure on one output is logged and recorded in [`Self::last_error`]
    /// while the others are still attempted; the call fails only when no
    /// output matched or none succeeded.
    pub fn set_wallpaper(&mut self, request: &WallpaperRequest) -> WallpaperResult<()> {
        let _span = info_span!("set_wallpaper", target = %request.target).entered();
        self.last_error = None;

        let targets = self.targets(request);
        if targets.is_empty() {
            let err = WallpaperError::configuration(format!(
                "no configured output matches {}",
                request.target
            ));
            self.last_error = Some(err.to_string());
            return Err(err);
        }

        let animated = match &request.source {
            WallpaperSource::File(path) => match MediaKind::detect(path) {
                Ok(kind) => kind.is_animated(),
                Err(err) => {
                    self.last_error = Some(err.to_string());
                    return Err(err);
                }
            },
            WallpaperSource::SolidColor(_) => false,
        };

        let now = Instant::now();
        let mut applied = 0;
        let mut failure = None;
        for id in targets {
            match self.apply_to(id, request, animated, now) {
                Ok(()) => applied += 1,
                Err(err) if err.is_recoverable() => {
                    warn!(output = id, "Failed to set wallpaper: {err}");
                    self.last_error = Some(err.to_string());
                    failure = Some(err);
                }
                Err(err) => {
                    self.last_error = Some(err.to_string());
                    return Err(err);
                }
            }
        }
        if let Err(err) = self.compositor.flush() {
            self.last_error = Some(err.to_string());
            return Err(err);
        }

        if applied == 0 {
            return Err(failure
                .unwrap_or_else(|| WallpaperError::resource("no output accepted the wallpaper")));
        }
        self.current = Some(request.clone());
        Ok(())
    }

    /// Applies `request`, then serves protocol events until `running` is
    /// cleared or the connection fails.
    pub fn set_wallpaper_blocking(
        &mut self,
        request: &WallpaperRequest,
        running: &AtomicBool,
    ) -> WallpaperResult<()> {
        self.set_wallpaper(request)?;
        while running.load(Ordering::Relaxed) {
            let events = self
                .compositor
                .blocking_dispatch(Some(BLOCKING_POLL_INTERVAL))?;
            self.handle_events(events, Instant::now());
        }
        debug!("Stopped serving events");
        Ok(())
    }

    /// Processes whatever the compositor has sent, without blocking.
    pub fn dispatch_pending_events(&mut self) -> WallpaperResult<()> {
        self.dispatch_pending_events_at(Instant::now())
    }

    /// [`Self::dispatch_pending_events`] with an explicit clock, so frame
    /// pacing can be driven deterministically.
    pub fn dispatch_pending_events_at(&mut self, now: Instant) -> WallpaperResult<()> {
        let events = self.compositor.dispatch_pending()?;
        self.handle_events(events, now);
        self.compositor.flush()
    }

    /// Destroys every surface and closes the connection.
    pub fn teardown(mut self) {
        self.release_outputs();
    }

    fn release_outputs(&mut self) {
        for (id, _) in std::mem::take(&mut self.outputs) {
            self.compositor.destroy_surface(id);
        }
        if let Err(err) = self.compositor.flush() {
            debug!("Flush during teardown failed: {err}");
        }
    }

    fn configured_outputs(&self) -> Vec<&OutputController<C::Buffer>> {
        self.compositor
            .outputs()
            .iter()
            .filter_map(|descriptor| self.outputs.get(&descriptor.id))
            .filter(|output| output.is_configured())
            .collect()
    }

    /// Configured outputs selected by the request, in advertisement order.
    /// Indices count configured outputs only, matching [`Self::list_outputs`].
    fn targets(&self, request: &WallpaperRequest) -> Vec<OutputId> {
        self.configured_outputs()
            .into_iter()
            .enumerate()
            .filter(|(index, output)| {
                let descriptor = output.descriptor();
                request.target.selects(
                    *index,
                    descriptor.name.as_deref().unwrap_or_default(),
                    descriptor.model.as_deref(),
                )
            })
            .map(|(_, output)| output.id())
            .collect()
    }

    fn apply_to(
        &mut self,
        id: OutputId,
        request: &WallpaperRequest,
        animated: bool,
        now: Instant,
    ) -> WallpaperResult<()> {
        // A surface that cannot be set up only costs this output its wallpaper;
        // a dead connection still surfaces through the flush that follows.
        self.compositor.ensure_surface(id).map_err(|err| match err {
            WallpaperError::Protocol(msg) => {
                WallpaperError::resource(format!("output {id}: {msg}"))
            }
            err => err,
        })?;
        let Some(output) = self.outputs.get_mut(&id) else {
            return Err(WallpaperError::resource(format!("output {id} disappeared")));
        };
        let (width, height) = output.size();

        match &request.source {
            WallpaperSource::SolidColor(color) => {
                let raster = Raster::filled(width, height, *color)?;
                output.set_image(
                    &mut self.compositor,
                    raster,
                    Some(request.transition),
                    &mut self.rng,
                    now,
                )
            }
            WallpaperSource::File(path) if animated => {
                let mut source =
                    self.decoders
                        .animation
                        .open(path, width, height, request.looping)?;
                let first = source
                    .next_frame()?
                    .ok_or_else(|| WallpaperError::decode("animation has no frames"))?;
                output.set_animation(&mut self.compositor, SharedAnimation::new(source), first, now)
            }
            WallpaperSource::File(path) => {
                let raster = self.decoders.image.decode(
                    path,
                    width,
                    height,
                    request.scale_mode,
                    request.background,
                )?;
                output.set_image(
                    &mut self.compositor,
                    raster,
                    Some(request.transition),
                    &mut self.rng,
                    now,
                )
            }
        }
    }

    fn handle_events(&mut self, events: Vec<ProtocolEvent>, now: Instant) {
        let mut outputs_changed = false;
        for event in events {
            match event {
                ProtocolEvent::FrameDone(id) => {
                    let Some(output) = self.outputs.get_mut(&id) else {
                        continue;
                    };
                    if let Err(err) = output.on_frame(&mut self.compositor, now) {
                        warn!(output = id, "Frame update failed: {err}");
                        self.last_error = Some(err.to_string());
                    }
                }
                ProtocolEvent::BufferReleased { output, slot } => {
                    if let Some(output) = self.outputs.get_mut(&output) {
                        output.mark_released(slot);
                    }
                }
                ProtocolEvent::OutputRemoved(id) | ProtocolEvent::SurfaceClosed(id) => {
                    if let Some(output) = self.outputs.remove(&id) {
                        info!(output = %output.name(), "Output gone, dropping its wallpaper");
                        self.compositor.destroy_surface(id);
                    }
                }
                ProtocolEvent::OutputsChanged => outputs_changed = true,
            }
        }

        if outputs_changed {
            let refreshed = self.sync_outputs();
            self.refresh(&refreshed, now);
        }
    }

    /// Mirrors the compositor's output list. Returns outputs that became
    /// usable or were resized.
    fn sync_outputs(&mut self) -> Vec<OutputId> {
        let descriptors = self.compositor.outputs();

        let stale: Vec<OutputId> = self
            .outputs
            .keys()
            .filter(|id| !descriptors.iter().any(|d| d.id == **id))
            .copied()
            .collect();
        for id in stale {
            self.outputs.remove(&id);
            self.compositor.destroy_surface(id);
        }

        let mut refreshed = Vec::new();
        for descriptor in descriptors {
            let id = descriptor.id;
            match self.outputs.get_mut(&id) {
                Some(output) => {
                    if output.update_descriptor(descriptor) {
                        refreshed.push(id);
                    }
                }
                None => {
                    let output = OutputController::new(descriptor);
                    if output.is_configured() {
                        info!("Output added: {}", output.info());
                        refreshed.push(id);
                    }
                    self.outputs.insert(id, output);
                }
            }
        }
        refreshed
    }

    /// Redraws the current wallpaper on outputs that appeared or resized.
    fn refresh(&mut self, refreshed: &[OutputId], now: Instant) {
        let Some(request) = self.current.clone() else {
            return;
        };
        let request = request.transition(TransitionSpec::NONE);
        let animated = match &request.source {
            WallpaperSource::File(path) => {
                MediaKind::from_extension(path).is_some_and(MediaKind::is_animated)
            }
            WallpaperSource::SolidColor(_) => false,
        };

        for id in self.targets(&request) {
            if !refreshed.contains(&id) {
                continue;
            }
            if let Err(err) = self.apply_to(id, &request, animated, now) {
                warn!(output = id, "Failed to refresh wallpaper: {err}");
                self.last_error = Some(err.to_string());
            }
        }
    }
}

impl<C: Compositor> Drop for SessionController<C> {
    fn drop(&mut self) {
        self.release_outputs();
    }
}

impl<C: Compositor> fmt::Debug for SessionController<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("outputs", &self.outputs.keys().collect::<Vec<_>>())
            .field("busy", &self.is_busy())
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}
