//! Per-output wallpaper state: what is on screen, what is animating towards
//! it, and the two shared buffers it is drawn through.

use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info, trace, warn};

use crate::decode::SharedAnimation;
use crate::error::{WallpaperError, WallpaperResult};
use crate::output_info::OutputInfo;
use crate::protocol::{Compositor, OutputDescriptor, OutputId, PresentBuffer};
use crate::raster::{Raster, write_argb8888};
use crate::transition::{TransitionSession, TransitionSpec};

const SLOT_COUNT: usize = 2;

struct Slot<B> {
    buffer: Option<B>,
    /// Attached and not yet released by the compositor.
    busy: bool,
    presented_at: u64,
}

impl<B> Default for Slot<B> {
    fn default() -> Self {
        Self {
            buffer: None,
            busy: false,
            presented_at: 0,
        }
    }
}

/// Double-buffered presentation onto one output's surface.
struct Presenter<B> {
    slots: [Slot<B>; SLOT_COUNT],
    frame_pending: bool,
    presents: u64,
}

impl<B: PresentBuffer> Presenter<B> {
    fn new() -> Self {
        Self {
            slots: Default::default(),
            frame_pending: false,
            presents: 0,
        }
    }

    /// A slot the compositor is not reading from, else the one presented
    /// longest ago.
    fn pick_slot(&self) -> usize {
        let by_age = |a: &usize, b: &usize| {
            self.slots[*a]
                .presented_at
                .cmp(&self.slots[*b].presented_at)
        };
        (0..SLOT_COUNT)
            .filter(|i| !self.slots[*i].busy)
            .min_by(by_age)
            .or_else(|| (0..SLOT_COUNT).min_by(by_age))
            .unwrap_or(0)
    }

    fn present<C>(
        &mut self,
        compositor: &mut C,
        output: OutputId,
        raster: &Raster,
        request_frame: bool,
    ) -> WallpaperResult<()>
    where
        C: Compositor<Buffer = B>,
    {
        let index = self.pick_slot();
        let slot = &mut self.slots[index];

        let fits = slot
            .buffer
            .as_ref()
            .is_some_and(|b| (b.width(), b.height()) == raster.size());
        if !fits {
            // Release the old mapping before asking for a new one.
            slot.buffer = None;
            debug!(
                output,
                slot = index,
                width = raster.width(),
                height = raster.height(),
                "Allocating buffer"
            );
            slot.buffer = Some(compositor.allocate_buffer(
                output,
                index,
                raster.width(),
                raster.height(),
            )?);
        }
        let Some(buffer) = slot.buffer.as_mut() else {
            return Err(WallpaperError::resource("buffer slot is empty"));
        };
        write_argb8888(raster, buffer.data_mut())?;

        let arm = request_frame && !self.frame_pending;
        compositor.present(output, buffer, arm)?;
        self.presents += 1;
        slot.busy = true;
        slot.presented_at = self.presents;
        if arm {
            self.frame_pending = true;
        }
        Ok(())
    }

    fn request_frame<C: Compositor<Buffer = B>>(
        &mut self,
        compositor: &mut C,
        output: OutputId,
    ) -> WallpaperResult<()> {
        if !self.frame_pending {
            compositor.request_frame(output)?;
            self.frame_pending = true;
        }
        Ok(())
    }
}

struct ActiveTransition {
    session: TransitionSession,
    last_tick: Instant,
    min_interval: Option<Duration>,
}

struct ActiveAnimation {
    source: SharedAnimation,
    next_due: Instant,
}

pub struct OutputController<B> {
    descriptor: OutputDescriptor,
    presenter: Presenter<B>,
    displayed: Option<Raster>,
    transition: Option<ActiveTransition>,
    animation: Option<ActiveAnimation>,
}

impl<B: PresentBuffer> OutputController<B> {
    pub fn new(descriptor: OutputDescriptor) -> Self {
        Self {
            descriptor,
            presenter: Presenter::new(),
            displayed: None,
            transition: None,
            animation: None,
        }
    }

    pub fn id(&self) -> OutputId {
        self.descriptor.id
    }

    pub fn name(&self) -> String {
        self.descriptor.display_name()
    }

    pub fn descriptor(&self) -> &OutputDescriptor {
        &self.descriptor
    }

    pub fn info(&self) -> OutputInfo {
        self.descriptor.info()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.descriptor.width, self.descriptor.height)
    }

    pub fn is_configured(&self) -> bool {
        self.descriptor.is_usable()
    }

    /// A transition or animation is still producing frames.
    pub fn is_busy(&self) -> bool {
        self.transition.is_some() || self.animation.is_some()
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// The raster the output shows, or will show once its transition ends.
    pub fn displayed(&self) -> Option<&Raster> {
        self.displayed.as_ref()
    }

    /// Takes in fresh output state. Returns whether the output just became
    /// usable or changed size, in which case its wallpaper must be redrawn.
    pub fn update_descriptor(&mut self, descriptor: OutputDescriptor) -> bool {
        let was_usable = self.descriptor.is_usable();
        let resized = (descriptor.width, descriptor.height) != self.size();
        self.descriptor = descriptor;

        if resized && self.transition.take().is_some() {
            debug!(output = %self.name(), "Output resized, dropping transition");
        }
        self.is_configured() && (!was_usable || resized)
    }

    /// Shows `raster`, through a transition when one is requested and the
    /// current frame can be blended with it.
    pub fn set_image<C, R>(
        &mut self,
        compositor: &mut C,
        raster: Raster,
        transition: Option<TransitionSpec>,
        rng: &mut R,
        now: Instant,
    ) -> WallpaperResult<()>
    where
        C: Compositor<Buffer = B>,
        R: Rng,
    {
        let id = self.id();
        let spec = transition.filter(TransitionSpec::is_enabled);

        // Whatever is on screen stays in place until the replacement is up.
        let on_screen = self
            .transition
            .as_ref()
            .map(|active| active.session.output())
            .or(self.displayed.as_ref());

        let session = match (spec, on_screen) {
            (Some(spec), Some(old)) => {
                if old.size() == raster.size() && raster.size() == self.size() {
                    let (width, height) = raster.size();
                    let mut session =
                        TransitionSession::new(spec.kind, spec.duration, width, height)?;
                    session.start(old, &raster, rng)?;
                    Some((session, spec))
                } else {
                    let err = WallpaperError::dimension_mismatch(old.size(), raster.size());
                    warn!(output = %self.name(), "{err}; switching without transition");
                    None
                }
            }
            _ => None,
        };

        let transition = match session {
            Some((mut session, spec)) => {
                if let Some(frame) = session.update(0.0).frame {
                    self.presenter.present(compositor, id, frame, true)?;
                }
                info!(
                    output = %self.name(),
                    kind = %spec.kind,
                    duration = spec.duration,
                    "Starting transition"
                );
                Some(ActiveTransition {
                    session,
                    last_tick: now,
                    min_interval: (spec.fps > 0)
                        .then(|| Duration::from_secs_f64(1.0 / f64::from(spec.fps))),
                })
            }
            None => {
                self.presenter.present(compositor, id, &raster, false)?;
                None
            }
        };
        self.animation = None;
        self.transition = transition;
        self.displayed = Some(raster);
        Ok(())
    }

    /// Starts decoder-paced playback with `first_frame` already pulled from
    /// `source`.
    pub fn set_animation<C>(
        &mut self,
        compositor: &mut C,
        source: SharedAnimation,
        first_frame: Raster,
        now: Instant,
    ) -> WallpaperResult<()>
    where
        C: Compositor<Buffer = B>,
    {
        self.transition = None;
        self.animation = None;
        self.presenter
            .present(compositor, self.descriptor.id, &first_frame, true)?;

        let delay = source.lock().frame_duration();
        info!(output = %self.name(), ?delay, "Starting animation");
        self.animation = Some(ActiveAnimation {
            source,
            next_due: now + delay,
        });
        self.displayed = Some(first_frame);
        Ok(())
    }

    /// Handles the frame callback: steps the transition or animation and
    /// presents the next frame.
    pub fn on_frame<C>(&mut self, compositor: &mut C, now: Instant) -> WallpaperResult<()>
    where
        C: Compositor<Buffer = B>,
    {
        let id = self.descriptor.id;
        self.presenter.frame_pending = false;

        if let Some(active) = self.transition.as_mut() {
            let dt = now.saturating_duration_since(active.last_tick);
            if active.min_interval.is_some_and(|min| dt < min) {
                return self.presenter.request_frame(compositor, id);
            }
            active.last_tick = now;

            let step = active.session.update(dt.as_secs_f32());
            let still_active = step.active;
            if let Some(frame) = step.frame {
                trace!(output = id, "Transition frame");
                self.presenter.present(compositor, id, frame, still_active)?;
            }
            if !still_active {
                self.transition = None;
                info!(output = %self.name(), "Transition finished");
            }
            return Ok(());
        }

        let Some(animation) = self.animation.as_mut() else {
            return Ok(());
        };
        if now < animation.next_due {
            return self.presenter.request_frame(compositor, id);
        }

        let mut source = animation.source.lock();
        let next = source.next_frame();
        let delay = source.frame_duration();
        drop(source);

        match next {
            Ok(Some(frame)) => {
                animation.next_due = now + delay;
                self.presenter.present(compositor, id, &frame, true)?;
                self.displayed = Some(frame);
            }
            Ok(None) => {
                self.animation = None;
                info!(output = %self.name(), "Animation finished");
            }
            Err(err) => {
                self.animation = None;
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn mark_released(&mut self, slot: usize) {
        if let Some(slot) = self.presenter.slots.get_mut(slot) {
            slot.busy = false;
        }
    }

    pub fn has_pending_frame(&self) -> bool {
        self.presenter.frame_pending
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::color::Rgba;
    use crate::protocol::{Capabilities, ProtocolEvent};
    use crate::transition::TransitionKind;

    struct TestBuffer {
        slot: usize,
        width: u32,
        height: u32,
        data: Vec<u8>,
    }

    impl PresentBuffer for TestBuffer {
        fn width(&self) -> u32 {
            self.width
        }
        fn height(&self) -> u32 {
            self.height
        }
        fn slot(&self) -> usize {
            self.slot
        }
        fn data_mut(&mut self) -> &mut [u8] {
            &mut self.data
        }
    }

    #[derive(Default)]
    struct Recorder {
        allocations: Vec<(usize, u32, u32)>,
        presents: Vec<(usize, [u8; 4], bool)>,
        frame_requests: usize,
        fail_present: bool,
    }

    impl Compositor for Recorder {
        type Buffer = TestBuffer;

        fn capabilities(&self) -> Capabilities {
            Capabilities::ALL
        }
        fn outputs(&self) -> Vec<OutputDescriptor> {
            Vec::new()
        }
        fn ensure_surface(&mut self, _: OutputId) -> WallpaperResult<()> {
            Ok(())
        }
        fn destroy_surface(&mut self, _: OutputId) {}
        fn allocate_buffer(
            &mut self,
            _: OutputId,
            slot: usize,
            width: u32,
            height: u32,
        ) -> WallpaperResult<TestBuffer> {
            self.allocations.push((slot, width, height));
            Ok(TestBuffer {
                slot,
                width,
                height,
                data: vec![0; (width * height * 4) as usize],
            })
        }
        fn present(
            &mut self,
            _: OutputId,
            buffer: &TestBuffer,
            request_frame: bool,
        ) -> WallpaperResult<()> {
            if self.fail_present {
                return Err(WallpaperError::resource("attach failed"));
            }
            let d = &buffer.data;
            self.presents
                .push((buffer.slot, [d[2], d[1], d[0], d[3]], request_frame));
            Ok(())
        }
        fn request_frame(&mut self, _: OutputId) -> WallpaperResult<()> {
            self.frame_requests += 1;
            Ok(())
        }
        fn flush(&mut self) -> WallpaperResult<()> {
            Ok(())
        }
        fn roundtrip(&mut self) -> WallpaperResult<Vec<ProtocolEvent>> {
            Ok(Vec::new())
        }
        fn blocking_dispatch(
            &mut self,
            _: Option<Duration>,
        ) -> WallpaperResult<Vec<ProtocolEvent>> {
            Ok(Vec::new())
        }
    }

    fn controller(width: u32, height: u32) -> OutputController<TestBuffer> {
        OutputController::new(OutputDescriptor {
            id: 1,
            name: Some("DP-1".into()),
            width,
            height,
            done: true,
            ..Default::default()
        })
    }

    fn solid(width: u32, height: u32, value: u8) -> Raster {
        Raster::filled(width, height, Rgba::opaque(value, value, value)).unwrap()
    }

    #[test]
    fn first_image_is_presented_immediately() {
        let mut compositor = Recorder::default();
        let mut output = controller(4, 4);
        let mut rng = StdRng::seed_from_u64(1);
        let fade = TransitionSpec::new(TransitionKind::Fade, 1.0);

        output
            .set_image(&mut compositor, solid(4, 4, 200), Some(fade), &mut rng, Instant::now())
            .unwrap();

        assert_eq!(compositor.presents, vec![(0, [200, 200, 200, 255], false)]);
        assert!(!output.is_busy());
        assert_eq!(output.displayed().unwrap().pixel(0, 0), [200, 200, 200, 255]);
    }

    #[test]
    fn transition_runs_to_completion_on_frame_callbacks() {
        let mut compositor = Recorder::default();
        let mut output = controller(4, 4);
        let mut rng = StdRng::seed_from_u64(1);
        let start = Instant::now();

        output
            .set_image(&mut compositor, solid(4, 4, 0), None, &mut rng, start)
            .unwrap();
        let fade = TransitionSpec::new(TransitionKind::Fade, 1.0);
        output
            .set_image(&mut compositor, solid(4, 4, 255), Some(fade), &mut rng, start)
            .unwrap();
        assert!(output.is_transitioning());
        assert!(output.has_pending_frame());
        // First frame equals the old raster.
        assert_eq!(compositor.presents[1], (1, [0, 0, 0, 255], true));

        output.mark_released(0);
        output
            .on_frame(&mut compositor, start + Duration::from_millis(500))
            .unwrap();
        let (_, px, armed) = compositor.presents[2];
        assert_eq!(px[0], 127);
        assert!(armed);

        output
            .on_frame(&mut compositor, start + Duration::from_millis(1100))
            .unwrap();
        let (_, px, armed) = *compositor.presents.last().unwrap();
        assert_eq!(px, [255, 255, 255, 255]);
        assert!(!armed);
        assert!(!output.is_busy());
    }

    #[test]
    fn fps_cap_rearms_without_stepping() {
        let mut compositor = Recorder::default();
        let mut output = controller(2, 2);
        let mut rng = StdRng::seed_from_u64(1);
        let start = Instant::now();

        output
            .set_image(&mut compositor, solid(2, 2, 0), None, &mut rng, start)
            .unwrap();
        let spec = TransitionSpec::new(TransitionKind::Fade, 1.0).with_fps(10);
        output
            .set_image(&mut compositor, solid(2, 2, 255), Some(spec), &mut rng, start)
            .unwrap();
        let presented = compositor.presents.len();

        output
            .on_frame(&mut compositor, start + Duration::from_millis(16))
            .unwrap();
        assert_eq!(compositor.presents.len(), presented);
        assert_eq!(compositor.frame_requests, 1);
        assert!(output.has_pending_frame());

        output
            .on_frame(&mut compositor, start + Duration::from_millis(120))
            .unwrap();
        assert_eq!(compositor.presents.len(), presented + 1);
    }

    #[test]
    fn new_request_supersedes_transition_from_current_frame() {
        let mut compositor = Recorder::default();
        let mut output = controller(2, 2);
        let mut rng = StdRng::seed_from_u64(1);
        let start = Instant::now();
        let fade = TransitionSpec::new(TransitionKind::Fade, 1.0);

        output
            .set_image(&mut compositor, solid(2, 2, 0), None, &mut rng, start)
            .unwrap();
        output
            .set_image(&mut compositor, solid(2, 2, 255), Some(fade), &mut rng, start)
            .unwrap();
        output
            .on_frame(&mut compositor, start + Duration::from_millis(500))
            .unwrap();
        let mid = compositor.presents.last().unwrap().1;

        output
            .set_image(&mut compositor, solid(2, 2, 50), Some(fade), &mut rng, start)
            .unwrap();
        // The new transition starts from what was on screen mid-fade.
        assert_eq!(compositor.presents.last().unwrap().1, mid);
        assert_eq!(output.displayed().unwrap().pixel(0, 0)[0], 50);
    }

    #[test]
    fn failed_present_keeps_the_running_transition() {
        let mut compositor = Recorder::default();
        let mut output = controller(2, 2);
        let mut rng = StdRng::seed_from_u64(1);
        let start = Instant::now();
        let fade = TransitionSpec::new(TransitionKind::Fade, 1.0);

        output
            .set_image(&mut compositor, solid(2, 2, 0), None, &mut rng, start)
            .unwrap();
        output
            .set_image(&mut compositor, solid(2, 2, 255), Some(fade), &mut rng, start)
            .unwrap();

        compositor.fail_present = true;
        let err = output
            .set_image(&mut compositor, solid(2, 2, 50), Some(fade), &mut rng, start)
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(output.is_transitioning());
        assert_eq!(output.displayed().unwrap().pixel(0, 0)[0], 255);

        compositor.fail_present = false;
        output
            .on_frame(&mut compositor, start + Duration::from_millis(1100))
            .unwrap();
        assert_eq!(compositor.presents.last().unwrap().1, [255, 255, 255, 255]);
        assert!(!output.is_busy());
    }

    #[test]
    fn mismatched_raster_skips_transition() {
        let mut compositor = Recorder::default();
        let mut output = controller(4, 4);
        let mut rng = StdRng::seed_from_u64(1);
        let now = Instant::now();
        let fade = TransitionSpec::new(TransitionKind::Fade, 1.0);

        output
            .set_image(&mut compositor, solid(4, 4, 0), None, &mut rng, now)
            .unwrap();
        output
            .set_image(&mut compositor, solid(2, 2, 255), Some(fade), &mut rng, now)
            .unwrap();

        assert!(!output.is_transitioning());
        assert_eq!(compositor.presents.last().unwrap().1, [255, 255, 255, 255]);
        assert_eq!(compositor.allocations.last(), Some(&(1, 2, 2)));
    }

    #[test]
    fn both_slots_busy_reuses_oldest() {
        let mut compositor = Recorder::default();
        let mut output = controller(2, 2);
        let mut rng = StdRng::seed_from_u64(1);
        let now = Instant::now();

        for value in [10, 20, 30] {
            output
                .set_image(&mut compositor, solid(2, 2, value), None, &mut rng, now)
                .unwrap();
        }
        let slots: Vec<usize> = compositor.presents.iter().map(|p| p.0).collect();
        assert_eq!(slots, vec![0, 1, 0]);
        assert_eq!(compositor.allocations.len(), 2);

        output.mark_released(1);
        output
            .set_image(&mut compositor, solid(2, 2, 40), None, &mut rng, now)
            .unwrap();
        assert_eq!(compositor.presents.last().unwrap().0, 1);
    }

    #[test]
    fn descriptor_updates_report_redraws() {
        let mut output = controller(0, 0);
        assert!(!output.is_configured());

        let mut descriptor = output.descriptor().clone();
        descriptor.width = 800;
        descriptor.height = 600;
        assert!(output.update_descriptor(descriptor.clone()));
        assert!(!output.update_descriptor(descriptor.clone()));

        descriptor.width = 1024;
        assert!(output.update_descriptor(descriptor));
    }
}
