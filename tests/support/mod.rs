//! An in-memory compositor for driving sessions without a display.

#![allow(dead_code)]

use std::cell::{RefCell, RefMut};
use std::collections::BTreeSet;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use wallswitch::WallpaperResult;
use wallswitch::error::WallpaperError;
use wallswitch::protocol::{
    Capabilities, Compositor, OutputDescriptor, OutputId, PresentBuffer, ProtocolEvent,
};

pub struct MockBuffer {
    slot: usize,
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PresentBuffer for MockBuffer {
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

/// One attach+commit as the compositor saw it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Present {
    pub output: OutputId,
    pub slot: usize,
    /// Top-left pixel, converted back to RGBA.
    pub first_pixel: [u8; 4],
    pub frame_requested: bool,
}

#[derive(Default)]
pub struct MockState {
    pub capabilities: Capabilities,
    pub outputs: Vec<OutputDescriptor>,
    pub pending: Vec<ProtocolEvent>,
    pub surfaces: BTreeSet<OutputId>,
    pub destroyed: Vec<OutputId>,
    /// Outputs whose surface can never be created.
    pub broken: BTreeSet<OutputId>,
    /// Outputs whose surface setup fails at the protocol level.
    pub unconfigured: BTreeSet<OutputId>,
    pub presents: Vec<Present>,
    pub frame_requests: Vec<OutputId>,
    pub flushes: usize,
    /// Cleared once this many buffers have been presented.
    pub stop_after: Option<(usize, Rc<AtomicBool>)>,
}

impl MockState {
    pub fn presents_on(&self, output: OutputId) -> Vec<&Present> {
        self.presents.iter().filter(|p| p.output == output).collect()
    }
}

/// Cheap to clone; clones share one [`MockState`] so a test can keep a
/// handle after the session takes ownership.
#[derive(Clone, Default)]
pub struct MockCompositor {
    state: Rc<RefCell<MockState>>,
}

impl MockCompositor {
    pub fn new(outputs: Vec<OutputDescriptor>) -> Self {
        let mock = Self::default();
        {
            let mut state = mock.state();
            state.capabilities = Capabilities::ALL;
            state.outputs = outputs;
        }
        mock
    }

    pub fn state(&self) -> RefMut<'_, MockState> {
        self.state.borrow_mut()
    }

    pub fn push_event(&self, event: ProtocolEvent) {
        self.state().pending.push(event);
    }
}

impl Compositor for MockCompositor {
    type Buffer = MockBuffer;

    fn capabilities(&self) -> Capabilities {
        self.state.borrow().capabilities
    }

    fn outputs(&self) -> Vec<OutputDescriptor> {
        self.state.borrow().outputs.clone()
    }

    fn ensure_surface(&mut self, output: OutputId) -> WallpaperResult<()> {
        let mut state = self.state();
        if state.broken.contains(&output) {
            return Err(WallpaperError::resource(format!(
                "no surface for output {output}"
            )));
        }
        if state.unconfigured.contains(&output) {
            return Err(WallpaperError::protocol(format!(
                "output {output} has no configured surface"
            )));
        }
        state.surfaces.insert(output);
        Ok(())
    }

    fn destroy_surface(&mut self, output: OutputId) {
        let mut state = self.state();
        if state.surfaces.remove(&output) {
            state.destroyed.push(output);
        }
    }

    fn allocate_buffer(
        &mut self,
        _output: OutputId,
        slot: usize,
        width: u32,
        height: u32,
    ) -> WallpaperResult<MockBuffer> {
        Ok(MockBuffer {
            slot,
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        })
    }

    fn present(
        &mut self,
        output: OutputId,
        buffer: &MockBuffer,
        request_frame: bool,
    ) -> WallpaperResult<()> {
        let d = &buffer.data;
        let mut state = self.state();
        state.presents.push(Present {
            output,
            slot: buffer.slot,
            first_pixel: [d[2], d[1], d[0], d[3]],
            frame_requested: request_frame,
        });
        if let Some((limit, running)) = &state.stop_after {
            if state.presents.len() >= *limit {
                running.store(false, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    fn request_frame(&mut self, output: OutputId) -> WallpaperResult<()> {
        self.state().frame_requests.push(output);
        Ok(())
    }

    fn flush(&mut self) -> WallpaperResult<()> {
        self.state().flushes += 1;
        Ok(())
    }

    fn roundtrip(&mut self) -> WallpaperResult<Vec<ProtocolEvent>> {
        Ok(std::mem::take(&mut self.state().pending))
    }

    fn blocking_dispatch(
        &mut self,
        _timeout: Option<Duration>,
    ) -> WallpaperResult<Vec<ProtocolEvent>> {
        Ok(std::mem::take(&mut self.state().pending))
    }
}

pub fn output(id: OutputId, name: &str, width: u32, height: u32) -> OutputDescriptor {
    OutputDescriptor {
        id,
        name: Some(name.to_string()),
        model: None,
        width,
        height,
        refresh_mhz: 60_000,
        scale: 1,
        done: true,
    }
}
