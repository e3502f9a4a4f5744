use std::ffi::CStr;
use std::io;
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd};
use std::ptr::NonNull;

use wayland_client::QueueHandle;
use wayland_client::protocol::{wl_buffer, wl_shm};

use super::WaylandAppState;
use crate::error::{WallpaperError, WallpaperResult};
use crate::protocol::{OutputId, PresentBuffer};
use crate::raster::BYTES_PER_PIXEL;

const MEMFD_NAME: &CStr = c"wallswitch-shm";

/// An ARGB8888 `wl_buffer` backed by an anonymous shared mapping.
pub struct ShmBuffer {
    buffer: wl_buffer::WlBuffer,
    ptr: NonNull<u8>,
    len: usize,
    width: u32,
    height: u32,
    slot: usize,
}

impl ShmBuffer {
    pub(crate) fn new(
        shm: &wl_shm::WlShm,
        qh: &QueueHandle<WaylandAppState>,
        output: OutputId,
        slot: usize,
        width: u32,
        height: u32,
    ) -> WallpaperResult<Self> {
        let stride = width as usize * BYTES_PER_PIXEL;
        let len = stride
            .checked_mul(height as usize)
            .filter(|len| *len > 0 && i32::try_from(*len).is_ok())
            .ok_or_else(|| {
                WallpaperError::resource(format!("{width}x{height} buffer exceeds shm limits"))
            })?;

        let fd = memfd()?;
        if unsafe { libc::ftruncate(fd.as_raw_fd(), len as libc::off_t) } != 0 {
            return Err(io::Error::last_os_error().into());
        }
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error().into());
        }
        let Some(ptr) = NonNull::new(ptr.cast::<u8>()) else {
            return Err(WallpaperError::resource("mmap returned a null mapping"));
        };

        // The compositor keeps its own reference to the pool's memory, so
        // both the pool and our descriptor can go once the buffer exists.
        let pool = shm.create_pool(fd.as_fd(), len as i32, qh, ());
        let buffer = pool.create_buffer(
            0,
            width as i32,
            height as i32,
            stride as i32,
            wl_shm::Format::Argb8888,
            qh,
            (output, slot),
        );
        pool.destroy();

        Ok(Self {
            buffer,
            ptr,
            len,
            width,
            height,
            slot,
        })
    }

    pub(crate) fn wl_buffer(&self) -> &wl_buffer::WlBuffer {
        &self.buffer
    }
}

fn memfd() -> WallpaperResult<OwnedFd> {
    let raw = unsafe { libc::memfd_create(MEMFD_NAME.as_ptr(), libc::MFD_CLOEXEC) };
    if raw < 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(raw) })
}

impl PresentBuffer for ShmBuffer {
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
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for ShmBuffer {
    fn drop(&mut self) {
        self.buffer.destroy();
        let _ = unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) };
    }
}
