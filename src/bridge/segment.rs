//! POSIX shared-memory segments backing the display buffer

use std::collections::HashSet;
use std::ffi::CString;
use std::io::{self, Error, ErrorKind};
use std::ptr;
use std::sync::{Mutex, OnceLock, PoisonError};

use log::{debug, warn};

/// Names of segments this process created and has not yet unlinked or
/// handed to a reader.
static LIVE: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

fn live() -> &'static Mutex<HashSet<String>> {
    LIVE.get_or_init(|| Mutex::new(HashSet::new()))
}

fn track(path: &str) {
    live()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(path.to_string());
}

fn untrack(path: &str) {
    live()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(path);
}

fn unlink(path: &str) {
    if let Ok(c_path) = CString::new(path) {
        let result = unsafe { libc::shm_unlink(c_path.as_ptr()) };
        if result < 0 {
            let err = Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) {
                warn!("shm_unlink({path}) failed: {err}");
            }
        }
    }
}

/// Unlinks every segment still owned by this process.
///
/// Used from the panic hook so `/dev/shm` does not collect leftovers.
pub fn cleanup_all_segments() {
    let paths: Vec<String> = live()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .drain()
        .collect();
    for path in paths {
        unlink(&path);
    }
}

/// Number of segments currently owned by this process.
pub fn live_segments() -> usize {
    live().lock().unwrap_or_else(PoisonError::into_inner).len()
}

/// A named, mapped shared-memory object.
///
/// The segment owns its mapping and, until [`Segment::hand_off`] is called,
/// its name: dropping it unmaps, closes and unlinks.
pub struct Segment {
    path: String,
    ptr: *mut u8,
    size: usize,
    fd: libc::c_int,
    unlink_on_drop: bool,
}

// SAFETY: The segment has exclusive ownership of its mapping.
unsafe impl Send for Segment {}

impl Segment {
    /// Creates and maps a zeroed segment of `size` bytes at `path`.
    ///
    /// Any stale object with the same name is unlinked first.
    pub fn create(path: &str, size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "segment size is zero"));
        }
        let c_path = CString::new(path)
            .map_err(|_| Error::new(ErrorKind::InvalidInput, "path contains null byte"))?;

        unsafe {
            libc::shm_unlink(c_path.as_ptr());
        }

        let fd = unsafe {
            libc::shm_open(
                c_path.as_ptr(),
                libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                (libc::S_IRUSR | libc::S_IWUSR) as libc::c_uint,
            )
        };
        if fd < 0 {
            return Err(Error::last_os_error());
        }

        if unsafe { libc::ftruncate(fd, size as libc::off_t) } < 0 {
            let err = Error::last_os_error();
            unsafe {
                libc::close(fd);
                libc::shm_unlink(c_path.as_ptr());
            }
            return Err(err);
        }

        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            let err = Error::last_os_error();
            unsafe {
                libc::close(fd);
                libc::shm_unlink(c_path.as_ptr());
            }
            return Err(err);
        }

        track(path);
        debug!("created segment {path} ({size} bytes)");

        Ok(Self {
            path: path.to_string(),
            ptr: ptr as *mut u8,
            size,
            fd,
            unlink_on_drop: true,
        })
    }

    /// Creates a segment holding a copy of `data`.
    pub fn with_contents(path: &str, data: &[u8]) -> io::Result<Self> {
        let mut segment = Self::create(path, data.len())?;
        segment.as_mut_slice().copy_from_slice(data);
        Ok(segment)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr maps `size` readable bytes for the lifetime of self.
        unsafe { std::slice::from_raw_parts(self.ptr, self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr maps `size` writable bytes, exclusively borrowed here.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.size) }
    }

    /// Gives the name to a reader that is expected to unlink it, and
    /// returns it. The mapping is released here; the name stays registered
    /// until [`release_name`], so [`cleanup_all_segments`] still reaches it.
    pub fn hand_off(mut self) -> String {
        self.unlink_on_drop = false;
        self.path.clone()
    }
}

/// Unlinks a handed-off name. A reader that got there first is fine.
pub fn release_name(path: &str) {
    unlink(path);
    untrack(path);
}

impl Drop for Segment {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.size);
            }
            self.ptr = ptr::null_mut();
        }

        if self.fd >= 0 {
            unsafe {
                libc::close(self.fd);
            }
            self.fd = -1;
        }

        if self.unlink_on_drop {
            unlink(&self.path);
            untrack(&self.path);
        }
    }
}
