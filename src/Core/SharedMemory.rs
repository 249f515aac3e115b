// Shared memory backend abstraction for Linux.
// Uses POSIX shm_open + mmap so that independent processes can resolve the
// same region purely by name, without inheriting a file descriptor.

use std::ffi::CString;
use std::io;
use std::ptr;
use std::ptr::NonNull;

use crate::logging;

/// Shared memory backend trait for cross-platform memory mapping.
pub trait SharedMemoryBackend: Send + Sync {
    /// Get a pointer to the mapped memory region.
    fn as_ptr(&self) -> *mut u8;

    /// Get the size of the mapped region in bytes.
    fn size(&self) -> usize;

    /// Get the underlying file descriptor.
    fn raw_handle(&self) -> RawHandle;
}

/// Platform-specific handle type.
#[derive(Debug, Clone, Copy)]
pub enum RawHandle {
    /// Unix file descriptor (Linux).
    Fd(i32),
}

/// Attach to the named region, creating and zero-sizing it if absent.
///
/// Race-safe: if two processes race to create the same name, exactly one
/// wins the `O_CREAT | O_EXCL` open and the other falls back to a plain
/// attach of the region the winner just sized.
#[cfg(target_os = "linux")]
pub fn create_shared_memory(size: usize, name: &str) -> io::Result<Box<dyn SharedMemoryBackend>> {
    LinuxSharedMemory::open_or_create(name, size).map(|shm| Box::new(shm) as Box<dyn SharedMemoryBackend>)
}

/// Attach to an existing named region. Fails if it does not already exist.
#[cfg(target_os = "linux")]
pub fn attach_shared_memory(name: &str, size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    LinuxSharedMemory::attach(name, size).map(|shm| Box::new(shm) as Box<dyn SharedMemoryBackend>)
}

/// Mark a named region for removal. Already-attached processes keep their
/// mapping until they detach; later `open_or_create` calls for the same name
/// start fresh.
#[cfg(target_os = "linux")]
pub fn unlink_shared_memory(name: &str) -> io::Result<()> {
    LinuxSharedMemory::unlink(name)
}

#[cfg(not(target_os = "linux"))]
pub fn create_shared_memory(_size: usize, _name: &str) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Shared memory only supported on Linux",
    ))
}

#[cfg(not(target_os = "linux"))]
pub fn attach_shared_memory(_name: &str, _size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Shared memory only supported on Linux",
    ))
}

#[cfg(not(target_os = "linux"))]
pub fn unlink_shared_memory(_name: &str) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Shared memory only supported on Linux",
    ))
}

#[cfg(target_os = "linux")]
use libc::c_void;
#[cfg(target_os = "linux")]
use std::os::unix::io::RawFd;

#[cfg(target_os = "linux")]
fn shm_name(name: &str) -> io::Result<CString> {
    CString::new(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "shared memory name contains a NUL byte"))
}

#[cfg(target_os = "linux")]
pub struct LinuxSharedMemory {
    ptr: NonNull<u8>,
    size: usize,
    fd: RawFd,
}

#[cfg(target_os = "linux")]
unsafe impl Send for LinuxSharedMemory {}
#[cfg(target_os = "linux")]
unsafe impl Sync for LinuxSharedMemory {}

#[cfg(target_os = "linux")]
impl LinuxSharedMemory {
    pub fn open_or_create(name: &str, size: usize) -> io::Result<Self> {
        let c_name = shm_name(name)?;

        let created_fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o600,
            )
        };

        if created_fd >= 0 {
            if unsafe { libc::ftruncate(created_fd, size as libc::off_t) } != 0 {
                let err = io::Error::last_os_error();
                unsafe {
                    libc::close(created_fd);
                    let _ = libc::shm_unlink(c_name.as_ptr());
                }
                return Err(err);
            }
            logging::log_info(&format!("shared memory '{name}' created ({size} bytes)"));
            return Self::map(created_fd, size);
        }

        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::AlreadyExists {
            return Err(err);
        }

        // Lost the create race (or a prior run left the region behind); attach instead.
        logging::log_info(&format!("shared memory '{name}' already exists, attaching"));
        Self::attach(name, size)
    }

    pub fn attach(name: &str, size: usize) -> io::Result<Self> {
        let c_name = shm_name(name)?;
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0o600) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Self::map(fd, size)
    }

    pub fn unlink(name: &str) -> io::Result<()> {
        let c_name = shm_name(name)?;
        if unsafe { libc::shm_unlink(c_name.as_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn map(fd: RawFd, size: usize) -> io::Result<Self> {
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            ) as *mut u8
        };

        if ptr == libc::MAP_FAILED as *mut u8 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }

        Ok(Self {
            ptr: NonNull::new(ptr).expect("mmap returned a null non-failure pointer"),
            size,
            fd,
        })
    }
}

#[cfg(target_os = "linux")]
impl Drop for LinuxSharedMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut c_void, self.size);
            libc::close(self.fd);
        }
    }
}

#[cfg(target_os = "linux")]
impl SharedMemoryBackend for LinuxSharedMemory {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::Fd(self.fd)
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn create_then_attach_see_the_same_bytes() {
        let name = "/ringtrace-test-create-attach";
        let _ = LinuxSharedMemory::unlink(name);

        let created = LinuxSharedMemory::open_or_create(name, 4096).unwrap();
        unsafe {
            *created.as_ptr() = 0x42;
        }

        let attached = LinuxSharedMemory::attach(name, 4096).unwrap();
        unsafe {
            assert_eq!(*attached.as_ptr(), 0x42);
        }

        drop(created);
        drop(attached);
        LinuxSharedMemory::unlink(name).unwrap();
    }

    #[test]
    fn open_or_create_attaches_when_already_present() {
        let name = "/ringtrace-test-race";
        let _ = LinuxSharedMemory::unlink(name);

        let first = LinuxSharedMemory::open_or_create(name, 4096).unwrap();
        let second = LinuxSharedMemory::open_or_create(name, 4096).unwrap();
        assert_eq!(first.size(), second.size());

        drop(first);
        drop(second);
        LinuxSharedMemory::unlink(name).unwrap();
    }
}
