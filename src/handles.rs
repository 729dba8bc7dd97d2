//! Low-level, path-anchored file descriptor plumbing.
//!
//! Every open in this crate that targets a file inside a session directory goes through
//! `openat(2)` against the directory's own file descriptor rather than a path built with
//! string concatenation, so a concurrent rename of an ancestor directory can't redirect a
//! write to the wrong place.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::stat::Mode;
use nix::unistd::mkdtemp;

/// An owned raw file descriptor, closed at most once, on drop.
///
/// This mirrors the `FileDescriptorRawHandle` wrapper fuser uses for its kernel-driver
/// channel: a bare `RawFd` plus an idempotent close, since a descriptor can be closed
/// explicitly during an error path and must not be closed a second time when the owning
/// value is dropped.
#[derive(Debug)]
pub(crate) struct OwnedRawFd {
    fd: RawFd,
    closed: AtomicBool,
}

impl OwnedRawFd {
    fn new(fd: RawFd) -> Self {
        OwnedRawFd {
            fd,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn as_raw_fd(&self) -> RawFd {
        self.fd
    }

    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            unsafe {
                libc::close(self.fd);
            }
        }
    }
}

impl Drop for OwnedRawFd {
    fn drop(&mut self) {
        self.close();
    }
}

fn to_cstring(path: impl AsRef<Path>) -> io::Result<CString> {
    CString::new(path.as_ref().as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// Create an intermediate directory, tolerating `EEXIST`.
pub(crate) fn mkdir_reuse_existing(path: &Path, mode: u32) -> io::Result<()> {
    match nix::unistd::mkdir(path, Mode::from_bits_truncate(mode)) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::EEXIST) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Create a unique leaf directory from a `.../XXXXXX` template, mode `0700`. Returns the
/// resolved path.
pub(crate) fn mkdtemp_dir(template: &Path) -> io::Result<std::path::PathBuf> {
    mkdtemp(template).map_err(io::Error::from)
}

/// Remove a directory this process just created and is abandoning due to a later failure.
pub(crate) fn rmdir_best_effort(path: &Path) {
    let _ = nix::unistd::rmdir(path);
}

/// Open `path` as a directory handle, usable with `openat`-anchored calls.
pub(crate) fn open_dir(path: &Path) -> io::Result<OwnedRawFd> {
    let cpath = to_cstring(path)?;
    let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDONLY | libc::O_DIRECTORY) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(OwnedRawFd::new(fd))
}

/// `openat(dirfd, name, O_CREAT|O_EXCL|O_WRONLY, 0600)`.
pub(crate) fn openat_create_excl(dirfd: RawFd, name: &str) -> io::Result<OwnedRawFd> {
    let cname = CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let fd = unsafe {
        libc::openat(
            dirfd,
            cname.as_ptr(),
            libc::O_CREAT | libc::O_EXCL | libc::O_WRONLY,
            0o600,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(OwnedRawFd::new(fd))
}

/// `openat(dirfd, name, O_RDWR, 0600)`, returning `None` instead of an error if the open
/// fails for any reason -- restart's reopen path tolerates a missing stream file and only
/// fails later, if replay actually references it.
pub(crate) fn openat_rw_optional(dirfd: RawFd, name: &str) -> Option<OwnedRawFd> {
    let cname = CString::new(name).ok()?;
    let fd = unsafe { libc::openat(dirfd, cname.as_ptr(), libc::O_RDWR, 0o600) };
    if fd < 0 {
        None
    } else {
        Some(OwnedRawFd::new(fd))
    }
}

/// A single `write(2)` call; the caller decides how to treat a short write.
pub(crate) fn write_once(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    let rc = unsafe {
        libc::write(
            fd,
            buf.as_ptr() as *const libc::c_void,
            buf.len() as libc::size_t,
        )
    };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

/// `lseek(fd, offset, SEEK_CUR)`.
pub(crate) fn lseek_cur(fd: RawFd, offset: i64) -> io::Result<i64> {
    let pos = unsafe { libc::lseek(fd, offset as libc::off_t, libc::SEEK_CUR) };
    if pos < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(pos as i64)
    }
}

/// `lseek(fd, offset, SEEK_SET)`.
pub(crate) fn lseek_set(fd: RawFd, offset: i64) -> io::Result<i64> {
    let pos = unsafe { libc::lseek(fd, offset as libc::off_t, libc::SEEK_SET) };
    if pos < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(pos as i64)
    }
}

/// `ftruncate(fd, len)`.
pub(crate) fn ftruncate(fd: RawFd, len: i64) -> io::Result<()> {
    let rc = unsafe { libc::ftruncate(fd, len as libc::off_t) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// `dup(fd)`.
pub(crate) fn dup(fd: RawFd) -> io::Result<RawFd> {
    let new_fd = unsafe { libc::dup(fd) };
    if new_fd < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(new_fd)
    }
}
