//! Platform FS facade (§4.1).
//!
//! One uniform surface over the primitives the engine needs, so the engine
//! itself never branches on target platform. The `clone_file`/`set_flags`
//! primitives are only backed by a real syscall on macOS (APFS `clonefile(2)`
//! / `chflags(2)`, mirroring the original's `ENABLE_CLONEFILE_LINK` gate);
//! `supports_clone()` tells the caller so before it ever reaches for them.

use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::time::SystemTime;

use filetime::FileTime;
use thiserror::Error;

/// The single bit in a platform's `st_flags` that marks transparent
/// compression. Only meaningful on macOS/APFS; defined unconditionally so
/// higher layers can compute masks without `#[cfg]` noise.
pub const COMPRESSED_MASK: u32 = 0x0000_0020;

/// Narrow error kind returned by every facade primitive (§4.1, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrKind {
    NotFound,
    PermissionDenied,
    CrossDevice,
    NoSupport,
    AlreadyExists,
    Io,
}

#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct FsError {
    pub kind: ErrKind,
    pub message: String,
}

impl FsError {
    pub fn new(kind: ErrKind, message: impl Into<String>) -> Self {
        FsError {
            kind,
            message: message.into(),
        }
    }

    pub fn no_support(op: &str) -> Self {
        FsError::new(ErrKind::NoSupport, format!("{op} not supported on this platform"))
    }
}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        let kind = match e.kind() {
            io::ErrorKind::NotFound => ErrKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrKind::PermissionDenied,
            io::ErrorKind::AlreadyExists => ErrKind::AlreadyExists,
            _ if e.raw_os_error() == Some(libc::EXDEV) => ErrKind::CrossDevice,
            _ => ErrKind::Io,
        };
        FsError::new(kind, e.to_string())
    }
}

/// A snapshot of the stat-equivalent fields the engine compares over time.
#[derive(Debug, Clone, Copy)]
pub struct StatSnapshot {
    pub size: u64,
    pub device: u64,
    pub inode: u64,
    pub nlink: u64,
    pub mode: u32,
    pub flags: u32,
    pub mtime: Option<SystemTime>,
    pub atime: Option<SystemTime>,
}

/// One uniform surface for every disk-touching primitive the engine calls.
pub trait PlatformFs {
    fn stat(&self, path: &Path) -> Result<StatSnapshot, FsError>;
    fn writable(&self, path: &Path) -> bool;
    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError>;
    fn unlink(&self, path: &Path) -> Result<(), FsError>;
    fn hardlink(&self, existing: &Path, new: &Path) -> Result<(), FsError>;
    fn symlink(&self, target_text: &str, new: &Path) -> Result<(), FsError>;
    fn clone_file(&self, existing: &Path, new: &Path) -> Result<(), FsError>;
    fn copy_metadata(&self, from: &Path, to: &Path) -> Result<(), FsError>;
    fn set_flags(&self, path: &Path, flags: u32) -> Result<(), FsError>;
    fn set_times(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> Result<(), FsError>;
    fn supports_clone(&self) -> bool;
    /// `Some(n)` on platforms with a documented hard-link ceiling (the
    /// original's `ON_WINDOWS` 1024-link check on attribute-style
    /// filesystems); `None` where the engine need not observe one.
    fn link_count_ceiling(&self) -> Option<u64>;
}

/// The concrete Unix facade: Linux/BSD syscalls plus macOS clone/flag support.
pub struct UnixFs;

impl UnixFs {
    pub fn new() -> Self {
        UnixFs
    }
}

impl Default for UnixFs {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformFs for UnixFs {
    fn stat(&self, path: &Path) -> Result<StatSnapshot, FsError> {
        let meta = std::fs::symlink_metadata(path)?;
        let flags = platform_flags(&meta);
        Ok(StatSnapshot {
            size: meta.len(),
            device: meta.dev(),
            inode: meta.ino(),
            nlink: meta.nlink(),
            mode: meta.mode(),
            flags,
            mtime: meta.modified().ok(),
            atime: meta.accessed().ok(),
        })
    }

    fn writable(&self, path: &Path) -> bool {
        // access(2) W_OK, matching the original's non-Windows branch exactly.
        let c_path = match std::ffi::CString::new(path.as_os_str().as_encoded_bytes()) {
            Ok(c) => c,
            Err(_) => return false,
        };
        unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        std::fs::rename(from, to).map_err(FsError::from)
    }

    fn unlink(&self, path: &Path) -> Result<(), FsError> {
        std::fs::remove_file(path).map_err(FsError::from)
    }

    fn hardlink(&self, existing: &Path, new: &Path) -> Result<(), FsError> {
        std::fs::hard_link(existing, new).map_err(FsError::from)
    }

    fn symlink(&self, target_text: &str, new: &Path) -> Result<(), FsError> {
        std::os::unix::fs::symlink(target_text, new).map_err(FsError::from)
    }

    #[cfg(target_os = "macos")]
    fn clone_file(&self, existing: &Path, new: &Path) -> Result<(), FsError> {
        macos::clone_via_clonefile(existing, new)
    }

    #[cfg(not(target_os = "macos"))]
    fn clone_file(&self, _existing: &Path, _new: &Path) -> Result<(), FsError> {
        Err(FsError::no_support("clone_file"))
    }

    #[cfg(target_os = "macos")]
    fn copy_metadata(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        macos::copyfile_metadata(from, to)
    }

    #[cfg(not(target_os = "macos"))]
    fn copy_metadata(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        let meta = std::fs::metadata(from)?;
        std::fs::set_permissions(to, meta.permissions())?;
        let atime = FileTime::from_last_access_time(&meta);
        let mtime = FileTime::from_last_modification_time(&meta);
        filetime::set_file_times(to, atime, mtime)
            .map_err(|e| FsError::new(ErrKind::Io, e.to_string()))?;
        Ok(())
    }

    #[cfg(target_os = "macos")]
    fn set_flags(&self, path: &Path, flags: u32) -> Result<(), FsError> {
        macos::chflags(path, flags)
    }

    #[cfg(not(target_os = "macos"))]
    fn set_flags(&self, _path: &Path, _flags: u32) -> Result<(), FsError> {
        Err(FsError::no_support("set_flags"))
    }

    fn set_times(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> Result<(), FsError> {
        let atime = FileTime::from_system_time(atime);
        let mtime = FileTime::from_system_time(mtime);
        filetime::set_file_times(path, atime, mtime)
            .map_err(|e| FsError::new(ErrKind::Io, e.to_string()))
    }

    fn supports_clone(&self) -> bool {
        cfg!(target_os = "macos")
    }

    fn link_count_ceiling(&self) -> Option<u64> {
        // Linux/BSD filesystems this engine targets (ext4, XFS, btrfs, APFS)
        // have no practical ceiling worth gating on; the original's 1024
        // check only applies to attribute-style platforms out of scope here
        // (§9 Open Question 4).
        None
    }
}

#[cfg(not(target_os = "macos"))]
fn platform_flags(_meta: &std::fs::Metadata) -> u32 {
    0
}

#[cfg(target_os = "macos")]
fn platform_flags(meta: &std::fs::Metadata) -> u32 {
    use std::os::macos::fs::MetadataExt as _;
    meta.st_flags()
}

#[cfg(target_os = "macos")]
mod macos {
    use super::{ErrKind, FsError};
    use std::ffi::CString;
    use std::io;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    fn cpath(p: &Path) -> Result<CString, FsError> {
        CString::new(p.as_os_str().as_bytes())
            .map_err(|_| FsError::new(ErrKind::Io, "path contains NUL byte"))
    }

    extern "C" {
        fn clonefile(src: *const libc::c_char, dst: *const libc::c_char, flags: u32) -> libc::c_int;
    }

    pub fn clone_via_clonefile(existing: &Path, new: &Path) -> Result<(), FsError> {
        let c_existing = cpath(existing)?;
        let c_new = cpath(new)?;
        let ret = unsafe { clonefile(c_existing.as_ptr(), c_new.as_ptr(), 0) };
        if ret == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error().into())
        }
    }

    pub fn chflags(path: &Path, flags: u32) -> Result<(), FsError> {
        let c_path = cpath(path)?;
        let ret = unsafe { libc::chflags(c_path.as_ptr(), flags as libc::c_ulong) };
        if ret == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error().into())
        }
    }

    /// `copyfile(3)` with `COPYFILE_METADATA`: owner, times, xattrs, flags.
    pub fn copyfile_metadata(from: &Path, to: &Path) -> Result<(), FsError> {
        extern "C" {
            fn copyfile(
                src: *const libc::c_char,
                dst: *const libc::c_char,
                state: *mut libc::c_void,
                flags: u32,
            ) -> libc::c_int;
        }
        const COPYFILE_METADATA: u32 = 1 << 7 | 1 << 3 | 1 << 2 | 1 << 1;
        let c_from = cpath(from)?;
        let c_to = cpath(to)?;
        let ret = unsafe {
            copyfile(
                c_from.as_ptr(),
                c_to.as_ptr(),
                std::ptr::null_mut(),
                COPYFILE_METADATA,
            )
        };
        if ret == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error().into())
        }
    }
}
