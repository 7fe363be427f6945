//! Clone metadata preservation (§4.6): reconciling flags/times after
//! `clone_file` has already materialized the new entity.

use std::path::Path;

use crate::engine::platform::{FsError, PlatformFs, COMPRESSED_MASK};
use crate::engine::safety::CloneCapture;

/// Runs steps 1-3 of §4.6. `aside` is the renamed-away original (still
/// holding the pre-clone metadata so step 1 has something to copy from);
/// `dup_path` is the freshly cloned entity at the canonical path.
pub fn reconcile_metadata(
    fsys: &dyn PlatformFs,
    aside: &Path,
    dup_path: &Path,
    capture: CloneCapture,
) -> Result<(), FsError> {
    fsys.copy_metadata(aside, dup_path)?;

    let merged = capture.src_preserved | (capture.dup_flags & !COMPRESSED_MASK);
    if capture.dup_flags != merged {
        fsys.set_flags(dup_path, merged)?;
        fsys.set_times(dup_path, capture.dup_atime, capture.dup_mtime)?;
    }
    Ok(())
}
