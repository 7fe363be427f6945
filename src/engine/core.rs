//! Atomic replacement core (§4.5): the S0-S5 state machine for one pair.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::engine::clone;
use crate::engine::model::{FailReason, FileRecord, Glyph, LinkType, Outcome, SkipReason};
use crate::engine::platform::PlatformFs;
use crate::engine::relpath::{make_relative_link_name, RelLinkTarget};
use crate::engine::safety::CloneCapture;

const ASIDE_SUFFIX: &str = ".__jdupes__.tmp";

/// S1: compose the aside path, rejecting it up front if it would not fit
/// in the configured path buffer.
fn aside_path(dup_path: &Path, pathbuf_size: usize) -> Option<PathBuf> {
    let file_name = dup_path.file_name()?;
    let mut new_name = OsString::with_capacity(file_name.len() + ASIDE_SUFFIX.len());
    new_name.push(file_name);
    new_name.push(ASIDE_SUFFIX);
    let aside = dup_path.with_file_name(new_name);
    if aside.as_os_str().len() >= pathbuf_size {
        return None;
    }
    Some(aside)
}

/// Run S1 through S5 for one (source, duplicate) pair that already cleared
/// the safety gate. Returns the pair's final `Outcome`.
pub fn install_pair(
    fsys: &dyn PlatformFs,
    source: &FileRecord,
    dup: &FileRecord,
    link_type: LinkType,
    clone_capture: Option<CloneCapture>,
    pathbuf_size: usize,
) -> Outcome {
    // S1
    let Some(aside) = aside_path(&dup.path, pathbuf_size) else {
        return Outcome::Skipped(SkipReason::AsidePathTooLong);
    };

    // S2
    if let Err(_e) = fsys.rename(&dup.path, &aside) {
        // Defensive: in case the platform left a partial rename behind.
        let _ = fsys.rename(&aside, &dup.path);
        return Outcome::Skipped(SkipReason::AsideRenameFailed);
    }

    // S3
    let link_result = match link_type {
        LinkType::Hard => fsys.hardlink(&source.path, &dup.path).map_err(|e| e.to_string()),
        LinkType::Symbolic => match make_relative_link_name(&source.path, &dup.path) {
            Ok(RelLinkTarget::SameCanonicalPath) => {
                // Restore and treat as a silent skip; no entity was created.
                let _ = fsys.rename(&aside, &dup.path);
                return Outcome::Skipped(SkipReason::SameCanonicalPath);
            }
            Ok(RelLinkTarget::Text(text)) => {
                fsys.symlink(&text, &dup.path).map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        },
        LinkType::Clone => fsys.clone_file(&source.path, &dup.path).map_err(|e| e.to_string()),
    };

    if let Err(detail) = link_result {
        // R3
        if fsys.rename(&aside, &dup.path).is_err() {
            return Outcome::Failed(FailReason::RevertFailed {
                original: dup.path.clone(),
                current: aside,
            });
        }
        return Outcome::Failed(FailReason::LinkFailed(detail));
    }

    if matches!(link_type, LinkType::Clone) {
        if let Some(capture) = clone_capture {
            if let Err(e) = clone::reconcile_metadata(fsys, &aside, &dup.path, capture) {
                // The clone itself succeeded; the aside copy remains as
                // recovery material while cleanup below still runs.
                let _ = fsys.unlink(&aside);
                return Outcome::Failed(FailReason::CloneMetadataFailed(e.to_string()));
            }
        }
    }

    // S4
    if fsys.unlink(&aside).is_err() {
        // R4
        if fsys.unlink(&dup.path).is_err() {
            return Outcome::Failed(FailReason::CleanupFailed);
        }
        if fsys.rename(&aside, &dup.path).is_err() {
            return Outcome::Failed(FailReason::RevertFailed {
                original: dup.path.clone(),
                current: aside,
            });
        }
        // Original name restored; the pair still failed to install a link.
        return Outcome::Failed(FailReason::CleanupFailed);
    }

    // S5
    let glyph = match link_type {
        LinkType::Hard => Glyph::Hard,
        LinkType::Symbolic => Glyph::Symlink,
        LinkType::Clone => Glyph::Clone,
    };
    Outcome::Success(glyph)
}
