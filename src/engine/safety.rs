//! Safety gate (§4.4): every precondition a pair must clear before the
//! atomic replacement core is allowed to touch disk.

use std::time::SystemTime;

use crate::engine::model::{FileRecord, LinkType, PromoteReason, SkipReason};
use crate::engine::platform::{PlatformFs, COMPRESSED_MASK};

/// Metadata captured up front for a clone pair, so the create/metadata steps
/// never need to re-stat a file whose state they are about to replace.
#[derive(Debug, Clone, Copy)]
pub struct CloneCapture {
    pub dup_flags: u32,
    pub dup_atime: SystemTime,
    pub dup_mtime: SystemTime,
    pub src_preserved: u32,
}

#[derive(Debug, Clone, Copy)]
pub enum GateResult {
    Proceed(Option<CloneCapture>),
    AlreadyLinked,
    SkipSilent(SkipReason),
    SkipWarn(SkipReason),
    SourcePromote(PromoteReason),
}

#[allow(clippy::too_many_arguments)]
pub fn check_pair(
    fsys: &dyn PlatformFs,
    source: &FileRecord,
    dup: &FileRecord,
    link_type: LinkType,
    symlink_source_index: Option<usize>,
    dup_index: usize,
    consider_hard_links: bool,
    no_change_check: bool,
) -> GateResult {
    if matches!(link_type, LinkType::Hard | LinkType::Clone) {
        // 1. cross-device check.
        if source.device != dup.device {
            return GateResult::SkipWarn(SkipReason::CrossDevice);
        }
        // 2. already the same inode.
        if source.device == dup.device && source.inode == dup.inode {
            return if consider_hard_links {
                GateResult::AlreadyLinked
            } else {
                GateResult::SkipSilent(SkipReason::SameInode)
            };
        }
    }

    if matches!(link_type, LinkType::Symbolic) {
        // 3. symlink-to-symlink, or the duplicate is itself the chosen source.
        if source.is_symlink && dup.is_symlink {
            return GateResult::SkipSilent(SkipReason::SymlinkToSymlink);
        }
        if Some(dup_index) == symlink_source_index {
            return GateResult::SkipSilent(SkipReason::SameCanonicalPath);
        }
    }

    // 4. writability of the duplicate.
    if !fsys.writable(&dup.path) {
        return GateResult::SkipWarn(SkipReason::ReadOnlyTarget);
    }

    if !no_change_check {
        // 5. source changed since scan -> promote, don't touch this pair.
        if file_has_changed(fsys, source) {
            return GateResult::SourcePromote(PromoteReason::SourceModified);
        }
        // 6. duplicate changed since scan -> skip, do not promote.
        if file_has_changed(fsys, dup) {
            return GateResult::SkipWarn(SkipReason::TargetModified);
        }
    }

    // 7. link-count ceiling, only on platforms that report one.
    if let Some(ceiling) = fsys.link_count_ceiling() {
        match fsys.stat(&source.path) {
            Ok(st) if st.nlink >= ceiling => {
                return GateResult::SourcePromote(PromoteReason::SourceLinkCeiling);
            }
            Err(_) => return GateResult::SourcePromote(PromoteReason::SourceStatFailed),
            Ok(_) => {}
        }
        match fsys.stat(&dup.path) {
            Ok(st) if st.nlink >= ceiling => {
                return GateResult::SkipWarn(SkipReason::TargetLinkCeiling);
            }
            Err(_) => return GateResult::SkipWarn(SkipReason::CloneStatFailed),
            Ok(_) => {}
        }
    }

    // 8. clone-only capture of destination state to restore after clonefile().
    if matches!(link_type, LinkType::Clone) {
        let dup_stat = match fsys.stat(&dup.path) {
            Ok(st) => st,
            Err(_) => return GateResult::SkipWarn(SkipReason::CloneStatFailed),
        };
        let src_stat = match fsys.stat(&source.path) {
            Ok(st) => st,
            Err(_) => return GateResult::SkipWarn(SkipReason::CloneStatFailed),
        };
        let (Some(atime), Some(mtime)) = (dup_stat.atime, dup_stat.mtime) else {
            return GateResult::SkipWarn(SkipReason::CloneStatFailed);
        };
        return GateResult::Proceed(Some(CloneCapture {
            dup_flags: dup_stat.flags,
            dup_atime: atime,
            dup_mtime: mtime,
            src_preserved: src_stat.flags & COMPRESSED_MASK,
        }));
    }

    GateResult::Proceed(None)
}

/// Any live-stat delta against the scanned snapshot counts as "changed":
/// size, device, inode, or (when available) mtime.
fn file_has_changed(fsys: &dyn PlatformFs, record: &FileRecord) -> bool {
    if !record.valid_stat {
        return false;
    }
    match fsys.stat(&record.path) {
        Ok(st) => {
            if st.size != record.size || st.device != record.device || st.inode != record.inode {
                return true;
            }
            match (st.mtime, record.mtime) {
                (Some(live), Some(scanned)) => live != scanned,
                _ => false,
            }
        }
        Err(_) => true,
    }
}
