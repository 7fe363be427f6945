use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::SystemTime;

/// One scanned path, as produced by the (out-of-scope) discovery pipeline.
///
/// Only the representative of a class carries `has_dupes`; records reached
/// through `duplicates` never start a class of their own.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: PathBuf,
    pub has_dupes: bool,
    pub is_symlink: bool,
    pub valid_stat: bool,
    pub size: u64,
    pub device: u64,
    pub inode: u64,
    pub nlink: u64,
    pub mode: u32,
    pub mtime: Option<SystemTime>,
    pub atime: Option<SystemTime>,
    /// Head of the intra-class duplicate chain.
    pub duplicates: Option<Rc<RefCell<FileRecord>>>,
    /// Next class representative in the master list.
    pub next: Option<Rc<RefCell<FileRecord>>>,
}

impl FileRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileRecord {
            path: path.into(),
            has_dupes: false,
            is_symlink: false,
            valid_stat: true,
            size: 0,
            device: 0,
            inode: 0,
            nlink: 1,
            mode: 0,
            mtime: None,
            atime: None,
            duplicates: None,
            next: None,
        }
    }

    pub fn shared(self) -> Rc<RefCell<FileRecord>> {
        Rc::new(RefCell::new(self))
    }
}

/// Which filesystem entity type to install at each duplicate's path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Symbolic,
    Hard,
    Clone,
}

/// Read-only engine configuration (§6 table).
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions {
    /// Suppress per-pair glyph lines; warnings are still emitted.
    pub hide_progress: bool,
    /// Emit `-==->` when source and duplicate already share an inode.
    pub consider_hard_links: bool,
    /// Skip the "file changed since scan" gate.
    pub no_change_check: bool,
}

/// Successful link glyph, chosen by link type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glyph {
    Symlink,
    Hard,
    Clone,
}

impl Glyph {
    pub fn arrow(self) -> &'static str {
        match self {
            Glyph::Symlink => "-@@->",
            Glyph::Hard => "---->",
            Glyph::Clone => "-##->",
        }
    }
}

/// Why a pair was skipped without attempting any link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SameInode,
    SymlinkToSymlink,
    SameCanonicalPath,
    NoSymlinkSource,
    CrossDevice,
    ReadOnlyTarget,
    TargetModified,
    TargetLinkCeiling,
    AsidePathTooLong,
    AsideRenameFailed,
    CloneStatFailed,
}

impl SkipReason {
    /// True for SkipHarmless per §7: no output, no failure bit.
    pub fn is_harmless(self) -> bool {
        matches!(
            self,
            SkipReason::SameInode | SkipReason::SymlinkToSymlink | SkipReason::SameCanonicalPath
                | SkipReason::NoSymlinkSource
        )
    }

    pub fn message(self) -> &'static str {
        match self {
            SkipReason::SameInode => "already the same file",
            SkipReason::SymlinkToSymlink => "both files are symlinks",
            SkipReason::SameCanonicalPath => {
                "files to be linked have the same canonical path; not linking"
            }
            SkipReason::NoSymlinkSource => "no non-symlink source available in class",
            SkipReason::CrossDevice => "hard link target on different device, not linking",
            SkipReason::ReadOnlyTarget => "link target is a read-only file, not linking",
            SkipReason::TargetModified => "target file modified since scanned, not linking",
            SkipReason::TargetLinkCeiling => "maximum destination link count reached, skipping",
            SkipReason::AsidePathTooLong => "temporary name would exceed path buffer, skipping",
            SkipReason::AsideRenameFailed => "cannot move link target to a temporary name, not linking",
            SkipReason::CloneStatFailed => "stat() on destination file failed, skipping",
        }
    }
}

/// Why a source was promoted mid-class (§4.3, §7 SourcePromote).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoteReason {
    SourceStatFailed,
    SourceModified,
    SourceLinkCeiling,
}

impl PromoteReason {
    pub fn message(self) -> &'static str {
        match self {
            PromoteReason::SourceStatFailed => {
                "stat() on source file failed, changing source file"
            }
            PromoteReason::SourceModified => {
                "source file modified since scanned; changing source file"
            }
            PromoteReason::SourceLinkCeiling => {
                "maximum source link count reached, changing source file"
            }
        }
    }
}

/// Why the link-creation step or a rollback step failed outright.
#[derive(Debug, Clone)]
pub enum FailReason {
    LinkFailed(String),
    CloneMetadataFailed(String),
    CleanupFailed,
    RevertFailed { original: PathBuf, current: PathBuf },
}

/// Per-pair result.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success(Glyph),
    AlreadyLinked,
    Skipped(SkipReason),
    Promoted(PromoteReason),
    Failed(FailReason),
}

impl Outcome {
    /// Every Skipped/Promoted/Failed variant except the harmless skip kinds
    /// sets the process-wide failure bit (§3 Global failure bit, §7).
    pub fn sets_failure_bit(&self) -> bool {
        match self {
            Outcome::Success(_) | Outcome::AlreadyLinked => false,
            Outcome::Skipped(r) => !r.is_harmless(),
            Outcome::Promoted(_) | Outcome::Failed(_) => true,
        }
    }
}

/// Tally returned to the caller in addition to the textual reporter output.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallSummary {
    pub any_failure: bool,
    pub classes_processed: usize,
    pub pairs_succeeded: usize,
    pub pairs_skipped: usize,
    pub pairs_failed: usize,
}

/// A materialized, indexable view of one equivalence class, built once per
/// class from the `duplicates` chain (Design Note "Pointer-rich singly-linked
/// chains" — replaces the original's fixed-capacity scratch array sized to
/// the largest class with a reused `Vec`).
#[derive(Debug, Default)]
pub struct ClassView {
    members: Vec<Rc<RefCell<FileRecord>>>,
}

impl ClassView {
    pub fn rebuild_from(&mut self, representative: &Rc<RefCell<FileRecord>>) {
        self.members.clear();
        self.members.push(representative.clone());
        let mut cursor = representative.borrow().duplicates.clone();
        while let Some(node) = cursor {
            let next = node.borrow().duplicates.clone();
            self.members.push(node);
            cursor = next;
        }
    }

    pub fn members(&self) -> &[Rc<RefCell<FileRecord>>] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
