use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tempfile::tempdir;

use crate::common::io::read_file_bytes;
use crate::engine::model::{EngineOptions, FileRecord, LinkType};
use crate::engine::platform::{ErrKind, FsError, PlatformFs, StatSnapshot, UnixFs};
use crate::engine::{install_links, RunContext};

fn record_for(path: &Path, has_dupes: bool) -> Rc<RefCell<FileRecord>> {
    let meta = fs::symlink_metadata(path).expect("stat fixture file");
    let mut rec = FileRecord::new(path.to_path_buf());
    rec.has_dupes = has_dupes;
    rec.is_symlink = meta.file_type().is_symlink();
    rec.size = meta.len();
    rec.device = meta.dev();
    rec.inode = meta.ino();
    rec.nlink = meta.nlink();
    rec.mode = meta.mode();
    rec.mtime = meta.modified().ok();
    rec.atime = meta.accessed().ok();
    rec.shared()
}

/// Chains `members[0]` as the representative with `duplicates` pointing
/// through the rest, matching the shape `ClassView::rebuild_from` expects.
fn chain_class(members: &[Rc<RefCell<FileRecord>>]) {
    for pair in members.windows(2) {
        pair[0].borrow_mut().duplicates = Some(pair[1].clone());
    }
}

fn new_ctx(options: EngineOptions) -> (RunContext, Rc<RefCell<Vec<u8>>>, Rc<RefCell<Vec<u8>>>) {
    let out = Rc::new(RefCell::new(Vec::new()));
    let err = Rc::new(RefCell::new(Vec::new()));
    let ctx = RunContext::new(options, Box::new(SharedBuf(out.clone())), Box::new(SharedBuf(err.clone())));
    (ctx, out, err)
}

struct SharedBuf(Rc<RefCell<Vec<u8>>>);
impl std::io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn hard_link_happy_path() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    fs::write(&a, b"identical content").unwrap();
    fs::write(&b, b"identical content").unwrap();

    let rec_a = record_for(&a, true);
    let rec_b = record_for(&b, false);
    chain_class(&[rec_a.clone(), rec_b.clone()]);

    let (mut ctx, _out, _err) = new_ctx(EngineOptions::default());
    let fsys = UnixFs::new();
    let summary = install_links(Some(rec_a), LinkType::Hard, false, &mut ctx, &fsys);

    assert_eq!(summary.pairs_succeeded, 1);
    assert!(!summary.any_failure);
    let meta_a = fs::metadata(&a).unwrap();
    let meta_b = fs::metadata(&b).unwrap();
    assert_eq!(meta_a.ino(), meta_b.ino());
    assert!(!dir.path().join("b.txt.__jdupes__.tmp").exists());
    // P1 no data loss: read-through content is unchanged by the link.
    assert_eq!(read_file_bytes(&a).unwrap(), read_file_bytes(&b).unwrap());
    assert_eq!(read_file_bytes(&b).unwrap(), b"identical content");
}

#[test]
fn symbolic_skips_all_symlink_class() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("target.txt");
    fs::write(&target, b"data").unwrap();
    let s1 = dir.path().join("s1");
    let s2 = dir.path().join("s2");
    std::os::unix::fs::symlink(&target, &s1).unwrap();
    std::os::unix::fs::symlink(&target, &s2).unwrap();

    let rec_s1 = record_for(&s1, true);
    let rec_s2 = record_for(&s2, false);
    chain_class(&[rec_s1.clone(), rec_s2.clone()]);

    let (mut ctx, _out, _err) = new_ctx(EngineOptions::default());
    let fsys = UnixFs::new();
    let summary = install_links(Some(rec_s1), LinkType::Symbolic, false, &mut ctx, &fsys);

    assert_eq!(summary.pairs_succeeded, 0);
    assert_eq!(summary.pairs_skipped, 0);
    assert!(!summary.any_failure);
}

#[test]
fn symbolic_chooses_regular_file_as_source() {
    let dir = tempdir().unwrap();
    let f = dir.path().join("f.txt");
    fs::write(&f, b"data").unwrap();
    let other_target = dir.path().join("elsewhere.txt");
    fs::write(&other_target, b"data").unwrap();
    let s1 = dir.path().join("s1");
    let s2 = dir.path().join("s2");
    std::os::unix::fs::symlink(&other_target, &s1).unwrap();
    std::os::unix::fs::symlink(&other_target, &s2).unwrap();

    let rec_s1 = record_for(&s1, true);
    let rec_f = record_for(&f, false);
    let rec_s2 = record_for(&s2, false);
    chain_class(&[rec_s1.clone(), rec_f.clone(), rec_s2.clone()]);

    let (mut ctx, _out, _err) = new_ctx(EngineOptions::default());
    let fsys = UnixFs::new();
    let summary = install_links(Some(rec_s1), LinkType::Symbolic, false, &mut ctx, &fsys);

    assert_eq!(summary.pairs_succeeded, 2);
    assert!(!summary.any_failure);
    assert!(fs::symlink_metadata(&s1).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(&s1).unwrap().file_name().unwrap(), "f.txt");
}

/// A facade wrapping real Unix syscalls but letting tests override a few
/// fields and inject failures, for scenarios the real filesystem can't
/// produce on its own (distinct devices, a hard link-count ceiling).
struct FakeFs {
    inner: UnixFs,
    device_override: RefCell<HashMap<PathBuf, u64>>,
    ceiling: Option<u64>,
    fail_hardlink_for: Option<PathBuf>,
}

impl FakeFs {
    fn new() -> Self {
        FakeFs {
            inner: UnixFs::new(),
            device_override: RefCell::new(HashMap::new()),
            ceiling: None,
            fail_hardlink_for: None,
        }
    }
}

impl PlatformFs for FakeFs {
    fn stat(&self, path: &Path) -> Result<StatSnapshot, FsError> {
        let mut st = self.inner.stat(path)?;
        if let Some(&dev) = self.device_override.borrow().get(path) {
            st.device = dev;
        }
        Ok(st)
    }
    fn writable(&self, path: &Path) -> bool {
        self.inner.writable(path)
    }
    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        self.inner.rename(from, to)
    }
    fn unlink(&self, path: &Path) -> Result<(), FsError> {
        self.inner.unlink(path)
    }
    fn hardlink(&self, existing: &Path, new: &Path) -> Result<(), FsError> {
        if self.fail_hardlink_for.as_deref() == Some(new) {
            return Err(FsError::new(ErrKind::Io, "injected failure"));
        }
        self.inner.hardlink(existing, new)
    }
    fn symlink(&self, target_text: &str, new: &Path) -> Result<(), FsError> {
        self.inner.symlink(target_text, new)
    }
    fn clone_file(&self, _existing: &Path, _new: &Path) -> Result<(), FsError> {
        Err(FsError::no_support("clone_file"))
    }
    fn copy_metadata(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        self.inner.copy_metadata(from, to)
    }
    fn set_flags(&self, _path: &Path, _flags: u32) -> Result<(), FsError> {
        Err(FsError::no_support("set_flags"))
    }
    fn set_times(&self, path: &Path, atime: std::time::SystemTime, mtime: std::time::SystemTime) -> Result<(), FsError> {
        self.inner.set_times(path, atime, mtime)
    }
    fn supports_clone(&self) -> bool {
        false
    }
    fn link_count_ceiling(&self) -> Option<u64> {
        self.ceiling
    }
}

#[test]
fn cross_device_skip() {
    // The gate compares the scanned snapshot's `device` field (as the
    // original compares `dupelist[x]->device`), not a live stat, so a
    // differing device is simulated directly on the FileRecord.
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    fs::write(&a, b"content").unwrap();
    fs::write(&b, b"content").unwrap();

    let rec_a = record_for(&a, true);
    let rec_b = record_for(&b, false);
    rec_b.borrow_mut().device = rec_a.borrow().device + 1;
    chain_class(&[rec_a.clone(), rec_b.clone()]);

    let (mut ctx, _out, _err) = new_ctx(EngineOptions::default());
    let fsys = UnixFs::new();
    let summary = install_links(Some(rec_a), LinkType::Hard, false, &mut ctx, &fsys);

    assert_eq!(summary.pairs_succeeded, 0);
    assert!(summary.any_failure);
    assert_ne!(fs::metadata(&b).unwrap().ino(), fs::metadata(&a).unwrap().ino());
}

#[test]
fn link_count_ceiling_promotes_source() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    let c = dir.path().join("c.txt");
    fs::write(&a, b"content").unwrap();
    fs::write(&b, b"content").unwrap();
    fs::write(&c, b"content").unwrap();

    let rec_a = record_for(&a, true);
    let rec_b = record_for(&b, false);
    let rec_c = record_for(&c, false);
    chain_class(&[rec_a.clone(), rec_b.clone(), rec_c.clone()]);

    let mut fsys = FakeFs::new();
    fsys.ceiling = Some(1);

    let (mut ctx, _out, _err) = new_ctx(EngineOptions::default());
    let summary = install_links(Some(rec_a), LinkType::Hard, false, &mut ctx, &fsys);

    // `a` starts with nlink 1, immediately hits the ceiling and is promoted;
    // `b` becomes the new source and is also at nlink 1, promoted again;
    // `c` is the final attempt, also blocked -- so nothing actually links,
    // but every pair set the failure bit via SourcePromote/TargetLinkCeiling.
    assert!(summary.any_failure);
    assert_eq!(summary.pairs_succeeded, 0);
}

#[test]
fn rollback_on_link_failure_restores_original_content() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    fs::write(&a, b"source content").unwrap();
    fs::write(&b, b"original b content").unwrap();

    let rec_a = record_for(&a, true);
    let rec_b = record_for(&b, false);
    chain_class(&[rec_a.clone(), rec_b.clone()]);

    let mut fsys = FakeFs::new();
    fsys.fail_hardlink_for = Some(b.clone());

    let (mut ctx, _out, _err) = new_ctx(EngineOptions::default());
    let summary = install_links(Some(rec_a), LinkType::Hard, false, &mut ctx, &fsys);

    assert_eq!(summary.pairs_failed, 1);
    assert!(summary.any_failure);
    // P2 atomicity on failure: the duplicate ends the pair as a regular
    // file with identical content to its pre-state.
    assert_eq!(read_file_bytes(&b).unwrap(), b"original b content");
    assert!(!dir.path().join("b.txt.__jdupes__.tmp").exists());
}

#[test]
fn no_duplicates_message_emitted_when_no_class_has_dupes() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.txt");
    fs::write(&a, b"solo").unwrap();
    let rec_a = record_for(&a, false);

    let (mut ctx, out, _err) = new_ctx(EngineOptions::default());
    let fsys = UnixFs::new();
    let summary = install_links(Some(rec_a), LinkType::Hard, false, &mut ctx, &fsys);

    assert_eq!(summary.classes_processed, 0);
    assert!(String::from_utf8_lossy(&out.borrow()).contains("No duplicates found."));
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// P1 (no data loss) and P5 (idempotence), over randomized class
        /// sizes and content: every member reads back identical content
        /// after linking, and a second pass over the same paths links
        /// nothing further.
        #[test]
        fn hard_link_preserves_content_and_is_idempotent(
            content in "[a-z0-9]{1,64}",
            count in 2usize..6,
        ) {
            let dir = tempdir().unwrap();
            let mut paths = Vec::new();
            for i in 0..count {
                let p = dir.path().join(format!("f{i}.txt"));
                fs::write(&p, content.as_bytes()).unwrap();
                paths.push(p);
            }

            let records: Vec<_> = paths
                .iter()
                .enumerate()
                .map(|(i, p)| record_for(p, i == 0))
                .collect();
            chain_class(&records);

            let fsys = UnixFs::new();
            let (mut ctx1, _out1, _err1) = new_ctx(EngineOptions::default());
            let summary1 =
                install_links(Some(records[0].clone()), LinkType::Hard, false, &mut ctx1, &fsys);

            prop_assert!(!summary1.any_failure);
            prop_assert_eq!(summary1.pairs_succeeded, count - 1);
            for p in &paths {
                prop_assert_eq!(read_file_bytes(p).unwrap(), content.as_bytes());
            }

            // Re-scan (inodes now shared) and run again: P5 idempotence.
            let records2: Vec<_> = paths
                .iter()
                .enumerate()
                .map(|(i, p)| record_for(p, i == 0))
                .collect();
            chain_class(&records2);
            let (mut ctx2, _out2, _err2) = new_ctx(EngineOptions::default());
            let summary2 =
                install_links(Some(records2[0].clone()), LinkType::Hard, false, &mut ctx2, &fsys);

            prop_assert_eq!(summary2.pairs_succeeded, 0);
            prop_assert!(!summary2.any_failure);
            for p in &paths {
                prop_assert_eq!(read_file_bytes(p).unwrap(), content.as_bytes());
            }
        }
    }
}
