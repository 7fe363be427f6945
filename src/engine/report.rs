//! Outcome reporter (§4.7): the only place that writes the glyph protocol.
//!
//! Kept separate from `tracing` on purpose — the glyph lines are a stable,
//! byte-exact contract consumers may script against, not a diagnostic log.

use std::io::Write;
use std::path::Path;

use crate::engine::model::{FailReason, Glyph, PromoteReason, SkipReason};

pub struct Reporter<'a> {
    stdout: &'a mut dyn Write,
    stderr: &'a mut dyn Write,
    hide_progress: bool,
    pub any_class_had_duplicates: bool,
}

impl<'a> Reporter<'a> {
    pub fn new(stdout: &'a mut dyn Write, stderr: &'a mut dyn Write, hide_progress: bool) -> Self {
        Reporter {
            stdout,
            stderr,
            hide_progress,
            any_class_had_duplicates: false,
        }
    }

    pub fn source(&mut self, path: &Path) {
        if self.hide_progress {
            return;
        }
        let _ = write!(self.stdout, "[SRC] {}\n", path.display());
    }

    pub fn success(&mut self, glyph: Glyph, path: &Path) {
        if self.hide_progress {
            return;
        }
        let _ = write!(self.stdout, "{} {}\n", glyph.arrow(), path.display());
    }

    pub fn already_linked(&mut self, path: &Path) {
        if self.hide_progress {
            return;
        }
        let _ = write!(self.stdout, "-==-> {}\n", path.display());
    }

    pub fn skip_warn(&mut self, reason: SkipReason, path: &Path) {
        let _ = write!(
            self.stderr,
            "warning: {}:\n-//-> {}\n",
            reason.message(),
            path.display()
        );
        let _ = self.stderr.flush();
    }

    pub fn promote(&mut self, reason: PromoteReason, path: &Path) {
        let _ = write!(
            self.stderr,
            "warning: {}:\n[SRC] {}\n",
            reason.message(),
            path.display()
        );
        let _ = self.stderr.flush();
    }

    /// `-//->` glyph for a pair whose link creation failed (§7 LinkFailed),
    /// printed to stdout ahead of the stderr warning, same as a successful
    /// link's glyph.
    pub fn link_fail_glyph(&mut self, path: &Path) {
        if self.hide_progress {
            return;
        }
        let _ = write!(self.stdout, "-//-> {}\n", path.display());
    }

    pub fn link_failed(&mut self, dup: &Path, src: &Path, detail: &str) {
        let _ = write!(
            self.stderr,
            "warning: unable to link '{}' -> '{}': {}\n",
            dup.display(),
            src.display(),
            detail
        );
        let _ = self.stderr.flush();
    }

    pub fn failed(&mut self, reason: &FailReason) {
        match reason {
            FailReason::LinkFailed(_) | FailReason::CloneMetadataFailed(_) => {}
            FailReason::CleanupFailed => {
                let _ = writeln!(
                    self.stderr,
                    "warning: couldn't remove link to restore original file"
                );
            }
            FailReason::RevertFailed { original, current } => {
                let _ = writeln!(self.stderr, "warning: couldn't revert the file to its original name");
                let _ = writeln!(self.stderr, "original: {}", original.display());
                let _ = writeln!(self.stderr, "current:  {}", current.display());
            }
        }
        let _ = self.stderr.flush();
    }

    pub fn clone_metadata_warning(&mut self, detail: &str, path: &Path) {
        let _ = write!(
            self.stderr,
            "warning: {} failed for destination file, reverting:\n-##-> {}\n",
            detail,
            path.display()
        );
        let _ = self.stderr.flush();
    }

    pub fn mark_class_had_duplicates(&mut self) {
        self.any_class_had_duplicates = true;
    }

    pub fn end_of_pass(&mut self) {
        if !self.any_class_had_duplicates {
            let _ = writeln!(self.stdout, "No duplicates found.");
        }
    }
}
