//! Link installation engine: given equivalence classes of byte-identical
//! files (already discovered upstream), transactionally replaces the
//! duplicates in each class with hard links, symlinks, or clones of a
//! chosen source, honoring cross-device/read-only/link-count-ceiling safety
//! checks and rolling back on failure.

pub mod clone;
pub mod core;
pub mod model;
pub mod planner;
pub mod platform;
pub mod relpath;
pub mod report;
pub mod safety;
#[cfg(test)]
mod tests;

pub use self::model::*;
pub use self::platform::{ErrKind, FsError, PlatformFs, StatSnapshot, UnixFs};

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use tracing::{debug, trace};

use self::planner::plan_class;
use self::report::Reporter;
use self::safety::{check_pair, GateResult};

/// The default path-buffer ceiling an aside-renamed path must fit inside
/// (§6 Path buffer limit). Mirrors the original's `PATHBUF_SIZE`.
pub const DEFAULT_PATHBUF_SIZE: usize = 4096;

/// Everything the engine used to reach for through process-wide globals:
/// option flags, the path-buffer ceiling, the failure bit, and the output
/// sinks, all threaded explicitly instead.
pub struct RunContext {
    pub options: EngineOptions,
    pub pathbuf_size: usize,
    pub exit_status: bool,
    /// Gates whether the caller wants an ambient `tracing` subscriber
    /// installed via `install_tracing`; the engine's own `trace!`/`debug!`
    /// calls fire regardless, since they're no-ops without a subscriber.
    pub verbose: bool,
    pub stdout: Box<dyn Write>,
    pub stderr: Box<dyn Write>,
}

impl RunContext {
    pub fn new(options: EngineOptions, stdout: Box<dyn Write>, stderr: Box<dyn Write>) -> Self {
        RunContext {
            options,
            pathbuf_size: DEFAULT_PATHBUF_SIZE,
            exit_status: false,
            verbose: false,
            stdout,
            stderr,
        }
    }

    /// Convenience constructor writing to the process's real stdout/stderr.
    pub fn stdio(options: EngineOptions) -> Self {
        RunContext::new(options, Box::new(io::stdout()), Box::new(io::stderr()))
    }
}

/// Installs a `tracing_subscriber::fmt` subscriber at a verbosity driven by
/// `RunContext.verbose`. Intended for test harnesses that embed this engine
/// directly; library callers that already run their own subscriber should
/// not call this.
#[cfg(test)]
pub fn install_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Install links across every class reachable from `classes` (§6 entry point).
pub fn install_links(
    classes: Option<Rc<RefCell<FileRecord>>>,
    link_type: LinkType,
    only_first_class: bool,
    ctx: &mut RunContext,
    fsys: &dyn PlatformFs,
) -> InstallSummary {
    if matches!(link_type, LinkType::Clone) && !fsys.supports_clone() {
        // Checked once up front, same as the original's compile-time guard,
        // rather than re-checked per pair.
        let mut summary = InstallSummary::default();
        summary.any_failure = true;
        ctx.exit_status = true;
        let _ = writeln!(
            ctx.stderr,
            "error: clone linking is not supported on this platform"
        );
        return summary;
    }

    let mut summary = InstallSummary::default();
    let mut view = ClassView::default();
    let mut reporter = Reporter::new(&mut *ctx.stdout, &mut *ctx.stderr, ctx.options.hide_progress);

    let mut current = classes;
    while let Some(representative) = current {
        let next_class = representative.borrow().next.clone();
        let has_dupes = representative.borrow().has_dupes;

        if has_dupes {
            view.rebuild_from(&representative);
            trace!(size = view.len(), "processing class");
            if view.len() > 1 {
                reporter.mark_class_had_duplicates();
                process_class(view.members(), link_type, ctx.pathbuf_size, &ctx.options, fsys, &mut reporter, &mut summary);
            }
            summary.classes_processed += 1;
        }

        if only_first_class {
            break;
        }
        current = next_class;
    }

    reporter.end_of_pass();
    ctx.exit_status = summary.any_failure;
    debug!(?summary, "install_links finished");
    summary
}

fn process_class(
    members: &[Rc<RefCell<FileRecord>>],
    link_type: LinkType,
    pathbuf_size: usize,
    options: &EngineOptions,
    fsys: &dyn PlatformFs,
    reporter: &mut Reporter<'_>,
    summary: &mut InstallSummary,
) {
    let Some(plan) = plan_class(members, link_type) else {
        // Symbolic class with no non-symlink member: skip entirely (P6).
        return;
    };

    let mut source_index = plan.source_index;
    let mut symlink_source_index = plan.symlink_source_index;

    reporter.source(&members[source_index].borrow().path);

    for &dup_index in &plan.duplicate_indices {
        if dup_index == source_index {
            // Already consumed as a promoted source earlier in this class.
            continue;
        }

        let source_snapshot = members[source_index].borrow().clone();
        let dup_snapshot = members[dup_index].borrow().clone();

        let gate = check_pair(
            fsys,
            &source_snapshot,
            &dup_snapshot,
            link_type,
            symlink_source_index,
            dup_index,
            options.consider_hard_links,
            options.no_change_check,
        );

        match gate {
            GateResult::Proceed(capture) => {
                let outcome = core::install_pair(
                    fsys,
                    &source_snapshot,
                    &dup_snapshot,
                    link_type,
                    capture,
                    pathbuf_size,
                );
                record_outcome(&outcome, &dup_snapshot.path, &source_snapshot.path, reporter, summary);
            }
            GateResult::AlreadyLinked => {
                record_outcome(&Outcome::AlreadyLinked, &dup_snapshot.path, &source_snapshot.path, reporter, summary);
            }
            GateResult::SkipSilent(reason) | GateResult::SkipWarn(reason) => {
                record_outcome(&Outcome::Skipped(reason), &dup_snapshot.path, &source_snapshot.path, reporter, summary);
            }
            GateResult::SourcePromote(reason) => {
                record_outcome(&Outcome::Promoted(reason), &dup_snapshot.path, &source_snapshot.path, reporter, summary);
                source_index = dup_index;
                symlink_source_index = if matches!(link_type, LinkType::Symbolic) {
                    Some(dup_index)
                } else {
                    None
                };
            }
        }
    }
}

fn record_outcome(
    outcome: &Outcome,
    dup_path: &std::path::Path,
    src_path: &std::path::Path,
    reporter: &mut Reporter<'_>,
    summary: &mut InstallSummary,
) {
    match outcome {
        Outcome::Success(glyph) => {
            reporter.success(*glyph, dup_path);
            summary.pairs_succeeded += 1;
        }
        Outcome::AlreadyLinked => {
            reporter.already_linked(dup_path);
        }
        Outcome::Skipped(reason) => {
            if !reason.is_harmless() {
                reporter.skip_warn(*reason, dup_path);
            }
            summary.pairs_skipped += 1;
        }
        Outcome::Promoted(reason) => {
            reporter.promote(*reason, src_path);
        }
        Outcome::Failed(reason) => {
            match reason {
                FailReason::LinkFailed(detail) => {
                    reporter.link_fail_glyph(dup_path);
                    reporter.link_failed(dup_path, src_path, detail);
                }
                FailReason::CloneMetadataFailed(detail) => {
                    reporter.clone_metadata_warning(detail, dup_path);
                }
                FailReason::CleanupFailed | FailReason::RevertFailed { .. } => {}
            }
            reporter.failed(reason);
            summary.pairs_failed += 1;
        }
    }

    if outcome.sets_failure_bit() {
        summary.any_failure = true;
    }
}
