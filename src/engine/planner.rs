//! Link planner (§4.3): chooses the initial source of a class and drives
//! mid-class source promotion.

use std::cell::RefCell;
use std::rc::Rc;

use crate::engine::model::{FileRecord, LinkType};

/// Starting point for one class: which member is the source, and which
/// members to iterate (by index into the `ClassView`).
pub struct Plan {
    pub source_index: usize,
    /// Indices, in order, that the core should attempt to link to `source_index`.
    pub duplicate_indices: Vec<usize>,
    /// For Symbolic jobs, the index of the chosen source (so the gate can
    /// skip a duplicate that turns out to be the source itself).
    pub symlink_source_index: Option<usize>,
}

/// Build the initial plan for a class per link type (§4.3).
///
/// Returns `None` for a Symbolic class with no non-symlink member (P6): the
/// whole class is skipped, silently, by the caller.
pub fn plan_class(
    members: &[Rc<RefCell<FileRecord>>],
    link_type: LinkType,
) -> Option<Plan> {
    match link_type {
        LinkType::Hard | LinkType::Clone => {
            if members.len() < 2 {
                return None;
            }
            Some(Plan {
                source_index: 0,
                duplicate_indices: (1..members.len()).collect(),
                symlink_source_index: None,
            })
        }
        LinkType::Symbolic => {
            let source_index = members
                .iter()
                .position(|m| !m.borrow().is_symlink)?;
            Some(Plan {
                source_index,
                duplicate_indices: (0..members.len()).filter(|&i| i != source_index).collect(),
                symlink_source_index: Some(source_index),
            })
        }
    }
}
