//! Audit stamping
//!
//! Fills creation and modification audit fields on staged entities right
//! before a commit. Only entities staged for insert or update are visited:
//!
//! | State    | Capability   | Effect                                        |
//! |----------|--------------|-----------------------------------------------|
//! | Added    | CreateStamp  | set `created_at` / `created_by` only if unset |
//! | Modified | ModifyStamp  | overwrite `modified_at` / `modified_by`       |
//!
//! Set-based update and delete paths never pass through here.

use crate::session::{EntryState, Session};
use arbor_core::{Actor, CreateStamp, Entity, ModifyStamp};
use chrono::{DateTime, Utc};
use tracing::trace;

/// Counts from one stamping pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StampReport {
    /// Added entities carrying a creation stamp
    pub created: usize,
    /// Modified entities carrying a modification stamp
    pub modified: usize,
    /// Staged entities without the matching capability
    pub skipped: usize,
}

/// Applies audit metadata to staged changes
pub struct AuditStamper;

impl AuditStamper {
    /// Stamp every staged insert and update with the current UTC time
    pub fn stamp(session: &Session, actor: Option<&Actor>) -> StampReport {
        Self::stamp_at(session, actor, Utc::now())
    }

    /// Stamp with an explicit clock reading
    pub fn stamp_at(session: &Session, actor: Option<&Actor>, now: DateTime<Utc>) -> StampReport {
        let mut report = StampReport::default();
        session.for_each_pending(|state, entity| match state {
            EntryState::Added => match entity.creation() {
                Some(stamp) => {
                    apply_create(stamp, actor, now);
                    report.created += 1;
                }
                None => report.skipped += 1,
            },
            EntryState::Modified => match entity.modification() {
                Some(stamp) => {
                    apply_modify(stamp, actor, now);
                    report.modified += 1;
                }
                None => report.skipped += 1,
            },
            EntryState::Unchanged | EntryState::Deleted => {}
        });
        trace!(
            target: "arbor::stamper",
            session = session.id(),
            created = report.created,
            modified = report.modified,
            "Stamped pending changes"
        );
        report
    }

    /// Stamp an entity that is about to be inserted outside change tracking.
    ///
    /// Returns false if the entity is not Createable.
    pub fn stamp_new<T: Entity>(entity: &mut T, actor: Option<&Actor>, now: DateTime<Utc>) -> bool {
        match entity.create_stamp() {
            Some(stamp) => {
                apply_create(stamp, actor, now);
                true
            }
            None => false,
        }
    }
}

fn apply_create(stamp: &mut CreateStamp, actor: Option<&Actor>, now: DateTime<Utc>) {
    if stamp.created_at.is_none() {
        stamp.created_at = Some(now);
    }
    let unset = stamp.created_by.as_ref().map_or(true, Actor::is_empty);
    if unset {
        if let Some(actor) = actor {
            stamp.created_by = Some(actor.clone());
        }
    }
}

fn apply_modify(stamp: &mut ModifyStamp, actor: Option<&Actor>, now: DateTime<Utc>) {
    stamp.modified_at = Some(now);
    stamp.modified_by = actor.cloned();
}
