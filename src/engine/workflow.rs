//! Workflow operations: the sole path for assignment status mutation.
//!
//! Every successful transition appends exactly one history record in the
//! same transaction as the status write. Reaching `Completed` for the
//! first time opens a `Pending` verification record — the join point with
//! the verification engine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::model::*;
use crate::storage::TxContext;

use super::Engine;

/// An assignment together with its full audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentDetail {
    pub assignment: Assignment,
    pub history: Vec<HistoryRecord>,
}

impl Engine {
    /// Create a new assignment in `NotStarted`. Creation itself is not a
    /// transition, so no history record is appended.
    pub fn create_assignment(&mut self, new: NewAssignment) -> Result<Assignment> {
        let subject = self.storage.get_subject(new.subject)?;

        let now = Utc::now();
        let assigned_at = new.assigned_at.unwrap_or(now);
        let assignment = Assignment {
            id: AssignmentId::new(),
            task_id: new.task_id,
            title: new.title,
            subject: subject.id,
            assigned_by: new.assigned_by,
            department: subject.department,
            priority: new.priority,
            due_date: new.due_date.unwrap_or(assigned_at + chrono::Duration::days(1)),
            status: Status::NotStarted,
            notes: new.notes,
            assigned_at,
            completed_at: None,
            updated_at: now,
        };

        self.storage
            .with_transaction(|ctx| ctx.insert_assignment(&assignment))?;

        info!(assignment = %assignment.id, subject = %subject.id, "assignment created");
        Ok(assignment)
    }

    /// Transition an assignment to `new_status`.
    ///
    /// Fails with `NotFound` for a missing assignment and
    /// `InvalidTransition` for an edge outside the transition table; no
    /// mutation occurs on failure. On success the status write, the
    /// history append, and (on first completion) the verification record
    /// commit as one unit.
    pub fn change_status(
        &mut self,
        id: AssignmentId,
        new_status: Status,
        actor: SubjectId,
        notes: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        let previous = self.storage.with_transaction(|ctx| {
            let assignment = ctx.get_assignment(id)?;
            if !assignment.status.can_transition_to(new_status) {
                return Err(Error::InvalidTransition {
                    from: assignment.status,
                    to: new_status,
                });
            }

            let completed_at = if new_status == Status::Completed {
                Some(now)
            } else {
                assignment.completed_at
            };
            ctx.set_status(id, new_status, completed_at, now)?;

            ctx.append_history(&HistoryRecord {
                seq: 0, // assigned by storage
                assignment_id: id,
                previous: assignment.status,
                current: new_status,
                changed_at: now,
                changed_by: actor,
                note: notes.map(str::to_string),
            })?;

            if new_status == Status::Completed && ctx.get_verification(id)?.is_none() {
                ctx.insert_verification(&Verification {
                    assignment_id: id,
                    status: VerificationStatus::Pending,
                    verified_by: None,
                    comments: None,
                    created_at: now,
                    verified_at: None,
                    rejected_at: None,
                    rejection_reason: None,
                    rejection_count: 0,
                })?;
            }

            Ok(assignment.status)
        })?;

        info!(assignment = %id, from = %previous, to = %new_status, actor = %actor, "status changed");
        Ok(())
    }

    /// Get an assignment by ID.
    pub fn get_assignment(&self, id: AssignmentId) -> Result<Assignment> {
        self.storage.get_assignment(id)
    }

    /// History for an assignment, oldest first.
    pub fn history(&self, id: AssignmentId) -> Result<Vec<HistoryRecord>> {
        self.storage.get_assignment(id)?;
        self.storage.history_for(id)
    }

    /// Assignment plus its full history.
    pub fn assignment_detail(&self, id: AssignmentId) -> Result<AssignmentDetail> {
        let assignment = self.storage.get_assignment(id)?;
        let history = self.storage.history_for(id)?;
        Ok(AssignmentDetail {
            assignment,
            history,
        })
    }
}

/// The reserved revision edge: force `Completed -> InProgress`.
///
/// Crate-internal on purpose — only the verification engine's reject path
/// may take it, inside its own transaction. Clears `completed_at` (the
/// work is no longer complete) and appends the history record carrying
/// the rejection note.
pub(crate) fn force_revision(
    ctx: &mut TxContext,
    assignment: &Assignment,
    actor: SubjectId,
    note: String,
    now: DateTime<Utc>,
) -> Result<()> {
    if assignment.status != Status::Completed {
        return Err(Error::InvalidTransition {
            from: assignment.status,
            to: Status::InProgress,
        });
    }

    ctx.set_status(assignment.id, Status::InProgress, None, now)?;
    ctx.append_history(&HistoryRecord {
        seq: 0, // assigned by storage
        assignment_id: assignment.id,
        previous: Status::Completed,
        current: Status::InProgress,
        changed_at: now,
        changed_by: actor,
        note: Some(note),
    })?;
    Ok(())
}
