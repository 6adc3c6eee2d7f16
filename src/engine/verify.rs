//! Verification operations: the post-completion review gate.
//!
//! Approval never touches assignment status. Rejection drives the
//! assignment back through the reserved revision edge, and both writes
//! commit atomically. A revision request increments the rejection counter
//! but leaves the assignment alone — observed behavior, kept asymmetric
//! pending a product decision.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::model::*;

use super::{Engine, workflow};

/// A pending review as surfaced to department leads and the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct PendingReview {
    pub assignment_id: AssignmentId,
    pub task_id: TaskId,
    pub title: String,
    pub subject: SubjectId,
    pub subject_name: String,
    pub priority: Priority,
    pub completed_at: Option<DateTime<Utc>>,
    /// When the verification record was opened.
    pub waiting_since: DateTime<Utc>,
    pub days_waiting: i64,
}

impl Engine {
    /// Approve a completed assignment's work.
    pub fn approve(
        &mut self,
        id: AssignmentId,
        verifier: SubjectId,
        comments: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        self.storage.with_transaction(|ctx| {
            let mut v = ctx
                .get_verification(id)?
                .ok_or_else(|| Error::NotFound(format!("verification for assignment {id}")))?;

            v.status = VerificationStatus::Approved;
            v.verified_at = Some(now);
            v.verified_by = Some(verifier);
            v.comments = comments.map(str::to_string);
            ctx.update_verification(&v)
        })?;

        info!(assignment = %id, verifier = %verifier, "verification approved");
        Ok(())
    }

    /// Reject a completed assignment's work and force it back into
    /// revision. The verification update and the forced transition are
    /// all-or-nothing.
    pub fn reject(&mut self, id: AssignmentId, verifier: SubjectId, reason: &str) -> Result<()> {
        let now = Utc::now();
        self.storage.with_transaction(|ctx| {
            let assignment = ctx.get_assignment(id)?;
            let mut v = ctx
                .get_verification(id)?
                .ok_or_else(|| Error::NotFound(format!("verification for assignment {id}")))?;

            v.status = VerificationStatus::Rejected;
            v.rejection_count += 1;
            v.rejected_at = Some(now);
            v.rejection_reason = Some(reason.to_string());
            v.verified_by = Some(verifier);
            ctx.update_verification(&v)?;

            workflow::force_revision(
                ctx,
                &assignment,
                verifier,
                format!("Rejected for revision: {reason}"),
                now,
            )
        })?;

        info!(assignment = %id, verifier = %verifier, reason, "verification rejected");
        Ok(())
    }

    /// Flag minor issues for resubmission. Increments the rejection
    /// counter but does not move the assignment.
    pub fn request_revision(
        &mut self,
        id: AssignmentId,
        verifier: SubjectId,
        notes: &str,
    ) -> Result<()> {
        self.storage.with_transaction(|ctx| {
            let mut v = ctx
                .get_verification(id)?
                .ok_or_else(|| Error::NotFound(format!("verification for assignment {id}")))?;

            v.status = VerificationStatus::NeedsRevision;
            v.rejection_count += 1;
            v.rejection_reason = Some(notes.to_string());
            v.verified_by = Some(verifier);
            ctx.update_verification(&v)
        })?;

        info!(assignment = %id, verifier = %verifier, "revision requested");
        Ok(())
    }

    /// Fetch the verification record for an assignment, if one exists.
    pub fn get_verification(&self, id: AssignmentId) -> Result<Option<Verification>> {
        self.storage.get_verification(id)
    }

    /// Pending verifications for a department, oldest first.
    pub fn pending_verifications(&self, department: DepartmentId) -> Result<Vec<PendingReview>> {
        self.storage.get_department(department)?;
        let rows = self.storage.pending_verifications(Some(department), -1)?;
        Ok(build_pending(rows, Utc::now()))
    }
}

pub(crate) fn build_pending(
    rows: Vec<(Verification, Assignment, String)>,
    now: DateTime<Utc>,
) -> Vec<PendingReview> {
    rows.into_iter()
        .map(|(v, a, subject_name)| PendingReview {
            assignment_id: a.id,
            task_id: a.task_id,
            title: a.title,
            subject: a.subject,
            subject_name,
            priority: a.priority,
            completed_at: a.completed_at,
            waiting_since: v.created_at,
            days_waiting: (now - v.created_at).num_days(),
        })
        .collect()
}
