//! Core data model.
//!
//! An assignment is one person's obligation to complete one task. It has
//! identity, a fixed lifecycle (the status state machine), an append-only
//! history trail, and at most one verification record once it completes.
//! Snapshots are derived aggregates — a cache, never a source of truth.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

/// Newtype for assignment IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssignmentId(pub Uuid);

impl AssignmentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for AssignmentId {
    fn default() -> Self {
        Self::new()
    }
}

/// Newtype for task IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// Newtype for subject (person) IDs. Integer keys, assigned by the roster.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SubjectId(pub i64);

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype for department IDs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DepartmentId(pub i64);

impl std::fmt::Display for DepartmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Assigned, not yet picked up.
    NotStarted,
    /// Picked up by the assignee.
    Started,
    /// Actively being worked.
    InProgress,
    /// Done, awaiting review. Terminal for normal transitions.
    Completed,
    /// Parked; resumable back to in-progress.
    OnHold,
    /// Abandoned. Terminal.
    Cancelled,
}

impl Status {
    /// Can a caller transition from self to `to`?
    ///
    /// `Completed -> InProgress` is deliberately absent: that edge is the
    /// revision path reserved for the verification engine.
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (NotStarted, Started)
                | (Started, InProgress)
                | (InProgress, Completed)
                | (Started, OnHold)
                | (InProgress, OnHold)
                | (OnHold, InProgress)   // resume
                | (NotStarted, Cancelled)
                | (Started, Cancelled)
                | (InProgress, Cancelled)
                | (OnHold, Cancelled)
        )
    }

    /// Is this a terminal status?
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Cancelled)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::NotStarted => "not_started",
            Status::Started => "started",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
            Status::OnHold => "on_hold",
            Status::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "not_started" => Ok(Status::NotStarted),
            "started" => Ok(Status::Started),
            "in_progress" => Ok(Status::InProgress),
            "completed" => Ok(Status::Completed),
            "on_hold" => Ok(Status::OnHold),
            "cancelled" => Ok(Status::Cancelled),
            _ => Err(Error::Validation(format!("unknown status: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Priority tier of the underlying task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(Error::Validation(format!("unknown priority: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Period
// ---------------------------------------------------------------------------

/// Aggregation granularity for snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "daily" => Ok(Period::Daily),
            "weekly" => Ok(Period::Weekly),
            "monthly" => Ok(Period::Monthly),
            _ => Err(Error::InvalidPeriod(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Rate
// ---------------------------------------------------------------------------

/// A rate or score on a 0–100 scale, stored as hundredths of a point.
///
/// Scaled-integer representation keeps percentages exact across large
/// aggregations: `Rate(6667)` is 66.67. Rounds half-up.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Rate(pub i64);

impl Rate {
    pub const ZERO: Rate = Rate(0);

    /// Percentage `numer / denom * 100` in hundredths. Zero when `denom` is 0.
    pub fn percent(numer: i64, denom: i64) -> Rate {
        if denom <= 0 {
            return Rate::ZERO;
        }
        Rate((numer * 10_000 + denom / 2) / denom)
    }

    /// Raw hundredths-of-a-point value.
    pub fn hundredths(self) -> i64 {
        self.0
    }

    /// Mean of a set of rates, in hundredths. Zero for an empty set.
    pub fn mean(rates: impl IntoIterator<Item = Rate>) -> Rate {
        let (mut sum, mut n) = (0i64, 0i64);
        for r in rates {
            sum += r.0;
            n += 1;
        }
        if n == 0 {
            Rate::ZERO
        } else {
            Rate((sum + n / 2) / n)
        }
    }
}

impl std::fmt::Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, (self.0 % 100).abs())
    }
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// A person tracked by the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
    pub department: DepartmentId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------

/// One person's obligation to complete one task.
///
/// `department`, `priority`, and `due_date` are denormalized from the task
/// and roster at creation so the aggregator never needs a join back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub task_id: TaskId,
    pub title: String,
    /// The assignee.
    pub subject: SubjectId,
    pub assigned_by: SubjectId,
    pub department: DepartmentId,
    pub priority: Priority,
    pub due_date: DateTime<Utc>,
    pub status: Status,
    pub notes: Option<String>,
    pub assigned_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Immutable audit entry. One per successful status transition, appended
/// in the same transaction as the status write. Never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Monotonic sequence number within the log.
    pub seq: i64,
    pub assignment_id: AssignmentId,
    pub previous: Status,
    pub current: Status,
    pub changed_at: DateTime<Utc>,
    pub changed_by: SubjectId,
    pub note: Option<String>,
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Review outcome for a completed assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Waiting for review.
    Pending,
    /// Verified and accepted.
    Approved,
    /// Sent back; the assignment is forced into revision.
    Rejected,
    /// Minor issues, resubmit. The assignment stays where it is.
    NeedsRevision,
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Approved => "approved",
            VerificationStatus::Rejected => "rejected",
            VerificationStatus::NeedsRevision => "needs_revision",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for VerificationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "pending" => Ok(VerificationStatus::Pending),
            "approved" => Ok(VerificationStatus::Approved),
            "rejected" => Ok(VerificationStatus::Rejected),
            "needs_revision" => Ok(VerificationStatus::NeedsRevision),
            _ => Err(Error::Validation(format!(
                "unknown verification status: {s}"
            ))),
        }
    }
}

/// Post-completion review record. At most one per assignment, opened the
/// first time the assignment reaches `Completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub assignment_id: AssignmentId,
    pub status: VerificationStatus,
    pub verified_by: Option<SubjectId>,
    pub comments: Option<String>,
    /// When the record was opened (the assignment's first completion).
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    /// Monotonically incrementing; never decreases.
    pub rejection_count: u32,
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Per-subject performance aggregate for one half-open window
/// `[window_start, window_end)`. Keyed by (subject, period, window_start);
/// recomputation replaces rather than appends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectSnapshot {
    pub subject: SubjectId,
    pub department: DepartmentId,
    pub period: Period,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,

    pub total_assigned: u32,
    pub completed: u32,
    pub pending: u32,
    pub on_hold: u32,
    pub cancelled: u32,

    /// Currently defined as equal to `completed`, not actual verification
    /// approvals. Kept as-is pending a product decision.
    pub approved: u32,
    pub approval_rate: Rate,
    /// Revision edges (completed -> in_progress) in the group's history.
    pub revision_count: u32,

    pub avg_completion_hours: f64,
    pub on_time: u32,
    pub late: u32,

    pub high_priority_completed: u32,
    pub medium_priority_completed: u32,
    pub low_priority_completed: u32,

    pub efficiency_score: Rate,
    pub computed_at: DateTime<Utc>,
}

/// Department rollup over the subject snapshots inside a window.
/// Derived on demand; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentSnapshot {
    pub department: DepartmentId,
    pub period: Period,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,

    pub total_assigned: u32,
    pub completed: u32,
    pub approved: u32,
    pub revision_count: u32,
    pub approval_rate: Rate,

    pub team_members_active: u32,
    pub top_subject: Option<SubjectId>,
    pub avg_efficiency_score: Rate,
    pub computed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for creating assignments. The engine's public API for intake.
pub struct NewAssignment {
    pub(crate) title: String,
    pub(crate) subject: SubjectId,
    pub(crate) assigned_by: SubjectId,
    pub(crate) task_id: TaskId,
    pub(crate) priority: Priority,
    pub(crate) due_date: Option<DateTime<Utc>>,
    pub(crate) notes: Option<String>,
    pub(crate) assigned_at: Option<DateTime<Utc>>,
}

impl NewAssignment {
    pub fn new(title: impl Into<String>, subject: SubjectId, assigned_by: SubjectId) -> Self {
        Self {
            title: title.into(),
            subject,
            assigned_by,
            task_id: TaskId::new(),
            priority: Priority::Medium,
            due_date: None,
            notes: None,
            assigned_at: None,
        }
    }

    pub fn task(mut self, task_id: TaskId) -> Self {
        self.task_id = task_id;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn due(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Backdate the assignment (importing historical records).
    pub fn assigned_at(mut self, at: DateTime<Utc>) -> Self {
        self.assigned_at = Some(at);
        self
    }
}
