//! Metrics aggregation: batch-compiled performance snapshots.
//!
//! One snapshot per subject per half-open window `[from, to)`. Triggered
//! explicitly, never by events. The whole window commits as a single
//! transaction: recompute replaces the window's rows (never appends), and
//! a failure partway through leaves no partial set behind.
//!
//! Aggregation reads workflow state only — assignments and their history.
//! The "approved" count is defined as the completed count, not actual
//! verification outcomes; kept as-is pending product confirmation.

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, Days, NaiveDate, Utc};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::*;

use super::Engine;

/// Weighted score components: completion 40%, approval 35%, timeliness 25%.
const WEIGHT_COMPLETION: i64 = 40;
const WEIGHT_APPROVAL: i64 = 35;
const WEIGHT_ON_TIME: i64 = 25;

impl Engine {
    /// Compute and persist one snapshot per subject for `[from, to)`.
    /// Returns the number of snapshot rows written.
    pub fn compute_snapshots(
        &mut self,
        from: NaiveDate,
        to: NaiveDate,
        period: Period,
    ) -> Result<usize> {
        if to <= from {
            return Err(Error::Validation(format!(
                "window end {to} must be after start {from}"
            )));
        }

        let now = Utc::now();
        let written = self.storage.with_transaction(|ctx| {
            let assignments = ctx.assignments_assigned_between(from, to)?;
            let revisions: HashMap<SubjectId, u32> =
                ctx.revision_counts_between(from, to)?.into_iter().collect();

            let mut snapshots = Vec::new();
            for group in group_by_subject(&assignments) {
                let subject = group[0].subject;
                let revision_count = revisions.get(&subject).copied().unwrap_or(0);
                let snapshot = compile_snapshot(group, revision_count, period, from, to, now);
                debug!(
                    subject = %subject,
                    total = snapshot.total_assigned,
                    score = %snapshot.efficiency_score,
                    "compiled snapshot"
                );
                snapshots.push(snapshot);
            }

            ctx.replace_snapshots(period, from, &snapshots)?;
            Ok(snapshots.len())
        })?;

        info!(%period, %from, %to, written, "snapshots computed");
        Ok(written)
    }

    /// Daily window: `[date, date+1)`.
    pub fn compute_daily(&mut self, date: NaiveDate) -> Result<usize> {
        self.compute_snapshots(date, next_day(date)?, Period::Daily)
    }

    /// Weekly window anchored to the Sunday of `any_day`'s week.
    pub fn compute_weekly(&mut self, any_day: NaiveDate) -> Result<usize> {
        let start = week_start(any_day);
        let end = start
            .checked_add_days(Days::new(7))
            .ok_or_else(|| Error::Validation(format!("date out of range: {start}")))?;
        self.compute_snapshots(start, end, Period::Weekly)
    }

    /// Monthly window: the whole calendar month.
    pub fn compute_monthly(&mut self, year: i32, month: u32) -> Result<usize> {
        let (start, end) = month_window(year, month)?;
        self.compute_snapshots(start, end, Period::Monthly)
    }

    // -----------------------------------------------------------------------
    // Derived queries
    // -----------------------------------------------------------------------

    /// Snapshots for one subject and period, most recent window first.
    pub fn subject_snapshots(
        &self,
        subject: SubjectId,
        period: Period,
    ) -> Result<Vec<SubjectSnapshot>> {
        self.storage.get_subject(subject)?;
        self.storage.subject_snapshots(subject, period)
    }

    /// Top-N subjects in the department's latest window, ranked by
    /// efficiency score descending, ties broken by subject id ascending.
    pub fn top_performers(
        &self,
        department: DepartmentId,
        period: Period,
        top_n: i64,
    ) -> Result<Vec<SubjectSnapshot>> {
        self.storage.get_department(department)?;
        let Some(latest) = self.storage.latest_window_start(Some(department), period)? else {
            return Ok(Vec::new());
        };
        self.storage
            .ranked_snapshots(Some(department), period, latest, top_n)
    }

    /// Best single performer across windows starting in `[from, to)`.
    pub fn best_performer(
        &self,
        department: DepartmentId,
        period: Period,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Option<SubjectSnapshot>> {
        self.storage.get_department(department)?;
        let rows = self
            .storage
            .snapshots_in_range(Some(department), period, from, to)?;
        Ok(pick_best(rows))
    }

    /// Department rollup over the subject snapshots inside the window.
    /// Derived on demand; not persisted.
    pub fn department_snapshot(
        &self,
        department: DepartmentId,
        period: Period,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<DepartmentSnapshot> {
        self.storage.get_department(department)?;
        let rows = self
            .storage
            .snapshots_in_range(Some(department), period, from, to)?;

        let total_assigned: u32 = rows.iter().map(|s| s.total_assigned).sum();
        let completed: u32 = rows.iter().map(|s| s.completed).sum();
        let approved: u32 = rows.iter().map(|s| s.approved).sum();
        let revision_count: u32 = rows.iter().map(|s| s.revision_count).sum();
        let members: HashSet<SubjectId> = rows.iter().map(|s| s.subject).collect();
        let avg = Rate::mean(rows.iter().map(|s| s.efficiency_score));
        let top = pick_best(rows).map(|s| s.subject);

        Ok(DepartmentSnapshot {
            department,
            period,
            window_start: from,
            window_end: to,
            total_assigned,
            completed,
            approved,
            revision_count,
            approval_rate: Rate::percent(approved as i64, total_assigned as i64),
            team_members_active: members.len() as u32,
            top_subject: top,
            avg_efficiency_score: avg,
            computed_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Snapshot compilation
// ---------------------------------------------------------------------------

/// Split a subject-sorted slice into per-subject groups.
fn group_by_subject(assignments: &[Assignment]) -> Vec<&[Assignment]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for i in 1..=assignments.len() {
        if i == assignments.len() || assignments[i].subject != assignments[start].subject {
            groups.push(&assignments[start..i]);
            start = i;
        }
    }
    groups
}

fn compile_snapshot(
    group: &[Assignment],
    revision_count: u32,
    period: Period,
    window_start: NaiveDate,
    window_end: NaiveDate,
    now: chrono::DateTime<Utc>,
) -> SubjectSnapshot {
    let total = group.len() as u32;
    let count = |status: Status| group.iter().filter(|a| a.status == status).count() as u32;

    let completed_items: Vec<&Assignment> = group
        .iter()
        .filter(|a| a.status == Status::Completed)
        .collect();
    let completed = completed_items.len() as u32;

    // On-time when a completion timestamp exists and beat the due date;
    // the complement among completed items is late.
    let on_time = completed_items
        .iter()
        .filter(|a| a.completed_at.is_some_and(|c| c <= a.due_date))
        .count() as u32;
    let late = completed - on_time;

    let by_priority = |p: Priority| completed_items.iter().filter(|a| a.priority == p).count() as u32;

    let durations: Vec<f64> = completed_items
        .iter()
        .filter_map(|a| {
            a.completed_at
                .map(|done| (done - a.assigned_at).num_seconds() as f64 / 3600.0)
        })
        .collect();
    let avg_completion_hours = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<f64>() / durations.len() as f64
    };

    // "Approved" is currently the completed count (see module doc).
    let approved = completed;
    let approval_rate = Rate::percent(approved as i64, total as i64);
    let efficiency_score = efficiency_score(total, completed, approval_rate, on_time);

    SubjectSnapshot {
        subject: group[0].subject,
        department: group[0].department,
        period,
        window_start,
        window_end,
        total_assigned: total,
        completed,
        pending: count(Status::NotStarted),
        on_hold: count(Status::OnHold),
        cancelled: count(Status::Cancelled),
        approved,
        approval_rate,
        revision_count,
        avg_completion_hours,
        on_time,
        late,
        high_priority_completed: by_priority(Priority::High),
        medium_priority_completed: by_priority(Priority::Medium),
        low_priority_completed: by_priority(Priority::Low),
        efficiency_score,
        computed_at: now,
    }
}

/// Weighted efficiency score in `[0, 100]`:
/// `completionRate*0.40 + approvalFraction*0.35 + onTimeRate*0.25`.
/// Scaled-integer throughout, each component rounded half-up.
fn efficiency_score(total: u32, completed: u32, approval_rate: Rate, on_time: u32) -> Rate {
    if total == 0 {
        return Rate::ZERO;
    }
    let completion = Rate::percent(completed as i64, total as i64);
    let on_time_rate = Rate::percent(on_time as i64, completed as i64);

    let weigh = |rate: Rate, weight: i64| (rate.hundredths() * weight + 50) / 100;
    Rate(
        weigh(completion, WEIGHT_COMPLETION)
            + weigh(approval_rate, WEIGHT_APPROVAL)
            + weigh(on_time_rate, WEIGHT_ON_TIME),
    )
}

/// Highest score wins; ties go to the lowest subject id for determinism.
fn pick_best(rows: Vec<SubjectSnapshot>) -> Option<SubjectSnapshot> {
    rows.into_iter().max_by(|a, b| {
        a.efficiency_score
            .cmp(&b.efficiency_score)
            .then(b.subject.cmp(&a.subject))
    })
}

// ---------------------------------------------------------------------------
// Window math
// ---------------------------------------------------------------------------

pub(crate) fn next_day(date: NaiveDate) -> Result<NaiveDate> {
    date.succ_opt()
        .ok_or_else(|| Error::Validation(format!("date out of range: {date}")))
}

/// Sunday of the week containing `date`.
pub(crate) fn week_start(date: NaiveDate) -> NaiveDate {
    date - chrono::Duration::days(date.weekday().num_days_from_sunday() as i64)
}

/// Half-open calendar month window.
pub(crate) fn month_window(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| Error::Validation(format!("invalid month: {year}-{month:02}")))?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| Error::Validation(format!("invalid month: {year}-{month:02}")))?;
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_start_snaps_to_sunday() {
        // 2026-08-19 is a Wednesday
        let wed = NaiveDate::from_ymd_opt(2026, 8, 19).unwrap();
        assert_eq!(week_start(wed), NaiveDate::from_ymd_opt(2026, 8, 16).unwrap());
        // A Sunday stays put
        let sun = NaiveDate::from_ymd_opt(2026, 8, 16).unwrap();
        assert_eq!(week_start(sun), sun);
    }

    #[test]
    fn month_window_handles_december() {
        let (start, end) = month_window(2026, 12).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 12, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2027, 1, 1).unwrap());
    }

    #[test]
    fn month_window_rejects_bad_month() {
        assert!(month_window(2026, 13).is_err());
        assert!(month_window(2026, 0).is_err());
    }

    #[test]
    fn efficiency_score_matches_weighted_formula() {
        // 3 assigned, 2 completed on time: approval 66.67
        let approval = Rate::percent(2, 3);
        let score = efficiency_score(3, 2, approval, 2);
        // 40% of 66.67 + 35% of 66.67 + 25% of 100.00
        assert_eq!(score, Rate(2667 + 2333 + 2500));
    }

    #[test]
    fn efficiency_score_is_zero_for_empty_group() {
        assert_eq!(efficiency_score(0, 0, Rate::ZERO, 0), Rate::ZERO);
    }

    #[test]
    fn perfect_record_scores_one_hundred() {
        let score = efficiency_score(4, 4, Rate::percent(4, 4), 4);
        assert_eq!(score, Rate(10_000));
    }
}
