//! Report composition: read-only views over stored snapshots plus two
//! live sections (pending reviews, status distribution).
//!
//! A weekly view always carries exactly 7 daily buckets; a monthly view
//! always carries exactly 4 fixed 7-day buckets anchored at day 1 of the
//! month. The monthly split is a calendar approximation — days 29–31 fall
//! outside every bucket — kept deliberately, not a bug to fix here.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::*;

use super::Engine;
use super::metrics::{month_window, next_day, week_start};
use super::verify::{self, PendingReview};

// ---------------------------------------------------------------------------
// View types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct DailyView {
    pub date: NaiveDate,
    pub total_assigned: u32,
    pub completed: u32,
    pub pending: u32,
    pub on_hold: u32,
    pub cancelled: u32,
    pub on_time: u32,
    pub late: u32,
    pub avg_completion_hours: f64,
    pub approval_rate: Rate,
    pub avg_efficiency_score: Rate,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyBucket {
    pub date: NaiveDate,
    pub completed: u32,
    pub revisions: u32,
    pub avg_efficiency_score: Rate,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyView {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub total_completed: u32,
    pub high_priority_completed: u32,
    pub medium_priority_completed: u32,
    pub low_priority_completed: u32,
    pub revision_count: u32,
    pub approval_rate: Rate,
    pub avg_efficiency_score: Rate,
    /// Always exactly 7 entries, zero-filled where no snapshots exist.
    pub daily_breakdown: Vec<DailyBucket>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyBucket {
    /// 1-based bucket number within the month.
    pub week: u32,
    pub completed: u32,
    pub approved: u32,
    pub revisions: u32,
    pub avg_efficiency_score: Rate,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriorityBreakdown {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyView {
    pub year: i32,
    pub month: u32,
    pub total_assigned: u32,
    pub completed: u32,
    pub approved: u32,
    pub revision_count: u32,
    pub approval_rate: Rate,
    pub avg_efficiency_score: Rate,
    pub active_subjects: u32,
    /// Always exactly 4 fixed 7-day buckets from day 1 (see module doc).
    pub weekly_breakdown: Vec<WeeklyBucket>,
    pub priority_distribution: PriorityBreakdown,
}

/// Textual rating derived from the efficiency score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Excellent,
    Good,
    Fair,
    NeedsImprovement,
}

impl Rating {
    pub fn from_score(score: Rate) -> Self {
        match score.hundredths() {
            s if s >= 9_000 => Rating::Excellent,
            s if s >= 7_500 => Rating::Good,
            s if s >= 6_000 => Rating::Fair,
            _ => Rating::NeedsImprovement,
        }
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Rating::Excellent => "Excellent",
            Rating::Good => "Good",
            Rating::Fair => "Fair",
            Rating::NeedsImprovement => "Needs Improvement",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectReport {
    pub subject: SubjectId,
    pub name: String,
    pub department: String,
    pub assigned: u32,
    pub completed: u32,
    pub approved: u32,
    pub revisions: u32,
    pub on_time: u32,
    pub late: u32,
    pub completion_rate: Rate,
    pub approval_rate: Rate,
    pub avg_completion_hours: f64,
    pub efficiency_score: Rate,
    pub rating: Rating,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepartmentReport {
    pub department: DepartmentId,
    pub name: String,
    pub team_size: u32,
    pub total_assigned: u32,
    pub completed: u32,
    pub approved: u32,
    pub revisions: u32,
    pub approval_rate: Rate,
    pub avg_efficiency_score: Rate,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub period: Period,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total_subjects: u32,
    pub total_assigned: u32,
    pub total_completed: u32,
    pub overall_approval_rate: Rate,
    pub overall_efficiency_score: Rate,
    /// Sorted by efficiency score descending, subject id ascending.
    pub subjects: Vec<SubjectReport>,
    pub departments: Vec<DepartmentReport>,
    pub top_performer: Option<String>,
    pub needs_improvement: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    Gold,
    Silver,
    Bronze,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformerEntry {
    pub rank: u32,
    pub subject: SubjectId,
    pub name: String,
    pub department: String,
    pub efficiency_score: Rate,
    pub completed: u32,
    pub approval_rate: Rate,
    pub avg_completion_hours: f64,
    pub on_time: u32,
    pub high_priority_completed: u32,
    pub badge: Option<Badge>,
}

/// Live status counts across all assignments. Not windowed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusDistribution {
    pub not_started: u32,
    pub started: u32,
    pub in_progress: u32,
    pub completed: u32,
    pub on_hold: u32,
    pub cancelled: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub date: NaiveDate,
    pub daily: DailyView,
    pub weekly: WeeklyView,
    pub monthly: MonthlyView,
    pub top_performers: Vec<PerformerEntry>,
    pub pending_verifications: Vec<PendingReview>,
    pub status_distribution: StatusDistribution,
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

impl Engine {
    /// One day's rollup from that day's Daily-period snapshot rows.
    pub fn daily_view(&self, date: NaiveDate) -> Result<DailyView> {
        let rows = self
            .storage
            .snapshots_in_range(None, Period::Daily, date, next_day(date)?)?;

        let total_assigned: u32 = rows.iter().map(|s| s.total_assigned).sum();
        let approved: u32 = rows.iter().map(|s| s.approved).sum();
        Ok(DailyView {
            date,
            total_assigned,
            completed: rows.iter().map(|s| s.completed).sum(),
            pending: rows.iter().map(|s| s.pending).sum(),
            on_hold: rows.iter().map(|s| s.on_hold).sum(),
            cancelled: rows.iter().map(|s| s.cancelled).sum(),
            on_time: rows.iter().map(|s| s.on_time).sum(),
            late: rows.iter().map(|s| s.late).sum(),
            avg_completion_hours: mean_f64(rows.iter().map(|s| s.avg_completion_hours)),
            approval_rate: Rate::percent(approved as i64, total_assigned as i64),
            avg_efficiency_score: Rate::mean(rows.iter().map(|s| s.efficiency_score)),
        })
    }

    /// Seven daily buckets anchored to the Sunday of `any_day`'s week.
    pub fn weekly_view(&self, any_day: NaiveDate) -> Result<WeeklyView> {
        let start = week_start(any_day);
        let end = add_days(start, 7)?;
        let rows = self
            .storage
            .snapshots_in_range(None, Period::Daily, start, end)?;

        let mut daily_breakdown = Vec::with_capacity(7);
        for i in 0..7 {
            let day = add_days(start, i)?;
            let day_rows: Vec<&SubjectSnapshot> =
                rows.iter().filter(|s| s.window_start == day).collect();
            daily_breakdown.push(DailyBucket {
                date: day,
                completed: day_rows.iter().map(|s| s.completed).sum(),
                revisions: day_rows.iter().map(|s| s.revision_count).sum(),
                avg_efficiency_score: Rate::mean(day_rows.iter().map(|s| s.efficiency_score)),
            });
        }

        let total_assigned: u32 = rows.iter().map(|s| s.total_assigned).sum();
        let total_completed: u32 = rows.iter().map(|s| s.completed).sum();
        let approved: u32 = rows.iter().map(|s| s.approved).sum();
        Ok(WeeklyView {
            week_start: start,
            week_end: end,
            total_completed,
            high_priority_completed: rows.iter().map(|s| s.high_priority_completed).sum(),
            medium_priority_completed: rows.iter().map(|s| s.medium_priority_completed).sum(),
            low_priority_completed: rows.iter().map(|s| s.low_priority_completed).sum(),
            revision_count: rows.iter().map(|s| s.revision_count).sum(),
            approval_rate: Rate::percent(approved as i64, total_assigned as i64),
            avg_efficiency_score: Rate::mean(rows.iter().map(|s| s.efficiency_score)),
            daily_breakdown,
        })
    }

    /// Four fixed 7-day buckets over the calendar month's Daily snapshots.
    pub fn monthly_view(&self, year: i32, month: u32) -> Result<MonthlyView> {
        let (start, end) = month_window(year, month)?;
        let rows = self
            .storage
            .snapshots_in_range(None, Period::Daily, start, end)?;

        let mut weekly_breakdown = Vec::with_capacity(4);
        for w in 0..4 {
            let bucket_start = add_days(start, w * 7)?;
            let bucket_end = add_days(bucket_start, 7)?;
            let bucket_rows: Vec<&SubjectSnapshot> = rows
                .iter()
                .filter(|s| s.window_start >= bucket_start && s.window_start < bucket_end)
                .collect();
            weekly_breakdown.push(WeeklyBucket {
                week: w as u32 + 1,
                completed: bucket_rows.iter().map(|s| s.completed).sum(),
                approved: bucket_rows.iter().map(|s| s.approved).sum(),
                revisions: bucket_rows.iter().map(|s| s.revision_count).sum(),
                avg_efficiency_score: Rate::mean(bucket_rows.iter().map(|s| s.efficiency_score)),
            });
        }

        let total_assigned: u32 = rows.iter().map(|s| s.total_assigned).sum();
        let completed: u32 = rows.iter().map(|s| s.completed).sum();
        let approved: u32 = rows.iter().map(|s| s.approved).sum();
        let active: HashSet<SubjectId> = rows.iter().map(|s| s.subject).collect();
        Ok(MonthlyView {
            year,
            month,
            total_assigned,
            completed,
            approved,
            revision_count: rows.iter().map(|s| s.revision_count).sum(),
            approval_rate: Rate::percent(approved as i64, total_assigned as i64),
            avg_efficiency_score: Rate::mean(rows.iter().map(|s| s.efficiency_score)),
            active_subjects: active.len() as u32,
            weekly_breakdown,
            priority_distribution: PriorityBreakdown {
                high: rows.iter().map(|s| s.high_priority_completed).sum(),
                medium: rows.iter().map(|s| s.medium_priority_completed).sum(),
                low: rows.iter().map(|s| s.low_priority_completed).sum(),
            },
        })
    }

    /// Per-subject and per-department breakdowns over an arbitrary window.
    pub fn performance_report(
        &self,
        period: Period,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<PerformanceReport> {
        let rows = self.storage.snapshots_in_range(None, period, from, to)?;
        let subject_names: HashMap<SubjectId, String> =
            self.storage.subject_names()?.into_iter().collect();
        let department_names: HashMap<DepartmentId, String> =
            self.storage.department_names()?.into_iter().collect();

        let mut by_subject: BTreeMap<SubjectId, Vec<&SubjectSnapshot>> = BTreeMap::new();
        let mut by_department: BTreeMap<DepartmentId, Vec<&SubjectSnapshot>> = BTreeMap::new();
        for s in &rows {
            by_subject.entry(s.subject).or_default().push(s);
            by_department.entry(s.department).or_default().push(s);
        }

        let mut subjects: Vec<SubjectReport> = by_subject
            .into_iter()
            .map(|(id, group)| {
                let assigned: u32 = group.iter().map(|s| s.total_assigned).sum();
                let completed: u32 = group.iter().map(|s| s.completed).sum();
                let score = Rate::mean(group.iter().map(|s| s.efficiency_score));
                SubjectReport {
                    subject: id,
                    name: subject_names
                        .get(&id)
                        .cloned()
                        .unwrap_or_else(|| format!("subject {id}")),
                    department: department_names
                        .get(&group[0].department)
                        .cloned()
                        .unwrap_or_else(|| format!("department {}", group[0].department)),
                    assigned,
                    completed,
                    approved: group.iter().map(|s| s.approved).sum(),
                    revisions: group.iter().map(|s| s.revision_count).sum(),
                    on_time: group.iter().map(|s| s.on_time).sum(),
                    late: group.iter().map(|s| s.late).sum(),
                    completion_rate: Rate::percent(completed as i64, assigned as i64),
                    approval_rate: Rate::mean(group.iter().map(|s| s.approval_rate)),
                    avg_completion_hours: mean_f64(
                        group.iter().map(|s| s.avg_completion_hours),
                    ),
                    efficiency_score: score,
                    rating: Rating::from_score(score),
                }
            })
            .collect();
        subjects.sort_by(|a, b| {
            b.efficiency_score
                .cmp(&a.efficiency_score)
                .then(a.subject.cmp(&b.subject))
        });

        let departments: Vec<DepartmentReport> = by_department
            .into_iter()
            .map(|(id, group)| {
                let total: u32 = group.iter().map(|s| s.total_assigned).sum();
                let completed: u32 = group.iter().map(|s| s.completed).sum();
                let approved: u32 = group.iter().map(|s| s.approved).sum();
                let members: HashSet<SubjectId> = group.iter().map(|s| s.subject).collect();
                DepartmentReport {
                    department: id,
                    name: department_names
                        .get(&id)
                        .cloned()
                        .unwrap_or_else(|| format!("department {id}")),
                    team_size: members.len() as u32,
                    total_assigned: total,
                    completed,
                    approved,
                    revisions: group.iter().map(|s| s.revision_count).sum(),
                    approval_rate: Rate::percent(approved as i64, total as i64),
                    avg_efficiency_score: Rate::mean(group.iter().map(|s| s.efficiency_score)),
                }
            })
            .collect();

        Ok(PerformanceReport {
            title: format!("{period} performance report"),
            generated_at: Utc::now(),
            period,
            from,
            to,
            total_subjects: subjects.len() as u32,
            total_assigned: rows.iter().map(|s| s.total_assigned).sum(),
            total_completed: rows.iter().map(|s| s.completed).sum(),
            overall_approval_rate: Rate::mean(rows.iter().map(|s| s.approval_rate)),
            overall_efficiency_score: Rate::mean(rows.iter().map(|s| s.efficiency_score)),
            top_performer: subjects.first().map(|s| s.name.clone()),
            needs_improvement: subjects.last().map(|s| s.name.clone()),
            subjects,
            departments,
        })
    }

    /// Ranked performer list for the latest window, with names and badges
    /// for the top three. `department` of `None` ranks across the board.
    pub fn top_performers_detailed(
        &self,
        department: Option<DepartmentId>,
        period: Period,
        top_n: i64,
    ) -> Result<Vec<PerformerEntry>> {
        if let Some(d) = department {
            self.storage.get_department(d)?;
        }
        let Some(latest) = self.storage.latest_window_start(department, period)? else {
            return Ok(Vec::new());
        };
        let rows = self
            .storage
            .ranked_snapshots(department, period, latest, top_n)?;

        let subject_names: HashMap<SubjectId, String> =
            self.storage.subject_names()?.into_iter().collect();
        let department_names: HashMap<DepartmentId, String> =
            self.storage.department_names()?.into_iter().collect();

        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(i, s)| PerformerEntry {
                rank: i as u32 + 1,
                subject: s.subject,
                name: subject_names
                    .get(&s.subject)
                    .cloned()
                    .unwrap_or_else(|| format!("subject {}", s.subject)),
                department: department_names
                    .get(&s.department)
                    .cloned()
                    .unwrap_or_else(|| format!("department {}", s.department)),
                efficiency_score: s.efficiency_score,
                completed: s.completed,
                approval_rate: s.approval_rate,
                avg_completion_hours: s.avg_completion_hours,
                on_time: s.on_time,
                high_priority_completed: s.high_priority_completed,
                badge: match i {
                    0 => Some(Badge::Gold),
                    1 => Some(Badge::Silver),
                    2 => Some(Badge::Bronze),
                    _ => None,
                },
            })
            .collect())
    }

    /// Live status counts across all assignments.
    pub fn status_distribution(&self) -> Result<StatusDistribution> {
        let mut dist = StatusDistribution::default();
        for (status, count) in self.storage.status_counts()? {
            match status {
                Status::NotStarted => dist.not_started = count,
                Status::Started => dist.started = count,
                Status::InProgress => dist.in_progress = count,
                Status::Completed => dist.completed = count,
                Status::OnHold => dist.on_hold = count,
                Status::Cancelled => dist.cancelled = count,
            }
            dist.total += count;
        }
        Ok(dist)
    }

    /// The composed dashboard for one date: daily/weekly/monthly views,
    /// top five performers, a bounded oldest-first pending-review list,
    /// and the live status distribution.
    pub fn dashboard(&self, date: NaiveDate) -> Result<Dashboard> {
        let daily = self.daily_view(date)?;
        let weekly = self.weekly_view(date)?;
        let monthly = self.monthly_view(date.year(), date.month())?;
        let top_performers = self.top_performers_detailed(None, Period::Daily, 5)?;
        let pending_rows = self
            .storage
            .pending_verifications(None, self.pending_list_limit)?;
        let pending_verifications = verify::build_pending(pending_rows, Utc::now());
        let status_distribution = self.status_distribution()?;

        Ok(Dashboard {
            date,
            daily,
            weekly,
            monthly,
            top_performers,
            pending_verifications,
            status_distribution,
        })
    }
}

fn add_days(date: NaiveDate, days: u64) -> Result<NaiveDate> {
    date.checked_add_days(Days::new(days))
        .ok_or_else(|| Error::Validation(format!("date out of range: {date}")))
}

fn mean_f64(values: impl IntoIterator<Item = f64>) -> f64 {
    let (mut sum, mut n) = (0.0, 0u32);
    for v in values {
        sum += v;
        n += 1;
    }
    if n == 0 { 0.0 } else { sum / n as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_thresholds() {
        assert_eq!(Rating::from_score(Rate(9_000)), Rating::Excellent);
        assert_eq!(Rating::from_score(Rate(8_999)), Rating::Good);
        assert_eq!(Rating::from_score(Rate(7_500)), Rating::Good);
        assert_eq!(Rating::from_score(Rate(6_000)), Rating::Fair);
        assert_eq!(Rating::from_score(Rate(5_999)), Rating::NeedsImprovement);
    }
}
