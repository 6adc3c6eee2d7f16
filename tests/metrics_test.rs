//! Integration tests for snapshot computation and metric queries.

use chrono::{Duration, NaiveDate, Utc};
use taskflow::engine::Engine;
use taskflow::error::Error;
use taskflow::model::*;

fn test_engine() -> Engine {
    let mut engine = Engine::in_memory().expect("failed to create in-memory engine");
    engine.register_department(DepartmentId(1), "Engineering").unwrap();
    engine.register_department(DepartmentId(2), "Design").unwrap();
    engine.register_subject(SubjectId(1), "Ada", DepartmentId(1)).unwrap();
    engine.register_subject(SubjectId(2), "Grace", DepartmentId(1)).unwrap();
    engine.register_subject(SubjectId(3), "Edsger", DepartmentId(2)).unwrap();
    engine
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Create an assignment due comfortably in the future.
fn assign(engine: &mut Engine, subject: SubjectId, title: &str, priority: Priority) -> AssignmentId {
    engine
        .create_assignment(
            NewAssignment::new(title, subject, SubjectId(2))
                .priority(priority)
                .due(Utc::now() + Duration::days(30)),
        )
        .unwrap()
        .id
}

fn complete(engine: &mut Engine, id: AssignmentId, subject: SubjectId) {
    engine.change_status(id, Status::Started, subject, None).unwrap();
    engine.change_status(id, Status::InProgress, subject, None).unwrap();
    engine.change_status(id, Status::Completed, subject, None).unwrap();
}

fn daily_snapshot(engine: &Engine, subject: SubjectId) -> SubjectSnapshot {
    engine
        .subject_snapshots(subject, Period::Daily)
        .unwrap()
        .into_iter()
        .next()
        .expect("snapshot exists")
}

// ---------------------------------------------------------------------------
// Snapshot compilation
// ---------------------------------------------------------------------------

#[test]
fn three_assignments_two_completed_on_time() {
    let mut engine = test_engine();
    let first = assign(&mut engine, SubjectId(1), "First", Priority::High);
    let second = assign(&mut engine, SubjectId(1), "Second", Priority::Medium);
    assign(&mut engine, SubjectId(1), "Third", Priority::Low);
    complete(&mut engine, first, SubjectId(1));
    complete(&mut engine, second, SubjectId(1));

    let written = engine.compute_daily(today()).unwrap();
    assert_eq!(written, 1);

    let snap = daily_snapshot(&engine, SubjectId(1));
    assert_eq!(snap.total_assigned, 3);
    assert_eq!(snap.completed, 2);
    assert_eq!(snap.pending, 1);
    assert_eq!(snap.on_time, 2);
    assert_eq!(snap.late, 0);
    assert_eq!(snap.approved, 2);
    assert_eq!(snap.approval_rate, Rate(6667));
    assert_eq!(snap.high_priority_completed, 1);
    assert_eq!(snap.medium_priority_completed, 1);
    assert_eq!(snap.low_priority_completed, 0);
    // 40% of 66.67 + 35% of 66.67 + 25% of 100.00
    assert_eq!(snap.efficiency_score, Rate(7500));
    assert!(snap.avg_completion_hours >= 0.0);
}

#[test]
fn completion_past_due_counts_as_late() {
    let mut engine = test_engine();
    let id = engine
        .create_assignment(
            NewAssignment::new("Overdue", SubjectId(1), SubjectId(2))
                .due(Utc::now() - Duration::days(1)),
        )
        .unwrap()
        .id;
    complete(&mut engine, id, SubjectId(1));

    engine.compute_daily(today()).unwrap();
    let snap = daily_snapshot(&engine, SubjectId(1));
    assert_eq!(snap.completed, 1);
    assert_eq!(snap.on_time, 0);
    assert_eq!(snap.late, 1);
}

#[test]
fn rejection_shows_up_as_revision() {
    let mut engine = test_engine();
    let id = assign(&mut engine, SubjectId(1), "Reworked", Priority::Medium);
    complete(&mut engine, id, SubjectId(1));
    engine.reject(id, SubjectId(2), "incomplete").unwrap();

    engine.compute_daily(today()).unwrap();
    let snap = daily_snapshot(&engine, SubjectId(1));
    assert_eq!(snap.revision_count, 1);
    // Back in progress: not completed, not pending
    assert_eq!(snap.total_assigned, 1);
    assert_eq!(snap.completed, 0);
    assert_eq!(snap.pending, 0);
}

#[test]
fn rates_stay_within_bounds() {
    let mut engine = test_engine();
    for i in 0..4 {
        let id = assign(&mut engine, SubjectId(1), &format!("Job {i}"), Priority::Medium);
        if i % 2 == 0 {
            complete(&mut engine, id, SubjectId(1));
        }
    }
    engine.compute_daily(today()).unwrap();

    let snap = daily_snapshot(&engine, SubjectId(1));
    for rate in [snap.approval_rate, snap.efficiency_score] {
        assert!((0..=10_000).contains(&rate.0), "rate out of bounds: {rate}");
    }
}

// ---------------------------------------------------------------------------
// Windows and recomputation
// ---------------------------------------------------------------------------

#[test]
fn recompute_replaces_instead_of_appending() {
    let mut engine = test_engine();
    let id = assign(&mut engine, SubjectId(1), "Stable", Priority::Medium);

    engine.compute_daily(today()).unwrap();
    complete(&mut engine, id, SubjectId(1));
    engine.compute_daily(today()).unwrap();

    let snaps = engine.subject_snapshots(SubjectId(1), Period::Daily).unwrap();
    assert_eq!(snaps.len(), 1, "one row per (subject, period, window)");
    assert_eq!(snaps[0].completed, 1);
}

#[test]
fn assignments_outside_the_window_are_excluded() {
    let mut engine = test_engine();
    engine
        .create_assignment(
            NewAssignment::new("Last week", SubjectId(1), SubjectId(2))
                .assigned_at(Utc::now() - Duration::days(7)),
        )
        .unwrap();
    assign(&mut engine, SubjectId(2), "Today", Priority::Medium);

    let written = engine.compute_daily(today()).unwrap();
    assert_eq!(written, 1);
    assert!(engine.subject_snapshots(SubjectId(1), Period::Daily).unwrap().is_empty());
}

#[test]
fn empty_window_writes_nothing() {
    let mut engine = test_engine();
    assert_eq!(engine.compute_daily(today()).unwrap(), 0);
}

#[test]
fn inverted_window_is_rejected() {
    let mut engine = test_engine();
    let err = engine
        .compute_snapshots(today(), today(), Period::Daily)
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn weekly_window_spans_sunday_to_sunday() {
    let mut engine = test_engine();
    assign(&mut engine, SubjectId(1), "This week", Priority::Medium);

    engine.compute_weekly(today()).unwrap();
    let snaps = engine.subject_snapshots(SubjectId(1), Period::Weekly).unwrap();
    assert_eq!(snaps.len(), 1);
    assert_eq!(snaps[0].window_end - snaps[0].window_start, Duration::days(7));
    assert!(snaps[0].window_start <= today() && today() < snaps[0].window_end);
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[test]
fn top_performers_rank_by_score_then_id() {
    let mut engine = test_engine();
    // Subject 1: perfect record
    let a = assign(&mut engine, SubjectId(1), "Perfect", Priority::High);
    complete(&mut engine, a, SubjectId(1));
    // Subject 2: one of two completed
    let b = assign(&mut engine, SubjectId(2), "Half done", Priority::Medium);
    assign(&mut engine, SubjectId(2), "Untouched", Priority::Medium);
    complete(&mut engine, b, SubjectId(2));

    engine.compute_daily(today()).unwrap();
    let top = engine.top_performers(DepartmentId(1), Period::Daily, 5).unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].subject, SubjectId(1));
    assert_eq!(top[0].efficiency_score, Rate(10_000));
    assert!(top[0].efficiency_score > top[1].efficiency_score);
}

#[test]
fn top_performers_tie_breaks_on_lowest_id() {
    let mut engine = test_engine();
    for subject in [SubjectId(2), SubjectId(1)] {
        let id = assign(&mut engine, subject, "Same record", Priority::Medium);
        complete(&mut engine, id, subject);
    }
    engine.compute_daily(today()).unwrap();

    let top = engine.top_performers(DepartmentId(1), Period::Daily, 5).unwrap();
    assert_eq!(top[0].subject, SubjectId(1));
    assert_eq!(top[1].subject, SubjectId(2));
    assert_eq!(top[0].efficiency_score, top[1].efficiency_score);
}

#[test]
fn top_performers_empty_without_snapshots() {
    let engine = test_engine();
    assert!(engine.top_performers(DepartmentId(1), Period::Daily, 5).unwrap().is_empty());
}

#[test]
fn best_performer_picks_highest_score() {
    let mut engine = test_engine();
    let a = assign(&mut engine, SubjectId(1), "Winner", Priority::High);
    complete(&mut engine, a, SubjectId(1));
    assign(&mut engine, SubjectId(2), "Idle", Priority::Low);

    engine.compute_daily(today()).unwrap();
    let best = engine
        .best_performer(DepartmentId(1), Period::Daily, today(), today() + Duration::days(1))
        .unwrap()
        .expect("best performer");
    assert_eq!(best.subject, SubjectId(1));
}

#[test]
fn department_snapshot_rolls_up_members() {
    let mut engine = test_engine();
    let a = assign(&mut engine, SubjectId(1), "One", Priority::Medium);
    complete(&mut engine, a, SubjectId(1));
    assign(&mut engine, SubjectId(2), "Two", Priority::Medium);
    // Another department's work must not leak in
    assign(&mut engine, SubjectId(3), "Elsewhere", Priority::Medium);

    engine.compute_daily(today()).unwrap();
    let dept = engine
        .department_snapshot(DepartmentId(1), Period::Daily, today(), today() + Duration::days(1))
        .unwrap();
    assert_eq!(dept.total_assigned, 2);
    assert_eq!(dept.completed, 1);
    assert_eq!(dept.team_members_active, 2);
    assert_eq!(dept.top_subject, Some(SubjectId(1)));
    assert_eq!(dept.approval_rate, Rate::percent(1, 2));
}

#[test]
fn queries_validate_roster_ids() {
    let engine = test_engine();
    assert!(matches!(
        engine.subject_snapshots(SubjectId(99), Period::Daily).unwrap_err(),
        Error::NotFound(_)
    ));
    assert!(matches!(
        engine.top_performers(DepartmentId(99), Period::Daily, 5).unwrap_err(),
        Error::NotFound(_)
    ));
}
