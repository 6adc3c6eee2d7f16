//! Integration tests for compiled report views.

use chrono::{Datelike, Duration, NaiveDate, Utc};
use taskflow::engine::Engine;
use taskflow::engine::report::{Badge, Rating};
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

fn assign(engine: &mut Engine, subject: SubjectId, title: &str) -> AssignmentId {
    engine
        .create_assignment(
            NewAssignment::new(title, subject, SubjectId(2))
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

/// Perfect-record day for subject 1, half-record day for subject 2.
fn seed_and_compute(engine: &mut Engine) {
    let a = assign(engine, SubjectId(1), "Perfect");
    complete(engine, a, SubjectId(1));
    let b = assign(engine, SubjectId(2), "Half done");
    assign(engine, SubjectId(2), "Untouched");
    complete(engine, b, SubjectId(2));
    engine.compute_daily(today()).unwrap();
}

// ---------------------------------------------------------------------------
// Calendar views
// ---------------------------------------------------------------------------

#[test]
fn daily_view_sums_across_subjects() {
    let mut engine = test_engine();
    seed_and_compute(&mut engine);

    let view = engine.daily_view(today()).unwrap();
    assert_eq!(view.total_assigned, 3);
    assert_eq!(view.completed, 2);
    assert_eq!(view.pending, 1);
    assert_eq!(view.on_time, 2);
    assert_eq!(view.late, 0);
    assert!(view.avg_efficiency_score > Rate::ZERO);
}

#[test]
fn daily_view_for_empty_day_is_all_zero() {
    let engine = test_engine();
    let view = engine.daily_view(today()).unwrap();
    assert_eq!(view.total_assigned, 0);
    assert_eq!(view.avg_efficiency_score, Rate::ZERO);
    assert_eq!(view.avg_completion_hours, 0.0);
}

#[test]
fn weekly_view_always_has_seven_buckets() {
    let mut engine = test_engine();
    seed_and_compute(&mut engine);

    let view = engine.weekly_view(today()).unwrap();
    assert_eq!(view.daily_breakdown.len(), 7);
    assert_eq!(view.week_end - view.week_start, Duration::days(7));
    assert_eq!(view.daily_breakdown[0].date, view.week_start);
    assert_eq!(view.total_completed, 2);

    // Exactly one populated bucket; the rest are zero-filled
    let populated: Vec<_> = view
        .daily_breakdown
        .iter()
        .filter(|b| b.completed > 0)
        .collect();
    assert_eq!(populated.len(), 1);
    assert_eq!(populated[0].date, today());
}

#[test]
fn monthly_view_always_has_four_buckets() {
    let mut engine = test_engine();
    seed_and_compute(&mut engine);

    let view = engine.monthly_view(today().year(), today().month()).unwrap();
    assert_eq!(view.weekly_breakdown.len(), 4);
    assert_eq!(view.total_assigned, 3);
    assert_eq!(view.active_subjects, 2);
    assert_eq!(
        view.weekly_breakdown.iter().map(|w| w.week).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
}

// ---------------------------------------------------------------------------
// Performance report
// ---------------------------------------------------------------------------

#[test]
fn performance_report_ranks_and_names_subjects() {
    let mut engine = test_engine();
    seed_and_compute(&mut engine);

    let report = engine
        .performance_report(Period::Daily, today(), today() + Duration::days(1))
        .unwrap();

    assert_eq!(report.total_subjects, 2);
    assert_eq!(report.total_assigned, 3);
    assert_eq!(report.total_completed, 2);
    assert_eq!(report.subjects[0].name, "Ada");
    assert_eq!(report.subjects[0].rating, Rating::Excellent);
    assert!(report.subjects[0].efficiency_score >= report.subjects[1].efficiency_score);
    assert_eq!(report.top_performer.as_deref(), Some("Ada"));
    assert_eq!(report.needs_improvement.as_deref(), Some("Grace"));
    assert_eq!(report.departments.len(), 1);
    let dept = &report.departments[0];
    assert_eq!(dept.name, "Engineering");
    assert_eq!(dept.team_size, 2);
    // The department rate is approved over assigned, like every other rate
    assert_eq!(dept.approved, 2);
    assert_eq!(
        dept.approval_rate,
        Rate::percent(dept.approved as i64, dept.total_assigned as i64)
    );
}

#[test]
fn performance_report_over_empty_window() {
    let engine = test_engine();
    let report = engine
        .performance_report(Period::Daily, today(), today() + Duration::days(1))
        .unwrap();
    assert_eq!(report.total_subjects, 0);
    assert!(report.top_performer.is_none());
    assert!(report.subjects.is_empty());
}

#[test]
fn top_performers_carry_badges_for_first_three() {
    let mut engine = test_engine();
    seed_and_compute(&mut engine);
    // Third subject in a different department; a department of None spans all
    let c = assign(&mut engine, SubjectId(3), "Design task");
    complete(&mut engine, c, SubjectId(3));
    engine.compute_daily(today()).unwrap();

    let top = engine
        .top_performers_detailed(None, Period::Daily, 5)
        .unwrap();
    assert_eq!(top.len(), 3);
    assert_eq!(top[0].rank, 1);
    assert_eq!(top[0].badge, Some(Badge::Gold));
    assert_eq!(top[1].badge, Some(Badge::Silver));
    assert_eq!(top[2].badge, Some(Badge::Bronze));
    assert!(!top[0].name.is_empty());
    // Grace completed 1 of 2; everyone else has a perfect day
    assert_eq!(top[2].name, "Grace");
}

// ---------------------------------------------------------------------------
// Live sections and the dashboard
// ---------------------------------------------------------------------------

#[test]
fn status_distribution_counts_everything() {
    let mut engine = test_engine();
    let a = assign(&mut engine, SubjectId(1), "Done");
    complete(&mut engine, a, SubjectId(1));
    assign(&mut engine, SubjectId(1), "Fresh");
    let c = assign(&mut engine, SubjectId(2), "Dropped");
    engine.change_status(c, Status::Cancelled, SubjectId(2), None).unwrap();

    let dist = engine.status_distribution().unwrap();
    assert_eq!(dist.completed, 1);
    assert_eq!(dist.not_started, 1);
    assert_eq!(dist.cancelled, 1);
    assert_eq!(dist.total, 3);
}

#[test]
fn dashboard_bounds_the_pending_list() {
    let mut engine = test_engine();
    engine.pending_list_limit = 1;
    for i in 0..3 {
        let id = assign(&mut engine, SubjectId(1), &format!("Review {i}"));
        complete(&mut engine, id, SubjectId(1));
    }
    engine.compute_daily(today()).unwrap();

    let dashboard = engine.dashboard(today()).unwrap();
    assert_eq!(dashboard.pending_verifications.len(), 1);
    assert_eq!(dashboard.daily.completed, 3);
    assert_eq!(dashboard.weekly.daily_breakdown.len(), 7);
    assert_eq!(dashboard.monthly.weekly_breakdown.len(), 4);
    assert_eq!(dashboard.status_distribution.total, 3);
    assert_eq!(dashboard.top_performers.len(), 1);
}
