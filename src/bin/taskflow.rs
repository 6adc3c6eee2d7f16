//! taskflow CLI — operator interface to the assignment workflow engine.

use chrono::{NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use taskflow::config::Config;
use taskflow::engine::Engine;
use taskflow::model::{
    AssignmentId, DepartmentId, NewAssignment, Period, Priority, Status, SubjectId,
};

#[derive(Parser)]
#[command(name = "taskflow", about = "Assignment workflow and performance tracking")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Roster operations
    Roster {
        #[command(subcommand)]
        action: RosterAction,
    },
    /// Create a new assignment
    Assign {
        /// Assignment title
        title: String,
        /// Subject the work is assigned to
        subject: i64,
        /// Subject doing the assigning
        assigned_by: i64,
        /// Priority: low, medium, high
        #[arg(long, default_value = "medium")]
        priority: Priority,
        /// Due date (YYYY-MM-DD, midnight UTC)
        #[arg(long)]
        due: Option<NaiveDate>,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// Transition an assignment to a new status
    Status {
        /// Assignment ID (full UUID)
        id: String,
        /// Target status (e.g. started, in_progress, completed)
        new_status: Status,
        /// Acting subject
        actor: i64,
        /// Note recorded on the history entry
        #[arg(long)]
        notes: Option<String>,
    },
    /// Show an assignment with its full history
    Show {
        /// Assignment ID (full UUID)
        id: String,
    },
    /// Verification operations
    Verify {
        #[command(subcommand)]
        action: VerifyAction,
    },
    /// Metrics computation and queries
    Metrics {
        #[command(subcommand)]
        action: MetricsAction,
    },
    /// Compiled report views
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },
}

#[derive(Subcommand)]
enum RosterAction {
    /// Register or rename a department
    AddDept { id: i64, name: String },
    /// Register a subject under a department
    AddSubject {
        id: i64,
        name: String,
        department: i64,
    },
}

#[derive(Subcommand)]
enum VerifyAction {
    /// Approve completed work
    Approve {
        id: String,
        verifier: i64,
        #[arg(long)]
        comments: Option<String>,
    },
    /// Reject completed work and send it back for revision
    Reject {
        id: String,
        verifier: i64,
        reason: String,
    },
    /// Flag minor issues without moving the assignment
    Revise {
        id: String,
        verifier: i64,
        notes: String,
    },
    /// List pending verifications for a department, oldest first
    Pending { department: i64 },
}

#[derive(Subcommand)]
enum MetricsAction {
    /// Compute daily snapshots for one date
    Daily { date: NaiveDate },
    /// Compute weekly snapshots for the week containing a date
    Weekly { date: NaiveDate },
    /// Compute monthly snapshots for a calendar month
    Monthly { year: i32, month: u32 },
    /// Snapshots for one subject, most recent first
    Subject {
        subject: i64,
        #[arg(long, default_value = "daily")]
        period: Period,
    },
    /// Top performers in a department's latest window
    Top {
        department: i64,
        #[arg(long, default_value = "daily")]
        period: Period,
        #[arg(long, default_value_t = 5)]
        limit: i64,
    },
    /// Department rollup over a window
    Department {
        department: i64,
        from: NaiveDate,
        to: NaiveDate,
        #[arg(long, default_value = "daily")]
        period: Period,
    },
}

#[derive(Subcommand)]
enum ReportAction {
    /// One day's rollup
    Daily { date: NaiveDate },
    /// Week containing a date, with 7 daily buckets
    Weekly { date: NaiveDate },
    /// Calendar month, with 4 weekly buckets
    Monthly { year: i32, month: u32 },
    /// Per-subject and per-department breakdowns over a window
    Performance {
        from: NaiveDate,
        to: NaiveDate,
        #[arg(long, default_value = "daily")]
        period: Period,
    },
    /// Ranked performer list with badges
    Top {
        #[arg(long)]
        department: Option<i64>,
        #[arg(long, default_value = "daily")]
        period: Period,
        #[arg(long, default_value_t = 5)]
        limit: i64,
    },
    /// Live status counts across all assignments
    StatusDist,
    /// The composed dashboard for a date (defaults to today)
    Dashboard {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .init();

    let cli = Cli::parse();
    let mut engine = Engine::open(&config.db_path)?;
    engine.pending_list_limit = config.pending_list_limit;

    match cli.command {
        Command::Roster { action } => match action {
            RosterAction::AddDept { id, name } => {
                engine.register_department(DepartmentId(id), &name)?;
                println!("Department {id}: {name}");
            }
            RosterAction::AddSubject {
                id,
                name,
                department,
            } => {
                engine.register_subject(SubjectId(id), &name, DepartmentId(department))?;
                println!("Subject {id}: {name} (department {department})");
            }
        },
        Command::Assign {
            title,
            subject,
            assigned_by,
            priority,
            due,
            notes,
        } => {
            let mut new = NewAssignment::new(title, SubjectId(subject), SubjectId(assigned_by))
                .priority(priority);
            if let Some(date) = due {
                new = new.due(date.and_time(NaiveTime::MIN).and_utc());
            }
            if let Some(notes) = notes {
                new = new.notes(notes);
            }
            let assignment = engine.create_assignment(new)?;
            println!("Created: {} (status: {})", assignment.id.0, assignment.status);
        }
        Command::Status {
            id,
            new_status,
            actor,
            notes,
        } => {
            let id = parse_id(&id)?;
            engine.change_status(id, new_status, SubjectId(actor), notes.as_deref())?;
            println!("{id} -> {new_status}");
        }
        Command::Show { id } => {
            let detail = engine.assignment_detail(parse_id(&id)?)?;
            let a = &detail.assignment;
            println!("ID:         {}", a.id.0);
            println!("Task:       {}", a.task_id);
            println!("Title:      {}", a.title);
            println!("Subject:    {}", a.subject);
            println!("Department: {}", a.department);
            println!("Priority:   {}", a.priority);
            println!("Status:     {}", a.status);
            println!("Due:        {}", a.due_date);
            println!("Assigned:   {}", a.assigned_at);
            if let Some(done) = a.completed_at {
                println!("Completed:  {done}");
            }
            if let Some(ref notes) = a.notes {
                println!("Notes:      {notes}");
            }
            if !detail.history.is_empty() {
                println!("---");
                for h in &detail.history {
                    let note = h.note.as_deref().unwrap_or("-");
                    println!(
                        "{}  {} -> {}  by {}  {}",
                        h.changed_at.format("%Y-%m-%d %H:%M"),
                        h.previous,
                        h.current,
                        h.changed_by,
                        note
                    );
                }
            }
        }
        Command::Verify { action } => match action {
            VerifyAction::Approve {
                id,
                verifier,
                comments,
            } => {
                engine.approve(parse_id(&id)?, SubjectId(verifier), comments.as_deref())?;
                println!("Approved.");
            }
            VerifyAction::Reject {
                id,
                verifier,
                reason,
            } => {
                engine.reject(parse_id(&id)?, SubjectId(verifier), &reason)?;
                println!("Rejected; assignment returned to in_progress.");
            }
            VerifyAction::Revise {
                id,
                verifier,
                notes,
            } => {
                engine.request_revision(parse_id(&id)?, SubjectId(verifier), &notes)?;
                println!("Revision requested.");
            }
            VerifyAction::Pending { department } => {
                let pending = engine.pending_verifications(DepartmentId(department))?;
                if pending.is_empty() {
                    println!("No pending verifications.");
                } else {
                    println!(
                        "{:<8}  {:<30}  {:<16}  {:<6}  WAITING",
                        "ID", "TITLE", "SUBJECT", "PRI"
                    );
                    println!("{}", "-".repeat(80));
                    for p in &pending {
                        println!(
                            "{:<8}  {:<30.30}  {:<16.16}  {:<6}  {}d",
                            p.assignment_id.to_string(),
                            p.title,
                            p.subject_name,
                            p.priority.to_string(),
                            p.days_waiting
                        );
                    }
                    println!("\n{} pending", pending.len());
                }
            }
        },
        Command::Metrics { action } => match action {
            MetricsAction::Daily { date } => {
                let n = engine.compute_daily(date)?;
                println!("Wrote {n} snapshot(s) for {date}.");
            }
            MetricsAction::Weekly { date } => {
                let n = engine.compute_weekly(date)?;
                println!("Wrote {n} weekly snapshot(s).");
            }
            MetricsAction::Monthly { year, month } => {
                let n = engine.compute_monthly(year, month)?;
                println!("Wrote {n} snapshot(s) for {year}-{month:02}.");
            }
            MetricsAction::Subject { subject, period } => {
                let snaps = engine.subject_snapshots(SubjectId(subject), period)?;
                println!("{}", serde_json::to_string_pretty(&snaps)?);
            }
            MetricsAction::Top {
                department,
                period,
                limit,
            } => {
                let top = engine.top_performers(DepartmentId(department), period, limit)?;
                println!("{}", serde_json::to_string_pretty(&top)?);
            }
            MetricsAction::Department {
                department,
                from,
                to,
                period,
            } => {
                let snap = engine.department_snapshot(DepartmentId(department), period, from, to)?;
                println!("{}", serde_json::to_string_pretty(&snap)?);
            }
        },
        Command::Report { action } => match action {
            ReportAction::Daily { date } => {
                println!("{}", serde_json::to_string_pretty(&engine.daily_view(date)?)?);
            }
            ReportAction::Weekly { date } => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&engine.weekly_view(date)?)?
                );
            }
            ReportAction::Monthly { year, month } => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&engine.monthly_view(year, month)?)?
                );
            }
            ReportAction::Performance { from, to, period } => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&engine.performance_report(period, from, to)?)?
                );
            }
            ReportAction::Top {
                department,
                period,
                limit,
            } => {
                let top =
                    engine.top_performers_detailed(department.map(DepartmentId), period, limit)?;
                println!("{}", serde_json::to_string_pretty(&top)?);
            }
            ReportAction::StatusDist => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&engine.status_distribution()?)?
                );
            }
            ReportAction::Dashboard { date } => {
                let date = date.unwrap_or_else(|| Utc::now().date_naive());
                println!(
                    "{}",
                    serde_json::to_string_pretty(&engine.dashboard(date)?)?
                );
            }
        },
    }

    Ok(())
}

fn parse_id(s: &str) -> anyhow::Result<AssignmentId> {
    let uuid = uuid::Uuid::parse_str(s)
        .map_err(|_| anyhow::anyhow!("invalid assignment id: '{s}' (expected a full UUID)"))?;
    Ok(AssignmentId(uuid))
}
