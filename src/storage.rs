//! SQLite storage layer.
//!
//! Single source of truth for assignments, the history log, verification
//! records, and metric snapshots. WAL mode for concurrent read access.
//! All writes go through the engine.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{Error, Result};
use crate::model::*;

/// Storage backend. Owns the SQLite connection.
pub struct Storage {
    conn: Connection,
}

/// Handle for performing storage operations within a transaction.
///
/// All methods delegate to the same SQL logic as `Storage`, but execute
/// against the transaction's connection. This ensures atomicity — either
/// all operations commit together or none do.
pub(crate) struct TxContext<'a> {
    tx: &'a Connection,
}

impl TxContext<'_> {
    pub fn insert_assignment(&self, a: &Assignment) -> Result<()> {
        insert_assignment_on(self.tx, a)
    }

    pub fn get_assignment(&self, id: AssignmentId) -> Result<Assignment> {
        get_assignment_on(self.tx, id)
    }

    pub fn set_status(
        &self,
        id: AssignmentId,
        status: Status,
        completed_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        set_status_on(self.tx, id, status, completed_at, now)
    }

    pub fn append_history(&self, record: &HistoryRecord) -> Result<i64> {
        append_history_on(self.tx, record)
    }

    pub fn get_verification(&self, id: AssignmentId) -> Result<Option<Verification>> {
        get_verification_on(self.tx, id)
    }

    pub fn insert_verification(&self, v: &Verification) -> Result<()> {
        insert_verification_on(self.tx, v)
    }

    pub fn update_verification(&self, v: &Verification) -> Result<()> {
        update_verification_on(self.tx, v)
    }

    pub fn assignments_assigned_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Assignment>> {
        assignments_assigned_between_on(self.tx, from, to)
    }

    pub fn revision_counts_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<(SubjectId, u32)>> {
        revision_counts_between_on(self.tx, from, to)
    }

    pub fn replace_snapshots(
        &self,
        period: Period,
        window_start: NaiveDate,
        snapshots: &[SubjectSnapshot],
    ) -> Result<()> {
        replace_snapshots_on(self.tx, period, window_start, snapshots)
    }
}

impl Storage {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let mut storage = Self { conn };
        storage.init()?;
        Ok(storage)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut storage = Self { conn };
        storage.init()?;
        Ok(storage)
    }

    fn init(&mut self) -> Result<()> {
        // WAL mode for concurrent readers
        self.conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        self.conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS departments (
                id          INTEGER PRIMARY KEY,
                name        TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS subjects (
                id              INTEGER PRIMARY KEY,
                name            TEXT NOT NULL,
                department_id   INTEGER NOT NULL REFERENCES departments(id)
            );

            CREATE TABLE IF NOT EXISTS assignments (
                id              TEXT PRIMARY KEY,
                task_id         TEXT NOT NULL,
                title           TEXT NOT NULL,
                subject_id      INTEGER NOT NULL REFERENCES subjects(id),
                assigned_by     INTEGER NOT NULL,
                department_id   INTEGER NOT NULL REFERENCES departments(id),
                priority        TEXT NOT NULL,
                due_date        TEXT NOT NULL,
                status          TEXT NOT NULL DEFAULT 'not_started',
                notes           TEXT,
                assigned_at     TEXT NOT NULL,
                completed_at    TEXT,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_assignments_status ON assignments(status);
            CREATE INDEX IF NOT EXISTS idx_assignments_window ON assignments(assigned_at);
            CREATE INDEX IF NOT EXISTS idx_assignments_subject ON assignments(subject_id);

            CREATE TABLE IF NOT EXISTS history (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                assignment_id   TEXT NOT NULL REFERENCES assignments(id),
                previous        TEXT NOT NULL,
                current         TEXT NOT NULL,
                changed_at      TEXT NOT NULL,
                changed_by      INTEGER NOT NULL,
                note            TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_history_assignment ON history(assignment_id, seq);

            CREATE TABLE IF NOT EXISTS verifications (
                assignment_id    TEXT PRIMARY KEY REFERENCES assignments(id),
                status           TEXT NOT NULL DEFAULT 'pending',
                verified_by      INTEGER,
                comments         TEXT,
                created_at       TEXT NOT NULL,
                verified_at      TEXT,
                rejected_at      TEXT,
                rejection_reason TEXT,
                rejection_count  INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_verifications_pending ON verifications(created_at)
                WHERE status = 'pending';

            CREATE TABLE IF NOT EXISTS subject_metrics (
                subject_id              INTEGER NOT NULL,
                department_id           INTEGER NOT NULL,
                period                  TEXT NOT NULL,
                window_start            TEXT NOT NULL,
                window_end              TEXT NOT NULL,
                total_assigned          INTEGER NOT NULL,
                completed               INTEGER NOT NULL,
                pending                 INTEGER NOT NULL,
                on_hold                 INTEGER NOT NULL,
                cancelled               INTEGER NOT NULL,
                approved                INTEGER NOT NULL,
                approval_rate           INTEGER NOT NULL,
                revision_count          INTEGER NOT NULL,
                avg_completion_hours    REAL NOT NULL,
                on_time                 INTEGER NOT NULL,
                late                    INTEGER NOT NULL,
                high_completed          INTEGER NOT NULL,
                medium_completed        INTEGER NOT NULL,
                low_completed           INTEGER NOT NULL,
                efficiency_score        INTEGER NOT NULL,
                computed_at             TEXT NOT NULL,
                PRIMARY KEY (subject_id, period, window_start)
            );

            CREATE INDEX IF NOT EXISTS idx_metrics_dept
                ON subject_metrics(department_id, period, window_start);
            ",
        )?;

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    /// Execute a closure within a SQLite transaction.
    ///
    /// The transaction commits if the closure returns Ok, rolls back on Err.
    pub(crate) fn with_transaction<F, T>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut TxContext) -> Result<T>,
    {
        let tx = self.conn.transaction()?;
        let mut ctx = TxContext { tx: &tx };
        let result = f(&mut ctx)?;
        tx.commit()?;
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Roster
    // -----------------------------------------------------------------------

    pub fn upsert_department(&mut self, d: &Department) -> Result<()> {
        self.conn.execute(
            "INSERT INTO departments (id, name) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![d.id.0, d.name],
        )?;
        Ok(())
    }

    pub fn upsert_subject(&mut self, s: &Subject) -> Result<()> {
        self.conn.execute(
            "INSERT INTO subjects (id, name, department_id) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name,
                                           department_id = excluded.department_id",
            params![s.id.0, s.name, s.department.0],
        )?;
        Ok(())
    }

    pub fn get_department(&self, id: DepartmentId) -> Result<Department> {
        self.conn
            .query_row(
                "SELECT id, name FROM departments WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok(Department {
                        id: DepartmentId(row.get(0)?),
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("department {id}")))
    }

    pub fn get_subject(&self, id: SubjectId) -> Result<Subject> {
        self.conn
            .query_row(
                "SELECT id, name, department_id FROM subjects WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok(Subject {
                        id: SubjectId(row.get(0)?),
                        name: row.get(1)?,
                        department: DepartmentId(row.get(2)?),
                    })
                },
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("subject {id}")))
    }

    /// Subject names for report views. Missing ids are simply absent.
    pub fn subject_names(&self) -> Result<Vec<(SubjectId, String)>> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM subjects")?;
        let rows = stmt
            .query_map([], |row| Ok((SubjectId(row.get(0)?), row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn department_names(&self) -> Result<Vec<(DepartmentId, String)>> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM departments")?;
        let rows = stmt
            .query_map([], |row| Ok((DepartmentId(row.get(0)?), row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // Assignments
    // -----------------------------------------------------------------------

    pub fn get_assignment(&self, id: AssignmentId) -> Result<Assignment> {
        get_assignment_on(&self.conn, id)
    }

    /// Assignments whose `assigned_at` falls in the half-open window.
    pub fn assignments_assigned_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Assignment>> {
        assignments_assigned_between_on(&self.conn, from, to)
    }

    /// Live status counts across all assignments. A GROUP BY aggregate,
    /// never a row scan — the table grows without bound.
    pub fn status_counts(&self) -> Result<Vec<(Status, u32)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM assignments GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                let status: String = row.get(0)?;
                let count: u32 = row.get(1)?;
                Ok((status, count))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (status, count) in rows {
            out.push((status.parse::<Status>()?, count));
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// History for one assignment, ordered by sequence number.
    pub fn history_for(&self, id: AssignmentId) -> Result<Vec<HistoryRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, assignment_id, previous, current, changed_at, changed_by, note
             FROM history WHERE assignment_id = ?1 ORDER BY seq ASC",
        )?;
        let records = stmt
            .query_map(params![id.0.to_string()], row_to_history)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // -----------------------------------------------------------------------
    // Verifications
    // -----------------------------------------------------------------------

    pub fn get_verification(&self, id: AssignmentId) -> Result<Option<Verification>> {
        get_verification_on(&self.conn, id)
    }

    /// Pending verifications joined to their assignment and assignee name,
    /// oldest first. `department` scopes the list; `limit` bounds it.
    pub fn pending_verifications(
        &self,
        department: Option<DepartmentId>,
        limit: i64,
    ) -> Result<Vec<(Verification, Assignment, String)>> {
        let sql = "SELECT v.assignment_id, v.status, v.verified_by, v.comments, v.created_at,
                          v.verified_at, v.rejected_at, v.rejection_reason, v.rejection_count,
                          a.id, a.task_id, a.title, a.subject_id, a.assigned_by, a.department_id,
                          a.priority, a.due_date, a.status, a.notes, a.assigned_at,
                          a.completed_at, a.updated_at,
                          s.name
                   FROM verifications v
                   JOIN assignments a ON a.id = v.assignment_id
                   JOIN subjects s ON s.id = a.subject_id
                   WHERE v.status = 'pending'
                     AND (?1 IS NULL OR a.department_id = ?1)
                   ORDER BY v.created_at ASC
                   LIMIT ?2";
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![department.map(|d| d.0), limit], |row| {
                let v = row_to_verification_at(row, 0)?;
                let a = row_to_assignment_at(row, 9)?;
                let name: String = row.get(22)?;
                Ok((v, a, name))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// All snapshots for one subject and period, most recent window first.
    pub fn subject_snapshots(
        &self,
        subject: SubjectId,
        period: Period,
    ) -> Result<Vec<SubjectSnapshot>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SNAPSHOT_COLS} FROM subject_metrics
             WHERE subject_id = ?1 AND period = ?2
             ORDER BY window_start DESC"
        ))?;
        let rows = stmt
            .query_map(params![subject.0, period.to_string()], |row| {
                row_to_snapshot_at(row, 0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Most recent window start with snapshot rows for a department+period.
    pub fn latest_window_start(
        &self,
        department: Option<DepartmentId>,
        period: Period,
    ) -> Result<Option<NaiveDate>> {
        let start: Option<String> = self.conn.query_row(
            "SELECT MAX(window_start) FROM subject_metrics
             WHERE period = ?1 AND (?2 IS NULL OR department_id = ?2)",
            params![period.to_string(), department.map(|d| d.0)],
            |row| row.get(0),
        )?;
        match start {
            Some(s) => Ok(Some(parse_date_str(&s)?)),
            None => Ok(None),
        }
    }

    /// Snapshot rows for one window start, ranked by efficiency score
    /// descending with subject id ascending as the deterministic tie-break.
    pub fn ranked_snapshots(
        &self,
        department: Option<DepartmentId>,
        period: Period,
        window_start: NaiveDate,
        limit: i64,
    ) -> Result<Vec<SubjectSnapshot>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SNAPSHOT_COLS} FROM subject_metrics
             WHERE period = ?1 AND window_start = ?2
               AND (?3 IS NULL OR department_id = ?3)
             ORDER BY efficiency_score DESC, subject_id ASC
             LIMIT ?4"
        ))?;
        let rows = stmt
            .query_map(
                params![
                    period.to_string(),
                    window_start.to_string(),
                    department.map(|d| d.0),
                    limit
                ],
                |row| row_to_snapshot_at(row, 0),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Snapshot rows whose window start falls in `[from, to)`.
    pub fn snapshots_in_range(
        &self,
        department: Option<DepartmentId>,
        period: Period,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SubjectSnapshot>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SNAPSHOT_COLS} FROM subject_metrics
             WHERE period = ?1 AND window_start >= ?2 AND window_start < ?3
               AND (?4 IS NULL OR department_id = ?4)
             ORDER BY window_start ASC, subject_id ASC"
        ))?;
        let rows = stmt
            .query_map(
                params![
                    period.to_string(),
                    from.to_string(),
                    to.to_string(),
                    department.map(|d| d.0)
                ],
                |row| row_to_snapshot_at(row, 0),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Inner functions — accept &Connection so they work with both
// Connection (auto-commit) and Transaction (deref to Connection).
// ---------------------------------------------------------------------------

fn insert_assignment_on(conn: &Connection, a: &Assignment) -> Result<()> {
    conn.execute(
        "INSERT INTO assignments (
            id, task_id, title, subject_id, assigned_by, department_id,
            priority, due_date, status, notes, assigned_at, completed_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            a.id.0.to_string(),
            a.task_id.0.to_string(),
            a.title,
            a.subject.0,
            a.assigned_by.0,
            a.department.0,
            a.priority.to_string(),
            a.due_date.to_rfc3339(),
            a.status.to_string(),
            a.notes,
            a.assigned_at.to_rfc3339(),
            a.completed_at.map(|t| t.to_rfc3339()),
            a.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn get_assignment_on(conn: &Connection, id: AssignmentId) -> Result<Assignment> {
    conn.query_row(
        "SELECT id, task_id, title, subject_id, assigned_by, department_id,
                priority, due_date, status, notes, assigned_at, completed_at, updated_at
         FROM assignments WHERE id = ?1",
        params![id.0.to_string()],
        |row| row_to_assignment_at(row, 0),
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("assignment {id}")))
}

/// Raw status write. Transition validation lives in the engine; this also
/// stamps `updated_at` and overwrites `completed_at` with the given value.
fn set_status_on(
    conn: &Connection,
    id: AssignmentId,
    status: Status,
    completed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE assignments SET status = ?1, completed_at = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            status.to_string(),
            completed_at.map(|t| t.to_rfc3339()),
            now.to_rfc3339(),
            id.0.to_string(),
        ],
    )?;
    Ok(())
}

fn append_history_on(conn: &Connection, record: &HistoryRecord) -> Result<i64> {
    conn.execute(
        "INSERT INTO history (assignment_id, previous, current, changed_at, changed_by, note)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.assignment_id.0.to_string(),
            record.previous.to_string(),
            record.current.to_string(),
            record.changed_at.to_rfc3339(),
            record.changed_by.0,
            record.note,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn get_verification_on(conn: &Connection, id: AssignmentId) -> Result<Option<Verification>> {
    Ok(conn
        .query_row(
            "SELECT assignment_id, status, verified_by, comments, created_at,
                    verified_at, rejected_at, rejection_reason, rejection_count
             FROM verifications WHERE assignment_id = ?1",
            params![id.0.to_string()],
            |row| row_to_verification_at(row, 0),
        )
        .optional()?)
}

fn insert_verification_on(conn: &Connection, v: &Verification) -> Result<()> {
    conn.execute(
        "INSERT INTO verifications (
            assignment_id, status, verified_by, comments, created_at,
            verified_at, rejected_at, rejection_reason, rejection_count
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            v.assignment_id.0.to_string(),
            v.status.to_string(),
            v.verified_by.map(|s| s.0),
            v.comments,
            v.created_at.to_rfc3339(),
            v.verified_at.map(|t| t.to_rfc3339()),
            v.rejected_at.map(|t| t.to_rfc3339()),
            v.rejection_reason,
            v.rejection_count,
        ],
    )?;
    Ok(())
}

fn update_verification_on(conn: &Connection, v: &Verification) -> Result<()> {
    conn.execute(
        "UPDATE verifications SET
            status = ?2, verified_by = ?3, comments = ?4, verified_at = ?5,
            rejected_at = ?6, rejection_reason = ?7, rejection_count = ?8
         WHERE assignment_id = ?1",
        params![
            v.assignment_id.0.to_string(),
            v.status.to_string(),
            v.verified_by.map(|s| s.0),
            v.comments,
            v.verified_at.map(|t| t.to_rfc3339()),
            v.rejected_at.map(|t| t.to_rfc3339()),
            v.rejection_reason,
            v.rejection_count,
        ],
    )?;
    Ok(())
}

fn assignments_assigned_between_on(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<Assignment>> {
    let mut stmt = conn.prepare(
        "SELECT id, task_id, title, subject_id, assigned_by, department_id,
                priority, due_date, status, notes, assigned_at, completed_at, updated_at
         FROM assignments
         WHERE assigned_at >= ?1 AND assigned_at < ?2
         ORDER BY subject_id ASC, assigned_at ASC",
    )?;
    let rows = stmt
        .query_map(
            params![date_floor(from).to_rfc3339(), date_floor(to).to_rfc3339()],
            |row| row_to_assignment_at(row, 0),
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Revision edges (completed -> in_progress) per subject, for assignments
/// assigned inside the window.
fn revision_counts_between_on(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<(SubjectId, u32)>> {
    let mut stmt = conn.prepare(
        "SELECT a.subject_id, COUNT(*)
         FROM history h
         JOIN assignments a ON a.id = h.assignment_id
         WHERE h.previous = 'completed' AND h.current = 'in_progress'
           AND a.assigned_at >= ?1 AND a.assigned_at < ?2
         GROUP BY a.subject_id",
    )?;
    let rows = stmt
        .query_map(
            params![date_floor(from).to_rfc3339(), date_floor(to).to_rfc3339()],
            |row| Ok((SubjectId(row.get(0)?), row.get(1)?)),
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Replace-by-key recompute: every row for (period, window_start) is
/// dropped before the fresh set is inserted, so rerunning a window never
/// appends duplicates and subjects absent from the new set disappear.
fn replace_snapshots_on(
    conn: &Connection,
    period: Period,
    window_start: NaiveDate,
    snapshots: &[SubjectSnapshot],
) -> Result<()> {
    conn.execute(
        "DELETE FROM subject_metrics WHERE period = ?1 AND window_start = ?2",
        params![period.to_string(), window_start.to_string()],
    )?;

    for s in snapshots {
        conn.execute(
            "INSERT INTO subject_metrics (
                subject_id, department_id, period, window_start, window_end,
                total_assigned, completed, pending, on_hold, cancelled,
                approved, approval_rate, revision_count, avg_completion_hours,
                on_time, late, high_completed, medium_completed, low_completed,
                efficiency_score, computed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                      ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
            params![
                s.subject.0,
                s.department.0,
                s.period.to_string(),
                s.window_start.to_string(),
                s.window_end.to_string(),
                s.total_assigned,
                s.completed,
                s.pending,
                s.on_hold,
                s.cancelled,
                s.approved,
                s.approval_rate.hundredths(),
                s.revision_count,
                s.avg_completion_hours,
                s.on_time,
                s.late,
                s.high_priority_completed,
                s.medium_priority_completed,
                s.low_priority_completed,
                s.efficiency_score.hundredths(),
                s.computed_at.to_rfc3339(),
            ],
        )?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Row parsing helpers
// ---------------------------------------------------------------------------

const SNAPSHOT_COLS: &str = "subject_id, department_id, period, window_start, window_end, \
     total_assigned, completed, pending, on_hold, cancelled, approved, approval_rate, \
     revision_count, avg_completion_hours, on_time, late, high_completed, \
     medium_completed, low_completed, efficiency_score, computed_at";

/// Midnight UTC at the start of a date. Window bounds compare against
/// RFC 3339 strings, which order lexicographically for UTC timestamps.
pub(crate) fn date_floor(d: NaiveDate) -> DateTime<Utc> {
    d.and_time(NaiveTime::MIN).and_utc()
}

fn conv_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn get_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    s.parse().map_err(|e: chrono::ParseError| conv_err(idx, e))
}

fn get_opt_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| s.parse().map_err(|e: chrono::ParseError| conv_err(idx, e)))
        .transpose()
}

fn get_uuid(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<uuid::Uuid> {
    let s: String = row.get(idx)?;
    s.parse().map_err(|e: uuid::Error| conv_err(idx, e))
}

fn get_parsed<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = Error>,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|e: Error| conv_err(idx, e))
}

fn get_date(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| conv_err(idx, e))
}

fn parse_date_str(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| Error::Validation(format!("invalid date {s}: {e}")))
}

fn row_to_assignment_at(row: &rusqlite::Row, base: usize) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        id: AssignmentId(get_uuid(row, base)?),
        task_id: TaskId(get_uuid(row, base + 1)?),
        title: row.get(base + 2)?,
        subject: SubjectId(row.get(base + 3)?),
        assigned_by: SubjectId(row.get(base + 4)?),
        department: DepartmentId(row.get(base + 5)?),
        priority: get_parsed(row, base + 6)?,
        due_date: get_ts(row, base + 7)?,
        status: get_parsed(row, base + 8)?,
        notes: row.get(base + 9)?,
        assigned_at: get_ts(row, base + 10)?,
        completed_at: get_opt_ts(row, base + 11)?,
        updated_at: get_ts(row, base + 12)?,
    })
}

fn row_to_history(row: &rusqlite::Row) -> rusqlite::Result<HistoryRecord> {
    Ok(HistoryRecord {
        seq: row.get(0)?,
        assignment_id: AssignmentId(get_uuid(row, 1)?),
        previous: get_parsed(row, 2)?,
        current: get_parsed(row, 3)?,
        changed_at: get_ts(row, 4)?,
        changed_by: SubjectId(row.get(5)?),
        note: row.get(6)?,
    })
}

fn row_to_verification_at(row: &rusqlite::Row, base: usize) -> rusqlite::Result<Verification> {
    Ok(Verification {
        assignment_id: AssignmentId(get_uuid(row, base)?),
        status: get_parsed(row, base + 1)?,
        verified_by: row.get::<_, Option<i64>>(base + 2)?.map(SubjectId),
        comments: row.get(base + 3)?,
        created_at: get_ts(row, base + 4)?,
        verified_at: get_opt_ts(row, base + 5)?,
        rejected_at: get_opt_ts(row, base + 6)?,
        rejection_reason: row.get(base + 7)?,
        rejection_count: row.get(base + 8)?,
    })
}

fn row_to_snapshot_at(row: &rusqlite::Row, base: usize) -> rusqlite::Result<SubjectSnapshot> {
    Ok(SubjectSnapshot {
        subject: SubjectId(row.get(base)?),
        department: DepartmentId(row.get(base + 1)?),
        period: get_parsed(row, base + 2)?,
        window_start: get_date(row, base + 3)?,
        window_end: get_date(row, base + 4)?,
        total_assigned: row.get(base + 5)?,
        completed: row.get(base + 6)?,
        pending: row.get(base + 7)?,
        on_hold: row.get(base + 8)?,
        cancelled: row.get(base + 9)?,
        approved: row.get(base + 10)?,
        approval_rate: Rate(row.get(base + 11)?),
        revision_count: row.get(base + 12)?,
        avg_completion_hours: row.get(base + 13)?,
        on_time: row.get(base + 14)?,
        late: row.get(base + 15)?,
        high_priority_completed: row.get(base + 16)?,
        medium_priority_completed: row.get(base + 17)?,
        low_priority_completed: row.get(base + 18)?,
        efficiency_score: Rate(row.get(base + 19)?),
        computed_at: get_ts(row, base + 20)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_roster(storage: &mut Storage) {
        storage
            .upsert_department(&Department {
                id: DepartmentId(1),
                name: "Engineering".into(),
            })
            .unwrap();
        storage
            .upsert_subject(&Subject {
                id: SubjectId(10),
                name: "Avery Quinn".into(),
                department: DepartmentId(1),
            })
            .unwrap();
    }

    fn sample_assignment() -> Assignment {
        let now = Utc::now();
        Assignment {
            id: AssignmentId::new(),
            task_id: TaskId::new(),
            title: "Quarterly audit".into(),
            subject: SubjectId(10),
            assigned_by: SubjectId(10),
            department: DepartmentId(1),
            priority: Priority::High,
            due_date: now + chrono::Duration::days(2),
            status: Status::NotStarted,
            notes: None,
            assigned_at: now,
            completed_at: None,
            updated_at: now,
        }
    }

    #[test]
    fn assignment_round_trips() {
        let mut storage = Storage::in_memory().unwrap();
        seed_roster(&mut storage);

        let a = sample_assignment();
        storage.with_transaction(|ctx| ctx.insert_assignment(&a)).unwrap();

        let got = storage.get_assignment(a.id).unwrap();
        assert_eq!(got.id, a.id);
        assert_eq!(got.title, "Quarterly audit");
        assert_eq!(got.status, Status::NotStarted);
        assert_eq!(got.priority, Priority::High);
        assert!(got.completed_at.is_none());
    }

    #[test]
    fn missing_assignment_is_not_found() {
        let storage = Storage::in_memory().unwrap();
        let err = storage.get_assignment(AssignmentId::new()).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let mut storage = Storage::in_memory().unwrap();
        seed_roster(&mut storage);

        let a = sample_assignment();
        let result: Result<()> = storage.with_transaction(|ctx| {
            ctx.insert_assignment(&a)?;
            Err(Error::Validation("boom".into()))
        });
        assert!(result.is_err());
        assert!(matches!(
            storage.get_assignment(a.id),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn reopening_a_file_backed_store_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskflow.db");

        let a = sample_assignment();
        {
            let mut storage = Storage::open(&path).unwrap();
            seed_roster(&mut storage);
            storage
                .with_transaction(|ctx| ctx.insert_assignment(&a))
                .unwrap();
        }

        let storage = Storage::open(&path).unwrap();
        assert_eq!(storage.get_assignment(a.id).unwrap().title, a.title);
    }

    fn blank_snapshot(subject: SubjectId, window_start: NaiveDate) -> SubjectSnapshot {
        SubjectSnapshot {
            subject,
            department: DepartmentId(1),
            period: Period::Daily,
            window_start,
            window_end: window_start.succ_opt().unwrap(),
            total_assigned: 1,
            completed: 0,
            pending: 1,
            on_hold: 0,
            cancelled: 0,
            approved: 0,
            approval_rate: Rate::ZERO,
            revision_count: 0,
            avg_completion_hours: 0.0,
            on_time: 0,
            late: 0,
            high_priority_completed: 0,
            medium_priority_completed: 0,
            low_priority_completed: 0,
            efficiency_score: Rate::ZERO,
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn replacing_a_window_drops_absent_subjects() {
        let mut storage = Storage::in_memory().unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 8, 10).unwrap();

        let both = [blank_snapshot(SubjectId(1), day), blank_snapshot(SubjectId(2), day)];
        storage
            .with_transaction(|ctx| ctx.replace_snapshots(Period::Daily, day, &both))
            .unwrap();

        let only_one = [blank_snapshot(SubjectId(1), day)];
        storage
            .with_transaction(|ctx| ctx.replace_snapshots(Period::Daily, day, &only_one))
            .unwrap();

        assert_eq!(storage.subject_snapshots(SubjectId(1), Period::Daily).unwrap().len(), 1);
        assert!(storage.subject_snapshots(SubjectId(2), Period::Daily).unwrap().is_empty());
    }

    #[test]
    fn status_counts_aggregate_in_sql() {
        let mut storage = Storage::in_memory().unwrap();
        seed_roster(&mut storage);

        for _ in 0..3 {
            let a = sample_assignment();
            storage
                .with_transaction(|ctx| ctx.insert_assignment(&a))
                .unwrap();
        }

        let counts = storage.status_counts().unwrap();
        assert_eq!(counts, vec![(Status::NotStarted, 3)]);
    }
}
