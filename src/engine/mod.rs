//! Core engine. The public API for workflow, verification, analytics,
//! and report composition.
//!
//! The engine owns the storage; every public operation executes as one
//! atomic unit of work against it. External consumers interact via this
//! module.

pub mod metrics;
pub mod report;
pub mod verify;
pub mod workflow;

use crate::error::Result;
use crate::model::{Department, DepartmentId, Subject, SubjectId};
use crate::storage::Storage;

/// The taskflow engine. Owns all state and enforces all invariants.
pub struct Engine {
    pub(crate) storage: Storage,
    /// Upper bound on the dashboard's live pending-verification list.
    pub pending_list_limit: i64,
}

impl Engine {
    /// Create an engine with in-memory storage (for testing).
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            storage: Storage::in_memory()?,
            pending_list_limit: 10,
        })
    }

    /// Create an engine backed by a file.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self {
            storage: Storage::open(path)?,
            pending_list_limit: 10,
        })
    }

    // -----------------------------------------------------------------------
    // Roster
    // -----------------------------------------------------------------------

    /// Register or rename a department.
    pub fn register_department(
        &mut self,
        id: DepartmentId,
        name: impl Into<String>,
    ) -> Result<()> {
        self.storage.upsert_department(&Department {
            id,
            name: name.into(),
        })
    }

    /// Register a subject under an existing department.
    pub fn register_subject(
        &mut self,
        id: SubjectId,
        name: impl Into<String>,
        department: DepartmentId,
    ) -> Result<()> {
        self.storage.get_department(department)?;
        self.storage.upsert_subject(&Subject {
            id,
            name: name.into(),
            department,
        })
    }

    pub fn get_subject(&self, id: SubjectId) -> Result<Subject> {
        self.storage.get_subject(id)
    }

    pub fn get_department(&self, id: DepartmentId) -> Result<Department> {
        self.storage.get_department(id)
    }
}
