//! Period stores: durable homes for project and quarter documents.

pub mod file;
pub mod retry;

pub use file::FileStore;
pub use retry::RetryingStore;

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::{Period, Project, Quarter};

/// Represents errors that can occur when talking to a period store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The operation may succeed if repeated (I/O hiccup, lock contention).
    Transient(String),
    /// The operation will not succeed if repeated.
    Permanent(String),
    /// A conditional write found a different revision than expected:
    /// somebody else wrote the document between our read and our write.
    RevisionConflict {
        expected: Revision,
        actual: Option<Revision>,
    },
}

impl StoreError {
    /// Whether a retry wrapper should repeat the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Transient(msg) => write!(f, "transient store error: {msg}"),
            StoreError::Permanent(msg) => write!(f, "store error: {msg}"),
            StoreError::RevisionConflict { expected, actual } => match actual {
                Some(actual) => write!(
                    f,
                    "revision conflict: expected {} but found {}",
                    expected.0, actual.0
                ),
                None => write!(
                    f,
                    "revision conflict: expected {} but the document is gone",
                    expected.0
                ),
            },
        }
    }
}

impl std::error::Error for StoreError {}

/// Opaque optimistic-concurrency token of a stored period document.
///
/// Every successful write bumps the revision; a write that names an
/// expected revision fails with [`StoreError::RevisionConflict`] when the
/// stored document has moved on. This closes the read-then-write gap in
/// the finalize check: two racing settlements can both pass the guard, but
/// only one write lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Revision(pub u64);

impl Revision {
    fn next(self) -> Revision {
        Revision(self.0 + 1)
    }
}

/// A period document together with its current revision.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPeriod {
    pub doc: Period,
    pub revision: Revision,
}

/// How a period write treats a pre-existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the document wholesale.
    Overwrite,
    /// Replace items, overall revenue and `updated_at`; keep the existing
    /// document's `created_at` and finalize state. Equivalent to a partial
    /// document update that simply never names those fields.
    Merge,
}

/// Abstraction over the durable store of projects and quarter periods.
///
/// Calls are async and the engine awaits them in issuance order. The store
/// promises nothing across documents; each write is atomic on its own.
#[async_trait]
pub trait PeriodStore: Send + Sync {
    /// Looks up a project in the register.
    async fn project(&self, project_id: &str) -> Result<Option<Project>, StoreError>;

    /// Reads the period document at (project, year, quarter), if any.
    async fn period(
        &self,
        project_id: &str,
        year: i32,
        quarter: Quarter,
    ) -> Result<Option<StoredPeriod>, StoreError>;

    /// Writes a period document. With `expected = Some(rev)` the write only
    /// lands if the stored document still carries that revision; `None`
    /// writes unconditionally (used when creating a document).
    async fn put_period(
        &self,
        project_id: &str,
        year: i32,
        quarter: Quarter,
        doc: &Period,
        mode: WriteMode,
        expected: Option<Revision>,
    ) -> Result<(), StoreError>;
}

/// Applies [`WriteMode`] semantics given the incoming document and whatever
/// is currently stored. Shared by the adapters.
fn apply_write(existing: Option<&Period>, doc: &Period, mode: WriteMode) -> Period {
    match (mode, existing) {
        (WriteMode::Merge, Some(current)) => Period {
            items: doc.items.clone(),
            overall_revenue: doc.overall_revenue,
            updated_at: doc.updated_at,
            created_at: current.created_at.or(doc.created_at),
            is_finalized: current.is_finalized,
            finalized_at: current.finalized_at,
        },
        _ => doc.clone(),
    }
}

fn check_expected(
    expected: Option<Revision>,
    actual: Option<Revision>,
) -> Result<(), StoreError> {
    match expected {
        Some(expected) if actual != Some(expected) => {
            Err(StoreError::RevisionConflict { expected, actual })
        }
        _ => Ok(()),
    }
}

type PeriodKey = (String, i32, Quarter);

/// In-memory store, used by tests and by embedding hosts that load their
/// own documents.
#[derive(Default)]
pub struct MemoryStore {
    projects: Mutex<HashMap<String, Project>>,
    periods: Mutex<HashMap<PeriodKey, StoredPeriod>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a project into the register.
    pub fn add_project(&self, project: Project) {
        let mut projects = self.projects.lock().expect("projects mutex poisoned");
        projects.insert(project.id.clone(), project);
    }

    /// Seeds a period document, starting its revision at 1.
    pub fn add_period(&self, project_id: &str, year: i32, quarter: Quarter, doc: Period) {
        let mut periods = self.periods.lock().expect("periods mutex poisoned");
        periods.insert(
            (project_id.to_string(), year, quarter),
            StoredPeriod {
                doc,
                revision: Revision(1),
            },
        );
    }
}

#[async_trait]
impl PeriodStore for MemoryStore {
    async fn project(&self, project_id: &str) -> Result<Option<Project>, StoreError> {
        let projects = self.projects.lock().expect("projects mutex poisoned");
        Ok(projects.get(project_id).cloned())
    }

    async fn period(
        &self,
        project_id: &str,
        year: i32,
        quarter: Quarter,
    ) -> Result<Option<StoredPeriod>, StoreError> {
        let periods = self.periods.lock().expect("periods mutex poisoned");
        Ok(periods
            .get(&(project_id.to_string(), year, quarter))
            .cloned())
    }

    async fn put_period(
        &self,
        project_id: &str,
        year: i32,
        quarter: Quarter,
        doc: &Period,
        mode: WriteMode,
        expected: Option<Revision>,
    ) -> Result<(), StoreError> {
        let mut periods = self.periods.lock().expect("periods mutex poisoned");
        let key = (project_id.to_string(), year, quarter);
        let current = periods.get(&key);
        check_expected(expected, current.map(|s| s.revision))?;

        let merged = apply_write(current.map(|s| &s.doc), doc, mode);
        let revision = current.map(|s| s.revision.next()).unwrap_or(Revision(1));
        periods.insert(
            key,
            StoredPeriod {
                doc: merged,
                revision,
            },
        );
        Ok(())
    }
}
