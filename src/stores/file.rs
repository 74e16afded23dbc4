//! Period store backed by local JSON documents.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{Period, Project, Quarter};

use super::{
    apply_write, check_expected, PeriodStore, Revision, StoredPeriod, StoreError, WriteMode,
};

/// On-disk envelope: the period document plus its revision counter.
#[derive(Serialize, Deserialize)]
struct Envelope {
    revision: Revision,
    #[serde(flatten)]
    doc: Period,
}

/// Adapter that stores the project register and period documents as JSON
/// files under a data directory: `projects.json` holds the register, each
/// period lives at `<project>/<year>-<quarter>.json`.
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a new store rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn projects_path(&self) -> PathBuf {
        self.base_dir.join("projects.json")
    }

    fn period_path(&self, project_id: &str, year: i32, quarter: Quarter) -> PathBuf {
        self.base_dir
            .join(project_id)
            .join(format!("{year}-{quarter}.json"))
    }

    fn read_register(&self) -> Result<HashMap<String, Project>, StoreError> {
        let path = self.projects_path();
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let data = std::fs::read_to_string(&path)
            .map_err(|e| StoreError::Transient(e.to_string()))?;
        serde_json::from_str(&data).map_err(|e| StoreError::Permanent(e.to_string()))
    }

    /// Adds or replaces a project in the register. The register itself is
    /// maintained elsewhere; this exists for seeding and tests.
    pub fn put_project(&self, project: &Project) -> Result<(), StoreError> {
        let mut register = self.read_register()?;
        register.insert(project.id.clone(), project.clone());
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| StoreError::Permanent(e.to_string()))?;
        let data = serde_json::to_string_pretty(&register)
            .map_err(|e| StoreError::Permanent(e.to_string()))?;
        std::fs::write(self.projects_path(), data)
            .map_err(|e| StoreError::Transient(e.to_string()))
    }

    fn read_envelope(
        &self,
        project_id: &str,
        year: i32,
        quarter: Quarter,
    ) -> Result<Option<Envelope>, StoreError> {
        let path = self.period_path(project_id, year, quarter);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)
            .map_err(|e| StoreError::Transient(e.to_string()))?;
        let envelope =
            serde_json::from_str(&data).map_err(|e| StoreError::Permanent(e.to_string()))?;
        Ok(Some(envelope))
    }
}

#[async_trait]
impl PeriodStore for FileStore {
    async fn project(&self, project_id: &str) -> Result<Option<Project>, StoreError> {
        Ok(self.read_register()?.remove(project_id))
    }

    async fn period(
        &self,
        project_id: &str,
        year: i32,
        quarter: Quarter,
    ) -> Result<Option<StoredPeriod>, StoreError> {
        Ok(self
            .read_envelope(project_id, year, quarter)?
            .map(|envelope| StoredPeriod {
                doc: envelope.doc,
                revision: envelope.revision,
            }))
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
        let current = self.read_envelope(project_id, year, quarter)?;
        check_expected(expected, current.as_ref().map(|e| e.revision))?;

        let merged = apply_write(current.as_ref().map(|e| &e.doc), doc, mode);
        let revision = current
            .map(|e| e.revision.next())
            .unwrap_or(Revision(1));

        let path = self.period_path(project_id, year, quarter);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Permanent(e.to_string()))?;
        }
        let data = serde_json::to_string_pretty(&Envelope {
            revision,
            doc: merged,
        })
        .map_err(|e| StoreError::Permanent(e.to_string()))?;
        std::fs::write(&path, data).map_err(|e| StoreError::Transient(e.to_string()))?;
        debug!(%project_id, year, %quarter, revision = revision.0, "period written");
        Ok(())
    }
}
