//! Settlement and transition of quarter periods, per project and in batch.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::stores::{PeriodStore, StoreError, WriteMode};

use super::{merge, next_period, ItemKey, LineItem, Period, Quarter};

/// Errors raised while settling or transitioning a single project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleError {
    /// The referenced project id has no record in the register.
    ProjectNotFound { project_id: String },
    /// No period document exists at (project, year, quarter).
    PeriodNotFound { year: i32, quarter: Quarter },
    /// The period was already settled; settling again would corrupt the
    /// carried-forward balances.
    AlreadyFinalized { year: i32, quarter: Quarter },
    /// A conditional write lost against a concurrent writer.
    Conflict(String),
    /// Opaque persistence failure.
    Storage(String),
}

impl std::fmt::Display for SettleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettleError::ProjectNotFound { project_id } => {
                write!(f, "project {project_id} not found")
            }
            SettleError::PeriodNotFound { year, quarter } => {
                write!(f, "period {quarter}/{year} not found")
            }
            SettleError::AlreadyFinalized { year, quarter } => {
                write!(f, "{quarter}/{year} is already settled")
            }
            SettleError::Conflict(msg) => write!(f, "concurrent update: {msg}"),
            SettleError::Storage(msg) => write!(f, "storage failure: {msg}"),
        }
    }
}

impl std::error::Error for SettleError {}

impl From<StoreError> for SettleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RevisionConflict { .. } => SettleError::Conflict(err.to_string()),
            other => SettleError::Storage(other.to_string()),
        }
    }
}

/// Successful close-and-carry outcome for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledProject {
    pub project_id: String,
    pub project_name: String,
    pub next_year: i32,
    pub next_quarter: Quarter,
}

/// Failure entry of a batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub project_id: String,
    pub error: SettleError,
}

/// Aggregate outcome of a batch run. One project's failure never aborts
/// the batch; already-committed projects keep their writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub success: Vec<SettledProject>,
    pub failed: Vec<BatchFailure>,
}

/// Progress event emitted once per processed project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    pub current: usize,
    pub total: usize,
    pub current_project: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Settle,
    Transition,
}

/// Close-and-carry orchestration over a period store.
pub struct SettlementEngine<S> {
    store: S,
}

impl<S: PeriodStore> SettlementEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Settles (year, quarter) for each project in order, collecting
    /// independent per-project outcomes. `on_progress` fires once per
    /// project, before its two writes are attempted.
    pub async fn settle(
        &self,
        project_ids: &[String],
        year: i32,
        quarter: Quarter,
        on_progress: impl FnMut(BatchProgress),
    ) -> BatchResult {
        self.run_batch(project_ids, year, quarter, Operation::Settle, on_progress)
            .await
    }

    /// Like [`settle`](Self::settle) but carries balances forward without
    /// locking the current quarter.
    pub async fn transition(
        &self,
        project_ids: &[String],
        year: i32,
        quarter: Quarter,
        on_progress: impl FnMut(BatchProgress),
    ) -> BatchResult {
        self.run_batch(
            project_ids,
            year,
            quarter,
            Operation::Transition,
            on_progress,
        )
        .await
    }

    async fn run_batch(
        &self,
        project_ids: &[String],
        year: i32,
        quarter: Quarter,
        operation: Operation,
        mut on_progress: impl FnMut(BatchProgress),
    ) -> BatchResult {
        let total = project_ids.len();
        let mut result = BatchResult::default();

        // Strictly sequential: each project's reads and writes finish
        // before the next project starts, so progress is deterministic.
        for (index, project_id) in project_ids.iter().enumerate() {
            let display_name = match self.store.project(project_id).await {
                Ok(Some(project)) => project.name,
                Ok(None) => project_id.clone(),
                Err(err) => {
                    warn!(%project_id, %err, "skipping project: register lookup failed");
                    result.failed.push(BatchFailure {
                        project_id: project_id.clone(),
                        error: err.into(),
                    });
                    continue;
                }
            };

            on_progress(BatchProgress {
                current: index + 1,
                total,
                current_project: display_name.clone(),
            });

            let outcome = match operation {
                Operation::Settle => self.settle_project(project_id, year, quarter).await,
                Operation::Transition => self.transition_project(project_id, year, quarter).await,
            };
            match outcome {
                Ok(settled) => result.success.push(settled),
                Err(error) => {
                    warn!(%project_id, %error, "project failed, continuing batch");
                    result.failed.push(BatchFailure {
                        project_id: project_id.clone(),
                        error,
                    });
                }
            }
        }

        info!(
            total,
            succeeded = result.success.len(),
            failed = result.failed.len(),
            "batch finished"
        );
        result
    }

    /// Closes one project's quarter and carries its balances forward.
    ///
    /// The current period is re-written wholesale with every row closed and
    /// locked; the next period is written with merge semantics so rows
    /// added there by hand survive. Both writes are revision-guarded
    /// against concurrent settlement of the same quarter. No retries here;
    /// retry policy belongs to the caller or a store decorator.
    pub async fn settle_project(
        &self,
        project_id: &str,
        year: i32,
        quarter: Quarter,
    ) -> Result<SettledProject, SettleError> {
        let project = self.store.project(project_id).await?.ok_or_else(|| {
            SettleError::ProjectNotFound {
                project_id: project_id.to_string(),
            }
        })?;
        let stored = self
            .store
            .period(project_id, year, quarter)
            .await?
            .ok_or(SettleError::PeriodNotFound { year, quarter })?;
        let period = stored.doc;

        if period.is_closed() {
            return Err(SettleError::AlreadyFinalized { year, quarter });
        }

        // Snapshot `debt − directCost` for every VT/NC row before closing;
        // it seeds `baseForNptck` on the corresponding next-quarter row,
        // one quarter delayed.
        let base_values: HashMap<ItemKey, i64> = period
            .items
            .iter()
            .filter(|item| !item.is_overhead())
            .map(|item| (item.key(), item.debt - item.direct_cost))
            .collect();

        let now = Utc::now();
        let closed_items: Vec<LineItem> =
            period.items.iter().cloned().map(close_item).collect();
        info!(
            project_id,
            %quarter,
            year,
            items = closed_items.len(),
            "settling quarter"
        );

        let closed_period = Period {
            items: closed_items.clone(),
            overall_revenue: period.overall_revenue,
            is_finalized: true,
            finalized_at: Some(now),
            updated_at: Some(now),
            created_at: period.created_at,
        };
        self.store
            .put_period(
                project_id,
                year,
                quarter,
                &closed_period,
                WriteMode::Overwrite,
                Some(stored.revision),
            )
            .await?;

        let (next_year, next_quarter) = next_period(year, quarter);
        let existing = self.store.period(project_id, next_year, next_quarter).await?;
        let (existing_items, existing_revenue, expected) = match existing {
            Some(next) => (next.doc.items, next.doc.overall_revenue, Some(next.revision)),
            None => (Vec::new(), 0, None),
        };
        debug!(
            project_id,
            %next_quarter,
            next_year,
            pre_existing = existing_items.len(),
            "carrying balances forward"
        );

        let merged = merge::resolve(&closed_items, existing_items, &project.kind, &base_values);
        let next_doc = Period {
            items: merged,
            overall_revenue: existing_revenue,
            is_finalized: false,
            finalized_at: None,
            updated_at: Some(now),
            created_at: None,
        };
        self.store
            .put_period(
                project_id,
                next_year,
                next_quarter,
                &next_doc,
                WriteMode::Merge,
                expected,
            )
            .await?;

        Ok(SettledProject {
            project_id: project_id.to_string(),
            project_name: project.name,
            next_year,
            next_quarter,
        })
    }

    /// Carries one project's balances forward without locking the quarter:
    /// the current rows are persisted as-is, no closing formulas run, and
    /// no base-value snapshot is taken, so the carry can be repeated after
    /// corrections until a final settle.
    pub async fn transition_project(
        &self,
        project_id: &str,
        year: i32,
        quarter: Quarter,
    ) -> Result<SettledProject, SettleError> {
        let project = self.store.project(project_id).await?.ok_or_else(|| {
            SettleError::ProjectNotFound {
                project_id: project_id.to_string(),
            }
        })?;
        let stored = self
            .store
            .period(project_id, year, quarter)
            .await?
            .ok_or(SettleError::PeriodNotFound { year, quarter })?;
        let period = stored.doc;

        let now = Utc::now();
        info!(
            project_id,
            %quarter,
            year,
            items = period.items.len(),
            "transitioning quarter"
        );
        let current_doc = Period {
            updated_at: Some(now),
            ..period.clone()
        };
        self.store
            .put_period(
                project_id,
                year,
                quarter,
                &current_doc,
                WriteMode::Overwrite,
                Some(stored.revision),
            )
            .await?;

        let (next_year, next_quarter) = next_period(year, quarter);
        let existing = self.store.period(project_id, next_year, next_quarter).await?;
        let (existing_items, existing_revenue, expected) = match existing {
            Some(next) => (next.doc.items, next.doc.overall_revenue, Some(next.revision)),
            None => (Vec::new(), 0, None),
        };

        let merged = merge::resolve(
            &period.items,
            existing_items,
            &project.kind,
            &HashMap::new(),
        );
        let next_doc = Period {
            items: merged,
            overall_revenue: existing_revenue,
            is_finalized: false,
            finalized_at: None,
            updated_at: Some(now),
            created_at: Some(now),
        };
        self.store
            .put_period(
                project_id,
                next_year,
                next_quarter,
                &next_doc,
                WriteMode::Merge,
                expected,
            )
            .await?;

        Ok(SettledProject {
            project_id: project_id.to_string(),
            project_name: project.name,
            next_year,
            next_quarter,
        })
    }
}

/// Applies the closing formula for one row and locks it.
///
/// VT/NC rows close their payable as `debt − directCost`; CP rows subtract
/// the closing carry from the payable and reset the carry to zero.
fn close_item(mut item: LineItem) -> LineItem {
    if item.is_overhead() {
        item.no_phai_tra_ck -= item.carryover_end;
        item.carryover_end = 0;
    } else {
        item.no_phai_tra_ck = item.debt - item.direct_cost;
    }
    item.is_finalized = true;
    item
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vt_nc_close_uses_debt_minus_direct_cost() {
        let mut item = LineItem::blank();
        item.project = "XD-01".to_string();
        item.debt = 1000;
        item.direct_cost = 400;
        item.no_phai_tra_ck = 77;
        // The stale base snapshot never changes the operative formula.
        item.base_for_nptck = Some(5000);

        let closed = close_item(item);
        assert_eq!(closed.no_phai_tra_ck, 600);
        assert!(closed.is_finalized);
    }

    #[test]
    fn cp_close_consumes_the_carry() {
        let mut item = LineItem::blank();
        item.project = "XD-01-CP".to_string();
        item.no_phai_tra_ck = 300;
        item.carryover_end = 120;
        item.debt = 9999;
        item.direct_cost = 1;

        let closed = close_item(item);
        assert_eq!(closed.no_phai_tra_ck, 180);
        assert_eq!(closed.carryover_end, 0);
        assert!(closed.is_finalized);
    }
}
