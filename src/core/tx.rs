//! Transaction Boundary
//!
//! Tracks the one transaction level a run opens on its session, so the error
//! path rolls back exactly what the run owns and nothing an outer caller
//! opened.

use super::error::{CoreError, CoreResult};
use crate::storage::DbSession;

/// Begin/commit/rollback bookkeeping for one executor run
#[derive(Debug, Default)]
pub struct TxBoundary {
    /// Session depth right after our begin; `None` until begun
    level: Option<usize>,
    committed: bool,
}

impl TxBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a transaction, or a savepoint if the session already has one
    pub async fn begin(&mut self, db: &mut dyn DbSession) -> CoreResult<()> {
        db.begin().await?;
        self.level = Some(db.depth());
        self.committed = false;
        tracing::debug!(depth = db.depth(), "transaction opened");
        Ok(())
    }

    /// Commit the level this run opened
    ///
    /// Fails without committing when a hook or handler left a savepoint open
    /// or closed the run's own level, so the error path can unwind it.
    pub async fn commit(&mut self, db: &mut dyn DbSession) -> CoreResult<()> {
        let Some(level) = self.level else {
            return Ok(());
        };
        if self.committed {
            return Ok(());
        }

        let depth = db.depth();
        if depth != level {
            return Err(CoreError::internal(format!(
                "unbalanced transaction: depth {depth} at commit, opened at {level}"
            )));
        }

        db.commit().await?;
        self.committed = true;
        tracing::debug!("transaction committed");
        Ok(())
    }

    /// Whether the run opened a level that is still open
    fn needs_rollback(&self, db: &dyn DbSession) -> bool {
        match self.level {
            Some(level) => !self.committed && db.depth() >= level,
            None => false,
        }
    }

    /// Roll back the level this run opened and any savepoints left open above
    /// it. Returns whether a rollback happened.
    pub async fn rollback(&mut self, db: &mut dyn DbSession) -> CoreResult<bool> {
        let Some(level) = self.level.filter(|_| self.needs_rollback(db)) else {
            return Ok(false);
        };
        self.level = None;

        let unclosed = db.depth() - level;
        if unclosed > 0 {
            tracing::warn!(unclosed, "rolling back savepoints left open");
        }
        while db.depth() >= level {
            db.rollback().await?;
        }
        tracing::debug!("transaction rolled back");
        Ok(true)
    }
}
