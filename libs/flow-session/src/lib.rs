//! High-level session invalidation built on top of [`FlowStore`]'s
//! partition-scoped bulk operations (spec §4.7).
//!
//! A thin policy layer: no flow-definition or engine knowledge, just
//! bulk invalidation by user/partition/instance, with the auditing
//! posture spec §4.7 calls for (security events are always logged,
//! with active instances pre-enumerated for the audit trail, before
//! the invalidation itself runs).

use std::collections::HashSet;
use std::sync::Arc;

use flow_engine::{store::FlowStore, ArgumentError, DataAccessError};
use thiserror::Error;
use tracing::warn;

/// Failures from session-manager operations: either a rejected
/// argument or a propagated store failure.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Argument(#[from] ArgumentError),
    #[error(transparent)]
    Store(#[from] DataAccessError),
}

fn require_non_blank(field: &'static str, value: &str) -> Result<(), SessionError> {
    if value.trim().is_empty() {
        return Err(SessionError::Argument(ArgumentError::Blank { field }));
    }
    Ok(())
}

/// Session-scoped invalidation operations over a [`FlowStore`].
pub struct SessionManager<S: FlowStore> {
    store: Arc<S>,
}

impl<S: FlowStore> SessionManager<S> {
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Invalidate every flow instance scoped to `user_id`'s partition,
    /// on logout.
    pub async fn invalidate_user_session(&self, user_id: &str) -> Result<u64, SessionError> {
        require_non_blank("userId", user_id)?;
        let removed = self.store.invalidate_by_partition(user_id).await?;
        Ok(removed)
    }

    /// Invalidate every flow instance in `partition` as a result of a
    /// security event. Always logs the reason and the set of instances
    /// affected (enumerated before deletion) for audit, mirroring the
    /// "never let audit fail silently" posture elsewhere in this stack.
    pub async fn invalidate_on_security_event(
        &self,
        partition: &str,
        reason: &str,
    ) -> Result<u64, SessionError> {
        require_non_blank("partition", partition)?;
        require_non_blank("reason", reason)?;

        let active = self.store.list_active_flows(partition).await?;
        warn!(
            partition,
            reason,
            active_instance_count = active.len(),
            "security-event invalidation"
        );

        let removed = self.store.invalidate_by_partition(partition).await?;
        Ok(removed)
    }

    /// Invalidate exactly the given storage keys (a targeted bulk
    /// operation, e.g. an admin action against specific instances).
    pub async fn invalidate_flows(
        &self,
        ids: &[String],
        reason: Option<&str>,
    ) -> Result<u64, SessionError> {
        if let Some(reason) = reason {
            warn!(count = ids.len(), reason, "targeted flow invalidation");
        }
        let removed = self.store.bulk_delete(ids).await?;
        Ok(removed)
    }

    /// Invalidate every partition in `partitions`, skipping blanks,
    /// returning the sum of per-partition removal counts.
    pub async fn invalidate_multiple_partitions(
        &self,
        partitions: &[String],
        reason: Option<&str>,
    ) -> Result<u64, SessionError> {
        let mut total = 0;
        for partition in partitions {
            if partition.trim().is_empty() {
                continue;
            }
            if let Some(reason) = reason {
                warn!(partition, reason, "multi-partition invalidation");
            }
            total += self.store.invalidate_by_partition(partition).await?;
        }
        Ok(total)
    }

    /// Enumerate the instance ids currently active within `partition`.
    pub async fn list_active_flows(&self, partition: &str) -> Result<HashSet<String>, SessionError> {
        require_non_blank("partition", partition)?;
        let ids = self.store.list_active_flows(partition).await?;
        Ok(ids.into_iter().collect())
    }
}
