//! Quota storage layer
//!
//! Loads, mutates and persists the monthly, plan-scoped usage counter.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::types::{Limit, Plan, QuotaState, Remaining};
use crate::error::{Error, Result};
use crate::services::state_store::{Clock, StateStore, QUOTA_KEY};

// ============================================================================
// Persisted Record
// ============================================================================

/// Persisted representation of the quota state
///
/// The plan is kept as a raw string so unknown identifiers can fall back to
/// the default plan instead of failing the whole record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredQuotaRecord {
    pub month: String,
    pub plan: String,
    #[serde(default)]
    pub used: u32,
}

impl StoredQuotaRecord {
    /// Convert the record into a `QuotaState`
    pub fn to_quota_state(&self, default_plan: Plan) -> QuotaState {
        let plan = self.plan.parse::<Plan>().unwrap_or_else(|_| {
            log::warn!(
                "[quota:store] Unknown plan '{}', falling back to {}",
                self.plan,
                default_plan
            );
            default_plan
        });

        QuotaState {
            month: self.month.clone(),
            plan,
            used: self.used,
        }
    }
}

impl From<&QuotaState> for StoredQuotaRecord {
    fn from(state: &QuotaState) -> Self {
        Self {
            month: state.month.clone(),
            plan: state.plan.to_string(),
            used: state.used,
        }
    }
}

fn decode_record(raw: &str) -> Result<StoredQuotaRecord> {
    serde_json::from_str(raw).map_err(|e| Error::PersistenceCorrupt(e.to_string()))
}

// ============================================================================
// QuotaStore
// ============================================================================

/// Monthly quota store
pub struct QuotaStore {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    default_plan: Plan,
}

impl QuotaStore {
    /// Create a new QuotaStore over the given record store
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>, default_plan: Plan) -> Self {
        Self {
            store,
            clock,
            default_plan,
        }
    }

    /// Load the current state
    ///
    /// Absent, unreadable, or previous-month records are replaced by a fresh
    /// state for the current month on the default plan, persisted before
    /// returning.
    pub async fn load(&self) -> Result<QuotaState> {
        let month = self.clock.month_key();

        let stored = match self.store.get(QUOTA_KEY).await? {
            Some(raw) => match decode_record(&raw) {
                Ok(record) => Some(record.to_quota_state(self.default_plan)),
                Err(err) => {
                    log::warn!("[quota:store] {}; reinitializing", err);
                    None
                }
            },
            None => None,
        };

        match stored {
            Some(state) if state.month == month => Ok(state),
            previous => {
                if let Some(prev) = &previous {
                    log::info!(
                        "[quota:store] Month rollover {} -> {}, resetting usage",
                        prev.month,
                        month
                    );
                }
                let state = QuotaState::fresh(month, self.default_plan);
                self.save(&state).await?;
                Ok(state)
            }
        }
    }

    /// Exports left for this state
    pub fn remaining(&self, state: &QuotaState) -> Remaining {
        state.remaining()
    }

    /// Whether one more export is permitted
    pub fn can_consume(&self, state: &QuotaState) -> bool {
        state.can_consume()
    }

    /// Record one export
    ///
    /// # Errors
    /// Returns `QuotaExceeded` without touching the state when the plan limit
    /// has already been reached.
    pub async fn consume(&self, state: &mut QuotaState) -> Result<()> {
        if !state.can_consume() {
            return Err(quota_exceeded(state));
        }

        state.used += 1;
        state.month = self.clock.month_key();
        self.save(state).await?;

        log::debug!(
            "[quota:store] Consumed 1 export on {} ({} used)",
            state.plan,
            state.used
        );
        Ok(())
    }

    /// Switch plan; always starts a fresh usage cycle
    pub async fn set_plan(&self, state: &mut QuotaState, plan: Plan) -> Result<()> {
        let next = QuotaState::fresh(self.clock.month_key(), plan);
        self.save(&next).await?;
        *state = next;

        log::info!("[quota:store] Plan set to {}", plan);
        Ok(())
    }

    async fn save(&self, state: &QuotaState) -> Result<()> {
        let raw = serde_json::to_string(&StoredQuotaRecord::from(state))?;
        self.store.put(QUOTA_KEY, &raw).await
    }
}

/// `QuotaExceeded` for an exhausted state
pub fn quota_exceeded(state: &QuotaState) -> Error {
    let limit = match state.plan.limit() {
        Limit::Finite(n) => n,
        Limit::Unbounded => u32::MAX,
    };
    Error::QuotaExceeded {
        plan: state.plan,
        limit,
    }
}

// ============================================================================
// Tests
// ============================================================================
