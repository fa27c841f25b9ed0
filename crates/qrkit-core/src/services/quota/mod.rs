//! Quota tracking module
//!
//! Monthly, plan-scoped export allowance.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ QuotaStore                                  │
//! │   - load()        month rollover / recovery │
//! │   - can_consume() / remaining()             │
//! │   - consume()     used += 1, persisted      │
//! │   - set_plan()    fresh cycle, persisted    │
//! └─────────────────────────────────────────────┘
//!          │
//!          ▼
//! ┌─────────────────────────────────────────────┐
//! │ trait StateStore  (SQLite / in-memory)      │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Month keys are `YYYY-MM` strings, so rollover detection is a plain
//! string inequality against the current key.

pub mod store;
pub mod types;

pub use store::{quota_exceeded, QuotaStore, StoredQuotaRecord};
pub use types::{Limit, Plan, PlanDefinition, QuotaState, QuotaStatus, Remaining, PLANS};
