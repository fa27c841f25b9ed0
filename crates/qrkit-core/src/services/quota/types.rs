//! Plan and quota types

use serde::{Deserialize, Serialize};

// ============================================================================
// Plans
// ============================================================================

/// Subscription tier with a fixed monthly export limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    #[default]
    Free,
    Starter,
    Pro,
    Business,
    Enterprise,
}

/// Monthly export limit of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Finite(u32),
    Unbounded,
}

/// Static description of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanDefinition {
    pub plan: Plan,
    pub label: &'static str,
    pub limit: Limit,
}

/// All plans, cheapest first
pub const PLANS: [PlanDefinition; 5] = [
    PlanDefinition {
        plan: Plan::Free,
        label: "Free",
        limit: Limit::Finite(5),
    },
    PlanDefinition {
        plan: Plan::Starter,
        label: "Starter",
        limit: Limit::Finite(50),
    },
    PlanDefinition {
        plan: Plan::Pro,
        label: "Pro",
        limit: Limit::Finite(200),
    },
    PlanDefinition {
        plan: Plan::Business,
        label: "Business",
        limit: Limit::Finite(1000),
    },
    PlanDefinition {
        plan: Plan::Enterprise,
        label: "Enterprise",
        limit: Limit::Unbounded,
    },
];

impl Plan {
    /// Static definition for this plan
    pub fn definition(self) -> &'static PlanDefinition {
        match self {
            Plan::Free => &PLANS[0],
            Plan::Starter => &PLANS[1],
            Plan::Pro => &PLANS[2],
            Plan::Business => &PLANS[3],
            Plan::Enterprise => &PLANS[4],
        }
    }

    pub fn label(self) -> &'static str {
        self.definition().label
    }

    pub fn limit(self) -> Limit {
        self.definition().limit
    }

    /// Stable identifier used in persisted records
    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Starter => "starter",
            Plan::Pro => "pro",
            Plan::Business => "business",
            Plan::Enterprise => "enterprise",
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "starter" => Ok(Plan::Starter),
            "pro" => Ok(Plan::Pro),
            "business" => Ok(Plan::Business),
            "enterprise" => Ok(Plan::Enterprise),
            _ => Err(format!("Unknown plan: {}", s)),
        }
    }
}

// ============================================================================
// Remaining allowance
// ============================================================================

/// Exports still permitted this month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Remaining {
    Limited(u32),
    Unbounded,
}

impl Remaining {
    pub fn is_exhausted(self) -> bool {
        self == Remaining::Limited(0)
    }
}

impl std::fmt::Display for Remaining {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Remaining::Limited(n) => write!(f, "{}", n),
            Remaining::Unbounded => write!(f, "∞"),
        }
    }
}

// ============================================================================
// Quota state
// ============================================================================

/// Usage for one plan in one calendar month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    /// Month key, `YYYY-MM`
    pub month: String,
    pub plan: Plan,
    pub used: u32,
}

impl QuotaState {
    /// Fresh state for a month
    pub fn fresh(month: impl Into<String>, plan: Plan) -> Self {
        Self {
            month: month.into(),
            plan,
            used: 0,
        }
    }

    /// Exports left, clamped at zero
    pub fn remaining(&self) -> Remaining {
        match self.plan.limit() {
            Limit::Unbounded => Remaining::Unbounded,
            Limit::Finite(limit) => Remaining::Limited(limit.saturating_sub(self.used)),
        }
    }

    /// Whether one more export is permitted
    pub fn can_consume(&self) -> bool {
        !self.remaining().is_exhausted()
    }
}

/// Quota summary for display
#[derive(Debug, Clone, Serialize)]
pub struct QuotaStatus {
    pub month: String,
    pub plan: Plan,
    pub label: &'static str,
    pub used: u32,
    pub limit: Option<u32>,
    pub remaining: Remaining,
}

impl From<&QuotaState> for QuotaStatus {
    fn from(state: &QuotaState) -> Self {
        Self {
            month: state.month.clone(),
            plan: state.plan,
            label: state.plan.label(),
            used: state.used,
            limit: match state.plan.limit() {
                Limit::Finite(n) => Some(n),
                Limit::Unbounded => None,
            },
            remaining: state.remaining(),
        }
    }
}
