//! Plan commands
//!
//! Commands for inspecting the monthly quota and switching plans.

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

use qrkit_core::services::Limit;
use qrkit_core::{Plan, QuotaStatus, PLANS};

use super::{resolve_out_dir, Context};
use crate::output::{print_info, print_output, print_single, print_success};

#[derive(Subcommand)]
pub enum PlanAction {
    /// Show the current plan and this month's usage
    Show,

    /// List available plans
    List,

    /// Switch plan (usage restarts at zero)
    Set {
        /// Plan: free, starter, pro, business or enterprise
        plan: Plan,
    },
}

/// Quota row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct QuotaRow {
    #[tabled(rename = "Plan")]
    pub plan: String,
    #[tabled(rename = "Month")]
    pub month: String,
    #[tabled(rename = "Used")]
    pub used: u32,
    #[tabled(rename = "Limit")]
    pub limit: String,
    #[tabled(rename = "Remaining")]
    pub remaining: String,
}

impl From<QuotaStatus> for QuotaRow {
    fn from(status: QuotaStatus) -> Self {
        Self {
            plan: status.label.to_string(),
            month: status.month,
            used: status.used,
            limit: status
                .limit
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unlimited".to_string()),
            remaining: status.remaining.to_string(),
        }
    }
}

/// Plan row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct PlanRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Monthly Exports")]
    pub limit: String,
}

pub async fn execute(ctx: &Context, action: PlanAction) -> Result<()> {
    match action {
        PlanAction::Show => show_plan(ctx).await,
        PlanAction::List => list_plans(ctx),
        PlanAction::Set { plan } => set_plan(ctx, plan).await,
    }
}

async fn show_plan(ctx: &Context) -> Result<()> {
    let studio = ctx.studio(resolve_out_dir(None))?;
    let status = studio.quota_status().await?;
    print_single(&QuotaRow::from(status), ctx.format)
}

fn list_plans(ctx: &Context) -> Result<()> {
    let rows: Vec<PlanRow> = PLANS
        .iter()
        .map(|def| PlanRow {
            id: def.plan.as_str().to_string(),
            name: def.label.to_string(),
            limit: match def.limit {
                Limit::Finite(n) => n.to_string(),
                Limit::Unbounded => "unlimited".to_string(),
            },
        })
        .collect();
    print_output(&rows, ctx.format)
}

async fn set_plan(ctx: &Context, plan: Plan) -> Result<()> {
    let studio = ctx.studio(resolve_out_dir(None))?;
    let status = studio.set_plan(plan).await?;
    print_success(&format!("Plan set to {}", status.label), ctx.quiet);
    print_info(
        &format!("{} exports remaining this month", status.remaining),
        ctx.quiet,
    );
    Ok(())
}
