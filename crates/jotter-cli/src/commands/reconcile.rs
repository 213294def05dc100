use jotter_core::ReconcileReport;
use serde::Serialize;

use crate::commands::common::AppContext;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct ReconcileSummary {
    pub user_id: String,
    pub fetched: usize,
    pub merged: usize,
    pub skipped: Vec<SkippedSummary>,
    pub collisions: Vec<i64>,
    pub remote_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SkippedSummary {
    pub document_id: String,
    pub reason: String,
}

impl From<&ReconcileReport> for ReconcileSummary {
    fn from(report: &ReconcileReport) -> Self {
        Self {
            user_id: report.user_id.clone(),
            fetched: report.fetched,
            merged: report.merged,
            skipped: report
                .skipped
                .iter()
                .map(|skipped| SkippedSummary {
                    document_id: skipped.document_id.clone(),
                    reason: skipped.reason.to_string(),
                })
                .collect(),
            collisions: report.collisions.iter().map(|id| id.get()).collect(),
            remote_error: report.remote_error.clone(),
        }
    }
}

pub async fn run_reconcile(
    ctx: &AppContext,
    user: Option<&str>,
    as_json: bool,
) -> Result<(), CliError> {
    let user_id = match user.map(str::trim).filter(|user| !user.is_empty()) {
        Some(user) => user.to_string(),
        None => ctx.auth.current_user_id().ok_or(CliError::NotSignedIn)?,
    };

    let report = ctx.sync.reconcile(&user_id).await?;
    if as_json {
        let summary = ReconcileSummary::from(&report);
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

pub fn print_report(report: &ReconcileReport) {
    if let Some(error) = &report.remote_error {
        println!("Reconcile for {} failed: {error}", report.user_id);
        println!("Local notes were left unchanged.");
        return;
    }

    println!(
        "Reconciled {}: fetched {}, merged {}, skipped {}",
        report.user_id,
        report.fetched,
        report.merged,
        report.skipped.len()
    );
    for skipped in &report.skipped {
        println!("  skipped {}: {}", skipped.document_id, skipped.reason);
    }
    if !report.collisions.is_empty() {
        let ids = report
            .collisions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        println!("  warning: remote copy replaced notes owned by another user: {ids}");
    }
}
