// commands/check_status.rs

//! Polls the status links returned by asynchronous customer updates.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, ValueEnum};
use color_eyre::eyre::{eyre, Result, WrapErr};
use log::*;
use serde_json::Value;

use super::Context;
use crate::webex::{api, ApiFailure, RequestOutcome};

const EXECUTION_REPORT_PREFIX: &str = "wholesale_customer_external_id_update_execution_";
const PAUSE_BETWEEN_CHECKS: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnlyStatus {
    Succeeded,
    Failed,
}

#[derive(Args, Debug, Clone)]
pub struct CheckStatusArgs {
    /// Status URL to check
    pub url: Option<String>,

    /// Execution report to read status URLs from (latest report when empty)
    #[arg(long, num_args = 0..=1, default_missing_value = "", conflicts_with = "url")]
    pub report: Option<String>,

    /// Only entries that succeeded or failed in the report
    #[arg(long, value_enum)]
    pub only: Option<OnlyStatus>,
}

/// A `Status URL:` line and whether its record succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub customer: String,
    pub url: String,
    pub succeeded: bool,
}

/// Status URLs of an update report, attributed to the numbered entry above them.
pub fn status_urls(report: &str) -> Vec<ReportEntry> {
    let mut entries = Vec::new();
    let mut current: Option<(String, bool)> = None;
    for line in report.lines() {
        let trimmed = line.trim();
        if let Some(rest) = entry_heading(trimmed) {
            let succeeded = rest.starts_with('✓');
            let customer = rest.trim_start_matches(['✓', '✗']).trim().to_string();
            current = Some((customer, succeeded));
        } else if let Some(url) = trimmed.strip_prefix("Status URL:") {
            if let Some((customer, succeeded)) = &current {
                entries.push(ReportEntry {
                    customer: customer.clone(),
                    url: url.trim().to_string(),
                    succeeded: *succeeded,
                });
            }
        } else if !line.starts_with(' ') && !trimmed.is_empty() {
            current = None;
        }
    }
    entries
}

/// `"12. ✓ Acme (ID: c1)"` -> `"✓ Acme (ID: c1)"`
fn entry_heading(line: &str) -> Option<&str> {
    let (number, rest) = line.split_once(". ")?;
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    rest.starts_with(['✓', '✗']).then_some(rest)
}

/// Most recent execution report in `dir`, by timestamped name.
pub fn latest_report(dir: &Path) -> Option<PathBuf> {
    fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(EXECUTION_REPORT_PREFIX) && n.ends_with(".txt"))
        })
        .max()
}

pub fn select(entries: Vec<ReportEntry>, only: Option<OnlyStatus>) -> Vec<ReportEntry> {
    match only {
        None => entries,
        Some(OnlyStatus::Succeeded) => entries.into_iter().filter(|e| e.succeeded).collect(),
        Some(OnlyStatus::Failed) => entries.into_iter().filter(|e| !e.succeeded).collect(),
    }
}

pub async fn run(ctx: &Context, args: &CheckStatusArgs) -> Result<()> {
    let urls = match &args.url {
        Some(url) => vec![url.clone()],
        None => {
            let report = match &args.report {
                Some(path) if !path.trim().is_empty() => PathBuf::from(path.trim()),
                _ => latest_report(&ctx.settings.output_dir).ok_or_else(|| {
                    eyre!(
                        "no execution reports found in {}",
                        ctx.settings.output_dir.display()
                    )
                })?,
            };
            info!("Using report {}", report.display());
            let text = fs::read_to_string(&report)
                .wrap_err_with(|| format!("cannot read report {}", report.display()))?;
            let entries = select(status_urls(&text), args.only);
            println!("Found {} status URLs", entries.len());
            entries.into_iter().map(|e| e.url).collect()
        }
    };

    let results = check_all(ctx, &urls, PAUSE_BETWEEN_CHECKS).await;
    for (i, (url, outcome)) in urls.iter().zip(&results).enumerate() {
        println!("\n--- Checking operation {}/{} ---", i + 1, urls.len());
        println!("Checking status: {url}");
        match outcome {
            Ok(body) => println!("{}", serde_json::to_string_pretty(body)?),
            Err(failure) => println!("Error: {failure}"),
        }
    }
    Ok(())
}

/// Checks each URL in turn, pausing between requests. Returns one outcome
/// per URL; those skipped after an interrupt are `Cancelled`.
pub async fn check_all(ctx: &Context, urls: &[String], pause: Duration) -> Vec<RequestOutcome<Value>> {
    let mut results = Vec::with_capacity(urls.len());
    for (i, url) in urls.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            results.push(Err(ApiFailure::cancelled()));
            continue;
        }
        if i > 0 {
            tokio::time::sleep(pause).await;
        }
        results.push(api::operation_status(&ctx.executor, url).await);
    }
    results
}
