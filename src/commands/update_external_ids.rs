// commands/update_external_ids.rs

//! Batch replacement of wholesale customer external IDs from an export CSV.

use std::fmt::{self, Write as _};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use clap::{ArgGroup, Args};
use color_eyre::eyre::{eyre, Result, WrapErr};
use itertools::Itertools;
use log::*;
use regex::{Regex, RegexBuilder};

use super::Context;
use crate::batch::{
    Completed, CustomerRecord, CustomerUpdater, UpdateMode, UpdateResult, UpdateState,
    UpdateSummary,
};
use crate::records::{self, Row};
use crate::webex::{ErrorKind, Executor, RetryPolicy};

#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("mode").required(true).args(["dry_run", "execute"])))]
#[command(group(ArgGroup::new("include").args(["org_names", "org_pattern", "org_contains"])))]
pub struct UpdateArgs {
    /// Customer export CSV
    #[arg(short, long)]
    pub input: PathBuf,

    /// Validate and preview without calling the API
    #[arg(long)]
    pub dry_run: bool,

    /// Send the updates
    #[arg(long)]
    pub execute: bool,

    /// Only these organizations (comma separated, exact names)
    #[arg(long)]
    pub org_names: Option<String>,

    /// Only organizations matching this regex (case insensitive)
    #[arg(long)]
    pub org_pattern: Option<String>,

    /// Only organizations whose name contains this text (case insensitive)
    #[arg(long)]
    pub org_contains: Option<String>,

    /// Skip these organizations (comma separated, exact names)
    #[arg(long)]
    pub exclude_orgs: Option<String>,

    /// Start from the customer with this ID
    #[arg(long)]
    pub resume_from: Option<String>,

    /// Parallel updates
    #[arg(long, default_value_t = 5)]
    pub batch_size: usize,

    /// Seconds to wait after each request
    #[arg(long, default_value = "0.2", value_parser = super::parse_delay)]
    pub delay: Duration,

    /// Report directory (default: the configured output directory)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

impl UpdateArgs {
    pub fn mode(&self) -> UpdateMode {
        if self.execute {
            UpdateMode::Execute
        } else {
            UpdateMode::DryRun
        }
    }
}

#[derive(Debug, Clone)]
enum Include {
    All,
    Names(Vec<String>),
    Pattern(Regex),
    Contains(String),
}

/// Organization name filters applied to the input records.
#[derive(Debug, Clone)]
pub struct OrgFilter {
    include: Include,
    exclude: Vec<String>,
}

impl OrgFilter {
    pub fn from_args(args: &UpdateArgs) -> Result<Self> {
        let include = if let Some(names) = &args.org_names {
            Include::Names(records::parse_list(names))
        } else if let Some(pattern) = &args.org_pattern {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .wrap_err_with(|| format!("invalid regex pattern '{pattern}'"))?;
            Include::Pattern(regex)
        } else if let Some(text) = &args.org_contains {
            Include::Contains(text.to_lowercase())
        } else {
            Include::All
        };
        let exclude = args
            .exclude_orgs
            .as_deref()
            .map(records::parse_list)
            .unwrap_or_default();
        Ok(Self { include, exclude })
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.include, Include::All) || !self.exclude.is_empty()
    }

    pub fn accepts(&self, record: &CustomerRecord) -> bool {
        let name = record.org_name().unwrap_or_default();
        let included = match &self.include {
            Include::All => true,
            Include::Names(names) => names.iter().any(|n| n == name),
            Include::Pattern(regex) => regex.is_match(name),
            Include::Contains(text) => name.to_lowercase().contains(text),
        };
        included && !self.exclude.iter().any(|n| n == name)
    }

    /// Lines for the report header.
    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();
        match &self.include {
            Include::All => {}
            Include::Names(names) => lines.push(format!("Organization names: {}", names.join(", "))),
            Include::Pattern(regex) => lines.push(format!("Organization pattern: {}", regex.as_str())),
            Include::Contains(text) => lines.push(format!("Organization contains: {text}")),
        }
        if !self.exclude.is_empty() {
            lines.push(format!("Excluded organizations: {}", self.exclude.join(", ")));
        }
        lines
    }
}

/// Turns CSV rows into records, dropping rows without `id` or `customerId`.
pub fn load_records(rows: Vec<Row>) -> Vec<CustomerRecord> {
    rows.into_iter()
        .enumerate()
        .filter_map(|(i, row)| {
            let record = CustomerRecord::from(row);
            if record.id().is_none() || record.customer_id().is_none() {
                // header is line 1
                warn!("Skipping row {}: missing id or customerId", i + 2);
                None
            } else {
                Some(record)
            }
        })
        .collect()
}

/// Drops records before the one with `customer_id`.
pub fn resume_from(records: Vec<CustomerRecord>, customer_id: &str) -> Result<Vec<CustomerRecord>> {
    let start = records
        .iter()
        .position(|r| r.id() == Some(customer_id))
        .ok_or_else(|| eyre!("customer {customer_id} is not in the selected records"))?;
    if start > 0 {
        info!("Resuming from {customer_id}, skipping {start} customers");
    }
    Ok(records.into_iter().skip(start).collect())
}

pub struct ReportHeader<'a> {
    pub mode: UpdateMode,
    pub input: &'a Path,
    pub filters: Vec<String>,
    pub generated: String,
}

pub fn report_path(dir: &Path, mode: UpdateMode) -> PathBuf {
    let kind = match mode {
        UpdateMode::DryRun => "dry_run",
        UpdateMode::Execute => "execution",
    };
    records::timestamped_path(
        dir,
        &format!("wholesale_customer_external_id_update_{kind}"),
        "txt",
    )
}

fn error_text(result: &UpdateResult) -> Option<String> {
    result.failure.as_ref().map(|f| match f.kind {
        ErrorKind::Validation => f.message.clone(),
        _ => f.to_string(),
    })
}

pub fn render_report(
    header: &ReportHeader,
    results: &[Completed<CustomerRecord, UpdateResult>],
) -> Result<String, fmt::Error> {
    let (title, mode) = match header.mode {
        UpdateMode::DryRun => ("Dry Run", "Dry Run (Preview Only)"),
        UpdateMode::Execute => ("Execution", "Execute Updates"),
    };
    let summary = UpdateSummary::tally(results.iter().map(|c| &c.outcome));
    let mut out = String::new();

    writeln!(out, "Wholesale Customer External ID Update - {title} Report")?;
    writeln!(out, "{}", "=".repeat(80))?;
    writeln!(out, "Generated: {}", header.generated)?;
    writeln!(out, "Input File: {}", header.input.display())?;
    writeln!(out, "Mode: {mode}")?;
    writeln!(out)?;

    if !header.filters.is_empty() {
        writeln!(out, "Filters Applied:")?;
        for line in &header.filters {
            writeln!(out, "- {line}")?;
        }
        writeln!(out)?;
    }

    writeln!(out, "Summary:")?;
    writeln!(out, "- Total customers processed: {}", summary.total())?;
    writeln!(out, "- Successful updates: {}", summary.succeeded)?;
    writeln!(out, "- Failed updates: {}", summary.failed())?;
    writeln!(out, "  - Validation failures: {}", summary.validation_failed)?;
    writeln!(out, "  - Request failures: {}", summary.terminal_failure)?;
    writeln!(out)?;

    writeln!(out, "Detailed Results:")?;
    writeln!(out, "{}", "-".repeat(40))?;
    for (i, done) in results.iter().enumerate() {
        let record = &done.item;
        let result = &done.outcome;
        let mark = if result.is_success() { "✓" } else { "✗" };
        writeln!(
            out,
            "{}. {mark} {} (ID: {})",
            i + 1,
            record.display_name(),
            record.id().unwrap_or("Unknown")
        )?;
        writeln!(
            out,
            "   Current External ID: {}",
            record.external_id().unwrap_or("Unknown")
        )?;
        writeln!(
            out,
            "   New External ID: {}",
            record.customer_id().unwrap_or("Unknown")
        )?;
        if let Some(error) = error_text(result) {
            writeln!(out, "   Error: {error}")?;
        } else if let Some(receipt) = &result.receipt {
            writeln!(
                out,
                "   API Response: {}",
                receipt.status.as_deref().unwrap_or("Success")
            )?;
            if let Some(url) = &receipt.url {
                writeln!(out, "   Status URL: {url}")?;
            }
        }
        writeln!(
            out,
            "   States: {}",
            result.history.iter().map(|s| s.label()).join(" -> ")
        )?;
        writeln!(out)?;
    }

    if summary.failed() > 0 {
        writeln!(out, "Failed Updates Details:")?;
        writeln!(out, "{}", "-".repeat(40))?;
        for done in results.iter().filter(|c| !c.outcome.is_success()) {
            writeln!(
                out,
                "Customer: {} (ID: {})",
                done.item.display_name(),
                done.item.id().unwrap_or("Unknown")
            )?;
            writeln!(out, "Error: {}", error_text(&done.outcome).unwrap_or_default())?;
            if let Some(status) = done.outcome.failure.as_ref().and_then(|f| f.status) {
                writeln!(out, "HTTP Status: {status}")?;
            }
            writeln!(out)?;
        }
    }
    Ok(out)
}

pub struct UpdateRun {
    pub report: PathBuf,
    pub summary: UpdateSummary,
}

pub async fn run(ctx: &Context, args: &UpdateArgs) -> Result<()> {
    let Some(outcome) = update(ctx, args).await? else {
        return Ok(());
    };
    let summary = &outcome.summary;
    println!("Report saved to: {}", outcome.report.display());
    println!("Total customers: {}", summary.total());
    println!("Successful: {}", summary.succeeded);
    println!("Failed: {}", summary.failed());
    if summary.failed() > 0 {
        println!(
            "⚠️  {} customers failed to update. Check the report for details.",
            summary.failed()
        );
    }
    Ok(())
}

/// Runs the batch and writes the report. `None` when no record is selected.
pub async fn update(ctx: &Context, args: &UpdateArgs) -> Result<Option<UpdateRun>> {
    let mode = args.mode();
    match mode {
        UpdateMode::DryRun => info!("Dry run: no API calls will be made"),
        UpdateMode::Execute => {
            let me = ctx.verify_token().await?;
            info!("Token validated for {}", me.label());
        }
    }

    let mut customers = load_records(records::read_rows(&args.input)?);
    info!("Loaded {} customer records from {}", customers.len(), args.input.display());

    let filter = OrgFilter::from_args(args)?;
    if filter.is_active() {
        let before = customers.len();
        customers.retain(|c| filter.accepts(c));
        info!("Organization filtering: {before} → {} customers", customers.len());
    }
    if let Some(id) = &args.resume_from {
        customers = resume_from(customers, id)?;
    }
    if customers.is_empty() {
        warn!("No customers match the input and filters");
        return Ok(None);
    }

    let policy = RetryPolicy {
        request_delay: args.delay,
        ..ctx.executor.policy().clone()
    };
    let executor = Executor::new(ctx.executor.client().clone(), policy);
    let updater = CustomerUpdater::new(&executor, mode);

    info!(
        "Processing {} customers, {} at a time",
        customers.len(),
        args.batch_size
    );
    let batch = ctx
        .runner(args.batch_size)
        .run_all(
            customers,
            |record| async move { updater.process(&record).await },
            |done, progress| {
                let mark = if done.outcome.is_success() { "✓" } else { "✗" };
                info!(
                    "{mark} ({}/{}) {}",
                    progress.completed,
                    progress.total,
                    done.item.display_name()
                );
                if let Some(error) = error_text(&done.outcome) {
                    debug!("   {error}");
                }
            },
        )
        .await;
    let aborted = batch.aborted.clone();
    let results = batch.into_submission_order();

    let header = ReportHeader {
        mode,
        input: &args.input,
        filters: filter.describe(),
        generated: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    };
    let dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| ctx.settings.output_dir.clone());
    let report = report_path(&dir, mode);
    records::ensure_parent(&report)?;
    fs::write(&report, render_report(&header, &results)?)
        .wrap_err_with(|| format!("cannot write report {}", report.display()))?;

    let summary = UpdateSummary::tally(results.iter().map(|c| &c.outcome));
    if let Some(failure) = aborted {
        let not_started = results
            .iter()
            .filter(|c| c.outcome.history == [UpdateState::Pending, UpdateState::TerminalFailure])
            .count();
        error!("{not_started} customers were not started");
        return Err(eyre!(
            "batch stopped early ({failure}); partial report at {}",
            report.display()
        ));
    }
    Ok(Some(UpdateRun { report, summary }))
}
