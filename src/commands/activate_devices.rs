// commands/activate_devices.rs

//! Device activation codes for the people listed in a CSV file.

use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::{eyre, Result};
use log::*;

use super::Context;
use crate::records;
use crate::webex::models::{ActivationCode, ActivationCodeRequest};
use crate::webex::{api, ApiFailure, ErrorKind, Executor, RequestOutcome};

pub const OUTPUT_COLUMNS: [&str; 4] = ["email", "activation_code", "expiry_time", "error"];

#[derive(Args, Debug, Clone)]
pub struct ActivateArgs {
    /// CSV file with an `email` column
    #[arg(short, long, default_value = "people_list.csv")]
    pub input: PathBuf,

    /// CSV file to write the codes to
    #[arg(short, long, default_value = "activation_codes.csv")]
    pub output: PathBuf,

    /// Parallel requests
    #[arg(long, default_value_t = 5)]
    pub concurrency: usize,
}

/// Looks up the person, then asks for a code bound to them.
pub async fn activate(executor: &Executor, email: &str) -> RequestOutcome<ActivationCode> {
    let person = api::person_by_email(executor, email).await?;
    let person_id = person.id.ok_or_else(|| {
        ApiFailure::new(
            ErrorKind::NotFound,
            format!("Missing personId for email: {email}"),
            None,
        )
    })?;
    let body = ActivationCodeRequest {
        person_id: Some(person_id),
        ..Default::default()
    };
    api::activation_code(executor, &body, None).await
}

pub async fn run(ctx: &Context, args: &ActivateArgs) -> Result<()> {
    let emails: Vec<String> = records::read_rows(&args.input)?
        .into_iter()
        .filter_map(|row| row.get("email").map(|e| e.trim().to_string()))
        .filter(|e| !e.is_empty())
        .collect();
    if emails.is_empty() {
        return Err(eyre!("no emails in {}", args.input.display()));
    }
    ctx.verify_token().await?;

    let executor = &ctx.executor;
    let batch = ctx
        .runner(args.concurrency)
        .run_all(
            emails,
            |email| async move { activate(executor, &email).await },
            |done, progress| match &done.outcome {
                Ok(code) => info!(
                    "({}/{}) {}: {}",
                    progress.completed,
                    progress.total,
                    done.item,
                    code.code.as_deref().unwrap_or_default()
                ),
                Err(failure) => warn!(
                    "({}/{}) {}: {failure}",
                    progress.completed, progress.total, done.item
                ),
            },
        )
        .await;

    let failed = batch.failures().count();
    let aborted = batch.aborted.clone();
    let rows = batch.into_submission_order().into_iter().map(|done| match done.outcome {
        Ok(code) => vec![
            done.item,
            code.code.unwrap_or_default(),
            code.expiry_time.unwrap_or_default(),
            String::new(),
        ],
        Err(failure) => vec![done.item, String::new(), String::new(), failure.to_string()],
    });
    records::write_rows(&args.output, &OUTPUT_COLUMNS, rows)?;
    println!("Activation codes written to {}", args.output.display());
    if failed > 0 {
        println!("{failed} emails failed, see the error column");
    }
    match aborted {
        Some(failure) => Err(eyre!("activation stopped: {failure}")),
        None => Ok(()),
    }
}
