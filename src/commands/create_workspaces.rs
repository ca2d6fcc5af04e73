// commands/create_workspaces.rs

//! Creates workspaces from a CSV file and an activation code for each.

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use color_eyre::eyre::{eyre, Result};
use log::*;
use serde_json::{json, Value};

use super::Context;
use crate::batch::ItemOutcome;
use crate::records::{self, Row};
use crate::webex::models::{ActivationCode, ActivationCodeRequest, WorkspaceRequest};
use crate::webex::{api, ApiFailure, Executor};

pub const OUTPUT_COLUMNS: [&str; 5] = [
    "displayName",
    "workspaceId",
    "activationCode",
    "expiryTime",
    "error",
];

/// Defaults for the columns a row leaves empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum WorkspaceKind {
    /// Shared desk with hot desking, one seat, no device hosted meetings
    #[default]
    Flex,
    /// Meeting room for ten, type `meetingRoom`
    Meeting,
}

impl WorkspaceKind {
    fn capacity(self) -> u32 {
        match self {
            WorkspaceKind::Flex => 1,
            WorkspaceKind::Meeting => 10,
        }
    }

    fn workspace_type(self) -> &'static str {
        match self {
            WorkspaceKind::Flex => "desk",
            WorkspaceKind::Meeting => "meetingRoom",
        }
    }

    fn device_hosted_meetings(self) -> Option<Value> {
        match self {
            WorkspaceKind::Flex => Some(json!({"enabled": false})),
            WorkspaceKind::Meeting => None,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CreateWorkspacesArgs {
    /// CSV with displayName,orgId,LocationID and optional type,capacity,
    /// calling,calendar,hotdeskingStatus,deviceHostedMeetings
    #[arg(short, long, default_value = "deviceinput.csv")]
    pub input: PathBuf,

    /// CSV file to write the results to
    #[arg(short, long, default_value = "output.csv")]
    pub output: PathBuf,

    /// Defaults for columns left empty
    #[arg(long, value_enum, default_value_t)]
    pub kind: WorkspaceKind,

    /// Parallel workspaces
    #[arg(long, default_value_t = 5)]
    pub concurrency: usize,
}

fn column<'r>(row: &'r Row, name: &str) -> &'r str {
    row.get(name).map(|v| v.trim()).unwrap_or_default()
}

/// First non-empty value among alternative column names.
fn any_column<'r>(row: &'r Row, names: &[&str]) -> &'r str {
    names
        .iter()
        .map(|name| column(row, name))
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}

/// Parses an optional JSON cell such as `{"type": "none"}`.
fn json_cell(row: &Row, name: &str) -> Result<Option<Value>, ApiFailure> {
    let raw = column(row, name);
    if raw.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|e| ApiFailure::validation(format!("invalid JSON in column {name}: {e}")))
}

/// The create request for one row. Hot desking excludes a calendar.
pub fn workspace_request(row: &Row, kind: WorkspaceKind) -> Result<WorkspaceRequest, ApiFailure> {
    let display_name = column(row, "displayName");
    let org_id = column(row, "orgId");
    if display_name.is_empty() || org_id.is_empty() {
        return Err(ApiFailure::validation("displayName and orgId are required"));
    }
    let capacity = match column(row, "capacity") {
        "" => kind.capacity(),
        raw => raw
            .parse()
            .map_err(|_| ApiFailure::validation(format!("capacity must be a whole number, got {raw}")))?,
    };
    let workspace_type = match column(row, "type") {
        "" => kind.workspace_type(),
        given => given,
    };
    let hotdesking_status = match column(row, "hotdeskingStatus") {
        "" => "off",
        given => given,
    }
    .to_string();
    let mut calendar = json_cell(row, "calendar")?;
    if hotdesking_status == "on" && calendar.as_ref().and_then(|c| c.get("type")) != Some(&json!("none")) {
        debug!("Disabling calendar for '{display_name}' since hot desking is on");
        calendar = Some(json!({"type": "none"}));
    }
    Ok(WorkspaceRequest {
        display_name: display_name.to_string(),
        org_id: org_id.to_string(),
        workspace_location_id: any_column(row, &["LocationID", "workspaceLocationId"]).to_string(),
        workspace_type: workspace_type.to_string(),
        capacity,
        calling: json_cell(row, "calling")?,
        calendar,
        hotdesking_status,
        device_hosted_meetings: json_cell(row, "deviceHostedMeetings")?
            .or_else(|| kind.device_hosted_meetings()),
    })
}

/// What happened to one row. A workspace can exist even if its code failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkspaceOutcome {
    pub workspace_id: Option<String>,
    pub code: Option<ActivationCode>,
    pub failure: Option<ApiFailure>,
}

impl WorkspaceOutcome {
    /// The row was attempted and failed before a workspace existed.
    pub fn failed(failure: ApiFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Default::default()
        }
    }
}

impl ItemOutcome for WorkspaceOutcome {
    fn batch_fatal(&self) -> Option<&ApiFailure> {
        self.failure.as_ref().filter(|f| f.kind.is_batch_fatal())
    }

    fn not_started(reason: ApiFailure) -> Self {
        Self::failed(reason)
    }
}

pub async fn provision(executor: &Executor, row: &Row, kind: WorkspaceKind) -> WorkspaceOutcome {
    let request = match workspace_request(row, kind) {
        Ok(request) => request,
        Err(failure) => return WorkspaceOutcome::failed(failure),
    };
    let workspace = match api::create_workspace(executor, &request).await {
        Ok(workspace) => workspace,
        Err(failure) => return WorkspaceOutcome::failed(failure),
    };
    info!(
        "Workspace '{}' created with ID {}",
        request.display_name,
        workspace.id.as_deref().unwrap_or_default()
    );
    let mut outcome = WorkspaceOutcome {
        workspace_id: workspace.id.clone(),
        ..Default::default()
    };

    let body = ActivationCodeRequest {
        workspace_id: workspace.id,
        ..Default::default()
    };
    match api::activation_code(executor, &body, Some(&request.org_id)).await {
        Ok(code) => outcome.code = Some(code),
        Err(failure) => outcome.failure = Some(failure),
    }
    outcome
}

pub async fn run(ctx: &Context, args: &CreateWorkspacesArgs) -> Result<()> {
    let rows = records::read_rows(&args.input)?;
    if rows.is_empty() {
        return Err(eyre!("no rows in {}", args.input.display()));
    }
    ctx.verify_token().await?;

    let executor = &ctx.executor;
    let kind = args.kind;
    let batch = ctx
        .runner(args.concurrency)
        .run_all(
            rows,
            |row| async move { provision(executor, &row, kind).await },
            |done, progress| {
                let name = column(&done.item, "displayName");
                match &done.outcome.failure {
                    None => info!("({}/{}) '{name}' ready", progress.completed, progress.total),
                    Some(failure) => warn!(
                        "({}/{}) '{name}': {failure}",
                        progress.completed, progress.total
                    ),
                }
            },
        )
        .await;

    let aborted = batch.aborted.clone();
    let done = batch.into_submission_order();
    let failed = done.iter().filter(|d| d.outcome.failure.is_some()).count();
    let rows = done.into_iter().map(|d| {
        let code = d.outcome.code.unwrap_or_default();
        vec![
            column(&d.item, "displayName").to_string(),
            d.outcome.workspace_id.unwrap_or_default(),
            code.code.unwrap_or_default(),
            code.expiry_time.unwrap_or_default(),
            d.outcome.failure.map(|f| f.to_string()).unwrap_or_default(),
        ]
    });
    records::write_rows(&args.output, &OUTPUT_COLUMNS, rows)?;
    println!("Results written to {}", args.output.display());
    if failed > 0 {
        println!("{failed} workspaces failed, see the error column");
    }
    match aborted {
        Some(failure) => Err(eyre!("workspace creation stopped: {failure}")),
        None => Ok(()),
    }
}
