// commands/rename_workspaces.rs

//! Renames workspaces found by their current display name.

use std::path::PathBuf;

use clap::{ArgGroup, Args};
use color_eyre::eyre::{eyre, Result};
use log::*;

use super::Context;
use crate::records;
use crate::webex::api;

#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("source").required(true).args(["input", "from"])))]
pub struct RenameArgs {
    /// Headerless CSV of `current name,new name` lines
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Current name of a single workspace
    #[arg(long, requires = "to")]
    pub from: Option<String>,

    /// New name for `--from`
    #[arg(long, requires = "from")]
    pub to: Option<String>,

    /// Parallel renames
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,
}

impl RenameArgs {
    fn renames(&self) -> Result<Vec<(String, String)>> {
        let mut renames = match &self.input {
            Some(path) => records::read_pairs(path)?,
            None => Vec::new(),
        };
        if let (Some(from), Some(to)) = (&self.from, &self.to) {
            renames.push((from.clone(), to.clone()));
        }
        Ok(renames)
    }
}

pub struct RenameSummary {
    pub renamed: usize,
    pub failed: usize,
}

pub async fn rename_all(ctx: &Context, args: &RenameArgs) -> Result<RenameSummary> {
    let renames = args.renames()?;
    if renames.is_empty() {
        return Err(eyre!("no workspaces to rename"));
    }
    ctx.verify_token().await?;

    let executor = &ctx.executor;
    let batch = ctx
        .runner(args.concurrency)
        .run_all(
            renames,
            |(old, new)| async move { api::rename_workspace(executor, &old, &new).await },
            |done, _| {
                let (old, new) = &done.item;
                match &done.outcome {
                    Ok(_) => println!("Successfully renamed workspace from {old} to {new}"),
                    Err(failure) => println!("Failed to rename workspace {old}: {failure}"),
                }
            },
        )
        .await;

    if let Some(failure) = &batch.aborted {
        return Err(eyre!("renaming stopped: {failure}"));
    }
    let failed = batch.failures().count();
    let summary = RenameSummary {
        renamed: batch.len() - failed,
        failed,
    };
    info!("Renamed {} workspaces, {} failed", summary.renamed, summary.failed);
    Ok(summary)
}

pub async fn run(ctx: &Context, args: &RenameArgs) -> Result<()> {
    let summary = rename_all(ctx, args).await?;
    if summary.failed > 0 {
        return Err(eyre!("{} of {} renames failed", summary.failed, summary.renamed + summary.failed));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::context_for;
    use serde_json::json;
    use std::fs;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn should_rename_found_workspaces_and_count_missing_ones() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/people/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "admin"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/workspaces"))
            .and(query_param("displayName", "Room 1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [{"id": "ws-1"}]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/workspaces"))
            .and(query_param("displayName", "Ghost"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/workspaces/ws-1"))
            .and(body_json(json!({"displayName": "Board Room"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "ws-1"})))
            .expect(2)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("workspaces.csv");
        fs::write(&input, "Room 1,Board Room\nGhost,Still Ghost\n").unwrap();
        let args = RenameArgs {
            input: Some(input),
            from: None,
            to: None,
            concurrency: 1,
        };
        let ctx = context_for(&server, dir.path());

        let summary = rename_all(&ctx, &args).await.unwrap();
        assert_eq!(summary.renamed, 1);
        assert_eq!(summary.failed, 1);
        assert!(run(&ctx, &args).await.is_err());
    }
}
