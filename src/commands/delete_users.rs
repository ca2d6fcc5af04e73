// commands/delete_users.rs

//! Deletes users identified by email, id or display name.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Local;
use clap::{ArgGroup, Args};
use color_eyre::eyre::{eyre, Result, WrapErr};
use log::*;

use super::Context;
use crate::batch::SingleFlight;
use crate::records::{self, Row};
use crate::webex::models::{OrganizationDetails, Person};
use crate::webex::{api, ApiFailure, ErrorKind, Executor, RequestOutcome, RetryPolicy};

#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("users").required(true).multiple(true).args(["csv_file", "emails", "user_ids", "display_names"])))]
#[command(group(ArgGroup::new("org").args(["org_id", "org_name"])))]
pub struct DeleteUsersArgs {
    /// CSV with an email, user_id or display_name column
    #[arg(long)]
    pub csv_file: Option<PathBuf>,

    /// Comma separated email addresses
    #[arg(long)]
    pub emails: Option<String>,

    /// Comma separated user IDs
    #[arg(long)]
    pub user_ids: Option<String>,

    /// Comma separated display names
    #[arg(long)]
    pub display_names: Option<String>,

    /// Only delete users of this organization ID
    #[arg(long)]
    pub org_id: Option<String>,

    /// Only delete users whose organization name contains this text
    #[arg(long)]
    pub org_name: Option<String>,

    /// Show what would be deleted
    #[arg(long)]
    pub dry_run: bool,

    /// Seconds to wait after each request
    #[arg(long, default_value = "0.5", value_parser = super::parse_delay)]
    pub delay: Duration,

    /// Parallel users
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    /// Log file (default: timestamped file in the output directory)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// How a user was named on input. Lookups try email, then id, then name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRef {
    pub email: Option<String>,
    pub user_id: Option<String>,
    pub display_name: Option<String>,
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = [
            ("email", &self.email),
            ("user_id", &self.user_id),
            ("display_name", &self.display_name),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| format!("{k}={v}")))
        .collect();
        f.write_str(&parts.join(", "))
    }
}

impl UserRef {
    fn is_empty(&self) -> bool {
        self.email.is_none() && self.user_id.is_none() && self.display_name.is_none()
    }
}

fn column_kind(header: &str) -> Option<&'static str> {
    match header.trim().to_lowercase().as_str() {
        "email" | "user_email" | "email_address" => Some("email"),
        "user_id" | "userid" | "id" | "user id" => Some("user_id"),
        "display_name" | "displayname" | "name" | "full_name" | "display name" => {
            Some("display_name")
        }
        _ => None,
    }
}

/// Users named in CSV rows. Header names are matched loosely.
pub fn refs_from_rows(rows: &[Row]) -> Vec<UserRef> {
    rows.iter()
        .filter_map(|row| {
            let mut user = UserRef::default();
            for (header, value) in row {
                let value = value.trim();
                if value.is_empty() {
                    continue;
                }
                let slot = match column_kind(header) {
                    Some("email") => &mut user.email,
                    Some("user_id") => &mut user.user_id,
                    Some("display_name") => &mut user.display_name,
                    _ => continue,
                };
                *slot = Some(value.to_string());
            }
            (!user.is_empty()).then_some(user)
        })
        .collect()
}

pub fn refs_from_args(args: &DeleteUsersArgs) -> Vec<UserRef> {
    let list = |raw: &Option<String>| raw.as_deref().map(records::parse_list).unwrap_or_default();
    let emails = list(&args.emails).into_iter().map(|e| UserRef {
        email: Some(e),
        ..Default::default()
    });
    let ids = list(&args.user_ids).into_iter().map(|id| UserRef {
        user_id: Some(id),
        ..Default::default()
    });
    let names = list(&args.display_names).into_iter().map(|n| UserRef {
        display_name: Some(n),
        ..Default::default()
    });
    emails.chain(ids).chain(names).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrgScope {
    Id(String),
    NameContains(String),
}

impl OrgScope {
    pub fn from_args(args: &DeleteUsersArgs) -> Option<Self> {
        args.org_id
            .clone()
            .map(OrgScope::Id)
            .or_else(|| args.org_name.as_ref().map(|n| OrgScope::NameContains(n.to_lowercase())))
    }

    fn admits(&self, org_id: &str, details: Option<&OrganizationDetails>) -> bool {
        match self {
            OrgScope::Id(id) => id == org_id,
            OrgScope::NameContains(text) => details
                .and_then(|d| d.display_name.as_deref())
                .is_some_and(|name| name.to_lowercase().contains(text)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Deletion {
    NotFound,
    OutsideOrg(Person),
    WouldDelete(Person),
    Deleted(Person),
}

impl Deletion {
    pub fn message(&self, user: &UserRef) -> String {
        match self {
            Deletion::NotFound => format!("User not found: {user}"),
            Deletion::OutsideOrg(p) => format!("Skipped {}: not in the selected organization", p.label()),
            Deletion::WouldDelete(p) => format!("[DRY RUN] Would delete user: {}", p.label()),
            Deletion::Deleted(p) => format!("Successfully deleted user: {}", p.label()),
        }
    }
}

fn found(lookup: RequestOutcome<Person>) -> RequestOutcome<Option<Person>> {
    match lookup {
        Ok(person) => Ok(Some(person)),
        Err(failure) if failure.kind == ErrorKind::NotFound => Ok(None),
        Err(failure) => Err(failure),
    }
}

/// First hit in lookup order. Only a missing user moves on to the next key.
pub async fn find_user(executor: &Executor, user: &UserRef) -> RequestOutcome<Option<Person>> {
    if let Some(email) = &user.email {
        if let Some(person) = found(api::person_by_email(executor, email).await)? {
            return Ok(Some(person));
        }
    }
    if let Some(id) = &user.user_id {
        if let Some(person) = found(api::person(executor, id).await)? {
            return Ok(Some(person));
        }
    }
    match &user.display_name {
        Some(name) => found(api::person_by_display_name(executor, name).await),
        None => Ok(None),
    }
}

pub struct Deleter<'a> {
    pub executor: &'a Executor,
    pub scope: Option<OrgScope>,
    pub dry_run: bool,
    pub orgs: SingleFlight<String, RequestOutcome<OrganizationDetails>>,
}

impl Deleter<'_> {
    pub async fn process(&self, user: &UserRef) -> RequestOutcome<Deletion> {
        let Some(person) = find_user(self.executor, user).await? else {
            return Ok(Deletion::NotFound);
        };
        if let Some(scope) = &self.scope {
            let org_id = person.org_id.clone().unwrap_or_default();
            let details = match scope {
                OrgScope::Id(_) => None,
                OrgScope::NameContains(_) if org_id.is_empty() => None,
                OrgScope::NameContains(_) => {
                    let executor = self.executor;
                    let key = org_id.clone();
                    match self
                        .orgs
                        .get_or_fetch(key.clone(), || async move { api::organization(executor, &key).await })
                        .await
                    {
                        Ok(details) => Some(details),
                        Err(failure) => {
                            warn!("Cannot verify organization {org_id}: {failure}");
                            None
                        }
                    }
                }
            };
            if !scope.admits(&org_id, details.as_ref()) {
                return Ok(Deletion::OutsideOrg(person));
            }
        }
        if self.dry_run {
            return Ok(Deletion::WouldDelete(person));
        }
        let Some(id) = person.id.clone() else {
            return Err(ApiFailure::validation(format!(
                "Cannot delete user {}: no user ID available",
                person.label()
            )));
        };
        api::delete_person(self.executor, &id).await?;
        Ok(Deletion::Deleted(person))
    }
}

pub async fn run(ctx: &Context, args: &DeleteUsersArgs) -> Result<()> {
    let me = ctx.verify_token().await?;
    println!("✓ Authenticated as: {}", me.label());

    let mut users = match &args.csv_file {
        Some(path) => refs_from_rows(&records::read_rows(path)?),
        None => Vec::new(),
    };
    users.extend(refs_from_args(args));
    if users.is_empty() {
        return Err(eyre!("no users to process"));
    }
    info!("Found {} user(s) to process", users.len());

    let policy = RetryPolicy {
        request_delay: args.delay,
        ..ctx.executor.policy().clone()
    };
    let executor = Executor::new(ctx.executor.client().clone(), policy);
    let deleter = Deleter {
        executor: &executor,
        scope: OrgScope::from_args(args),
        dry_run: args.dry_run,
        orgs: SingleFlight::new(),
    };
    let deleter = &deleter;

    let mut log = vec![format!(
        "Starting user deletion in {} mode",
        if args.dry_run { "DRY RUN" } else { "EXECUTION" }
    )];
    let batch = ctx
        .runner(args.concurrency)
        .run_all(
            users,
            |user| async move { deleter.process(&user).await },
            |done, progress| {
                let (mark, message) = match &done.outcome {
                    Ok(deletion) => ("✓", deletion.message(&done.item)),
                    Err(failure) => ("✗", format!("Failed for {}: {failure}", done.item)),
                };
                info!("({}/{}) {mark} {message}", progress.completed, progress.total);
            },
        )
        .await;

    let mut failed = 0;
    let mut deleted = 0;
    for done in batch.into_submission_order() {
        let message = match &done.outcome {
            Ok(deletion) => {
                if matches!(deletion, Deletion::Deleted(_) | Deletion::WouldDelete(_)) {
                    deleted += 1;
                }
                deletion.message(&done.item)
            }
            Err(failure) => {
                failed += 1;
                format!("Failed for {}: {failure}", done.item)
            }
        };
        log.push(message);
    }
    log.push(format!(
        "Operation completed - Successful: {deleted}, Failed: {failed}"
    ));

    let path = args.log_file.clone().unwrap_or_else(|| {
        let mode = if args.dry_run { "dry_run" } else { "execution" };
        records::timestamped_path(&ctx.settings.output_dir, &format!("user_deletion_{mode}"), "txt")
    });
    records::ensure_parent(&path)?;
    let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    let text: String = log.iter().map(|line| format!("[{stamp}] {line}\n")).collect();
    fs::write(&path, text).wrap_err_with(|| format!("cannot write log {}", path.display()))?;

    println!("- Successful: {deleted}");
    println!("- Failed: {failed}");
    println!("- Log file: {}", path.display());
    if failed > 0 {
        return Err(eyre!("{failed} user(s) could not be processed"));
    }
    Ok(())
}
