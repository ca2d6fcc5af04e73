// commands/user_lookup.rs

//! Lists the users of an organization, found by name or by one member's email.

use clap::{ArgGroup, Args};
use color_eyre::eyre::{eyre, Result};

use super::Context;
use crate::webex::api;
use crate::webex::models::{Organization, Person};
use crate::webex::paginate::DEFAULT_PAGE_SIZE;

#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("lookup").required(true).multiple(true).args(["org_name", "email"])))]
pub struct UserLookupArgs {
    /// Organization display name, case insensitive
    #[arg(long)]
    pub org_name: Option<String>,

    /// Email of any user of the organization
    #[arg(long)]
    pub email: Option<String>,
}

async fn users_of(ctx: &Context, org_id: &str) -> Result<Vec<Person>> {
    api::people_in_org(&ctx.executor, org_id, DEFAULT_PAGE_SIZE)
        .collect_all()
        .await
        .map_err(|failure| eyre!("cannot list users of {org_id}: {failure}"))
}

pub async fn by_org_name(ctx: &Context, name: &str) -> Result<(Organization, Vec<Person>)> {
    let org = api::organization_by_name(&ctx.executor, name)
        .await
        .map_err(|failure| eyre!("{failure}"))?;
    let users = users_of(ctx, &org.id).await?;
    Ok((org, users))
}

/// Users sharing an organization with `email`, that user included.
pub async fn by_email(ctx: &Context, email: &str) -> Result<Vec<Person>> {
    let person = api::person_by_email(&ctx.executor, email)
        .await
        .map_err(|failure| eyre!("{failure}"))?;
    let org_id = person
        .org_id
        .ok_or_else(|| eyre!("no organization recorded for {email}"))?;
    users_of(ctx, &org_id).await
}

fn print_users(users: &[Person]) {
    for user in users {
        println!("- {}", user.label());
    }
}

pub async fn run(ctx: &Context, args: &UserLookupArgs) -> Result<()> {
    if let Some(name) = &args.org_name {
        let (org, users) = by_org_name(ctx, name).await?;
        if users.is_empty() {
            println!("No users found for organization '{}'.", org.display_name);
        } else {
            println!("Users in organization '{}':", org.display_name);
            print_users(&users);
        }
    }
    if let Some(email) = &args.email {
        let users = by_email(ctx, email).await?;
        if users.is_empty() {
            println!("No users found for email '{email}'.");
        } else {
            println!("Users in the same organization as '{email}':");
            print_users(&users);
        }
    }
    Ok(())
}
