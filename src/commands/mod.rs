// commands/mod.rs

//! Command line surface. Each subcommand lives in its own module and runs
//! against a shared [`Context`].

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use log::*;

use crate::batch::{CancelToken, FanOutRunner};
use crate::config::{self, Settings};
use crate::webex::models::Person;
use crate::webex::{api, ErrorKind, Executor, WebexClient};

pub mod activate_devices;
pub mod check_status;
pub mod create_workspaces;
pub mod delete_users;
pub mod devices;
pub mod export_customers;
pub mod number_lookup;
pub mod rename_workspaces;
pub mod update_external_ids;
pub mod user_lookup;
pub mod whoami;

/// Webex administration tools.
#[derive(Parser, Debug)]
#[command(name = "webex-tools", version, about, long_about = None)]
pub struct Cli {
    /// Settings file (default: ~/.config/webex-tools/config.yml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// API base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Retries for rate limited or failing requests
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show who the access token belongs to
    Whoami,
    /// Export wholesale customers with their organization names to CSV
    ExportCustomers(export_customers::ExportArgs),
    /// Set each wholesale customer's external ID to its customer ID
    UpdateExternalIds(update_external_ids::UpdateArgs),
    /// Check asynchronous operation status links
    CheckStatus(check_status::CheckStatusArgs),
    /// Create activation codes for users listed in a CSV file
    ActivateDevices(activate_devices::ActivateArgs),
    /// Create workspaces and their activation codes from a CSV file
    CreateWorkspaces(create_workspaces::CreateWorkspacesArgs),
    /// Delete users by email, id or display name
    DeleteUsers(delete_users::DeleteUsersArgs),
    /// Find which organization owns a phone number or extension
    NumberLookup(number_lookup::NumberLookupArgs),
    /// List or activate devices
    Devices {
        #[command(subcommand)]
        command: devices::DevicesCommand,
    },
    /// Rename workspaces by their current display name
    RenameWorkspaces(rename_workspaces::RenameArgs),
    /// List the users of an organization
    UserLookup(user_lookup::UserLookupArgs),
}

impl Cli {
    /// Settings file values with command line overrides applied.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::load(self.config.as_deref())?;
        if let Some(base_url) = &self.base_url {
            settings.base_url = base_url.clone();
        }
        if let Some(max_retries) = self.max_retries {
            settings.max_retries = max_retries;
        }
        Ok(settings)
    }
}

/// What every command runs against.
#[derive(Debug, Clone)]
pub struct Context {
    pub settings: Settings,
    pub executor: Executor,
    pub cancel: CancelToken,
}

impl Context {
    pub fn new(settings: Settings, token: &str) -> Result<Self> {
        let client = WebexClient::new(&settings.base_url, token)?;
        let executor = Executor::new(client, settings.retry_policy());
        Ok(Self {
            settings,
            executor,
            cancel: CancelToken::new(),
        })
    }

    /// A runner bound to this context's cancel token.
    pub fn runner(&self, concurrency: usize) -> FanOutRunner {
        FanOutRunner::new(concurrency).with_cancel(self.cancel.clone())
    }

    /// Checks the token before any batch work.
    pub async fn verify_token(&self) -> Result<Person> {
        match api::me(&self.executor).await {
            Ok(person) => {
                debug!("Token belongs to {}", person.label());
                Ok(person)
            }
            Err(failure) if failure.kind == ErrorKind::Authentication => Err(eyre!(
                "access token rejected ({failure}); check WEBEX_ACCESS_TOKEN and its scopes"
            )),
            Err(failure) => Err(eyre!("cannot validate access token: {failure}")),
        }
    }
}

/// `--delay` in seconds. Negative, non-finite or absurdly long pauses are refused.
pub fn parse_delay(raw: &str) -> Result<Duration, String> {
    let seconds: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{raw}' is not a number of seconds"))?;
    if seconds.is_sign_negative() {
        return Err(format!("delay cannot be negative, got {raw}"));
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("invalid delay {raw}: {e}"))
}

pub async fn run(cli: Cli) -> Result<()> {
    let settings = cli.settings()?;
    let token = config::access_token()?;
    let ctx = Context::new(settings, &token)?;

    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing requests in flight");
            cancel.cancel();
        }
    });

    match &cli.command {
        Command::Whoami => whoami::run(&ctx).await,
        Command::ExportCustomers(args) => export_customers::run(&ctx, args).await,
        Command::UpdateExternalIds(args) => update_external_ids::run(&ctx, args).await,
        Command::CheckStatus(args) => check_status::run(&ctx, args).await,
        Command::ActivateDevices(args) => activate_devices::run(&ctx, args).await,
        Command::CreateWorkspaces(args) => create_workspaces::run(&ctx, args).await,
        Command::DeleteUsers(args) => delete_users::run(&ctx, args).await,
        Command::NumberLookup(args) => number_lookup::run(&ctx, args).await,
        Command::Devices { command } => devices::run(&ctx, command).await,
        Command::RenameWorkspaces(args) => rename_workspaces::run(&ctx, args).await,
        Command::UserLookup(args) => user_lookup::run(&ctx, args).await,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn should_override_settings_from_flags() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.yml");
        std::fs::write(&config, "base_url: http://file\nmax_retries: 5\n").unwrap();
        let cli = Cli::parse_from([
            "webex-tools",
            "--config",
            config.to_str().unwrap(),
            "--max-retries",
            "1",
            "whoami",
        ]);
        let settings = cli.settings().unwrap();
        assert_eq!(settings.base_url, "http://file");
        assert_eq!(settings.max_retries, 1);
    }

    #[rstest]
    #[case("0.2", Some(Duration::from_millis(200)))]
    #[case("0", Some(Duration::ZERO))]
    #[case("3", Some(Duration::from_secs(3)))]
    #[case("-1", None)]
    #[case("inf", None)]
    #[case("NaN", None)]
    #[case("1e300", None)]
    #[case("soon", None)]
    fn should_parse_delay(#[case] raw: &str, #[case] expected: Option<Duration>) {
        assert_eq!(parse_delay(raw).ok(), expected);
    }

    #[test]
    fn should_refuse_infinite_delay_on_the_command_line() {
        let err = Cli::try_parse_from(["webex-tools", "delete-users", "--emails", "a@x.com", "--delay", "inf"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        let cli = Cli::try_parse_from(["webex-tools", "delete-users", "--emails", "a@x.com"]).unwrap();
        match cli.command {
            Command::DeleteUsers(args) => assert_eq!(args.delay, Duration::from_millis(500)),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[tokio::test]
    async fn should_reject_invalid_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/people/me"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid token"})))
            .expect(1)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_support::context_for(&server, dir.path());

        let err = ctx.verify_token().await.unwrap_err();
        assert!(err.to_string().contains("access token rejected"));
    }
}
