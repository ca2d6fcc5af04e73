// commands/devices.rs

//! Device inventory and activation by code.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Result};
use log::*;

use super::Context;
use crate::records::{self, Row};
use crate::webex::models::{Device, DeviceActivation};
use crate::webex::paginate::DEFAULT_PAGE_SIZE;
use crate::webex::{api, ApiFailure, Executor, RequestOutcome};

#[derive(Subcommand, Debug, Clone)]
pub enum DevicesCommand {
    /// List devices, optionally filtered
    List(ListArgs),
    /// Activate one device with its activation code
    Activate(ActivateArgs),
    /// Activate the devices listed in a CSV file
    ActivateBatch(ActivateBatchArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeviceType {
    RoomDesk,
    Phone,
    Accessory,
    WebexGo,
    Unknown,
}

impl DeviceType {
    /// The value the `type` query parameter expects.
    fn api_name(self) -> &'static str {
        match self {
            DeviceType::RoomDesk => "roomdesk",
            DeviceType::Phone => "phone",
            DeviceType::Accessory => "accessory",
            DeviceType::WebexGo => "webexgo",
            DeviceType::Unknown => "unknown",
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Display name, partial matches included
    #[arg(long)]
    pub display_name: Option<String>,

    /// Device type
    #[arg(long = "type", value_enum)]
    pub device_type: Option<DeviceType>,

    /// Workspace (place) the device belongs to
    #[arg(long)]
    pub place_id: Option<String>,

    /// Tag the device carries
    #[arg(long)]
    pub tag: Option<String>,

    /// Devices per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub limit: usize,

    /// Also write every field of the listed devices to this CSV file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ListArgs {
    /// Query parameters for the filters that are set.
    pub fn filters(&self) -> Vec<(String, String)> {
        [
            ("displayName", self.display_name.clone()),
            ("type", self.device_type.map(|t| t.api_name().to_string())),
            ("placeId", self.place_id.clone()),
            ("tag", self.tag.clone()),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key.to_string(), v)))
        .collect()
    }
}

#[derive(Args, Debug, Clone)]
pub struct ActivateArgs {
    pub activation_code: String,
    pub display_name: String,

    /// Workspace (place) the device goes into
    #[arg(long)]
    pub place_id: Option<String>,

    /// Comma separated tags
    #[arg(long)]
    pub tags: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ActivateBatchArgs {
    /// CSV with activation_code,display_name and optional place_id,tags
    pub csv_file: PathBuf,

    /// Parallel activations
    #[arg(long, default_value_t = 5)]
    pub concurrency: usize,
}

/// The activation for one CSV row. Both the code and the name are required.
pub fn activation_from_row(row: &Row) -> Result<DeviceActivation, ApiFailure> {
    let cell = |name: &str| row.get(name).map(|v| v.trim()).unwrap_or_default();
    let (code, name) = (cell("activation_code"), cell("display_name"));
    if code.is_empty() || name.is_empty() {
        return Err(ApiFailure::validation("activation_code and display_name are required"));
    }
    Ok(DeviceActivation {
        activation_code: code.to_string(),
        display_name: name.to_string(),
        place_id: Some(cell("place_id")).filter(|p| !p.is_empty()).map(str::to_string),
        tags: records::parse_list(cell("tags")),
    })
}

fn table_row(device: &Device) -> String {
    let field = |v: &Option<String>| v.clone().unwrap_or_default();
    format!(
        "{:<30} {:<10} {:<28} {:<14} {}",
        field(&device.display_name),
        field(&device.device_type),
        field(&device.product),
        field(&device.connection_status),
        field(&device.id)
    )
}

pub async fn list(ctx: &Context, args: &ListArgs) -> Result<Vec<Device>> {
    let filters = args.filters();
    debug!("Listing devices with {filters:?}");
    api::devices(&ctx.executor, filters, args.limit)
        .collect_all()
        .await
        .map_err(|failure| eyre!("cannot list devices: {failure}"))
}

async fn activate_one(executor: &Executor, activation: DeviceActivation) -> RequestOutcome<Device> {
    api::activate_device(executor, &activation).await
}

pub async fn run(ctx: &Context, command: &DevicesCommand) -> Result<()> {
    match command {
        DevicesCommand::List(args) => {
            let devices = list(ctx, args).await?;
            if devices.is_empty() {
                println!("No devices found matching the criteria.");
                return Ok(());
            }
            println!("Webex Devices ({})", devices.len());
            println!(
                "{:<30} {:<10} {:<28} {:<14} ID",
                "Display Name", "Type", "Product", "Status"
            );
            for device in &devices {
                println!("{}", table_row(device));
            }
            if let Some(output) = &args.output {
                let rows = devices
                    .iter()
                    .map(|d| serde_json::to_value(d).map(|v| records::flatten_json(&v)))
                    .collect::<serde_json::Result<Vec<_>>>()?;
                records::write_maps(output, &rows)?;
                println!("Devices written to {}", output.display());
            }
            Ok(())
        }
        DevicesCommand::Activate(args) => {
            let activation = DeviceActivation {
                activation_code: args.activation_code.trim().to_string(),
                display_name: args.display_name.clone(),
                place_id: args.place_id.clone(),
                tags: args.tags.as_deref().map(records::parse_list).unwrap_or_default(),
            };
            let device = activate_one(&ctx.executor, activation)
                .await
                .map_err(|failure| eyre!("cannot activate device: {failure}"))?;
            println!(
                "Device '{}' activated successfully! ID: {}",
                args.display_name,
                device.id.as_deref().unwrap_or("N/A")
            );
            Ok(())
        }
        DevicesCommand::ActivateBatch(args) => activate_batch(ctx, args).await,
    }
}

pub async fn activate_batch(ctx: &Context, args: &ActivateBatchArgs) -> Result<()> {
    let rows = records::read_rows(&args.csv_file)?;
    if rows.is_empty() {
        return Err(eyre!("no devices in {}", args.csv_file.display()));
    }
    ctx.verify_token().await?;

    let executor = &ctx.executor;
    let batch = ctx
        .runner(args.concurrency)
        .run_all(
            rows,
            |row| async move {
                match activation_from_row(&row) {
                    Ok(activation) => activate_one(executor, activation).await,
                    Err(failure) => Err(failure),
                }
            },
            |done, progress| {
                let name = done.item.get("display_name").map(String::as_str).unwrap_or_default();
                match &done.outcome {
                    Ok(_) => info!("({}/{}) '{name}' activated", progress.completed, progress.total),
                    Err(failure) => warn!("({}/{}) '{name}': {failure}", progress.completed, progress.total),
                }
            },
        )
        .await;

    let failures: Vec<(String, String)> = batch
        .failures()
        .map(|(row, failure)| {
            let name = row.get("display_name").cloned().unwrap_or_default();
            (name, failure.to_string())
        })
        .collect();
    println!(
        "Activated {} of {} devices.",
        batch.len() - failures.len(),
        batch.len()
    );
    for (name, error) in &failures {
        println!("  {name}: {error}");
    }
    match &batch.aborted {
        Some(failure) => Err(eyre!("activation stopped: {failure}")),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::context_for;
    use crate::webex::ErrorKind;
    use serde_json::json;
    use std::fs;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn should_send_only_set_filters() {
        let args = ListArgs {
            display_name: Some("Lobby".into()),
            device_type: Some(DeviceType::RoomDesk),
            ..Default::default()
        };
        assert_eq!(
            args.filters(),
            vec![
                ("displayName".to_string(), "Lobby".to_string()),
                ("type".to_string(), "roomdesk".to_string()),
            ]
        );
        assert!(ListArgs::default().filters().is_empty());
    }

    #[test]
    fn should_build_activation_from_row() {
        let row: Row = [
            ("activation_code", " 1111-2222 "),
            ("display_name", "Lobby Board"),
            ("place_id", ""),
            ("tags", "floor1, lobby"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let activation = activation_from_row(&row).unwrap();
        assert_eq!(activation.activation_code, "1111-2222");
        assert_eq!(activation.place_id, None);
        assert_eq!(activation.tags, vec!["floor1", "lobby"]);

        let failure = activation_from_row(&Row::new()).unwrap_err();
        assert_eq!(failure.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn should_list_devices_across_pages_with_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/devices"))
            .and(query_param("tag", "lobby"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [
                {"id": "d1", "displayName": "Lobby 1", "type": "roomdesk", "serial": "S1"},
                {"id": "d2", "displayName": "Lobby 2", "type": "phone"}
            ]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/devices"))
            .and(query_param("tag", "lobby"))
            .and(query_param("offset", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [
                {"id": "d3", "displayName": "Lobby 3"}
            ]})))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let args = ListArgs {
            tag: Some("lobby".into()),
            limit: 2,
            ..Default::default()
        };

        let devices = list(&context_for(&server, dir.path()), &args).await.unwrap();
        let ids: Vec<_> = devices.iter().filter_map(|d| d.id.as_deref()).collect();
        assert_eq!(ids, vec!["d1", "d2", "d3"]);
        assert_eq!(devices[0].other["serial"], "S1");
    }

    #[tokio::test]
    async fn should_activate_batch_and_fail_on_auth_abort() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/people/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "admin"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/devices/activations"))
            .and(body_json(json!({
                "activationCode": "1111",
                "displayName": "Lobby",
                "placeId": "ws-1",
                "tags": ["a", "b"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "d1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/devices/activations"))
            .and(body_json(json!({"activationCode": "2222", "displayName": "Hall", "tags": []})))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("devices.csv");
        fs::write(
            &csv,
            "activation_code,display_name,place_id,tags\n1111,Lobby,ws-1,\"a, b\"\n2222,Hall,,\n",
        )
        .unwrap();
        let args = ActivateBatchArgs {
            csv_file: csv,
            concurrency: 1,
        };

        let err = activate_batch(&context_for(&server, dir.path()), &args)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("activation stopped"));
    }
}
