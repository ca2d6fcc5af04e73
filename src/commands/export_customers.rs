// commands/export_customers.rs

//! Exports every wholesale customer to CSV, enriched with the display name
//! of its organization.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::{eyre, Result, WrapErr};
use log::*;
use serde_json::Value;

use super::Context;
use crate::batch::SingleFlight;
use crate::records;
use crate::webex::models::{OrganizationDetails, WholesaleCustomer};
use crate::webex::paginate::DEFAULT_PAGE_SIZE;
use crate::webex::{api, RequestOutcome};

pub const UNABLE_TO_RETRIEVE: &str = "Unable to retrieve";
pub const NO_ORG_ID: &str = "No orgId available";

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// CSV file to write (default: timestamped file in the output directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Customers per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Parallel organization lookups
    #[arg(long, default_value_t = 10)]
    pub concurrency: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub exported: usize,
    pub with_org_name: usize,
    pub org_lookups: usize,
}

pub async fn run(ctx: &Context, args: &ExportArgs) -> Result<()> {
    let summary = export(ctx, args).await?;
    println!(
        "Exported {} customers to {}",
        summary.exported,
        summary.path.display()
    );
    println!("- Customers with organization names: {}", summary.with_org_name);
    println!(
        "- Customers without organization names: {}",
        summary.exported - summary.with_org_name
    );
    Ok(())
}

pub async fn export(ctx: &Context, args: &ExportArgs) -> Result<ExportSummary> {
    info!("Fetching wholesale customers, {} per page", args.page_size);
    let customers = api::wholesale_customers(&ctx.executor, args.page_size)
        .collect_all()
        .await
        .map_err(|failure| eyre!("cannot list wholesale customers: {failure}"))?;
    info!("Retrieved {} wholesale customers", customers.len());

    let lookups: SingleFlight<String, RequestOutcome<OrganizationDetails>> = SingleFlight::new();
    let executor = &ctx.executor;
    let lookups_ref = &lookups;
    let batch = ctx
        .runner(args.concurrency)
        .run_all(
            customers,
            |customer: WholesaleCustomer| async move {
                let Some(org_id) = customer.org_id.clone() else {
                    return RequestOutcome::Ok(None);
                };
                lookups_ref
                    .get_or_fetch(org_id.clone(), || async move {
                        api::organization(executor, &org_id).await
                    })
                    .await
                    .map(Some)
            },
            |done, progress| {
                if let Err(failure) = &done.outcome {
                    warn!(
                        "Could not retrieve org details for {}: {failure}",
                        done.item.org_id.as_deref().unwrap_or_default()
                    );
                }
                if progress.completed % 50 == 0 || progress.completed == progress.total {
                    info!("Enriched {}/{} customers", progress.completed, progress.total);
                }
            },
        )
        .await;
    if let Some(failure) = &batch.aborted {
        return Err(eyre!("export stopped: {failure}"));
    }

    let rows: Vec<BTreeMap<String, String>> = batch
        .into_submission_order()
        .into_iter()
        .map(|done| enrich(&done.item, &done.outcome).map(|value| records::flatten_json(&value)))
        .collect::<serde_json::Result<_>>()
        .wrap_err("cannot serialize customer for export")?;
    let with_org_name = rows
        .iter()
        .filter(|row| {
            row.get("org_displayName")
                .is_some_and(|name| !name.is_empty() && name != UNABLE_TO_RETRIEVE && name != NO_ORG_ID)
        })
        .count();

    let path = args.output.clone().unwrap_or_else(|| {
        records::timestamped_path(&ctx.settings.output_dir, "wholesale_customers_export", "csv")
    });
    if rows.is_empty() {
        warn!("No customer data to export");
    }
    records::write_maps(&path, &rows)?;

    Ok(ExportSummary {
        path,
        exported: rows.len(),
        with_org_name,
        org_lookups: lookups.len().await,
    })
}

/// The customer as JSON with `org_displayName` and, when known, `org_details`.
pub fn enrich(
    customer: &WholesaleCustomer,
    details: &RequestOutcome<Option<OrganizationDetails>>,
) -> serde_json::Result<Value> {
    let mut value = serde_json::to_value(customer)?;
    if let Value::Object(map) = &mut value {
        let name = match details {
            Ok(Some(details)) => {
                map.insert("org_details".into(), serde_json::to_value(details)?);
                details.display_name.clone().unwrap_or_default()
            }
            Ok(None) => NO_ORG_ID.to_string(),
            Err(_) => UNABLE_TO_RETRIEVE.to_string(),
        };
        map.insert("org_displayName".into(), Value::String(name));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::context_for;
    use crate::webex::ApiFailure;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn should_label_customers_by_lookup_outcome() {
        let customer = WholesaleCustomer {
            id: Some("c1".into()),
            org_id: Some("o1".into()),
            ..Default::default()
        };
        let details = OrganizationDetails {
            display_name: Some("Acme".into()),
            ..Default::default()
        };

        let found = enrich(&customer, &Ok(Some(details))).unwrap();
        assert_eq!(found["org_displayName"], "Acme");
        assert_eq!(found["org_details"]["displayName"], "Acme");
        assert_eq!(found["id"], "c1");

        let missing = enrich(&customer, &Ok(None)).unwrap();
        assert_eq!(missing["org_displayName"], NO_ORG_ID);

        let failed = enrich(&customer, &Err(ApiFailure::validation("nope"))).unwrap();
        assert_eq!(failed["org_displayName"], UNABLE_TO_RETRIEVE);
        assert!(failed.get("org_details").is_none());
    }

    #[tokio::test]
    async fn should_export_enriched_customers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wholesale/customers"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [
                {"id": "c1", "orgId": "o1", "packages": ["webex_calling"], "address": {"city": "Austin"}},
                {"id": "c2", "orgId": "o1"},
                {"id": "c3", "orgId": "o2"},
                {"id": "c4"}
            ]})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/organizations/o1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "o1", "displayName": "Acme"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/organizations/o2"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "gone"})))
            .expect(1)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_for(&server, dir.path());
        let output = dir.path().join("export.csv");

        let summary = export(
            &ctx,
            &ExportArgs {
                output: Some(output.clone()),
                page_size: 10,
                concurrency: 3,
            },
        )
        .await
        .unwrap();

        assert_eq!(summary.exported, 4);
        assert_eq!(summary.with_org_name, 2);
        assert_eq!(summary.org_lookups, 2);

        let rows = records::read_rows(&output).unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r["org_displayName"].as_str()).collect();
        assert_eq!(names, vec!["Acme", "Acme", UNABLE_TO_RETRIEVE, NO_ORG_ID]);
        assert_eq!(rows[0]["org_details_displayName"], "Acme");
        assert_eq!(rows[0]["address_city"], "Austin");
        assert_eq!(rows[0]["packages"], "webex_calling");
        assert_eq!(rows[3]["address_city"], "");
    }

    #[tokio::test]
    async fn should_fail_when_listing_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wholesale/customers"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_for(&server, dir.path());
        let args = ExportArgs {
            output: None,
            page_size: 10,
            concurrency: 3,
        };
        assert!(export(&ctx, &args).await.is_err());
    }
}
