// commands/number_lookup.rs

//! Searches every visible organization for a phone number or extension.

use clap::Args;
use color_eyre::eyre::{eyre, Result};
use itertools::Itertools;
use log::*;

use super::Context;
use crate::webex::api;
use crate::webex::models::{Organization, PhoneNumber};

#[derive(Args, Debug, Clone)]
pub struct NumberLookupArgs {
    /// Phone number (exact, e.g. +12056350001) or extension (partial, e.g. 568)
    pub query: String,

    /// Organizations searched in parallel
    #[arg(long, default_value_t = 10)]
    pub concurrency: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberMatch {
    pub organization: Organization,
    pub number: PhoneNumber,
}

fn or_na<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(T::to_string).unwrap_or_else(|| "N/A".into())
}

impl NumberMatch {
    pub fn render(&self) -> String {
        let n = &self.number;
        let location = n.location.clone().unwrap_or_default();
        let owner = n.owner.clone().unwrap_or_default();
        let fields = [
            ("Organization Name", self.organization.display_name.clone()),
            ("Organization ID", self.organization.id.clone()),
            ("Phone Number", or_na(&n.phone_number)),
            ("Extension", or_na(&n.extension)),
            ("Routing Prefix", or_na(&n.routing_prefix)),
            ("ESN", or_na(&n.esn)),
            ("Mobile Network", or_na(&n.mobile_network)),
            ("Routing Profile", or_na(&n.routing_profile)),
            ("State", or_na(&n.state)),
            ("Phone Number Type", or_na(&n.phone_number_type)),
            ("Main Number", or_na(&n.main_number)),
            ("Included Telephony Types", or_na(&n.included_telephony_types)),
            ("Toll-Free Number", or_na(&n.toll_free_number)),
            ("Is Service Number", or_na(&n.is_service_number)),
            ("Location ID", or_na(&location.id)),
            ("Location Name", or_na(&location.name)),
            ("Owner ID", or_na(&owner.id)),
            ("Owner First Name", or_na(&owner.first_name)),
            ("Owner Last Name", or_na(&owner.last_name)),
            ("Owner Type", or_na(&owner.owner_type)),
        ];
        fields
            .iter()
            .map(|(label, value)| format!("{label}: {value}"))
            .chain(std::iter::once("---".to_string()))
            .join("\n")
    }
}

pub async fn search(ctx: &Context, query: &str, concurrency: usize) -> Result<Vec<NumberMatch>> {
    let organizations = api::organizations(&ctx.executor)
        .await
        .map_err(|failure| eyre!("cannot list organizations: {failure}"))?;
    if organizations.is_empty() {
        warn!("No organizations visible to this token");
        return Ok(Vec::new());
    }
    info!("Searching {} organizations for {query}", organizations.len());

    let executor = &ctx.executor;
    let batch = ctx
        .runner(concurrency)
        .run_all(
            organizations,
            |org| async move { api::numbers_in_org(executor, &org.id).await },
            |done, _| {
                if let Err(failure) = &done.outcome {
                    warn!("Error searching in organization {}: {failure}", done.item.display_name);
                }
            },
        )
        .await;
    if let Some(failure) = &batch.aborted {
        return Err(eyre!("search stopped: {failure}"));
    }

    Ok(batch
        .into_submission_order()
        .into_iter()
        .filter_map(|done| done.outcome.ok().map(|numbers| (done.item, numbers)))
        .flat_map(|(organization, numbers)| {
            numbers
                .into_iter()
                .filter(|n| n.matches(query))
                .map(move |number| NumberMatch {
                    organization: organization.clone(),
                    number,
                })
        })
        .collect())
}

pub async fn run(ctx: &Context, args: &NumberLookupArgs) -> Result<()> {
    let query = args.query.trim();
    let matches = search(ctx, query, args.concurrency).await?;
    println!("Results for phone number/extension: {query}");
    if matches.is_empty() {
        println!("No matching numbers found.");
    }
    for found in &matches {
        println!("{}", found.render());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::context_for;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn should_find_numbers_across_orgs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/organizations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [
                {"id": "o1", "displayName": "Acme"},
                {"id": "o2", "displayName": "Beta"},
                {"id": "o3", "displayName": "Broken"}
            ]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/telephony/config/numbers"))
            .and(query_param("orgId", "o1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"phoneNumbers": [
                {"phoneNumber": "+12056350001", "extension": "0001"},
                {"phoneNumber": "+12056350002", "extension": "5568", "owner": {"firstName": "Ann", "type": "PEOPLE"}}
            ]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/telephony/config/numbers"))
            .and(query_param("orgId", "o2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"phoneNumbers": [
                {"extension": "1568"}
            ]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/telephony/config/numbers"))
            .and(query_param("orgId", "o3"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_for(&server, dir.path());

        let found = search(&ctx, "568", 2).await.unwrap();
        let orgs: Vec<&str> = found.iter().map(|m| m.organization.id.as_str()).collect();
        assert_eq!(orgs, vec!["o1", "o2"]);

        let text = found[0].render();
        assert!(text.contains("Organization Name: Acme"));
        assert!(text.contains("Owner First Name: Ann"));
        assert!(text.contains("Owner Type: PEOPLE"));
        assert!(text.contains("ESN: N/A"));
    }
}
