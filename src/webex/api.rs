// webex/api.rs

//! One function per endpoint used by the commands.

use serde_json::Value;

use super::client::ApiRequest;
use super::executor::Executor;
use super::models::*;
use super::outcome::{ApiFailure, ErrorKind, RequestOutcome};
use super::paginate::{Page, Paginator};

/// The person owning the token. Used to validate it before batch work.
pub async fn me(executor: &Executor) -> RequestOutcome<Person> {
    executor.execute(&ApiRequest::get("people/me")).await
}

pub fn wholesale_customers(executor: &Executor, page_size: usize) -> Paginator<'_, WholesaleCustomer> {
    Paginator::new(executor, "wholesale/customers", Vec::new(), page_size)
}

pub async fn organization(executor: &Executor, org_id: &str) -> RequestOutcome<OrganizationDetails> {
    executor
        .execute(&ApiRequest::get(format!("organizations/{org_id}")))
        .await
}

pub async fn organizations(executor: &Executor) -> RequestOutcome<Vec<Organization>> {
    let page: Page<Organization> = executor.execute(&ApiRequest::get("organizations")).await?;
    Ok(page.items)
}

pub fn update_wholesale_customer_request(
    customer_id: &str,
    body: &CustomerUpdateRequest,
) -> RequestOutcome<ApiRequest> {
    ApiRequest::put(format!("wholesale/customers/{customer_id}")).json(body)
}

/// First person matching `email`, `NotFound` if none.
pub async fn person_by_email(executor: &Executor, email: &str) -> RequestOutcome<Person> {
    let page: Page<Person> = executor
        .execute(&ApiRequest::get("people").query("email", email))
        .await?;
    first_or_not_found(page.items, || format!("No person found with email: {email}"))
}

/// First person whose display name matches. Display names are not unique.
pub async fn person_by_display_name(executor: &Executor, name: &str) -> RequestOutcome<Person> {
    let page: Page<Person> = executor
        .execute(&ApiRequest::get("people").query("displayName", name))
        .await?;
    first_or_not_found(page.items, || format!("No person found with display name: {name}"))
}

pub async fn person(executor: &Executor, person_id: &str) -> RequestOutcome<Person> {
    executor
        .execute(&ApiRequest::get(format!("people/{person_id}")))
        .await
}

pub async fn delete_person(executor: &Executor, person_id: &str) -> RequestOutcome<()> {
    executor
        .execute(&ApiRequest::delete(format!("people/{person_id}")))
        .await
}

/// Creates a device activation code. `org_id` is required when acting on
/// behalf of a customer organization.
pub async fn activation_code(
    executor: &Executor,
    body: &ActivationCodeRequest,
    org_id: Option<&str>,
) -> RequestOutcome<ActivationCode> {
    let mut request = ApiRequest::post("devices/activationCode").json(body)?;
    if let Some(org_id) = org_id {
        request = request.query("orgId", org_id);
    }
    let code: ActivationCode = executor.execute(&request).await?;
    if code.code.is_none() || code.expiry_time.is_none() {
        return Err(ApiFailure::new(
            ErrorKind::Serialization,
            "response is missing the activation code or its expiry time",
            None,
        ));
    }
    Ok(code)
}

pub async fn create_workspace(executor: &Executor, body: &WorkspaceRequest) -> RequestOutcome<Workspace> {
    let workspace: Workspace = executor
        .execute(&ApiRequest::post("workspaces").json(body)?)
        .await?;
    if workspace.id.is_none() {
        return Err(ApiFailure::new(
            ErrorKind::Serialization,
            "workspace created without an id in the response",
            None,
        ));
    }
    Ok(workspace)
}

/// Renames the first workspace called `old_name`. Returns its id.
pub async fn rename_workspace(executor: &Executor, old_name: &str, new_name: &str) -> RequestOutcome<String> {
    let page: Page<Workspace> = executor
        .execute(&ApiRequest::get("workspaces").query("displayName", old_name))
        .await?;
    let workspace = first_or_not_found(page.items, || format!("Workspace with name {old_name} not found"))?;
    let id = workspace.id.ok_or_else(|| {
        ApiFailure::new(ErrorKind::Serialization, "workspace listed without an id", None)
    })?;
    let body = WorkspaceRename {
        display_name: new_name.to_string(),
    };
    let _: Value = executor
        .execute(&ApiRequest::put(format!("workspaces/{id}")).json(&body)?)
        .await?;
    Ok(id)
}

/// Devices visible to the token, narrowed by the API side `filters`.
pub fn devices(
    executor: &Executor,
    filters: Vec<(String, String)>,
    page_size: usize,
) -> Paginator<'_, Device> {
    Paginator::new(executor, "devices", filters, page_size)
}

pub async fn activate_device(executor: &Executor, body: &DeviceActivation) -> RequestOutcome<Device> {
    executor
        .execute(&ApiRequest::post("devices/activations").json(body)?)
        .await
}

/// People of one organization.
pub fn people_in_org<'a>(executor: &'a Executor, org_id: &str, page_size: usize) -> Paginator<'a, Person> {
    Paginator::new(
        executor,
        "people",
        vec![("orgId".to_string(), org_id.to_string())],
        page_size,
    )
}

/// The organization whose display name equals `name`, ignoring case.
pub async fn organization_by_name(executor: &Executor, name: &str) -> RequestOutcome<Organization> {
    let wanted = name.trim().to_lowercase();
    let matching: Vec<Organization> = organizations(executor)
        .await?
        .into_iter()
        .filter(|org| org.display_name.to_lowercase() == wanted)
        .collect();
    first_or_not_found(matching, || format!("No organization named {name}"))
}

pub async fn numbers_in_org(executor: &Executor, org_id: &str) -> RequestOutcome<Vec<PhoneNumber>> {
    let list: NumberList = executor
        .execute(&ApiRequest::get("telephony/config/numbers").query("orgId", org_id))
        .await?;
    Ok(list.phone_numbers)
}

/// Polls an operation status link, as returned by asynchronous updates.
pub async fn operation_status(executor: &Executor, status_url: &str) -> RequestOutcome<Value> {
    executor.execute(&ApiRequest::get(status_url)).await
}

fn first_or_not_found<T>(items: Vec<T>, message: impl FnOnce() -> String) -> RequestOutcome<T> {
    items
        .into_iter()
        .next()
        .ok_or_else(|| ApiFailure::new(ErrorKind::NotFound, message(), None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webex::test_support::executor_for;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn should_report_missing_person_as_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/people"))
            .and(query_param("email", "ghost@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;

        let failure = person_by_email(&executor_for(&server), "ghost@example.com")
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::NotFound);
        assert_eq!(failure.status, None);
    }

    #[tokio::test]
    async fn should_post_activation_code_for_workspace() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/devices/activationCode"))
            .and(query_param("orgId", "org-1"))
            .and(body_json(json!({"workspaceId": "ws-1"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"code": "1234", "expiryTime": "2026-01-01T00:00:00Z"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let body = ActivationCodeRequest {
            workspace_id: Some("ws-1".into()),
            ..Default::default()
        };
        let code = activation_code(&executor_for(&server), &body, Some("org-1"))
            .await
            .unwrap();
        assert_eq!(code.code.as_deref(), Some("1234"));
    }

    #[tokio::test]
    async fn should_accept_empty_delete_response() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/people/p1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        assert!(delete_person(&executor_for(&server), "p1").await.is_ok());
    }

    #[tokio::test]
    async fn should_rename_first_matching_workspace() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/workspaces"))
            .and(query_param("displayName", "Room 1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [{"id": "ws-1"}, {"id": "ws-2"}]})))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/workspaces/ws-1"))
            .and(body_json(json!({"displayName": "Board Room"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "ws-1", "displayName": "Board Room"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = rename_workspace(&executor_for(&server), "Room 1", "Board Room").await.unwrap();
        assert_eq!(id, "ws-1");
    }

    #[tokio::test]
    async fn should_match_organization_name_ignoring_case() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/organizations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [
                {"id": "o1", "displayName": "Acme Corp"},
                {"id": "o2", "displayName": "Beta"}
            ]})))
            .mount(&server)
            .await;
        let executor = executor_for(&server);

        assert_eq!(organization_by_name(&executor, " acme corp").await.unwrap().id, "o1");
        let failure = organization_by_name(&executor, "Acme").await.unwrap_err();
        assert_eq!(failure.kind, ErrorKind::NotFound);
    }
}
