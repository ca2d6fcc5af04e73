// webex/models.rs

//! Request and response bodies for the endpoints this tool calls.
//!
//! Only the fields the commands read are typed; list payloads that are
//! exported as-is keep the remaining fields in a flattened map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `GET /people/me` and the people endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: Option<String>,
    pub display_name: Option<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    pub org_id: Option<String>,
}

impl Person {
    pub fn label(&self) -> String {
        format!(
            "{} ({})",
            self.display_name.as_deref().unwrap_or("Unknown"),
            self.emails.first().map(String::as_str).unwrap_or("Unknown")
        )
    }
}

/// An entry of `GET /wholesale/customers`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WholesaleCustomer {
    pub id: Option<String>,
    pub org_id: Option<String>,
    pub external_id: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// `GET /organizations/{orgId}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationDetails {
    pub id: Option<String>,
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub address_line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_or_province: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_or_postal_code: Option<String>,
    pub country: String,
}

/// `PUT /wholesale/customers/{customerId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerUpdateRequest {
    pub external_id: String,
    pub packages: Vec<String>,
    pub address: Address,
    pub provisioning_parameters: ProvisioningParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningParameters {
    pub calling: CallingParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallingParameters {
    pub location: CallingLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallingLocation {
    pub name: String,
    pub address: Address,
    pub timezone: String,
    pub language: String,
}

/// Accepted update: the API answers with a link to poll for completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerUpdateReceipt {
    pub url: Option<String>,
    pub status: Option<String>,
}

/// `POST /devices/activationCode`, bound to either a person or a workspace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationCodeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationCode {
    pub code: Option<String>,
    pub expiry_time: Option<String>,
}

/// `POST /workspaces`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRequest {
    pub display_name: String,
    pub org_id: String,
    pub workspace_location_id: String,
    #[serde(rename = "type")]
    pub workspace_type: String,
    pub capacity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calling: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar: Option<Value>,
    pub hotdesking_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_hosted_meetings: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: Option<String>,
    pub display_name: Option<String>,
}

/// `PUT /workspaces/{workspaceId}` with only the name changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRename {
    pub display_name: String,
}

/// An entry of `GET /devices`. Fields not shown in listings stay in `other`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: Option<String>,
    pub display_name: Option<String>,
    #[serde(rename = "type")]
    pub device_type: Option<String>,
    pub product: Option<String>,
    pub connection_status: Option<String>,
    pub place_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// `POST /devices/activations`: registers a device by its activation code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceActivation {
    pub activation_code: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// An entry of `GET /organizations`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
}

/// `GET /telephony/config/numbers`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberList {
    #[serde(default)]
    pub phone_numbers: Vec<PhoneNumber>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneNumber {
    pub phone_number: Option<String>,
    pub extension: Option<String>,
    pub routing_prefix: Option<String>,
    pub esn: Option<String>,
    pub mobile_network: Option<String>,
    pub routing_profile: Option<String>,
    pub state: Option<String>,
    pub phone_number_type: Option<String>,
    pub main_number: Option<bool>,
    pub included_telephony_types: Option<Value>,
    pub toll_free_number: Option<bool>,
    pub is_service_number: Option<bool>,
    pub location: Option<NumberLocation>,
    pub owner: Option<NumberOwner>,
}

impl PhoneNumber {
    /// Exact match on the number, or substring match on the extension.
    pub fn matches(&self, query: &str) -> bool {
        self.phone_number.as_deref() == Some(query)
            || self
                .extension
                .as_deref()
                .is_some_and(|ext| ext.contains(query))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumberLocation {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberOwner {
    pub id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(rename = "type")]
    pub owner_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_keep_unknown_customer_fields() {
        let customer: WholesaleCustomer = serde_json::from_value(json!({
            "id": "c1",
            "orgId": "o1",
            "externalId": "ext",
            "status": "provisioned",
            "address": {"city": "Austin"}
        }))
        .unwrap();
        assert_eq!(customer.org_id.as_deref(), Some("o1"));
        assert_eq!(customer.other["status"], json!("provisioned"));
        assert_eq!(serde_json::to_value(&customer).unwrap()["address"]["city"], "Austin");
    }

    #[test]
    fn should_serialize_update_request_in_camel_case() {
        let address = Address {
            address_line1: "1 Main St".into(),
            city: "Austin".into(),
            country: "US".into(),
            ..Default::default()
        };
        let request = CustomerUpdateRequest {
            external_id: "cust-1".into(),
            packages: vec!["webex_calling".into()],
            address: address.clone(),
            provisioning_parameters: ProvisioningParameters {
                calling: CallingParameters {
                    location: CallingLocation {
                        name: "Head Office".into(),
                        address,
                        timezone: "America/Chicago".into(),
                        language: "en_us".into(),
                    },
                },
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["externalId"], "cust-1");
        assert_eq!(value["address"]["addressLine1"], "1 Main St");
        assert!(value["address"].get("addressLine2").is_none());
        assert_eq!(
            value["provisioningParameters"]["calling"]["location"]["timezone"],
            "America/Chicago"
        );
    }

    #[test]
    fn should_match_number_or_extension() {
        let number = PhoneNumber {
            phone_number: Some("+12056350001".into()),
            extension: Some("5568".into()),
            ..Default::default()
        };
        assert!(number.matches("+12056350001"));
        assert!(number.matches("568"));
        assert!(!number.matches("+1205"));
    }
}
