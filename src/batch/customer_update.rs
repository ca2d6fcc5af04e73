// batch/customer_update.rs

//! Per-record state machine for replacing a wholesale customer's external ID.
//!
//! ```text
//! Pending -> Validating -> ValidationFailed
//!                       -> Submitting -> Succeeded
//!                                     -> RetryableFailure -> Submitting
//!                                     -> TerminalFailure
//! ```
//!
//! Retries happen inside the [`Executor`]; the history records one
//! `RetryableFailure -> Submitting` pair per retry it reports.

use std::collections::HashMap;

use enum_iterator::Sequence;
use log::*;

use crate::batch::runner::ItemOutcome;
use crate::webex::api::update_wholesale_customer_request;
use crate::webex::models::{
    Address, CallingLocation, CallingParameters, CustomerUpdateReceipt, CustomerUpdateRequest,
    ProvisioningParameters,
};
use crate::webex::{ApiFailure, Executor};

pub const DEFAULT_LOCATION_NAME: &str = "Head Office";
pub const DEFAULT_TIMEZONE: &str = "America/Chicago";
pub const DEFAULT_LANGUAGE: &str = "en_us";

/// CSV column holding the organization display name, as written by the export.
pub const ORG_NAME_COLUMN: &str = "org_details_displayName";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Sequence)]
pub enum UpdateState {
    Pending,
    Validating,
    ValidationFailed,
    Submitting,
    RetryableFailure,
    Succeeded,
    TerminalFailure,
}

impl UpdateState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UpdateState::Succeeded | UpdateState::ValidationFailed | UpdateState::TerminalFailure
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            UpdateState::Pending => "Pending",
            UpdateState::Validating => "Validating",
            UpdateState::ValidationFailed => "Validation failed",
            UpdateState::Submitting => "Submitting",
            UpdateState::RetryableFailure => "Retryable failure",
            UpdateState::Succeeded => "Succeeded",
            UpdateState::TerminalFailure => "Failed",
        }
    }
}

/// One row of a customer export, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerRecord {
    fields: HashMap<String, String>,
}

impl From<HashMap<String, String>> for CustomerRecord {
    fn from(fields: HashMap<String, String>) -> Self {
        Self { fields }
    }
}

impl CustomerRecord {
    /// Trimmed value of `column`, `None` when absent or blank.
    pub fn field(&self, column: &str) -> Option<&str> {
        self.fields
            .get(column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Webex customer id, used in the update URL.
    pub fn id(&self) -> Option<&str> {
        self.field("id")
    }

    /// Partner customer id, which becomes the new external id.
    pub fn customer_id(&self) -> Option<&str> {
        self.field("customerId")
    }

    pub fn external_id(&self) -> Option<&str> {
        self.field("externalId")
    }

    pub fn org_name(&self) -> Option<&str> {
        self.field(ORG_NAME_COLUMN)
    }

    pub fn display_name(&self) -> &str {
        self.org_name().unwrap_or("Unknown")
    }

    /// Comma separated `packages` column, blanks dropped.
    pub fn packages(&self) -> Vec<String> {
        self.field("packages")
            .map(|p| {
                p.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn address(&self) -> Address {
        let owned = |column: &str| self.field(column).map(str::to_string);
        Address {
            address_line1: owned("address_addressLine1").unwrap_or_default(),
            address_line2: owned("address_addressLine2"),
            city: owned("address_city").unwrap_or_default(),
            state_or_province: owned("address_stateOrProvince"),
            zip_or_postal_code: owned("address_zipOrPostalCode"),
            country: owned("address_country").unwrap_or_default(),
        }
    }

    /// Every problem preventing an update, in a stable order.
    pub fn validate(&self) -> Result<(), Vec<&'static str>> {
        let checks = [
            (self.id().is_some(), "Missing customer ID"),
            (self.customer_id().is_some(), "Missing customerId"),
            (!self.packages().is_empty(), "Missing packages"),
            (
                self.field("address_addressLine1").is_some(),
                "Missing address line 1",
            ),
            (self.field("address_city").is_some(), "Missing city"),
            (self.field("address_country").is_some(), "Missing country"),
        ];
        let errors: Vec<&'static str> = checks
            .into_iter()
            .filter(|(ok, _)| !ok)
            .map(|(_, message)| message)
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The update body: external id replaced by `customerId`, address reused
    /// for the default calling location.
    pub fn update_request(&self) -> CustomerUpdateRequest {
        let address = self.address();
        CustomerUpdateRequest {
            external_id: self.customer_id().unwrap_or_default().to_string(),
            packages: self.packages(),
            address: address.clone(),
            provisioning_parameters: ProvisioningParameters {
                calling: CallingParameters {
                    location: CallingLocation {
                        name: DEFAULT_LOCATION_NAME.to_string(),
                        address,
                        timezone: DEFAULT_TIMEZONE.to_string(),
                        language: DEFAULT_LANGUAGE.to_string(),
                    },
                },
            },
        }
    }
}

/// Terminal result of one record, with the path it took.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateResult {
    pub history: Vec<UpdateState>,
    pub failure: Option<ApiFailure>,
    pub request: Option<CustomerUpdateRequest>,
    pub receipt: Option<CustomerUpdateReceipt>,
}

impl Default for UpdateResult {
    fn default() -> Self {
        Self {
            history: vec![UpdateState::Pending],
            failure: None,
            request: None,
            receipt: None,
        }
    }
}

impl UpdateResult {
    pub fn state(&self) -> UpdateState {
        self.history
            .last()
            .copied()
            .unwrap_or(UpdateState::Pending)
    }

    fn enter(&mut self, state: UpdateState) {
        self.history.push(state);
    }

    fn fail(&mut self, state: UpdateState, failure: ApiFailure) {
        self.failure = Some(failure);
        self.enter(state);
    }

    pub fn is_success(&self) -> bool {
        self.state() == UpdateState::Succeeded
    }
}

impl ItemOutcome for UpdateResult {
    fn batch_fatal(&self) -> Option<&ApiFailure> {
        self.failure.as_ref().filter(|f| f.kind.is_batch_fatal())
    }

    fn not_started(reason: ApiFailure) -> Self {
        let mut result = UpdateResult::default();
        result.fail(UpdateState::TerminalFailure, reason);
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Validate and build requests only.
    DryRun,
    Execute,
}

/// Drives records through the state machine.
#[derive(Debug, Clone, Copy)]
pub struct CustomerUpdater<'a> {
    executor: &'a Executor,
    mode: UpdateMode,
}

impl<'a> CustomerUpdater<'a> {
    pub fn new(executor: &'a Executor, mode: UpdateMode) -> Self {
        Self { executor, mode }
    }

    pub fn mode(&self) -> UpdateMode {
        self.mode
    }

    pub async fn process(&self, record: &CustomerRecord) -> UpdateResult {
        let mut result = UpdateResult::default();
        result.enter(UpdateState::Validating);

        if let Err(errors) = record.validate() {
            debug!("{}: {}", record.display_name(), errors.join("; "));
            result.fail(
                UpdateState::ValidationFailed,
                ApiFailure::validation(format!("Validation failed: {}", errors.join("; "))),
            );
            return result;
        }
        let body = record.update_request();
        result.request = Some(body.clone());

        if self.mode == UpdateMode::DryRun {
            result.enter(UpdateState::Succeeded);
            return result;
        }

        let customer_id = record.id().unwrap_or_default();
        let request = match update_wholesale_customer_request(customer_id, &body) {
            Ok(request) => request,
            Err(failure) => {
                result.fail(UpdateState::TerminalFailure, failure);
                return result;
            }
        };

        result.enter(UpdateState::Submitting);
        let executed = self
            .executor
            .execute_traced::<CustomerUpdateReceipt>(&request)
            .await;
        for _ in 0..executed.retries {
            result.enter(UpdateState::RetryableFailure);
            result.enter(UpdateState::Submitting);
        }
        match executed.outcome {
            Ok(receipt) => {
                info!(
                    "Updated {} ({}): external id {}",
                    record.display_name(),
                    customer_id,
                    body.external_id
                );
                result.receipt = Some(receipt);
                result.enter(UpdateState::Succeeded);
            }
            Err(failure) => {
                warn!("Update of {} failed: {}", record.display_name(), failure);
                result.fail(UpdateState::TerminalFailure, failure);
            }
        }
        result
    }
}

/// Count of records per terminal state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub succeeded: usize,
    pub validation_failed: usize,
    pub terminal_failure: usize,
}

impl UpdateSummary {
    pub fn tally<'r>(results: impl IntoIterator<Item = &'r UpdateResult>) -> Self {
        let mut summary = Self::default();
        for result in results {
            match result.state() {
                UpdateState::Succeeded => summary.succeeded += 1,
                UpdateState::ValidationFailed => summary.validation_failed += 1,
                _ => summary.terminal_failure += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.validation_failed + self.terminal_failure
    }

    pub fn failed(&self) -> usize {
        self.validation_failed + self.terminal_failure
    }
}
