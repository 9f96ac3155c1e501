//! Hand-off of scanned identities to a downstream registration service.
//!
//! The scanner only produces records; what the service does with them is
//! its own business. A rejection is surfaced as a validation failure.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, ScanError};
use crate::identity::rules::RuleBook;
use crate::models::{DateTriple, IdentityRecord};

/// Payload sent to the registration service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub cin: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: DateTriple,
}

impl From<&IdentityRecord> for RegistrationRequest {
    fn from(record: &IdentityRecord) -> Self {
        Self {
            cin: record.id_number.clone(),
            first_name: record.given_name.clone(),
            last_name: record.surname.clone(),
            birth_date: record.birth_date,
        }
    }
}

/// Answer of the registration service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegistrationOutcome {
    Accepted { message: String },
    Rejected { reason: String },
}

impl RegistrationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, RegistrationOutcome::Accepted { .. })
    }
}

/// Downstream identity registration capability.
pub trait RegistrationService: Send + Sync {
    fn submit(&self, request: &RegistrationRequest) -> RegistrationOutcome;
}

impl<S: RegistrationService + ?Sized> RegistrationService for Arc<S> {
    fn submit(&self, request: &RegistrationRequest) -> RegistrationOutcome {
        (**self).submit(request)
    }
}

/// Local service that only checks the ID number format.
pub struct FormatValidator {
    rules: Arc<RuleBook>,
}

impl FormatValidator {
    pub fn new(rules: Arc<RuleBook>) -> Self {
        Self { rules }
    }
}

impl RegistrationService for FormatValidator {
    fn submit(&self, request: &RegistrationRequest) -> RegistrationOutcome {
        if self.rules.is_canonical_id(&request.cin) {
            RegistrationOutcome::Accepted {
                message: format!("identity {} registered", request.cin),
            }
        } else {
            RegistrationOutcome::Rejected {
                reason: format!("invalid CIN format: {}", request.cin),
            }
        }
    }
}

/// Submit a record and turn a rejection into [`ScanError::Validation`].
///
/// Returns the service's acceptance message.
pub fn forward_registration<S>(service: &S, record: &IdentityRecord) -> Result<String>
where
    S: RegistrationService + ?Sized,
{
    let request = RegistrationRequest::from(record);

    match service.submit(&request) {
        RegistrationOutcome::Accepted { message } => {
            info!("Registered {}", request.cin);
            Ok(message)
        }
        RegistrationOutcome::Rejected { reason } => {
            warn!("Registration of {} rejected: {}", request.cin, reason);
            Err(ScanError::Validation(reason))
        }
    }
}
