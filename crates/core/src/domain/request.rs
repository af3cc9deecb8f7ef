use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::ApprovalChain;
use crate::domain::role::{Role, UserId};
use crate::errors::{LifecycleError, ValidationErrors, ValidationIssue};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        let raw = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
        Self(format!("REQ-{}", &raw[..12]))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
    Expired,
    AwaitingInspection,
    Completed,
    Overstay,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::AwaitingInspection => "awaiting_inspection",
            Self::Completed => "completed",
            Self::Overstay => "overstay",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            "awaiting_inspection" => Ok(Self::AwaitingInspection),
            "completed" => Ok(Self::Completed),
            "overstay" => Ok(Self::Overstay),
            other => Err(format!("unknown request status `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Approved,
    Rejected,
    Verified,
    Flagged,
}

impl ActionStatus {
    pub fn is_chain_decision(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

/// One append-only audit entry on a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalAction {
    pub role: Role,
    pub approver_id: UserId,
    pub approver_name: String,
    pub status: ActionStatus,
    pub timestamp: DateTime<Utc>,
    pub comment: Option<String>,
}

/// Submission input. Dates are optional so a renewal can start with them blank.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceRequestDraft {
    pub machine_name: String,
    pub serial_number: String,
    pub work_cell: String,
    pub cost_center: String,
    pub length: Decimal,
    pub width: Decimal,
    pub height: Decimal,
    pub date_in: Option<NaiveDate>,
    pub date_out: Option<NaiveDate>,
}

/// Draft whose fields passed validation. Only the lifecycle consumes it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedDraft {
    pub machine_name: String,
    pub serial_number: String,
    pub work_cell: String,
    pub cost_center: String,
    pub length: Decimal,
    pub width: Decimal,
    pub height: Decimal,
    pub date_in: NaiveDate,
    pub date_out: NaiveDate,
}

impl SpaceRequestDraft {
    /// Pre-populates a new draft from an existing request; dates stay blank.
    pub fn renewal_of(request: &SpaceRequest) -> Self {
        Self {
            machine_name: request.machine_name.clone(),
            serial_number: request.serial_number.clone(),
            work_cell: request.work_cell.clone(),
            cost_center: request.cost_center.clone(),
            length: request.length,
            width: request.width,
            height: request.height,
            date_in: None,
            date_out: None,
        }
    }

    pub fn validate(&self) -> Result<ValidatedDraft, ValidationErrors> {
        let mut issues = Vec::new();

        for (field, value) in [
            ("machine_name", &self.machine_name),
            ("serial_number", &self.serial_number),
            ("work_cell", &self.work_cell),
            ("cost_center", &self.cost_center),
        ] {
            if value.trim().is_empty() {
                issues.push(ValidationIssue::new(field, "is required"));
            }
        }

        for (field, value) in
            [("length", self.length), ("width", self.width), ("height", self.height)]
        {
            if value <= Decimal::ZERO {
                issues.push(ValidationIssue::new(field, "must be greater than zero"));
            }
        }

        if self.date_in.is_none() {
            issues.push(ValidationIssue::new("date_in", "is required"));
        }
        if self.date_out.is_none() {
            issues.push(ValidationIssue::new("date_out", "is required"));
        }

        let (date_in, date_out) = match (self.date_in, self.date_out) {
            (Some(date_in), Some(date_out)) => {
                if date_out < date_in {
                    issues.push(ValidationIssue::new("date_out", "must not precede date_in"));
                }
                (date_in, date_out)
            }
            _ => return Err(ValidationErrors(issues)),
        };

        if !issues.is_empty() {
            return Err(ValidationErrors(issues));
        }

        Ok(ValidatedDraft {
            machine_name: self.machine_name.trim().to_string(),
            serial_number: self.serial_number.trim().to_string(),
            work_cell: self.work_cell.trim().to_string(),
            cost_center: self.cost_center.trim().to_string(),
            length: self.length,
            width: self.width,
            height: self.height,
            date_in,
            date_out,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceRequest {
    pub id: RequestId,
    pub requester_id: UserId,
    pub requester_name: String,
    pub machine_name: String,
    pub serial_number: String,
    pub work_cell: String,
    pub cost_center: String,
    pub length: Decimal,
    pub width: Decimal,
    pub height: Decimal,
    pub date_in: NaiveDate,
    pub date_out: NaiveDate,
    pub billable_area: Decimal,
    pub calculated_rate: Decimal,
    pub currency: String,
    pub status: RequestStatus,
    pub current_approver_role: Option<Role>,
    pub approval_history: Vec<ApprovalAction>,
    pub annotation: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SpaceRequest {
    pub fn last_action(&self) -> Option<&ApprovalAction> {
        self.approval_history.last()
    }

    /// Verifies the snapshot against the data-model invariants for the given chain.
    pub fn check_invariants(&self, chain: &ApprovalChain) -> Result<(), LifecycleError> {
        let violation = |message: String| {
            Err(LifecycleError::InvariantViolation(format!("request {}: {message}", self.id)))
        };

        match (self.status, self.current_approver_role) {
            (RequestStatus::Pending, None) => {
                return violation("pending request has no current approver".to_string());
            }
            (RequestStatus::Pending, Some(_)) | (_, None) => {}
            (status, Some(role)) => {
                return violation(format!("status {status} must not await approver {role}"));
            }
        }

        if self.date_out < self.date_in {
            return violation("date_out precedes date_in".to_string());
        }

        let mut decided = HashSet::new();
        let mut last_approved = None;
        for pair in self.approval_history.windows(2) {
            if pair[1].timestamp < pair[0].timestamp {
                return violation("approval history is not chronological".to_string());
            }
        }
        for action in &self.approval_history {
            if action.status.is_chain_decision() && !decided.insert(action.role) {
                return violation(format!("role {} decided more than once", action.role));
            }
            if action.status == ActionStatus::Approved {
                last_approved = Some(action.role);
            }
        }

        if let Some(current) = self.current_approver_role {
            let expected = match last_approved {
                Some(role) => chain.successor(role),
                None => Some(chain.first()),
            };
            if expected != Some(current) {
                return violation(format!(
                    "current approver {current} does not follow the recorded approvals"
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{RequestId, RequestStatus, SpaceRequestDraft};

    fn draft() -> SpaceRequestDraft {
        SpaceRequestDraft {
            machine_name: "SMT Pick & Place Unit".to_string(),
            serial_number: "SMT-2024-X99".to_string(),
            work_cell: "PCBA Line 1".to_string(),
            cost_center: "CC-EN-500".to_string(),
            length: Decimal::new(25, 1),
            width: Decimal::new(15, 1),
            height: Decimal::new(18, 1),
            date_in: NaiveDate::from_ymd_opt(2025, 3, 1),
            date_out: NaiveDate::from_ymd_opt(2025, 3, 15),
        }
    }

    #[test]
    fn valid_draft_passes_and_trims_text() {
        let mut input = draft();
        input.machine_name = "  SMT Pick & Place Unit ".to_string();
        let validated = input.validate().expect("valid draft");
        assert_eq!(validated.machine_name, "SMT Pick & Place Unit");
    }

    #[test]
    fn validation_reports_every_offending_field() {
        let mut input = draft();
        input.serial_number = " ".to_string();
        input.width = Decimal::ZERO;
        input.height = Decimal::new(-1, 0);

        let errors = input.validate().expect_err("invalid draft");
        let fields: Vec<_> = errors.0.iter().map(|issue| issue.field).collect();
        assert_eq!(fields, vec!["serial_number", "width", "height"]);
    }

    #[test]
    fn date_out_before_date_in_is_rejected() {
        let mut input = draft();
        input.date_out = NaiveDate::from_ymd_opt(2025, 2, 28);
        let errors = input.validate().expect_err("reversed dates");
        assert_eq!(errors.0[0].field, "date_out");
    }

    #[test]
    fn missing_dates_are_rejected() {
        let mut input = draft();
        input.date_in = None;
        input.date_out = None;
        let errors = input.validate().expect_err("missing dates");
        assert_eq!(errors.0.len(), 2);
    }

    #[test]
    fn generated_ids_use_request_prefix() {
        let id = RequestId::generate();
        assert!(id.0.starts_with("REQ-"));
        assert_eq!(id.0.len(), 16);
        assert_ne!(id, RequestId::generate());
    }

    #[test]
    fn status_parses_from_storage_keys() {
        assert_eq!("awaiting_inspection".parse(), Ok(RequestStatus::AwaitingInspection));
        assert_eq!("Overstay".parse(), Ok(RequestStatus::Overstay));
        assert!("archived".parse::<RequestStatus>().is_err());
    }
}
