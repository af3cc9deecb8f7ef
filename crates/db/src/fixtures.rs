use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;

use tsm_core::billing::{RateCalculator, RateConfig};
use tsm_core::chain::ApprovalChain;
use tsm_core::domain::request::{
    ActionStatus, ApprovalAction, RequestId, RequestStatus, SpaceRequest,
};
use tsm_core::domain::role::{Role, User, UserId};
use tsm_core::sweeper::ExpirySweeper;

use crate::repositories::{RepositoryError, RequestRepository, UserDirectory};

const REQUESTER_ID: &str = "u2";
const REQUESTER_NAME: &str = "John Doe";

const SEED_USERS: &[SeedUser] = &[
    SeedUser { id: "u1", name: "System Admin", email: "admin@tsm.local", role: Role::Admin },
    SeedUser { id: "u2", name: "John Doe", email: "john@tsm.local", role: Role::Requester },
    SeedUser { id: "u3", name: "Alice BUM", email: "alice@tsm.local", role: Role::Bum },
    SeedUser { id: "u4", name: "Bob WCM", email: "bob@tsm.local", role: Role::Wcm },
    SeedUser { id: "u5", name: "David MFG", email: "david@tsm.local", role: Role::MfgFm },
    SeedUser { id: "u6", name: "Eve Plant", email: "eve@tsm.local", role: Role::IePlant },
];

const SEED_REQUEST_IDS: &[&str] = &["REQ-1001", "REQ-1002", "REQ-1003", "REQ-1004"];

struct SeedUser {
    id: &'static str,
    name: &'static str,
    email: &'static str,
    role: Role,
}

struct SeedEquipment {
    id: &'static str,
    machine_name: &'static str,
    serial_number: &'static str,
    work_cell: &'static str,
    cost_center: &'static str,
    length: Decimal,
    width: Decimal,
    height: Decimal,
}

/// Reference directory plus four demonstration requests, one per interesting lifecycle position.
///
/// Request dates are anchored on `today` so the dataset looks the same whenever it is loaded:
/// 1. `REQ-1001` pending at the first chain role
/// 2. `REQ-1002` fully approved and still within its dates
/// 3. `REQ-1003` rejected by the second chain role
/// 4. `REQ-1004` approved, then expired by the sweeper
pub struct SeedDataset;

impl SeedDataset {
    pub fn users() -> Vec<User> {
        SEED_USERS
            .iter()
            .map(|seed| User {
                id: UserId(seed.id.to_string()),
                name: seed.name.to_string(),
                email: seed.email.to_string(),
                role: seed.role,
                department: (seed.role == Role::Requester).then(|| "Engineering".to_string()),
                work_id: None,
                phone: None,
            })
            .collect()
    }

    pub fn requests(today: NaiveDate) -> Vec<SpaceRequest> {
        let chain = ApprovalChain::default();
        let rates = RateConfig::default();

        let pending = build_request(
            &SeedEquipment {
                id: "REQ-1001",
                machine_name: "SMT Pick & Place Unit",
                serial_number: "SMT-2024-X99",
                work_cell: "PCBA Line 1",
                cost_center: "CC-EN-500",
                length: Decimal::new(25, 1),
                width: Decimal::new(15, 1),
                height: Decimal::new(18, 1),
            },
            shift(today, 10),
            shift(today, 24),
            &rates,
            morning(today, -1),
            Some("Size consistent with standard SMT equipment. No stacking permitted."),
            &chain,
            &[],
        );

        let approved = build_request(
            &SeedEquipment {
                id: "REQ-1002",
                machine_name: "Hydraulic Press Spare",
                serial_number: "HP-50T-RES",
                work_cell: "Metal Stamping",
                cost_center: "CC-MFG-102",
                length: Decimal::new(12, 1),
                width: Decimal::new(12, 1),
                height: Decimal::new(20, 1),
            },
            shift(today, -20),
            shift(today, 60),
            &rates,
            morning(today, -30),
            None,
            &chain,
            &[ActionStatus::Approved; 4],
        );

        let rejected = build_request(
            &SeedEquipment {
                id: "REQ-1003",
                machine_name: "Old Conveyor Belt",
                serial_number: "CV-OLD-001",
                work_cell: "Assembly A",
                cost_center: "CC-OPS-900",
                length: Decimal::new(50, 1),
                width: Decimal::new(10, 1),
                height: Decimal::new(5, 1),
            },
            shift(today, -50),
            shift(today, 40),
            &rates,
            morning(today, -55),
            None,
            &chain,
            &[ActionStatus::Approved, ActionStatus::Rejected],
        );

        let lapsed = build_request(
            &SeedEquipment {
                id: "REQ-1004",
                machine_name: "Expired Test Machine",
                serial_number: "EXP-TEST-001",
                work_cell: "Testing Lab",
                cost_center: "CC-TEST-100",
                length: Decimal::new(20, 1),
                width: Decimal::new(20, 1),
                height: Decimal::new(15, 1),
            },
            shift(today, -35),
            shift(today, -5),
            &rates,
            morning(today, -40),
            None,
            &chain,
            &[ActionStatus::Approved; 4],
        );

        ExpirySweeper.sweep(vec![pending, approved, rejected, lapsed], today).requests
    }

    /// Upserts the dataset, so loading twice leaves the same rows behind.
    pub async fn load(
        requests: &dyn RequestRepository,
        users: &dyn UserDirectory,
        today: NaiveDate,
    ) -> Result<SeedResult, RepositoryError> {
        let seeded_users = Self::users();
        let seeded_requests = Self::requests(today);
        let result = SeedResult {
            users_seeded: seeded_users.len(),
            request_ids: seeded_requests.iter().map(|request| request.id.clone()).collect(),
        };

        for user in seeded_users {
            users.save_user(user).await?;
        }
        for request in seeded_requests {
            requests.save(request).await?;
        }

        Ok(result)
    }

    /// Checks that every seeded record is present.
    pub async fn verify(
        requests: &dyn RequestRepository,
        users: &dyn UserDirectory,
    ) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for seed in SEED_USERS {
            let found = users.find_user(&UserId(seed.id.to_string())).await?;
            checks.push(VerificationCheck {
                name: format!("user:{}", seed.id),
                passed: found.map(|user| user.role == seed.role).unwrap_or(false),
            });
        }

        for id in SEED_REQUEST_IDS {
            let found = requests.get(&RequestId((*id).to_string())).await?;
            checks.push(VerificationCheck { name: format!("request:{id}"), passed: found.is_some() });
        }

        let all_passed = checks.iter().all(|check| check.passed);
        Ok(VerificationResult { all_passed, checks })
    }
}

#[allow(clippy::too_many_arguments)]
fn build_request(
    equipment: &SeedEquipment,
    date_in: NaiveDate,
    date_out: NaiveDate,
    rates: &RateConfig,
    created_at: DateTime<Utc>,
    annotation: Option<&str>,
    chain: &ApprovalChain,
    decisions: &[ActionStatus],
) -> SpaceRequest {
    let quote =
        RateCalculator.quote_for_dates(equipment.length, equipment.width, date_in, date_out, rates);
    let users = SeedDataset::users();

    let approval_history: Vec<ApprovalAction> = chain
        .roles()
        .iter()
        .zip(decisions)
        .enumerate()
        .map(|(index, (role, decision))| {
            let approver = users.iter().find(|user| user.role == *role);
            ApprovalAction {
                role: *role,
                approver_id: approver
                    .map(|user| user.id.clone())
                    .unwrap_or_else(|| UserId(role.as_str().to_string())),
                approver_name: approver
                    .map(|user| user.name.clone())
                    .unwrap_or_else(|| role.display_name().to_string()),
                status: *decision,
                timestamp: created_at + chrono::Duration::hours(index as i64 + 1),
                comment: (*decision == ActionStatus::Rejected)
                    .then(|| "Scrap item, please dispose instead of store.".to_string()),
            }
        })
        .collect();

    let (status, current_approver_role) = match approval_history.last() {
        None => (RequestStatus::Pending, Some(chain.first())),
        Some(last) if last.status == ActionStatus::Rejected => (RequestStatus::Rejected, None),
        Some(last) => match chain.successor(last.role) {
            Some(next) => (RequestStatus::Pending, Some(next)),
            None => (RequestStatus::Approved, None),
        },
    };

    SpaceRequest {
        id: RequestId(equipment.id.to_string()),
        requester_id: UserId(REQUESTER_ID.to_string()),
        requester_name: REQUESTER_NAME.to_string(),
        machine_name: equipment.machine_name.to_string(),
        serial_number: equipment.serial_number.to_string(),
        work_cell: equipment.work_cell.to_string(),
        cost_center: equipment.cost_center.to_string(),
        length: equipment.length,
        width: equipment.width,
        height: equipment.height,
        date_in,
        date_out,
        billable_area: quote.area,
        calculated_rate: quote.amount,
        currency: quote.currency,
        status,
        current_approver_role,
        approval_history,
        annotation: annotation.map(str::to_string),
        created_at,
    }
}

fn shift(today: NaiveDate, days: i64) -> NaiveDate {
    let magnitude = Days::new(days.unsigned_abs());
    let shifted =
        if days >= 0 { today.checked_add_days(magnitude) } else { today.checked_sub_days(magnitude) };
    shifted.unwrap_or(today)
}

fn morning(today: NaiveDate, days: i64) -> DateTime<Utc> {
    let date = shift(today, days);
    Utc.from_utc_datetime(&date.and_hms_opt(8, 0, 0).unwrap_or_default())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub users_seeded: usize,
    pub request_ids: Vec<RequestId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationCheck {
    pub name: String,
    pub passed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub all_passed: bool,
    pub checks: Vec<VerificationCheck>,
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use tsm_core::chain::ApprovalChain;
    use tsm_core::domain::request::{ActionStatus, RequestStatus};
    use tsm_core::domain::role::Role;

    use super::SeedDataset;
    use crate::repositories::{InMemoryRequestRepository, InMemoryUserDirectory, RequestRepository};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).expect("date")
    }

    #[test]
    fn seeded_requests_cover_each_demo_state_and_hold_invariants() {
        let requests = SeedDataset::requests(today());
        let chain = ApprovalChain::default();

        let statuses: Vec<RequestStatus> = requests.iter().map(|request| request.status).collect();
        assert_eq!(
            statuses,
            vec![
                RequestStatus::Pending,
                RequestStatus::Approved,
                RequestStatus::Rejected,
                RequestStatus::Expired,
            ]
        );
        assert_eq!(requests[0].current_approver_role, Some(Role::Bum));
        assert_eq!(requests[2].approval_history[1].role, Role::Wcm);
        assert_eq!(requests[2].approval_history[1].status, ActionStatus::Rejected);

        for request in &requests {
            request.check_invariants(&chain).expect("seed request is consistent");
        }
    }

    #[test]
    fn seeded_prices_come_from_the_rate_calculator() {
        let pending = SeedDataset::requests(today()).remove(0);
        assert_eq!(pending.billable_area, Decimal::new(40_365, 3));
        assert_eq!(pending.calculated_rate, Decimal::new(2_373_462, 3));
    }

    #[tokio::test]
    async fn loading_is_idempotent_and_verifiable() {
        let requests = InMemoryRequestRepository::default();
        let users = InMemoryUserDirectory::default();

        SeedDataset::load(&requests, &users, today()).await.expect("first load");
        let result = SeedDataset::load(&requests, &users, today()).await.expect("second load");

        assert_eq!(result.users_seeded, 6);
        assert_eq!(requests.list().await.expect("list").len(), 4);
        let verification = SeedDataset::verify(&requests, &users).await.expect("verify");
        assert!(verification.all_passed);
        assert_eq!(verification.checks.len(), 10);
    }
}
