use chrono::NaiveDate;

use crate::domain::request::{RequestId, RequestStatus, SpaceRequest};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub requests: Vec<SpaceRequest>,
    pub expired_ids: Vec<RequestId>,
}

impl SweepReport {
    pub fn changed(&self) -> impl Iterator<Item = &SpaceRequest> {
        self.requests.iter().filter(|request| self.expired_ids.contains(&request.id))
    }
}

/// Reclassifies approved leases whose out-date has passed. This is the only producer of
/// `RequestStatus::Expired`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExpirySweeper;

impl ExpirySweeper {
    pub fn sweep(&self, requests: Vec<SpaceRequest>, today: NaiveDate) -> SweepReport {
        let mut expired_ids = Vec::new();
        let requests = requests
            .into_iter()
            .map(|request| match self.sweep_one(&request, today) {
                Some(expired) => {
                    expired_ids.push(expired.id.clone());
                    expired
                }
                None => request,
            })
            .collect();

        SweepReport { requests, expired_ids }
    }

    /// Expired copy of `request`, or `None` when the lease is still within its dates.
    pub fn sweep_one(&self, request: &SpaceRequest, today: NaiveDate) -> Option<SpaceRequest> {
        if request.status != RequestStatus::Approved || request.date_out >= today {
            return None;
        }

        let mut expired = request.clone();
        expired.status = RequestStatus::Expired;
        Some(expired)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use crate::domain::request::{RequestId, RequestStatus, SpaceRequest};
    use crate::domain::role::{Role, UserId};
    use crate::sweeper::ExpirySweeper;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).expect("valid date")
    }

    fn request(id: &str, status: RequestStatus, date_out: NaiveDate) -> SpaceRequest {
        SpaceRequest {
            id: RequestId(id.to_string()),
            requester_id: UserId("u2".to_string()),
            requester_name: "John Doe".to_string(),
            machine_name: "Hydraulic Press".to_string(),
            serial_number: "HP-900-X".to_string(),
            work_cell: "Press Shop".to_string(),
            cost_center: "CC-MFG-002".to_string(),
            length: Decimal::new(3, 0),
            width: Decimal::new(2, 0),
            height: Decimal::new(3, 0),
            date_in: date(1),
            date_out,
            billable_area: Decimal::new(64_584, 3),
            calculated_rate: Decimal::new(379_755, 2),
            currency: "USD".to_string(),
            current_approver_role: (status == RequestStatus::Pending).then_some(Role::Bum),
            status,
            approval_history: Vec::new(),
            annotation: None,
            created_at: Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).single().expect("timestamp"),
        }
    }

    #[test]
    fn only_overdue_approved_requests_expire() {
        let requests = vec![
            request("REQ-1", RequestStatus::Approved, date(10)),
            request("REQ-2", RequestStatus::Approved, date(15)),
            request("REQ-3", RequestStatus::Pending, date(10)),
            request("REQ-4", RequestStatus::Rejected, date(10)),
            request("REQ-5", RequestStatus::AwaitingInspection, date(10)),
        ];

        let report = ExpirySweeper.sweep(requests.clone(), date(15));

        assert_eq!(report.expired_ids, vec![RequestId("REQ-1".to_string())]);
        assert_eq!(report.requests[0].status, RequestStatus::Expired);
        assert_eq!(report.requests[1..], requests[1..], "boundary and non-approved pass through");
        assert_eq!(report.changed().count(), 1);
    }

    #[test]
    fn sweep_is_idempotent() {
        let requests = vec![
            request("REQ-1", RequestStatus::Approved, date(2)),
            request("REQ-2", RequestStatus::Expired, date(2)),
        ];

        let first = ExpirySweeper.sweep(requests, date(20));
        let second = ExpirySweeper.sweep(first.requests.clone(), date(20));

        assert_eq!(first.expired_ids.len(), 1);
        assert!(second.expired_ids.is_empty());
        assert_eq!(second.requests, first.requests);
    }

    #[test]
    fn sweep_preserves_every_field_but_status() {
        let approved = request("REQ-1", RequestStatus::Approved, date(2));
        let expired = ExpirySweeper.sweep_one(&approved, date(3)).expect("expires");

        assert_eq!(expired.status, RequestStatus::Expired);
        assert_eq!(expired.current_approver_role, None);
        assert_eq!(expired.calculated_rate, approved.calculated_rate);
        assert_eq!(expired.date_out, approved.date_out);
    }
}
