//! Keep/delete planning for registrations that share an email address
//!
//! A successful payment always wins. Among attempts without one, the newest
//! attempt in the most crowded status class is the one the registrant meant
//! to keep. Planning is pure; the registration service executes the plan.

use chrono::{DateTime, Utc};
use reunion_common::{normalize_email, PaymentStatus, Registration};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Coarse status buckets the priority rules work on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusClass {
    Completed,
    Pending,
    FinancialDifficulty,
    Other,
}

impl From<PaymentStatus> for StatusClass {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Completed => StatusClass::Completed,
            PaymentStatus::Pending | PaymentStatus::NotStarted => StatusClass::Pending,
            PaymentStatus::FinancialDifficulty => StatusClass::FinancialDifficulty,
            PaymentStatus::Failed | PaymentStatus::ForeignTransaction => StatusClass::Other,
        }
    }
}

/// What the report shows about one registration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    pub id: String,
    pub email: String,
    pub contact_number: String,
    pub name: String,
    pub payment_status: PaymentStatus,
    pub serial_number: Option<u64>,
    pub registration_date: DateTime<Utc>,
}

impl From<&Registration> for RecordSummary {
    fn from(reg: &Registration) -> Self {
        Self {
            id: reg.id.clone(),
            email: reg.email.clone(),
            contact_number: reg.contact_number.clone(),
            name: reg.name.clone(),
            payment_status: reg.payment_status,
            serial_number: reg.serial_number,
            registration_date: reg.registration_date,
        }
    }
}

/// Plan for one email group. `reason` is empty when nothing is deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPlan {
    pub email: String,
    pub status_breakdown: BTreeMap<String, usize>,
    pub kept: Vec<RecordSummary>,
    pub deleted: Vec<RecordSummary>,
    pub reason: String,
}

impl GroupPlan {
    pub fn deleted_ids(&self) -> impl Iterator<Item = &str> {
        self.deleted.iter().map(|r| r.id.as_str())
    }
}

/// Groups with more than one registration for the same normalized email,
/// ordered by email.
pub fn group_by_email(registrations: &[Registration]) -> Vec<(String, Vec<&Registration>)> {
    let mut groups: BTreeMap<String, Vec<&Registration>> = BTreeMap::new();
    for reg in registrations {
        groups.entry(normalize_email(&reg.email)).or_default().push(reg);
    }
    groups
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .collect()
}

pub fn plan_all(registrations: &[Registration]) -> Vec<GroupPlan> {
    group_by_email(registrations)
        .into_iter()
        .map(|(email, members)| plan_group(&email, &members))
        .collect()
}

/// Newest first: registration date, then last update, then id.
fn recency_key(reg: &Registration) -> (DateTime<Utc>, DateTime<Utc>, &str) {
    (reg.registration_date, reg.last_updated, reg.id.as_str())
}

/// Split `members` into the newest one and the older rest.
fn keep_newest<'a>(mut members: Vec<&'a Registration>) -> (Vec<&'a Registration>, Vec<&'a Registration>) {
    members.sort_by_key(|reg| Reverse(recency_key(reg)));
    let older = members.split_off(members.len().min(1));
    (members, older)
}

pub fn plan_group(email: &str, members: &[&Registration]) -> GroupPlan {
    let mut completed = Vec::new();
    let mut pending = Vec::new();
    let mut hardship = Vec::new();
    let mut other = Vec::new();

    for reg in members {
        match StatusClass::from(reg.payment_status) {
            StatusClass::Completed => completed.push(*reg),
            StatusClass::Pending => pending.push(*reg),
            StatusClass::FinancialDifficulty => hardship.push(*reg),
            StatusClass::Other => other.push(*reg),
        }
    }

    let mut status_breakdown = BTreeMap::new();
    status_breakdown.insert("completed".to_string(), completed.len());
    status_breakdown.insert("pending".to_string(), pending.len());
    status_breakdown.insert("financial-difficulty".to_string(), hardship.len());
    status_breakdown.insert("other".to_string(), other.len());

    let (deleted, reason): (Vec<&Registration>, String) = if !completed.is_empty() {
        let doomed: Vec<&Registration> = pending
            .iter()
            .chain(hardship.iter())
            .chain(other.iter())
            .copied()
            .collect();
        let reason = format!(
            "Kept {} completed registration(s); removed {} without a completed payment",
            completed.len(),
            doomed.len()
        );
        (doomed, reason)
    } else if pending.len() >= 2 {
        let count = pending.len();
        let (_, older) = keep_newest(pending);
        (
            older,
            format!("Kept the newest of {} pending registrations", count),
        )
    } else if hardship.len() >= 2 {
        let count = hardship.len();
        let (_, older) = keep_newest(hardship);
        (
            older,
            format!(
                "Kept the newest of {} financial-difficulty registrations",
                count
            ),
        )
    } else if other.len() >= 2 {
        let count = other.len();
        let (_, older) = keep_newest(other);
        (
            older,
            format!("Kept the newest of {} registrations with other statuses", count),
        )
    } else {
        (Vec::new(), String::new())
    };

    let reason = if deleted.is_empty() { String::new() } else { reason };

    let mut kept: Vec<&Registration> = members
        .iter()
        .copied()
        .filter(|reg| !deleted.iter().any(|d| d.id == reg.id))
        .collect();
    kept.sort_by_key(|reg| Reverse(recency_key(reg)));

    let mut deleted = deleted;
    deleted.sort_by_key(|reg| Reverse(recency_key(reg)));

    GroupPlan {
        email: email.to_string(),
        status_breakdown,
        kept: kept.into_iter().map(RecordSummary::from).collect(),
        deleted: deleted.into_iter().map(RecordSummary::from).collect(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes_are_exhaustive() {
        assert_eq!(StatusClass::from(PaymentStatus::NotStarted), StatusClass::Pending);
        assert_eq!(
            StatusClass::from(PaymentStatus::ForeignTransaction),
            StatusClass::Other
        );
        assert_eq!(StatusClass::from(PaymentStatus::Failed), StatusClass::Other);
    }

    #[test]
    fn test_group_by_email_ignores_case_and_singletons() {
        let a1 = Registration::new("A@x.com", "1");
        let a2 = Registration::new("a@x.com", "2");
        let b = Registration::new("b@x.com", "3");
        let regs = vec![a1, a2, b];

        let groups = group_by_email(&regs);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "a@x.com");
        assert_eq!(groups[0].1.len(), 2);
    }
}
