//! Admin views over registrations
//!
//! Every operation takes the caller's `AdminContext` and only shows
//! registrations from schools the admin may see.

use reunion_common::{
    AdminContext, Error, PaymentStatus, Registration, RegistrationType, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::{store::CascadeReport, AppState};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationFilter {
    #[serde(default)]
    pub school: Option<String>,

    #[serde(default)]
    pub payment_status: Option<String>,

    #[serde(default)]
    pub registration_type: Option<String>,

    #[serde(default)]
    pub complete: Option<bool>,

    /// Case-insensitive match on name, email or contact number
    #[serde(default)]
    pub search: Option<String>,

    #[serde(default)]
    pub page: Option<usize>,

    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_registrations: usize,
    pub completed_registrations: usize,
    pub by_payment_status: BTreeMap<String, usize>,
    pub by_registration_type: BTreeMap<String, usize>,
    pub by_school: BTreeMap<String, usize>,
    pub attending_headcount: u64,
    /// Sum of contributions on completed payments
    pub total_contributions: f64,
    pub serials_assigned: usize,
    pub serials_missing: usize,
}

fn not_in_scope() -> Error {
    Error::Forbidden("Registration belongs to a school outside your scope".to_string())
}

async fn scoped(state: &AppState, ctx: &AdminContext) -> Result<Vec<Registration>> {
    Ok(state
        .store
        .list_registrations()
        .await?
        .into_iter()
        .filter(|r| ctx.can_view_school(&r.school))
        .collect())
}

struct Criteria {
    school: Option<String>,
    payment_status: Option<PaymentStatus>,
    registration_type: Option<RegistrationType>,
    complete: Option<bool>,
    search: Option<String>,
}

impl Criteria {
    fn from_filter(filter: &RegistrationFilter) -> Result<Self> {
        fn present(value: &Option<String>) -> Option<&str> {
            value.as_deref().map(str::trim).filter(|v| !v.is_empty())
        }

        let payment_status = present(&filter.payment_status)
            .map(str::parse::<PaymentStatus>)
            .transpose()?;
        let registration_type = present(&filter.registration_type)
            .map(|v| {
                RegistrationType::parse(v)
                    .ok_or_else(|| Error::validation(format!("Unknown registration type: {}", v)))
            })
            .transpose()?;

        Ok(Self {
            school: present(&filter.school).map(str::to_string),
            payment_status,
            registration_type,
            complete: filter.complete,
            search: present(&filter.search).map(str::to_lowercase),
        })
    }

    fn accepts(&self, r: &Registration) -> bool {
        if let Some(school) = &self.school {
            if !r.school.trim().eq_ignore_ascii_case(school) {
                return false;
            }
        }
        if self.payment_status.is_some_and(|s| s != r.payment_status) {
            return false;
        }
        if self.registration_type.is_some_and(|t| t != r.registration_type) {
            return false;
        }
        if self.complete.is_some_and(|c| c != r.form_submission_complete) {
            return false;
        }
        match &self.search {
            Some(term) => {
                r.name.to_lowercase().contains(term)
                    || r.email.contains(term)
                    || r.contact_number.contains(term)
            }
            None => true,
        }
    }
}

/// Filtered, paged registrations, newest first
pub async fn list_registrations(
    state: &AppState,
    ctx: &AdminContext,
    filter: &RegistrationFilter,
) -> Result<Page<Registration>> {
    let criteria = Criteria::from_filter(filter)?;
    let page = filter.page.unwrap_or(1).max(1);
    let limit = filter
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let mut matching: Vec<Registration> = scoped(state, ctx)
        .await?
        .into_iter()
        .filter(|r| criteria.accepts(r))
        .collect();
    matching.sort_by(|a, b| {
        (b.registration_date, &b.id).cmp(&(a.registration_date, &a.id))
    });

    let total = matching.len();
    let items = matching
        .into_iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .collect();

    Ok(Page {
        items,
        total,
        page,
        limit,
    })
}

pub async fn get_registration(
    state: &AppState,
    ctx: &AdminContext,
    id: &str,
) -> Result<Registration> {
    let registration = state
        .store
        .get_registration(id)
        .await?
        .ok_or_else(|| Error::not_found("Registration not found"))?;

    if !ctx.can_view_school(&registration.school) {
        return Err(not_in_scope());
    }
    Ok(registration)
}

/// Delete a registration with its OTP records and transactions
pub async fn delete_registration(
    state: &AppState,
    ctx: &AdminContext,
    id: &str,
) -> Result<CascadeReport> {
    if !ctx.can_modify() {
        return Err(Error::Forbidden(
            "Read-only admins cannot delete registrations".to_string(),
        ));
    }
    get_registration(state, ctx, id).await?;

    let report = state
        .store
        .delete_registration_cascade(id)
        .await?
        .ok_or_else(|| Error::not_found("Registration not found"))?;

    info!(
        "{} deleted registration {} ({} OTP records, {} transactions)",
        ctx.admin_id, id, report.otp_records_deleted, report.transactions_deleted
    );
    Ok(report)
}

pub fn summarize(registrations: &[Registration]) -> Analytics {
    let mut analytics = Analytics {
        total_registrations: registrations.len(),
        by_payment_status: PaymentStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect(),
        ..Default::default()
    };

    for r in registrations {
        if r.form_submission_complete {
            analytics.completed_registrations += 1;
        }
        *analytics
            .by_payment_status
            .entry(r.payment_status.as_str().to_string())
            .or_default() += 1;
        *analytics
            .by_registration_type
            .entry(r.registration_type.as_str().to_string())
            .or_default() += 1;

        let school = match r.school.trim() {
            "" => "Unspecified",
            school => school,
        };
        *analytics.by_school.entry(school.to_string()).or_default() += 1;

        if r.is_attending {
            analytics.attending_headcount += r.attendee_count();
        }
        match r.payment_status {
            PaymentStatus::Completed => analytics.total_contributions += r.contribution_amount(),
            PaymentStatus::NotStarted
            | PaymentStatus::Pending
            | PaymentStatus::Failed
            | PaymentStatus::FinancialDifficulty
            | PaymentStatus::ForeignTransaction => {}
        }
        match r.serial_number {
            Some(_) => analytics.serials_assigned += 1,
            None => analytics.serials_missing += 1,
        }
    }

    analytics
}

/// Aggregate figures over the registrations the admin may see
pub async fn analytics(state: &AppState, ctx: &AdminContext) -> Result<Analytics> {
    Ok(summarize(&scoped(state, ctx).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registration(school: &str, status: PaymentStatus) -> Registration {
        let mut r = Registration::new(&format!("{}@x.com", uuid::Uuid::new_v4()), "1");
        r.school = school.to_string();
        r.payment_status = status;
        r
    }

    #[test]
    fn test_summary_counts() {
        let mut paid = registration("GHSS", PaymentStatus::Completed);
        paid.form_data_structured.financial = json!({ "contributionAmount": 500 })
            .as_object()
            .cloned();
        paid.form_submission_complete = true;
        paid.serial_number = Some(1);
        paid.is_attending = true;
        paid.form_data_structured.event_attendance = json!({
            "attendees": { "adults": { "veg": 2, "nonVeg": 0 } }
        })
        .as_object()
        .cloned();

        let mut pledged = registration("", PaymentStatus::Pending);
        pledged.form_data_structured.financial = json!({ "contributionAmount": 300 })
            .as_object()
            .cloned();

        let analytics = summarize(&[paid, pledged]);

        assert_eq!(analytics.total_registrations, 2);
        assert_eq!(analytics.completed_registrations, 1);
        assert_eq!(analytics.by_payment_status["Completed"], 1);
        assert_eq!(analytics.by_payment_status["failed"], 0);
        assert_eq!(analytics.by_school["Unspecified"], 1);
        assert_eq!(analytics.attending_headcount, 2);
        assert_eq!(analytics.total_contributions, 500.0);
        assert_eq!(analytics.serials_assigned, 1);
        assert_eq!(analytics.serials_missing, 1);
    }

    #[test]
    fn test_criteria_reject_unknown_values() {
        let filter = RegistrationFilter {
            payment_status: Some("refunded".to_string()),
            ..Default::default()
        };
        assert!(Criteria::from_filter(&filter).is_err());

        let filter = RegistrationFilter {
            registration_type: Some("guest".to_string()),
            ..Default::default()
        };
        assert!(Criteria::from_filter(&filter).is_err());
    }

    #[test]
    fn test_criteria_search_is_case_insensitive() {
        let criteria = Criteria::from_filter(&RegistrationFilter {
            search: Some("ASHA".to_string()),
            ..Default::default()
        })
        .unwrap();

        let mut r = registration("GHSS", PaymentStatus::Pending);
        r.name = "Asha Menon".to_string();
        assert!(criteria.accepts(&r));

        r.name = "Someone Else".to_string();
        assert!(!criteria.accepts(&r));
    }
}
