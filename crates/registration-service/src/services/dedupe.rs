//! Duplicate registration clean-up
//!
//! Plans come from `form_rules::duplicates`; executing a plan deletes each
//! losing registration together with its OTP records and transactions.

use form_rules::{plan_all, GroupPlan};
use reunion_common::{AdminContext, Error, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::store::RegistrationStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupeReport {
    pub dry_run: bool,
    pub groups_processed: usize,
    /// Planned deletions in a dry run, performed deletions otherwise
    pub total_deleted: usize,
    pub groups: Vec<GroupPlan>,
}

/// Plan, and unless `dry_run`, delete duplicate registrations.
///
/// Planning looks at every registration regardless of school, so only an
/// admin who can modify and sees every school may execute it.
pub async fn resolve_duplicates<S: RegistrationStore + ?Sized>(
    store: &S,
    ctx: &AdminContext,
    dry_run: bool,
) -> Result<DedupeReport> {
    if !dry_run && !(ctx.can_modify() && ctx.sees_all_schools()) {
        return Err(Error::Forbidden(
            "Deleting duplicates requires write access to all schools".to_string(),
        ));
    }

    let registrations = store.list_registrations().await?;
    let groups = plan_all(&registrations);
    let planned: usize = groups.iter().map(|g| g.deleted.len()).sum();

    let total_deleted = if dry_run {
        planned
    } else {
        let mut deleted = 0;
        for id in groups.iter().flat_map(GroupPlan::deleted_ids) {
            match store.delete_registration_cascade(id).await? {
                Some(report) => {
                    deleted += 1;
                    info!(
                        "Deleted duplicate {} ({} OTP records, {} transactions)",
                        id, report.otp_records_deleted, report.transactions_deleted
                    );
                }
                None => warn!("Duplicate {} was already gone", id),
            }
        }
        deleted
    };

    info!(
        "Duplicate resolution by {} (dry run: {}): {} groups, {} deleted",
        ctx.admin_id,
        dry_run,
        groups.len(),
        total_deleted
    );

    Ok(DedupeReport {
        dry_run,
        groups_processed: groups.len(),
        total_deleted,
        groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use reunion_common::{AdminRole, PaymentStatus, Registration};

    fn registration(email: &str, status: PaymentStatus) -> Registration {
        let mut r = Registration::new(email, "9000");
        r.payment_status = status;
        r
    }

    fn seeded() -> MemoryStore {
        MemoryStore::with_registrations(vec![
            registration("dup@x.com", PaymentStatus::Completed),
            registration("dup@x.com", PaymentStatus::Pending),
            registration("solo@x.com", PaymentStatus::Pending),
        ])
    }

    #[tokio::test]
    async fn test_dry_run_deletes_nothing() {
        let store = seeded();
        let viewer = AdminContext {
            admin_id: "v".to_string(),
            role: AdminRole::Viewer,
            can_view_all_schools: false,
            assigned_schools: Vec::new(),
        };

        let report = resolve_duplicates(&store, &viewer, true).await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.groups_processed, 1);
        assert_eq!(report.total_deleted, 1);
        assert_eq!(store.list_registrations().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_execution_requires_full_write_access() {
        let store = seeded();
        let scoped = AdminContext {
            admin_id: "a".to_string(),
            role: AdminRole::Admin,
            can_view_all_schools: false,
            assigned_schools: vec!["GHSS".to_string()],
        };

        let err = resolve_duplicates(&store, &scoped, false).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_execution_deletes_planned_records() {
        let store = seeded();

        let report = resolve_duplicates(&store, &AdminContext::super_admin("root"), false)
            .await
            .unwrap();

        assert_eq!(report.total_deleted, 1);
        let remaining = store.list_registrations().await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining
            .iter()
            .all(|r| r.email != "dup@x.com" || r.payment_status == PaymentStatus::Completed));
    }
}
