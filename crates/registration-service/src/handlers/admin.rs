//! Admin endpoints: duplicate clean-up, serials, registrations, analytics

use axum::{
    extract::{Path, Query, State},
    Json,
};
use reunion_common::{Error, Registration, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::{
    error::{success, success_with_message, ApiError, Envelope},
    extract::Admin,
    services::{
        admin::{self, Analytics, Page, RegistrationFilter},
        dedupe::{self, DedupeReport},
        payments,
        serial::{self, BulkAssignment, SerialAssignment},
    },
    store::CascadeReport,
    AppState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupeQuery {
    #[serde(default)]
    pub dry_run: bool,
}

/// Serial assignment request. Without a registration id every registration
/// lacking a serial gets one.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignSerialRequest {
    #[serde(default)]
    pub registration_id: Option<String>,

    #[serde(default)]
    pub serial_number: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SerialResult {
    Single(SerialAssignment),
    Bulk(BulkAssignment),
}

/// Duplicate report without deleting anything
pub async fn export_duplicates_handler(
    State(state): State<Arc<AppState>>,
    Admin(ctx): Admin,
) -> Result<Json<Envelope<DedupeReport>>, ApiError> {
    let report = dedupe::resolve_duplicates(&*state.store, &ctx, true).await?;
    Ok(success(report))
}

/// Delete duplicate registrations, or report what would be deleted
pub async fn resolve_duplicates_handler(
    State(state): State<Arc<AppState>>,
    Admin(ctx): Admin,
    Query(query): Query<DedupeQuery>,
) -> Result<Json<Envelope<DedupeReport>>, ApiError> {
    info!(
        "Duplicate resolution requested by {} (dry run: {})",
        ctx.admin_id, query.dry_run
    );

    let report = dedupe::resolve_duplicates(&*state.store, &ctx, query.dry_run).await?;
    let message = if report.dry_run {
        format!("{} registrations would be deleted", report.total_deleted)
    } else {
        format!("{} registrations deleted", report.total_deleted)
    };
    Ok(success_with_message(report, message))
}

/// Manual, single or bulk serial number assignment
pub async fn assign_serial_handler(
    State(state): State<Arc<AppState>>,
    Admin(ctx): Admin,
    Json(payload): Json<AssignSerialRequest>,
) -> Result<Json<Envelope<SerialResult>>, ApiError> {
    if !ctx.can_modify() {
        return Err(Error::Forbidden("Read-only admins cannot assign serials".to_string()).into());
    }

    let registration_id = payload
        .registration_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());

    let result = match (registration_id, payload.serial_number) {
        (Some(id), Some(serial_number)) => {
            admin::get_registration(&state, &ctx, id).await?;
            SerialResult::Single(serial::assign_manual(&*state.store, id, serial_number).await?)
        }
        (Some(id), None) => {
            admin::get_registration(&state, &ctx, id).await?;
            let serial_number = serial::auto_assign(&*state.store, id)
                .await?
                .ok_or_else(|| Error::conflict("Serial allocation contended, please retry"))?;
            SerialResult::Single(SerialAssignment {
                registration_id: id.to_string(),
                serial_number,
            })
        }
        (None, Some(_)) => {
            return Err(Error::validation("registrationId is required with serialNumber").into())
        }
        (None, None) => {
            if !ctx.sees_all_schools() {
                return Err(Error::Forbidden(
                    "Bulk assignment requires access to all schools".to_string(),
                )
                .into());
            }
            SerialResult::Bulk(serial::assign_missing(&*state.store).await?)
        }
    };

    Ok(success(result))
}

pub async fn list_registrations_handler(
    State(state): State<Arc<AppState>>,
    Admin(ctx): Admin,
    Query(filter): Query<RegistrationFilter>,
) -> Result<Json<Envelope<Page<Registration>>>, ApiError> {
    let page = admin::list_registrations(&state, &ctx, &filter).await?;
    Ok(success(page))
}

pub async fn get_registration_handler(
    State(state): State<Arc<AppState>>,
    Admin(ctx): Admin,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Registration>>, ApiError> {
    let registration = admin::get_registration(&state, &ctx, &id).await?;
    Ok(success(registration))
}

pub async fn delete_registration_handler(
    State(state): State<Arc<AppState>>,
    Admin(ctx): Admin,
    Path(id): Path<String>,
) -> Result<Json<Envelope<CascadeReport>>, ApiError> {
    let report = admin::delete_registration(&state, &ctx, &id).await?;
    Ok(success_with_message(report, "Registration deleted"))
}

pub async fn list_transactions_handler(
    State(state): State<Arc<AppState>>,
    Admin(ctx): Admin,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Vec<Transaction>>>, ApiError> {
    let transactions = payments::list_transactions(&state, &ctx, &id).await?;
    Ok(success(transactions))
}

pub async fn analytics_handler(
    State(state): State<Arc<AppState>>,
    Admin(ctx): Admin,
) -> Result<Json<Envelope<Analytics>>, ApiError> {
    let analytics = admin::analytics(&state, &ctx).await?;
    Ok(success(analytics))
}
