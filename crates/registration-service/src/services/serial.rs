//! Serial number allocation
//!
//! Serials are claimed through the store's unique claim, so two registrations
//! racing for the same number cannot both win. The loser retries once.

use reunion_common::{Error, Result};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::store::SerialStore;

/// Assign the next serial to a registration that has none.
///
/// Returns the existing serial unchanged when one is already assigned, and
/// `None` when both the first choice and the retry were taken by concurrent
/// allocations.
pub async fn auto_assign<S: SerialStore + ?Sized>(store: &S, id: &str) -> Result<Option<u64>> {
    if let Some(existing) = store.current_serial(id).await? {
        debug!("Registration {} already has serial {}", id, existing);
        return Ok(Some(existing));
    }

    let first_choice = store.max_serial().await? + 1;
    if store.claim_serial(id, first_choice).await? {
        info!("Assigned serial {} to {}", first_choice, id);
        return Ok(Some(first_choice));
    }

    let retry = store.max_serial().await?.max(first_choice) + 1;
    if store.claim_serial(id, retry).await? {
        info!("Assigned serial {} to {} after retry", retry, id);
        return Ok(Some(retry));
    }

    warn!(
        "Serial allocation for {} lost twice ({} and {}); leaving unassigned",
        id, first_choice, retry
    );
    Ok(None)
}

/// Run `auto_assign` as a side effect; failures are logged and swallowed.
pub async fn assign_best_effort<S: SerialStore + ?Sized>(store: &S, id: &str) -> Option<u64> {
    match auto_assign(store, id).await {
        Ok(serial) => serial,
        Err(e) => {
            error!("Serial allocation failed for {}: {}", id, e);
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialAssignment {
    pub registration_id: String,
    pub serial_number: u64,
}

/// Result of a bulk assignment run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkAssignment {
    pub assigned: Vec<SerialAssignment>,
    /// Registrations that lost both attempts; a later run picks them up
    pub deferred: Vec<String>,
}

/// Give every registration without a serial one, oldest registration first
pub async fn assign_missing<S: SerialStore + ?Sized>(store: &S) -> Result<BulkAssignment> {
    let mut report = BulkAssignment::default();

    for id in store.unserialized_ids().await? {
        match auto_assign(store, &id).await? {
            Some(serial_number) => report.assigned.push(SerialAssignment {
                registration_id: id,
                serial_number,
            }),
            None => report.deferred.push(id),
        }
    }

    info!(
        "Bulk serial assignment: {} assigned, {} deferred",
        report.assigned.len(),
        report.deferred.len()
    );
    Ok(report)
}

/// Give a registration an explicit serial, replacing any it held
pub async fn assign_manual<S: SerialStore + ?Sized>(
    store: &S,
    id: &str,
    serial: u64,
) -> Result<SerialAssignment> {
    if serial == 0 {
        return Err(Error::validation("Serial number must be at least 1"));
    }

    let assignment = SerialAssignment {
        registration_id: id.to_string(),
        serial_number: serial,
    };

    if store.current_serial(id).await? == Some(serial) {
        return Ok(assignment);
    }

    if !store.claim_serial(id, serial).await? {
        return Err(Error::conflict(format!(
            "Serial number {} is already assigned",
            serial
        )));
    }

    info!("Manually assigned serial {} to {}", serial, id);
    Ok(assignment)
}
