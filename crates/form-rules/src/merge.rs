//! Field-level merge of a step payload into a stored form

use reunion_common::{Section, SectionKind, StructuredForm};

/// Server-owned financial key that step payloads can never write.
const PAYMENT_HISTORY: &str = "paymentHistory";

/// Merge `incoming` into `existing` section by section.
///
/// Keys present in an incoming section overwrite the stored ones; keys it
/// omits are kept; sections missing from the payload are kept whole.
pub fn merge_forms(existing: &StructuredForm, incoming: &StructuredForm) -> StructuredForm {
    let mut merged = StructuredForm::default();
    for kind in SectionKind::ALL {
        *merged.section_slot(kind) =
            merge_section(kind, existing.section(kind), incoming.section(kind));
    }
    merged
}

pub fn merge_section(
    kind: SectionKind,
    existing: Option<&Section>,
    incoming: Option<&Section>,
) -> Option<Section> {
    let mut merged = match (existing, incoming) {
        (None, None) => return None,
        (Some(old), None) => return Some(old.clone()),
        (None, Some(new)) => new.clone(),
        (Some(old), Some(new)) => {
            let mut merged = old.clone();
            for (key, value) in new {
                merged.insert(key.clone(), value.clone());
            }
            merged
        }
    };

    if kind == SectionKind::Financial {
        match existing.and_then(|old| old.get(PAYMENT_HISTORY)) {
            Some(history) => {
                merged.insert(PAYMENT_HISTORY.to_string(), history.clone());
            }
            None => {
                merged.remove(PAYMENT_HISTORY);
            }
        }
    }

    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn section(value: Value) -> Section {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_field_level_merge_keeps_absent_keys() {
        let mut existing = StructuredForm::default();
        existing.professional = Some(section(json!({ "a": 1, "b": 2 })));
        let mut incoming = StructuredForm::default();
        incoming.professional = Some(section(json!({ "b": 3 })));

        let merged = merge_forms(&existing, &incoming);

        assert_eq!(merged.professional, Some(section(json!({ "a": 1, "b": 3 }))));
    }

    #[test]
    fn test_sections_absent_from_payload_are_kept() {
        let mut existing = StructuredForm::default();
        existing.sponsorship = Some(section(json!({ "interestedInSponsorship": true })));
        let mut incoming = StructuredForm::default();
        incoming.optional = Some(section(json!({ "tshirtInterest": "yes" })));

        let merged = merge_forms(&existing, &incoming);

        assert_eq!(merged.sponsorship, existing.sponsorship);
        assert_eq!(merged.optional, incoming.optional);
        assert!(merged.transportation.is_none());
    }

    #[test]
    fn test_payment_history_cannot_be_overwritten() {
        let mut existing = StructuredForm::default();
        existing.financial = Some(section(json!({
            "contributionAmount": 500,
            "paymentHistory": [{ "amount": 500, "transactionId": "TXN-1" }]
        })));
        let mut incoming = StructuredForm::default();
        incoming.financial = Some(section(json!({
            "contributionAmount": 700,
            "paymentHistory": []
        })));

        let merged = merge_forms(&existing, &incoming);
        let financial = merged.financial.unwrap();

        assert_eq!(financial["contributionAmount"], 700);
        assert_eq!(financial["paymentHistory"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_client_history_dropped_on_first_write() {
        let incoming = section(json!({ "paymentHistory": [{ "amount": 1 }] }));
        let merged = merge_section(SectionKind::Financial, None, Some(&incoming)).unwrap();
        assert!(merged.get("paymentHistory").is_none());
    }
}
