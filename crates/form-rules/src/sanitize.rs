//! Server-side sanitization of the structured registration form
//!
//! The public form reveals and hides fields as answers change, and users can
//! navigate back. Each rule here looks at one section only and resets the
//! fields whose controlling answer makes them inapplicable. A rule fires only
//! when its controlling field is present in the section, so a partial step
//! payload is never wiped before it is merged into the stored record.
//!
//! Every function is pure and idempotent: `sanitize(sanitize(x)) == sanitize(x)`.

use reunion_common::{Section, SectionKind, StructuredForm};
use serde_json::{json, Value};

use crate::fields::{flag, list, object, reset, text};

/// Modes of transport that can offer a shared ride or need parking.
const SHARED_RIDE_MODES: [&str; 3] = ["car", "two-wheeler", "bus"];

const LOOKING_FOR_TRANSPORT: &str = "looking-for-transport";

const BUSINESS_OWNER: &str = "Business Owner/Entrepreneur";

const FINANCIAL_DIFFICULTY: &str = "financial-difficulty";

const TSHIRT_SIZES: [&str; 7] = ["XS", "S", "M", "L", "XL", "XXL", "XXXL"];

const ATTENDEE_GROUPS: [&str; 4] = ["adults", "teens", "children", "toddlers"];

/// Sanitize every present section of a form.
pub fn sanitize_form(form: &StructuredForm) -> StructuredForm {
    let mut out = StructuredForm::default();
    for kind in SectionKind::ALL {
        *out.section_slot(kind) = sanitize_section(kind, form.section(kind));
    }
    out
}

/// Sanitize one section. `None` passes through unchanged.
pub fn sanitize_section(kind: SectionKind, section: Option<&Section>) -> Option<Section> {
    let mut section = section?.clone();
    match kind {
        SectionKind::PersonalInfo => personal_info(&mut section),
        SectionKind::EventAttendance => event_attendance(&mut section),
        SectionKind::Sponsorship => sponsorship(&mut section),
        SectionKind::Transportation => transportation(&mut section),
        SectionKind::Accommodation => accommodation(&mut section),
        SectionKind::Optional => optional(&mut section),
        SectionKind::Professional => professional(&mut section),
        SectionKind::Financial => financial(&mut section),
        SectionKind::Verification => {}
    }
    Some(section)
}

fn personal_info(s: &mut Section) {
    let Some(country) = text(s, "country") else {
        return;
    };

    if country != "IN" {
        reset(s, vec![("stateUT", json!("")), ("district", json!(""))]);
    } else if text(s, "stateUT").is_some_and(|state| state != "Kerala") {
        reset(s, vec![("district", json!(""))]);
    }
}

fn empty_attendees() -> Value {
    let mut groups = serde_json::Map::new();
    for group in ATTENDEE_GROUPS {
        groups.insert(group.to_string(), json!({ "veg": 0, "nonVeg": 0 }));
    }
    Value::Object(groups)
}

fn event_attendance(s: &mut Section) {
    if flag(s, "isAttending") == Some(false) {
        reset(
            s,
            vec![
                ("attendees", empty_attendees()),
                ("eventParticipation", json!([])),
                ("participationDetails", json!("")),
            ],
        );
    }
}

fn sponsorship(s: &mut Section) {
    if flag(s, "interestedInSponsorship") == Some(false) {
        reset(
            s,
            vec![
                ("sponsorshipTier", json!("")),
                ("sponsorshipDetails", json!("")),
            ],
        );
    }
}

/// Everything a non-travelling registrant's transportation section holds.
pub fn transportation_template() -> Section {
    object(json!({
        "isTravelling": false,
        "twoSegmentTravel": false,
        "firstSegmentOrigin": "",
        "firstSegmentMode": "",
        "firstSegmentArrival": "",
        "origin": "",
        "pickupLocation": "",
        "travelDate": "",
        "arrivalTime": "",
        "returnDate": "",
        "modeOfTransport": "",
        "needParking": false,
        "connectWithAlumni": false,
        "readyForRideShare": false,
        "rideShareCapacity": 0,
        "groupSize": 1,
        "specialRequirements": "",
        "travelNotes": ""
    }))
}

fn transportation(s: &mut Section) {
    if flag(s, "isTravelling") == Some(false) {
        *s = transportation_template();
        return;
    }

    if flag(s, "twoSegmentTravel") == Some(false) {
        reset(
            s,
            vec![
                ("firstSegmentOrigin", json!("")),
                ("firstSegmentMode", json!("")),
                ("firstSegmentArrival", json!("")),
            ],
        );
    }

    if let Some(mode) = text(s, "modeOfTransport").map(str::to_string) {
        if !SHARED_RIDE_MODES.contains(&mode.as_str()) {
            reset(
                s,
                vec![
                    ("needParking", json!(false)),
                    ("connectWithAlumni", json!(false)),
                    ("readyForRideShare", json!(false)),
                    ("rideShareCapacity", json!(0)),
                ],
            );
        }
        if mode != LOOKING_FOR_TRANSPORT {
            reset(s, vec![("groupSize", json!(1))]);
        }
    }

    if flag(s, "connectWithAlumni") == Some(false) {
        reset(
            s,
            vec![
                ("readyForRideShare", json!(false)),
                ("rideShareCapacity", json!(0)),
            ],
        );
    }

    if flag(s, "readyForRideShare") == Some(false) {
        reset(s, vec![("rideShareCapacity", json!(0))]);
    }
}

fn provide_fields() -> Vec<(&'static str, Value)> {
    vec![
        ("accommodationCapacity", json!(0)),
        ("accommodationLocation", json!("")),
        ("accommodationAddress", json!("")),
        ("hostContactNumber", json!("")),
    ]
}

fn need_fields() -> Vec<(&'static str, Value)> {
    vec![
        ("guestCount", json!(0)),
        ("stayPreference", json!("")),
        ("needDetails", json!("")),
    ]
}

fn hotel_fields() -> Vec<(&'static str, Value)> {
    vec![
        ("hotelPreference", json!("")),
        ("roomsRequired", json!(0)),
        (
            "hotelRequirements",
            json!({ "roomType": "", "budgetRange": "", "amenities": [] }),
        ),
    ]
}

fn stay_fields() -> Vec<(&'static str, Value)> {
    vec![
        ("checkInDate", json!("")),
        ("checkOutDate", json!("")),
        ("specialRequests", json!("")),
    ]
}

/// Everything a registrant without accommodation plans holds.
pub fn accommodation_template() -> Section {
    let mut s = object(json!({ "planAccommodation": false, "accommodation": "" }));
    reset(&mut s, provide_fields());
    reset(&mut s, need_fields());
    reset(&mut s, hotel_fields());
    reset(&mut s, stay_fields());
    s
}

fn accommodation(s: &mut Section) {
    if flag(s, "planAccommodation") == Some(false) {
        *s = accommodation_template();
        return;
    }

    let Some(kind) = text(s, "accommodation").map(str::to_string) else {
        return;
    };

    match kind.as_str() {
        "not-required" => {
            reset(s, provide_fields());
            reset(s, need_fields());
            reset(s, hotel_fields());
            reset(s, stay_fields());
        }
        "provide" => {
            reset(s, need_fields());
            reset(s, hotel_fields());
        }
        "need" => {
            reset(s, provide_fields());
            reset(s, hotel_fields());
        }
        "discount-hotel" => {
            reset(s, provide_fields());
            reset(s, need_fields());
        }
        _ => {
            reset(s, provide_fields());
            reset(s, need_fields());
            reset(s, hotel_fields());
        }
    }
}

fn optional(s: &mut Section) {
    let Some(interest) = text(s, "tshirtInterest") else {
        return;
    };
    if interest != "yes" {
        let sizes: serde_json::Map<String, Value> = TSHIRT_SIZES
            .iter()
            .map(|size| (size.to_string(), json!(0)))
            .collect();
        reset(s, vec![("tshirtSizes", Value::Object(sizes))]);
    }
}

fn professional(s: &mut Section) {
    let Some(professions) = list(s, "profession") else {
        return;
    };

    let student_only = professions.is_empty() || professions == ["Student"];
    if student_only {
        reset(
            s,
            vec![
                ("businessDetails", json!({})),
                ("professionalDetails", json!({})),
            ],
        );
    } else if !professions.iter().any(|p| p == BUSINESS_OWNER) {
        reset(s, vec![("businessDetails", json!({}))]);
    }
}

fn financial(s: &mut Section) {
    if text(s, "paymentStatus") == Some(FINANCIAL_DIFFICULTY) {
        reset(
            s,
            vec![("contributionAmount", json!(0)), ("proposedAmount", json!(0))],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_have_documented_shape() {
        assert_eq!(transportation_template().len(), 18);
        // 14 flat fields plus the nested hotel requirements
        assert_eq!(accommodation_template().len(), 15);
        assert!(accommodation_template()["hotelRequirements"].is_object());
    }

    #[test]
    fn test_none_passes_through() {
        assert_eq!(sanitize_section(SectionKind::Financial, None), None);
    }

    #[test]
    fn test_missing_controlling_field_leaves_section_alone() {
        let section = object(json!({ "attendees": { "adults": { "veg": 3, "nonVeg": 0 } } }));
        let out = sanitize_section(SectionKind::EventAttendance, Some(&section)).unwrap();
        assert_eq!(out, section);
    }
}
