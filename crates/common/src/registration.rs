//! Registration record and its multi-step structured form

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::payment::PaymentStatus;

/// One page of the structured form, stored as a document sub-object so it can
/// be merged field by field.
pub type Section = Map<String, Value>;

/// Lower-cases and trims an email address for lookups and grouping.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Who is registering; staff skip one page of the form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationType {
    #[default]
    Alumni,
    Staff,
    Other,
}

impl RegistrationType {
    /// Step number that completes the form for this registrant type.
    pub fn final_step(self) -> u8 {
        match self {
            RegistrationType::Staff => 7,
            RegistrationType::Alumni | RegistrationType::Other => 8,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "alumni" => Some(RegistrationType::Alumni),
            "staff" => Some(RegistrationType::Staff),
            "other" => Some(RegistrationType::Other),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RegistrationType::Alumni => "Alumni",
            RegistrationType::Staff => "Staff",
            RegistrationType::Other => "Other",
        }
    }
}

/// The nine independently sanitizable sections of the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    PersonalInfo,
    Verification,
    Professional,
    EventAttendance,
    Sponsorship,
    Transportation,
    Accommodation,
    Optional,
    Financial,
}

impl SectionKind {
    pub const ALL: [SectionKind; 9] = [
        SectionKind::PersonalInfo,
        SectionKind::Verification,
        SectionKind::Professional,
        SectionKind::EventAttendance,
        SectionKind::Sponsorship,
        SectionKind::Transportation,
        SectionKind::Accommodation,
        SectionKind::Optional,
        SectionKind::Financial,
    ];

    /// JSON key of the section inside `formDataStructured`.
    pub fn key(self) -> &'static str {
        match self {
            SectionKind::PersonalInfo => "personalInfo",
            SectionKind::Verification => "verification",
            SectionKind::Professional => "professional",
            SectionKind::EventAttendance => "eventAttendance",
            SectionKind::Sponsorship => "sponsorship",
            SectionKind::Transportation => "transportation",
            SectionKind::Accommodation => "accommodation",
            SectionKind::Optional => "optional",
            SectionKind::Financial => "financial",
        }
    }
}

/// All multi-step answers of one registrant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredForm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_info: Option<Section>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<Section>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub professional: Option<Section>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_attendance: Option<Section>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sponsorship: Option<Section>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transportation: Option<Section>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accommodation: Option<Section>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<Section>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financial: Option<Section>,
}

impl StructuredForm {
    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        match kind {
            SectionKind::PersonalInfo => self.personal_info.as_ref(),
            SectionKind::Verification => self.verification.as_ref(),
            SectionKind::Professional => self.professional.as_ref(),
            SectionKind::EventAttendance => self.event_attendance.as_ref(),
            SectionKind::Sponsorship => self.sponsorship.as_ref(),
            SectionKind::Transportation => self.transportation.as_ref(),
            SectionKind::Accommodation => self.accommodation.as_ref(),
            SectionKind::Optional => self.optional.as_ref(),
            SectionKind::Financial => self.financial.as_ref(),
        }
    }

    pub fn section_slot(&mut self, kind: SectionKind) -> &mut Option<Section> {
        match kind {
            SectionKind::PersonalInfo => &mut self.personal_info,
            SectionKind::Verification => &mut self.verification,
            SectionKind::Professional => &mut self.professional,
            SectionKind::EventAttendance => &mut self.event_attendance,
            SectionKind::Sponsorship => &mut self.sponsorship,
            SectionKind::Transportation => &mut self.transportation,
            SectionKind::Accommodation => &mut self.accommodation,
            SectionKind::Optional => &mut self.optional,
            SectionKind::Financial => &mut self.financial,
        }
    }

    pub fn is_empty(&self) -> bool {
        SectionKind::ALL.iter().all(|k| self.section(*k).is_none())
    }

    /// Non-empty trimmed string field of a section.
    pub fn text(&self, kind: SectionKind, key: &str) -> Option<&str> {
        self.section(kind)?
            .get(key)?
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Numeric field of a section; numeric strings are accepted.
    pub fn number(&self, kind: SectionKind, key: &str) -> Option<f64> {
        match self.section(kind)?.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn flag(&self, kind: SectionKind, key: &str) -> Option<bool> {
        self.section(kind)?.get(key).and_then(flag_value)
    }
}

/// Yes/no answer as the form sends it. Booleans, "true"/"yes" and
/// "false"/"no" are read as such; null and blank count as no.
pub fn flag_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" | "" => Some(false),
            _ => None,
        },
        Value::Null => Some(false),
        _ => None,
    }
}

/// A registrant's record. Root fields mirror values from the structured form
/// for querying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: String,

    pub email: String,

    #[serde(default)]
    pub contact_number: String,

    /// Human-facing sequence number, assigned after creation
    #[serde(default)]
    pub serial_number: Option<u64>,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub school: String,

    #[serde(default)]
    pub country: String,

    #[serde(default)]
    pub year_of_passing: String,

    #[serde(default)]
    pub registration_type: RegistrationType,

    #[serde(default)]
    pub payment_status: PaymentStatus,

    #[serde(default)]
    pub email_verified: bool,

    #[serde(default)]
    pub is_attending: bool,

    #[serde(default)]
    pub will_contribute: bool,

    #[serde(default)]
    pub form_submission_complete: bool,

    pub current_step: u8,

    #[serde(default)]
    pub highest_step_reached: u8,

    pub registration_date: DateTime<Utc>,

    pub last_updated: DateTime<Utc>,

    #[serde(default)]
    pub form_data_structured: StructuredForm,
}

impl Registration {
    /// Create a fresh step-1 record
    pub fn new(email: &str, contact_number: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            email: normalize_email(email),
            contact_number: contact_number.trim().to_string(),
            serial_number: None,
            name: String::new(),
            school: String::new(),
            country: String::new(),
            year_of_passing: String::new(),
            registration_type: RegistrationType::default(),
            payment_status: PaymentStatus::default(),
            email_verified: false,
            is_attending: false,
            will_contribute: false,
            form_submission_complete: false,
            current_step: 1,
            highest_step_reached: 1,
            registration_date: now,
            last_updated: now,
            form_data_structured: StructuredForm::default(),
        }
    }

    /// Copy query fields from the structured form onto the root.
    pub fn refresh_denormalized(&mut self) {
        let form = &self.form_data_structured;
        let personal = SectionKind::PersonalInfo;

        if let Some(name) = form.text(personal, "name") {
            self.name = name.to_string();
        }
        if let Some(school) = form.text(personal, "school") {
            self.school = school.to_string();
        }
        if let Some(country) = form.text(personal, "country") {
            self.country = country.to_string();
        }
        if let Some(year) = form.text(personal, "yearOfPassing") {
            self.year_of_passing = year.to_string();
        } else if let Some(year) = form.number(personal, "yearOfPassing") {
            self.year_of_passing = format!("{}", year as i64);
        }
        if let Some(contact) = form.text(personal, "contactNumber") {
            self.contact_number = contact.to_string();
        }
        if let Some(kind) = form
            .text(personal, "registrationType")
            .and_then(RegistrationType::parse)
        {
            self.registration_type = kind;
        }
        if let Some(status) = form
            .text(SectionKind::Financial, "paymentStatus")
            .and_then(|s| s.parse::<PaymentStatus>().ok())
        {
            self.payment_status = status;
        }
        if let Some(attending) = form.flag(SectionKind::EventAttendance, "isAttending") {
            self.is_attending = attending;
        }

        let sponsoring = form
            .flag(SectionKind::Sponsorship, "interestedInSponsorship")
            .unwrap_or(false);
        self.will_contribute = sponsoring || self.contribution_amount() > 0.0;
    }

    pub fn contribution_amount(&self) -> f64 {
        self.form_data_structured
            .number(SectionKind::Financial, "contributionAmount")
            .unwrap_or(0.0)
    }

    pub fn final_step(&self) -> u8 {
        self.registration_type.final_step()
    }

    /// Head count across every attendee bucket of the attendance section.
    pub fn attendee_count(&self) -> u64 {
        let Some(attendees) = self
            .form_data_structured
            .section(SectionKind::EventAttendance)
            .and_then(|s| s.get("attendees"))
            .and_then(Value::as_object)
        else {
            return 0;
        };

        attendees
            .values()
            .filter_map(Value::as_object)
            .flat_map(|group| group.values())
            .filter_map(Value::as_u64)
            .sum()
    }
}
