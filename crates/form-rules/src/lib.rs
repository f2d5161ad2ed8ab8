//! Registration form rules
//!
//! Pure business rules over the structured registration form. Nothing in this
//! crate performs I/O; the registration service calls into it and persists
//! the results.
//!
//! - `sanitize`: clears fields made inapplicable by sibling answers
//! - `merge`: field-level merge of a step payload into a stored form
//! - `duplicates`: keep/delete planning for registrations sharing an email

mod fields;

pub mod duplicates;
pub mod merge;
pub mod sanitize;

pub use duplicates::{group_by_email, plan_all, plan_group, GroupPlan, RecordSummary, StatusClass};
pub use merge::{merge_forms, merge_section};
pub use sanitize::{
    accommodation_template, sanitize_form, sanitize_section, transportation_template,
};
