//! Shared domain model for the alumni event registration backend.
//!
//! Both the pure rules crate and the REST service build on these types.

pub mod admin;
pub mod contact;
pub mod error;
pub mod otp;
pub mod payment;
pub mod registration;

pub use admin::{AdminContext, AdminRole};
pub use contact::{
    AdminNote, ContactCategory, ContactMessage, ContactPriority, ContactStatus, ResponseData,
};
pub use error::{Error, Result};
pub use otp::{generate_otp, OtpVerification};
pub use payment::{
    generate_transaction_id, PaymentRecord, PaymentStatus, Transaction, TransactionStatus,
};
pub use registration::{
    flag_value, normalize_email, Registration, RegistrationType, Section, SectionKind,
    StructuredForm,
};
