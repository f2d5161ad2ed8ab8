//! Request-independent operations behind the HTTP handlers
//!
//! Services take the application state (or the narrow store trait they need)
//! and return `reunion_common::Result`; the handlers only translate to HTTP.

pub mod admin;
pub mod contact;
pub mod dedupe;
pub mod otp;
pub mod payments;
pub mod serial;
pub mod steps;
