//! Plain-text message templates

use reunion_common::{ContactMessage, Registration, Transaction};

/// Subject and body of an outgoing email
pub struct EmailContent {
    pub subject: String,
    pub text: String,
}

fn greeting(name: &str) -> String {
    if name.trim().is_empty() {
        "Hello,".to_string()
    } else {
        format!("Dear {},", name.trim())
    }
}

pub fn otp_email(event_name: &str, otp: &str, expiry_minutes: i64) -> EmailContent {
    EmailContent {
        subject: format!("{} registration: your verification code", event_name),
        text: format!(
            r#"Hello,

Your verification code for {} registration is: {}

This code will expire in {} minutes.

If you didn't request this code, please ignore this email."#,
            event_name, otp, expiry_minutes
        ),
    }
}

pub fn registration_confirmation(event_name: &str, registration: &Registration) -> EmailContent {
    let serial = registration
        .serial_number
        .map(|n| format!("Your registration number is {}.\n\n", n))
        .unwrap_or_default();

    EmailContent {
        subject: format!("{} registration confirmed", event_name),
        text: format!(
            r#"{}

Thank you for registering for {}.

{}Payment status: {}
Attendees: {}

We look forward to seeing you."#,
            greeting(&registration.name),
            event_name,
            serial,
            registration.payment_status,
            registration.attendee_count()
        ),
    }
}

pub fn payment_receipt(
    event_name: &str,
    registration: &Registration,
    transaction: &Transaction,
) -> EmailContent {
    EmailContent {
        subject: format!("{} payment received", event_name),
        text: format!(
            r#"{}

We have received your payment of {:.2} for {}.

Transaction ID: {}
Total contribution: {:.2}

Thank you for your support."#,
            greeting(&registration.name),
            transaction.amount,
            event_name,
            transaction.transaction_id,
            registration.contribution_amount()
        ),
    }
}

pub fn contact_response(event_name: &str, message: &ContactMessage, response: &str) -> EmailContent {
    EmailContent {
        subject: format!("Re: {}", message.subject),
        text: format!(
            r#"{}

{}

--
{} organising team

> {}"#,
            greeting(&message.name),
            response,
            event_name,
            message.message.replace('\n', "\n> ")
        ),
    }
}
