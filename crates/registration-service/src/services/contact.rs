//! Contact messages from the public site and the admin inbox

use chrono::Utc;
use reunion_common::{
    AdminContext, AdminNote, ContactCategory, ContactMessage, ContactPriority, ContactStatus,
    Error, ResponseData, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::{notify::templates, AppState};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub subject: String,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub category: Option<ContactCategory>,

    #[serde(default)]
    pub priority: Option<ContactPriority>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageFilter {
    #[serde(default)]
    pub status: Option<ContactStatus>,

    #[serde(default)]
    pub category: Option<ContactCategory>,

    #[serde(default)]
    pub priority: Option<ContactPriority>,
}

impl MessageFilter {
    fn accepts(&self, message: &ContactMessage) -> bool {
        self.status.map_or(true, |s| s == message.status)
            && self.category.map_or(true, |c| c == message.category)
            && self.priority.map_or(true, |p| p == message.priority)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
}

fn required(value: &str, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn require_modify(ctx: &AdminContext) -> Result<()> {
    if ctx.can_modify() {
        Ok(())
    } else {
        Err(Error::Forbidden("Read-only admins cannot modify messages".to_string()))
    }
}

async fn load(state: &AppState, id: &str) -> Result<ContactMessage> {
    state
        .store
        .get_message(id)
        .await?
        .ok_or_else(|| Error::not_found("Message not found"))
}

/// Store a message sent through the public contact form
pub async fn create_message(state: &AppState, request: &NewMessage) -> Result<ContactMessage> {
    let email = required(&request.email, "Email")?;
    if !email.contains('@') {
        return Err(Error::validation("Invalid email address"));
    }

    let message = ContactMessage::new(
        request.name.trim().to_string(),
        email,
        required(&request.subject, "Subject")?,
        required(&request.message, "Message")?,
        request.category,
        request.priority,
    );
    state.store.create_message(&message).await?;

    info!(
        "Contact message {} received ({}, {:?})",
        message.id,
        message.category.as_str(),
        message.priority
    );
    Ok(message)
}

/// Inbox listing, newest first
pub async fn list_messages(
    state: &AppState,
    ctx: &AdminContext,
    filter: &MessageFilter,
) -> Result<Vec<ContactMessage>> {
    let mut messages: Vec<ContactMessage> = state
        .store
        .list_messages()
        .await?
        .into_iter()
        .filter(|m| filter.accepts(m))
        .collect();
    messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    debug!("{} listed {} contact messages", ctx.admin_id, messages.len());
    Ok(messages)
}

/// Open a message; a new message is marked read when the admin can modify
pub async fn get_message(state: &AppState, ctx: &AdminContext, id: &str) -> Result<ContactMessage> {
    let mut message = load(state, id).await?;
    if message.status == ContactStatus::New && ctx.can_modify() {
        message.status = ContactStatus::Read;
        message.updated_at = Utc::now();
        state.store.save_message(&message).await?;
    }
    Ok(message)
}

pub async fn update_status(
    state: &AppState,
    ctx: &AdminContext,
    id: &str,
    status: ContactStatus,
) -> Result<ContactMessage> {
    require_modify(ctx)?;
    let mut message = load(state, id).await?;

    if !message.status.can_transition_to(status) {
        return Err(Error::validation(format!(
            "Cannot move a message from {} to {}",
            message.status.as_str(),
            status.as_str()
        )));
    }

    message.status = status;
    message.updated_at = Utc::now();
    state.store.save_message(&message).await?;

    info!("{} set message {} to {}", ctx.admin_id, id, status.as_str());
    Ok(message)
}

pub async fn add_note(
    state: &AppState,
    ctx: &AdminContext,
    id: &str,
    note: &str,
) -> Result<ContactMessage> {
    require_modify(ctx)?;
    let note = required(note, "Note")?;
    let mut message = load(state, id).await?;

    let now = Utc::now();
    message.admin_notes.push(AdminNote {
        note,
        added_by: ctx.admin_id.clone(),
        added_at: now,
    });
    message.updated_at = now;
    state.store.save_message(&message).await?;

    Ok(message)
}

/// Record a response, mark the message responded and email the sender
pub async fn respond(
    state: &AppState,
    ctx: &AdminContext,
    id: &str,
    response: &str,
) -> Result<ContactMessage> {
    require_modify(ctx)?;
    let response = required(response, "Response")?;
    let mut message = load(state, id).await?;

    if !message.status.can_transition_to(ContactStatus::Responded) {
        return Err(Error::validation(format!(
            "Cannot respond to a message that is {}",
            message.status.as_str()
        )));
    }

    let now = Utc::now();
    message.response_data = Some(ResponseData {
        message: response.clone(),
        responded_by: ctx.admin_id.clone(),
        responded_at: now,
    });
    message.status = ContactStatus::Responded;
    message.updated_at = now;
    state.store.save_message(&message).await?;

    let content = templates::contact_response(&state.settings.event_name, &message, &response);
    if let Err(e) = state
        .notifier
        .send_email(&message.email, &content.subject, &content.text)
        .await
    {
        warn!("Response email for message {} failed: {}", message.id, e);
    }

    info!("{} responded to message {}", ctx.admin_id, id);
    Ok(message)
}

pub async fn stats(state: &AppState, ctx: &AdminContext) -> Result<ContactStats> {
    let messages = state.store.list_messages().await?;

    let mut stats = ContactStats {
        total: messages.len(),
        by_status: ContactStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect(),
        by_category: BTreeMap::new(),
    };
    for message in &messages {
        *stats
            .by_status
            .entry(message.status.as_str().to_string())
            .or_default() += 1;
        *stats
            .by_category
            .entry(message.category.as_str().to_string())
            .or_default() += 1;
    }

    debug!("{} read contact stats", ctx.admin_id);
    Ok(stats)
}
