//! Contact form and admin inbox endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use reunion_common::{ContactMessage, ContactStatus};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    error::{success, success_with_message, ApiError, Envelope},
    extract::Admin,
    services::contact::{self, ContactStats, MessageFilter, NewMessage},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: ContactStatus,
}

#[derive(Debug, Deserialize)]
pub struct NoteRequest {
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    #[serde(default)]
    pub message: String,
}

/// Public contact form submission
pub async fn create_message_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewMessage>,
) -> Result<Json<Envelope<ContactMessage>>, ApiError> {
    let message = contact::create_message(&state, &payload).await?;
    Ok(success_with_message(
        message,
        "Thank you for your message. We will get back to you soon",
    ))
}

pub async fn list_messages_handler(
    State(state): State<Arc<AppState>>,
    Admin(ctx): Admin,
    Query(filter): Query<MessageFilter>,
) -> Result<Json<Envelope<Vec<ContactMessage>>>, ApiError> {
    let messages = contact::list_messages(&state, &ctx, &filter).await?;
    Ok(success(messages))
}

pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Admin(ctx): Admin,
) -> Result<Json<Envelope<ContactStats>>, ApiError> {
    let stats = contact::stats(&state, &ctx).await?;
    Ok(success(stats))
}

pub async fn get_message_handler(
    State(state): State<Arc<AppState>>,
    Admin(ctx): Admin,
    Path(id): Path<String>,
) -> Result<Json<Envelope<ContactMessage>>, ApiError> {
    let message = contact::get_message(&state, &ctx, &id).await?;
    Ok(success(message))
}

pub async fn update_status_handler(
    State(state): State<Arc<AppState>>,
    Admin(ctx): Admin,
    Path(id): Path<String>,
    Json(payload): Json<StatusUpdate>,
) -> Result<Json<Envelope<ContactMessage>>, ApiError> {
    let message = contact::update_status(&state, &ctx, &id, payload.status).await?;
    Ok(success(message))
}

pub async fn add_note_handler(
    State(state): State<Arc<AppState>>,
    Admin(ctx): Admin,
    Path(id): Path<String>,
    Json(payload): Json<NoteRequest>,
) -> Result<Json<Envelope<ContactMessage>>, ApiError> {
    let message = contact::add_note(&state, &ctx, &id, &payload.note).await?;
    Ok(success(message))
}

pub async fn respond_handler(
    State(state): State<Arc<AppState>>,
    Admin(ctx): Admin,
    Path(id): Path<String>,
    Json(payload): Json<RespondRequest>,
) -> Result<Json<Envelope<ContactMessage>>, ApiError> {
    let message = contact::respond(&state, &ctx, &id, &payload.message).await?;
    Ok(success_with_message(message, "Response sent"))
}
