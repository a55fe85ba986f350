use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use campus_notify::{DispatchError, DeliveryEvent, EmailPayload, Target};
use campus_types::api::{
    Claims, EmailOptOutRequest, MarkAllReadResponse, PublishRequest, PublishResponse,
    PublishTarget,
};
use campus_types::models::Notification;

use crate::auth::AppState;

/// Fixed page size for the notification list.
const PAGE_SIZE: u32 = 20;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    PAGE_SIZE
}

/// GET /notifications — the caller's records, plus system-wide records for
/// admins, newest first.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub.to_string();
    let is_admin = claims.is_admin();
    let limit = query.limit.min(PAGE_SIZE);

    let rows = tokio::task::spawn_blocking(move || db.list_notifications(&user_id, is_admin, limit))
        .await
        .map_err(internal)?
        .map_err(internal)?;

    // Corrupt rows are skipped, not fatal to the whole listing
    let notifications: Vec<Notification> = rows
        .into_iter()
        .filter_map(|row| match row.into_model() {
            Ok(n) => Some(n),
            Err(e) => {
                warn!("Skipping corrupt notification row: {}", e);
                None
            }
        })
        .collect();

    Ok(Json(notifications))
}

/// PUT /notifications/{id}/read — marks one record read.
///
/// 404 covers both "no such record" and "not visible to you"; the two are
/// deliberately indistinguishable. Re-marking a read record succeeds.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub.to_string();
    let is_admin = claims.is_admin();

    let row =
        tokio::task::spawn_blocking(move || db.mark_read(&id.to_string(), &user_id, is_admin))
            .await
            .map_err(internal)?
            .map_err(internal)?
            .ok_or(StatusCode::NOT_FOUND)?;

    let notification = row.into_model().map_err(internal)?;
    Ok(Json(notification))
}

/// PUT /notifications/read-all — one scoped bulk update; returns the count.
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub.to_string();
    let is_admin = claims.is_admin();

    let updated = tokio::task::spawn_blocking(move || db.mark_all_read(&user_id, is_admin))
        .await
        .map_err(internal)?
        .map_err(internal)?;

    Ok(Json(MarkAllReadResponse { updated }))
}

/// PUT /notifications/email-opt-out — toggle the caller's email preference.
pub async fn set_email_opt_out(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EmailOptOutRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub.to_string();

    let found = tokio::task::spawn_blocking(move || db.set_email_opt_out(&user_id, req.opt_out))
        .await
        .map_err(internal)?
        .map_err(internal)?;

    if !found {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /notifications — admin-only publish surface for announcements.
/// Domain handlers call the engine directly; this endpoint exists for
/// manually published notices.
pub async fn publish(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PublishRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if !claims.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }

    let target = match req.target {
        PublishTarget::User { id } => Target::User(id),
        PublishTarget::Users { ids } => Target::Users(ids),
        PublishTarget::Role { role } => Target::Role(role),
        PublishTarget::AllUsers => Target::AllUsers,
        PublishTarget::SystemWide => Target::SystemWide,
    };

    let email = req.email.map(|e| EmailPayload {
        subject: e.subject,
        title: e.title,
        body: e.body,
        action_link: e.action_link,
    });

    let report = state
        .engine
        .dispatch(DeliveryEvent {
            target,
            message: req.message,
            category: req.category,
            email,
        })
        .await
        .map_err(|e| match e {
            DispatchError::EmptyMessage => StatusCode::BAD_REQUEST,
            DispatchError::Resolution(_) | DispatchError::AllWritesFailed => {
                error!("Publish failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })?;

    Ok((
        StatusCode::CREATED,
        Json(PublishResponse {
            records_written: report.records_written,
            system_wide: report.system_wide,
        }),
    ))
}

fn internal<E: std::fmt::Display>(e: E) -> StatusCode {
    error!("Internal error: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}
