// Admin console handlers: inventory and section management, uploads, notices

use std::convert::Infallible;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json,
    },
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::{
    content::Direction,
    error::AppError,
    filter::{Criteria, CriteriaQuery},
    inventory,
    models::{Section, SectionEdit, SectionForm, Vehicle, VehicleForm, VehiclePatch},
    AppState,
};

use super::GenericResponse;

// --- Request / Response Structs ---

#[derive(Deserialize, Debug)]
pub struct MoveRequest {
    direction: Direction,
}

#[derive(Deserialize, Debug)]
pub struct UploadQuery {
    path: String,
}

#[derive(Serialize)]
pub struct UploadResponse {
    success: bool,
    url: String,
}

// --- Vehicles ---

pub async fn list_vehicles(
    State(app_state): State<AppState>,
    Query(query): Query<CriteriaQuery>,
) -> Result<Json<Vec<Vehicle>>, AppError> {
    tracing::info!("[HANDLER] /api/admin/vehicles - Request received: {:?}", query);
    let criteria = Criteria::try_from(query)?;
    Ok(Json(app_state.inventory.search(&criteria).await))
}

pub async fn create_vehicle(
    State(app_state): State<AppState>,
    Json(form): Json<VehicleForm>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(
        "[HANDLER] POST /api/admin/vehicles - {} {} (auto_tag: {})",
        form.make,
        form.model,
        form.auto_tag
    );
    let vehicle = app_state.inventory.create(form).await?;
    Ok((StatusCode::CREATED, Json(vehicle)))
}

pub async fn update_vehicle(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<VehiclePatch>,
) -> Result<Json<Vehicle>, AppError> {
    tracing::info!("[HANDLER] PATCH /api/admin/vehicles/{} - Request received.", id);
    Ok(Json(app_state.inventory.update(&id, patch).await?))
}

pub async fn retag_vehicle(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vehicle>, AppError> {
    tracing::info!("[HANDLER] POST /api/admin/vehicles/{}/retag - Request received.", id);
    Ok(Json(app_state.inventory.retag(&id).await?))
}

pub async fn delete_vehicle(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<GenericResponse>, AppError> {
    tracing::info!("[HANDLER] DELETE /api/admin/vehicles/{} - Request received.", id);
    app_state.inventory.delete(&id).await?;
    Ok(Json(GenericResponse::ok("Vehicle deleted", Some(id))))
}

pub async fn export_vehicles(
    State(app_state): State<AppState>,
    Query(query): Query<CriteriaQuery>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("[HANDLER] /api/admin/vehicles/export - Request received: {:?}", query);
    let criteria = Criteria::try_from(query)?;
    let vehicles = app_state.inventory.search(&criteria).await;
    let body = inventory::export_csv(&vehicles)?;
    tracing::info!("[HANDLER] /api/admin/vehicles/export - Exported {} vehicles.", vehicles.len());
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"inventory.csv\""),
        ],
        body,
    ))
}

// --- Sections ---

pub async fn list_sections(State(app_state): State<AppState>) -> Json<Vec<Section>> {
    tracing::info!("[HANDLER] /api/admin/sections - Request received.");
    Json(app_state.content.sections().await)
}

pub async fn create_section(
    State(app_state): State<AppState>,
    Json(form): Json<SectionForm>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("[HANDLER] POST /api/admin/sections - type: {}", form.section_type);
    let section = app_state.content.create_section(form).await?;
    Ok((StatusCode::CREATED, Json(section)))
}

pub async fn update_section(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Json(edit): Json<SectionEdit>,
) -> Result<Json<Section>, AppError> {
    tracing::info!("[HANDLER] PATCH /api/admin/sections/{} - Request received.", id);
    Ok(Json(app_state.content.update_section(&id, edit).await?))
}

pub async fn delete_section(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<GenericResponse>, AppError> {
    tracing::info!("[HANDLER] DELETE /api/admin/sections/{} - Request received.", id);
    app_state.content.delete_section(&id).await?;
    Ok(Json(GenericResponse::ok("Section deleted", Some(id))))
}

pub async fn move_section(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<MoveRequest>,
) -> Result<Json<Vec<Section>>, AppError> {
    tracing::info!("[HANDLER] POST /api/admin/sections/{}/move - {:?}", id, request.direction);
    Ok(Json(app_state.content.move_section(&id, request.direction).await?))
}

// --- Uploads ---

pub async fn upload_image(
    State(app_state): State<AppState>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream");
    tracing::info!(
        "[HANDLER] /api/admin/uploads - {} ({}, {} bytes)",
        query.path,
        content_type,
        body.len()
    );
    let url = app_state
        .content
        .upload_image(&query.path, content_type, body.to_vec())
        .await?;
    Ok(Json(UploadResponse { success: true, url }))
}

// --- Notices ---

// Editor toasts as server-sent events; slow clients skip what they missed
pub async fn notices(
    State(app_state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!("[HANDLER] /api/admin/notices - Client subscribed.");
    let receiver = app_state.notices.subscribe();
    let events = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(notice) => {
                    let event = Event::default()
                        .event("notice")
                        .json_data(&notice)
                        .unwrap_or_else(|_| Event::default().comment("unencodable notice"));
                    return Some((Ok(event), receiver));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "[HANDLER] /api/admin/notices - Client lagged, skipped {} notices.",
                        skipped
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}
