// Autosave editor handlers. Every response is the editor snapshot, so the
// front-end can render the saving/saved/failed indicator from one payload.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde_json::{Map, Value};

use crate::{
    autosave::{EditorError, EditorSnapshot},
    error::AppError,
    models::{Section, SectionEdit, SiteSettings},
    AppState,
};

use super::GenericResponse;

type SectionSnapshot = Json<EditorSnapshot<Section>>;
type SettingsSnapshot = Json<EditorSnapshot<SiteSettings>>;

// --- Sections ---

pub async fn open_section(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<SectionSnapshot, AppError> {
    tracing::info!("[HANDLER] POST /api/admin/editor/sections/{} - Opening editor.", id);
    Ok(Json(app_state.section_editor.open(&id).await?))
}

pub async fn section_snapshot(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<SectionSnapshot, AppError> {
    tracing::debug!("[HANDLER] GET /api/admin/editor/sections/{}", id);
    Ok(Json(app_state.section_editor.snapshot(&id).await?))
}

pub async fn edit_section(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Json(edit): Json<SectionEdit>,
) -> Result<SectionSnapshot, AppError> {
    tracing::debug!("[HANDLER] PATCH /api/admin/editor/sections/{} - {:?}", id, edit);
    let snapshot = app_state
        .section_editor
        .edit(&id, move |section: &mut Section| {
            edit.apply(section).map_err(|e| format!("invalid content: {}", e))?;
            if section.title.trim().is_empty() {
                return Err("title is required".to_string());
            }
            Ok(())
        })
        .await?;
    Ok(Json(snapshot))
}

pub async fn retry_section(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<SectionSnapshot, AppError> {
    tracing::info!("[HANDLER] POST /api/admin/editor/sections/{}/retry", id);
    Ok(Json(app_state.section_editor.retry(&id).await?))
}

pub async fn discard_section(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<SectionSnapshot, AppError> {
    tracing::info!("[HANDLER] POST /api/admin/editor/sections/{}/discard", id);
    Ok(Json(app_state.section_editor.discard(&id).await?))
}

pub async fn close_section(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<GenericResponse>, AppError> {
    tracing::info!("[HANDLER] DELETE /api/admin/editor/sections/{} - Closing editor.", id);
    app_state.section_editor.close(&id).await?;
    Ok(Json(GenericResponse::ok("Editor closed", Some(id))))
}

// --- Site settings (single row, so no id in the path) ---

async fn open_settings_id(app_state: &AppState) -> Result<String, AppError> {
    app_state
        .settings_editor
        .active_id()
        .await
        .ok_or_else(|| EditorError::NotOpen("settings".to_string()).into())
}

pub async fn open_settings(
    State(app_state): State<AppState>,
) -> Result<SettingsSnapshot, AppError> {
    tracing::info!("[HANDLER] POST /api/admin/editor/settings - Opening editor.");
    let settings = app_state.content.ensure_settings().await?;
    Ok(Json(app_state.settings_editor.open(&settings.id).await?))
}

pub async fn settings_snapshot(
    State(app_state): State<AppState>,
) -> Result<SettingsSnapshot, AppError> {
    let id = open_settings_id(&app_state).await?;
    Ok(Json(app_state.settings_editor.snapshot(&id).await?))
}

pub async fn edit_settings(
    State(app_state): State<AppState>,
    Json(patch): Json<Map<String, Value>>,
) -> Result<SettingsSnapshot, AppError> {
    let keys: Vec<_> = patch.keys().collect();
    tracing::debug!("[HANDLER] PATCH /api/admin/editor/settings - keys: {:?}", keys);
    let id = open_settings_id(&app_state).await?;
    let snapshot = app_state
        .settings_editor
        .edit(&id, move |settings: &mut SiteSettings| {
            settings.merge(patch).map_err(|e| format!("invalid settings: {}", e))
        })
        .await?;
    Ok(Json(snapshot))
}

pub async fn retry_settings(
    State(app_state): State<AppState>,
) -> Result<SettingsSnapshot, AppError> {
    tracing::info!("[HANDLER] POST /api/admin/editor/settings/retry");
    let id = open_settings_id(&app_state).await?;
    Ok(Json(app_state.settings_editor.retry(&id).await?))
}

pub async fn discard_settings(
    State(app_state): State<AppState>,
) -> Result<SettingsSnapshot, AppError> {
    tracing::info!("[HANDLER] POST /api/admin/editor/settings/discard");
    let id = open_settings_id(&app_state).await?;
    Ok(Json(app_state.settings_editor.discard(&id).await?))
}

pub async fn close_settings(
    State(app_state): State<AppState>,
) -> Result<Json<GenericResponse>, AppError> {
    tracing::info!("[HANDLER] DELETE /api/admin/editor/settings - Closing editor.");
    let id = open_settings_id(&app_state).await?;
    app_state.settings_editor.close(&id).await?;
    Ok(Json(GenericResponse::ok("Editor closed", Some(id))))
}
