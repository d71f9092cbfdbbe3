// Public handlers: inventory search and the site content the pages render

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};
use serde::Serialize;

use crate::{
    error::AppError,
    filter::{Criteria, CriteriaQuery, Facets},
    models::{Section, SiteSettings, Vehicle},
    AppState,
};

// --- Response Wrappers ---

#[derive(Serialize)]
pub struct InventoryResponse {
    pub success: bool,
    pub count: usize,
    pub vehicles: Vec<Vehicle>,
}

#[derive(Serialize)]
pub struct SiteResponse {
    pub success: bool,
    pub settings: SiteSettings,
    pub sections: Vec<Section>,
}

// --- API Handlers ---

pub async fn search_inventory(
    State(app_state): State<AppState>,
    Query(query): Query<CriteriaQuery>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("[HANDLER] /api/inventory - Request received: {:?}", query);
    let criteria = Criteria::try_from(query)?;
    let vehicles = app_state.inventory.search(&criteria).await;
    tracing::info!("[HANDLER] /api/inventory - Returning {} vehicles.", vehicles.len());
    Ok(Json(InventoryResponse {
        success: true,
        count: vehicles.len(),
        vehicles,
    }))
}

pub async fn get_facets(State(app_state): State<AppState>) -> Json<Facets> {
    tracing::info!("[HANDLER] /api/inventory/facets - Request received.");
    let vehicles = app_state.inventory.vehicles().await;
    Json(Facets::from_vehicles(&vehicles))
}

pub async fn get_vehicle(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vehicle>, AppError> {
    tracing::info!("[HANDLER] /api/inventory/:id - Request received for id: {}", id);
    Ok(Json(app_state.inventory.get(&id).await?))
}

// Settings and visible sections load concurrently; both fall back on failure
pub async fn get_site(State(app_state): State<AppState>) -> Json<SiteResponse> {
    tracing::info!("[HANDLER] /api/site - Request received.");
    let (settings, sections) = futures::future::join(
        app_state.content.site_settings(),
        app_state.content.visible_sections(),
    )
    .await;
    tracing::debug!("[HANDLER] /api/site - {} visible sections.", sections.len());
    Json(SiteResponse {
        success: true,
        settings,
        sections,
    })
}
