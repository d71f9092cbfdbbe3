// Vehicle inventory: reads with last-known-good fallback, validated admin writes, CSV export

use std::sync::Arc;

use anyhow::anyhow;
use chrono::{Datelike, Utc};
use tokio::sync::{broadcast::error::RecvError, RwLock};
use tokio::task::JoinHandle;

use crate::error::{AppError, AppResult, StoreError};
use crate::filter::{self, Criteria};
use crate::models::{Vehicle, VehicleForm, VehiclePatch};
use crate::store::{self, EntityKind, RemoteStore};
use crate::tags::{derive_stored_tags, derive_tags};

pub struct Inventory {
    store: Arc<dyn RemoteStore>,
    last_good: RwLock<Vec<Vehicle>>,
}

fn current_year() -> i32 {
    Utc::now().year()
}

// Newest first; rows without a timestamp go last
fn sort_newest_first(vehicles: &mut [Vehicle]) {
    vehicles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

impl Inventory {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            last_good: RwLock::new(Vec::new()),
        }
    }

    /// Current vehicle list. A failed read serves the last successful one.
    pub async fn vehicles(&self) -> Vec<Vehicle> {
        match store::fetch_records::<Vehicle>(self.store.as_ref()).await {
            Ok(mut vehicles) => {
                sort_newest_first(&mut vehicles);
                *self.last_good.write().await = vehicles.clone();
                vehicles
            }
            Err(e) => {
                let fallback = self.last_good.read().await.clone();
                tracing::warn!(
                    error = %e,
                    cached = fallback.len(),
                    "Inventory read failed, serving last known list"
                );
                fallback
            }
        }
    }

    pub async fn search(&self, criteria: &Criteria) -> Vec<Vehicle> {
        let vehicles = self.vehicles().await;
        if criteria.is_unset() {
            return vehicles;
        }
        let matches = filter::filter(&vehicles, criteria);
        tracing::debug!(total = vehicles.len(), matched = matches.len(), "Filtered inventory");
        matches
    }

    pub async fn get(&self, id: &str) -> AppResult<Vehicle> {
        store::fetch_record::<Vehicle>(self.store.as_ref(), id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("vehicle '{}' not found", id)))
    }

    pub async fn create(&self, form: VehicleForm) -> AppResult<Vehicle> {
        form.validate(current_year())?;
        let tags = if form.auto_tag {
            derive_tags(&form.make, form.year, form.price, form.mileage)
        } else {
            form.tags.clone()
        };
        let vehicle: Vehicle =
            store::create_record(self.store.as_ref(), form.into_fields(tags)).await?;
        tracing::info!(
            id = %vehicle.id,
            make = %vehicle.make,
            model = %vehicle.model,
            tags = ?vehicle.tags,
            "Vehicle created"
        );
        Ok(vehicle)
    }

    // Edits never re-derive tags; see retag
    pub async fn update(&self, id: &str, patch: VehiclePatch) -> AppResult<Vehicle> {
        patch.validate(current_year())?;
        if patch.is_empty() {
            return self.get(id).await;
        }
        let vehicle: Vehicle =
            store::update_record(self.store.as_ref(), id, patch.to_fields()).await?;
        tracing::info!(id, "Vehicle updated");
        Ok(vehicle)
    }

    /// Explicit re-run of tag derivation from the vehicle's current attributes.
    pub async fn retag(&self, id: &str) -> AppResult<Vehicle> {
        let vehicle = self.get(id).await?;
        let tags = derive_stored_tags(&vehicle.make, vehicle.year, vehicle.price, vehicle.mileage);
        if tags != vehicle.tags {
            tracing::info!(id, old = ?vehicle.tags, new = ?tags, "Re-derived tags differ");
        }
        let patch = VehiclePatch {
            tags: Some(tags),
            ..Default::default()
        };
        Ok(store::update_record(self.store.as_ref(), id, patch.to_fields()).await?)
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        self.store.delete(EntityKind::Vehicles, id).await.map_err(|e| match e {
            StoreError::NotFound { .. } => {
                AppError::NotFound(format!("vehicle '{}' not found", id))
            }
            other => other.into(),
        })?;
        tracing::info!(id, "Vehicle deleted");
        Ok(())
    }

    /// Keeps the fallback list warm by refetching on every change notification.
    pub fn spawn_refresher(self: &Arc<Self>) -> JoinHandle<()> {
        let inventory = Arc::clone(self);
        let mut changes = self.store.subscribe(EntityKind::Vehicles);
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(_) | Err(RecvError::Lagged(_)) => {
                        let count = inventory.vehicles().await.len();
                        tracing::debug!(count, "Inventory refreshed after change notification");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

// Missing numbers export as empty cells
fn number_cell(value: Option<impl ToString>) -> String {
    value.map(|n| n.to_string()).unwrap_or_default()
}

const CSV_HEADER: [&str; 11] = [
    "id",
    "make",
    "model",
    "year",
    "price",
    "mileage",
    "status",
    "tags",
    "features",
    "description",
    "created_at",
];

pub fn export_csv(vehicles: &[Vehicle]) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for v in vehicles {
        writer.write_record([
            v.id.clone(),
            v.make.clone(),
            v.model.clone(),
            number_cell(v.year),
            number_cell(v.price),
            number_cell(v.mileage),
            v.status.to_string(),
            v.tags.join("|"),
            v.features.join("|"),
            v.description.clone().unwrap_or_default(),
            v.created_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to finish CSV export: {}", e.error()))
}
