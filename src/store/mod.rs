//! Contracts for the hosted backend: row storage, object storage and change
//! notifications.
//!
//! Rows travel as JSON objects; the typed helpers at the bottom decode them
//! into [`Record`] types and skip rows that no longer match the model.

use std::collections::HashMap;
use std::fmt;

use axum::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::error::StoreError;

mod memory;
mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Vehicles,
    Sections,
    Settings,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] =
        [EntityKind::Vehicles, EntityKind::Sections, EntityKind::Settings];

    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Vehicles => "vehicles",
            EntityKind::Sections => "content_sections",
            EntityKind::Settings => "site_settings",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Vehicles => "vehicles",
            EntityKind::Sections => "sections",
            EntityKind::Settings => "settings",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
    // Change observed by polling; the affected row is unknown
    Refresh,
}

/// Signal that something changed in a table. Receivers refetch rather than
/// trusting a payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeNotification {
    pub kind: EntityKind,
    pub op: ChangeOp,
    pub id: Option<String>,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch_all(&self, kind: EntityKind) -> Result<Vec<Value>, StoreError>;

    async fn fetch_one(&self, kind: EntityKind, id: &str) -> Result<Option<Value>, StoreError> {
        let rows = self.fetch_all(kind).await?;
        Ok(rows
            .into_iter()
            .find(|row| row.get("id").and_then(Value::as_str) == Some(id)))
    }

    async fn create(
        &self,
        kind: EntityKind,
        fields: Map<String, Value>,
    ) -> Result<Value, StoreError>;

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Value, StoreError>;

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), StoreError>;

    fn subscribe(&self, kind: EntityKind) -> broadcast::Receiver<ChangeNotification>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores `content` under `path` and returns its public URL.
    async fn upload(
        &self,
        path: &str,
        content_type: &str,
        content: Vec<u8>,
    ) -> Result<String, StoreError>;
}

// One broadcast channel per entity kind
pub(crate) struct ChangeBus {
    channels: HashMap<EntityKind, broadcast::Sender<ChangeNotification>>,
}

impl ChangeBus {
    pub(crate) fn new() -> Self {
        let channels = EntityKind::ALL
            .iter()
            .map(|kind| (*kind, broadcast::channel(CHANGE_CHANNEL_CAPACITY).0))
            .collect();
        Self { channels }
    }

    pub(crate) fn subscribe(&self, kind: EntityKind) -> broadcast::Receiver<ChangeNotification> {
        match self.channels.get(&kind) {
            Some(tx) => tx.subscribe(),
            // Every kind is registered in new(); a fresh channel keeps this total
            None => broadcast::channel(1).1,
        }
    }

    pub(crate) fn publish(&self, kind: EntityKind, op: ChangeOp, id: Option<String>) {
        if let Some(tx) = self.channels.get(&kind) {
            // No receivers is fine
            let _ = tx.send(ChangeNotification { kind, op, id });
        }
    }
}

// --- Typed access ---

pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &str;
}

fn row_id(row: &Value) -> &str {
    row.get("id").and_then(Value::as_str).unwrap_or("<no id>")
}

pub fn decode_rows<T: Record>(rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row_id(&row).to_string();
            match serde_json::from_value::<T>(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(kind = %T::KIND, id = %id, error = %e, "Skipping malformed row");
                    None
                }
            }
        })
        .collect()
}

pub async fn fetch_records<T: Record>(store: &dyn RemoteStore) -> Result<Vec<T>, StoreError> {
    let rows = store.fetch_all(T::KIND).await?;
    Ok(decode_rows(rows))
}

pub async fn fetch_record<T: Record>(
    store: &dyn RemoteStore,
    id: &str,
) -> Result<Option<T>, StoreError> {
    match store.fetch_one(T::KIND, id).await? {
        Some(row) => Ok(Some(serde_json::from_value(row)?)),
        None => Ok(None),
    }
}

pub async fn create_record<T: Record>(
    store: &dyn RemoteStore,
    fields: Map<String, Value>,
) -> Result<T, StoreError> {
    let row = store.create(T::KIND, fields).await?;
    Ok(serde_json::from_value(row)?)
}

pub async fn update_record<T: Record>(
    store: &dyn RemoteStore,
    id: &str,
    fields: Map<String, Value>,
) -> Result<T, StoreError> {
    let row = store.update(T::KIND, id, fields).await?;
    Ok(serde_json::from_value(row)?)
}

// Row fields without the store-managed columns
pub fn to_fields<T: Serialize>(record: &T) -> Result<Map<String, Value>, StoreError> {
    let mut fields = match serde_json::to_value(record)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for managed in ["id", "created_at", "updated_at"] {
        fields.remove(managed);
    }
    Ok(fields)
}
