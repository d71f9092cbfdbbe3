// In-process store used when no backend is configured, and by the tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{ChangeBus, ChangeNotification, ChangeOp, EntityKind, ObjectStorage, RemoteStore};
use crate::error::StoreError;

#[derive(Default)]
struct Faults {
    // Writes that still succeed before `failing_writes` kicks in
    passing_writes: usize,
    // Number of upcoming write calls that fail
    failing_writes: usize,
    failing_reads: bool,
    // Reads never complete while set
    stalled_reads: bool,
    write_delay: Option<Duration>,
}

pub struct MemoryStore {
    tables: Mutex<HashMap<EntityKind, Vec<Value>>>,
    objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
    faults: Mutex<Faults>,
    update_calls: AtomicUsize,
    bus: ChangeBus,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            objects: Mutex::new(HashMap::new()),
            faults: Mutex::new(Faults::default()),
            update_calls: AtomicUsize::new(0),
            bus: ChangeBus::new(),
        }
    }

    // Poisoning only happens if a test panicked while holding the lock
    fn tables(&self) -> std::sync::MutexGuard<'_, HashMap<EntityKind, Vec<Value>>> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Inserts rows verbatim, without notifications.
    pub fn seed(&self, kind: EntityKind, rows: Vec<Value>) {
        self.tables().entry(kind).or_default().extend(rows);
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.fail_writes_after(0, count);
    }

    /// Lets `passing` writes through, then fails the `count` after them.
    pub fn fail_writes_after(&self, passing: usize, count: usize) {
        let mut faults = self.faults();
        faults.passing_writes = passing;
        faults.failing_writes = count;
    }

    pub fn fail_reads(&self, failing: bool) {
        self.faults().failing_reads = failing;
    }

    pub fn stall_reads(&self, stalled: bool) {
        self.faults().stalled_reads = stalled;
    }

    pub fn delay_writes(&self, delay: Option<Duration>) {
        self.faults().write_delay = delay;
    }

    /// Number of update calls received, failed ones included.
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn object(&self, path: &str) -> Option<(String, Vec<u8>)> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }

    async fn before_write(&self) -> Result<(), StoreError> {
        let delay = self.faults().write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut faults = self.faults();
        if faults.passing_writes > 0 {
            faults.passing_writes -= 1;
            return Ok(());
        }
        if faults.failing_writes > 0 {
            faults.failing_writes -= 1;
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }

    async fn before_read(&self) -> Result<(), StoreError> {
        let stalled = self.faults().stalled_reads;
        if stalled {
            std::future::pending::<()>().await;
        }
        if self.faults().failing_reads {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        Ok(())
    }
}

fn matches_id(row: &Value, id: &str) -> bool {
    row.get("id").and_then(Value::as_str) == Some(id)
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn fetch_all(&self, kind: EntityKind) -> Result<Vec<Value>, StoreError> {
        self.before_read().await?;
        Ok(self.tables().get(&kind).cloned().unwrap_or_default())
    }

    async fn create(
        &self,
        kind: EntityKind,
        mut fields: Map<String, Value>,
    ) -> Result<Value, StoreError> {
        self.before_write().await?;
        let id = match fields.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        let now = Value::String(Utc::now().to_rfc3339());
        fields.insert("id".into(), Value::String(id.clone()));
        fields.insert("created_at".into(), now.clone());
        fields.insert("updated_at".into(), now);

        let row = Value::Object(fields);
        self.tables().entry(kind).or_default().push(row.clone());
        self.bus.publish(kind, ChangeOp::Insert, Some(id));
        Ok(row)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Value, StoreError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.before_write().await?;

        let updated = {
            let mut tables = self.tables();
            let row = tables
                .get_mut(&kind)
                .and_then(|rows| rows.iter_mut().find(|row| matches_id(row, id)))
                .ok_or_else(|| StoreError::NotFound {
                    kind,
                    id: id.to_string(),
                })?;
            if let Value::Object(existing) = row {
                for (key, value) in fields {
                    if key != "id" {
                        existing.insert(key, value);
                    }
                }
                existing.insert("updated_at".into(), Value::String(Utc::now().to_rfc3339()));
            }
            row.clone()
        };

        self.bus.publish(kind, ChangeOp::Update, Some(id.to_string()));
        Ok(updated)
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), StoreError> {
        self.before_write().await?;
        {
            let mut tables = self.tables();
            let rows = tables.entry(kind).or_default();
            let before = rows.len();
            rows.retain(|row| !matches_id(row, id));
            if rows.len() == before {
                return Err(StoreError::NotFound {
                    kind,
                    id: id.to_string(),
                });
            }
        }
        self.bus.publish(kind, ChangeOp::Delete, Some(id.to_string()));
        Ok(())
    }

    fn subscribe(&self, kind: EntityKind) -> broadcast::Receiver<ChangeNotification> {
        self.bus.subscribe(kind)
    }
}

#[async_trait]
impl ObjectStorage for MemoryStore {
    async fn upload(
        &self,
        path: &str,
        content_type: &str,
        content: Vec<u8>,
    ) -> Result<String, StoreError> {
        self.before_write().await?;
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_string(), (content_type.to_string(), content));
        Ok(format!("memory://{}", path))
    }
}
