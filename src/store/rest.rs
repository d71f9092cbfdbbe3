// Client for the hosted backend's REST row API and object storage

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use axum::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Proxy, Response};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::{ChangeBus, ChangeNotification, ChangeOp, EntityKind, ObjectStorage, RemoteStore};
use crate::config::StoreSettings;
use crate::error::StoreError;

pub struct RestStore {
    client: Client,
    base_url: String,
    bucket: String,
    bus: ChangeBus,
}

impl RestStore {
    // Builds a client with the project key installed as default headers
    pub fn new(settings: &StoreSettings) -> anyhow::Result<Self> {
        let base_url = settings
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("store.url is not configured"))?
            .trim_end_matches('/')
            .to_string();
        let api_key = settings
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("store.api_key is not configured"))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(api_key).context("Invalid characters in store.api_key")?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .context("Failed to create Authorization header")?,
        );

        let mut builder = Client::builder()
            .default_headers(headers)
            .timeout(settings.request_timeout())
            .user_agent(concat!("dealership_site/", env!("CARGO_PKG_VERSION")));
        if let Some(proxy_url) = settings.proxy_url.as_deref().filter(|p| !p.is_empty()) {
            builder = builder.proxy(Proxy::all(proxy_url).context("Invalid store.proxy_url")?);
            tracing::info!("Routing remote store traffic through configured proxy.");
        }
        let client = builder.build().context("Failed to build remote store client")?;

        Ok(Self {
            client,
            base_url,
            bucket: settings.bucket.clone(),
            bus: ChangeBus::new(),
        })
    }

    fn table_url(&self, kind: EntityKind) -> String {
        format!("{}/rest/v1/{}", self.base_url, kind.table())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, self.bucket, path)
    }

    /// Polls every table and publishes a notification when its contents change.
    /// The returned task is owned (and aborted) by the caller.
    pub fn spawn_change_feed(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut snapshots: HashMap<EntityKind, Vec<Value>> = HashMap::new();
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                for kind in EntityKind::ALL {
                    match store.fetch_all(kind).await {
                        Ok(rows) => {
                            let changed = snapshots.get(&kind).is_some_and(|prev| *prev != rows);
                            if changed {
                                tracing::debug!(%kind, "Change feed detected a difference");
                                store.bus.publish(kind, ChangeOp::Refresh, None);
                            }
                            snapshots.insert(kind, rows);
                        }
                        Err(e) => tracing::warn!(%kind, error = %e, "Change feed poll failed"),
                    }
                }
            }
        })
    }
}

// Maps non-2xx responses to StoreError::Status with the body for diagnostics
async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "[Failed to read response body]".to_string());
    tracing::debug!(status = %status, response_body = %body, "Remote store error details");
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

// Writes answer with an array of affected rows
fn first_row(kind: EntityKind, id: &str, rows: Vec<Value>) -> Result<Value, StoreError> {
    rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
        kind,
        id: id.to_string(),
    })
}

fn id_filter(id: &str) -> [(&'static str, String); 1] {
    [("id", format!("eq.{}", id))]
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn fetch_all(&self, kind: EntityKind) -> Result<Vec<Value>, StoreError> {
        let response = self
            .client
            .get(self.table_url(kind))
            .query(&[("select", "*")])
            .send()
            .await?;
        let rows: Vec<Value> = check(response).await?.json().await?;
        tracing::debug!(%kind, count = rows.len(), "Fetched rows");
        Ok(rows)
    }

    async fn fetch_one(&self, kind: EntityKind, id: &str) -> Result<Option<Value>, StoreError> {
        let response = self
            .client
            .get(self.table_url(kind))
            .query(&[("select", "*")])
            .query(&id_filter(id))
            .send()
            .await?;
        let rows: Vec<Value> = check(response).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn create(
        &self,
        kind: EntityKind,
        fields: Map<String, Value>,
    ) -> Result<Value, StoreError> {
        let response = self
            .client
            .post(self.table_url(kind))
            .header("Prefer", "return=representation")
            .json(&Value::Object(fields))
            .send()
            .await?;
        let rows: Vec<Value> = check(response).await?.json().await?;
        let row = first_row(kind, "<new>", rows)?;
        let id = row.get("id").and_then(Value::as_str).map(str::to_string);
        tracing::info!(%kind, id = ?id, "Created row");
        self.bus.publish(kind, ChangeOp::Insert, id);
        Ok(row)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Value, StoreError> {
        let response = self
            .client
            .patch(self.table_url(kind))
            .query(&id_filter(id))
            .header("Prefer", "return=representation")
            .json(&Value::Object(fields))
            .send()
            .await?;
        let rows: Vec<Value> = check(response).await?.json().await?;
        let row = first_row(kind, id, rows)?;
        tracing::debug!(%kind, id, "Updated row");
        self.bus.publish(kind, ChangeOp::Update, Some(id.to_string()));
        Ok(row)
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.table_url(kind))
            .query(&id_filter(id))
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let rows: Vec<Value> = check(response).await?.json().await?;
        first_row(kind, id, rows)?;
        tracing::info!(%kind, id, "Deleted row");
        self.bus.publish(kind, ChangeOp::Delete, Some(id.to_string()));
        Ok(())
    }

    fn subscribe(&self, kind: EntityKind) -> broadcast::Receiver<ChangeNotification> {
        self.bus.subscribe(kind)
    }
}

#[async_trait]
impl ObjectStorage for RestStore {
    async fn upload(
        &self,
        path: &str,
        content_type: &str,
        content: Vec<u8>,
    ) -> Result<String, StoreError> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path);
        let size = content.len();
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(content)
            .send()
            .await?;
        check(response).await?;
        tracing::info!(path, size, "Uploaded object");
        Ok(self.public_url(path))
    }
}
