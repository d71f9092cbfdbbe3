use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::Router;
use tokio::{net::TcpListener, sync::broadcast, task::JoinHandle};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::autosave::{EditorSlot, Notice};
use crate::config::{EditorSettings, Settings};
use crate::content::Content;
use crate::inventory::Inventory;
use crate::models::{Section, SiteSettings};
use crate::store::{MemoryStore, ObjectStorage, RemoteStore, RestStore};

// Declare modules
mod autosave;
mod config;
mod content;
mod error;
mod filter;
mod inventory;
mod models;
mod routes;
mod store;
mod tags;

// Buffered toasts per subscriber before slow clients start skipping
const NOTICE_CHANNEL_CAPACITY: usize = 64;

// Shared by every handler; cheap to clone
#[derive(Clone)]
struct AppState {
    inventory: Arc<Inventory>,
    content: Arc<Content>,
    section_editor: Arc<EditorSlot<Section>>,
    settings_editor: Arc<EditorSlot<SiteSettings>>,
    notices: broadcast::Sender<Notice>,
}

impl AppState {
    fn new(
        store: Arc<dyn RemoteStore>,
        storage: Arc<dyn ObjectStorage>,
        editor: EditorSettings,
    ) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        let section_editor = EditorSlot::new(Arc::clone(&store), editor.clone(), notices.clone());
        Self {
            inventory: Arc::new(Inventory::new(Arc::clone(&store))),
            content: Arc::new(Content::new(Arc::clone(&store), storage)),
            section_editor: Arc::new(section_editor),
            settings_editor: Arc::new(EditorSlot::new(store, editor, notices.clone())),
            notices,
        }
    }
}

// Row store, object storage and the change-feed task (if any) so main can stop it
type Backend = (Arc<dyn RemoteStore>, Arc<dyn ObjectStorage>, Option<JoinHandle<()>>);

// Picks the hosted backend when configured, the in-memory store otherwise.
fn connect_store(settings: &Settings) -> Result<Backend> {
    if settings.store.url.is_none() {
        tracing::warn!("store.url is not set; using the in-memory store. Data is lost on restart.");
        let store = Arc::new(MemoryStore::new());
        let remote: Arc<dyn RemoteStore> = store.clone();
        let storage: Arc<dyn ObjectStorage> = store;
        return Ok((remote, storage, None));
    }

    let store = RestStore::new(&settings.store).context("Failed to create remote store client")?;
    let store = Arc::new(store);
    let feed = match settings.store.poll_interval_secs {
        0 => {
            tracing::info!("Change feed polling disabled.");
            None
        }
        secs => {
            tracing::info!("Polling remote store for changes every {}s.", secs);
            Some(store.spawn_change_feed(Duration::from_secs(secs)))
        }
    };
    let remote: Arc<dyn RemoteStore> = store.clone();
    let storage: Arc<dyn ObjectStorage> = store;
    Ok((remote, storage, feed))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received.");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file first. Ignore errors (e.g., file not found)
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dealership_site=info,tower_http=info".into()),
        )
        .with(fmt::layer())
        .init();

    tracing::info!("Initializing dealership site server...");

    let settings = match Settings::new() {
        Ok(s) => {
            tracing::info!("Configuration loaded successfully.");
            s
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    let (store, storage, change_feed) = connect_store(&settings)?;
    let app_state = AppState::new(store, storage, settings.editor.clone());
    let refresher = app_state.inventory.spawn_refresher();

    let app: Router = routes::create_router(app_state.clone())
        .nest_service("/static", ServeDir::new(&settings.static_dir))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = settings
        .server_address
        .parse()
        .with_context(|| format!("Invalid server address format: {}", settings.server_address))?;

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to address {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Pending debounce timers are cancelled; in-flight writes are left to land
    app_state.section_editor.close_any().await;
    app_state.settings_editor.close_any().await;
    refresher.abort();
    if let Some(feed) = change_feed {
        feed.abort();
    }
    tracing::info!("Server stopped.");

    Ok(())
}
