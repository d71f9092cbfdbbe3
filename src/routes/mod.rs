// Route definitions

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};
use serde::Serialize;

use crate::AppState;

mod admin;
mod api;
mod editor;

// Largest accepted image upload
const UPLOAD_LIMIT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Serialize, Debug)]
pub struct GenericResponse {
    success: bool,
    message: Option<String>,
    id: Option<String>,
}

impl GenericResponse {
    pub fn ok(message: &str, id: Option<String>) -> Self {
        Self {
            success: true,
            message: Some(message.to_string()),
            id,
        }
    }
}

pub fn create_router(app_state: AppState) -> Router {
    let public_router = Router::new()
        .route("/inventory", get(api::search_inventory))
        .route("/inventory/facets", get(api::get_facets))
        .route("/inventory/:id", get(api::get_vehicle))
        .route("/site", get(api::get_site));

    let editor_router = Router::new()
        .route(
            "/sections/:id",
            post(editor::open_section)
                .get(editor::section_snapshot)
                .patch(editor::edit_section)
                .delete(editor::close_section),
        )
        .route("/sections/:id/retry", post(editor::retry_section))
        .route("/sections/:id/discard", post(editor::discard_section))
        .route(
            "/settings",
            post(editor::open_settings)
                .get(editor::settings_snapshot)
                .patch(editor::edit_settings)
                .delete(editor::close_settings),
        )
        .route("/settings/retry", post(editor::retry_settings))
        .route("/settings/discard", post(editor::discard_settings));

    // Authentication is out of scope; deployments put this behind their own gate
    let admin_router = Router::new()
        .route("/vehicles", get(admin::list_vehicles).post(admin::create_vehicle))
        .route("/vehicles/export", get(admin::export_vehicles))
        .route(
            "/vehicles/:id",
            patch(admin::update_vehicle).delete(admin::delete_vehicle),
        )
        .route("/vehicles/:id/retag", post(admin::retag_vehicle))
        .route("/sections", get(admin::list_sections).post(admin::create_section))
        .route(
            "/sections/:id",
            patch(admin::update_section).delete(admin::delete_section),
        )
        .route("/sections/:id/move", post(admin::move_section))
        .route(
            "/uploads",
            post(admin::upload_image).layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
        .route("/notices", get(admin::notices))
        .nest("/editor", editor_router);

    Router::new()
        .nest("/api", public_router.nest("/admin", admin_router))
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::EditorSettings;
    use crate::store::{EntityKind, MemoryStore, RemoteStore};

    fn app() -> (Arc<MemoryStore>, Router) {
        let store = Arc::new(MemoryStore::new());
        store.seed(
            EntityKind::Vehicles,
            vec![
                json!({ "id": "v1", "make": "Ferrari", "model": "Roma", "year": 2023,
                        "price": 250000, "mileage": 900, "created_at": "2026-02-01T00:00:00Z" }),
                json!({ "id": "v2", "make": "Toyota", "model": "Corolla", "year": 2019,
                        "price": 18000, "mileage": 60000, "status": "sold",
                        "created_at": "2026-01-01T00:00:00Z" }),
            ],
        );
        store.seed(
            EntityKind::Sections,
            vec![
                json!({ "id": "s1", "section_type": "hero", "title": "Welcome",
                        "visible": true, "sort_order": 1 }),
                json!({ "id": "s2", "section_type": "promo", "title": "Hidden",
                        "visible": false, "sort_order": 2 }),
            ],
        );
        let editor = EditorSettings {
            debounce_ms: 50,
            write_timeout_secs: 5,
        };
        let state = AppState::new(store.clone(), store.clone(), editor);
        (store, create_router(state))
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn inventory_search_filters_by_query() {
        let (_store, app) = app();
        let uri = "/api/inventory?status=available&price=200k%20-%20300k";
        let (status, body) = send(&app, "GET", uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], json!(1));
        assert_eq!(body["vehicles"][0]["id"], json!("v1"));

        let uri = "/api/inventory?make=All%20Makes&search=corolla";
        let (status, body) = send(&app, "GET", uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["vehicles"][0]["id"], json!("v2"));
    }

    #[tokio::test]
    async fn unknown_bracket_is_a_bad_request() {
        let (_store, app) = app();
        let (status, body) = send(&app, "GET", "/api/inventory?mileage=lots", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn facets_and_single_vehicle() {
        let (_store, app) = app();
        let (_, body) = send(&app, "GET", "/api/inventory/facets", None).await;
        assert_eq!(body["makes"], json!(["Ferrari", "Toyota"]));
        assert_eq!(body["years"], json!([2023, 2019]));

        let (status, _) = send(&app, "GET", "/api/inventory/v9", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn site_lists_only_visible_sections() {
        let (_store, app) = app();
        let (status, body) = send(&app, "GET", "/api/site", None).await;
        assert_eq!(status, StatusCode::OK);
        let sections = body["sections"].as_array().unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0]["section_type"], json!("hero"));
    }

    #[tokio::test]
    async fn admin_creates_auto_tagged_vehicle() {
        let (_store, app) = app();
        let form = json!({ "make": "Lamborghini", "model": "Urus", "year": 2024, "price": 320000,
                           "mileage": 100, "auto_tag": true });
        let (status, body) = send(&app, "POST", "/api/admin/vehicles", Some(form)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["tags"], json!(["LUXURY", "EXOTIC", "NEW", "LOW MILEAGE", "SUPERCAR"]));

        let bad = json!({ "make": "Kia", "model": "Rio", "year": 1850, "price": 1, "mileage": 1 });
        let (status, _) = send(&app, "POST", "/api/admin/vehicles", Some(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn export_is_csv() {
        let (_store, app) = app();
        let request = Request::builder()
            .uri("/api/admin/vehicles/export?status=sold")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/csv"));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("v2,Toyota,Corolla"));
    }

    #[tokio::test]
    async fn sections_can_be_reordered() {
        let (_store, app) = app();
        let up = Some(json!({ "direction": "up" }));
        let (status, body) = send(&app, "POST", "/api/admin/sections/s2/move", up).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], json!("s2"));
        assert_eq!(body[1]["id"], json!("s1"));
    }

    #[tokio::test]
    async fn upload_returns_storage_url() {
        let (store, app) = app();
        let request = Request::builder()
            .method("POST")
            .uri("/api/admin/uploads?path=hero/banner.jpg")
            .header(header::CONTENT_TYPE, "image/jpeg")
            .body(Body::from(vec![0xff, 0xd8, 0xff]))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        let path = body["url"].as_str().unwrap().strip_prefix("memory://").unwrap().to_string();
        assert!(path.ends_with("-banner.jpg"));
        assert_eq!(store.object(&path).unwrap().0, "image/jpeg");
    }

    #[tokio::test]
    async fn editor_saves_after_debounce() {
        let (store, app) = app();
        let (status, body) = send(&app, "POST", "/api/admin/editor/sections/s1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], json!("clean"));

        let edit = json!({ "content": { "heading": "Spring sale" } });
        let (status, body) = send(&app, "PATCH", "/api/admin/editor/sections/s1", Some(edit)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], json!("dirty_pending"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        let (_, body) = send(&app, "GET", "/api/admin/editor/sections/s1", None).await;
        assert_eq!(body["state"], json!("clean"));
        assert_eq!(store.update_calls(), 1);
        let row = store.fetch_one(EntityKind::Sections, "s1").await.unwrap().unwrap();
        assert_eq!(row["content"]["heading"], json!("Spring sale"));
    }

    #[tokio::test]
    async fn editor_requires_open_session() {
        let (_store, app) = app();
        let phone = |number: &str| Some(json!({ "phone": number }));
        let (status, _) = send(&app, "PATCH", "/api/admin/editor/settings", phone("1")).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(&app, "POST", "/api/admin/editor/settings", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], json!("clean"));

        let (status, body) =
            send(&app, "PATCH", "/api/admin/editor/settings", phone("555-0100")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["buffer"]["phone"], json!("555-0100"));

        let (status, _) = send(&app, "DELETE", "/api/admin/editor/settings", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
