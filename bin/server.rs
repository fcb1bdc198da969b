// NCM Catalog - Web Server
// REST API with Axum

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use ncm_catalog::{
    get_codec, Catalog, Fields, Outcome, OutcomeKind, Settings, SheetFormat,
    SortOrder, SqliteStore, XlsxCodec,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared application state
#[derive(Clone)]
struct AppState {
    catalog: Arc<Mutex<Catalog<SqliteStore>>>,
    settings: Arc<Settings>,
}

impl AppState {
    fn catalog(&self) -> MutexGuard<'_, Catalog<SqliteStore>> {
        // Poisoned lock: keep serving
        self.catalog.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message.into()),
        }
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::err(message))).into_response()
}

fn outcome_response<T: Serialize>(outcome: Outcome, data: T, status: StatusCode) -> Response {
    if outcome.success {
        (StatusCode::OK, Json(ApiResponse::ok(data))).into_response()
    } else {
        eprintln!("❌ {}", outcome.message);
        failure(status, outcome.message)
    }
}

/// Record as the table shows it
#[derive(Serialize)]
struct RecordResponse {
    id: String,
    fields: Fields,
    display: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default)]
    search: String,
    #[serde(default)]
    order: SortOrder,
}

#[derive(Deserialize)]
struct ImportParams {
    format: Option<String>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/records - Records in display form, filtered and sorted by NCM
async fn list_records(State(state): State<AppState>, Query(params): Query<ListParams>) -> Response {
    let catalog = state.catalog();

    let response: Vec<RecordResponse> = catalog
        .query(&params.search, params.order)
        .into_iter()
        .map(|view| RecordResponse {
            id: view.record.id.clone(),
            fields: view.record.fields.clone(),
            display: catalog
                .schema()
                .names()
                .map(String::from)
                .zip(catalog.display_row(&view.record))
                .collect(),
        })
        .collect();

    (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
}

/// POST /api/records - Add a record
async fn add_record(State(state): State<AppState>, Json(fields): Json<Fields>) -> Response {
    let result = state.catalog().add(&fields);
    let outcome = Outcome::of(OutcomeKind::Add, &result);
    outcome_response(outcome, result.ok(), StatusCode::INTERNAL_SERVER_ERROR)
}

/// PUT /api/records/:id - Overwrite a record with the given fields
async fn save_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(fields): Json<Fields>,
) -> Response {
    let mut catalog = state.catalog();

    if catalog.get(&id).is_none() {
        return failure(StatusCode::NOT_FOUND, format!("record not found: {}", id));
    }
    for (field, value) in fields {
        if let Err(e) = catalog.set_field(&id, &field, value) {
            return failure(StatusCode::BAD_REQUEST, e.to_string());
        }
    }

    let result = catalog.save(&id);
    let outcome = Outcome::of(OutcomeKind::Save, &result);
    outcome_response(outcome, id, StatusCode::INTERNAL_SERVER_ERROR)
}

/// DELETE /api/records/:id
async fn delete_record(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let result = state.catalog().delete(&id);
    let outcome = Outcome::of(OutcomeKind::Delete, &result);
    outcome_response(outcome, id, StatusCode::NOT_FOUND)
}

/// DELETE /api/records - Delete everything
async fn delete_all_records(State(state): State<AppState>) -> Response {
    let result = state.catalog().delete_all();
    let outcome = Outcome::of(OutcomeKind::DeleteAll, &result);
    outcome_response(outcome, result.ok(), StatusCode::INTERNAL_SERVER_ERROR)
}

/// POST /api/import?format=xlsx|csv - Raw spreadsheet bytes as the body
async fn import_sheet(
    State(state): State<AppState>,
    Query(params): Query<ImportParams>,
    body: Bytes,
) -> Response {
    let format = match params.format.as_deref().map(SheetFormat::from_name) {
        None => SheetFormat::Xlsx,
        Some(Ok(format)) => format,
        Some(Err(e)) => return failure(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let bytes = (!body.is_empty()).then_some(&body[..]);
    let codec = get_codec(format);

    let result = state.catalog().import(bytes, codec.as_ref(), |progress| {
        log::debug!("import {}%", progress.percent());
    });

    let status = match &result {
        Err(e) if e.is_input_rejection() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let outcome = Outcome::of_import(&result);
    outcome_response(outcome, result.ok(), status)
}

/// GET /api/export - XLSX download
async fn export_sheet(State(state): State<AppState>) -> Response {
    let codec = XlsxCodec::new().with_sheet_name(&state.settings.sheet_name);

    match state.catalog().export_bytes(&codec) {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, XLSX_MIME.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", state.settings.export_file_name),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            eprintln!("Error exporting records: {:#}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("🌐 NCM Catalog - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config_path = std::env::var_os("NCM_CATALOG_CONFIG").map(std::path::PathBuf::from);
    let settings = Settings::load(config_path.as_deref()).expect("Failed to load settings");

    let store = SqliteStore::open(&settings.database_path).expect("Failed to open database");
    let catalog = Catalog::open(store, settings.locale.clone()).expect("Failed to load records");
    println!("✓ Database opened: {:?} ({} records)", settings.database_path, catalog.records().len());

    let addr = settings.server_addr.clone();

    // Create shared state
    let state = AppState {
        catalog: Arc::new(Mutex::new(catalog)),
        settings: Arc::new(settings),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route(
            "/records",
            get(list_records).post(add_record).delete(delete_all_records),
        )
        .route("/records/:id", put(save_record).delete(delete_record))
        .route("/import", post(import_sheet))
        .route("/export", get(export_sheet))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/records", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
