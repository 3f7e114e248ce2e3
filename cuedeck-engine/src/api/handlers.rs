//! HTTP request handlers
//!
//! REST endpoints for registry mutation, switching, and transfer. Every
//! operation reports success/failure in the response body; lookup failures
//! map to 404, refused mutations to 409, bad requests to 400.

use crate::api::server::AppContext;
use crate::error::Error;
use crate::state::SwitcherSnapshot;
use crate::switcher::engine::{MutationOutcome, TakeOutcome};
use crate::switcher::machine::BufferId;
use crate::switcher::registry::SourceRef;
use crate::switcher::tracker::{DisplayState, Telemetry, TelemetryChannel};
use crate::switcher::transfer::{ExportSelection, ImportMode};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use cuedeck_common::events::LogEntry;
use cuedeck_common::model::SourceRecord;
use serde::{Deserialize, Serialize};
use tracing::info;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
pub struct TakeRequest {
    /// Target by registry index
    pub index: Option<usize>,
    /// Target by name (used when index is absent)
    pub name: Option<String>,
    /// Inline source record (ephemeral, not a registry member)
    pub record: Option<SourceRecord>,
    #[serde(default)]
    pub force: bool,
    /// Defer the switch by this many frames at the live sample rate
    pub delay_frames: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TakeResponse {
    status: String,
    index: Option<usize>,
    name: Option<String>,
    pending_depth: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AddSourceRequest {
    pub record: Option<SourceRecord>,
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Deserialize)]
pub struct DeleteSourceRequest {
    /// Defaults to the selected source
    pub index: Option<usize>,
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Deserialize)]
pub struct MoveSourceRequest {
    pub from: usize,
    pub to: usize,
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Deserialize)]
pub struct RenameSourceRequest {
    pub index: usize,
    pub name: String,
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Deserialize)]
pub struct DuplicateSourceRequest {
    pub index: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PasteSourceRequest {
    /// Insert after this index; defaults to the selected source
    pub after: Option<usize>,
    pub record: SourceRecord,
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Deserialize)]
pub struct StoreSourceRequest {
    pub index: usize,
    pub record: SourceRecord,
}

#[derive(Debug, Deserialize)]
pub struct SelectSourceRequest {
    pub index: usize,
}

#[derive(Debug, Deserialize)]
pub struct StoreDefaultRequest {
    pub index: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct InitRequest {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Serialize)]
pub struct MutationResponse {
    status: String,
    index: Option<usize>,
    name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    sources: Vec<SourceRecord>,
}

#[derive(Debug, Serialize)]
pub struct SwitcherStateResponse {
    switcher: SwitcherSnapshot,
    display: DisplayState,
}

#[derive(Debug, Serialize)]
pub struct PendingQueueResponse {
    status: String,
    pending_depth: usize,
}

#[derive(Debug, Serialize)]
pub struct SafetyResponse {
    safety_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct DoneSignalResponse {
    fired: bool,
}

#[derive(Debug, Serialize)]
pub struct LogResponse {
    entries: Vec<LogEntry>,
}

#[derive(Debug, Deserialize)]
pub struct TelemetryRequest {
    pub buffer: BufferId,
    pub channel: TelemetryChannel,
    pub value: f64,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub records: Vec<SourceRecord>,
    #[serde(default)]
    pub mode: ImportMode,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    /// "all" (default), "selected", or "range"
    pub selection: Option<String>,
    pub start: Option<usize>,
    pub end: Option<usize>,
}

type ApiError = (StatusCode, Json<StatusResponse>);

/// Map engine errors onto HTTP status codes
fn error_response(error: Error) -> ApiError {
    let status = match &error {
        Error::Lookup(_) => StatusCode::NOT_FOUND,
        Error::Registry(_) | Error::InvalidTransition(_) => StatusCode::CONFLICT,
        Error::BadRequest(_) | Error::Common(_) => StatusCode::BAD_REQUEST,
        Error::EngineGone(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", error),
        }),
    )
}

fn mutation_response(outcome: MutationOutcome) -> MutationResponse {
    match outcome {
        MutationOutcome::Applied { index, name } => MutationResponse {
            status: "ok".to_string(),
            index: Some(index),
            name: Some(name),
        },
        MutationOutcome::ConfirmationRequired => MutationResponse {
            status: "confirmation_required".to_string(),
            index: None,
            name: None,
        },
    }
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "switch_engine".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Registry Endpoints
// ============================================================================

/// GET /sources - Full source list (also serves as copy-source-data)
pub async fn get_sources(
    State(ctx): State<AppContext>,
) -> Result<Json<SourcesResponse>, ApiError> {
    let sources = ctx.handle.sources().await.map_err(error_response)?;
    Ok(Json(SourcesResponse { sources }))
}

/// POST /sources/add - Add a source after the selected one
pub async fn add_source(
    State(ctx): State<AppContext>,
    Json(req): Json<AddSourceRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let outcome = ctx
        .handle
        .add_source(req.record, req.confirm)
        .await
        .map_err(error_response)?;
    Ok(Json(mutation_response(outcome)))
}

/// POST /sources/delete - Delete a source (selected when no index given)
pub async fn delete_source(
    State(ctx): State<AppContext>,
    Json(req): Json<DeleteSourceRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let outcome = ctx
        .handle
        .delete_source(req.index, req.confirm)
        .await
        .map_err(error_response)?;
    Ok(Json(mutation_response(outcome)))
}

/// POST /sources/move - Move a source to a new position
pub async fn move_source(
    State(ctx): State<AppContext>,
    Json(req): Json<MoveSourceRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let outcome = ctx
        .handle
        .move_source(req.from, req.to, req.confirm)
        .await
        .map_err(error_response)?;
    Ok(Json(mutation_response(outcome)))
}

/// POST /sources/rename - Rename a source (collisions auto-resolve)
pub async fn rename_source(
    State(ctx): State<AppContext>,
    Json(req): Json<RenameSourceRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let outcome = ctx
        .handle
        .rename_source(req.index, req.name, req.confirm)
        .await
        .map_err(error_response)?;
    Ok(Json(mutation_response(outcome)))
}

/// POST /sources/duplicate - Duplicate a source in place
pub async fn duplicate_source(
    State(ctx): State<AppContext>,
    Json(req): Json<DuplicateSourceRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let outcome = ctx
        .handle
        .duplicate_source(req.index)
        .await
        .map_err(error_response)?;
    Ok(Json(mutation_response(outcome)))
}

/// POST /sources/paste - Paste copied source data
pub async fn paste_source(
    State(ctx): State<AppContext>,
    Json(req): Json<PasteSourceRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let outcome = ctx
        .handle
        .paste_source(req.after, req.record, req.confirm)
        .await
        .map_err(error_response)?;
    Ok(Json(mutation_response(outcome)))
}

/// POST /sources/store - Replace a source record wholesale (editor save)
pub async fn store_source(
    State(ctx): State<AppContext>,
    Json(req): Json<StoreSourceRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let outcome = ctx
        .handle
        .store_source(req.index, req.record)
        .await
        .map_err(error_response)?;
    Ok(Json(mutation_response(outcome)))
}

/// POST /sources/select - Select a source for editing
pub async fn select_source(
    State(ctx): State<AppContext>,
    Json(req): Json<SelectSourceRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let outcome = ctx
        .handle
        .select_source(req.index)
        .await
        .map_err(error_response)?;
    Ok(Json(mutation_response(outcome)))
}

/// POST /sources/store-default - Use a source as the add-template
pub async fn store_default(
    State(ctx): State<AppContext>,
    Json(req): Json<StoreDefaultRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let outcome = ctx
        .handle
        .store_default(req.index)
        .await
        .map_err(error_response)?;
    Ok(Json(mutation_response(outcome)))
}

/// POST /sources/init - Reset to a single default source
pub async fn init_registry(
    State(ctx): State<AppContext>,
    Json(req): Json<InitRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    info!("Init registry requested");
    let outcome = ctx
        .handle
        .init_registry(req.confirm)
        .await
        .map_err(error_response)?;
    Ok(Json(mutation_response(outcome)))
}

// ============================================================================
// Switcher Endpoints
// ============================================================================

/// POST /switcher/take - Switch to a source (by index, name, or inline data)
pub async fn take(
    State(ctx): State<AppContext>,
    Json(req): Json<TakeRequest>,
) -> Result<Json<TakeResponse>, ApiError> {
    let reference = if let Some(index) = req.index {
        SourceRef::Index(index)
    } else if let Some(name) = req.name {
        SourceRef::Name(name)
    } else if let Some(record) = req.record {
        SourceRef::Inline(Box::new(record))
    } else {
        return Err(error_response(Error::BadRequest(
            "take requires an index, name, or record".to_string(),
        )));
    };

    if let Some(delay_frames) = req.delay_frames {
        ctx.handle
            .delay_take(reference, delay_frames)
            .await
            .map_err(error_response)?;
        return Ok(Json(TakeResponse {
            status: "scheduled".to_string(),
            index: None,
            name: None,
            pending_depth: None,
        }));
    }

    let outcome = ctx
        .handle
        .take(reference, req.force)
        .await
        .map_err(error_response)?;

    let response = match outcome {
        TakeOutcome::Switching { index, name } => TakeResponse {
            status: "switching".to_string(),
            index,
            name: Some(name),
            pending_depth: None,
        },
        TakeOutcome::Queued { depth } => TakeResponse {
            status: "queued".to_string(),
            index: None,
            name: None,
            pending_depth: Some(depth),
        },
        TakeOutcome::DuplicateDropped => TakeResponse {
            status: "duplicate_dropped".to_string(),
            index: None,
            name: None,
            pending_depth: None,
        },
    };
    Ok(Json(response))
}

/// GET /switcher/state - Current phase, indices, and live display values
pub async fn get_switcher_state(
    State(ctx): State<AppContext>,
) -> Json<SwitcherStateResponse> {
    Json(SwitcherStateResponse {
        switcher: ctx.state.snapshot().await,
        display: ctx.state.display().await,
    })
}

/// POST /switcher/queue/clear - Drop all pending switches
pub async fn clear_pending(
    State(ctx): State<AppContext>,
) -> Result<Json<PendingQueueResponse>, ApiError> {
    let cleared = ctx.handle.clear_pending().await.map_err(error_response)?;
    info!("Cleared {} pending switches", cleared);
    Ok(Json(PendingQueueResponse {
        status: "ok".to_string(),
        pending_depth: 0,
    }))
}

/// POST /switcher/queue/skip-to-last - Keep only the final destination
pub async fn skip_to_last_pending(
    State(ctx): State<AppContext>,
) -> Result<Json<PendingQueueResponse>, ApiError> {
    let remaining = ctx
        .handle
        .skip_to_last_pending()
        .await
        .map_err(error_response)?;
    Ok(Json(PendingQueueResponse {
        status: "ok".to_string(),
        pending_depth: remaining,
    }))
}

/// POST /switcher/done-signal - External completion signal for the live source
pub async fn done_signal(
    State(ctx): State<AppContext>,
) -> Result<Json<DoneSignalResponse>, ApiError> {
    let fired = ctx.handle.external_done().await.map_err(error_response)?;
    Ok(Json(DoneSignalResponse { fired }))
}

/// POST /switcher/telemetry - Telemetry ingestion from the playback host
pub async fn telemetry(
    State(ctx): State<AppContext>,
    Json(req): Json<TelemetryRequest>,
) -> Result<StatusCode, ApiError> {
    ctx.handle
        .send_telemetry(
            req.buffer,
            Telemetry {
                channel: req.channel,
                value: req.value,
            },
        )
        .map_err(error_response)?;
    Ok(StatusCode::ACCEPTED)
}

// ============================================================================
// Safety, Log, Transfer
// ============================================================================

/// POST /safety/toggle - Toggle the destructive-operation gate
pub async fn toggle_safety(
    State(ctx): State<AppContext>,
) -> Result<Json<SafetyResponse>, ApiError> {
    let enabled = ctx.handle.toggle_safety().await.map_err(error_response)?;
    Ok(Json(SafetyResponse {
        safety_enabled: enabled,
    }))
}

/// GET /log - Switch log ring, newest first
pub async fn get_log(State(ctx): State<AppContext>) -> Result<Json<LogResponse>, ApiError> {
    let entries = ctx.handle.log_entries().await.map_err(error_response)?;
    Ok(Json(LogResponse { entries }))
}

/// POST /log/clear - Clear the switch log ring
pub async fn clear_log(State(ctx): State<AppContext>) -> Result<StatusCode, ApiError> {
    ctx.handle.clear_log().await.map_err(error_response)?;
    Ok(StatusCode::OK)
}

/// POST /transfer/import - Import a JSON array of source records
pub async fn import_sources(
    State(ctx): State<AppContext>,
    Json(req): Json<ImportRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    if req.records.is_empty() {
        return Err(error_response(Error::BadRequest(
            "import requires at least one record".to_string(),
        )));
    }
    let outcome = ctx
        .handle
        .import(req.records, req.mode)
        .await
        .map_err(error_response)?;
    Ok(Json(mutation_response(outcome)))
}

/// GET /transfer/export - Export source records as a JSON array
pub async fn export_sources(
    State(ctx): State<AppContext>,
    Query(query): Query<ExportQuery>,
) -> Result<Json<Vec<SourceRecord>>, ApiError> {
    let selection = match query.selection.as_deref() {
        None | Some("all") => ExportSelection::All,
        Some("selected") => ExportSelection::Selected,
        Some("range") => match (query.start, query.end) {
            (Some(start), Some(end)) => ExportSelection::Range { start, end },
            _ => {
                return Err(error_response(Error::BadRequest(
                    "range export requires start and end".to_string(),
                )))
            }
        },
        Some(other) => {
            return Err(error_response(Error::BadRequest(format!(
                "unknown export selection '{}'",
                other
            ))))
        }
    };

    let records = ctx.handle.export(selection).await.map_err(error_response)?;
    Ok(Json(records))
}
