use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{AppState, SharedEditor};
use crate::db::Database;
use crate::engine::{EditorEvent, EmbeddedEditor, EntityView, Permissions, SyncOutcome};
use crate::error::{EngineError, StoreError};
use crate::models::*;

type ApiError = (StatusCode, String);

// ============================================================
// Error Handling
// ============================================================

/// Log an internal error and return a sanitized response to the client.
/// The full error is logged server-side for debugging, but clients only
/// see a generic message to avoid leaking internal details.
fn internal_error(e: impl std::fmt::Display) -> ApiError {
    tracing::error!("Internal error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

/// Map an engine error to a status. Lookups and validation failures are
/// safe to show; storage failures are not.
fn engine_error(e: EngineError) -> ApiError {
    if e.is_not_found() {
        tracing::warn!("Not found: {}", e);
        return (StatusCode::NOT_FOUND, e.to_string());
    }
    match e {
        EngineError::WriteFailure(StoreError::Backend(err)) => internal_error(err),
        EngineError::WriteFailure(StoreError::ReadOnlyField(_) | StoreError::Rejected(_))
        | EngineError::UnsupportedField { .. }
        | EngineError::FieldShape { .. }
        | EngineError::MalformedRecord(_)
        | EngineError::MissingLifecycleEffect(_)
        | EngineError::Invalid(_)
        | EngineError::Path(_)
        | EngineError::Codec(_) => {
            tracing::warn!("Validation error: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string())
        }
        other => internal_error(other),
    }
}

fn forbidden(message: &str) -> ApiError {
    (StatusCode::FORBIDDEN, message.to_string())
}

fn container_not_found() -> ApiError {
    (StatusCode::NOT_FOUND, "Container not found".to_string())
}

fn parse_field(slug: &str) -> Result<EmbeddedField, ApiError> {
    EmbeddedField::from_slug(slug)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("Unknown field `{}`", slug)))
}

/// Load a container the viewer may see.
fn visible_container(state: &AppState, id: Uuid, viewer: &Viewer) -> Result<Container, ApiError> {
    let container = state
        .db
        .get_container(id)
        .map_err(internal_error)?
        .ok_or_else(container_not_found)?;
    if !container.test_user_permission(viewer, OwnershipLevel::Observer, false) {
        return Err(container_not_found());
    }
    Ok(container)
}

/// Load a container the viewer may change.
fn editable_container(state: &AppState, id: Uuid, viewer: &Viewer) -> Result<Container, ApiError> {
    let container = visible_container(state, id, viewer)?;
    if !container.is_editable(viewer) {
        tracing::warn!(container = %id, user = %viewer.user_id, "Container edit denied");
        return Err(forbidden("You do not have permission to edit this container"));
    }
    Ok(container)
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Containers
// ============================================================

pub async fn list_containers(
    State(state): State<AppState>,
    viewer: Viewer,
) -> Result<Json<Vec<Container>>, ApiError> {
    let containers = state.db.get_all_containers().map_err(internal_error)?;
    Ok(Json(
        containers
            .into_iter()
            .filter(|c| c.test_user_permission(&viewer, OwnershipLevel::Observer, false))
            .collect(),
    ))
}

pub async fn get_container(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
) -> Result<Json<Container>, ApiError> {
    visible_container(&state, id, &viewer).map(Json)
}

pub async fn create_container(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(mut input): Json<CreateContainerInput>,
) -> Result<(StatusCode, Json<Container>), ApiError> {
    if !viewer.is_gamemaster() {
        input
            .ownership
            .users
            .insert(viewer.user_id.clone(), OwnershipLevel::Owner);
    }
    match input.system {
        None | Some(Value::Null) | Some(Value::Object(_)) => {}
        Some(_) => {
            return Err((
                StatusCode::BAD_REQUEST,
                "Container system data must be an object".to_string(),
            ))
        }
    }
    state
        .db
        .create_container(input)
        .map(|c| (StatusCode::CREATED, Json(c)))
        .map_err(internal_error)
}

pub async fn update_container(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateContainerInput>,
) -> Result<Json<Container>, ApiError> {
    let container = visible_container(&state, id, &viewer)?;
    if !container.is_owner(&viewer) {
        return Err(forbidden("Only owners can update this container"));
    }
    state
        .db
        .update_container(id, input)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(container_not_found)
}

pub async fn delete_container(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let container = visible_container(&state, id, &viewer)?;
    if !container.is_owner(&viewer) {
        return Err(forbidden("Only owners can delete this container"));
    }
    if state.db.delete_container(id).map_err(internal_error)? {
        let closed = state.editors.remove_container(id);
        tracing::info!(container = %id, closed, "Deleted container");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(container_not_found())
    }
}

// ============================================================
// Embedded Records
// ============================================================

#[derive(Debug, Deserialize)]
pub struct ReorderInput {
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignGroupInput {
    pub group_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RemovedGroups {
    pub removed_groups: Vec<String>,
}

pub async fn list_records(
    State(state): State<AppState>,
    viewer: Viewer,
    Path((id, field)): Path<(Uuid, String)>,
) -> Result<Json<Value>, ApiError> {
    let field = parse_field(&field)?;
    visible_container(&state, id, &viewer)?;
    let records = state
        .engine
        .records(id)
        .list(field)
        .await
        .map_err(engine_error)?;
    Ok(Json(records.to_value()))
}

pub async fn create_record(
    State(state): State<AppState>,
    viewer: Viewer,
    Path((id, field)): Path<(Uuid, String)>,
    Json(draft): Json<Value>,
) -> Result<(StatusCode, Json<EmbeddedRecord>), ApiError> {
    let field = parse_field(&field)?;
    editable_container(&state, id, &viewer)?;
    state
        .engine
        .records(id)
        .create_record(field, draft)
        .await
        .map(|r| (StatusCode::CREATED, Json(r)))
        .map_err(engine_error)
}

pub async fn delete_record(
    State(state): State<AppState>,
    viewer: Viewer,
    Path((id, field, record_id)): Path<(Uuid, String, String)>,
) -> Result<Json<RemovedGroups>, ApiError> {
    let field = parse_field(&field)?;
    editable_container(&state, id, &viewer)?;
    let removed_groups = state
        .engine
        .records(id)
        .delete_record(field, &record_id)
        .await
        .map_err(engine_error)?;
    Ok(Json(RemovedGroups { removed_groups }))
}

pub async fn duplicate_record(
    State(state): State<AppState>,
    viewer: Viewer,
    Path((id, field, record_id)): Path<(Uuid, String, String)>,
) -> Result<(StatusCode, Json<EmbeddedRecord>), ApiError> {
    let field = parse_field(&field)?;
    editable_container(&state, id, &viewer)?;
    state
        .engine
        .records(id)
        .duplicate_record(field, &record_id)
        .await
        .map(|r| (StatusCode::CREATED, Json(r)))
        .map_err(engine_error)
}

pub async fn reorder_records(
    State(state): State<AppState>,
    viewer: Viewer,
    Path((id, field)): Path<(Uuid, String)>,
    Json(input): Json<ReorderInput>,
) -> Result<StatusCode, ApiError> {
    let field = parse_field(&field)?;
    editable_container(&state, id, &viewer)?;
    state
        .engine
        .records(id)
        .reorder_records(field, &input.ids)
        .await
        .map_err(engine_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn assign_record_group(
    State(state): State<AppState>,
    viewer: Viewer,
    Path((id, field, record_id)): Path<(Uuid, String, String)>,
    Json(input): Json<AssignGroupInput>,
) -> Result<Json<RemovedGroups>, ApiError> {
    let field = parse_field(&field)?;
    if !field.supports_groups() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Records in {} can not be grouped", field),
        ));
    }
    editable_container(&state, id, &viewer)?;
    let removed_groups = state
        .engine
        .groups(id)
        .assign_to_group(&record_id, input.group_id.as_deref())
        .await
        .map_err(engine_error)?;
    Ok(Json(RemovedGroups { removed_groups }))
}

pub async fn set_embedded_item(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
    Json(draft): Json<Value>,
) -> Result<Json<EmbeddedRecord>, ApiError> {
    editable_container(&state, id, &viewer)?;
    state
        .engine
        .records(id)
        .set_embedded_item(draft)
        .await
        .map(Json)
        .map_err(engine_error)
}

pub async fn clear_embedded_item(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    editable_container(&state, id, &viewer)?;
    if state
        .engine
        .records(id)
        .clear_embedded_item()
        .await
        .map_err(engine_error)?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "No embedded item".to_string()))
    }
}

// ============================================================
// Groups
// ============================================================

#[derive(Debug, Serialize)]
pub struct UngroupedRecords {
    pub ungrouped: Vec<String>,
}

pub async fn list_groups(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<GroupWithMembers>>, ApiError> {
    visible_container(&state, id, &viewer)?;
    state
        .engine
        .groups(id)
        .groups()
        .await
        .map(Json)
        .map_err(engine_error)
}

pub async fn create_group(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateGroupInput>,
) -> Result<(StatusCode, Json<GroupWithMembers>), ApiError> {
    editable_container(&state, id, &viewer)?;
    state
        .engine
        .groups(id)
        .create_group(input)
        .await
        .map(|g| (StatusCode::CREATED, Json(g)))
        .map_err(engine_error)
}

pub async fn update_group(
    State(state): State<AppState>,
    viewer: Viewer,
    Path((id, group_id)): Path<(Uuid, String)>,
    Json(input): Json<UpdateGroupInput>,
) -> Result<Json<Group>, ApiError> {
    editable_container(&state, id, &viewer)?;
    state
        .engine
        .groups(id)
        .update_group(&group_id, input)
        .await
        .map(Json)
        .map_err(engine_error)
}

pub async fn delete_group(
    State(state): State<AppState>,
    viewer: Viewer,
    Path((id, group_id)): Path<(Uuid, String)>,
) -> Result<Json<UngroupedRecords>, ApiError> {
    editable_container(&state, id, &viewer)?;
    let ungrouped = state
        .engine
        .groups(id)
        .delete_group(&group_id)
        .await
        .map_err(engine_error)?;
    Ok(Json(UngroupedRecords { ungrouped }))
}

pub async fn duplicate_group(
    State(state): State<AppState>,
    viewer: Viewer,
    Path((id, group_id)): Path<(Uuid, String)>,
) -> Result<(StatusCode, Json<GroupWithMembers>), ApiError> {
    editable_container(&state, id, &viewer)?;
    state
        .engine
        .groups(id)
        .duplicate_group(&group_id)
        .await
        .map(|g| (StatusCode::CREATED, Json(g)))
        .map_err(engine_error)
}

pub async fn cleanup_groups(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
) -> Result<Json<RemovedGroups>, ApiError> {
    editable_container(&state, id, &viewer)?;
    let removed_groups = state
        .engine
        .groups(id)
        .cleanup_empty_groups()
        .await
        .map_err(engine_error)?;
    Ok(Json(RemovedGroups { removed_groups }))
}

// ============================================================
// Editor Sessions
// ============================================================

#[derive(Debug, Deserialize)]
pub struct OpenEditorInput {
    pub container_id: Uuid,
    pub field: EmbeddedField,
    pub record_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OpenEditorResponse {
    pub session_id: Uuid,
    pub entity: EntityView,
}

#[derive(Debug, Deserialize)]
pub struct SaveInput {
    pub field_path: String,
    pub content: Value,
}

#[derive(Debug, Deserialize)]
pub struct ToggleInput {
    pub checked: bool,
}

/// Result of one editor action.
#[derive(Debug, Serialize)]
pub struct EditorResponse {
    #[serde(flatten)]
    pub outcome: SyncOutcome,
    pub events: Vec<EditorEvent>,
    pub entity: EntityView,
}

fn outcome_status(outcome: &SyncOutcome) -> StatusCode {
    match outcome {
        SyncOutcome::Written => StatusCode::OK,
        SyncOutcome::RecordNotFound { .. } => StatusCode::NOT_FOUND,
        SyncOutcome::Denied => StatusCode::FORBIDDEN,
        SyncOutcome::Rejected { .. } => StatusCode::BAD_REQUEST,
        SyncOutcome::WriteFailed { .. } => StatusCode::BAD_GATEWAY,
    }
}

/// Find the session and make sure it belongs to the viewer.
async fn session(state: &AppState, id: Uuid, viewer: &Viewer) -> Result<SharedEditor, ApiError> {
    let editor = state
        .editors
        .get(id)
        .ok_or((StatusCode::NOT_FOUND, "Editor session not found".to_string()))?;
    if editor.lock().await.viewer().user_id != viewer.user_id {
        return Err(forbidden("Editor session belongs to another user"));
    }
    Ok(editor)
}

fn respond(
    editor: &mut EmbeddedEditor<Database>,
    outcome: SyncOutcome,
) -> (StatusCode, Json<EditorResponse>) {
    let response = EditorResponse {
        events: editor.take_events(),
        entity: editor.view(),
        outcome,
    };
    (outcome_status(&response.outcome), Json(response))
}

pub async fn open_editor(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(input): Json<OpenEditorInput>,
) -> Result<(StatusCode, Json<OpenEditorResponse>), ApiError> {
    // Opening may write id repairs, so hidden containers are refused first.
    visible_container(&state, input.container_id, &viewer)?;
    let editor = state
        .engine
        .open_editor_from_store(
            input.container_id,
            input.field,
            input.record_id.as_deref(),
            viewer.clone(),
        )
        .await
        .map_err(engine_error)?;

    let entity = editor.view();
    let session_id = state.editors.insert(editor);
    tracing::info!(session = %session_id, record = %entity.record.id, user = %viewer.user_id, "Opened editor session");
    Ok((
        StatusCode::CREATED,
        Json(OpenEditorResponse { session_id, entity }),
    ))
}

pub async fn get_editor(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
) -> Result<Json<EntityView>, ApiError> {
    let shared = session(&state, id, &viewer).await?;
    let editor = shared.lock().await;
    Ok(Json(editor.view()))
}

pub async fn close_editor(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    session(&state, id, &viewer).await?;
    let Some(shared) = state.editors.remove(id) else {
        return Err((StatusCode::NOT_FOUND, "Editor session not found".to_string()));
    };
    // A request still holding the editor finishes its write and drops it.
    if let Ok(editor) = Arc::try_unwrap(shared) {
        editor.into_inner().close();
    }
    tracing::info!(session = %id, user = %viewer.user_id, "Closed editor session");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn submit_editor(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
    Json(form): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<EditorResponse>), ApiError> {
    let shared = session(&state, id, &viewer).await?;
    let mut editor = shared.lock().await;
    let outcome = editor.on_submit(form).await;
    Ok(respond(&mut editor, outcome))
}

pub async fn save_editor(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
    Json(input): Json<SaveInput>,
) -> Result<(StatusCode, Json<EditorResponse>), ApiError> {
    let shared = session(&state, id, &viewer).await?;
    let mut editor = shared.lock().await;
    let outcome = editor.on_save(&input.field_path, input.content).await;
    Ok(respond(&mut editor, outcome))
}

pub async fn toggle_editor(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
    Json(input): Json<ToggleInput>,
) -> Result<(StatusCode, Json<EditorResponse>), ApiError> {
    let shared = session(&state, id, &viewer).await?;
    let mut editor = shared.lock().await;
    let outcome = editor.on_toggle(input.checked).await;
    Ok(respond(&mut editor, outcome))
}

pub async fn create_effect(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
    Json(draft): Json<Value>,
) -> Result<(StatusCode, Json<EditorResponse>), ApiError> {
    let shared = session(&state, id, &viewer).await?;
    let mut editor = shared.lock().await;
    let outcome = editor.create_effect(draft).await;
    Ok(respond(&mut editor, outcome))
}

pub async fn update_effect(
    State(state): State<AppState>,
    viewer: Viewer,
    Path((id, effect_id)): Path<(Uuid, String)>,
    Json(form): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<EditorResponse>), ApiError> {
    let shared = session(&state, id, &viewer).await?;
    let mut editor = shared.lock().await;
    let outcome = editor.update_effect(&effect_id, form).await;
    Ok(respond(&mut editor, outcome))
}

pub async fn delete_effect(
    State(state): State<AppState>,
    viewer: Viewer,
    Path((id, effect_id)): Path<(Uuid, String)>,
) -> Result<(StatusCode, Json<EditorResponse>), ApiError> {
    let shared = session(&state, id, &viewer).await?;
    let mut editor = shared.lock().await;
    let outcome = editor.delete_effect(&effect_id).await;
    Ok(respond(&mut editor, outcome))
}
