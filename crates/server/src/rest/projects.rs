use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::rest::AppState;
use crate::store::ProjectRecord;

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct ProjectResponse {
    pub id: String,
    pub tenant_id: Option<String>,
    pub name: String,
    pub description: String,
    pub status: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

fn to_response(p: ProjectRecord) -> ProjectResponse {
    ProjectResponse {
        id: p.id,
        tenant_id: p.tenant_id,
        name: p.name,
        description: p.description,
        status: p.status,
        created_at_ms: p.created_at_ms,
        updated_at_ms: p.updated_at_ms,
    }
}

fn validate_status(s: &str) -> bool {
    matches!(s, "active" | "paused" | "archived")
}

fn tenant_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub async fn list_projects(State(state): State<AppState>) -> Json<Vec<ProjectResponse>> {
    let projects = state.projects.list().into_iter().map(to_response).collect();
    Json(projects)
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectResponse>, StatusCode> {
    state
        .projects
        .get(&project_id)
        .map(|p| Json(to_response(p)))
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn create_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectResponse>), StatusCode> {
    if body.name.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let status = body.status.as_deref().unwrap_or("active");
    if !validate_status(status) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let now_ms = opsdeck_gate::clock::now_ms();
    let record = ProjectRecord {
        id: uuid::Uuid::new_v4().to_string(),
        tenant_id: tenant_from_headers(&headers),
        name: body.name,
        description: body.description.unwrap_or_default(),
        status: status.to_string(),
        created_at_ms: now_ms,
        updated_at_ms: now_ms,
    };

    let resp = to_response(record.clone());
    state.projects.insert(record);
    Ok((StatusCode::CREATED, Json(resp)))
}

pub async fn update_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(body): Json<UpdateProjectRequest>,
) -> Result<Json<ProjectResponse>, StatusCode> {
    let existing = state.projects.get(&project_id).ok_or(StatusCode::NOT_FOUND)?;

    if let Some(ref s) = body.status {
        if !validate_status(s) {
            return Err(StatusCode::BAD_REQUEST);
        }
    }
    if let Some(ref n) = body.name {
        if n.trim().is_empty() {
            return Err(StatusCode::BAD_REQUEST);
        }
    }

    let updated = ProjectRecord {
        id: existing.id.clone(),
        tenant_id: existing.tenant_id.clone(),
        name: body.name.unwrap_or(existing.name.clone()),
        description: body.description.unwrap_or(existing.description.clone()),
        status: body.status.unwrap_or(existing.status.clone()),
        created_at_ms: existing.created_at_ms,
        updated_at_ms: opsdeck_gate::clock::now_ms(),
    };

    state.projects.update(updated.clone());
    Ok(Json(to_response(updated)))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> StatusCode {
    if state.projects.delete(&project_id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
