//! Handlers behind the gates.
//!
//! The CMS data layer lives elsewhere; these handlers validate input, echo
//! what they were given along with the principal the gates resolved, and
//! expose gate statistics to administrators.

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::http::server::AppState;
use crate::security::principal::Principal;
use crate::store::ExpiringStore;

const REGISTERABLE_ROLES: [&str; 3] = ["author", "editor", "viewer"];
const CONTENT_STATUSES: [&str; 4] = ["draft", "scheduled", "published", "archived"];
const MEDIA_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "image/gif",
    "video/mp4",
    "application/pdf",
];

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": message })),
    )
        .into_response()
}

fn parse_json<T: for<'de> Deserialize<'de>>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "Rejected request body");
        bad_request("Invalid JSON in request body")
    })
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
}

pub async fn health() -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

// ---- /api/csrf-token ----

/// Only reached on non-GET methods; GET is answered by the guard.
pub async fn csrf_token_info() -> Json<Value> {
    Json(json!({ "message": "CSRF token endpoint" }))
}

pub async fn csrf_echo(method: Method, body: Bytes) -> Response {
    let data: Value = match parse_json(&body) {
        Ok(data) => data,
        Err(resp) => return resp,
    };

    Json(json!({
        "success": true,
        "message": format!("{method} request successful"),
        "data": data,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: Option<String>,
}

pub async fn csrf_delete(Query(query): Query<IdQuery>) -> Response {
    match query.id.filter(|id| !id.is_empty()) {
        Some(id) => Json(json!({
            "success": true,
            "message": format!("DELETE request successful for ID: {id}"),
        }))
        .into_response(),
        None => bad_request("ID parameter is required for DELETE"),
    }
}

// ---- /api/auth/session ----

pub async fn session(Extension(principal): Extension<Principal>) -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "user": principal,
            "capabilities": principal.capabilities(),
        }
    }))
}

// ---- /api/users/register ----

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "author".to_string()
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !email.contains(char::is_whitespace)
}

impl RegisterRequest {
    /// First problem found, in field order.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.trim().chars().count() < 2 {
            return Err("Name must be at least 2 characters");
        }
        if !is_plausible_email(&self.email) {
            return Err("Invalid email address");
        }
        if self.password.chars().count() < 6 {
            return Err("Password must be at least 6 characters");
        }
        if !REGISTERABLE_ROLES.contains(&self.role.as_str()) {
            return Err("Invalid role specified");
        }
        Ok(())
    }
}

pub async fn register(body: Bytes) -> Response {
    let request: RegisterRequest = match parse_json(&body) {
        Ok(request) => request,
        Err(resp) => return resp,
    };
    if let Err(message) = request.validate() {
        return bad_request(message);
    }

    tracing::info!(email = %request.email, role = %request.role, "Registration accepted");
    (
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": {
                "id": Uuid::new_v4(),
                "name": request.name.trim(),
                "email": request.email,
                "role": request.role,
            },
            "message": "User created successfully",
        })),
    )
        .into_response()
}

// ---- /api/content ----

#[derive(Debug, Deserialize)]
pub struct ContentListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn list_content(
    Extension(principal): Extension<Principal>,
    Query(query): Query<ContentListQuery>,
) -> Json<Value> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    Json(json!({
        "success": true,
        "data": [],
        "filters": {
            "search": query.search.unwrap_or_default(),
            "status": query.status.unwrap_or_else(|| "all".to_string()),
        },
        "pagination": { "page": page, "limit": limit, "total": 0, "pages": 0 },
        "viewer": principal.id,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDraft {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub featured_image: Option<String>,
}

fn default_status() -> String {
    "draft".to_string()
}

fn check_status(status: &str) -> Result<(), &'static str> {
    if CONTENT_STATUSES.contains(&status) {
        Ok(())
    } else {
        Err("Invalid content status")
    }
}

impl ContentDraft {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.title.trim().is_empty() {
            return Err("Title is required");
        }
        if self.content.trim().is_empty() {
            return Err("Content is required");
        }
        check_status(&self.status)
    }
}

pub async fn create_content(Extension(principal): Extension<Principal>, body: Bytes) -> Response {
    let draft: ContentDraft = match parse_json(&body) {
        Ok(draft) => draft,
        Err(resp) => return resp,
    };
    if let Err(message) = draft.validate() {
        return bad_request(message);
    }

    (
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": {
                "id": Uuid::new_v4(),
                "authorId": principal.id,
                "content": draft,
            },
            "message": "Content created successfully",
        })),
    )
        .into_response()
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentUpdate {
    pub id: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub status: Option<String>,
    pub tags: Option<Vec<String>>,
    pub featured_image: Option<String>,
}

impl ContentUpdate {
    pub fn validate(&self) -> Result<&str, &'static str> {
        let id = self
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or("Content ID is required")?;
        if matches!(&self.title, Some(t) if t.trim().is_empty()) {
            return Err("Title is required");
        }
        if matches!(&self.content, Some(c) if c.trim().is_empty()) {
            return Err("Content is required");
        }
        if let Some(status) = &self.status {
            check_status(status)?;
        }
        Ok(id)
    }
}

pub async fn update_content(Extension(principal): Extension<Principal>, body: Bytes) -> Response {
    let update: ContentUpdate = match parse_json(&body) {
        Ok(update) => update,
        Err(resp) => return resp,
    };
    if let Err(message) = update.validate() {
        return bad_request(message);
    }

    Json(json!({
        "success": true,
        "data": { "editedBy": principal.id, "changes": update },
        "message": "Content updated successfully",
    }))
    .into_response()
}

pub async fn delete_content(
    Extension(principal): Extension<Principal>,
    Query(query): Query<IdQuery>,
) -> Response {
    let Some(id) = query.id.filter(|id| !id.is_empty()) else {
        return bad_request("Content ID is required");
    };

    tracing::info!(content = %id, principal = %principal.id, "Content deleted");
    Json(json!({
        "success": true,
        "message": "Content deleted successfully",
    }))
    .into_response()
}

// ---- /api/media ----

pub async fn list_media(Extension(principal): Extension<Principal>) -> Json<Value> {
    Json(json!({ "success": true, "data": [], "viewer": principal.id }))
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub name: Option<String>,
}

fn media_kind(content_type: &str) -> &'static str {
    if content_type.starts_with("image/") {
        "image"
    } else if content_type.starts_with("video/") {
        "video"
    } else {
        "document"
    }
}

/// Raw-body upload: the file is the body, its type the `Content-Type`.
pub async fn upload_media(
    Extension(principal): Extension<Principal>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if body.is_empty() {
        return bad_request("No file provided");
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !MEDIA_TYPES.contains(&content_type) {
        return bad_request("File type not allowed");
    }

    let name = query.name.unwrap_or_else(|| "upload".to_string());
    (
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": {
                "id": Uuid::new_v4(),
                "name": name,
                "type": media_kind(content_type),
                "size": body.len(),
                "format": content_type,
                "uploadedBy": principal.id,
            },
            "message": "File uploaded successfully",
        })),
    )
        .into_response()
}

// ---- /api/admin/gate ----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub window_secs: u64,
    pub max: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateStats {
    pub csrf_tokens: usize,
    pub rate_limit_counters: usize,
    pub rate_limit_enabled: bool,
    pub profiles: BTreeMap<&'static str, ProfileSummary>,
}

pub async fn gate_stats(State(state): State<AppState>) -> Json<GateStats> {
    let profiles = state
        .config
        .rate_limit
        .profiles()
        .into_iter()
        .map(|(name, profile)| {
            (
                name,
                ProfileSummary {
                    window_secs: profile.window_secs,
                    max: profile.max,
                },
            )
        })
        .collect();

    Json(GateStats {
        csrf_tokens: state.csrf_store.len().await,
        rate_limit_counters: state.rate_limit_store.len().await,
        rate_limit_enabled: state.config.rate_limit.enabled,
        profiles,
    })
}
