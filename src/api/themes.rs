//! Theme API endpoints

use std::path::Path;

use axum::{
    extract::{Path as UrlPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::engine::Outcome;
use crate::theme::{SchemeFilter, Theme, ThemeError, ThemeFilter};

/// Build theme router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/themes", get(list_themes))
        .route("/themes/current", get(current_theme).put(set_theme))
        .route("/themes/current/background/next", post(next_background))
        .route("/themes/install", post(install_theme))
        .route("/themes/{name}", delete(remove_theme))
        .route("/themes/{name}/preview", get(preview_theme))
        .route("/index/refresh", post(refresh_index))
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<String>>,
}

fn error_response(err: ThemeError) -> Response {
    let status = match &err {
        ThemeError::NotFound(_) => StatusCode::NOT_FOUND,
        ThemeError::Ambiguous { .. } => StatusCode::CONFLICT,
        ThemeError::Immutable(_) => StatusCode::FORBIDDEN,
        ThemeError::ActiveThemeConflict(_) => StatusCode::CONFLICT,
        ThemeError::AlreadyInstalled(_) => StatusCode::CONFLICT,
        ThemeError::Network { .. } => StatusCode::BAD_GATEWAY,
        ThemeError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ThemeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let candidates = match &err {
        ThemeError::Ambiguous { candidates, .. } => Some(candidates.clone()),
        _ => None,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind: err.kind().to_string(),
            candidates,
        }),
    )
        .into_response()
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message,
            kind: "invalid_request".to_string(),
            candidates: None,
        }),
    )
        .into_response()
}

/// List query parameters
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub filter: Option<String>,
    pub scheme: Option<String>,
}

/// List themes
async fn list_themes(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Response {
    let filter = query.filter.as_deref().unwrap_or_default();
    let Some(filter) = ThemeFilter::parse(filter) else {
        return bad_request(format!("unknown filter '{}'", filter));
    };
    let scheme = query.scheme.as_deref().unwrap_or_default();
    let Some(scheme) = SchemeFilter::parse(scheme) else {
        return bad_request(format!("unknown scheme '{}'", scheme));
    };

    match state.engine.list_themes(filter, scheme).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => error_response(e),
    }
}

/// Current theme response
#[derive(Debug, Serialize)]
pub struct CurrentResponse {
    pub theme: Theme,
}

/// Get the active theme
async fn current_theme(State(state): State<AppState>) -> Response {
    match state.engine.current_theme().await {
        Ok(theme) => Json(CurrentResponse { theme }).into_response(),
        Err(e) => error_response(e),
    }
}

/// Request naming a theme
#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

/// Switch the active theme
async fn set_theme(State(state): State<AppState>, Json(req): Json<NameRequest>) -> Response {
    match state.engine.set_theme(&req.name).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => error_response(e),
    }
}

/// Image payload returned alongside backgrounds and previews
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub theme: String,
    pub path: String,
    pub mime_type: String,
    pub data_base64: String,
    pub warnings: Vec<String>,
}

async fn image_response(
    theme: String,
    path: &Path,
    mime_type: String,
    warnings: Vec<String>,
) -> Response {
    match tokio::fs::read(path).await {
        Ok(data) => Json(ImageResponse {
            theme,
            path: path.display().to_string(),
            mime_type,
            data_base64: BASE64.encode(&data),
            warnings,
        })
        .into_response(),
        Err(e) => error_response(ThemeError::io(format!("read {}", path.display()), e)),
    }
}

/// Rotate to the next background
async fn next_background(State(state): State<AppState>) -> Response {
    match state.engine.next_background().await {
        Ok(Outcome { value, warnings }) => {
            image_response(value.theme, &value.path, value.mime_type, warnings).await
        }
        Err(e) => error_response(e),
    }
}

/// Preview image for a theme
async fn preview_theme(State(state): State<AppState>, UrlPath(name): UrlPath<String>) -> Response {
    match state.engine.preview_theme(&name).await {
        Ok(Outcome { value, warnings }) => {
            image_response(
                value.theme.slug,
                &value.image.path,
                value.image.mime_type,
                warnings,
            )
            .await
        }
        Err(e) => error_response(e),
    }
}

/// Install a theme from the remote index
async fn install_theme(State(state): State<AppState>, Json(req): Json<NameRequest>) -> Response {
    match state.engine.install_theme(&req.name).await {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Uninstall an extra theme
async fn remove_theme(State(state): State<AppState>, UrlPath(name): UrlPath<String>) -> Response {
    match state.engine.remove_theme(&name).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => error_response(e),
    }
}

/// Refresh response
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub themes: usize,
}

/// Force a remote index refresh
async fn refresh_index(State(state): State<AppState>) -> Response {
    match state.engine.refresh_index().await {
        Ok(themes) => Json(RefreshResponse { themes }).into_response(),
        Err(e) => error_response(e),
    }
}
