//! HTTP handlers for the docfield API
//!
//! OCR, model calls and template file access block, so all of them run on
//! the blocking thread pool.

use axum::{
    extract::{Path, State},
    Json,
};
use docfield_core::{ExtractionOutput, ExtractionReport, TransferOutput};
use std::sync::Arc;
use tracing::info;

use crate::error::{ApiError, ReportError};
use crate::models::*;
use crate::state::AppState;

/// Handler: GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "docfield-api",
        version: env!("CARGO_PKG_VERSION"),
        model_loaded: state.pipeline.model_loaded(),
        parser_loaded: state.pipeline.parser_loaded(),
    })
}

/// Handler: POST /api/extract
pub async fn extract(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExtractApiRequest>,
) -> Result<Json<ExtractionOutput>, ReportError> {
    let document = req.document.decode()?;
    let request = req.extract_request()?;
    info!(
        "Extract request: strategy={}, format={}, {} bytes",
        request.strategy,
        document.format,
        document.bytes.len()
    );

    let output =
        tokio::task::spawn_blocking(move || state.pipeline.extract(&document, &request)).await??;
    Ok(Json(output))
}

/// Handler: POST /api/extract/donut
pub async fn extract_donut(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DocumentPayload>,
) -> Result<Json<ExtractionReport>, ReportError> {
    let document = req.decode()?;
    info!("Donut extract request: format={}", document.format);

    let report =
        tokio::task::spawn_blocking(move || state.pipeline.extract_donut(&document)).await??;
    Ok(Json(report))
}

/// Handler: POST /api/transfer
pub async fn transfer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TransferApiRequest>,
) -> Result<Json<TransferOutput>, ReportError> {
    let document = req.document.decode()?;
    let (examples, options) = (req.examples, req.options);
    info!(
        "Transfer request: {} examples, column_mode={}",
        examples.len(),
        options.column_mode
    );

    let output = tokio::task::spawn_blocking(move || {
        state.pipeline.transfer(&document, &examples, options)
    })
    .await??;
    Ok(Json(output))
}

/// Handler: GET /api/templates
pub async fn list_templates(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TemplateListResponse>, ApiError> {
    let templates = tokio::task::spawn_blocking(move || state.templates.list()).await??;
    let count = templates.len();
    Ok(Json(TemplateListResponse {
        success: true,
        templates,
        count,
    }))
}

/// Handler: GET /api/templates/:vendor
pub async fn get_template(
    State(state): State<Arc<AppState>>,
    Path(vendor): Path<String>,
) -> Result<Json<TemplateResponse>, ApiError> {
    let template = tokio::task::spawn_blocking(move || state.templates.load(&vendor)).await??;
    Ok(Json(TemplateResponse {
        success: true,
        template,
    }))
}

/// Handler: PUT /api/templates/:vendor
pub async fn save_template(
    State(state): State<Arc<AppState>>,
    Path(vendor): Path<String>,
    Json(req): Json<SaveTemplateRequest>,
) -> Result<Json<TemplateResponse>, ApiError> {
    if req.fields.is_empty() {
        return Err(ApiError::InvalidRequest("A template needs at least one field".into()));
    }
    let template = tokio::task::spawn_blocking(move || {
        state.templates.save(&vendor, req.fields, req.metadata)
    })
    .await??;
    Ok(Json(TemplateResponse {
        success: true,
        template,
    }))
}

/// Handler: DELETE /api/templates/:vendor
pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    Path(vendor): Path<String>,
) -> Result<Json<DeleteTemplateResponse>, ApiError> {
    let slug = vendor.clone();
    tokio::task::spawn_blocking(move || state.templates.delete(&slug)).await??;
    Ok(Json(DeleteTemplateResponse {
        success: true,
        vendor_name: vendor,
    }))
}

/// Handler: POST /api/templates/:vendor/apply
pub async fn apply_template(
    State(state): State<Arc<AppState>>,
    Path(vendor): Path<String>,
    Json(req): Json<ApplyTemplateRequest>,
) -> Result<Json<TransferOutput>, ReportError> {
    let document = req.document.decode()?;
    let store = state.clone();
    let template = tokio::task::spawn_blocking(move || store.templates.load(&vendor))
        .await
        .map_err(ApiError::from)?
        .map_err(ApiError::from)?;
    let options = req.options;
    info!(
        "Applying template {} (v{}) with {} fields",
        template.vendor_name,
        template.version,
        template.fields.len()
    );

    let output = tokio::task::spawn_blocking(move || {
        state.pipeline.apply_template(&document, &template, options)
    })
    .await??;
    Ok(Json(output))
}
