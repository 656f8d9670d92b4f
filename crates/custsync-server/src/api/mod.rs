//! HTTP surface for triggering and observing syncs
//!
//! - `GET /health`
//! - `POST /api/v1/sync/:op_class` runs a bidirectional sync
//! - `GET /api/v1/sync/:op_class/status` returns the tracker projection

pub mod response;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::config::CorsConfig;
use crate::error::{AppError, AppResult};
use crate::middleware;
use crate::sync::{
    RateGate, StoreProvider, SyncReport, SyncService, SyncStatus, TabularSourceAdapter,
    CUSTOMERS_OP_CLASS, SHEETS_OP_CLASS,
};
use response::ApiResponse;

/// Operation classes the API accepts
pub const KNOWN_OP_CLASSES: [&str; 2] = [CUSTOMERS_OP_CLASS, SHEETS_OP_CLASS];

/// Whether syncs can run, or what the user must do first
pub enum SyncAccess<A, P> {
    Ready(SyncService<A, P>),
    NeedsConsent { auth_url: String },
}

/// Application state shared across handlers
pub struct ApiState<A, P> {
    pub access: Arc<SyncAccess<A, P>>,
    pub gate: Arc<RateGate>,
    /// Checked by `/health` when present
    pub db: Option<PgPool>,
}

impl<A, P> Clone for ApiState<A, P> {
    fn clone(&self) -> Self {
        Self {
            access: Arc::clone(&self.access),
            gate: Arc::clone(&self.gate),
            db: self.db.clone(),
        }
    }
}

impl<A, P> ApiState<A, P>
where
    A: TabularSourceAdapter + 'static,
    P: StoreProvider,
{
    pub fn ready(service: SyncService<A, P>, db: Option<PgPool>) -> Self {
        Self {
            gate: Arc::clone(service.gate()),
            access: Arc::new(SyncAccess::Ready(service)),
            db,
        }
    }

    pub fn needs_consent(auth_url: String, gate: Arc<RateGate>, db: Option<PgPool>) -> Self {
        Self {
            access: Arc::new(SyncAccess::NeedsConsent { auth_url }),
            gate,
            db,
        }
    }
}

/// Build the application router with all routes and middleware
pub fn router<A, P>(state: ApiState<A, P>, cors: &CorsConfig) -> Router
where
    A: TabularSourceAdapter + 'static,
    P: StoreProvider,
{
    let sync_routes = Router::new()
        .route("/sync/:op_class", post(trigger_sync::<A, P>))
        .route("/sync/:op_class/status", get(sync_status::<A, P>));

    Router::new()
        .route("/health", get(health_check::<A, P>))
        .nest("/api/v1", sync_routes)
        .with_state(state)
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(cors))
}

fn known_op_class(op_class: &str) -> AppResult<()> {
    if KNOWN_OP_CLASSES.contains(&op_class) {
        Ok(())
    } else {
        Err(AppError::NotFound(format!(
            "Unknown sync class '{op_class}'. Expected one of: {}",
            KNOWN_OP_CLASSES.join(", ")
        )))
    }
}

async fn trigger_sync<A, P>(
    State(state): State<ApiState<A, P>>,
    Path(op_class): Path<String>,
) -> AppResult<ApiResponse<SyncReport>>
where
    A: TabularSourceAdapter + 'static,
    P: StoreProvider,
{
    known_op_class(&op_class)?;

    let service = match state.access.as_ref() {
        SyncAccess::Ready(service) => service,
        SyncAccess::NeedsConsent { auth_url } => {
            return Err(AppError::ConsentRequired {
                auth_url: auth_url.clone(),
            })
        }
    };

    info!(op_class = %op_class, "manual sync requested");
    let report = service.sync_bidirectional(&op_class).await?;
    Ok(ApiResponse::success(report))
}

async fn sync_status<A, P>(
    State(state): State<ApiState<A, P>>,
    Path(op_class): Path<String>,
) -> AppResult<ApiResponse<SyncStatus>>
where
    A: TabularSourceAdapter + 'static,
    P: StoreProvider,
{
    known_op_class(&op_class)?;
    Ok(ApiResponse::success(state.gate.tracker().status(&op_class)))
}

async fn health_check<A, P>(State(state): State<ApiState<A, P>>) -> AppResult<impl IntoResponse>
where
    A: TabularSourceAdapter + 'static,
    P: StoreProvider,
{
    if let Some(db) = &state.db {
        crate::db::health_check(db).await?;
    }

    let sheets = match state.access.as_ref() {
        SyncAccess::Ready(_) => "authorized",
        SyncAccess::NeedsConsent { .. } => "consent_required",
    };

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "database": if state.db.is_some() { "connected" } else { "not_configured" },
            "sheets": sheets,
        })),
    ))
}
