use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use chrono_tz::Tz;
use laundry_storage::Database;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::catalog::InventoryCatalog;
use crate::ledger::{Clock, StockLedger};
use crate::{inventory, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    ledger: StockLedger,
    catalog: InventoryCatalog,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, storage: Database, timezone: Tz) -> Self {
        Self::with_clock(metrics, storage, timezone, Arc::new(Utc::now))
    }

    pub fn with_clock(
        metrics: PrometheusHandle,
        storage: Database,
        timezone: Tz,
        clock: Clock,
    ) -> Self {
        Self {
            ledger: StockLedger::new(storage.clone(), clock.clone()),
            catalog: InventoryCatalog::new(storage.clone(), clock, timezone),
            metrics,
            storage,
        }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn ledger(&self) -> &StockLedger {
        &self.ledger
    }

    pub fn catalog(&self) -> &InventoryCatalog {
        &self.catalog
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/stock-movements", post(inventory::create_movement))
        .route(
            "/inventory",
            get(inventory::list_items).post(inventory::register_item),
        )
        .route("/inventory/export", get(inventory::export_items))
        .route(
            "/inventory/:id",
            get(inventory::get_item)
                .put(inventory::update_item)
                .delete(inventory::delete_item),
        )
        .route(
            "/inventory/:id/movements",
            get(inventory::list_movements).post(inventory::create_item_movement),
        )
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
