use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use rust_decimal::Decimal;
use serde::Deserialize;

use laundry_core::catalog::{ItemDraft, ItemEdit};
use laundry_core::types::{Direction, InventoryItem, StockMovement};

use crate::catalog::{ItemDetail, ItemSummary, MovementHistory};
use crate::ledger::MovementRequest;
use crate::problem::ProblemResponse;
use crate::router::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovementBody {
    item_id: String,
    direction: Direction,
    quantity: Decimal,
    #[serde(default)]
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ItemMovementBody {
    direction: Direction,
    quantity: Decimal,
    #[serde(default)]
    note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    month: Option<u32>,
}

fn track<T>(op: &'static str, result: Result<T, ProblemResponse>) -> Result<T, ProblemResponse> {
    let label = match &result {
        Ok(_) => "ok",
        Err(problem) => problem.problem_type(),
    };
    counter!("inventory_requests_total", "op" => op, "result" => label).increment(1);
    result
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ProblemResponse> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ProblemResponse::invalid_argument(rejection.body_text()))
}

async fn apply(
    state: &AppState,
    item_id: &str,
    direction: Direction,
    quantity: Decimal,
    note: Option<&str>,
) -> Result<(StatusCode, Json<StockMovement>), ProblemResponse> {
    let movement = state
        .ledger()
        .apply_movement(&MovementRequest {
            item_id,
            direction,
            quantity,
            note,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

/// `POST /stock-movements`
pub async fn create_movement(
    State(state): State<AppState>,
    body: Result<Json<StockMovementBody>, JsonRejection>,
) -> Result<(StatusCode, Json<StockMovement>), ProblemResponse> {
    let result = async {
        let body = json_body(body)?;
        apply(
            &state,
            &body.item_id,
            body.direction,
            body.quantity,
            body.note.as_deref(),
        )
        .await
    }
    .await;
    track("apply_movement", result)
}

/// `POST /inventory/:id/movements`
pub async fn create_item_movement(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ItemMovementBody>, JsonRejection>,
) -> Result<(StatusCode, Json<StockMovement>), ProblemResponse> {
    let result = async {
        let body = json_body(body)?;
        apply(&state, &id, body.direction, body.quantity, body.note.as_deref()).await
    }
    .await;
    track("apply_movement", result)
}

/// `GET /inventory/:id/movements?year=&month=`
pub async fn list_movements(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<MovementHistory>, ProblemResponse> {
    let result = async {
        let Query(query) =
            query.map_err(|rejection| ProblemResponse::invalid_argument(rejection.body_text()))?;
        let history = state
            .catalog()
            .history(&id, query.year, query.month)
            .await?;
        Ok::<_, ProblemResponse>(Json(history))
    }
    .await;
    track("list_movements", result)
}

pub async fn list_items(
    State(state): State<AppState>,
) -> Result<Json<Vec<ItemSummary>>, ProblemResponse> {
    let result = state
        .catalog()
        .list()
        .await
        .map(Json)
        .map_err(ProblemResponse::from);
    track("list_items", result)
}

pub async fn register_item(
    State(state): State<AppState>,
    body: Result<Json<ItemDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<InventoryItem>), ProblemResponse> {
    let result = async {
        let draft = json_body(body)?;
        let item = state.catalog().register(draft).await?;
        Ok::<_, ProblemResponse>((StatusCode::CREATED, Json(item)))
    }
    .await;
    track("register_item", result)
}

pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ItemDetail>, ProblemResponse> {
    let result = state
        .catalog()
        .detail(&id)
        .await
        .map(Json)
        .map_err(ProblemResponse::from);
    track("get_item", result)
}

pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ItemEdit>, JsonRejection>,
) -> Result<Json<InventoryItem>, ProblemResponse> {
    let result = async {
        let edit = json_body(body)?;
        Ok::<_, ProblemResponse>(Json(state.catalog().update(&id, edit).await?))
    }
    .await;
    track("update_item", result)
}

pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ProblemResponse> {
    let result = state
        .catalog()
        .delete(&id)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(ProblemResponse::from);
    track("delete_item", result)
}

/// `GET /inventory/export` as a CSV attachment.
pub async fn export_items(State(state): State<AppState>) -> Result<Response, ProblemResponse> {
    let result = state
        .catalog()
        .export_csv()
        .await
        .map_err(ProblemResponse::from)
        .map(|export| {
            (
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", export.file_name),
                    ),
                ],
                export.body,
            )
                .into_response()
        });
    track("export_items", result)
}
