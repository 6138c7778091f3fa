use std::convert::Infallible;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use ship_core::events::{PlanEvent, PlanOutcome};
use ship_core::types::{PlanningRequest, TaskId};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};

use crate::error::WebError;
use crate::model::{HealthResponse, StartPlanResponse, TaskView};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/shipping/plan", post(start_plan))
        .route("/shipping/plan/{task_id}", get(get_task))
        .route("/shipping/plan/{task_id}/events", get(stream_events))
        .route("/shipping/plan/{task_id}/result", get(get_result))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        ok: true,
        tasks: state.planner().store().len().await,
        started_at: state.started_at(),
    })
}

async fn start_plan(
    State(state): State<AppState>,
    payload: Result<Json<PlanningRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StartPlanResponse>), WebError> {
    let Json(request) = payload.map_err(|rejection| WebError::BadRequest {
        message: rejection.body_text(),
    })?;
    let task_id = state.planner().start_plan(request).await?;
    Ok((StatusCode::ACCEPTED, Json(StartPlanResponse { task_id })))
}

async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskView>, WebError> {
    let task_id = parse_task_id(&task_id)?;
    let planner = state.planner();
    let task = planner.task(&task_id).await?;
    let event_count = planner
        .store()
        .log(&task_id)
        .await
        .map_or(0, |log| log.len());
    Ok(Json(TaskView::new(task, event_count)))
}

async fn get_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<PlanOutcome>, WebError> {
    let task_id = parse_task_id(&task_id)?;
    let outcome = state.planner().result(&task_id).await?;
    Ok(Json(outcome))
}

async fn stream_events(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, WebError> {
    let task_id = parse_task_id(&task_id)?;
    let subscription = state.planner().subscribe(&task_id).await?;
    info!(%task_id, "event stream opened");

    let stream = subscription.into_stream().map(move |event| {
        if event.is_terminal() {
            debug!(%task_id, event = event.name(), "event stream closing");
        }
        Ok::<SseEvent, Infallible>(sse_frame(&event))
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(10))
            .text("keepalive"),
    ))
}

fn sse_frame(event: &PlanEvent) -> SseEvent {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    SseEvent::default().event(event.name()).data(data)
}

fn parse_task_id(raw: &str) -> Result<TaskId, WebError> {
    raw.parse().map_err(|_| WebError::NotFound {
        resource: format!("task:{raw}"),
    })
}
