use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use flow_core::state::JobState;
use flow_core::types::JobId;
use flowd::engine::{NewJobRequest, TransitionRequest};

use crate::error::WebError;
use crate::model::{
    web_event_name, AllowedTransitionsResponse, CreateJobRequest, HistoryResponse,
    JobDetailResponse, JobListResponse, JobView, TransitionOptionView, TransitionRequestBody,
    TransitionResponse,
};
use crate::state::{resolve_actor, resolve_change_source, AppState};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/jobs", get(list_jobs).post(create_job))
        .route("/api/jobs/{job_id}", get(get_job))
        .route(
            "/api/jobs/{job_id}/allowed-transitions",
            get(allowed_transitions),
        )
        .route("/api/jobs/{job_id}/transition", post(apply_transition))
        .route("/api/jobs/{job_id}/history", get(history))
        .route("/api/events", get(stream_events))
        .with_state(state)
}

async fn index() -> impl IntoResponse {
    "fieldflow web running"
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    state: Option<JobState>,
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<JobListResponse>, WebError> {
    let jobs = match params.state {
        Some(filter) => state.engine.list_jobs_by_state(filter)?,
        None => state.engine.list_jobs()?,
    };
    let views = jobs.iter().map(JobView::from).collect::<Vec<_>>();
    Ok(Json(JobListResponse { jobs: views }))
}

async fn create_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobDetailResponse>), WebError> {
    let actor = resolve_actor(&headers)?;
    let change_source = resolve_change_source(&headers)?;
    let job = state.engine.create_job(NewJobRequest {
        id: request.job_id.map(JobId::new),
        actor: Some(actor),
        change_source,
    })?;
    Ok((
        StatusCode::CREATED,
        Json(JobDetailResponse {
            job: JobView::from(&job),
        }),
    ))
}

async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobDetailResponse>, WebError> {
    let job = state.engine.get_job(&JobId::new(job_id))?;
    Ok(Json(JobDetailResponse {
        job: JobView::from(&job),
    }))
}

async fn allowed_transitions(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<AllowedTransitionsResponse>, WebError> {
    let job_id = JobId::new(job_id);
    let job = state.engine.get_job(&job_id)?;
    let options = state.engine.list_allowed_transitions(&job_id).await?;
    Ok(Json(AllowedTransitionsResponse {
        job_id: job_id.0,
        current_state: job.current_state,
        transitions: options.iter().map(TransitionOptionView::from).collect(),
    }))
}

async fn apply_transition(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<TransitionRequestBody>,
) -> Result<Json<TransitionResponse>, WebError> {
    let actor = resolve_actor(&headers)?;
    let change_source = resolve_change_source(&headers)?;
    let request = TransitionRequest {
        to_state: body.to_state,
        actor,
        change_source,
        reason: body.reason,
        notes: body.notes,
        metadata: body.metadata,
        expected_version: body.expected_version,
    };
    let applied = state
        .engine
        .apply_transition(&JobId::new(job_id), request)
        .await?;
    Ok(Json(TransitionResponse {
        job_id: applied.job_id.0,
        state: applied.new_state,
        state_version: applied.new_version,
        record: applied.record,
    }))
}

async fn history(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<HistoryResponse>, WebError> {
    let job_id = JobId::new(job_id);
    let history = state.engine.get_history(&job_id)?;
    Ok(Json(HistoryResponse {
        job_id: job_id.0,
        current_state: history.current_state,
        records: history.records,
    }))
}

async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.engine.subscribe();
    let stream = BroadcastStream::new(rx).map(|message| {
        let event = match message {
            Ok(payload) => {
                let data = serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string());
                SseEvent::default().event(web_event_name(&payload)).data(data)
            }
            Err(_) => SseEvent::default().event("lagged").data("{}"),
        };
        Ok::<SseEvent, Infallible>(event)
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(10))
            .text("keepalive"),
    )
}
