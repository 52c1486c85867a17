//! HTTP control surface, implemented with `axum`: one handler per
//! route for node membership, health, administrative kill/revive,
//! delay injection, election triggering, and the shared variable.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use ring_core::election::ElectionEngine;
use ring_core::error::CoreError;
use ring_core::node_info::NodeInfo;
use ring_core::ring::{JoinOutcome, RingManager, UpdateNeighborsRequest};
use ring_core::state::NodeHandle;
use ring_core::variable::{VariableError, VariableService};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Clone)]
pub struct AppState {
    pub handle: NodeHandle,
    pub ring: RingManager,
    pub election: ElectionEngine,
    pub variable: VariableService,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/join", post(join))
        .route("/leave", post(leave))
        .route("/update_neighbors", post(update_neighbors))
        .route("/health", get(health))
        .route("/kill", post(kill))
        .route("/revive", post(revive))
        .route("/setDelay", post(set_delay))
        .route("/startElection", post(start_election))
        .route("/variable", get(get_variable).post(set_variable))
        .with_state(Arc::new(state))
}

#[derive(Deserialize)]
struct JoinBody {
    node_id: u64,
    host: String,
    socket_port: u16,
}

async fn join(State(state): State<Arc<AppState>>, Json(body): Json<JoinBody>) -> Response {
    if !state.handle.lock().await.alive {
        return administrative_rejection();
    }
    let joiner = NodeInfo::from_http_host(body.node_id, body.host, body.socket_port);
    let outcome = state.ring.join(joiner).await;
    match outcome {
        JoinOutcome::CannotJoinSelf => (StatusCode::OK, Json(json!({"error": outcome.message()}))).into_response(),
        _ => (StatusCode::OK, Json(json!({"status": outcome.message()}))).into_response(),
    }
}

async fn leave(State(state): State<Arc<AppState>>) -> Response {
    if !state.handle.lock().await.alive {
        return administrative_rejection();
    }
    state.ring.leave().await;
    (StatusCode::OK, Json(json!({"status": "left"}))).into_response()
}

async fn update_neighbors(State(state): State<Arc<AppState>>, Json(req): Json<UpdateNeighborsRequest>) -> Response {
    if !state.handle.lock().await.alive {
        return administrative_rejection();
    }
    state.ring.apply_update_neighbors(req).await;
    (StatusCode::OK, Json(json!({"status": "updated"}))).into_response()
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    Json(state.handle.health_snapshot().await).into_response()
}

async fn kill(State(state): State<Arc<AppState>>) -> Response {
    state.handle.lock().await.kill();
    (StatusCode::OK, Json(json!({"status": "killed"}))).into_response()
}

async fn revive(State(state): State<Arc<AppState>>) -> Response {
    state.handle.lock().await.revive();
    (StatusCode::OK, Json(json!({"status": "alive"}))).into_response()
}

#[derive(Deserialize)]
struct SetDelayBody {
    delay: f64,
}

async fn set_delay(State(state): State<Arc<AppState>>, Json(body): Json<SetDelayBody>) -> Response {
    let mut state = state.handle.lock().await;
    if !state.alive {
        return administrative_rejection();
    }
    state.delay = body.delay;
    (StatusCode::OK, Json(json!({"status": "ok", "delay": body.delay}))).into_response()
}

async fn start_election(State(state): State<Arc<AppState>>) -> Response {
    match state.election.start_election().await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "election started"}))).into_response(),
        Err(e) => core_error_response(e),
    }
}

async fn get_variable(State(state): State<Arc<AppState>>) -> Response {
    match state.variable.get().await {
        Ok((value, served_by)) => (StatusCode::OK, Json(json!({"value": value, "served_by": served_by}))).into_response(),
        Err(e) => variable_error_response(e),
    }
}

#[derive(Deserialize)]
struct SetVariableBody {
    value: i64,
}

#[derive(Serialize)]
struct SetVariableResponse {
    status: &'static str,
    value: i64,
    set_by: u64,
}

async fn set_variable(State(state): State<Arc<AppState>>, Json(body): Json<SetVariableBody>) -> Response {
    match state.variable.set(body.value).await {
        Ok((value, set_by)) => (StatusCode::OK, Json(SetVariableResponse { status: "OK", value, set_by })).into_response(),
        Err(e) => variable_error_response(e),
    }
}

fn administrative_rejection() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "Node is killed"}))).into_response()
}

fn core_error_response(err: CoreError) -> Response {
    match err {
        CoreError::Administrative => administrative_rejection(),
        CoreError::Topology(detail) => (StatusCode::OK, Json(json!({"error": detail}))).into_response(),
        CoreError::Transport(detail) => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": detail}))).into_response(),
        CoreError::RoleError(detail) => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": detail}))).into_response(),
    }
}

fn variable_error_response(err: VariableError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"error": err.detail()}))).into_response()
}
