//! Local HTTP endpoint for on-demand passes while the bridge is running.
//!
//! The running scheduler owns the only set of ticket locks, so a manual
//! sync has to go through it to be excluded from the sweeps. The server
//! hands each request to the scheduler's queue; [`request_sync`] is the
//! client side used by the CLI.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::models::{ChannelId, TicketId};
use crate::sync::{SyncReply, SyncRequest};
use crate::{Error, Result};

/// Body of `POST /v1/sync`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCommand {
    pub ticket_id: TicketId,
    #[serde(default)]
    pub thread_id: Option<ChannelId>,
    #[serde(default)]
    pub repair: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Clone)]
struct ControlState {
    requests: mpsc::Sender<SyncRequest>,
}

/// Error answered by the control endpoint
#[derive(Debug)]
struct ControlError {
    status: StatusCode,
    message: String,
}

impl From<Error> for ControlError {
    fn from(error: Error) -> Self {
        let status = match &error {
            Error::TicketNotFound(_) | Error::ThreadNotFound(_) => StatusCode::NOT_FOUND,
            Error::CorruptRecord { .. } => StatusCode::CONFLICT,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

pub fn control_router(requests: mpsc::Sender<SyncRequest>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/sync", post(sync_ticket))
        .with_state(ControlState { requests })
}

/// Serve the control endpoint on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    requests: mpsc::Sender<SyncRequest>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Control endpoint listening");
    }
    axum::serve(listener, control_router(requests))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn sync_ticket(
    State(state): State<ControlState>,
    Json(command): Json<SyncCommand>,
) -> std::result::Result<Json<SyncReply>, ControlError> {
    let unavailable = || ControlError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        message: "scheduler is shutting down".to_string(),
    };

    tracing::info!(
        ticket_id = command.ticket_id.get(),
        thread_id = command.thread_id.map(ChannelId::get),
        repair = command.repair,
        "Sync requested"
    );
    let (request, reply) = SyncRequest::new(command.ticket_id, command.thread_id, command.repair);
    state.requests.send(request).await.map_err(|_| unavailable())?;
    let reply = reply.await.map_err(|_| unavailable())??;
    Ok(Json(reply))
}

/// Ask a running bridge at `addr` to synchronize a ticket.
///
/// Returns `Ok(None)` when nothing is listening, so the caller can run the
/// pass itself.
pub async fn request_sync(
    addr: SocketAddr,
    command: &SyncCommand,
    timeout: Duration,
) -> Result<Option<SyncReply>> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = match client
        .post(format!("http://{addr}/v1/sync"))
        .json(command)
        .send()
        .await
    {
        Ok(response) => response,
        Err(error) if error.is_connect() => {
            tracing::debug!(%addr, %error, "No bridge listening");
            return Ok(None);
        }
        Err(error) => return Err(error.into()),
    };

    let status = response.status();
    if status.is_success() {
        return Ok(Some(response.json::<SyncReply>().await?));
    }
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    Err(Error::remote(status.as_u16(), message))
}
