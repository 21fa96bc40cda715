//! HTTP/JSON framing over [`ProveService`].
//!
//! Routes:
//!
//! ```text
//! POST /v1/prove                 synchronous prove
//! POST /v1/verify                synchronous verify
//! POST /v1/jobs                  create prove job
//! GET  /v1/jobs                  list job snapshots
//! POST /v1/jobs/:id/cancel       cancel (idempotent)
//! GET  /v1/jobs/:id/events       SSE stream of status snapshots
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use zkprovd_core::{Error, JobSnapshot};

use crate::service::{
    CreateProveJobRequest, CreateProveJobResponse, ProveRequest, ProveResponse, ProveService,
    VerifyRequest, VerifyResponse,
};

pub fn router(service: Arc<ProveService>) -> Router {
    Router::new()
        .route("/v1/prove", post(prove))
        .route("/v1/verify", post(verify))
        .route("/v1/jobs", post(create_job).get(list_jobs))
        .route("/v1/jobs/:id/cancel", post(cancel_job))
        .route("/v1/jobs/:id/events", get(subscribe_job))
        .with_state(service)
}

/// Serve the RPC surface until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    service: Arc<ProveService>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}

struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::UnknownCircuit(_) | Error::UnknownJob(_) => StatusCode::NOT_FOUND,
            Error::InvalidJobId(_) | Error::InvalidWitness(_) | Error::Config(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::InvalidJobState { .. } | Error::JobExpired | Error::JobCancelled => {
                StatusCode::CONFLICT
            }
            Error::ProverFailed(_) | Error::Io(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

async fn prove(
    State(service): State<Arc<ProveService>>,
    Json(req): Json<ProveRequest>,
) -> Result<Json<ProveResponse>, ApiError> {
    Ok(Json(service.prove(req).await?))
}

async fn verify(
    State(service): State<Arc<ProveService>>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    Ok(Json(service.verify(req).await?))
}

async fn create_job(
    State(service): State<Arc<ProveService>>,
    Json(req): Json<CreateProveJobRequest>,
) -> Result<Json<CreateProveJobResponse>, ApiError> {
    Ok(Json(service.create_prove_job(req).await?))
}

async fn list_jobs(State(service): State<Arc<ProveService>>) -> Json<Vec<JobSnapshot>> {
    Json(service.list_prove_jobs().await)
}

async fn cancel_job(
    State(service): State<Arc<ProveService>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    service.cancel_prove_job(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn subscribe_job(
    State(service): State<Arc<ProveService>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let rx = service.subscribe_to_prove_job(&id).await?;
    let stream = ReceiverStream::new(rx).map(|snapshot| {
        let data = serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event("status").data(data))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
