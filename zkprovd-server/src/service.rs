//! Handler layer for the proving service RPC surface.
//!
//! `ProveService` is the transport-neutral contract: each method maps to
//! one RPC, takes plain request types and returns core results. The HTTP
//! layer in [`crate::http`] is just framing around these calls.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use zkprovd_core::{Engine, JobId, JobSnapshot, Result};

pub struct ProveService {
    engine: Arc<Engine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProveRequest {
    pub circuit_id: String,
    pub witness: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProveResponse {
    pub proof: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub circuit_id: String,
    pub proof: Vec<u8>,
    pub public_witness: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProveJobRequest {
    pub circuit_id: String,
    /// Seconds the job may live before the GC reaps it. Server default
    /// applies when omitted.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProveJobResponse {
    pub job_id: JobId,
}

impl ProveService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Synchronous proof, bypassing the job queue.
    pub async fn prove(&self, req: ProveRequest) -> Result<ProveResponse> {
        info!(circuit_id = %req.circuit_id, witness_len = req.witness.len(), "Prove");
        let proof = self.engine.prove(&req.circuit_id, req.witness).await?;
        Ok(ProveResponse { proof })
    }

    pub async fn verify(&self, req: VerifyRequest) -> Result<VerifyResponse> {
        info!(circuit_id = %req.circuit_id, "Verify");
        let ok = self
            .engine
            .verify(&req.circuit_id, req.proof, req.public_witness)
            .await?;
        Ok(VerifyResponse { ok })
    }

    pub async fn create_prove_job(
        &self,
        req: CreateProveJobRequest,
    ) -> Result<CreateProveJobResponse> {
        info!(circuit_id = %req.circuit_id, ttl_secs = ?req.ttl_secs, "CreateProveJob");
        let ttl = req.ttl_secs.map(Duration::from_secs);
        let job_id = self.engine.create_prove_job(&req.circuit_id, ttl).await?;
        Ok(CreateProveJobResponse { job_id })
    }

    /// Idempotent: cancelling a terminal job is a no-op.
    pub async fn cancel_prove_job(&self, job_id: &str) -> Result<()> {
        info!(job_id = job_id, "CancelProveJob");
        let id = JobId::parse(job_id)?;
        self.engine.registry().cancel(id).await
    }

    pub async fn list_prove_jobs(&self) -> Vec<JobSnapshot> {
        self.engine.registry().list().await
    }

    /// Server-streaming subscription: the current status immediately, one
    /// snapshot per observed transition after that, closed after the
    /// terminal state.
    pub async fn subscribe_to_prove_job(
        &self,
        job_id: &str,
    ) -> Result<mpsc::Receiver<JobSnapshot>> {
        info!(job_id = job_id, "SubscribeToProveJob");
        let id = JobId::parse(job_id)?;
        self.engine.registry().subscribe(id).await
    }
}
