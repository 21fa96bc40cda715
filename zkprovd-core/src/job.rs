//! Job record and its lock-protected mutable state.
//!
//! A [`Job`] is shared as `Arc<Job>` between the registry, the worker, the
//! witness listener and subscription tasks. Everything mutable lives behind
//! one tokio mutex ([`JobState`]); the id, circuit reference, expiration
//! instant and cancel flag are fixed at creation. The mutex is a tokio
//! mutex on purpose: the witness listener keeps it held across socket
//! reads so that cancellation and expiry can never interleave with a
//! partially ingested witness.

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex, MutexGuard};

use crate::prover::CancelFlag;
use crate::types::{JobError, JobId, JobSnapshot, JobStatus};

pub struct Job {
    pub id: JobId,
    pub circuit_id: String,
    /// Fixed at creation; never extended.
    pub expiration: Instant,
    cancel: CancelFlag,
    state: Mutex<JobState>,
}

pub(crate) struct JobState {
    pub status: JobStatus,
    /// Present only from witness admission until the worker consumes it.
    pub witness: Option<Vec<u8>>,
    /// Present only once the job completed.
    pub proof: Option<Vec<u8>>,
    /// Present only once the job errored.
    pub err: Option<JobError>,
    /// One-slot wake-hint channels, one per subscriber. The hint carries no
    /// data: subscribers re-read the job state on wake, so a full slot just
    /// means a wake-up is already pending.
    pub subscribers: Vec<mpsc::Sender<()>>,
}

impl Job {
    pub(crate) fn new(id: JobId, circuit_id: String, ttl: Duration) -> Self {
        Self {
            id,
            circuit_id,
            expiration: Instant::now() + ttl,
            cancel: CancelFlag::new(),
            state: Mutex::new(JobState {
                status: JobStatus::WaitingWitness,
                witness: None,
                proof: None,
                err: None,
                subscribers: Vec::new(),
            }),
        }
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() > self.expiration
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().await
    }

    pub async fn snapshot(&self) -> JobSnapshot {
        let state = self.state.lock().await;
        state.snapshot(self)
    }
}

impl JobState {
    pub(crate) fn snapshot(&self, job: &Job) -> JobSnapshot {
        JobSnapshot {
            id: job.id,
            circuit_id: job.circuit_id.clone(),
            status: self.status,
            err: self.err.as_ref().map(|e| e.to_string()),
            proof: self.proof.clone(),
        }
    }
}
