//! Worker — the single consumer of the ready-queue.
//!
//! Proving is CPU- and RAM-heavy and already parallel inside the backend,
//! so exactly one job runs at a time: the bounded queue in front of this
//! loop is the admission-control and backpressure mechanism, not a
//! parallelism knob.

use std::io::Cursor;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::catalog::Catalog;
use crate::registry::{fatal_inconsistency, JobRegistry};
use crate::types::{Error, JobError, JobId, JobStatus};

pub(crate) async fn run(
    registry: Arc<JobRegistry>,
    catalog: Arc<Catalog>,
    mut queue_rx: mpsc::Receiver<JobId>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!("worker started");
    loop {
        let job_id = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("worker received shutdown signal");
                    break;
                }
                continue;
            }
            id = queue_rx.recv() => match id {
                Some(id) => id,
                None => {
                    info!("ready-queue closed, worker stopping");
                    break;
                }
            },
        };

        let span = info_span!("prove_job", job_id = %job_id);
        execute(&registry, &catalog, job_id).instrument(span).await;
    }
    info!("worker stopped");
}

async fn execute(registry: &JobRegistry, catalog: &Catalog, job_id: JobId) {
    let job = match registry.get(job_id).await {
        Ok(job) => job,
        Err(_) => {
            // the GC evicted it between enqueue and pickup
            warn!("queued job no longer in registry, skipping");
            return;
        }
    };

    registry.expire_if_due(&job).await;

    let witness = {
        let mut state = job.lock().await;
        if state.status != JobStatus::Queued {
            // cancelled or expired while sitting in the queue
            debug!(status = %state.status, "skipping job no longer queued");
            return;
        }
        registry.set_status(&job, &mut state, JobStatus::Running);
        state.witness.take()
    };
    let Some(witness) = witness else {
        fatal_inconsistency(&format!("queued job {job_id} has no witness"));
    };

    let circuit = match catalog.lookup(&job.circuit_id) {
        Ok(circuit) => circuit,
        Err(_) => fatal_inconsistency(&format!(
            "job {job_id} references circuit {} missing from the catalog",
            job.circuit_id
        )),
    };

    info!(circuit_id = %job.circuit_id, witness_len = witness.len(), "executing prove job");

    let handle = circuit.handle.clone();
    let cancel = job.cancel_flag().clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut reader = Cursor::new(witness);
        handle.prove(&mut reader, &cancel)
    })
    .await;

    let mut state = job.lock().await;
    if state.status != JobStatus::Running {
        // a concurrent terminal transition won; nothing left to record
        warn!(status = %state.status, "job reached a terminal state while proving, discarding result");
        return;
    }
    match result {
        Ok(Ok(proof)) => {
            info!(proof_len = proof.len(), "successfully computed proof");
            state.proof = Some(proof);
            registry.set_status(&job, &mut state, JobStatus::Completed);
        }
        Ok(Err(e)) => {
            error!(error = %e, "proving job failed");
            state.err = Some(match e {
                Error::JobCancelled => JobError::Cancelled,
                other => JobError::Prover(other.to_string()),
            });
            registry.set_status(&job, &mut state, JobStatus::Errored);
        }
        Err(e) => {
            error!(error = %e, "prover task panicked");
            state.err = Some(JobError::Prover(format!("prover task panicked: {e}")));
            registry.set_status(&job, &mut state, JobStatus::Errored);
        }
    }
}
