//! Job registry — owns the job map, the lifecycle state machine, and
//! subscription fan-out.
//!
//! Two levels of locking, deliberately kept apart: the registry's RwLock
//! guards only map membership (insert/get/remove); each job's own mutex
//! guards its fields and its subscriber list. Status changes go through
//! [`JobRegistry::set_status`] exclusively, which validates the transition
//! against the lifecycle DAG and nudges subscribers while the job lock is
//! still held.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::catalog::Catalog;
use crate::job::{Job, JobState};
use crate::types::{Error, JobError, JobId, JobSnapshot, JobStatus, Result};

/// Abort the process on an internal-consistency violation.
///
/// A failed invariant here means the registry would silently corrupt
/// future jobs; dying loudly is the only safe option.
pub(crate) fn fatal_inconsistency(msg: &str) -> ! {
    error!(error = msg, "internal inconsistency, aborting");
    std::process::exit(2);
}

pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<Job>>>,
    catalog: Arc<Catalog>,
    default_ttl: Duration,
}

impl JobRegistry {
    pub fn new(catalog: Arc<Catalog>, default_ttl: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            catalog,
            default_ttl,
        }
    }

    /// Allocate a job in `WaitingWitness` for a known circuit.
    pub async fn create(&self, circuit_id: &str, ttl: Option<Duration>) -> Result<JobId> {
        // fail fast before allocating anything
        self.catalog.lookup(circuit_id)?;

        let id = JobId::new();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let job = Arc::new(Job::new(id, circuit_id.to_string(), ttl));
        self.jobs.write().await.insert(id, job);
        info!(job_id = %id, circuit_id = circuit_id, ttl_secs = ttl.as_secs(), "created prove job");
        Ok(id)
    }

    pub async fn get(&self, id: JobId) -> Result<Arc<Job>> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::UnknownJob(id))
    }

    /// Cancel a job. Idempotent on terminal jobs; cooperative for running
    /// ones (the prover's cancel flag is raised, the outcome is decided by
    /// the worker).
    pub async fn cancel(&self, id: JobId) -> Result<()> {
        let job = self.get(id).await?;
        let mut state = job.lock().await;
        match state.status {
            JobStatus::WaitingWitness | JobStatus::Queued => {
                info!(job_id = %id, "cancelling job");
                state.err = Some(JobError::Cancelled);
                self.set_status(&job, &mut state, JobStatus::Errored);
            }
            JobStatus::Running => {
                info!(job_id = %id, "cancel requested for running job");
                job.cancel_flag().set();
            }
            JobStatus::Completed | JobStatus::Errored => {
                debug!(job_id = %id, status = %state.status, "cancel on terminal job is a no-op");
            }
        }
        Ok(())
    }

    /// Snapshot every job, expiring stale ones on the way.
    pub async fn list(&self) -> Vec<JobSnapshot> {
        let jobs: Vec<Arc<Job>> = self.jobs.read().await.values().cloned().collect();
        let mut snapshots = Vec::with_capacity(jobs.len());
        for job in jobs {
            self.expire_if_due(&job).await;
            snapshots.push(job.snapshot().await);
        }
        snapshots.sort_by_key(|s| s.id);
        snapshots
    }

    /// Register a subscriber and return its snapshot stream.
    ///
    /// The current status is emitted immediately. Afterwards every observed
    /// transition yields one snapshot; a slow subscriber may observe
    /// coalesced intermediates but always sees the terminal state, after
    /// which the stream closes.
    pub async fn subscribe(&self, id: JobId) -> Result<mpsc::Receiver<JobSnapshot>> {
        let job = self.get(id).await?;
        self.expire_if_due(&job).await;

        // Max emissions per job: initial + Queued + Running + terminal.
        let (out_tx, out_rx) = mpsc::channel(8);

        // Registration and the initial emission happen under one lock hold,
        // so no transition can slip between them: anything later raises a
        // wake hint.
        let (mut last, mut hint_rx) = {
            let mut state = job.lock().await;
            let snapshot = state.snapshot(&job);
            let status = snapshot.status;
            let _ = out_tx.try_send(snapshot);
            if status.is_terminal() {
                return Ok(out_rx);
            }
            let (hint_tx, hint_rx) = mpsc::channel(1);
            state.subscribers.push(hint_tx);
            (status, hint_rx)
        };

        tokio::spawn(async move {
            loop {
                let wake = hint_rx.recv().await;
                let snapshot = job.snapshot().await;
                let status = snapshot.status;
                if status != last {
                    last = status;
                    if out_tx.send(snapshot).await.is_err() {
                        // subscriber went away
                        return;
                    }
                }
                if status.is_terminal() || wake.is_none() {
                    return;
                }
            }
        });

        Ok(out_rx)
    }

    /// Expire a stale job that has not yet entered execution.
    ///
    /// Running jobs are left to the worker: their outcome (including a
    /// cooperative cancel) decides the terminal state, which keeps the
    /// one-terminal-transition guarantee.
    pub(crate) async fn expire_if_due(&self, job: &Job) {
        if !job.is_expired() {
            return;
        }
        let mut state = job.lock().await;
        if !matches!(state.status, JobStatus::WaitingWitness | JobStatus::Queued) {
            return;
        }
        warn!(job_id = %job.id, "job TTL expired");
        state.err = Some(JobError::Expired);
        self.set_status(job, &mut state, JobStatus::Errored);
    }

    /// One garbage-collection pass: expire stale jobs, evict expired
    /// terminal ones.
    pub async fn sweep_expired(&self) {
        let jobs: Vec<Arc<Job>> = self.jobs.read().await.values().cloned().collect();
        let mut evict = Vec::new();
        for job in jobs {
            if !job.is_expired() {
                continue;
            }
            self.expire_if_due(&job).await;
            if job.lock().await.status.is_terminal() {
                evict.push(job.id);
            }
        }
        if evict.is_empty() {
            return;
        }
        let mut jobs = self.jobs.write().await;
        for id in evict {
            debug!(job_id = %id, "evicting expired job");
            jobs.remove(&id);
        }
    }

    /// Apply a status transition and fan out to subscribers.
    ///
    /// The caller holds the job lock; the transition, the invariant
    /// bookkeeping and the subscriber nudges all happen under that single
    /// hold. An illegal transition is a defect, not an input error, and
    /// takes the process down.
    pub(crate) fn set_status(&self, job: &Job, state: &mut JobState, next: JobStatus) {
        if !state.status.can_transition_to(next) {
            fatal_inconsistency(&format!(
                "illegal status transition {} -> {} for job {}",
                state.status, next, job.id
            ));
        }
        debug!(job_id = %job.id, from = %state.status, to = %next, "job status transition");
        state.status = next;

        if next.is_terminal() {
            // a witness is only retained while queued or running
            state.witness = None;
            // final nudge, then release the sinks: their closing channels
            // tell subscribers no further transition can come
            for sub in state.subscribers.drain(..) {
                let _ = sub.try_send(());
            }
        } else {
            for sub in &state.subscribers {
                let _ = sub.try_send(());
            }
        }
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insecure::{
        encode_proving_key, encode_r1cs, encode_verifying_key, InsecureProver,
    };
    use crate::prover::CircuitShape;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_catalog() -> (TempDir, Arc<Catalog>) {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("bn254/mul");
        fs::create_dir_all(&dir).unwrap();
        let key = [9u8; 32];
        let shape = CircuitShape { nb_public: 2, nb_secret: 3 };
        fs::write(dir.join("mul.r1cs"), encode_r1cs(shape)).unwrap();
        fs::write(dir.join("mul.pk"), encode_proving_key(&key)).unwrap();
        fs::write(dir.join("mul.vk"), encode_verifying_key(&key)).unwrap();
        let catalog = Arc::new(Catalog::load(tmp.path(), &InsecureProver).unwrap());
        (tmp, catalog)
    }

    fn registry(catalog: Arc<Catalog>) -> JobRegistry {
        JobRegistry::new(catalog, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_create_requires_known_circuit() {
        let (_tmp, catalog) = test_catalog();
        let registry = registry(catalog);
        assert!(matches!(
            registry.create("bn254/nope", None).await,
            Err(Error::UnknownCircuit(_))
        ));
        assert!(registry.create("bn254/mul", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_get_unknown_job() {
        let (_tmp, catalog) = test_catalog();
        let registry = registry(catalog);
        assert!(matches!(
            registry.get(JobId::new()).await,
            Err(Error::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_before_witness() {
        let (_tmp, catalog) = test_catalog();
        let registry = registry(catalog);
        let id = registry.create("bn254/mul", None).await.unwrap();
        registry.cancel(id).await.unwrap();

        let snapshot = registry.get(id).await.unwrap().snapshot().await;
        assert_eq!(snapshot.status, JobStatus::Errored);
        assert_eq!(snapshot.err.as_deref(), Some("job cancelled"));

        // idempotent on terminal jobs
        registry.cancel(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_emits_current_status_immediately() {
        let (_tmp, catalog) = test_catalog();
        let registry = registry(catalog);
        let id = registry.create("bn254/mul", None).await.unwrap();

        let mut rx = registry.subscribe(id).await.unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.status, JobStatus::WaitingWitness);
    }

    #[tokio::test]
    async fn test_subscribe_after_terminal_closes_after_one_message() {
        let (_tmp, catalog) = test_catalog();
        let registry = registry(catalog);
        let id = registry.create("bn254/mul", None).await.unwrap();
        registry.cancel(id).await.unwrap();

        let mut rx = registry.subscribe(id).await.unwrap();
        let only = rx.recv().await.unwrap();
        assert_eq!(only.status, JobStatus::Errored);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_all_subscribers_observe_terminal_state() {
        let (_tmp, catalog) = test_catalog();
        let registry = registry(catalog);
        let id = registry.create("bn254/mul", None).await.unwrap();

        let mut receivers = Vec::new();
        for _ in 0..8 {
            receivers.push(registry.subscribe(id).await.unwrap());
        }
        registry.cancel(id).await.unwrap();

        for mut rx in receivers {
            let mut last = None;
            while let Some(snapshot) = rx.recv().await {
                last = Some(snapshot.status);
            }
            assert_eq!(last, Some(JobStatus::Errored));
        }
    }

    #[tokio::test]
    async fn test_expired_job_errored_then_evicted() {
        let (_tmp, catalog) = test_catalog();
        let registry = registry(catalog);
        let id = registry
            .create("bn254/mul", Some(Duration::from_millis(0)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let listed = registry.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, JobStatus::Errored);
        assert_eq!(listed[0].err.as_deref(), Some("job expired"));

        registry.sweep_expired().await;
        assert_eq!(registry.job_count().await, 0);
        assert!(matches!(registry.get(id).await, Err(Error::UnknownJob(_))));
    }

    #[tokio::test]
    async fn test_sweep_keeps_live_jobs() {
        let (_tmp, catalog) = test_catalog();
        let registry = registry(catalog);
        registry.create("bn254/mul", None).await.unwrap();
        registry.sweep_expired().await;
        assert_eq!(registry.job_count().await, 1);
    }
}
