//! Engine — the central coordinator of the zkprovd proving daemon.
//!
//! Owns the circuit catalog, the job registry, the bounded ready-queue,
//! and the background tasks (worker, GC). Provides the operations the RPC
//! handler layer calls into.
//!
//! ```text
//! RPC handlers ──► registry ──┐
//! witness socket ─► ingest ───┤ ready-queue (bounded) ──► worker ──► prover
//!                             └──────────── GC sweep ◄── timer
//! ```

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::prover::{CancelFlag, Prover};
use crate::registry::JobRegistry;
use crate::types::{Error, JobId, Result};
use crate::{gc, witness, worker};

/// The zkprovd proving engine.
pub struct Engine {
    config: Config,
    catalog: Arc<Catalog>,
    registry: Arc<JobRegistry>,
    queue_tx: mpsc::Sender<JobId>,
    /// Taken by the worker on the first `start` call.
    queue_rx: Mutex<Option<mpsc::Receiver<JobId>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Engine {
    /// Load the circuit catalog and assemble an engine.
    ///
    /// Catalog loading is the expensive part of startup; it fails hard on
    /// a missing or malformed circuit directory.
    pub fn new(config: Config, prover: Arc<dyn Prover>) -> Result<Self> {
        config.validate()?;
        let catalog = Arc::new(Catalog::load(&config.circuits.dir, prover.as_ref())?);
        info!(circuits = ?catalog.ids(), "circuit catalog loaded");

        let registry = Arc::new(JobRegistry::new(catalog.clone(), config.jobs.default_ttl()));
        let (queue_tx, queue_rx) = mpsc::channel(config.worker.queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            catalog,
            registry,
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Spawn the worker and the GC.
    pub async fn start(&self) -> Result<()> {
        let queue_rx = self
            .queue_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::Internal("engine already started".to_string()))?;

        tokio::spawn(worker::run(
            self.registry.clone(),
            self.catalog.clone(),
            queue_rx,
            self.shutdown_rx.clone(),
        ));
        tokio::spawn(gc::run(
            self.registry.clone(),
            self.config.jobs.gc_interval(),
            self.shutdown_rx.clone(),
        ));
        info!("engine started");
        Ok(())
    }

    /// Run the witness accept loop on `listener` until shutdown.
    pub async fn serve_witness(&self, listener: TcpListener) {
        witness::serve(
            listener,
            self.registry.clone(),
            self.catalog.clone(),
            self.queue_tx.clone(),
            self.config.witness.read_timeout(),
            self.shutdown_rx.clone(),
        )
        .await;
    }

    /// Prove synchronously, bypassing the job queue. Meant for small
    /// circuits where queueing overhead dominates.
    pub async fn prove(&self, circuit_id: &str, witness: Vec<u8>) -> Result<Vec<u8>> {
        let circuit = self.catalog.lookup(circuit_id)?;
        if witness.len() != circuit.full_witness_size {
            return Err(Error::InvalidWitness(format!(
                "expected {} witness bytes, got {}",
                circuit.full_witness_size,
                witness.len()
            )));
        }
        let handle = circuit.handle.clone();
        let cancel = CancelFlag::new();
        tokio::task::spawn_blocking(move || {
            let mut reader = Cursor::new(witness);
            handle.prove(&mut reader, &cancel)
        })
        .await
        .map_err(|e| Error::Internal(format!("prover task panicked: {e}")))?
    }

    /// Verify a proof against a serialized public witness.
    pub async fn verify(
        &self,
        circuit_id: &str,
        proof: Vec<u8>,
        public_witness: Vec<u8>,
    ) -> Result<bool> {
        let circuit = self.catalog.lookup(circuit_id)?;
        if public_witness.len() != circuit.public_witness_size {
            return Err(Error::InvalidWitness(format!(
                "expected {} public witness bytes, got {}",
                circuit.public_witness_size,
                public_witness.len()
            )));
        }
        let handle = circuit.handle.clone();
        let verified = tokio::task::spawn_blocking(move || handle.verify(&proof, &public_witness))
            .await
            .map_err(|e| Error::Internal(format!("verifier task panicked: {e}")))??;
        if !verified {
            warn!(circuit_id = circuit_id, "proof verification failed");
        }
        Ok(verified)
    }

    /// Create an async prove job; the witness arrives over the witness
    /// socket.
    pub async fn create_prove_job(&self, circuit_id: &str, ttl: Option<Duration>) -> Result<JobId> {
        self.registry.create(circuit_id, ttl).await
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// A receiver that resolves once shutdown is requested.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Request a graceful shutdown: the worker, witness listener and GC
    /// drain and exit. In-flight proofs run to completion.
    pub fn shutdown(&self) {
        info!("shutting down engine");
        let _ = self.shutdown_tx.send(true);
    }
}
