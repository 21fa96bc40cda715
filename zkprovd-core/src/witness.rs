//! Witness listener — the out-of-band TCP ingestion path.
//!
//! Witnesses can be hundreds of megabytes, so they travel over a raw TCP
//! side channel instead of the RPC connection: 16 preamble bytes naming
//! the job, then exactly `full_witness_size` payload bytes, answered with
//! `"ok"` or `"nok"` before the server closes the connection.
//!
//! The job's lock is held from the status check through the payload read.
//! That is the point, not an accident: a concurrent cancel or expiry can
//! never observe a half-written witness slot — the job either leaves
//! `WaitingWitness` with its complete witness or not at all. Every read
//! carries a deadline so a stalled client cannot pin the lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::catalog::Catalog;
use crate::registry::{fatal_inconsistency, JobRegistry};
use crate::types::{Error, JobId, JobStatus, Result};

const ACK_OK: &[u8] = b"ok";
const ACK_NOK: &[u8] = b"nok";

pub(crate) async fn serve(
    listener: TcpListener,
    registry: Arc<JobRegistry>,
    catalog: Arc<Catalog>,
    queue_tx: mpsc::Sender<JobId>,
    read_timeout: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!("witness listener started");
    loop {
        let (stream, peer) = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("witness listener received shutdown signal");
                    break;
                }
                continue;
            }
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "couldn't accept connection on witness socket");
                    continue;
                }
            },
        };

        info!(peer = %peer, "receiving a witness");
        let registry = registry.clone();
        let catalog = catalog.clone();
        let queue_tx = queue_tx.clone();
        tokio::spawn(async move {
            handle_conn(stream, registry, catalog, queue_tx, read_timeout).await;
        });
    }
    info!("witness listener stopped");
}

async fn handle_conn(
    mut stream: TcpStream,
    registry: Arc<JobRegistry>,
    catalog: Arc<Catalog>,
    queue_tx: mpsc::Sender<JobId>,
    read_timeout: Duration,
) {
    let result = ingest(&mut stream, &registry, &catalog, &queue_tx, read_timeout).await;
    let ack = match &result {
        Ok(job_id) => {
            info!(job_id = %job_id, "witness accepted");
            ACK_OK
        }
        Err(e) => {
            warn!(error = %e, "receive witness failed");
            ACK_NOK
        }
    };
    if let Err(e) = stream.write_all(ack).await {
        error!(error = %e, "couldn't respond on witness socket");
    }
    if result.is_err() {
        // On a rejection the client may still be mid-upload. Consume what
        // it sent before closing, or the reset on close can destroy the
        // ack before the client reads it.
        let _ = timeout(read_timeout, drain(&mut stream)).await;
    }
    // dropping the stream closes the connection
}

async fn drain(stream: &mut TcpStream) {
    let mut sink = [0u8; 8192];
    loop {
        match stream.read(&mut sink).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

async fn ingest(
    stream: &mut TcpStream,
    registry: &JobRegistry,
    catalog: &Catalog,
    queue_tx: &mpsc::Sender<JobId>,
    read_timeout: Duration,
) -> Result<JobId> {
    let mut preamble = [0u8; 16];
    read_exact_deadline(stream, &mut preamble, read_timeout, "job id").await?;
    let job_id = JobId::from_bytes(preamble);

    let job = registry.get(job_id).await?;
    registry.expire_if_due(&job).await;

    let mut state = job.lock().await;
    if state.status != JobStatus::WaitingWitness {
        return Err(Error::InvalidJobState { id: job_id, status: state.status });
    }

    // /!\ the job lock stays held while the witness streams in /!\
    let circuit = match catalog.lookup(&job.circuit_id) {
        Ok(circuit) => circuit,
        Err(_) => fatal_inconsistency(&format!(
            "job {job_id} references circuit {} missing from the catalog",
            job.circuit_id
        )),
    };

    let mut witness = vec![0u8; circuit.full_witness_size];
    read_exact_deadline(stream, &mut witness, read_timeout, "witness").await?;

    state.witness = Some(witness);
    registry.set_status(&job, &mut state, JobStatus::Queued);
    drop(state);

    // Blocking send: when the worker is saturated and the queue is full,
    // this is where backpressure lands.
    if queue_tx.send(job_id).await.is_err() {
        return Err(Error::Internal("ready-queue closed".to_string()));
    }

    Ok(job_id)
}

async fn read_exact_deadline(
    stream: &mut TcpStream,
    buf: &mut [u8],
    deadline: Duration,
    what: &str,
) -> Result<()> {
    match timeout(deadline, stream.read_exact(buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(Error::InvalidWitness(format!("reading {what}: {e}"))),
        Err(_) => Err(Error::InvalidWitness(format!("timed out reading {what}"))),
    }
}
