//! zkprovd-core: Core engine library for the zkprovd proving daemon.
//!
//! Provides the [`Engine`] type which ties together the circuit catalog,
//! the job registry and its lifecycle state machine, the bounded-queue
//! prove worker, the out-of-band witness ingestion listener, and the TTL
//! garbage collector. Proving itself lives behind the [`Prover`] seam.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod insecure;
pub mod job;
pub mod prover;
pub mod registry;
pub mod types;

mod gc;
mod witness;
mod worker;

pub use catalog::{Catalog, CircuitRecord};
pub use config::Config;
pub use engine::Engine;
pub use insecure::InsecureProver;
pub use job::Job;
pub use prover::{CancelFlag, CircuitHandle, CircuitShape, Prover};
pub use registry::JobRegistry;
pub use types::{Curve, Error, JobError, JobId, JobSnapshot, JobStatus, Result};
