//! The proving collaborator seam.
//!
//! The engine never inspects keys or constraint systems: it loads the
//! on-disk artifacts as opaque bytes and hands them to a [`Prover`], which
//! returns an opaque [`CircuitHandle`] the worker later calls into. A
//! production backend plugs in by implementing these two traits; the
//! engine, catalog, and job machinery are agnostic to it.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::types::{Curve, Result};

/// Cooperative cancellation hook handed to [`CircuitHandle::prove`].
///
/// Provers are expected to poll the flag at convenient points and bail out
/// with [`crate::Error::JobCancelled`] when it is set. A prover that never
/// polls simply runs to completion and the cancel becomes a no-op.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Variable counts of a compiled constraint system.
///
/// `nb_public` includes the constant one-wire, matching the convention of
/// the witness wire encoding: a serialized witness carries a 4-byte
/// big-endian element count followed by `count` field elements, where
/// `count` excludes the one-wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitShape {
    pub nb_public: usize,
    pub nb_secret: usize,
}

impl CircuitShape {
    /// Byte length of a serialized public witness for this shape.
    pub fn public_witness_size(&self, curve: Curve) -> usize {
        4 + (self.nb_public - 1) * curve.fr_size()
    }

    /// Byte length of a serialized full (public + secret) witness.
    pub fn full_witness_size(&self, curve: Curve) -> usize {
        4 + (self.nb_public + self.nb_secret - 1) * curve.fr_size()
    }
}

/// Deserializes circuit artifacts into opaque handles.
pub trait Prover: Send + Sync + 'static {
    /// Parse the `.r1cs`, `.pk` and `.vk` artifact bytes for one circuit.
    fn load_circuit(
        &self,
        curve: Curve,
        r1cs: &[u8],
        pk: &[u8],
        vk: &[u8],
    ) -> Result<Arc<dyn CircuitHandle>>;
}

/// A loaded circuit, ready to prove and verify.
///
/// Both operations are CPU-bound and blocking; callers run them on a
/// blocking thread.
pub trait CircuitHandle: Send + Sync + std::fmt::Debug {
    fn shape(&self) -> CircuitShape;

    /// Read a full witness from `witness` and compute a serialized proof.
    fn prove(&self, witness: &mut dyn Read, cancel: &CancelFlag) -> Result<Vec<u8>>;

    /// Check `proof` against a serialized public witness.
    ///
    /// Returns `Ok(false)` for any verification failure; `Err` is reserved
    /// for malformed inputs the backend cannot interpret at all.
    fn verify(&self, proof: &[u8], public_witness: &[u8]) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        assert!(!flag.is_set());
        let clone = flag.clone();
        clone.set();
        assert!(flag.is_set());
    }

    #[test]
    fn test_witness_sizes() {
        // 1 public input (+ one-wire) and 3 secrets on a 32-byte field:
        // public = 4 + 1*32, full = 4 + 4*32.
        let shape = CircuitShape { nb_public: 2, nb_secret: 3 };
        assert_eq!(shape.public_witness_size(Curve::Bn254), 36);
        assert_eq!(shape.full_witness_size(Curve::Bn254), 132);

        // BW6-761 scalars are 48 bytes wide.
        assert_eq!(shape.public_witness_size(Curve::Bw6_761), 52);
        assert_eq!(shape.full_witness_size(Curve::Bw6_761), 196);
    }
}
