//! Development proving backend.
//!
//! `InsecureProver` implements the [`Prover`] seam with SHA-256 commitments
//! instead of real Groth16 proofs: a "proof" is the hash of a per-circuit
//! key over the public section of the witness, and verification recomputes
//! the hash. This keeps the full daemon runnable and testable end to end
//! without a curve backend. It provides NO zero-knowledge and NO soundness
//! against anyone holding the key material — production deployments must
//! supply a real [`Prover`].
//!
//! Artifact format understood by this backend:
//!
//! ```text
//! <name>.r1cs   "ZKR1" || u32be nb_public || u32be nb_secret
//! <name>.pk     "ZKPK" || 32-byte key
//! <name>.vk     "ZKVK" || the same 32-byte key
//! ```
//!
//! The `encode_*` helpers below generate these artifacts (and matching
//! witnesses) for tests and local setups.

use std::io::Read;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::prover::{CancelFlag, CircuitHandle, CircuitShape, Prover};
use crate::types::{Curve, Error, Result};

const R1CS_MAGIC: &[u8; 4] = b"ZKR1";
const PK_MAGIC: &[u8; 4] = b"ZKPK";
const VK_MAGIC: &[u8; 4] = b"ZKVK";

/// Length of a proof produced by this backend (one SHA-256 digest).
pub const PROOF_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, Default)]
pub struct InsecureProver;

#[derive(Debug)]
struct InsecureCircuit {
    curve: Curve,
    shape: CircuitShape,
    key: [u8; 32],
}

impl Prover for InsecureProver {
    fn load_circuit(
        &self,
        curve: Curve,
        r1cs: &[u8],
        pk: &[u8],
        vk: &[u8],
    ) -> Result<Arc<dyn CircuitHandle>> {
        let shape = decode_r1cs(r1cs)?;
        let pk_key = decode_key(pk, PK_MAGIC, "proving key")?;
        let vk_key = decode_key(vk, VK_MAGIC, "verifying key")?;
        if pk_key != vk_key {
            return Err(Error::ProverFailed(
                "proving and verifying keys do not match".to_string(),
            ));
        }
        Ok(Arc::new(InsecureCircuit { curve, shape, key: pk_key }))
    }
}

impl CircuitHandle for InsecureCircuit {
    fn shape(&self) -> CircuitShape {
        self.shape
    }

    fn prove(&self, witness: &mut dyn Read, cancel: &CancelFlag) -> Result<Vec<u8>> {
        if cancel.is_set() {
            return Err(Error::JobCancelled);
        }

        let expected = self.shape.full_witness_size(self.curve);
        let mut buf = Vec::with_capacity(expected);
        witness.read_to_end(&mut buf)?;
        if buf.len() != expected {
            return Err(Error::InvalidWitness(format!(
                "expected {} witness bytes, got {}",
                expected,
                buf.len()
            )));
        }
        let declared = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        let nb_elements = self.shape.nb_public + self.shape.nb_secret - 1;
        if declared != nb_elements {
            return Err(Error::InvalidWitness(format!(
                "witness header declares {declared} elements, circuit has {nb_elements}"
            )));
        }

        if cancel.is_set() {
            return Err(Error::JobCancelled);
        }

        let public = public_section(self.curve, self.shape, &buf);
        Ok(commit(&self.key, &public))
    }

    fn verify(&self, proof: &[u8], public_witness: &[u8]) -> Result<bool> {
        if proof.len() != PROOF_SIZE {
            return Ok(false);
        }
        Ok(commit(&self.key, public_witness) == proof)
    }
}

/// Hash the circuit key over the serialized public witness.
fn commit(key: &[u8; 32], public_witness: &[u8]) -> Vec<u8> {
    Sha256::new()
        .chain_update(key)
        .chain_update(public_witness)
        .finalize()
        .to_vec()
}

/// Re-encode the public section of a full witness as a standalone public
/// witness (its own element count header, then the public elements).
fn public_section(curve: Curve, shape: CircuitShape, full_witness: &[u8]) -> Vec<u8> {
    let nb_public_elements = shape.nb_public - 1;
    let body_len = nb_public_elements * curve.fr_size();
    let mut out = Vec::with_capacity(4 + body_len);
    out.extend_from_slice(&(nb_public_elements as u32).to_be_bytes());
    out.extend_from_slice(&full_witness[4..4 + body_len]);
    out
}

fn decode_r1cs(bytes: &[u8]) -> Result<CircuitShape> {
    if bytes.len() != 12 || &bytes[..4] != R1CS_MAGIC {
        return Err(Error::ProverFailed("malformed r1cs artifact".to_string()));
    }
    let nb_public = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let nb_secret = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    if nb_public == 0 {
        return Err(Error::ProverFailed(
            "r1cs artifact declares no public wire".to_string(),
        ));
    }
    Ok(CircuitShape { nb_public, nb_secret })
}

fn decode_key(bytes: &[u8], magic: &[u8; 4], what: &str) -> Result<[u8; 32]> {
    if bytes.len() != 36 || &bytes[..4] != magic {
        return Err(Error::ProverFailed(format!("malformed {what} artifact")));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes[4..]);
    Ok(key)
}

// ─── Artifact and witness generators (tests, local setups) ──────────────────

pub fn encode_r1cs(shape: CircuitShape) -> Vec<u8> {
    let mut out = Vec::with_capacity(12);
    out.extend_from_slice(R1CS_MAGIC);
    out.extend_from_slice(&(shape.nb_public as u32).to_be_bytes());
    out.extend_from_slice(&(shape.nb_secret as u32).to_be_bytes());
    out
}

pub fn encode_proving_key(key: &[u8; 32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(36);
    out.extend_from_slice(PK_MAGIC);
    out.extend_from_slice(key);
    out
}

pub fn encode_verifying_key(key: &[u8; 32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(36);
    out.extend_from_slice(VK_MAGIC);
    out.extend_from_slice(key);
    out
}

/// A full witness with every field element set to `fill`.
pub fn encode_full_witness(curve: Curve, shape: CircuitShape, fill: u8) -> Vec<u8> {
    let nb_elements = shape.nb_public + shape.nb_secret - 1;
    let mut out = Vec::with_capacity(shape.full_witness_size(curve));
    out.extend_from_slice(&(nb_elements as u32).to_be_bytes());
    out.resize(shape.full_witness_size(curve), fill);
    out
}

/// The public witness matching [`encode_full_witness`] for the same `fill`.
pub fn encode_public_witness(curve: Curve, shape: CircuitShape, fill: u8) -> Vec<u8> {
    let nb_elements = shape.nb_public - 1;
    let mut out = Vec::with_capacity(shape.public_witness_size(curve));
    out.extend_from_slice(&(nb_elements as u32).to_be_bytes());
    out.resize(shape.public_witness_size(curve), fill);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SHAPE: CircuitShape = CircuitShape { nb_public: 2, nb_secret: 3 };

    fn load() -> Arc<dyn CircuitHandle> {
        let key = [7u8; 32];
        InsecureProver
            .load_circuit(
                Curve::Bn254,
                &encode_r1cs(SHAPE),
                &encode_proving_key(&key),
                &encode_verifying_key(&key),
            )
            .unwrap()
    }

    #[test]
    fn test_prove_then_verify() {
        let circuit = load();
        let witness = encode_full_witness(Curve::Bn254, SHAPE, 0xAB);
        let proof = circuit
            .prove(&mut Cursor::new(witness), &CancelFlag::new())
            .unwrap();
        assert_eq!(proof.len(), PROOF_SIZE);

        let public = encode_public_witness(Curve::Bn254, SHAPE, 0xAB);
        assert!(circuit.verify(&proof, &public).unwrap());

        // A different public assignment must not verify.
        let other = encode_public_witness(Curve::Bn254, SHAPE, 0xCD);
        assert!(!circuit.verify(&proof, &other).unwrap());
        // Nor garbage proof bytes.
        assert!(!circuit.verify(b"short", &public).unwrap());
    }

    #[test]
    fn test_prove_rejects_wrong_length() {
        let circuit = load();
        let mut witness = encode_full_witness(Curve::Bn254, SHAPE, 1);
        witness.pop();
        let err = circuit
            .prove(&mut Cursor::new(witness), &CancelFlag::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidWitness(_)));
    }

    #[test]
    fn test_prove_rejects_bad_header() {
        let circuit = load();
        let mut witness = encode_full_witness(Curve::Bn254, SHAPE, 1);
        witness[3] = 99;
        let err = circuit
            .prove(&mut Cursor::new(witness), &CancelFlag::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidWitness(_)));
    }

    #[test]
    fn test_prove_honors_cancellation() {
        let circuit = load();
        let cancel = CancelFlag::new();
        cancel.set();
        let witness = encode_full_witness(Curve::Bn254, SHAPE, 1);
        let err = circuit
            .prove(&mut Cursor::new(witness), &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::JobCancelled));
    }

    #[test]
    fn test_load_rejects_mismatched_keys() {
        let err = InsecureProver
            .load_circuit(
                Curve::Bn254,
                &encode_r1cs(SHAPE),
                &encode_proving_key(&[1u8; 32]),
                &encode_verifying_key(&[2u8; 32]),
            )
            .unwrap_err();
        assert!(matches!(err, Error::ProverFailed(_)));
    }

    #[test]
    fn test_load_rejects_malformed_artifacts() {
        let key = [0u8; 32];
        assert!(InsecureProver
            .load_circuit(Curve::Bn254, b"junk", &encode_proving_key(&key), &encode_verifying_key(&key))
            .is_err());
        assert!(InsecureProver
            .load_circuit(Curve::Bn254, &encode_r1cs(SHAPE), b"junk", &encode_verifying_key(&key))
            .is_err());
    }
}
