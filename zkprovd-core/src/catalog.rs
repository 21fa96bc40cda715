//! Circuit catalog — the startup-loaded table of provable circuits.
//!
//! The catalog walks `<root>/<curve>/<name>/` once at startup, expecting
//! exactly one `.pk`, one `.vk` and one `.r1cs` file per circuit directory,
//! and hands the artifact bytes to the [`Prover`] collaborator for
//! deserialization. After construction it is immutable and shared across
//! tasks without synchronization.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::prover::{CircuitHandle, Prover};
use crate::types::{Curve, Error, Result};

const PK_EXT: &str = "pk";
const VK_EXT: &str = "vk";
const R1CS_EXT: &str = "r1cs";

/// One loaded circuit: its opaque handle plus the witness sizes derived
/// from the circuit shape and curve.
pub struct CircuitRecord {
    /// `<curve>/<name>`, the identifier clients use.
    pub id: String,
    pub curve: Curve,
    pub handle: Arc<dyn CircuitHandle>,
    pub public_witness_size: usize,
    pub full_witness_size: usize,
}

pub struct Catalog {
    circuits: HashMap<String, Arc<CircuitRecord>>,
}

impl Catalog {
    /// Walk `root` and load every circuit directory found under the
    /// supported curve subdirectories.
    ///
    /// Fails if `root` does not exist, if any circuit directory has
    /// duplicate or missing artifact files, or if no circuit is found
    /// at all.
    pub fn load(root: &Path, prover: &dyn Prover) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::Config(format!(
                "circuit directory {} doesn't exist",
                root.display()
            )));
        }

        let mut circuits = HashMap::new();
        for curve in Curve::ALL {
            let curve_dir = root.join(curve.dir_name());
            let entries = match fs::read_dir(&curve_dir) {
                Ok(entries) => entries,
                // curves without circuits simply have no directory
                Err(_) => continue,
            };

            for entry in entries {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                let record = load_circuit(curve, &entry.path(), prover)?;
                info!(circuit_id = %record.id, "successfully loaded circuit");
                circuits.insert(record.id.clone(), Arc::new(record));
            }
        }

        if circuits.is_empty() {
            return Err(Error::Config(format!(
                "didn't find any circuits in {}",
                root.display()
            )));
        }

        Ok(Self { circuits })
    }

    pub fn lookup(&self, circuit_id: &str) -> Result<Arc<CircuitRecord>> {
        self.circuits
            .get(circuit_id)
            .cloned()
            .ok_or_else(|| Error::UnknownCircuit(circuit_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.circuits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.circuits.is_empty()
    }

    /// Sorted circuit ids, for startup logging and introspection.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.circuits.keys().cloned().collect();
        ids.sort();
        ids
    }
}

fn load_circuit(curve: Curve, dir: &Path, prover: &dyn Prover) -> Result<CircuitRecord> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Config(format!("unreadable circuit directory {}", dir.display())))?;
    let circuit_id = format!("{}/{}", curve.dir_name(), name);
    debug!(circuit_id = %circuit_id, "looking for circuit artifacts");

    let mut pk: Option<Vec<u8>> = None;
    let mut vk: Option<Vec<u8>> = None;
    let mut r1cs: Option<Vec<u8>> = None;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let slot = match path.extension().and_then(|e| e.to_str()) {
            Some(PK_EXT) => &mut pk,
            Some(VK_EXT) => &mut vk,
            Some(R1CS_EXT) => &mut r1cs,
            _ => continue,
        };
        if slot.is_some() {
            return Err(Error::Config(format!(
                "{} contains multiple .{} files",
                dir.display(),
                path.extension().and_then(|e| e.to_str()).unwrap_or("")
            )));
        }
        *slot = Some(fs::read(&path)?);
    }

    let missing = |ext: &str| Error::Config(format!("{} contains no .{ext} file", dir.display()));
    let pk = pk.ok_or_else(|| missing(PK_EXT))?;
    let vk = vk.ok_or_else(|| missing(VK_EXT))?;
    let r1cs = r1cs.ok_or_else(|| missing(R1CS_EXT))?;

    let handle = prover.load_circuit(curve, &r1cs, &pk, &vk)?;
    let shape = handle.shape();

    Ok(CircuitRecord {
        id: circuit_id,
        curve,
        public_witness_size: shape.public_witness_size(curve),
        full_witness_size: shape.full_witness_size(curve),
        handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insecure::{
        encode_proving_key, encode_r1cs, encode_verifying_key, InsecureProver,
    };
    use crate::prover::CircuitShape;
    use std::fs;
    use tempfile::TempDir;

    fn write_circuit(root: &Path, curve: Curve, name: &str, shape: CircuitShape) {
        let dir = root.join(curve.dir_name()).join(name);
        fs::create_dir_all(&dir).unwrap();
        let key = [42u8; 32];
        fs::write(dir.join(format!("{name}.r1cs")), encode_r1cs(shape)).unwrap();
        fs::write(dir.join(format!("{name}.pk")), encode_proving_key(&key)).unwrap();
        fs::write(dir.join(format!("{name}.vk")), encode_verifying_key(&key)).unwrap();
    }

    #[test]
    fn test_load_and_lookup() {
        let tmp = TempDir::new().unwrap();
        write_circuit(tmp.path(), Curve::Bn254, "mul", CircuitShape { nb_public: 2, nb_secret: 3 });
        write_circuit(tmp.path(), Curve::Bls12_381, "range", CircuitShape { nb_public: 3, nb_secret: 1 });

        let catalog = Catalog::load(tmp.path(), &InsecureProver).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.ids(), vec!["bls12_381/range", "bn254/mul"]);

        let record = catalog.lookup("bn254/mul").unwrap();
        assert_eq!(record.curve, Curve::Bn254);
        assert_eq!(record.public_witness_size, 4 + 32);
        assert_eq!(record.full_witness_size, 4 + 4 * 32);

        assert!(matches!(
            catalog.lookup("bn254/nope"),
            Err(Error::UnknownCircuit(_))
        ));
    }

    #[test]
    fn test_missing_root_fails() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(matches!(
            Catalog::load(&missing, &InsecureProver),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_empty_catalog_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            Catalog::load(tmp.path(), &InsecureProver),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_duplicate_artifact_fails() {
        let tmp = TempDir::new().unwrap();
        let shape = CircuitShape { nb_public: 2, nb_secret: 1 };
        write_circuit(tmp.path(), Curve::Bn254, "mul", shape);
        let dir = tmp.path().join("bn254/mul");
        fs::write(dir.join("extra.pk"), encode_proving_key(&[42u8; 32])).unwrap();

        assert!(matches!(
            Catalog::load(tmp.path(), &InsecureProver),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_artifact_fails() {
        let tmp = TempDir::new().unwrap();
        let shape = CircuitShape { nb_public: 2, nb_secret: 1 };
        write_circuit(tmp.path(), Curve::Bn254, "mul", shape);
        fs::remove_file(tmp.path().join("bn254/mul/mul.vk")).unwrap();

        assert!(matches!(
            Catalog::load(tmp.path(), &InsecureProver),
            Err(Error::Config(_))
        ));
    }
}
