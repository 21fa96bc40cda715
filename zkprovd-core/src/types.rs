//! Common types used throughout the zkprovd engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a prove job.
///
/// On the witness socket a job id travels as the 16 raw bytes of the UUID
/// (standard big-endian byte order); everywhere else it is the hyphenated
/// string form.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The 16-byte wire form used as the witness-socket preamble.
    pub fn to_bytes(self) -> [u8; 16] {
        *self.0.as_bytes()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| Error::InvalidJobId(s.to_string()))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a prove job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, waiting for the witness to arrive on the witness socket.
    WaitingWitness,
    /// Witness stored, job id sitting in the ready-queue.
    Queued,
    /// Picked up by the worker, proof computation in progress.
    Running,
    /// Proof computed and stored on the job.
    Completed,
    /// Terminal failure: prover error, cancellation, or TTL expiry.
    Errored,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Errored)
    }

    /// Whether `self -> next` is a legal edge of the job lifecycle.
    ///
    /// Legal edges: WaitingWitness -> Queued (witness accepted),
    /// Queued -> Running (worker pickup), Running -> Completed or Errored
    /// (prove outcome), and WaitingWitness/Queued -> Errored
    /// (cancel or expire). Terminal states have no outgoing edges.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (WaitingWitness, Queued)
                | (WaitingWitness, Errored)
                | (Queued, Running)
                | (Queued, Errored)
                | (Running, Completed)
                | (Running, Errored)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::WaitingWitness => write!(f, "waiting_witness"),
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Errored => write!(f, "errored"),
        }
    }
}

/// Terminal error recorded on an errored job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    Cancelled,
    Expired,
    Prover(String),
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::Cancelled => write!(f, "job cancelled"),
            JobError::Expired => write!(f, "job expired"),
            JobError::Prover(msg) => write!(f, "{msg}"),
        }
    }
}

/// Point-in-time view of a job, as returned by list and subscription calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub circuit_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Vec<u8>>,
}

/// The closed set of supported curves.
///
/// The lowercase name doubles as the on-disk directory name under the
/// circuit root and as the first path segment of a circuit id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Curve {
    Bn254,
    Bls12_377,
    Bls12_381,
    Bw6_761,
}

impl Curve {
    pub const ALL: [Curve; 4] = [Curve::Bn254, Curve::Bls12_377, Curve::Bls12_381, Curve::Bw6_761];

    pub fn dir_name(self) -> &'static str {
        match self {
            Curve::Bn254 => "bn254",
            Curve::Bls12_377 => "bls12_377",
            Curve::Bls12_381 => "bls12_381",
            Curve::Bw6_761 => "bw6_761",
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Self> {
        Curve::ALL.into_iter().find(|c| c.dir_name() == name)
    }

    /// Byte width of a serialized scalar field element.
    pub fn fr_size(self) -> usize {
        match self {
            Curve::Bn254 | Curve::Bls12_377 | Curve::Bls12_381 => 32,
            Curve::Bw6_761 => 48,
        }
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// Error type for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown circuit: {0}")]
    UnknownCircuit(String),
    #[error("unknown job: {0}")]
    UnknownJob(JobId),
    #[error("invalid job id: {0}")]
    InvalidJobId(String),
    #[error("job {id} is not in a state accepting this operation (currently {status})")]
    InvalidJobState { id: JobId, status: JobStatus },
    #[error("invalid witness: {0}")]
    InvalidWitness(String),
    #[error("prover failed: {0}")]
    ProverFailed(String),
    #[error("job expired")]
    JobExpired,
    #[error("job cancelled")]
    JobCancelled,
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("internal inconsistency: {0}")]
    Internal(String),
}

/// Alias for Result used throughout the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_job_id_bytes_roundtrip() {
        let id = JobId::new();
        let bytes = id.to_bytes();
        assert_eq!(JobId::from_bytes(bytes), id);
    }

    #[test]
    fn test_job_id_parse() {
        let id = JobId::new();
        assert_eq!(JobId::parse(&id.to_string()).unwrap(), id);
        assert!(JobId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::WaitingWitness.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Errored.is_terminal());
    }

    #[test]
    fn test_legal_transitions() {
        use JobStatus::*;
        assert!(WaitingWitness.can_transition_to(Queued));
        assert!(WaitingWitness.can_transition_to(Errored));
        assert!(Queued.can_transition_to(Running));
        assert!(Queued.can_transition_to(Errored));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Errored));
    }

    #[test]
    fn test_illegal_transitions() {
        use JobStatus::*;
        assert!(!WaitingWitness.can_transition_to(Running));
        assert!(!WaitingWitness.can_transition_to(Completed));
        assert!(!Queued.can_transition_to(Completed));
        assert!(!Running.can_transition_to(Queued));
        assert!(!Completed.can_transition_to(Errored));
        assert!(!Errored.can_transition_to(Queued));
        for s in ALL_STATUSES {
            assert!(!s.can_transition_to(s), "{s} must not self-loop");
        }
    }

    const ALL_STATUSES: [JobStatus; 5] = [
        JobStatus::WaitingWitness,
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Errored,
    ];

    fn status_strategy() -> impl Strategy<Value = JobStatus> {
        prop::sample::select(ALL_STATUSES.to_vec())
    }

    proptest! {
        // Walking any sequence of attempted transitions from the initial
        // state never escapes a terminal state and never revisits an
        // earlier lifecycle stage.
        #[test]
        fn transitions_form_a_dag_path(attempts in prop::collection::vec(status_strategy(), 0..32)) {
            fn rank(s: JobStatus) -> u8 {
                match s {
                    JobStatus::WaitingWitness => 0,
                    JobStatus::Queued => 1,
                    JobStatus::Running => 2,
                    JobStatus::Completed | JobStatus::Errored => 3,
                }
            }

            let mut current = JobStatus::WaitingWitness;
            let mut terminal_transitions = 0u32;
            for next in attempts {
                if !current.can_transition_to(next) {
                    continue;
                }
                prop_assert!(!current.is_terminal(), "terminal states are absorbing");
                prop_assert!(rank(next) > rank(current), "transitions only move forward");
                if next.is_terminal() {
                    terminal_transitions += 1;
                }
                current = next;
            }
            prop_assert!(terminal_transitions <= 1, "at most one terminal transition");
        }
    }
}
