//! Error types for the engine.
//!
//! One enum per concern, derived with `thiserror`. Higher layers wrap the
//! layer below with `#[from]` so `?` composes across module boundaries.
//!
//! An error rate above the abort threshold is deliberately NOT represented
//! here: it is a clean protocol outcome (`secure = false`), not a failure.

use thiserror::Error;

/// Errors from the quantum primitives and the channel model.
#[derive(Error, Debug, Clone)]
pub enum QuantumError {
    /// Two parallel sequences disagree in length.
    #[error("sequence length mismatch: {left} vs {right}")]
    ArgumentMismatch { left: usize, right: usize },

    /// A probability parameter lies outside the unit interval.
    #[error("Invalid probability: {0}. Must be between 0.0 and 1.0")]
    InvalidProbability(f64),
}

/// Errors from a quantum backend.
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    #[error(transparent)]
    Quantum(#[from] QuantumError),

    /// Transport failure talking to a remote quantum service.
    #[error("backend transport failed: {0}")]
    Transport(String),

    /// A remote job did not finish within the caller's deadline.
    #[error("job {job_id} timed out after {waited_secs} s")]
    Timeout { job_id: String, waited_secs: u64 },
}

/// Errors from the BB84 pipeline.
#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    /// Not a single position had matching bases.
    #[error("no matching bases found - sifted key is empty")]
    EmptySift,

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Quantum(#[from] QuantumError),
}

/// Errors from error reconciliation.
#[derive(Error, Debug, Clone)]
pub enum ReconcileError {
    /// Alice's and Bob's keys differ in length.
    #[error("keys must have the same length: {alice} vs {bob}")]
    KeyLengthMismatch { alice: usize, bob: usize },
}

/// Errors from privacy amplification.
#[derive(Error, Debug, Clone)]
pub enum AmplifyError {
    /// The reconciled key has no bits.
    #[error("input key is empty")]
    EmptyKey,

    /// The requested output length is zero.
    #[error("target length must be positive")]
    InvalidTargetLength,

    /// The leftover-hash-lemma bound is below the requested length.
    #[error("cannot generate secure key of length {target}: max secure length is {max_secure} bits")]
    InsufficientSecurity { target: usize, max_secure: i64 },
}

/// Errors from the session coordinator.
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("invalid Alice ID")]
    InvalidAliceId,

    #[error("invalid Bob ID")]
    InvalidBobId,

    #[error("key length must be between 128 and 4096 bits")]
    InvalidKeyLength,

    #[error("TTL must be between 1 and 10080 minutes")]
    InvalidTtl,

    #[error("session not found")]
    SessionNotFound,

    #[error("session has expired")]
    SessionExpired,

    #[error("key not found")]
    KeyNotFound,

    #[error("key has expired")]
    KeyExpired,

    #[error("unauthorized access")]
    Unauthorized,

    /// Someone tried to join a session that already left `waiting_for_bob`.
    #[error("session already in progress")]
    InProgress,

    /// An exchange was started on a session that is not `active`.
    #[error("session is not active")]
    NotActive,

    /// Cascade converged on a key that still differs from Alice's.
    /// The residual error rate is reported as a percentage.
    #[error("error correction failed: remaining error rate {0:.2}%")]
    ReconciliationDiverged(f64),

    #[error("key exchange failed: {0}")]
    Exchange(#[from] ProtocolError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Amplify(#[from] AmplifyError),
}
