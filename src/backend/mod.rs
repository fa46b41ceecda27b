//! Quantum execution backends.
//!
//! The BB84 pipeline talks to a [`QuantumBackend`], a pluggable contract
//! with one software implementation here (the simulator). Remote services
//! (IBM Qiskit, AWS Braket) plug into the same contract; their transport
//! clients live outside this crate, but the tag, the job lifecycle and the
//! OpenQASM surface they need are defined in this module.

pub mod qasm;
mod simulator;

pub use simulator::SimulatorBackend;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::errors::BackendError;
use crate::core::types::{Basis, Bit, MeasurementResult, Qubit};

/// A pluggable quantum execution backend.
///
/// Implementations must treat the bit/basis (and qubit/basis) sequences as
/// parallel arrays and fail with `ArgumentMismatch` when their lengths
/// disagree.
pub trait QuantumBackend: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Encodes classical bits in the given bases and sends the resulting
    /// qubits through the quantum channel.
    fn prepare_and_send(
        &self,
        bits: &[Bit],
        bases: &[Basis],
    ) -> Result<Vec<Qubit>, BackendError>;

    /// Measures received qubits in the given bases.
    fn receive_and_measure(
        &self,
        qubits: &[Qubit],
        bases: &[Basis],
    ) -> Result<Vec<MeasurementResult>, BackendError>;

    /// Intrinsic noise level of this backend.
    fn noise_level(&self) -> f64;

    /// True when this backend is a software simulator.
    fn is_simulator(&self) -> bool;
}

/// Tag selecting which backend implements the contract for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local software simulator.
    #[default]
    Simulator,
    /// IBM Qiskit Runtime.
    Qiskit,
    /// AWS Braket.
    Braket,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Simulator => write!(f, "simulator"),
            BackendKind::Qiskit => write!(f, "qiskit"),
            BackendKind::Braket => write!(f, "braket"),
        }
    }
}

/// Lifecycle of a job submitted to a remote quantum service.
///
/// `Queued → Running → (Completed | Failed | Cancelled)`. A completed job
/// yields a counts map that [`qasm::parse_counts`] turns into measurement
/// bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// True once the job can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}
