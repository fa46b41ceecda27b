//! Quantum key distribution engine.
//!
//! Simulates the BB84 protocol between Alice and Bob to establish a shared
//! symmetric key whose secrecy rests on measurement disturbance rather than
//! computational hardness. The crate covers the quantum channel model, the
//! four-phase exchange pipeline, Cascade error reconciliation, privacy
//! amplification and an expiring-session coordinator that binds completed
//! exchanges to stored keys.

mod core;

pub mod backend;
pub mod postprocessing;
pub mod protocols;
pub mod session;

pub use crate::core::channel::QuantumChannel;
pub use crate::core::errors;
pub use crate::core::types::{
    bits_to_bytes, bytes_to_bits, calculate_bit_error, measure_qubit, prepare_qubit,
    random_bases, random_bits, Basis, Bit, MeasurementResult, Qubit,
};
