//! OpenQASM 2.0 circuit construction for BB84.
//!
//! Only remote backends go through a circuit representation; the local
//! simulator works on qubits directly. Alice's preparation encodes a bit
//! with an `x` gate and a diagonal basis with an `h` gate; Bob's
//! measurement applies `h` before `measure` when reading diagonally.

use std::collections::HashMap;

use crate::core::errors::QuantumError;
use crate::core::types::{Basis, Bit};

/// Incremental OpenQASM 2.0 circuit builder.
#[derive(Debug, Clone)]
pub struct QasmBuilder {
    registers: Vec<String>,
    gates: Vec<String>,
    measurements: Vec<String>,
}

impl QasmBuilder {
    /// Creates a builder with a quantum and a classical register.
    pub fn new(num_qubits: usize, num_classical: usize) -> Self {
        Self {
            registers: vec![
                format!("qreg q[{num_qubits}];"),
                format!("creg c[{num_classical}];"),
            ],
            gates: Vec::new(),
            measurements: Vec::new(),
        }
    }

    /// Appends a gate statement.
    pub fn add_gate(&mut self, gate: impl Into<String>) {
        self.gates.push(gate.into());
    }

    /// Appends a measurement of qubit `qubit` into classical bit `classical`.
    pub fn add_measurement(&mut self, qubit: usize, classical: usize) {
        self.measurements
            .push(format!("measure q[{qubit}] -> c[{classical}];"));
    }

    /// Renders the complete circuit.
    pub fn build(&self) -> String {
        let mut circuit = String::new();

        circuit.push_str("OPENQASM 2.0;\n");
        circuit.push_str("include \"qelib1.inc\";\n");
        circuit.push('\n');

        for register in &self.registers {
            circuit.push_str(register);
            circuit.push('\n');
        }
        circuit.push('\n');

        for gate in &self.gates {
            circuit.push_str(gate);
            circuit.push('\n');
        }
        circuit.push('\n');

        for measurement in &self.measurements {
            circuit.push_str(measurement);
            circuit.push('\n');
        }

        circuit
    }
}

fn check_lengths(left: usize, right: usize) -> Result<(), QuantumError> {
    if left != right {
        return Err(QuantumError::ArgumentMismatch { left, right });
    }
    Ok(())
}

fn add_preparation(builder: &mut QasmBuilder, position: usize, bit: Bit, basis: Basis) {
    if bit == Bit::One {
        builder.add_gate(format!("x q[{position}];"));
    }
    if basis == Basis::Diagonal {
        builder.add_gate(format!("h q[{position}];"));
    }
    // Rectilinear preparation needs no gate.
}

/// Circuit for Alice's preparation, measured back out for verification.
pub fn build_alice_circuit(bits: &[Bit], bases: &[Basis]) -> Result<String, QuantumError> {
    check_lengths(bits.len(), bases.len())?;

    let mut builder = QasmBuilder::new(bits.len(), bits.len());
    for (i, (&bit, &basis)) in bits.iter().zip(bases).enumerate() {
        add_preparation(&mut builder, i, bit, basis);
    }
    for i in 0..bits.len() {
        builder.add_measurement(i, i);
    }

    Ok(builder.build())
}

/// Circuit preparing Alice's qubits without measuring them.
///
/// For hardware where the measurement happens in a separate job.
pub fn build_prepare_circuit(bits: &[Bit], bases: &[Basis]) -> Result<String, QuantumError> {
    check_lengths(bits.len(), bases.len())?;

    let mut builder = QasmBuilder::new(bits.len(), bits.len());
    for (i, (&bit, &basis)) in bits.iter().zip(bases).enumerate() {
        add_preparation(&mut builder, i, bit, basis);
    }

    Ok(builder.build())
}

/// Circuit for Bob's measurement of already-prepared qubits.
pub fn build_measure_circuit(num_qubits: usize, bases: &[Basis]) -> Result<String, QuantumError> {
    check_lengths(num_qubits, bases.len())?;

    let mut builder = QasmBuilder::new(num_qubits, num_qubits);
    for (i, &basis) in bases.iter().enumerate() {
        if basis == Basis::Diagonal {
            builder.add_gate(format!("h q[{i}];"));
        }
        builder.add_measurement(i, i);
    }

    Ok(builder.build())
}

/// Combined circuit: Alice's preparation followed by Bob's measurement.
///
/// The channel between the two halves is implicit; remote backends model
/// it through their device noise.
pub fn build_combined_circuit(
    alice_bits: &[Bit],
    alice_bases: &[Basis],
    bob_bases: &[Basis],
) -> Result<String, QuantumError> {
    check_lengths(alice_bits.len(), alice_bases.len())?;
    check_lengths(alice_bits.len(), bob_bases.len())?;

    let mut builder = QasmBuilder::new(alice_bits.len(), alice_bits.len());
    for i in 0..alice_bits.len() {
        add_preparation(&mut builder, i, alice_bits[i], alice_bases[i]);

        if bob_bases[i] == Basis::Diagonal {
            builder.add_gate(format!("h q[{i}];"));
        }
        builder.add_measurement(i, i);
    }

    Ok(builder.build())
}

/// Extracts measurement bits from a completed job's counts map.
///
/// Takes the most frequent outcome bitstring and reads its first
/// `num_bits` characters; missing positions default to zero.
pub fn parse_counts(counts: &HashMap<String, usize>, num_bits: usize) -> Vec<Bit> {
    let best = counts
        .iter()
        .max_by_key(|(_, &count)| count)
        .map(|(outcome, _)| outcome.as_str())
        .unwrap_or("");

    (0..num_bits)
        .map(|i| Bit::from(best.as_bytes().get(i) == Some(&b'1')))
        .collect()
}

/// Normalises a counts map into outcome probabilities.
pub fn parse_probabilities(counts: &HashMap<String, usize>) -> HashMap<String, f64> {
    let total: usize = counts.values().sum();
    if total == 0 {
        return HashMap::new();
    }

    counts
        .iter()
        .map(|(outcome, &count)| (outcome.clone(), count as f64 / total as f64))
        .collect()
}
