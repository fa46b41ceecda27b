//! Software simulator backend.

use crate::backend::QuantumBackend;
use crate::core::channel::QuantumChannel;
use crate::core::errors::{BackendError, QuantumError};
use crate::core::types::{self, Basis, Bit, MeasurementResult, Qubit};

/// Local simulator implementing the backend contract.
///
/// Composes `prepare_qubit` → optional channel transit → `measure_qubit`.
/// Entirely CPU-bound; it never blocks.
#[derive(Debug, Clone)]
pub struct SimulatorBackend {
    name: String,
    channel: QuantumChannel,
    simulate_noise: bool,
}

impl SimulatorBackend {
    /// Creates a simulator with depolarising noise only.
    ///
    /// With `simulate_noise` false the channel is skipped entirely and
    /// transmission is perfect regardless of `noise_level`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidProbability` if `noise_level` lies outside [0, 1].
    pub fn new(simulate_noise: bool, noise_level: f64) -> Result<Self, QuantumError> {
        Ok(Self {
            name: "QuantumSimulator".to_string(),
            channel: QuantumChannel::new(noise_level, 0.0)?,
            simulate_noise,
        })
    }

    /// Creates a simulator that transmits through the given channel.
    ///
    /// This is how an eavesdropped link is modelled: the channel's
    /// intercept probability is honoured in addition to its noise level.
    pub fn with_channel(channel: QuantumChannel) -> Self {
        Self {
            name: "QuantumSimulator".to_string(),
            channel,
            simulate_noise: true,
        }
    }

    /// The channel qubits transit through when noise is enabled.
    pub fn channel(&self) -> &QuantumChannel {
        &self.channel
    }

    fn check_lengths(left: usize, right: usize) -> Result<(), BackendError> {
        if left != right {
            return Err(QuantumError::ArgumentMismatch { left, right }.into());
        }
        Ok(())
    }
}

impl QuantumBackend for SimulatorBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare_and_send(
        &self,
        bits: &[Bit],
        bases: &[Basis],
    ) -> Result<Vec<Qubit>, BackendError> {
        Self::check_lengths(bits.len(), bases.len())?;

        let mut rng = rand::rng();
        let qubits = bits
            .iter()
            .zip(bases)
            .map(|(&bit, &basis)| {
                let qubit = types::prepare_qubit(bit, basis);
                if self.simulate_noise {
                    self.channel.transmit_with(qubit, &mut rng)
                } else {
                    qubit
                }
            })
            .collect();

        Ok(qubits)
    }

    fn receive_and_measure(
        &self,
        qubits: &[Qubit],
        bases: &[Basis],
    ) -> Result<Vec<MeasurementResult>, BackendError> {
        Self::check_lengths(qubits.len(), bases.len())?;

        let mut rng = rand::rng();
        let results = qubits
            .iter()
            .zip(bases)
            .map(|(&qubit, &basis)| types::measure_qubit_with(qubit, basis, &mut rng))
            .collect();

        Ok(results)
    }

    fn noise_level(&self) -> f64 {
        if self.simulate_noise {
            self.channel.noise_level
        } else {
            0.0
        }
    }

    fn is_simulator(&self) -> bool {
        true
    }
}
