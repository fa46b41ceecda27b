//! Noisy, possibly eavesdropped quantum channel.

use rand::Rng;

use crate::core::errors::QuantumError;
use crate::core::types::{Basis, Qubit};

/// A simulated quantum communication channel.
///
/// Two independent disturbances are applied to every transmitted qubit, in
/// order: an eavesdropper running an intercept-resend attack in a random
/// basis, then depolarising noise. The no-cloning theorem is what makes the
/// first step detectable: Eve cannot measure without collapsing the state,
/// and a wrong basis guess leaves the retransmitted qubit maximally
/// disturbed.
#[derive(Clone, Debug)]
pub struct QuantumChannel {
    /// Probability of a bit flip from decoherence, in [0, 1].
    pub noise_level: f64,
    /// Probability that a given qubit is intercepted, in [0, 1].
    pub intercept_probability: f64,
}

impl QuantumChannel {
    /// Creates a channel with the given noise characteristics.
    ///
    /// # Errors
    ///
    /// Returns `InvalidProbability` if either parameter lies outside [0, 1].
    pub fn new(noise_level: f64, intercept_probability: f64) -> Result<Self, QuantumError> {
        validate_prob(noise_level)?;
        validate_prob(intercept_probability)?;

        Ok(Self {
            noise_level,
            intercept_probability,
        })
    }

    /// Transmits a qubit through the channel.
    pub fn transmit(&self, qubit: Qubit) -> Qubit {
        self.transmit_with(qubit, &mut rand::rng())
    }

    /// [`transmit`](Self::transmit) with an explicit randomness source.
    ///
    /// The emitted qubit keeps its `preparation_basis`: that field records
    /// Alice's original encoding, which transit cannot rewrite.
    pub fn transmit_with<R: Rng + ?Sized>(&self, mut qubit: Qubit, rng: &mut R) -> Qubit {
        // Eavesdropper intercepts and measures in a random basis. On a
        // mismatched basis the state collapses, so the resent qubit flips
        // with probability 1/2.
        if rng.random_bool(self.intercept_probability) {
            let eve_basis = if rng.random_bool(0.5) {
                Basis::Diagonal
            } else {
                Basis::Rectilinear
            };

            if eve_basis != qubit.preparation_basis && rng.random_bool(0.5) {
                qubit.classical_value = qubit.classical_value.flip();
            }
        }

        // Decoherence
        if rng.random_bool(self.noise_level) {
            qubit.classical_value = qubit.classical_value.flip();
        }

        qubit
    }
}

/// Validate probability parameter
fn validate_prob(p: f64) -> Result<(), QuantumError> {
    if !(0.0..=1.0).contains(&p) {
        return Err(QuantumError::InvalidProbability(p));
    }
    Ok(())
}
