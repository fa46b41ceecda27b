//! BB84 quantum key distribution pipeline.
//!
//! Four phases run strictly in sequence: Alice prepares and sends qubits,
//! Bob measures them, both parties sift on matching bases, and a random
//! sample of the sifted key is publicly compared to estimate the error
//! rate. The driver returns a [`KeyExchangeResult`]; an error rate above
//! the threshold is a clean insecure outcome, not an error: the caller
//! aborts the session instead of retrying on the same channel.

use std::collections::HashSet;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::backend::QuantumBackend;
use crate::core::errors::{ProtocolError, QuantumError};
use crate::core::types::{self, Basis, Bit, MeasurementResult, Qubit};

/// Default abort threshold for the quantum bit error rate.
///
/// 11% is the theoretical maximum at which BB84 can still distill a
/// secure key.
pub const DEFAULT_QBER_THRESHOLD: f64 = 0.11;

/// Default fraction of the sifted key sacrificed for error estimation.
pub const DEFAULT_SAMPLE_SIZE: f64 = 0.10;

/// Transmission oversampling factor relative to the target key length.
///
/// Sifting discards about half of the transmitted positions and error
/// estimation consumes another slice, so the pipeline sends four times the
/// requested number of bits to keep the sample statistically meaningful.
pub const TRANSMISSION_OVERSAMPLE: usize = 4;

/// Alice's side of one exchange.
///
/// Three parallel sequences of equal length; `qubits[i]` is the encoding
/// of `bits[i]` in `bases[i]` as it left the channel.
#[derive(Debug, Clone)]
pub struct AliceSession {
    pub bits: Vec<Bit>,
    pub bases: Vec<Basis>,
    pub qubits: Vec<Qubit>,
}

/// Bob's side of one exchange.
///
/// Two parallel sequences; `measurements[i]` was taken in `bases[i]`.
#[derive(Debug, Clone)]
pub struct BobSession {
    pub bases: Vec<Basis>,
    pub measurements: Vec<MeasurementResult>,
}

/// The positions at which both parties happened to use the same basis.
#[derive(Debug, Clone)]
pub struct SiftedKey {
    pub alice_key: Vec<Bit>,
    pub bob_key: Vec<Bit>,
    /// Transmission indices the kept bits came from, strictly increasing.
    pub indices: Vec<usize>,
}

impl SiftedKey {
    pub fn len(&self) -> usize {
        self.alice_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alice_key.is_empty()
    }
}

/// Error-rate estimate together with the disclosed sample positions.
///
/// The sampled positions have been publicly compared and must be removed
/// from the key; [`Bb84Protocol::remove_sampled_bits`] strips exactly
/// this set.
#[derive(Debug, Clone)]
pub struct QberEstimate {
    pub qber: f64,
    /// Indices into the sifted key, sorted ascending.
    pub sampled_indices: Vec<usize>,
}

/// Terminal output of one key exchange.
#[derive(Debug, Clone)]
pub struct KeyExchangeResult {
    /// The shared key; empty unless `secure` is true.
    pub key: Vec<u8>,
    /// Sifted key length before sample removal, in bits.
    pub raw_key_length: usize,
    /// Delivered key length in bits; zero unless `secure` is true.
    pub final_key_length: usize,
    /// Estimated quantum bit error rate.
    pub qber: f64,
    /// Whether the exchange produced a usable key.
    pub secure: bool,
    /// Human-readable outcome naming the relevant numeric values.
    pub message: String,
}

impl KeyExchangeResult {
    fn insecure(raw_key_length: usize, qber: f64, message: String) -> Self {
        Self {
            key: Vec::new(),
            raw_key_length,
            final_key_length: 0,
            qber,
            secure: false,
            message,
        }
    }
}

/// Synchronous BB84 driver bound to a backend.
pub struct Bb84Protocol {
    backend: Arc<dyn QuantumBackend>,
    key_length: usize,
    qber_threshold: f64,
    sample_size: f64,
}

impl Bb84Protocol {
    /// Creates a driver targeting `key_length` final bits.
    pub fn new(backend: Arc<dyn QuantumBackend>, key_length: usize) -> Self {
        Self {
            backend,
            key_length,
            qber_threshold: DEFAULT_QBER_THRESHOLD,
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }

    /// Overrides the abort threshold.
    pub fn set_qber_threshold(&mut self, threshold: f64) {
        self.qber_threshold = threshold;
    }

    /// Overrides the sample fraction. Values outside (0, 1) are ignored.
    pub fn set_sample_size(&mut self, size: f64) {
        if size > 0.0 && size < 1.0 {
            self.sample_size = size;
        }
    }

    pub fn key_length(&self) -> usize {
        self.key_length
    }

    pub fn qber_threshold(&self) -> f64 {
        self.qber_threshold
    }

    pub fn sample_size(&self) -> f64 {
        self.sample_size
    }

    /// Phase 1: Alice draws random bits and bases and sends the encoded
    /// qubits through the backend.
    pub fn alice_generate_qubits(&self) -> Result<AliceSession, ProtocolError> {
        let transmission_length = self.key_length * TRANSMISSION_OVERSAMPLE;

        let bits = types::random_bits(transmission_length);
        let bases = types::random_bases(transmission_length);
        let qubits = self.backend.prepare_and_send(&bits, &bases)?;

        debug!(transmitted = transmission_length, "alice prepared qubits");

        Ok(AliceSession {
            bits,
            bases,
            qubits,
        })
    }

    /// Phase 2: Bob draws his own random bases and measures.
    pub fn bob_measure_qubits(&self, qubits: &[Qubit]) -> Result<BobSession, ProtocolError> {
        let bases = types::random_bases(qubits.len());
        let measurements = self.backend.receive_and_measure(qubits, &bases)?;

        Ok(BobSession {
            bases,
            measurements,
        })
    }

    /// Phase 3: sifting. Both parties disclose their bases over the public
    /// channel and keep only the positions where they agree.
    pub fn basis_reconciliation(
        &self,
        alice: &AliceSession,
        bob: &BobSession,
    ) -> Result<SiftedKey, ProtocolError> {
        if alice.bases.len() != bob.bases.len() {
            return Err(QuantumError::ArgumentMismatch {
                left: alice.bases.len(),
                right: bob.bases.len(),
            }
            .into());
        }

        let mut sifted = SiftedKey {
            alice_key: Vec::new(),
            bob_key: Vec::new(),
            indices: Vec::new(),
        };

        for i in 0..alice.bases.len() {
            if alice.bases[i] == bob.bases[i] {
                sifted.alice_key.push(alice.bits[i]);
                sifted.bob_key.push(bob.measurements[i].measured_bit);
                sifted.indices.push(i);
            }
        }

        Ok(sifted)
    }

    /// Phase 4: estimates the QBER from a random sample of the sifted key.
    ///
    /// Sample positions are drawn without replacement by a
    /// cryptographically secure generator. They are returned alongside the
    /// estimate so the caller strips exactly the disclosed positions.
    ///
    /// # Errors
    ///
    /// `EmptySift` when the sifted key has no bits.
    pub fn estimate_qber(&self, sifted: &SiftedKey) -> Result<QberEstimate, ProtocolError> {
        if sifted.is_empty() {
            return Err(ProtocolError::EmptySift);
        }

        let length = sifted.len();
        let sample_count = ((length as f64 * self.sample_size) as usize).clamp(1, length);

        let mut rng = StdRng::from_os_rng();
        let mut sampled_indices =
            rand::seq::index::sample(&mut rng, length, sample_count).into_vec();
        sampled_indices.sort_unstable();

        let errors = sampled_indices
            .iter()
            .filter(|&&i| sifted.alice_key[i] != sifted.bob_key[i])
            .count();

        Ok(QberEstimate {
            qber: errors as f64 / sample_count as f64,
            sampled_indices,
        })
    }

    /// Removes the publicly disclosed sample positions from the sifted key.
    pub fn remove_sampled_bits(&self, sifted: &SiftedKey, sampled_indices: &[usize]) -> SiftedKey {
        let to_remove: HashSet<usize> = sampled_indices.iter().copied().collect();

        let mut kept = SiftedKey {
            alice_key: Vec::with_capacity(sifted.len() - to_remove.len()),
            bob_key: Vec::with_capacity(sifted.len() - to_remove.len()),
            indices: Vec::with_capacity(sifted.len() - to_remove.len()),
        };

        for i in 0..sifted.len() {
            if !to_remove.contains(&i) {
                kept.alice_key.push(sifted.alice_key[i]);
                kept.bob_key.push(sifted.bob_key[i]);
                kept.indices.push(sifted.indices[i]);
            }
        }

        kept
    }

    /// Runs the complete exchange and returns its terminal result.
    pub fn perform_key_exchange(&self) -> Result<KeyExchangeResult, ProtocolError> {
        let alice = self.alice_generate_qubits()?;
        let bob = self.bob_measure_qubits(&alice.qubits)?;

        let sifted = self.basis_reconciliation(&alice, &bob)?;
        let raw_key_length = sifted.len();
        if raw_key_length == 0 {
            return Err(ProtocolError::EmptySift);
        }

        let estimate = self.estimate_qber(&sifted)?;
        let qber = estimate.qber;
        debug!(raw_key_length, qber, "sifting and estimation finished");

        if qber > self.qber_threshold {
            warn!(
                qber,
                threshold = self.qber_threshold,
                "aborting: error rate above threshold"
            );
            return Ok(KeyExchangeResult::insecure(
                raw_key_length,
                qber,
                format!(
                    "INSECURE: QBER ({:.2}%) exceeds threshold ({:.2}%). Possible eavesdropping detected!",
                    qber * 100.0,
                    self.qber_threshold * 100.0
                ),
            ));
        }

        // The compared positions are public knowledge; strip exactly those.
        let final_sifted = self.remove_sampled_bits(&sifted, &estimate.sampled_indices);

        if final_sifted.len() < self.key_length {
            return Ok(KeyExchangeResult::insecure(
                raw_key_length,
                qber,
                format!(
                    "Insufficient key material: got {} bits, need {} bits",
                    final_sifted.len(),
                    self.key_length
                ),
            ));
        }

        let alice_key = &final_sifted.alice_key[..self.key_length];
        let bob_key = &final_sifted.bob_key[..self.key_length];

        if alice_key != bob_key {
            return Ok(KeyExchangeResult::insecure(
                raw_key_length,
                qber,
                "Key mismatch detected after sifting".to_string(),
            ));
        }

        Ok(KeyExchangeResult {
            key: types::bits_to_bytes(alice_key),
            raw_key_length,
            final_key_length: self.key_length,
            qber,
            secure: true,
            message: format!(
                "Secure key generated successfully! QBER: {:.2}%",
                qber * 100.0
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatorBackend;
    use crate::core::channel::QuantumChannel;

    fn protocol(noise: f64, key_length: usize) -> Bb84Protocol {
        let backend = SimulatorBackend::new(noise > 0.0, noise).unwrap();
        Bb84Protocol::new(Arc::new(backend), key_length)
    }

    #[test]
    fn alice_session_sequences_are_parallel() {
        let protocol = protocol(0.0, 64);
        let alice = protocol.alice_generate_qubits().unwrap();

        assert_eq!(alice.bits.len(), 256);
        assert_eq!(alice.bases.len(), 256);
        assert_eq!(alice.qubits.len(), 256);

        for i in 0..alice.bits.len() {
            assert_eq!(alice.qubits[i].classical_value, alice.bits[i]);
            assert_eq!(alice.qubits[i].preparation_basis, alice.bases[i]);
        }
    }

    #[test]
    fn bob_measures_in_his_own_bases() {
        let protocol = protocol(0.0, 64);
        let alice = protocol.alice_generate_qubits().unwrap();
        let bob = protocol.bob_measure_qubits(&alice.qubits).unwrap();

        assert_eq!(bob.bases.len(), alice.qubits.len());
        assert_eq!(bob.measurements.len(), alice.qubits.len());
        for i in 0..bob.bases.len() {
            assert_eq!(bob.measurements[i].measurement_basis, bob.bases[i]);
        }
    }

    #[test]
    fn sifting_keeps_only_matching_bases() {
        let protocol = protocol(0.0, 128);
        let alice = protocol.alice_generate_qubits().unwrap();
        let bob = protocol.bob_measure_qubits(&alice.qubits).unwrap();
        let sifted = protocol.basis_reconciliation(&alice, &bob).unwrap();

        for (k, &i) in sifted.indices.iter().enumerate() {
            assert_eq!(alice.bases[i], bob.bases[i]);
            assert_eq!(sifted.alice_key[k], alice.bits[i]);
            // Noise-free and bases agree: Bob read Alice's bit exactly.
            assert_eq!(sifted.bob_key[k], sifted.alice_key[k]);
        }

        // Indices strictly increasing.
        assert!(sifted.indices.windows(2).all(|w| w[0] < w[1]));

        // Retention should hover around 50%.
        let retention = sifted.len() as f64 / alice.bits.len() as f64;
        assert!((0.35..=0.65).contains(&retention), "retention {retention}");
    }

    #[test]
    fn estimation_sample_is_removed_exactly_once() {
        let protocol = protocol(0.0, 128);
        let alice = protocol.alice_generate_qubits().unwrap();
        let bob = protocol.bob_measure_qubits(&alice.qubits).unwrap();
        let sifted = protocol.basis_reconciliation(&alice, &bob).unwrap();

        let estimate = protocol.estimate_qber(&sifted).unwrap();
        let expected = ((sifted.len() as f64 * DEFAULT_SAMPLE_SIZE) as usize).max(1);
        assert_eq!(estimate.sampled_indices.len(), expected);
        assert!(estimate
            .sampled_indices
            .windows(2)
            .all(|w| w[0] < w[1]));

        let kept = protocol.remove_sampled_bits(&sifted, &estimate.sampled_indices);
        assert_eq!(kept.len(), sifted.len() - estimate.sampled_indices.len());

        // No disclosed transmission index survives into the final key.
        let disclosed: Vec<usize> = estimate
            .sampled_indices
            .iter()
            .map(|&i| sifted.indices[i])
            .collect();
        for index in kept.indices {
            assert!(!disclosed.contains(&index));
        }
    }

    #[test]
    fn perfect_channel_yields_secure_key() {
        let protocol = protocol(0.0, 256);
        let result = protocol.perform_key_exchange().unwrap();

        assert!(result.secure, "message: {}", result.message);
        assert!(result.qber <= 0.01);
        assert_eq!(result.final_key_length, 256);
        assert_eq!(result.key.len(), 32);
        assert!(result.message.contains("QBER"));
    }

    #[test]
    fn noisy_channel_outcome_is_consistent() {
        // Without error correction a 5% channel rarely delivers 256
        // identical bits, so the usual outcome is a clean mismatch abort.
        // Whatever the sample saw, the verdict must be consistent with it.
        let backend = SimulatorBackend::new(true, 0.05).unwrap();
        let protocol = Bb84Protocol::new(Arc::new(backend), 256);
        let result = protocol.perform_key_exchange().unwrap();

        assert!((0.0..=0.5).contains(&result.qber), "qber {}", result.qber);
        if result.qber > protocol.qber_threshold() {
            assert!(!result.secure);
            assert!(result.message.contains("QBER"));
            assert!(result.message.contains("threshold"));
        }
        if result.secure {
            assert_eq!(result.key.len(), 32);
        } else {
            assert!(result.key.is_empty());
            assert_eq!(result.final_key_length, 0);
        }
    }

    #[test]
    fn heavy_noise_aborts_insecure() {
        let backend = SimulatorBackend::new(true, 0.3).unwrap();
        let protocol = Bb84Protocol::new(Arc::new(backend), 512);
        let result = protocol.perform_key_exchange().unwrap();

        assert!(!result.secure);
        assert!(result.key.is_empty());
        assert_eq!(result.final_key_length, 0);
        assert!(result.message.contains("QBER"));
    }

    #[test]
    fn eavesdropped_channel_raises_qber() {
        // Full interception disturbs ~25% of the sifted bits, well above
        // the default threshold.
        let channel = QuantumChannel::new(0.0, 1.0).unwrap();
        let backend = SimulatorBackend::with_channel(channel);
        let protocol = Bb84Protocol::new(Arc::new(backend), 512);

        let result = protocol.perform_key_exchange().unwrap();
        assert!(!result.secure);
        assert!(result.qber > DEFAULT_QBER_THRESHOLD);
    }

    #[test]
    fn zero_threshold_refuses_measurable_noise() {
        let backend = SimulatorBackend::new(true, 0.1).unwrap();
        let mut protocol = Bb84Protocol::new(Arc::new(backend), 512);
        protocol.set_qber_threshold(0.0);

        let result = protocol.perform_key_exchange().unwrap();
        // With 10% channel noise a 100+ bit sample virtually always sees
        // at least one error.
        assert!(!result.secure);
    }

    #[test]
    fn sample_size_setter_ignores_out_of_range() {
        let mut protocol = protocol(0.0, 128);
        protocol.set_sample_size(0.0);
        assert_eq!(protocol.sample_size(), DEFAULT_SAMPLE_SIZE);
        protocol.set_sample_size(1.0);
        assert_eq!(protocol.sample_size(), DEFAULT_SAMPLE_SIZE);
        protocol.set_sample_size(0.25);
        assert_eq!(protocol.sample_size(), 0.25);
    }

    #[test]
    fn different_runs_produce_different_keys() {
        let protocol = protocol(0.0, 128);
        let first = protocol.perform_key_exchange().unwrap();
        let second = protocol.perform_key_exchange().unwrap();

        assert!(first.secure && second.secure);
        // 128 random bits colliding is not a thing that happens.
        assert_ne!(first.key, second.key);
    }
}
